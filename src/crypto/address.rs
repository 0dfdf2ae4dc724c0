// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ethereum address derivation for secp256k1 keys.
//!
//! 1. Take the uncompressed public key (65 bytes, `0x04` prefix)
//! 2. Hash the 64 coordinate bytes with keccak256
//! 3. Keep the last 20 bytes and render as `0x`-prefixed lowercase hex

use alloy::primitives::keccak256;
use k256::ecdsa::VerifyingKey;

use crate::error::{KeyError, KeyResult};

/// Derive the address of a verifying key.
pub fn address_for_verifying_key(verifying_key: &VerifyingKey) -> String {
    let uncompressed = verifying_key.to_encoded_point(false);
    let hash = keccak256(&uncompressed.as_bytes()[1..]);
    format!("0x{}", alloy::hex::encode(&hash[12..]))
}

/// Derive the address from SEC1 public key bytes.
///
/// Accepts compressed (33), uncompressed (65) and bare-coordinate (64) forms.
/// The point must lie on the curve.
pub fn address_from_public_key(bytes: &[u8]) -> KeyResult<String> {
    let sec1 = if bytes.len() == 64 {
        let mut prefixed = Vec::with_capacity(65);
        prefixed.push(0x04);
        prefixed.extend_from_slice(bytes);
        prefixed
    } else {
        bytes.to_vec()
    };

    let verifying_key = VerifyingKey::from_sec1_bytes(&sec1)
        .map_err(|_| KeyError::InvalidParameters("not a valid secp256k1 public key".to_string()))?;
    Ok(address_for_verifying_key(&verifying_key))
}

/// Hex form of [`address_from_public_key`]; a `0x` prefix is accepted.
pub fn address_from_public_key_hex(public_key_hex: &str) -> KeyResult<String> {
    let trimmed = public_key_hex.trim();
    let bytes = alloy::hex::decode(trimmed.strip_prefix("0x").unwrap_or(trimmed))
        .map_err(|e| KeyError::InvalidParameters(format!("public key is not valid hex: {e}")))?;
    address_from_public_key(&bytes)
}

/// Derive the address belonging to a raw 32-byte private key in hex.
pub fn address_from_private_key_hex(private_key_hex: &str) -> KeyResult<String> {
    let trimmed = private_key_hex.trim();
    let bytes = alloy::hex::decode(trimmed.strip_prefix("0x").unwrap_or(trimmed))
        .map_err(|e| KeyError::InvalidParameters(format!("private key is not valid hex: {e}")))?;
    let signing_key = k256::ecdsa::SigningKey::from_slice(&bytes)
        .map_err(|_| KeyError::InvalidParameters("not a valid secp256k1 private key".to_string()))?;
    Ok(address_for_verifying_key(signing_key.verifying_key()))
}
