//! Seal signatures and header digests
//!
//! Producers sign `keccak256(pre_seal_bytes)` with a recoverable secp256k1
//! signature laid out as `r ‖ s ‖ v` (65 bytes). The producer address is the
//! last 20 bytes of the keccak hash of the uncompressed public key.

use crate::cache::Cache;
use crate::errors::{ConsensusError, ConsensusResult};
use pob_state::{keccak256, Address, Hash, Header};
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use std::sync::Arc;

/// Length of a seal signature
pub const SIGNATURE_LENGTH: usize = 65;

/// External signing callback: (account, mime type, payload) → signature
pub type SignerFn = Arc<dyn Fn(Address, &str, &[u8]) -> Result<Vec<u8>, String> + Send + Sync>;

/// Address of a public key
pub fn public_key_to_address(key: &PublicKey) -> Address {
    let uncompressed = key.serialize_uncompressed();
    let digest = keccak256(&uncompressed[1..]);
    let mut address = [0u8; Address::LEN];
    address.copy_from_slice(&digest.as_bytes()[Hash::LEN - Address::LEN..]);
    Address(address)
}

/// Address controlled by a secret key
pub fn secret_to_address(secret: &SecretKey) -> Address {
    let secp = Secp256k1::signing_only();
    public_key_to_address(&PublicKey::from_secret_key(&secp, secret))
}

/// Sign a 32-byte digest, returning `r ‖ s ‖ v`
pub fn sign_digest(secret: &SecretKey, digest: &Hash) -> ConsensusResult<Vec<u8>> {
    let secp = Secp256k1::signing_only();
    let message = Message::from_digest_slice(digest.as_ref())
        .map_err(|e| ConsensusError::Signing(e.to_string()))?;
    let (recovery_id, compact) = secp.sign_ecdsa_recoverable(&message, secret).serialize_compact();

    let mut signature = Vec::with_capacity(SIGNATURE_LENGTH);
    signature.extend_from_slice(&compact);
    signature.push(recovery_id.to_i32() as u8);
    Ok(signature)
}

/// Recover the address that produced `signature` over `digest`
pub fn recover_address(digest: &Hash, signature: &[u8]) -> ConsensusResult<Address> {
    if signature.len() != SIGNATURE_LENGTH {
        return Err(ConsensusError::InvalidSignature(format!(
            "expected {} bytes, got {}",
            SIGNATURE_LENGTH,
            signature.len()
        )));
    }

    // Accept both raw (0/1) and legacy (27/28) recovery bytes
    let v = match signature[64] {
        27 | 28 => signature[64] - 27,
        v => v,
    };
    let recovery_id = RecoveryId::from_i32(v as i32)
        .map_err(|e| ConsensusError::InvalidSignature(e.to_string()))?;
    let recoverable = RecoverableSignature::from_compact(&signature[..64], recovery_id)
        .map_err(|e| ConsensusError::InvalidSignature(e.to_string()))?;
    let message = Message::from_digest_slice(digest.as_ref())
        .map_err(|e| ConsensusError::InvalidSignature(e.to_string()))?;

    let secp = Secp256k1::verification_only();
    let key = secp
        .recover_ecdsa(&message, &recoverable)
        .map_err(|e| ConsensusError::InvalidSignature(e.to_string()))?;
    Ok(public_key_to_address(&key))
}

/// Recover the sealer of a header, consulting and filling `cache`
pub fn recover_signer(
    header: &Header,
    cache: &dyn Cache<Hash, Address>,
) -> ConsensusResult<Address> {
    let hash = header.hash();
    if let Some(address) = cache.get(&hash) {
        return Ok(address);
    }
    let address = recover_address(&header.seal_hash(), &header.signature)?;
    cache.insert(hash, address);
    Ok(address)
}

/// Commitment to the per-validator acknowledgment counts
pub fn ack_digest(ack_counts: &[u64]) -> Hash {
    if ack_counts.is_empty() {
        return Hash::ZERO;
    }
    let mut buf = Vec::with_capacity(ack_counts.len() * 8);
    for count in ack_counts {
        buf.extend_from_slice(&count.to_be_bytes());
    }
    keccak256(&buf)
}

/// Signer callback backed by an in-memory key; signs `keccak256(payload)`
pub fn local_signer(secret: SecretKey) -> SignerFn {
    let owner = secret_to_address(&secret);
    Arc::new(move |account: Address, _mime: &str, payload: &[u8]| {
        if account != owner {
            return Err(format!("no key for account {}", account));
        }
        sign_digest(&secret, &keccak256(payload)).map_err(|e| e.to_string())
    })
}
