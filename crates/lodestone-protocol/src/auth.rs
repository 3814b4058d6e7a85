use crate::encryption::SHARED_SECRET_LEN;
use crate::login::{EncryptionRequestPacket, EncryptionResponsePacket};
use lodestone_common::{LodestoneError, Result};
use rand::RngCore;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Pkcs1v15Encrypt, RsaPublicKey};
use sha1::{Digest, Sha1};
use tracing::debug;

/// Decides whether the client may proceed with an online-mode login.
///
/// An online implementation would post [`server_hash`] to the session service here.
pub trait Authenticator: Send {
    fn authenticate(&mut self, server_id: &str, shared_secret: &[u8], public_key: &[u8]) -> bool;
}

/// Accepts every server. Enough for offline-mode servers, which never check the session.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineAuthenticator;

impl Authenticator for OfflineAuthenticator {
    fn authenticate(&mut self, server_id: &str, _shared_secret: &[u8], _public_key: &[u8]) -> bool {
        debug!(server_id, "skipping session authentication");
        true
    }
}

/// SHA-1 over server id, shared secret and public key, in Minecraft's signed hex form.
pub fn server_hash(server_id: &str, shared_secret: &[u8], public_key: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(server_id.as_bytes());
    hasher.update(shared_secret);
    hasher.update(public_key);
    minecraft_hex_digest(hasher.finalize().into())
}

/// Renders a digest as a signed big-endian number in hex, without leading zeros.
pub fn minecraft_hex_digest(digest: [u8; 20]) -> String {
    let negative = digest[0] & 0x80 != 0;
    let mut magnitude = digest;
    if negative {
        // Two's complement
        let mut carry = true;
        for byte in magnitude.iter_mut().rev() {
            *byte = !*byte;
            if carry {
                let (sum, overflow) = byte.overflowing_add(1);
                *byte = sum;
                carry = overflow;
            }
        }
    }

    let hex: String = magnitude.iter().map(|byte| format!("{byte:02x}")).collect();
    let trimmed = match hex.trim_start_matches('0') {
        "" => "0",
        digits => digits,
    };

    if negative {
        format!("-{trimmed}")
    } else {
        trimmed.to_owned()
    }
}

pub fn generate_shared_secret() -> [u8; SHARED_SECRET_LEN] {
    let mut secret = [0u8; SHARED_SECRET_LEN];
    rand::thread_rng().fill_bytes(&mut secret);
    secret
}

/// RSA/PKCS#1 v1.5 encryption with the server's DER encoded public key.
pub fn rsa_encrypt(public_key_der: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let key = RsaPublicKey::from_public_key_der(public_key_der)
        .map_err(|e| LodestoneError::Security(format!("invalid server public key: {e}")))?;
    key.encrypt(&mut rand::thread_rng(), Pkcs1v15Encrypt, data)
        .map_err(|e| LodestoneError::Security(format!("rsa encryption failed: {e}")))
}

/// The reply to an encryption request, plus the secret to enable once it is sent.
#[derive(Debug, Clone)]
pub struct EncryptionReply {
    pub response: EncryptionResponsePacket,
    pub shared_secret: [u8; SHARED_SECRET_LEN],
}

/// Generates a secret, asks `authenticator` for permission and encrypts secret and verify
/// token for the server. A refusal is a `Security` error.
pub fn answer_encryption_request(
    request: &EncryptionRequestPacket,
    authenticator: &mut dyn Authenticator,
) -> Result<EncryptionReply> {
    let shared_secret = generate_shared_secret();

    if !authenticator.authenticate(&request.server_id, &shared_secret, &request.public_key) {
        return Err(LodestoneError::Security(
            "session authentication rejected".into(),
        ));
    }

    Ok(EncryptionReply {
        response: EncryptionResponsePacket {
            shared_secret: rsa_encrypt(&request.public_key, &shared_secret)?,
            verify_token: rsa_encrypt(&request.public_key, &request.verify_token)?,
        },
        shared_secret,
    })
}
