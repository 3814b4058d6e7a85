use aes::cipher::{inout::InOutBuf, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use lodestone_common::{LodestoneError, Result};
use std::fmt;

pub type Aes128Cfb8Enc = cfb8::Encryptor<aes::Aes128>;
pub type Aes128Cfb8Dec = cfb8::Decryptor<aes::Aes128>;

pub const SHARED_SECRET_LEN: usize = 16;

/// Both halves of the AES/CFB-8 stream. Key and IV are the shared secret.
pub struct AesCfb8 {
    encryptor: Aes128Cfb8Enc,
    decryptor: Aes128Cfb8Dec,
}

impl AesCfb8 {
    pub fn new(secret: &[u8]) -> Result<Self> {
        let invalid = |_| {
            LodestoneError::Security(format!(
                "shared secret must be {SHARED_SECRET_LEN} bytes, got {}",
                secret.len()
            ))
        };

        Ok(Self {
            encryptor: Aes128Cfb8Enc::new_from_slices(secret, secret).map_err(invalid)?,
            decryptor: Aes128Cfb8Dec::new_from_slices(secret, secret).map_err(invalid)?,
        })
    }

    pub fn encrypt(&mut self, data: &mut [u8]) {
        let (chunks, _) = InOutBuf::from(data).into_chunks();
        self.encryptor.encrypt_blocks_inout_mut(chunks);
    }

    pub fn decrypt(&mut self, data: &mut [u8]) {
        let (chunks, _) = InOutBuf::from(data).into_chunks();
        self.decryptor.decrypt_blocks_inout_mut(chunks);
    }
}

/// Stream encryption, in place. Once enabled it stays on for the rest of the connection.
#[derive(Default)]
pub enum Encryption {
    #[default]
    None,
    Aes(Box<AesCfb8>),
}

impl Encryption {
    pub fn aes(secret: &[u8]) -> Result<Self> {
        Ok(Encryption::Aes(Box::new(AesCfb8::new(secret)?)))
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Encryption::Aes(_))
    }

    pub fn encrypt(&mut self, data: &mut [u8]) {
        if let Encryption::Aes(cipher) = self {
            cipher.encrypt(data);
        }
    }

    pub fn decrypt(&mut self, data: &mut [u8]) {
        if let Encryption::Aes(cipher) = self {
            cipher.decrypt(data);
        }
    }
}

impl fmt::Debug for Encryption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Encryption::None => write!(f, "Encryption::None"),
            Encryption::Aes(_) => write!(f, "Encryption::Aes(..)"),
        }
    }
}
