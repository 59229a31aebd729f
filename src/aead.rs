//! AES-256-GCM packet sealing with a 16-byte in-band nonce.
//!
//! `aes-gcm`'s default type alias (`Aes256Gcm`) hard-codes a 12-byte nonce.
//! Interop with peers built on PyCryptodome's `AES.MODE_GCM`, which defaults
//! to a 16-byte nonce when none is given, requires the generic form,
//! `AesGcm<Aes256, U16>`, rather than the convenience alias.
//!
//! Packet layout on the wire: `nonce(16) ‖ tag(16) ‖ ciphertext`. This
//! differs from `aes-gcm`'s own `encrypt` convention, which appends the tag
//! after the ciphertext — the tag is moved to the front when sealing and
//! moved back when opening.

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::AesGcm;
use rand::RngCore;
use typenum::U16;

use crate::error::CryptoError;

type Aes256Gcm16 = AesGcm<Aes256, U16>;

/// A sealed packet ready to be embedded in a QNAME, or as decoded from one.
pub struct Packet {
    pub nonce: [u8; 16],
    pub tag: [u8; 16],
    pub ciphertext: Vec<u8>,
}

impl Packet {
    /// Flatten to the wire layout `nonce ‖ tag ‖ ciphertext`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(32 + self.ciphertext.len());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.tag);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Parse the wire layout. Caller has already checked the 32-byte floor.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        debug_assert!(bytes.len() >= 32);
        let mut nonce = [0u8; 16];
        let mut tag = [0u8; 16];
        nonce.copy_from_slice(&bytes[0..16]);
        tag.copy_from_slice(&bytes[16..32]);
        Packet {
            nonce,
            tag,
            ciphertext: bytes[32..].to_vec(),
        }
    }
}

/// AEAD codec bound to one 32-byte key. Cheap to construct; holds no state
/// besides the expanded key schedule.
pub struct Codec {
    cipher: Aes256Gcm16,
}

impl Codec {
    pub fn new(key: &[u8; 32]) -> Self {
        Codec {
            cipher: Aes256Gcm16::new(GenericArray::from_slice(key)),
        }
    }

    /// Encrypt `plaintext` under a fresh random nonce. AAD is always empty,
    /// matching the reference's `cipher.encrypt_and_digest(data)` call with
    /// no `update()`.
    pub fn seal(&self, plaintext: &[u8]) -> Packet {
        let mut nonce = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut nonce);

        // `encrypt` appends the 16-byte tag to the ciphertext; split it
        // back off so the in-memory `Packet` always carries tag separately.
        let mut sealed = self
            .cipher
            .encrypt(GenericArray::from_slice(&nonce), plaintext)
            .expect("AES-256-GCM encryption is infallible for in-memory buffers");
        let tag_bytes = sealed.split_off(sealed.len() - 16);
        let mut tag = [0u8; 16];
        tag.copy_from_slice(&tag_bytes);

        Packet {
            nonce,
            tag,
            ciphertext: sealed,
        }
    }

    /// Decrypt and authenticate a packet. Fails closed: any tag mismatch
    /// or malformed ciphertext yields `CryptoError::TagMismatch`, with no
    /// distinction exposed to the caller (timing-safe by construction,
    /// since `aes-gcm` itself never branches on *which* byte mismatched).
    pub fn open(&self, packet: &Packet) -> Result<Vec<u8>, CryptoError> {
        let mut combined = Vec::with_capacity(packet.ciphertext.len() + 16);
        combined.extend_from_slice(&packet.ciphertext);
        combined.extend_from_slice(&packet.tag);

        self.cipher
            .decrypt(GenericArray::from_slice(&packet.nonce), combined.as_slice())
            .map_err(|_| CryptoError::TagMismatch)
    }
}
