//! Integrity engine: streaming CRC-32, streaming SHA-1, and RSA-PSS
//! signature verification over the bytes PROLOG..PADDING.
//!
//! Both hashes are incremental so the controller can feed them bytes as
//! they arrive off the wire and persist just enough state to resume after
//! a restart, without re-reading already-consumed bytes.

use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::RsaPublicKey;
use sha1::Sha1 as Sha1Digest;
use static_assertions::assert_eq_size;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

// ── CRC-32 ────────────────────────────────────────────────────────────────────

/// Resumable CRC-32 (zlib / IEEE 802.3 polynomial) accumulator.
///
/// `crc32fast::Hasher::new_with_initial` and `finalize` are inverses of
/// each other for this exact purpose: the persisted `computed_crc` from a
/// prior run can be fed straight back in as the initial state.
#[derive(Clone)]
pub struct Crc32 {
    inner: crc32fast::Hasher,
}

impl Crc32 {
    pub fn new() -> Self {
        Self { inner: crc32fast::Hasher::new() }
    }

    pub fn resume(previous: u32) -> Self {
        Self { inner: crc32fast::Hasher::new_with_initial(previous) }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.inner.update(bytes);
    }

    /// Current running value. Safe to persist and feed to [`Crc32::resume`].
    pub fn checksum(&self) -> u32 {
        self.inner.clone().finalize()
    }
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

// ── SHA-1 (hand-rolled, snapshot/restore) ────────────────────────────────────

const SHA1_BLOCK: usize = 64;

/// Opaque, restartable SHA-1 context. Persisted byte-for-byte in the
/// workspace so a restarted daemon resumes digesting mid-package without
/// re-reading bytes already consumed from the signed region.
///
/// `sha1`/`digest` only expose a one-shot `Digest` trait with no public
/// context-snapshot API, so the compression function is reimplemented here
/// (FIPS 180-4) to get an inspectable, `FromBytes`/`AsBytes` state record.
#[derive(Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct Sha1State {
    h: [u32; 5],
    buffer: [u8; SHA1_BLOCK],
    buffer_len: u32,
    total_len: u64,
}

assert_eq_size!(Sha1State, [u8; 96]);

impl Sha1State {
    pub fn new() -> Self {
        Self {
            h: [0x6745_2301, 0xEFCD_AB89, 0x98BA_DCFE, 0x1032_5476, 0xC3D2_E1F0],
            buffer: [0; SHA1_BLOCK],
            buffer_len: 0,
            total_len: 0,
        }
    }

    pub fn update(&mut self, mut data: &[u8]) {
        self.total_len += data.len() as u64;

        if self.buffer_len > 0 {
            let have = self.buffer_len as usize;
            let need = SHA1_BLOCK - have;
            let take = need.min(data.len());
            self.buffer[have..have + take].copy_from_slice(&data[..take]);
            self.buffer_len += take as u32;
            data = &data[take..];

            if self.buffer_len as usize == SHA1_BLOCK {
                let block = self.buffer;
                compress(&mut self.h, &block);
                self.buffer_len = 0;
            } else {
                return;
            }
        }

        while data.len() >= SHA1_BLOCK {
            let mut block = [0u8; SHA1_BLOCK];
            block.copy_from_slice(&data[..SHA1_BLOCK]);
            compress(&mut self.h, &block);
            data = &data[SHA1_BLOCK..];
        }

        self.buffer[..data.len()].copy_from_slice(data);
        self.buffer_len = data.len() as u32;
    }

    /// Finalizes a *clone* of the context, leaving `self` resumable. The
    /// integrity engine calls this once at the very end of the signed
    /// region; mid-stream it only ever calls `update`.
    pub fn finalize(&self) -> [u8; 20] {
        let mut ctx = self.clone();
        let bit_len = ctx.total_len * 8;

        let pad_len = {
            let used = ctx.buffer_len as usize;
            if used < 56 {
                56 - used
            } else {
                120 - used
            }
        };
        let mut padding = vec![0u8; pad_len + 8];
        padding[0] = 0x80;
        padding[pad_len..pad_len + 8].copy_from_slice(&bit_len.to_be_bytes());
        ctx.update_raw(&padding);

        let mut out = [0u8; 20];
        for (i, word) in ctx.h.iter().enumerate() {
            out[i * 4..i * 4 + 4].copy_from_slice(&word.to_be_bytes());
        }
        out
    }

    /// Like `update` but does not touch `total_len` — used only to feed
    /// the precomputed padding block(s) during finalize.
    fn update_raw(&mut self, mut data: &[u8]) {
        if self.buffer_len > 0 {
            let have = self.buffer_len as usize;
            let need = SHA1_BLOCK - have;
            let take = need.min(data.len());
            self.buffer[have..have + take].copy_from_slice(&data[..take]);
            self.buffer_len += take as u32;
            data = &data[take..];
            if self.buffer_len as usize == SHA1_BLOCK {
                let block = self.buffer;
                compress(&mut self.h, &block);
                self.buffer_len = 0;
            }
        }
        while data.len() >= SHA1_BLOCK {
            let mut block = [0u8; SHA1_BLOCK];
            block.copy_from_slice(&data[..SHA1_BLOCK]);
            compress(&mut self.h, &block);
            data = &data[SHA1_BLOCK..];
        }
        if !data.is_empty() {
            self.buffer[..data.len()].copy_from_slice(data);
            self.buffer_len = data.len() as u32;
        }
    }
}

impl Default for Sha1State {
    fn default() -> Self {
        Self::new()
    }
}

fn compress(h: &mut [u32; 5], block: &[u8; SHA1_BLOCK]) {
    let mut w = [0u32; 80];
    for (i, word) in w.iter_mut().take(16).enumerate() {
        *word = u32::from_be_bytes(block[i * 4..i * 4 + 4].try_into().unwrap());
    }
    for i in 16..80 {
        w[i] = (w[i - 3] ^ w[i - 8] ^ w[i - 14] ^ w[i - 16]).rotate_left(1);
    }

    let (mut a, mut b, mut c, mut d, mut e) = (h[0], h[1], h[2], h[3], h[4]);

    for (i, word) in w.iter().enumerate() {
        let (f, k) = match i {
            0..=19 => ((b & c) | ((!b) & d), 0x5A82_7999),
            20..=39 => (b ^ c ^ d, 0x6ED9_EBA1),
            40..=59 => ((b & c) | (b & d) | (c & d), 0x8F1B_BCDC),
            _ => (b ^ c ^ d, 0xCA62_C1D6),
        };
        let temp = a
            .rotate_left(5)
            .wrapping_add(f)
            .wrapping_add(e)
            .wrapping_add(k)
            .wrapping_add(*word);
        e = d;
        d = c;
        c = b.rotate_left(30);
        b = a;
        a = temp;
    }

    h[0] = h[0].wrapping_add(a);
    h[1] = h[1].wrapping_add(b);
    h[2] = h[2].wrapping_add(c);
    h[3] = h[3].wrapping_add(d);
    h[4] = h[4].wrapping_add(e);
}

// ── RSA-PSS verification ─────────────────────────────────────────────────────

/// Tries both public-key encodings the field population carries: PKCS#1
/// `RSAPublicKey` first, falling back to SPKI (`SubjectPublicKeyInfo`).
pub fn parse_public_key(der: &[u8]) -> Result<RsaPublicKey, IntegrityError> {
    RsaPublicKey::from_pkcs1_der(der)
        .or_else(|_| RsaPublicKey::from_public_key_der(der))
        .map_err(|_| IntegrityError::BadPublicKey)
}

/// Verifies `signature` over `digest` (a SHA-1 output) using RSA-PSS with
/// SHA-1 as both the digest and MGF1 hash, per the DWL envelope's signing
/// convention.
pub fn verify_signature(
    key: &RsaPublicKey,
    digest: &[u8; 20],
    signature: &[u8],
) -> Result<(), IntegrityError> {
    use rsa::pss::{Signature, VerifyingKey};
    use rsa::signature::hazmat::PrehashVerifier;

    let verifying_key = VerifyingKey::<Sha1Digest>::new(key.clone());
    let sig = Signature::try_from(signature).map_err(|_| IntegrityError::BadSignature)?;
    verifying_key
        .verify_prehash(digest, &sig)
        .map_err(|_| IntegrityError::SignatureMismatch)
}

#[derive(Debug, thiserror::Error)]
pub enum IntegrityError {
    #[error("package CRC-32 mismatch")]
    CrcMismatch,

    #[error("public key could not be decoded as PKCS#1 or SPKI DER")]
    BadPublicKey,

    #[error("malformed signature bytes")]
    BadSignature,

    #[error("RSA-PSS signature verification failed")]
    SignatureMismatch,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
