//! Authenticated handshake (spec §4.9). Both endpoints hold a
//! pre-shared root secret out of band. A session key is derived once via
//! HKDF-SHA256 from that secret; `LINK_SYNC_RESP` proves possession of it
//! by tagging the nonce the peer sent in `LINK_SYNC` with
//! HMAC-SHA256(key, nonce), truncated to 16 bytes. An empty secret skips
//! the tag entirely (development/non-authenticated mode).
//!
//! `hkdf`/`hmac`/`sha2`/`zeroize` here mirror the way the pack's own ECDH
//! reference derives and scrubs a session key: `Hkdf::<Sha256>::new`,
//! then `expand` into a fixed buffer, `Zeroize`d once consumed.

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::consts::{HANDSHAKE_TAG_LEN, HKDF_INFO, HKDF_SALT};
use crate::error::CryptoError;

type HmacSha256 = Hmac<Sha256>;

const SESSION_KEY_LEN: usize = 32;

/// A session key derived from the root secret. `Drop` zeroizes the key
/// material so it never lingers in memory past the handshake frames
/// that needed it.
pub struct SessionKey {
    bytes: [u8; SESSION_KEY_LEN],
}

impl Drop for SessionKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl SessionKey {
    /// Derives the session key via HKDF-SHA256 extract+expand (RFC
    /// 5869) over `root_secret`, with the canonical salt/info strings
    /// frozen for this protocol version.
    pub fn derive(root_secret: &[u8]) -> Self {
        let hk = Hkdf::<Sha256>::new(Some(HKDF_SALT), root_secret);
        let mut okm = [0u8; SESSION_KEY_LEN];
        // `okm` is exactly one HMAC-SHA256 output wide, well under
        // HKDF-SHA256's 255*32-byte expand limit; `expand` cannot fail here.
        hk.expand(HKDF_INFO, &mut okm)
            .expect("expand length is within HKDF-SHA256's output limit");

        let key = SessionKey { bytes: okm };
        okm.zeroize();
        key
    }

    /// Computes the handshake tag: the first `HANDSHAKE_TAG_LEN` bytes
    /// of HMAC-SHA256(key, nonce).
    pub fn tag(&self, nonce: &[u8]) -> [u8; HANDSHAKE_TAG_LEN] {
        let mut mac = HmacSha256::new_from_slice(&self.bytes).expect("HMAC accepts any key length");
        mac.update(nonce);
        let full = mac.finalize().into_bytes();
        let mut tag = [0u8; HANDSHAKE_TAG_LEN];
        tag.copy_from_slice(&full[..HANDSHAKE_TAG_LEN]);
        tag
    }

    /// Verifies the truncated `tag` against `nonce` in constant time.
    /// `tag` holds only the left `HANDSHAKE_TAG_LEN` bytes of the full
    /// HMAC-SHA256 output (see `tag` above), so this uses `hmac`'s own
    /// `verify_truncated_left` rather than `verify_slice`, which requires
    /// a full-width tag.
    pub fn verify(&self, nonce: &[u8], tag: &[u8; HANDSHAKE_TAG_LEN]) -> Result<(), CryptoError> {
        let mut mac = HmacSha256::new_from_slice(&self.bytes).expect("HMAC accepts any key length");
        mac.update(nonce);
        mac.verify_truncated_left(tag).map_err(|_| CryptoError::TagMismatch)
    }
}

/// Known-answer self-test run once at startup (spec §4.9: "a POST
/// exercises SHA-256 and HMAC-SHA256 against fixed vectors before the
/// handshake may begin"). Failure means the crypto primitives are
/// broken on this target and the link must refuse to synchronize.
pub fn power_on_self_test() -> Result<(), CryptoError> {
    // FIPS 180-4 SHA-256 test vector: SHA-256("abc").
    let digest = Sha256::digest(b"abc");
    const EXPECTED_SHA256_ABC: [u8; 32] = [
        0xba, 0x78, 0x16, 0xbf, 0x8f, 0x01, 0xcf, 0xea, 0x41, 0x41, 0x40, 0xde, 0x5d, 0xae, 0x22,
        0x23, 0xb0, 0x03, 0x61, 0xa3, 0x96, 0x17, 0x7a, 0x9c, 0xb4, 0x10, 0xff, 0x61, 0xf2, 0x00,
        0x15, 0xad,
    ];
    if digest.as_slice() != EXPECTED_SHA256_ABC {
        return Err(CryptoError::SelfTestFailed);
    }

    // RFC 4231 test case 1: HMAC-SHA256 with a 20-byte key of 0x0b and
    // data b"Hi There".
    let key = [0x0bu8; 20];
    let mut mac = HmacSha256::new_from_slice(&key).expect("HMAC accepts any key length");
    mac.update(b"Hi There");
    const EXPECTED_HMAC: [u8; 32] = [
        0xb0, 0x34, 0x4c, 0x61, 0xd8, 0xdb, 0x38, 0x53, 0x5c, 0xa8, 0xaf, 0xce, 0xaf, 0x0b, 0xf1,
        0x2b, 0x88, 0x1d, 0xc2, 0x00, 0xc9, 0x83, 0x3d, 0xa7, 0x26, 0xe9, 0x37, 0x6c, 0x2e, 0x32,
        0xcf, 0xf7,
    ];
    mac.verify_slice(&EXPECTED_HMAC)
        .map_err(|_| CryptoError::SelfTestFailed)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_test_passes_against_fixed_vectors() {
        assert_eq!(power_on_self_test(), Ok(()));
    }

    #[test]
    fn derive_is_deterministic_for_the_same_secret() {
        let a = SessionKey::derive(b"test_secret");
        let b = SessionKey::derive(b"test_secret");
        assert_eq!(a.tag(b"nonce-bytes-1234"), b.tag(b"nonce-bytes-1234"));
    }

    #[test]
    fn tag_verifies_against_itself() {
        let key = SessionKey::derive(b"test_secret");
        let nonce = [0x01u8; 16];
        let tag = key.tag(&nonce);
        assert!(key.verify(&nonce, &tag).is_ok());
    }

    #[test]
    fn tampered_nonce_fails_verification() {
        let key = SessionKey::derive(b"test_secret");
        let tag = key.tag(&[0x01u8; 16]);
        assert_eq!(
            key.verify(&[0x02u8; 16], &tag),
            Err(CryptoError::TagMismatch)
        );
    }
}
