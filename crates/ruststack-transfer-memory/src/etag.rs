//! Entity tags in the object store's format.
//!
//! A single-request object or a part is tagged with the quoted hex MD5 of
//! its bytes. A multipart object is tagged with the MD5 of the concatenated
//! binary part digests, suffixed with `-<part count>`.

use digest::Digest;
use md5::Md5;

/// Digest of one stored body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyDigest {
    raw: [u8; 16],
}

impl BodyDigest {
    /// Hash `data`.
    #[must_use]
    pub fn of(data: &[u8]) -> Self {
        let mut raw = [0u8; 16];
        raw.copy_from_slice(&Md5::digest(data));
        Self { raw }
    }

    /// Quoted hex form used as an entity tag.
    ///
    /// # Examples
    ///
    /// ```
    /// use ruststack_transfer_memory::etag::BodyDigest;
    ///
    /// assert_eq!(
    ///     BodyDigest::of(b"hello").etag(),
    ///     "\"5d41402abc4b2a76b9719d911017c592\""
    /// );
    /// ```
    #[must_use]
    pub fn etag(&self) -> String {
        format!("\"{}\"", hex::encode(self.raw))
    }
}

/// Entity tag of an object assembled from `parts`, in part order.
///
/// # Examples
///
/// ```
/// use ruststack_transfer_memory::etag::{BodyDigest, composite_etag};
///
/// let etag = composite_etag(&[BodyDigest::of(b"a"), BodyDigest::of(b"b")]);
/// assert!(etag.starts_with('"'));
/// assert!(etag.ends_with("-2\""));
/// ```
#[must_use]
pub fn composite_etag(parts: &[BodyDigest]) -> String {
    let mut hasher = Md5::new();
    for part in parts {
        hasher.update(part.raw);
    }
    format!("\"{}-{}\"", hex::encode(hasher.finalize()), parts.len())
}
