//! Content digest used for every comparison in the workspace.
//!
//! Checksum manifests are produced by `md5sum`, so the digest is MD5 rendered
//! as lowercase hex. Comparison is plain string equality.

use md5::{Digest, Md5};

/// Lowercase hex MD5 of `bytes`.
///
/// # Examples
/// ```
/// # use common::digest::content_digest;
/// assert_eq!(content_digest(b""), "d41d8cd98f00b204e9800998ecf8427e");
/// ```
pub fn content_digest(bytes: &[u8]) -> String {
    hex::encode(Md5::digest(bytes))
}
