//! Content hashes used to name thunks and path roots.

use std::fmt::Write as _;

use base64::Engine as _;
use sha2::{
   Digest as _,
   Sha256,
};

/// A short hash that does not vary across hosts: the URL-safe base64 of the
/// first 8 bytes of the SHA-256 of the input.
#[must_use]
pub fn short(bytes: &[u8]) -> String {
   let digest = Sha256::digest(bytes);

   base64::engine::general_purpose::URL_SAFE.encode(&digest[..8])
}

/// The lowercase hex SHA-256 of the input.
#[must_use]
pub fn sha256(bytes: &[u8]) -> String {
   let digest = Sha256::digest(bytes);

   let mut hex = String::with_capacity(64);
   for byte in digest.iter() {
      let _ = write!(hex, "{byte:02x}");
   }

   hex
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn short_is_stable_and_url_safe() {
      let hash = short(b"/home/user/project");

      assert_eq!(hash, short(b"/home/user/project"));
      assert_ne!(hash, short(b"/home/user/other"));
      // 8 bytes pad out to 12 characters.
      assert_eq!(hash.len(), 12);
      assert!(!hash.contains('/') && !hash.contains('+'));

      assert_eq!(short(b""), "47DEQpj8HBQ=");
   }

   #[test]
   fn sha256_hex() {
      assert_eq!(
         sha256(b""),
         "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
      );
   }
}
