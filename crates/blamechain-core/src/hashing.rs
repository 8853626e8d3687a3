//! The hashing primitive shared by the append and verification paths.
//!
//! Every digest the ledger writes or checks goes through [`content_hash`] and
//! [`chain_hash`]. There is no other place that knows how a chain link is
//! built, so the two engines cannot drift apart.
//!
//! ```text
//! content_hash = H(content)
//! chain_hash   = H(previous_hash || 0x00 || content_hash || 0x00 || created_at_micros_le)
//! ```
//!
//! Digests are lowercase hex strings.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use subtle::ConstantTimeEq as _;

/// Sentinel `previous_hash` of version 1 of every chain.
pub const GENESIS: &str = "GENESIS";

/// Digest algorithm used to build a chain. Stored on every revision so that a
/// verifier configured differently fails loudly instead of reporting tamper.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
  #[default]
  Sha256,
  Sha512,
}

impl HashAlgorithm {
  /// Identifier stored in the `hash_algorithm` column.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Sha256 => "sha256",
      Self::Sha512 => "sha512",
    }
  }

  /// Inverse of [`HashAlgorithm::as_str`].
  pub fn from_id(s: &str) -> Option<Self> {
    match s {
      "sha256" => Some(Self::Sha256),
      "sha512" => Some(Self::Sha512),
      _ => None,
    }
  }

  fn digest(self, parts: &[&[u8]]) -> String {
    match self {
      Self::Sha256 => digest_with::<Sha256>(parts),
      Self::Sha512 => digest_with::<Sha512>(parts),
    }
  }
}

impl fmt::Display for HashAlgorithm {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

fn digest_with<D: Digest>(parts: &[&[u8]]) -> String {
  let mut hasher = D::new();
  for part in parts {
    hasher.update(part);
  }
  hex::encode(hasher.finalize())
}

/// Digest of a revision's content alone.
pub fn content_hash(algorithm: HashAlgorithm, content: &str) -> String {
  algorithm.digest(&[content.as_bytes()])
}

/// Digest binding a revision to its predecessor and its timestamp.
///
/// `created_at` contributes its microsecond Unix timestamp, which is the
/// precision the ledger stores. Pass timestamps through
/// [`canonical_timestamp`] before hashing them for the first time.
pub fn chain_hash(
  algorithm: HashAlgorithm,
  previous_hash: &str,
  content_hash: &str,
  created_at: DateTime<Utc>,
) -> String {
  algorithm.digest(&[
    previous_hash.as_bytes(),
    &[0],
    content_hash.as_bytes(),
    &[0],
    &created_at.timestamp_micros().to_le_bytes(),
  ])
}

/// Truncate `dt` to the microsecond precision that storage preserves.
pub fn canonical_timestamp(dt: DateTime<Utc>) -> DateTime<Utc> {
  DateTime::from_timestamp_micros(dt.timestamp_micros()).unwrap_or(dt)
}

/// Constant-time comparison of two hex digests.
pub fn digests_match(a: &str, b: &str) -> bool {
  a.len() == b.len() && bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}
