//! Chain verification as a pure recomputation of every link.
//!
//! Nothing stored is trusted. For each revision the verifier recomputes the
//! content digest from `content`, derives the expected `previous_hash` from
//! its own recomputation of the predecessor (or [`GENESIS`] for version 1),
//! and rebuilds the chain digest from those values and `created_at`. A single
//! edited revision therefore invalidates itself and every revision after it.

use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  hashing::{self, GENESIS, HashAlgorithm, digests_match},
  revision::Revision,
  source::RecordKey,
};

/// Outcome of checking one revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionCheck {
  pub version_number:              u32,
  /// Stored `content_hash` equals `H(content)`.
  pub content_hash_valid:          bool,
  /// Stored `chain_hash` equals the digest rebuilt from recomputed inputs.
  pub chain_hash_valid:            bool,
  /// Stored `previous_hash` equals GENESIS (v1) or the recomputed chain
  /// digest of the predecessor.
  pub previous_hash_linkage_valid: bool,
  /// Version number is contiguous, the revision belongs to this chain, and
  /// `created_at` does not precede the predecessor's.
  pub sequence_valid:              bool,
  /// Written with the digest the rest of the chain is verified under.
  pub algorithm_valid:             bool,
  pub recomputed_content_hash:     String,
  pub recomputed_chain_hash:       String,
}

impl VersionCheck {
  pub fn is_valid(&self) -> bool {
    self.content_hash_valid
      && self.chain_hash_valid
      && self.previous_hash_linkage_valid
      && self.sequence_valid
      && self.algorithm_valid
  }
}

/// Result of verifying a whole chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainReport {
  pub key:              RecordKey,
  pub hash_algorithm:   HashAlgorithm,
  pub length:           u32,
  /// AND of every per-version check.
  pub chain_valid:      bool,
  /// Earliest version with any failing check.
  pub divergence_point: Option<u32>,
  pub versions:         Vec<VersionCheck>,
}

impl ChainReport {
  /// Turn an invalid report into [`Error::ChainIntegrityViolation`].
  pub fn ensure_intact(self) -> Result<Self> {
    match self.divergence_point {
      Some(divergence_point) => Err(Error::ChainIntegrityViolation {
        key: self.key,
        divergence_point,
      }),
      None => Ok(self),
    }
  }
}

/// Verify `revisions` (ordered by version) as the chain of `key`.
///
/// Returns [`Error::ChainNotFound`] for an empty chain and
/// [`Error::HashAlgorithmMismatch`] if every revision was written with one
/// digest other than `algorithm`. A chain that mixes digests is not a
/// deployment error: the odd revisions fail `algorithm_valid` and the report
/// diverges there.
pub fn verify_chain(
  algorithm: HashAlgorithm,
  key: RecordKey,
  revisions: &[Revision],
) -> Result<ChainReport> {
  if revisions.is_empty() {
    return Err(Error::ChainNotFound(key));
  }

  let first = &revisions[0];
  if first.hash_algorithm != algorithm
    && revisions.iter().all(|r| r.hash_algorithm == first.hash_algorithm)
  {
    return Err(Error::HashAlgorithmMismatch {
      key,
      version: first.version_number,
      stored: first.hash_algorithm,
      configured: algorithm,
    });
  }

  let mut versions = Vec::with_capacity(revisions.len());
  let mut expected_previous = GENESIS.to_owned();
  let mut previous: Option<&Revision> = None;

  for (idx, rev) in revisions.iter().enumerate() {
    let expected_version = u32::try_from(idx + 1).unwrap_or(u32::MAX);

    let recomputed_content_hash = hashing::content_hash(algorithm, &rev.content);
    let recomputed_chain_hash = hashing::chain_hash(
      algorithm,
      &expected_previous,
      &recomputed_content_hash,
      rev.created_at,
    );

    let sequence_valid = rev.key == key
      && rev.version_number == expected_version
      && previous.is_none_or(|p| rev.created_at >= p.created_at);

    versions.push(VersionCheck {
      version_number: rev.version_number,
      content_hash_valid: digests_match(&rev.content_hash, &recomputed_content_hash),
      chain_hash_valid: digests_match(&rev.chain_hash, &recomputed_chain_hash),
      previous_hash_linkage_valid: digests_match(&rev.previous_hash, &expected_previous),
      sequence_valid,
      algorithm_valid: rev.hash_algorithm == algorithm,
      recomputed_content_hash,
      recomputed_chain_hash: recomputed_chain_hash.clone(),
    });

    expected_previous = recomputed_chain_hash;
    previous = Some(rev);
  }

  let divergence_point = versions
    .iter()
    .find(|v| !v.is_valid())
    .map(|v| v.version_number);

  Ok(ChainReport {
    key,
    hash_algorithm: algorithm,
    length: u32::try_from(revisions.len()).unwrap_or(u32::MAX),
    chain_valid: divergence_point.is_none(),
    divergence_point,
    versions,
  })
}
