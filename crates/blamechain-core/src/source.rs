//! Source kinds: the closed set of record types the ledger may wrap.
//!
//! Each kind owns its own live-content table in the backing store. Because
//! the set is an enum, a caller cannot point the ledger at an arbitrary table;
//! free-form strings only enter through [`SourceKind::from_str`], which
//! rejects anything outside the allow-list.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::Error;

/// The kind of record a revision chain belongs to.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
  /// A message posted in a chat room.
  ChatMessage,
  /// A stored conversation transcript.
  Transcript,
  /// A private message between two users.
  DirectMessage,
}

impl SourceKind {
  /// Every supported kind, in declaration order.
  pub const ALL: [SourceKind; 3] =
    [Self::ChatMessage, Self::Transcript, Self::DirectMessage];

  /// The discriminant string stored in the `source_kind` column.
  /// Must match the `rename_all = "snake_case"` serde tags above.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::ChatMessage => "chat_message",
      Self::Transcript => "transcript",
      Self::DirectMessage => "direct_message",
    }
  }
}

impl fmt::Display for SourceKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for SourceKind {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::ALL
      .into_iter()
      .find(|k| k.as_str() == s)
      .ok_or_else(|| Error::UnknownSourceKind(s.to_owned()))
  }
}

/// Identifies one record, and therefore one revision chain.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct RecordKey {
  pub source_kind: SourceKind,
  pub record_id:   i64,
}

impl RecordKey {
  pub fn new(source_kind: SourceKind, record_id: i64) -> Self {
    Self { source_kind, record_id }
  }
}

impl fmt::Display for RecordKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.source_kind, self.record_id)
  }
}
