//! [`SqliteStore`]: the SQLite implementation of [`LedgerStore`].

use std::path::Path;

use blamechain_core::{
  evidence::{DisputeStatus, EvidenceBundle, RevisionFlag},
  revision::Revision,
  source::RecordKey,
  store::{AppendCommit, CommitOutcome, ContentStore, LedgerStore, TransitionOutcome},
};
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use tracing::debug;
use uuid::Uuid;

use crate::{
  Result,
  encode::{
    BUNDLE_COLUMNS, REVISION_COLUMNS, RawBundle, RawFlag, RawRevision,
    content_table, decode_status, encode_dt, encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Blamechain ledger backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run a revision query filtered by `key` and decode every row.
  async fn query_revisions(
    &self,
    key: RecordKey,
    tail: &'static str,
    extra: Option<u32>,
  ) -> Result<Vec<Revision>> {
    let kind = key.source_kind.as_str();
    let record_id = key.record_id;

    let raws: Vec<RawRevision> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {REVISION_COLUMNS} FROM revisions
           WHERE source_kind = ?1 AND record_id = ?2 {tail}"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = match extra {
          Some(v) => stmt
            .query_map(rusqlite::params![kind, record_id, v], RawRevision::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?,
          None => stmt
            .query_map(rusqlite::params![kind, record_id], RawRevision::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?,
        };
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRevision::into_revision).collect()
  }
}

/// Owned column values for one `revisions` insert.
struct RevisionParams {
  version_number: u32,
  content:        String,
  editor_id:      Option<String>,
  edit_reason:    Option<String>,
  created_at:     String,
  content_hash:   String,
  previous_hash:  String,
  chain_hash:     String,
  hash_algorithm: &'static str,
}

impl From<Revision> for RevisionParams {
  fn from(r: Revision) -> Self {
    Self {
      version_number: r.version_number,
      created_at:     encode_dt(r.created_at),
      hash_algorithm: r.hash_algorithm.as_str(),
      content:        r.content,
      editor_id:      r.editor_id,
      edit_reason:    r.edit_reason,
      content_hash:   r.content_hash,
      previous_hash:  r.previous_hash,
      chain_hash:     r.chain_hash,
    }
  }
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
  matches!(
    e,
    rusqlite::Error::SqliteFailure(f, _)
      if f.code == rusqlite::ErrorCode::ConstraintViolation
  )
}

// ─── ContentStore impl ───────────────────────────────────────────────────────

impl ContentStore for SqliteStore {
  type Error = crate::Error;

  async fn read_content(&self, key: RecordKey) -> Result<Option<String>> {
    let table = content_table(key.source_kind);
    let id = key.record_id;

    let content = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT content FROM {table} WHERE id = ?1"),
              rusqlite::params![id],
              |row| row.get(0),
            )
            .optional()?,
        )
      })
      .await?;
    Ok(content)
  }

  async fn create_record(&self, key: RecordKey, content: String) -> Result<bool> {
    let table = content_table(key.source_kind);
    let kind = key.source_kind.as_str();
    let id = key.record_id;
    let at_str = encode_dt(Utc::now());

    let inserted = self
      .conn
      .call(move |conn| {
        // One statement, so no append can slip in between check and insert.
        let n = conn.execute(
          &format!(
            "INSERT OR IGNORE INTO {table} (id, content, updated_at)
             SELECT ?1, ?2, ?3
             WHERE NOT EXISTS (
               SELECT 1 FROM revisions WHERE source_kind = ?4 AND record_id = ?1
             )"
          ),
          rusqlite::params![id, content, at_str, kind],
        )?;
        Ok(n == 1)
      })
      .await?;
    Ok(inserted)
  }

  async fn delete_record(&self, key: RecordKey) -> Result<bool> {
    let table = content_table(key.source_kind);
    let id = key.record_id;

    let deleted = self
      .conn
      .call(move |conn| {
        let n = conn.execute(
          &format!("DELETE FROM {table} WHERE id = ?1"),
          rusqlite::params![id],
        )?;
        Ok(n == 1)
      })
      .await?;
    Ok(deleted)
  }
}

// ─── LedgerStore impl ────────────────────────────────────────────────────────

impl LedgerStore for SqliteStore {
  // ── Revisions ─────────────────────────────────────────────────────────────

  async fn latest_revision(&self, key: RecordKey) -> Result<Option<Revision>> {
    let mut rows = self
      .query_revisions(key, "ORDER BY version_number DESC LIMIT 1", None)
      .await?;
    Ok(rows.pop())
  }

  async fn revisions(&self, key: RecordKey) -> Result<Vec<Revision>> {
    self
      .query_revisions(key, "ORDER BY version_number ASC", None)
      .await
  }

  async fn revision(
    &self,
    key: RecordKey,
    version_number: u32,
  ) -> Result<Option<Revision>> {
    let mut rows = self
      .query_revisions(key, "AND version_number = ?3", Some(version_number))
      .await?;
    Ok(rows.pop())
  }

  async fn commit_append(&self, commit: AppendCommit) -> Result<CommitOutcome> {
    let AppendCommit { key, expected_tip, revisions, content } = commit;
    let table     = content_table(key.source_kind);
    let kind      = key.source_kind.as_str();
    let record_id = key.record_id;
    let expected  = expected_tip.map(|t| (t.version_number, t.chain_hash));
    let rows: Vec<RevisionParams> =
      revisions.into_iter().map(RevisionParams::from).collect();
    let at_str    = encode_dt(Utc::now());

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let exists = tx
          .query_row(
            &format!("SELECT 1 FROM {table} WHERE id = ?1"),
            rusqlite::params![record_id],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if !exists {
          return Ok(CommitOutcome::RecordMissing);
        }

        let tip: Option<(u32, String)> = tx
          .query_row(
            "SELECT version_number, chain_hash FROM revisions
             WHERE source_kind = ?1 AND record_id = ?2
             ORDER BY version_number DESC LIMIT 1",
            rusqlite::params![kind, record_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
          )
          .optional()?;
        if tip != expected {
          return Ok(CommitOutcome::Conflict);
        }

        for row in &rows {
          let inserted = tx.execute(
            &format!(
              "INSERT INTO revisions ({REVISION_COLUMNS})
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
            ),
            rusqlite::params![
              kind,
              record_id,
              row.version_number,
              row.content,
              row.editor_id,
              row.edit_reason,
              row.created_at,
              row.content_hash,
              row.previous_hash,
              row.chain_hash,
              row.hash_algorithm,
            ],
          );
          match inserted {
            Ok(_) => {}
            Err(e) if is_constraint_violation(&e) => {
              return Ok(CommitOutcome::Conflict);
            }
            Err(e) => return Err(e.into()),
          }
        }

        tx.execute(
          &format!("UPDATE {table} SET content = ?1, updated_at = ?2 WHERE id = ?3"),
          rusqlite::params![content, at_str, record_id],
        )?;

        tx.commit()?;
        Ok(CommitOutcome::Committed)
      })
      .await?;

    if outcome != CommitOutcome::Committed {
      debug!(%key, ?outcome, "append commit rejected");
    }
    Ok(outcome)
  }

  // ── Evidence ──────────────────────────────────────────────────────────────

  async fn insert_bundle(&self, bundle: EvidenceBundle) -> Result<()> {
    let id_str        = encode_uuid(bundle.bundle_id);
    let kind          = bundle.snapshot.key.source_kind.as_str();
    let record_id     = bundle.snapshot.key.record_id;
    let snapshot_json = serde_json::to_string(&bundle.snapshot)?;
    let digest        = bundle.snapshot_digest;
    let status        = bundle.status.as_str();
    let at_str        = encode_dt(bundle.status_changed_at);
    let notes         = bundle.resolution_notes;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO evidence_bundles (
             bundle_id, source_kind, record_id, snapshot_json, snapshot_digest,
             status, status_changed_at, resolution_notes
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            id_str,
            kind,
            record_id,
            snapshot_json,
            digest,
            status,
            at_str,
            notes,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_bundle(&self, bundle_id: Uuid) -> Result<Option<EvidenceBundle>> {
    let id_str = encode_uuid(bundle_id);

    let raw: Option<RawBundle> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {BUNDLE_COLUMNS} FROM evidence_bundles WHERE bundle_id = ?1"),
              rusqlite::params![id_str],
              RawBundle::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawBundle::into_bundle).transpose()
  }

  async fn transition_bundle(
    &self,
    bundle_id: Uuid,
    from:      DisputeStatus,
    to:        DisputeStatus,
    at:        DateTime<Utc>,
    notes:     Option<String>,
  ) -> Result<TransitionOutcome> {
    let id_str   = encode_uuid(bundle_id);
    let from_str = from.as_str();
    let to_str   = to.as_str();
    let at_str   = encode_dt(at);

    let (updated, raw): (bool, Option<RawBundle>) = self
      .conn
      .call(move |conn| {
        let n = conn.execute(
          "UPDATE evidence_bundles
           SET status = ?1,
               status_changed_at = ?2,
               resolution_notes = COALESCE(?3, resolution_notes)
           WHERE bundle_id = ?4 AND status = ?5",
          rusqlite::params![to_str, at_str, notes, id_str, from_str],
        )?;
        let raw = conn
          .query_row(
            &format!("SELECT {BUNDLE_COLUMNS} FROM evidence_bundles WHERE bundle_id = ?1"),
            rusqlite::params![id_str],
            RawBundle::from_row,
          )
          .optional()?;
        Ok((n == 1, raw))
      })
      .await?;

    Ok(match (updated, raw) {
      (_, None) => TransitionOutcome::NotFound,
      (true, Some(raw)) => TransitionOutcome::Applied(raw.into_bundle()?),
      (false, Some(raw)) => {
        TransitionOutcome::StatusChanged(decode_status(&raw.status)?)
      }
    })
  }

  async fn flag_revisions(
    &self,
    bundle_id: Uuid,
    key:       RecordKey,
    versions:  Vec<u32>,
    at:        DateTime<Utc>,
  ) -> Result<Vec<RevisionFlag>> {
    let id_str    = encode_uuid(bundle_id);
    let kind      = key.source_kind.as_str();
    let record_id = key.record_id;
    let at_str    = encode_dt(at);

    let raws: Vec<RawFlag> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut insert = tx.prepare(
            "INSERT OR IGNORE INTO revision_flags
               (source_kind, record_id, version_number, bundle_id, flagged_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
          )?;
          for v in versions {
            insert.execute(rusqlite::params![kind, record_id, v, id_str, at_str])?;
          }
        }

        let rows = {
          let mut stmt = tx.prepare(
            "SELECT source_kind, record_id, version_number, bundle_id, flagged_at
             FROM revision_flags
             WHERE bundle_id = ?1 AND source_kind = ?2 AND record_id = ?3
             ORDER BY version_number",
          )?;
          stmt
            .query_map(rusqlite::params![id_str, kind, record_id], RawFlag::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };

        tx.commit()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawFlag::into_flag).collect()
  }

  async fn revision_flags(&self, key: RecordKey) -> Result<Vec<RevisionFlag>> {
    let kind      = key.source_kind.as_str();
    let record_id = key.record_id;

    let raws: Vec<RawFlag> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT source_kind, record_id, version_number, bundle_id, flagged_at
           FROM revision_flags
           WHERE source_kind = ?1 AND record_id = ?2
           ORDER BY version_number, flagged_at",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![kind, record_id], RawFlag::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawFlag::into_flag).collect()
  }
}
