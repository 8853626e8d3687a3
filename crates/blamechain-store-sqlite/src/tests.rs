//! Integration tests for `SqliteStore` and the ledger engine against an
//! in-memory database.

use std::{collections::HashSet, sync::Arc};

use blamechain_core::{
  Error as CoreError,
  evidence::{DisputeStatus, Verdict},
  hashing::GENESIS,
  ledger::{BOOTSTRAP_REASON, Ledger, LedgerConfig},
  revision::{NewEdit, Revision, RevisionContent},
  source::{RecordKey, SourceKind},
  store::{AppendCommit, CommitOutcome, ContentStore, LedgerStore},
};
use chrono::Utc;
use uuid::Uuid;

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

async fn ledger() -> Ledger<SqliteStore> {
  Ledger::new(Arc::new(store().await), LedgerConfig::default())
}

fn r1() -> RecordKey { RecordKey::new(SourceKind::ChatMessage, 1) }

/// Overwrite a stored revision's content, bypassing the append-only triggers.
async fn tamper_content(store: &SqliteStore, key: RecordKey, version: u32, content: &str) {
  let content = content.to_owned();
  store
    .conn
    .call(move |conn| {
      conn.execute_batch("DROP TRIGGER revisions_no_update;")?;
      conn.execute(
        "UPDATE revisions SET content = ?1
         WHERE source_kind = ?2 AND record_id = ?3 AND version_number = ?4",
        rusqlite::params![content, key.source_kind.as_str(), key.record_id, version],
      )?;
      Ok(())
    })
    .await
    .unwrap();
}

// ─── Content store ───────────────────────────────────────────────────────────

#[tokio::test]
async fn create_and_read_record() {
  let s = store().await;
  assert!(s.create_record(r1(), "hi".into()).await.unwrap());
  assert_eq!(s.read_content(r1()).await.unwrap().as_deref(), Some("hi"));
}

#[tokio::test]
async fn create_record_twice_is_rejected() {
  let s = store().await;
  assert!(s.create_record(r1(), "hi".into()).await.unwrap());
  assert!(!s.create_record(r1(), "again".into()).await.unwrap());
  assert_eq!(s.read_content(r1()).await.unwrap().as_deref(), Some("hi"));
}

#[tokio::test]
async fn deleted_record_cannot_be_recreated_over_its_chain() {
  let l = ledger().await;
  l.store().create_record(r1(), "a".into()).await.unwrap();
  l.append(NewEdit::new(r1(), "b")).await.unwrap();
  l.store().delete_record(r1()).await.unwrap();

  assert!(!l.store().create_record(r1(), "resurrected".into()).await.unwrap());
  assert!(l.store().read_content(r1()).await.unwrap().is_none());
  assert!(matches!(
    l.append(NewEdit::new(r1(), "c")).await.unwrap_err(),
    CoreError::RecordNotFound(_)
  ));

  let history: Vec<String> = l
    .history(r1())
    .await
    .unwrap()
    .into_iter()
    .map(|r| r.content)
    .collect();
  assert_eq!(history, ["a", "b"]);
}

#[tokio::test]
async fn deleted_record_without_chain_can_be_recreated() {
  let s = store().await;
  s.create_record(r1(), "a".into()).await.unwrap();
  s.delete_record(r1()).await.unwrap();
  assert!(s.create_record(r1(), "b".into()).await.unwrap());
  assert_eq!(s.read_content(r1()).await.unwrap().as_deref(), Some("b"));
}

#[tokio::test]
async fn source_kinds_are_separate_namespaces() {
  let s = store().await;
  s.create_record(RecordKey::new(SourceKind::ChatMessage, 5), "chat".into())
    .await
    .unwrap();
  s.create_record(RecordKey::new(SourceKind::Transcript, 5), "transcript".into())
    .await
    .unwrap();

  assert_eq!(
    s.read_content(RecordKey::new(SourceKind::ChatMessage, 5)).await.unwrap().as_deref(),
    Some("chat")
  );
  assert_eq!(
    s.read_content(RecordKey::new(SourceKind::Transcript, 5)).await.unwrap().as_deref(),
    Some("transcript")
  );
  assert!(
    s.read_content(RecordKey::new(SourceKind::DirectMessage, 5))
      .await
      .unwrap()
      .is_none()
  );
}

// ─── Append ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn first_edit_yields_two_revisions() {
  let l = ledger().await;
  l.store().create_record(r1(), "".into()).await.unwrap();

  let rev = l
    .append(NewEdit::new(r1(), "hello").by("alice").because("typo"))
    .await
    .unwrap();
  assert_eq!(rev.version_number, 2);
  assert_eq!(rev.editor_id.as_deref(), Some("alice"));

  let history = l.history(r1()).await.unwrap();
  assert_eq!(history.len(), 2);

  let v1 = &history[0];
  assert_eq!(v1.version_number, 1);
  assert_eq!(v1.content, "");
  assert_eq!(v1.editor_id, None);
  assert_eq!(v1.edit_reason.as_deref(), Some(BOOTSTRAP_REASON));
  assert_eq!(v1.previous_hash, GENESIS);

  assert_eq!(history[1], rev);
  assert_eq!(rev.previous_hash, v1.chain_hash);
  assert_eq!(
    l.store().read_content(r1()).await.unwrap().as_deref(),
    Some("hello")
  );
}

#[tokio::test]
async fn later_edits_add_one_revision_each() {
  let l = ledger().await;
  l.store().create_record(r1(), "a".into()).await.unwrap();

  for (i, text) in ["b", "c", "d"].iter().enumerate() {
    let rev = l.append(NewEdit::new(r1(), *text)).await.unwrap();
    assert_eq!(rev.version_number as usize, i + 2);
  }
  assert_eq!(l.history(r1()).await.unwrap().len(), 4);
}

#[tokio::test]
async fn editing_unknown_record_fails() {
  let l = ledger().await;
  let err = l.append(NewEdit::new(r1(), "x")).await.unwrap_err();
  assert!(matches!(err, CoreError::RecordNotFound(k) if k == r1()));
  assert!(l.history(r1()).await.unwrap().is_empty());
}

#[tokio::test]
async fn deleting_record_keeps_history() {
  let l = ledger().await;
  l.store().create_record(r1(), "a".into()).await.unwrap();
  l.append(NewEdit::new(r1(), "b")).await.unwrap();

  assert!(l.store().delete_record(r1()).await.unwrap());
  assert!(l.store().read_content(r1()).await.unwrap().is_none());

  let err = l.append(NewEdit::new(r1(), "c")).await.unwrap_err();
  assert!(matches!(err, CoreError::RecordNotFound(_)));

  let report = l.verify(r1()).await.unwrap();
  assert!(report.chain_valid);
  assert_eq!(report.length, 2);
}

#[tokio::test]
async fn revision_lookup_by_version() {
  let l = ledger().await;
  l.store().create_record(r1(), "a".into()).await.unwrap();
  l.append(NewEdit::new(r1(), "b")).await.unwrap();

  let v1 = l.revision(r1(), 1).await.unwrap().unwrap();
  assert_eq!(v1.content, "a");
  assert!(l.revision(r1(), 3).await.unwrap().is_none());
}

#[tokio::test]
async fn stale_commit_is_a_conflict_and_writes_nothing() {
  let s = store().await;
  s.create_record(r1(), "a".into()).await.unwrap();

  let alg = LedgerConfig::default().hash_algorithm;
  let v1 = Revision::link(alg, r1(), None, RevisionContent {
    content: "a".into(),
    ..Default::default()
  }, Utc::now()).unwrap();
  let v2 = Revision::link(alg, r1(), Some(&v1.tip()), RevisionContent {
    content: "b".into(),
    ..Default::default()
  }, Utc::now()).unwrap();

  let first = s
    .commit_append(AppendCommit {
      key:          r1(),
      expected_tip: None,
      revisions:    vec![v1.clone(), v2.clone()],
      content:      "b".into(),
    })
    .await
    .unwrap();
  assert_eq!(first, CommitOutcome::Committed);

  // A second writer that also read "no chain yet".
  let rival = Revision::link(alg, r1(), None, RevisionContent {
    content: "a".into(),
    ..Default::default()
  }, Utc::now()).unwrap();
  let second = s
    .commit_append(AppendCommit {
      key:          r1(),
      expected_tip: None,
      revisions:    vec![rival],
      content:      "rival".into(),
    })
    .await
    .unwrap();
  assert_eq!(second, CommitOutcome::Conflict);

  // A writer linked against v1 after v2 landed.
  let late = Revision::link(alg, r1(), Some(&v1.tip()), RevisionContent {
    content: "late".into(),
    ..Default::default()
  }, Utc::now()).unwrap();
  let third = s
    .commit_append(AppendCommit {
      key:          r1(),
      expected_tip: Some(v1.tip()),
      revisions:    vec![late],
      content:      "late".into(),
    })
    .await
    .unwrap();
  assert_eq!(third, CommitOutcome::Conflict);

  assert_eq!(s.revisions(r1()).await.unwrap(), vec![v1, v2]);
  assert_eq!(s.read_content(r1()).await.unwrap().as_deref(), Some("b"));
}

#[tokio::test]
async fn revisions_table_rejects_update_and_delete() {
  let l = ledger().await;
  l.store().create_record(r1(), "a".into()).await.unwrap();
  l.append(NewEdit::new(r1(), "b")).await.unwrap();

  let (update, delete) = l
    .store()
    .conn
    .call(|conn| {
      let update = conn.execute("UPDATE revisions SET content = 'x'", []);
      let delete = conn.execute("DELETE FROM revisions", []);
      Ok((update.is_err(), delete.is_err()))
    })
    .await
    .unwrap();
  assert!(update);
  assert!(delete);
  assert!(l.verify(r1()).await.unwrap().chain_valid);
}

// ─── Concurrency ─────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_appends_form_one_linear_chain() {
  const EDITORS: usize = 16;

  let l = Arc::new(ledger().await);
  l.store().create_record(r1(), "original".into()).await.unwrap();

  let tasks: Vec<_> = (0..EDITORS)
    .map(|i| {
      let l = l.clone();
      tokio::spawn(async move {
        l.append(NewEdit::new(r1(), format!("edit {i}")).by(format!("editor-{i}")))
          .await
      })
    })
    .collect();
  for t in tasks {
    t.await.unwrap().unwrap();
  }

  let history = l.history(r1()).await.unwrap();
  assert_eq!(history.len(), EDITORS + 1);

  let versions: Vec<u32> = history.iter().map(|r| r.version_number).collect();
  assert_eq!(versions, (1..=(EDITORS as u32 + 1)).collect::<Vec<_>>());

  let contents: HashSet<&str> = history[1..].iter().map(|r| r.content.as_str()).collect();
  assert_eq!(contents.len(), EDITORS);

  assert!(l.verify(r1()).await.unwrap().chain_valid);
  assert_eq!(
    l.store().read_content(r1()).await.unwrap().as_deref(),
    Some(history.last().unwrap().content.as_str())
  );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn independent_ledgers_race_through_conditional_commit() {
  const PER_LEDGER: usize = 4;

  // Two ledgers over one store do not share per-key locks, so only the
  // store's tip check keeps the chain linear.
  let s = Arc::new(store().await);
  s.create_record(r1(), "original".into()).await.unwrap();
  let config = LedgerConfig {
    max_append_attempts: 2 * PER_LEDGER as u32 + 2,
    ..LedgerConfig::default()
  };
  let a = Arc::new(Ledger::new(s.clone(), config));
  let b = Arc::new(Ledger::new(s.clone(), config));

  let mut tasks = Vec::new();
  for i in 0..PER_LEDGER {
    for (name, l) in [("a", a.clone()), ("b", b.clone())] {
      tasks.push(tokio::spawn(async move {
        l.append(NewEdit::new(r1(), format!("{name}{i}"))).await
      }));
    }
  }
  for t in tasks {
    t.await.unwrap().unwrap();
  }

  let history = s.revisions(r1()).await.unwrap();
  assert_eq!(history.len(), 2 * PER_LEDGER + 1);
  assert!(a.verify(r1()).await.unwrap().chain_valid);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn different_keys_append_in_parallel() {
  let l = Arc::new(ledger().await);
  let keys: Vec<RecordKey> = SourceKind::ALL
    .into_iter()
    .flat_map(|kind| (1..=3).map(move |id| RecordKey::new(kind, id)))
    .collect();
  for key in &keys {
    l.store().create_record(*key, format!("{key}")).await.unwrap();
  }

  let tasks: Vec<_> = keys
    .iter()
    .copied()
    .map(|key| {
      let l = l.clone();
      tokio::spawn(async move { l.append(NewEdit::new(key, "edited")).await })
    })
    .collect();
  for t in tasks {
    t.await.unwrap().unwrap();
  }

  for key in keys {
    let report = l.verify(key).await.unwrap();
    assert!(report.chain_valid);
    assert_eq!(report.length, 2);
  }
}

// ─── Verification ────────────────────────────────────────────────────────────

#[tokio::test]
async fn scenario_edit_edit_tamper() {
  let l = ledger().await;
  l.store().create_record(r1(), "".into()).await.unwrap();

  l.append(NewEdit::new(r1(), "hello").by("A")).await.unwrap();
  let report = l.verify(r1()).await.unwrap();
  assert_eq!(report.length, 2);
  assert!(report.chain_valid);

  l.append(NewEdit::new(r1(), "hello world").by("B")).await.unwrap();
  let report = l.verify(r1()).await.unwrap();
  assert_eq!(report.length, 3);
  assert!(report.chain_valid);

  tamper_content(l.store(), r1(), 2, "goodbye").await;
  let report = l.verify(r1()).await.unwrap();
  assert!(!report.chain_valid);
  assert_eq!(report.divergence_point, Some(2));
  assert!(report.versions[0].is_valid());
  assert!(!report.versions[1].is_valid());
  assert!(!report.versions[2].is_valid());
}

#[tokio::test]
async fn stored_chain_recomputes_identically() {
  let l = ledger().await;
  l.store().create_record(r1(), "a".into()).await.unwrap();
  l.append(NewEdit::new(r1(), "b")).await.unwrap();
  l.append(NewEdit::new(r1(), "c")).await.unwrap();

  let history = l.history(r1()).await.unwrap();
  let first = l.verify(r1()).await.unwrap();
  let second = l.verify(r1()).await.unwrap();
  assert_eq!(first, second);
  for (check, rev) in first.versions.iter().zip(&history) {
    assert_eq!(check.recomputed_content_hash, rev.content_hash);
    assert_eq!(check.recomputed_chain_hash, rev.chain_hash);
  }
}

#[tokio::test]
async fn forged_revision_under_other_algorithm_is_reported_and_exportable() {
  let l = ledger().await;
  l.store().create_record(r1(), "a".into()).await.unwrap();
  l.append(NewEdit::new(r1(), "b")).await.unwrap();
  l.append(NewEdit::new(r1(), "c")).await.unwrap();

  l.store()
    .conn
    .call(|conn| {
      conn.execute_batch("DROP TRIGGER revisions_no_update;")?;
      conn.execute(
        "UPDATE revisions SET content = 'forged', hash_algorithm = 'sha512'
         WHERE version_number = 2",
        [],
      )?;
      Ok(())
    })
    .await
    .unwrap();

  let report = l.verify(r1()).await.unwrap();
  assert!(!report.chain_valid);
  assert_eq!(report.divergence_point, Some(2));
  assert!(!report.versions[1].algorithm_valid);

  let bundle = l.export_evidence(r1(), "suspected forgery").await.unwrap();
  assert_eq!(bundle.snapshot.verification.divergence_point, Some(2));
}

#[tokio::test]
async fn verifying_unmanaged_record_is_not_found() {
  let l = ledger().await;
  l.store().create_record(r1(), "a".into()).await.unwrap();
  let err = l.verify(r1()).await.unwrap_err();
  assert!(matches!(err, CoreError::ChainNotFound(_)));
}

// ─── Evidence ────────────────────────────────────────────────────────────────

async fn disputed_ledger() -> (Ledger<SqliteStore>, Uuid) {
  let l = ledger().await;
  l.store().create_record(r1(), "a".into()).await.unwrap();
  l.append(NewEdit::new(r1(), "b").by("alice")).await.unwrap();
  l.append(NewEdit::new(r1(), "c").by("bob")).await.unwrap();
  let bundle = l.export_evidence(r1(), "reported by carol").await.unwrap();
  (l, bundle.bundle_id)
}

#[tokio::test]
async fn export_snapshots_chain_and_verification() {
  let (l, id) = disputed_ledger().await;
  let bundle = l.get_bundle(id).await.unwrap();

  assert_eq!(bundle.status, DisputeStatus::Open);
  assert_eq!(bundle.snapshot.reason, "reported by carol");
  assert_eq!(bundle.snapshot.genesis, GENESIS);
  assert_eq!(bundle.snapshot.revisions, l.history(r1()).await.unwrap());
  assert!(bundle.snapshot.verification.chain_valid);
  assert!(bundle.digest_matches().unwrap());
}

#[tokio::test]
async fn export_of_tampered_chain_carries_divergence() {
  let l = ledger().await;
  l.store().create_record(r1(), "a".into()).await.unwrap();
  l.append(NewEdit::new(r1(), "b")).await.unwrap();
  tamper_content(l.store(), r1(), 1, "z").await;

  let bundle = l.export_evidence(r1(), "audit").await.unwrap();
  assert!(!bundle.snapshot.verification.chain_valid);
  assert_eq!(bundle.snapshot.verification.divergence_point, Some(1));
}

#[tokio::test]
async fn export_requires_a_chain() {
  let l = ledger().await;
  l.store().create_record(r1(), "a".into()).await.unwrap();
  let err = l.export_evidence(r1(), "audit").await.unwrap_err();
  assert!(matches!(err, CoreError::ChainNotFound(_)));
}

#[tokio::test]
async fn export_leaves_chain_untouched() {
  let l = ledger().await;
  l.store().create_record(r1(), "a".into()).await.unwrap();
  l.append(NewEdit::new(r1(), "b")).await.unwrap();
  let before = l.history(r1()).await.unwrap();

  let id = l.export_evidence(r1(), "audit").await.unwrap().bundle_id;
  l.flag(id).await.unwrap();

  assert_eq!(l.history(r1()).await.unwrap(), before);
}

#[tokio::test]
async fn flag_marks_every_revision_once() {
  let (l, id) = disputed_ledger().await;

  let flags = l.flag(id).await.unwrap();
  assert_eq!(
    flags.iter().map(|f| f.version_number).collect::<Vec<_>>(),
    vec![1, 2, 3]
  );
  assert!(flags.iter().all(|f| f.bundle_id == id && f.key == r1()));

  let again = l.flag(id).await.unwrap();
  assert_eq!(again, flags);
  assert_eq!(l.flags(r1()).await.unwrap().len(), 3);
}

#[tokio::test]
async fn flag_covers_only_snapshotted_versions() {
  let (l, id) = disputed_ledger().await;
  l.append(NewEdit::new(r1(), "d")).await.unwrap();

  let flags = l.flag(id).await.unwrap();
  assert_eq!(flags.len(), 3);
}

#[tokio::test]
async fn dispute_runs_open_review_verdict() {
  let (l, id) = disputed_ledger().await;

  let reviewing = l.begin_review(id).await.unwrap();
  assert_eq!(reviewing.status, DisputeStatus::UnderReview);

  let resolved = l
    .resolve(id, Verdict::Overturned, Some("edit was benign".into()))
    .await
    .unwrap();
  assert_eq!(resolved.status, DisputeStatus::Overturned);
  assert_eq!(resolved.resolution_notes.as_deref(), Some("edit was benign"));
  assert!(resolved.digest_matches().unwrap());

  let stored = l.get_bundle(id).await.unwrap();
  assert_eq!(stored, resolved);
}

#[tokio::test]
async fn resolve_before_review_is_rejected() {
  let (l, id) = disputed_ledger().await;
  let err = l.resolve(id, Verdict::Upheld, None).await.unwrap_err();
  assert!(matches!(
    err,
    CoreError::InvalidDisputeTransition {
      from: DisputeStatus::Open,
      to: DisputeStatus::Upheld,
      ..
    }
  ));
}

#[tokio::test]
async fn terminal_states_are_final() {
  let (l, id) = disputed_ledger().await;
  l.begin_review(id).await.unwrap();
  l.resolve(id, Verdict::Upheld, None).await.unwrap();

  assert!(matches!(
    l.resolve(id, Verdict::Overturned, None).await.unwrap_err(),
    CoreError::InvalidDisputeTransition { from: DisputeStatus::Upheld, .. }
  ));
  assert!(matches!(
    l.begin_review(id).await.unwrap_err(),
    CoreError::InvalidDisputeTransition { .. }
  ));
  assert_eq!(l.get_bundle(id).await.unwrap().status, DisputeStatus::Upheld);
}

#[tokio::test]
async fn stale_status_transition_is_rejected_by_store() {
  let (l, id) = disputed_ledger().await;
  l.begin_review(id).await.unwrap();

  // A consumer that still believes the bundle is open.
  let outcome = l
    .store()
    .transition_bundle(id, DisputeStatus::Open, DisputeStatus::UnderReview, Utc::now(), None)
    .await
    .unwrap();
  assert_eq!(
    outcome,
    blamechain_core::store::TransitionOutcome::StatusChanged(DisputeStatus::UnderReview)
  );
}

#[tokio::test]
async fn evidence_snapshot_cannot_be_rewritten() {
  let (l, id) = disputed_ledger().await;
  let id_str = id.hyphenated().to_string();

  let rejected = l
    .store()
    .conn
    .call(move |conn| {
      Ok(
        conn
          .execute(
            "UPDATE evidence_bundles SET snapshot_json = '{}' WHERE bundle_id = ?1",
            rusqlite::params![id_str],
          )
          .is_err(),
      )
    })
    .await
    .unwrap();
  assert!(rejected);
  assert!(l.get_bundle(id).await.unwrap().digest_matches().unwrap());
}

#[tokio::test]
async fn unknown_bundle_is_not_found() {
  let l = ledger().await;
  let id = Uuid::new_v4();
  assert!(matches!(
    l.flag(id).await.unwrap_err(),
    CoreError::BundleNotFound(b) if b == id
  ));
}
