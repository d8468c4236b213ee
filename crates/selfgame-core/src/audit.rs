//! Session audit export.
//!
//! An [`AuditRecord`] captures everything a reviewer needs to reconstruct a
//! game: the agents, the routed graph, every dispatch decision and every
//! round. Records are plain nested JSON.
//!
//! Artifacts are written to `<dir>/<session_id>/audit.json` with a companion
//! `<dir>/<session_id>/audit.digest` holding the content digest.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use selfgame_collab::EdgeRef;

use crate::dispatch::DispatchRecord;
use crate::domain::digest::sha256_hex;
use crate::domain::{
    AggregateQuality, FallbackSource, GameError, Result, SelfPlayRound, StageFailure, TerminationReason,
};
use crate::routing::RoutingConflict;
use crate::self_play::CritiqueStats;

/// Flattened view of one agent for audit purposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSummary {
    pub name: String,
    pub role_type: String,
    pub priority_level: u8,
    pub is_requester: bool,
    pub skills: Vec<String>,
    pub connection_permissions: Vec<String>,
    pub fallback_used: bool,
    /// Role-graph stages that fell back for this agent.
    #[serde(default)]
    pub fallback_sources: Vec<FallbackSource>,
}

/// A self-contained, integrity-checked record of a finished session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// `selfgame-core` version that produced the record.
    pub version: String,
    pub session_id: Uuid,
    pub problem_statement: String,
    pub agents: Vec<AgentSummary>,
    pub allowed_edges: Vec<EdgeRef>,
    pub forbidden_edges: Vec<EdgeRef>,
    /// Names in matrix order; `matrix_rows[i][j]` is `names[i] -> names[j]`.
    pub matrix_names: Vec<String>,
    pub matrix_rows: Vec<Vec<bool>>,
    pub conflicts: Vec<RoutingConflict>,
    pub routing_fallback_used: bool,
    pub dispatch_history: Vec<DispatchRecord>,
    pub rounds: Vec<SelfPlayRound>,
    pub termination_reason: TerminationReason,
    pub aggregate_quality: AggregateQuality,
    pub stage_failure: Option<StageFailure>,
    pub critique_stats: CritiqueStats,
    pub exported_at: DateTime<Utc>,
    /// SHA-256 hex over the dispatch history, rounds and termination reason.
    pub content_digest: String,
}

impl AuditRecord {
    /// The record as nested JSON.
    pub fn to_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Recompute the digest over the replayable content.
    pub fn compute_digest(&self) -> Result<String> {
        content_digest(&self.dispatch_history, &self.rounds, self.termination_reason)
    }
}

pub(crate) fn content_digest(
    history: &[DispatchRecord],
    rounds: &[SelfPlayRound],
    reason: TerminationReason,
) -> Result<String> {
    let bytes = serde_json::to_vec(&(history, rounds, reason))?;
    Ok(sha256_hex(&bytes))
}

/// Write an `AuditRecord` to `<dir>/<session_id>/audit.json`.
///
/// Also writes `<dir>/<session_id>/audit.digest` for out-of-band
/// verification. Returns the path to `audit.json`.
pub fn write_audit_artifact(record: &AuditRecord, dir: &Path) -> Result<PathBuf> {
    let session_dir = dir.join(record.session_id.to_string());
    std::fs::create_dir_all(&session_dir)?;

    let audit_path = session_dir.join("audit.json");
    let digest_path = session_dir.join("audit.digest");

    let json = serde_json::to_vec_pretty(record)?;
    std::fs::write(&audit_path, &json)?;
    std::fs::write(&digest_path, record.content_digest.as_bytes())?;

    Ok(audit_path)
}

/// Read and integrity-verify an `AuditRecord`.
///
/// The digest is recomputed from the stored content and compared with both
/// the embedded `content_digest` and the companion digest file.
pub fn read_audit_artifact(session_id: Uuid, dir: &Path) -> Result<AuditRecord> {
    let session_dir = dir.join(session_id.to_string());
    let json = std::fs::read(session_dir.join("audit.json"))?;
    let record: AuditRecord = serde_json::from_slice(&json)?;

    let actual = record.compute_digest()?;
    if actual != record.content_digest {
        return Err(GameError::DigestMismatch {
            expected: record.content_digest.clone(),
            actual,
        });
    }

    let stored = std::fs::read_to_string(session_dir.join("audit.digest"))?;
    if stored.trim() != actual {
        return Err(GameError::DigestMismatch {
            expected: stored.trim().to_string(),
            actual,
        });
    }

    Ok(record)
}
