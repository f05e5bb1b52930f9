//! Typed recovery plans

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use storm_core::Grid;
use storm_engine::CascadeStep;

use crate::validator::DesyncType;

/// Remedial action kind, chosen by desync type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryType {
    /// Ship the authoritative prior grid plus the disputed step
    StateResync,
    /// Replay the current step's phases with authoritative timings
    PhaseReplay,
    /// Replay every step from the last acknowledged one
    CascadeReplay,
}

impl RecoveryType {
    /// Remedial action for each desync class
    pub fn for_desync(desync: DesyncType) -> Self {
        match desync {
            DesyncType::HashMismatch => RecoveryType::StateResync,
            DesyncType::TimingError => RecoveryType::PhaseReplay,
            DesyncType::GridInconsistency => RecoveryType::CascadeReplay,
        }
    }
}

/// Plan lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStatus {
    InProgress,
    Completed,
    Error,
}

/// One remedial episode
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryPlan {
    pub recovery_id: Uuid,
    pub sync_session_id: Uuid,
    pub desync_type: DesyncType,
    pub recovery_type: RecoveryType,
    /// Step the client resumes from after a successful apply
    pub resume_step: u32,
    pub estimated_duration_ms: u64,
    pub status: RecoveryStatus,
    pub created_at: DateTime<Utc>,
}

impl RecoveryPlan {
    pub fn new(
        sync_session_id: Uuid,
        desync_type: DesyncType,
        resume_step: u32,
        steps_to_replay: u32,
    ) -> Self {
        let recovery_type = RecoveryType::for_desync(desync_type);
        let estimated_duration_ms = match recovery_type {
            RecoveryType::StateResync => 2_000,
            RecoveryType::PhaseReplay => 1_500,
            RecoveryType::CascadeReplay => 1_000 * steps_to_replay.max(1) as u64,
        };
        Self {
            recovery_id: Uuid::new_v4(),
            sync_session_id,
            desync_type,
            recovery_type,
            resume_step,
            estimated_duration_ms,
            status: RecoveryStatus::InProgress,
            created_at: Utc::now(),
        }
    }
}

/// Authoritative data shipped with a `recovery_data` event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryData {
    /// Grid the client must restore before resuming
    pub grid: Grid,
    /// Steps the client replays, oldest first
    pub required_steps: Vec<CascadeStep>,
}
