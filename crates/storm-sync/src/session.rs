//! Per-spin sync session state

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use storm_core::Grid;
use storm_engine::{CascadeStep, SpinResult};

use crate::recovery::RecoveryPlan;

/// Sync session status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Init,
    Broadcasting,
    Paused,
    Recovering,
    Resyncing,
    Synchronized,
    Completed,
    Failed,
}

impl SyncStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SyncStatus::Completed | SyncStatus::Failed)
    }
}

/// Transition outside the declared state machine
#[derive(Error, Debug)]
#[error("illegal transition: {event} while {from:?}")]
pub struct IllegalTransition {
    pub from: SyncStatus,
    pub event: &'static str,
}

/// One received acknowledgment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepAck {
    pub step_index: u32,
    pub client_hash: String,
    pub client_timestamp_ms: i64,
    pub received_at: DateTime<Utc>,
    /// Broadcast attempt that finally got acknowledged
    pub attempt: u32,
}

/// Protocol counters for the completion report
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetrics {
    pub steps_broadcast: u32,
    pub acks_received: u32,
    pub retries: u32,
    pub desyncs: u32,
    pub recoveries: u32,
}

impl SyncMetrics {
    /// Score in [0, 100]: retries and recoveries cost points
    pub fn performance_score(&self) -> u32 {
        let penalty = self.retries * 5 + self.desyncs * 10 + self.recoveries * 10;
        100u32.saturating_sub(penalty)
    }
}

/// A sealed step: the spin engine's step plus its session-salted hash
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SealedStep {
    pub step: CascadeStep,
    /// `step.hash(validation_salt)`; what the client must echo
    pub expected_hash: String,
}

/// Per-spin live coordination state
///
/// Owned by the synchronizer's registry; components refer to it by id and
/// never hold direct references across await points.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSession {
    pub sync_session_id: Uuid,
    pub spin_id: String,
    pub player_id: Uuid,
    pub validation_salt: String,
    /// Seed echoed to the client for its own deterministic presentation
    pub sync_seed: u64,
    pub initial_grid: Grid,
    pub steps: Vec<SealedStep>,
    pub total_win: storm_core::Amount,
    pub current_step_index: u32,
    pub status: SyncStatus,
    pub acknowledgments: HashMap<u32, StepAck>,
    pub recovery_history: Vec<RecoveryPlan>,
    /// Broadcast attempts for the current step (1 = first send)
    pub attempt: u32,
    pub metrics: SyncMetrics,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl SyncSession {
    /// Seal a finalized spin into a new session
    pub fn seal(player_id: Uuid, result: &SpinResult, validation_salt: String, sync_seed: u64) -> Self {
        let steps = result
            .cascade_steps
            .iter()
            .map(|step| SealedStep {
                expected_hash: step.hash(&validation_salt),
                step: step.clone(),
            })
            .collect();
        Self {
            sync_session_id: Uuid::new_v4(),
            spin_id: result.spin_id.clone(),
            player_id,
            validation_salt,
            sync_seed,
            initial_grid: result.initial_grid,
            steps,
            total_win: result.total_win,
            current_step_index: 0,
            status: SyncStatus::Init,
            acknowledgments: HashMap::new(),
            recovery_history: Vec::new(),
            attempt: 0,
            metrics: SyncMetrics::default(),
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn total_steps(&self) -> u32 {
        self.steps.len() as u32
    }

    /// The step currently awaiting acknowledgment
    pub fn current_step(&self) -> Option<&SealedStep> {
        self.steps.get(self.current_step_index as usize)
    }

    pub fn step(&self, index: u32) -> Option<&SealedStep> {
        self.steps.get(index as usize)
    }

    /// Grid the client should hold *before* playing `step_index`
    pub fn grid_before_step(&self, step_index: u32) -> Grid {
        if step_index == 0 {
            self.initial_grid
        } else {
            self.steps
                .get(step_index as usize - 1)
                .map(|sealed| sealed.step.grid_after)
                .unwrap_or(self.initial_grid)
        }
    }

    /// Highest contiguous acknowledged step, if any
    pub fn last_acked_step(&self) -> Option<u32> {
        (0..self.total_steps())
            .take_while(|index| self.acknowledgments.contains_key(index))
            .last()
    }

    /// All steps acknowledged at least once?
    pub fn fully_acknowledged(&self) -> bool {
        (0..self.total_steps()).all(|index| self.acknowledgments.contains_key(&index))
    }

    fn guard(&self, allowed: &[SyncStatus], event: &'static str) -> Result<(), IllegalTransition> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(IllegalTransition {
                from: self.status,
                event,
            })
        }
    }

    // ── declared state machine transitions ─────────────────────────────

    pub fn begin_broadcast(&mut self) -> Result<(), IllegalTransition> {
        self.guard(&[SyncStatus::Init], "begin_broadcast")?;
        self.status = SyncStatus::Broadcasting;
        self.attempt = 1;
        self.metrics.steps_broadcast = self.total_steps().min(1);
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), IllegalTransition> {
        self.guard(&[SyncStatus::Broadcasting], "pause")?;
        self.status = SyncStatus::Paused;
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), IllegalTransition> {
        self.guard(&[SyncStatus::Paused], "resume")?;
        self.status = SyncStatus::Broadcasting;
        Ok(())
    }

    pub fn enter_recovering(&mut self) -> Result<(), IllegalTransition> {
        self.guard(
            &[SyncStatus::Broadcasting, SyncStatus::Recovering],
            "enter_recovering",
        )?;
        self.status = SyncStatus::Recovering;
        Ok(())
    }

    /// Successful recovery: synchronized, then immediately broadcasting
    /// from the adjusted step
    pub fn recovered(&mut self, resume_step: u32) -> Result<(), IllegalTransition> {
        self.guard(&[SyncStatus::Recovering], "recovered")?;
        self.status = SyncStatus::Synchronized;
        self.current_step_index = resume_step;
        self.attempt = 1;
        self.status = SyncStatus::Broadcasting;
        Ok(())
    }

    pub fn enter_resync(&mut self, from_step: u32) -> Result<(), IllegalTransition> {
        self.guard(
            &[
                SyncStatus::Broadcasting,
                SyncStatus::Paused,
                SyncStatus::Recovering,
                SyncStatus::Resyncing,
            ],
            "enter_resync",
        )?;
        self.status = SyncStatus::Resyncing;
        self.current_step_index = from_step;
        self.attempt = 1;
        self.acknowledgments.retain(|&index, _| index < from_step);
        self.status = SyncStatus::Broadcasting;
        Ok(())
    }

    pub fn complete(&mut self) -> Result<(), IllegalTransition> {
        self.guard(&[SyncStatus::Broadcasting], "complete")?;
        self.status = SyncStatus::Completed;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Terminal failure from any non-terminal state
    pub fn fail(&mut self) {
        if !self.status.is_terminal() {
            self.status = SyncStatus::Failed;
            self.completed_at = Some(Utc::now());
        }
    }
}
