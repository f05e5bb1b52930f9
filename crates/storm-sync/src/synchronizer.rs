//! The cascade synchronizer
//!
//! Registry of live [`SyncSession`]s indexed by id and player, plus the
//! acknowledgment, timeout, desync, and recovery operations the transport
//! drives. All methods are synchronous state transitions; timers and
//! socket I/O live in the server crate.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use uuid::Uuid;

use storm_core::{GameConfig, StormError};
use storm_engine::SpinResult;
use storm_rng::SpinRng;

use crate::recovery::{RecoveryData, RecoveryPlan, RecoveryStatus, RecoveryType};
use crate::session::{IllegalTransition, StepAck, SyncMetrics, SyncSession, SyncStatus};
use crate::validator::{validate_timing, DesyncType};

/// Synchronizer failure
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("sync session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("recovery not found: {0}")]
    RecoveryNotFound(Uuid),

    #[error("step {0} out of range")]
    StepOutOfRange(u32),

    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),
}

impl From<SyncError> for StormError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::SessionNotFound(id) => StormError::SessionNotFound(id.to_string()),
            SyncError::RecoveryNotFound(id) => StormError::RecoveryNotFound(id.to_string()),
            SyncError::StepOutOfRange(step) => {
                StormError::ValidationMismatch(format!("step {step} out of range"))
            }
            SyncError::IllegalTransition(inner) => {
                StormError::ValidationMismatch(inner.to_string())
            }
        }
    }
}

/// Result of processing one acknowledgment
#[derive(Debug, Clone)]
pub enum AckOutcome {
    /// Advanced; `completed` when this was the final step
    Accepted { next_step: u32, completed: bool },
    /// Step was already acknowledged; idempotent echo of the server hash
    Duplicate { server_hash: String },
    /// Client hash diverged; session entered recovery
    Desync { plan: RecoveryPlan },
}

/// Result of an acknowledgment timeout
#[derive(Debug, Clone)]
pub enum TimeoutOutcome {
    /// Retry the current step broadcast
    Retry { attempt: u32 },
    /// Retries exhausted; session entered recovery
    Exhausted { plan: RecoveryPlan },
}

/// Result of a recovery application
#[derive(Debug, Clone)]
pub enum RecoveryOutcome {
    /// Session resumed broadcasting from `resume_step`
    Resumed { resume_step: u32 },
    /// Recovery already applied; idempotent no-op
    AlreadyApplied,
    /// Failed attempt; a fresh plan is offered
    Retrying { plan: RecoveryPlan },
    /// Escalation exhausted; session failed
    Failed,
}

/// Session completion report
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionReport {
    pub validated: bool,
    /// Advisory: did the client's ack schedule stay within tolerance?
    pub timing_validated: bool,
    pub total_steps: u32,
    pub performance_score: u32,
    pub metrics: SyncMetrics,
}

/// Maximum recovery attempts before a session is abandoned
const MAX_RECOVERY_ATTEMPTS: usize = 3;

/// Owner of every live sync session
pub struct CascadeSynchronizer {
    config: Arc<GameConfig>,
    sessions: RwLock<HashMap<Uuid, Arc<Mutex<SyncSession>>>>,
    /// recovery id → owning sync session
    recoveries: RwLock<HashMap<Uuid, Uuid>>,
}

impl CascadeSynchronizer {
    pub fn new(config: Arc<GameConfig>) -> Self {
        Self {
            config,
            sessions: RwLock::new(HashMap::new()),
            recoveries: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    fn handle(&self, sync_id: Uuid) -> Result<Arc<Mutex<SyncSession>>, SyncError> {
        self.sessions
            .read()
            .get(&sync_id)
            .cloned()
            .ok_or(SyncError::SessionNotFound(sync_id))
    }

    /// Open a sync session over a finalized spin and start broadcasting
    pub fn start_sync_session(
        &self,
        player_id: Uuid,
        result: &SpinResult,
    ) -> Result<SyncSession, SyncError> {
        let mut rng = SpinRng::secure();
        let validation_salt = format!("{:032x}", (rng.next_u64() as u128) << 64 | rng.next_u64() as u128);
        let sync_seed = rng.next_u64();

        let mut session = SyncSession::seal(player_id, result, validation_salt, sync_seed);
        session.begin_broadcast()?;
        let snapshot = session.clone();

        log::info!(
            "sync {}: opened for spin {} ({} steps)",
            session.sync_session_id,
            session.spin_id,
            session.total_steps()
        );
        self.sessions
            .write()
            .insert(session.sync_session_id, Arc::new(Mutex::new(session)));
        Ok(snapshot)
    }

    /// Snapshot for outbound payloads; never leaks internal pointers
    pub fn snapshot(&self, sync_id: Uuid) -> Result<SyncSession, SyncError> {
        Ok(self.handle(sync_id)?.lock().clone())
    }

    pub fn sessions_for_player(&self, player_id: Uuid) -> Vec<Uuid> {
        self.sessions
            .read()
            .iter()
            .filter(|(_, handle)| handle.lock().player_id == player_id)
            .map(|(&id, _)| id)
            .collect()
    }

    /// Process a step acknowledgment
    ///
    /// Duplicate acks echo the sealed hash without advancing; a hash
    /// mismatch books a desync and returns the recovery plan.
    pub fn acknowledge_step(
        &self,
        sync_id: Uuid,
        step_index: u32,
        client_hash: &str,
        client_timestamp_ms: i64,
    ) -> Result<AckOutcome, SyncError> {
        let handle = self.handle(sync_id)?;
        let mut session = handle.lock();

        let sealed = session
            .step(step_index)
            .ok_or(SyncError::StepOutOfRange(step_index))?;
        let expected = sealed.expected_hash.clone();

        if session.acknowledgments.contains_key(&step_index) {
            log::debug!("sync {sync_id}: duplicate ack for step {step_index}");
            return Ok(AckOutcome::Duplicate {
                server_hash: expected,
            });
        }

        if expected != client_hash {
            session.enter_recovering()?;
            session.metrics.desyncs += 1;
            let plan = self.book_recovery(&mut session, DesyncType::HashMismatch, step_index);
            log::warn!(
                "sync {sync_id}: hash mismatch at step {step_index}, recovery {}",
                plan.recovery_id
            );
            return Ok(AckOutcome::Desync { plan });
        }

        let attempt = session.attempt;
        session.acknowledgments.insert(
            step_index,
            StepAck {
                step_index,
                client_hash: client_hash.to_string(),
                client_timestamp_ms,
                received_at: Utc::now(),
                attempt,
            },
        );
        session.metrics.acks_received += 1;

        // Only the step under broadcast advances the cursor
        if step_index == session.current_step_index {
            session.current_step_index += 1;
            session.attempt = 1;
        }
        let completed = session.fully_acknowledged();
        if !completed && (session.current_step_index as usize) < session.steps.len() {
            session.metrics.steps_broadcast += 1;
        }
        Ok(AckOutcome::Accepted {
            next_step: session.current_step_index,
            completed,
        })
    }

    /// The current step timed out waiting for an ack
    pub fn handle_ack_timeout(&self, sync_id: Uuid) -> Result<TimeoutOutcome, SyncError> {
        let handle = self.handle(sync_id)?;
        let mut session = handle.lock();

        if session.attempt < self.config.timers.max_retry_attempts {
            session.attempt += 1;
            session.metrics.retries += 1;
            log::debug!(
                "sync {sync_id}: step {} retry attempt {}",
                session.current_step_index,
                session.attempt
            );
            return Ok(TimeoutOutcome::Retry {
                attempt: session.attempt,
            });
        }

        // Exhausted: replay from the last acknowledged step
        session.enter_recovering()?;
        let step_index = session.current_step_index;
        let plan = self.book_recovery(&mut session, DesyncType::GridInconsistency, step_index);
        log::warn!(
            "sync {sync_id}: retries exhausted at step {step_index}, recovery {}",
            plan.recovery_id
        );
        Ok(TimeoutOutcome::Exhausted { plan })
    }

    /// Client-reported desync
    pub fn report_desync(
        &self,
        sync_id: Uuid,
        desync_type: DesyncType,
        step_index: u32,
    ) -> Result<RecoveryPlan, SyncError> {
        let handle = self.handle(sync_id)?;
        let mut session = handle.lock();
        session.enter_recovering()?;
        session.metrics.desyncs += 1;
        let plan = self.book_recovery(&mut session, desync_type, step_index);
        log::warn!(
            "sync {sync_id}: client desync {desync_type:?} at step {step_index}, recovery {}",
            plan.recovery_id
        );
        Ok(plan)
    }

    fn book_recovery(
        &self,
        session: &mut SyncSession,
        desync_type: DesyncType,
        step_index: u32,
    ) -> RecoveryPlan {
        let resume_step = match RecoveryType::for_desync(desync_type) {
            // Replays restart at the last step the client provably held
            RecoveryType::CascadeReplay => {
                session.last_acked_step().map(|s| s + 1).unwrap_or(0)
            }
            _ => step_index,
        };
        let steps_to_replay = session.total_steps().saturating_sub(resume_step);
        let plan = RecoveryPlan::new(
            session.sync_session_id,
            desync_type,
            resume_step,
            steps_to_replay,
        );
        session.metrics.recoveries += 1;
        session.recovery_history.push(plan.clone());
        self.recoveries
            .write()
            .insert(plan.recovery_id, session.sync_session_id);
        plan
    }

    /// Authoritative payload for a `recovery_data` event
    pub fn recovery_data(&self, recovery_id: Uuid) -> Result<RecoveryData, SyncError> {
        let plan = self.recovery_status(recovery_id)?;
        let handle = self.handle(plan.sync_session_id)?;
        let session = handle.lock();

        let grid = session.grid_before_step(plan.resume_step);
        let required_steps = match plan.recovery_type {
            RecoveryType::StateResync | RecoveryType::PhaseReplay => session
                .step(plan.resume_step)
                .map(|sealed| vec![sealed.step.clone()])
                .unwrap_or_default(),
            RecoveryType::CascadeReplay => session
                .steps
                .iter()
                .skip(plan.resume_step as usize)
                .map(|sealed| sealed.step.clone())
                .collect(),
        };
        Ok(RecoveryData {
            grid,
            required_steps,
        })
    }

    pub fn recovery_status(&self, recovery_id: Uuid) -> Result<RecoveryPlan, SyncError> {
        let sync_id = *self
            .recoveries
            .read()
            .get(&recovery_id)
            .ok_or(SyncError::RecoveryNotFound(recovery_id))?;
        let handle = self.handle(sync_id)?;
        let session = handle.lock();
        session
            .recovery_history
            .iter()
            .find(|p| p.recovery_id == recovery_id)
            .cloned()
            .ok_or(SyncError::RecoveryNotFound(recovery_id))
    }

    /// Apply the client's recovery result
    ///
    /// Idempotent: re-applying a completed recovery is a no-op. A failed
    /// apply books a fresh plan until the attempt limit runs out.
    pub fn apply_recovery_result(
        &self,
        recovery_id: Uuid,
        success: bool,
    ) -> Result<RecoveryOutcome, SyncError> {
        let sync_id = *self
            .recoveries
            .read()
            .get(&recovery_id)
            .ok_or(SyncError::RecoveryNotFound(recovery_id))?;
        let handle = self.handle(sync_id)?;
        let mut session = handle.lock();

        let plan_index = session
            .recovery_history
            .iter()
            .position(|p| p.recovery_id == recovery_id)
            .ok_or(SyncError::RecoveryNotFound(recovery_id))?;

        match session.recovery_history[plan_index].status {
            RecoveryStatus::Completed => return Ok(RecoveryOutcome::AlreadyApplied),
            RecoveryStatus::Error => return Ok(RecoveryOutcome::Failed),
            RecoveryStatus::InProgress => {}
        }

        if success {
            let resume_step = session.recovery_history[plan_index].resume_step;
            session.recovery_history[plan_index].status = RecoveryStatus::Completed;
            session.recovered(resume_step)?;
            log::info!("sync {sync_id}: recovery {recovery_id} applied, resuming at {resume_step}");
            return Ok(RecoveryOutcome::Resumed { resume_step });
        }

        session.recovery_history[plan_index].status = RecoveryStatus::Error;
        if session.recovery_history.len() >= MAX_RECOVERY_ATTEMPTS {
            session.fail();
            log::error!("sync {sync_id}: recovery escalation exhausted, session failed");
            return Ok(RecoveryOutcome::Failed);
        }

        // Escalate with a fresh cascade replay
        let desync_type = session.recovery_history[plan_index].desync_type;
        let step_index = session.current_step_index;
        let plan = self.book_recovery(&mut session, desync_type, step_index);
        Ok(RecoveryOutcome::Retrying { plan })
    }

    /// Hard restart from a given step
    pub fn force_resync(&self, sync_id: Uuid, from_step: u32) -> Result<SyncSession, SyncError> {
        let handle = self.handle(sync_id)?;
        let mut session = handle.lock();
        if from_step > session.total_steps() {
            return Err(SyncError::StepOutOfRange(from_step));
        }
        session.enter_resync(from_step)?;
        log::info!("sync {sync_id}: force resync from step {from_step}");
        Ok(session.clone())
    }

    /// Validate completion and close the session
    pub fn complete_session(
        &self,
        sync_id: Uuid,
        client_total_win: storm_core::Amount,
    ) -> Result<CompletionReport, SyncError> {
        let handle = self.handle(sync_id)?;
        let mut session = handle.lock();

        let validated = session.fully_acknowledged() && session.total_win == client_total_win;
        if validated {
            session.complete()?;
        } else {
            log::warn!(
                "sync {sync_id}: completion rejected (acked={}, win match={})",
                session.fully_acknowledged(),
                session.total_win == client_total_win
            );
        }
        let timing_validated = self.check_ack_timing(&session);
        let report = CompletionReport {
            validated,
            timing_validated,
            total_steps: session.total_steps(),
            performance_score: session.metrics.performance_score(),
            metrics: session.metrics.clone(),
        };
        drop(session);
        if report.validated {
            self.remove_session(sync_id);
        }
        Ok(report)
    }

    /// Advisory timing audit over the acknowledged schedule
    ///
    /// Compares the client's per-step ack timestamps with the advisory
    /// step durations. Never blocks completion; a drift is logged and
    /// surfaced in the report.
    fn check_ack_timing(&self, session: &SyncSession) -> bool {
        let times: Vec<i64> = (0..session.total_steps())
            .filter_map(|index| {
                session
                    .acknowledgments
                    .get(&index)
                    .map(|ack| ack.client_timestamp_ms)
            })
            .collect();
        if times.len() != session.steps.len() {
            return false;
        }
        let steps: Vec<_> = session.steps.iter().map(|sealed| sealed.step.clone()).collect();
        match validate_timing(
            &steps,
            &times,
            0,
            self.config.timers.sync_tolerance_ms as i64,
            self.config.timers.step_min_phase_ms as i64,
        ) {
            Ok(()) => true,
            Err(err) => {
                log::warn!(
                    "sync {}: ack timing outside tolerance: {err}",
                    session.sync_session_id
                );
                false
            }
        }
    }

    /// Fail and drop a session (socket disconnect, fatal error)
    pub fn fail_session(&self, sync_id: Uuid) {
        if let Ok(handle) = self.handle(sync_id) {
            handle.lock().fail();
        }
        self.remove_session(sync_id);
    }

    fn remove_session(&self, sync_id: Uuid) {
        if self.sessions.write().remove(&sync_id).is_some() {
            self.recoveries.write().retain(|_, owner| *owner != sync_id);
            log::debug!("sync {sync_id}: removed");
        }
    }

    /// Pause / resume, driven by client step-control events
    pub fn pause(&self, sync_id: Uuid) -> Result<(), SyncError> {
        Ok(self.handle(sync_id)?.lock().pause()?)
    }

    pub fn resume(&self, sync_id: Uuid) -> Result<(), SyncError> {
        Ok(self.handle(sync_id)?.lock().resume()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use storm_core::{Amount, GameMode, Grid, Symbol};
    use storm_engine::{CascadeStep, DropPattern, SpinResult, StepTimings};

    fn synchronizer() -> CascadeSynchronizer {
        CascadeSynchronizer::new(Arc::new(GameConfig::default()))
    }

    fn result_with_steps(count: usize) -> SpinResult {
        let fill = [
            Symbol::TimeGem,
            Symbol::SpaceGem,
            Symbol::MindGem,
            Symbol::PowerGem,
        ];
        let phases = GameConfig::default().step_timing;
        let steps: Vec<CascadeStep> = (0..count)
            .map(|i| {
                let mut step = CascadeStep {
                    step_index: i as u32,
                    grid_before: Grid::filled(fill[i % fill.len()]),
                    matched_clusters: Vec::new(),
                    win_amount: Amount::from_cents(40),
                    drop_pattern: DropPattern::default(),
                    grid_after: Grid::filled(fill[(i + 1) % fill.len()]),
                    random_multiplier: None,
                    timings: StepTimings::at_offset(i as u64 * phases.total_ms(), phases),
                    step_hash: String::new(),
                };
                step.step_hash = step.hash("");
                step
            })
            .collect();
        let mut result = SpinResult {
            spin_id: "spin-sync-test".into(),
            bet_amount: Amount::from_major(1),
            rng_seed: 7,
            game_mode: GameMode::Base,
            initial_grid: Grid::filled(fill[0]),
            cascade_steps: steps,
            base_win: Amount::from_cents(40 * count as i64),
            total_multiplier: 1,
            total_win: Amount::from_cents(40 * count as i64),
            scatter_count: 0,
            free_spins_triggered: false,
            free_spins_awarded: 0,
            free_spin_multiplier_earned: 0,
            validation_hash: String::new(),
            timestamp: Utc::now(),
        };
        result.validation_hash = result.compute_validation_hash();
        result
    }

    fn started(count: usize) -> (CascadeSynchronizer, SyncSession) {
        let sync = synchronizer();
        let session = sync
            .start_sync_session(Uuid::new_v4(), &result_with_steps(count))
            .unwrap();
        (sync, session)
    }

    #[test]
    fn test_start_generates_salt_and_seals() {
        let (_, session) = started(2);
        assert_eq!(session.status, SyncStatus::Broadcasting);
        assert_eq!(session.validation_salt.len(), 32);
        assert_eq!(session.total_steps(), 2);
        for sealed in &session.steps {
            assert_eq!(sealed.expected_hash, sealed.step.hash(&session.validation_salt));
        }
    }

    #[test]
    fn test_ack_happy_path_to_completion() {
        let (sync, session) = started(2);
        let id = session.sync_session_id;

        let hash0 = session.steps[0].expected_hash.clone();
        match sync.acknowledge_step(id, 0, &hash0, 0).unwrap() {
            AckOutcome::Accepted { next_step, completed } => {
                assert_eq!(next_step, 1);
                assert!(!completed);
            }
            other => panic!("unexpected: {other:?}"),
        }

        // Second ack lands close to the advisory step duration
        let hash1 = session.steps[1].expected_hash.clone();
        match sync.acknowledge_step(id, 1, &hash1, 1_700).unwrap() {
            AckOutcome::Accepted { completed, .. } => assert!(completed),
            other => panic!("unexpected: {other:?}"),
        }

        let report = sync
            .complete_session(id, Amount::from_cents(80))
            .unwrap();
        assert!(report.validated);
        assert!(report.timing_validated);
        assert_eq!(report.total_steps, 2);
        assert_eq!(report.performance_score, 100);
        // Session is gone afterwards
        assert!(matches!(
            sync.snapshot(id),
            Err(SyncError::SessionNotFound(_))
        ));
    }

    #[test]
    fn test_duplicate_ack_is_idempotent() {
        let (sync, session) = started(2);
        let id = session.sync_session_id;
        let hash0 = session.steps[0].expected_hash.clone();

        sync.acknowledge_step(id, 0, &hash0, 100).unwrap();
        let before = sync.snapshot(id).unwrap();
        match sync.acknowledge_step(id, 0, &hash0, 150).unwrap() {
            AckOutcome::Duplicate { server_hash } => assert_eq!(server_hash, hash0),
            other => panic!("unexpected: {other:?}"),
        }
        let after = sync.snapshot(id).unwrap();
        assert_eq!(before.current_step_index, after.current_step_index);
        assert_eq!(before.metrics.acks_received, after.metrics.acks_received);
    }

    #[test]
    fn test_bad_hash_enters_recovery_with_state_resync() {
        let (sync, session) = started(2);
        let id = session.sync_session_id;

        match sync.acknowledge_step(id, 0, "wrong-hash", 100).unwrap() {
            AckOutcome::Desync { plan } => {
                assert_eq!(plan.recovery_type, RecoveryType::StateResync);
                assert_eq!(plan.resume_step, 0);
                let snapshot = sync.snapshot(id).unwrap();
                assert_eq!(snapshot.status, SyncStatus::Recovering);

                let data = sync.recovery_data(plan.recovery_id).unwrap();
                assert_eq!(data.grid, session.initial_grid);
                assert_eq!(data.required_steps.len(), 1);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_timeout_retries_then_exhausts() {
        let (sync, session) = started(1);
        let id = session.sync_session_id;
        let max = GameConfig::default().timers.max_retry_attempts;

        for expected_attempt in 2..=max {
            match sync.handle_ack_timeout(id).unwrap() {
                TimeoutOutcome::Retry { attempt } => assert_eq!(attempt, expected_attempt),
                other => panic!("unexpected: {other:?}"),
            }
        }
        match sync.handle_ack_timeout(id).unwrap() {
            TimeoutOutcome::Exhausted { plan } => {
                assert_eq!(plan.recovery_type, RecoveryType::CascadeReplay);
                assert_eq!(plan.resume_step, 0);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(sync.snapshot(id).unwrap().status, SyncStatus::Recovering);
    }

    #[test]
    fn test_recovery_apply_resumes_and_is_idempotent() {
        let (sync, session) = started(2);
        let id = session.sync_session_id;

        let plan = sync
            .report_desync(id, DesyncType::HashMismatch, 1)
            .unwrap();
        match sync.apply_recovery_result(plan.recovery_id, true).unwrap() {
            RecoveryOutcome::Resumed { resume_step } => assert_eq!(resume_step, 1),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(sync.snapshot(id).unwrap().status, SyncStatus::Broadcasting);

        // Second apply: no-op
        assert!(matches!(
            sync.apply_recovery_result(plan.recovery_id, true).unwrap(),
            RecoveryOutcome::AlreadyApplied
        ));
    }

    #[test]
    fn test_failed_recovery_escalates_then_fails() {
        let (sync, session) = started(2);
        let id = session.sync_session_id;

        let first = sync
            .report_desync(id, DesyncType::GridInconsistency, 0)
            .unwrap();
        let second = match sync.apply_recovery_result(first.recovery_id, false).unwrap() {
            RecoveryOutcome::Retrying { plan } => plan,
            other => panic!("unexpected: {other:?}"),
        };
        let third = match sync.apply_recovery_result(second.recovery_id, false).unwrap() {
            RecoveryOutcome::Retrying { plan } => plan,
            other => panic!("unexpected: {other:?}"),
        };
        match sync.apply_recovery_result(third.recovery_id, false).unwrap() {
            RecoveryOutcome::Failed => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_force_resync_restarts_counters() {
        let (sync, session) = started(3);
        let id = session.sync_session_id;
        let hash0 = session.steps[0].expected_hash.clone();
        let hash1 = session.steps[1].expected_hash.clone();
        sync.acknowledge_step(id, 0, &hash0, 100).unwrap();
        sync.acknowledge_step(id, 1, &hash1, 500).unwrap();

        let snapshot = sync.force_resync(id, 1).unwrap();
        assert_eq!(snapshot.current_step_index, 1);
        assert_eq!(snapshot.status, SyncStatus::Broadcasting);
        assert!(snapshot.acknowledgments.contains_key(&0));
        assert!(!snapshot.acknowledgments.contains_key(&1));

        assert!(matches!(
            sync.force_resync(id, 99),
            Err(SyncError::StepOutOfRange(99))
        ));
    }

    #[test]
    fn test_completion_rejected_until_all_acked() {
        let (sync, session) = started(2);
        let id = session.sync_session_id;
        let hash0 = session.steps[0].expected_hash.clone();
        sync.acknowledge_step(id, 0, &hash0, 100).unwrap();

        let report = sync.complete_session(id, Amount::from_cents(80)).unwrap();
        assert!(!report.validated);
        // Session still alive for the client to finish
        assert!(sync.snapshot(id).is_ok());
    }

    #[test]
    fn test_completion_flags_implausible_timing() {
        let (sync, session) = started(2);
        let id = session.sync_session_id;
        let hash0 = session.steps[0].expected_hash.clone();
        let hash1 = session.steps[1].expected_hash.clone();
        // Both steps acked 5ms apart: far below any plausible schedule
        sync.acknowledge_step(id, 0, &hash0, 100).unwrap();
        sync.acknowledge_step(id, 1, &hash1, 105).unwrap();

        let report = sync.complete_session(id, Amount::from_cents(80)).unwrap();
        assert!(report.validated);
        assert!(!report.timing_validated);
    }

    #[test]
    fn test_completion_rejects_wrong_total() {
        let (sync, session) = started(1);
        let id = session.sync_session_id;
        let hash0 = session.steps[0].expected_hash.clone();
        sync.acknowledge_step(id, 0, &hash0, 100).unwrap();
        let report = sync.complete_session(id, Amount::from_major(999)).unwrap();
        assert!(!report.validated);
    }

    #[test]
    fn test_disconnect_cleanup_by_player() {
        let sync = synchronizer();
        let player = Uuid::new_v4();
        let a = sync
            .start_sync_session(player, &result_with_steps(1))
            .unwrap();
        let b = sync
            .start_sync_session(player, &result_with_steps(1))
            .unwrap();
        let other = sync
            .start_sync_session(Uuid::new_v4(), &result_with_steps(1))
            .unwrap();

        let mut owned = sync.sessions_for_player(player);
        owned.sort();
        let mut expected = vec![a.sync_session_id, b.sync_session_id];
        expected.sort();
        assert_eq!(owned, expected);

        for id in owned {
            sync.fail_session(id);
        }
        assert!(sync.sessions_for_player(player).is_empty());
        assert!(sync.snapshot(other.sync_session_id).is_ok());
    }

    #[test]
    fn test_unknown_ids_surface_typed_errors() {
        let sync = synchronizer();
        assert!(matches!(
            sync.snapshot(Uuid::new_v4()),
            Err(SyncError::SessionNotFound(_))
        ));
        assert!(matches!(
            sync.recovery_status(Uuid::new_v4()),
            Err(SyncError::RecoveryNotFound(_))
        ));
    }
}
