//! Per-connection cascade-sync transport
//!
//! One [`SyncTransport`] per WebSocket, owned by the socket's bridge task.
//! It turns client events into synchronizer transitions and queues the
//! outbound events; ack-timeout timers are tokio sleeps that feed back
//! into the bridge loop through the timer channel, so every timer firing
//! is an ordinary message.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use uuid::Uuid;

use storm_sync::{
    grid_state_hash, validate_grid_structure, AckOutcome, RecoveryOutcome, RecoveryPlan,
    SyncSession, TimeoutOutcome,
};

use crate::protocol::{AlertSeverity, BatchAckEntry, ClientEvent, ServerEvent, StepControlAction};
use crate::state::AppState;

/// Internal timer firings routed back through the bridge loop
#[derive(Debug, Clone, Copy)]
pub enum TimerEvent {
    AckDeadline {
        sync_session_id: Uuid,
        step_index: u32,
    },
}

/// Per-socket protocol driver
pub struct SyncTransport {
    state: Arc<AppState>,
    player_id: Uuid,
    out_tx: UnboundedSender<ServerEvent>,
    timer_tx: UnboundedSender<TimerEvent>,
    ack_timers: HashMap<Uuid, JoinHandle<()>>,
    last_seen: Instant,
}

impl SyncTransport {
    pub fn new(
        state: Arc<AppState>,
        player_id: Uuid,
        out_tx: UnboundedSender<ServerEvent>,
        timer_tx: UnboundedSender<TimerEvent>,
    ) -> Self {
        Self {
            state,
            player_id,
            out_tx,
            timer_tx,
            ack_timers: HashMap::new(),
            last_seen: Instant::now(),
        }
    }

    fn send(&self, event: ServerEvent) {
        // A closed channel means the bridge is tearing down; nothing to do
        let _ = self.out_tx.send(event);
    }

    /// Any inbound traffic proves the peer is alive
    pub fn mark_alive(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Emit a heartbeat; `false` means the peer has been silent past the
    /// cutoff and the caller should disconnect
    pub fn heartbeat_tick(&mut self) -> bool {
        let interval = Duration::from_millis(self.state.config.timers.heartbeat_interval_ms);
        if self.last_seen.elapsed() > interval * 2 {
            log::warn!(
                "transport {}: peer silent for {:?}, disconnecting",
                self.player_id,
                self.last_seen.elapsed()
            );
            return false;
        }
        self.send(ServerEvent::Heartbeat {
            timestamp: Utc::now(),
        });
        true
    }

    /// Tear down everything this socket owned
    pub fn shutdown(&mut self) {
        for (_, timer) in self.ack_timers.drain() {
            timer.abort();
        }
        for sync_id in self.state.synchronizer.sessions_for_player(self.player_id) {
            self.state.synchronizer.fail_session(sync_id);
            self.state.sessions.detach_sync_session(self.player_id, sync_id);
        }
        log::info!("transport {}: cleaned up", self.player_id);
    }

    // ── timers ─────────────────────────────────────────────────────────

    fn arm_ack_timer(&mut self, sync_session_id: Uuid, step_index: u32) {
        self.cancel_ack_timer(sync_session_id);
        let timeout = Duration::from_millis(self.state.config.timers.ack_timeout_ms);
        let timer_tx = self.timer_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = timer_tx.send(TimerEvent::AckDeadline {
                sync_session_id,
                step_index,
            });
        });
        self.ack_timers.insert(sync_session_id, handle);
    }

    fn cancel_ack_timer(&mut self, sync_session_id: Uuid) {
        if let Some(timer) = self.ack_timers.remove(&sync_session_id) {
            timer.abort();
        }
    }

    pub fn handle_timer(&mut self, event: TimerEvent) {
        match event {
            TimerEvent::AckDeadline {
                sync_session_id,
                step_index,
            } => self.on_ack_deadline(sync_session_id, step_index),
        }
    }

    fn on_ack_deadline(&mut self, sync_session_id: Uuid, step_index: u32) {
        let Ok(snapshot) = self.state.synchronizer.snapshot(sync_session_id) else {
            return;
        };
        // Stale deadline: the step was acked or the session moved on
        if snapshot.current_step_index != step_index
            || snapshot.status != storm_sync::SyncStatus::Broadcasting
        {
            return;
        }
        match self.state.synchronizer.handle_ack_timeout(sync_session_id) {
            Ok(TimeoutOutcome::Retry { attempt }) => {
                self.broadcast_current_step(sync_session_id, Some(attempt));
            }
            Ok(TimeoutOutcome::Exhausted { plan }) => {
                self.send_recovery_data(&plan);
            }
            Err(err) => {
                log::debug!("transport: stale ack deadline: {err}");
            }
        }
    }

    // ── outbound helpers ───────────────────────────────────────────────

    /// Broadcast the step under the session cursor and arm its deadline
    fn broadcast_current_step(&mut self, sync_session_id: Uuid, retry_attempt: Option<u32>) {
        let Ok(snapshot) = self.state.synchronizer.snapshot(sync_session_id) else {
            return;
        };
        let Some(sealed) = snapshot.current_step() else {
            // Empty cascade or everything delivered; nothing to broadcast
            return;
        };
        let step_index = sealed.step.step_index;
        self.send(ServerEvent::CascadeStepBroadcast {
            sync_session_id,
            step_index,
            cascade_step: sealed.step.clone(),
            server_timestamp: Utc::now(),
            expected_acknowledgment: sealed.expected_hash.clone(),
            timeout_ms: self.state.config.timers.ack_timeout_ms,
            retry_attempt,
        });
        self.arm_ack_timer(sync_session_id, step_index);
    }

    fn send_recovery_data(&mut self, plan: &RecoveryPlan) {
        self.cancel_ack_timer(plan.sync_session_id);
        match self.state.synchronizer.recovery_data(plan.recovery_id) {
            Ok(data) => self.send(ServerEvent::RecoveryData {
                success: true,
                sync_session_id: plan.sync_session_id,
                desync_type: plan.desync_type,
                recovery_type: plan.recovery_type,
                recovery_data: data,
                recovery_id: plan.recovery_id,
                estimated_duration_ms: plan.estimated_duration_ms,
                processing_time_ms: 0,
            }),
            Err(err) => self.send(ServerEvent::error(
                "recovery_data",
                "recovery_not_found",
                err.to_string(),
            )),
        }
    }

    // ── inbound events ─────────────────────────────────────────────────

    pub fn handle_event(&mut self, event: ClientEvent) {
        self.mark_alive();
        match event {
            ClientEvent::CascadeSyncStart {
                spin_id,
                player_id,
                grid_state,
                enable_broadcast,
            } => self.on_sync_start(&spin_id, player_id, grid_state, enable_broadcast),
            ClientEvent::CascadeStepNext {
                sync_session_id,
                ready_for_next,
                ..
            } => self.on_step_next(sync_session_id, ready_for_next),
            ClientEvent::CascadeStepControl {
                sync_session_id,
                action,
                step_index,
            } => self.on_step_control(sync_session_id, action, step_index),
            ClientEvent::StepValidationRequest {
                sync_session_id,
                step_index,
                grid_state,
                client_hash,
                client_timestamp,
                phase_type,
            } => self.on_step_validation(
                sync_session_id,
                step_index,
                grid_state,
                &client_hash,
                client_timestamp,
                phase_type,
            ),
            ClientEvent::AcknowledgmentTimeout {
                sync_session_id, ..
            } => self.on_client_timeout(sync_session_id),
            ClientEvent::BatchAcknowledgment {
                sync_session_id,
                acknowledgments,
            } => self.on_batch_ack(sync_session_id, acknowledgments),
            ClientEvent::DesyncDetected {
                sync_session_id,
                desync_type,
                step_index,
                ..
            } => self.on_desync(sync_session_id, desync_type, step_index),
            ClientEvent::RecoveryApply {
                recovery_id,
                recovery_result,
                ..
            } => self.on_recovery_apply(recovery_id, recovery_result),
            ClientEvent::RecoveryStatus { recovery_id } => self.on_recovery_status(recovery_id),
            ClientEvent::ForceResync {
                sync_session_id,
                from_step_index,
            } => self.on_force_resync(sync_session_id, from_step_index),
            ClientEvent::GridValidationRequest {
                grid_state,
                expected_hash,
                salt,
                ..
            } => self.on_grid_validation(grid_state, &expected_hash, &salt),
            ClientEvent::SyncSessionComplete {
                sync_session_id,
                total_win,
                ..
            } => self.on_session_complete(sync_session_id, total_win),
            ClientEvent::HeartbeatResponse => {}
        }
    }

    fn on_sync_start(
        &mut self,
        spin_id: &str,
        player_id: Uuid,
        grid_state: Option<storm_sync::ClientGrid>,
        enable_broadcast: Option<bool>,
    ) {
        if player_id != self.player_id {
            self.send(ServerEvent::error(
                "cascade_sync_start",
                "unauthorized",
                "player mismatch",
            ));
            return;
        }
        let Some(stored) = self.state.store.spin(spin_id) else {
            self.send(ServerEvent::error(
                "cascade_sync_start",
                "spin_not_found",
                format!("unknown spin {spin_id}"),
            ));
            return;
        };
        if stored.player_id != self.player_id {
            self.send(ServerEvent::error(
                "cascade_sync_start",
                "unauthorized",
                "spin belongs to another player",
            ));
            return;
        }
        if let Some(grid) = &grid_state {
            if let Err(err) = validate_grid_structure(grid) {
                self.send(ServerEvent::ValidationAlert {
                    alert_type: "grid_structure".into(),
                    severity: AlertSeverity::Warning,
                    message: "client grid rejected at sync start".into(),
                    details: Some(err.to_string()),
                });
            }
        }

        let started = Instant::now();
        let session = match self
            .state
            .synchronizer
            .start_sync_session(self.player_id, &stored.result)
        {
            Ok(session) => session,
            Err(err) => {
                self.send(ServerEvent::error(
                    "cascade_sync_start",
                    "sync_start_failed",
                    err.to_string(),
                ));
                return;
            }
        };
        let _ = self
            .state
            .sessions
            .attach_sync_session(self.player_id, session.sync_session_id);

        let broadcast_enabled = enable_broadcast.unwrap_or(true);
        self.send(ServerEvent::SyncSessionStart {
            success: true,
            sync_session_id: session.sync_session_id,
            validation_salt: session.validation_salt.clone(),
            sync_seed: session.sync_seed,
            server_timestamp: Utc::now(),
            broadcast_enabled,
            processing_time_ms: started.elapsed().as_millis() as u64,
        });
        if broadcast_enabled {
            self.broadcast_current_step(session.sync_session_id, None);
        }
    }

    fn on_step_next(&mut self, sync_session_id: Uuid, ready_for_next: bool) {
        if ready_for_next {
            self.broadcast_current_step(sync_session_id, None);
        } else if let Err(err) = self.state.synchronizer.pause(sync_session_id) {
            self.send(ServerEvent::error(
                "cascade_step_next",
                "pause_failed",
                err.to_string(),
            ));
        }
    }

    fn on_step_control(
        &mut self,
        sync_session_id: Uuid,
        action: StepControlAction,
        step_index: Option<u32>,
    ) {
        let outcome = match action {
            StepControlAction::Pause => self.state.synchronizer.pause(sync_session_id),
            StepControlAction::Resume => {
                let resumed = self.state.synchronizer.resume(sync_session_id);
                if resumed.is_ok() {
                    self.broadcast_current_step(sync_session_id, None);
                }
                resumed
            }
            StepControlAction::SkipTo => self
                .state
                .synchronizer
                .force_resync(sync_session_id, step_index.unwrap_or(0))
                .map(|_| self.broadcast_current_step(sync_session_id, None)),
            StepControlAction::Restart => self
                .state
                .synchronizer
                .force_resync(sync_session_id, 0)
                .map(|_| self.broadcast_current_step(sync_session_id, None)),
        };
        if let Err(err) = outcome {
            self.send(ServerEvent::error(
                "cascade_step_control",
                "control_failed",
                err.to_string(),
            ));
        }
    }

    fn on_step_validation(
        &mut self,
        sync_session_id: Uuid,
        step_index: u32,
        grid_state: Option<storm_sync::ClientGrid>,
        client_hash: &str,
        client_timestamp: i64,
        phase_type: Option<String>,
    ) {
        if let Some(grid) = &grid_state {
            if let Err(err) = validate_grid_structure(grid) {
                self.send(ServerEvent::ValidationAlert {
                    alert_type: "grid_structure".into(),
                    severity: AlertSeverity::Warning,
                    message: format!("malformed client grid at step {step_index}"),
                    details: Some(err.to_string()),
                });
            }
        }

        let started = Instant::now();
        match self.state.synchronizer.acknowledge_step(
            sync_session_id,
            step_index,
            client_hash,
            client_timestamp,
        ) {
            Ok(AckOutcome::Accepted {
                next_step,
                completed,
            }) => {
                self.cancel_ack_timer(sync_session_id);
                let snapshot = self.state.synchronizer.snapshot(sync_session_id).ok();
                let (server_hash, next_step_data, sync_status) = match &snapshot {
                    Some(session) => (
                        session
                            .step(step_index)
                            .map(|s| s.expected_hash.clone())
                            .unwrap_or_default(),
                        session.step(next_step).map(|s| Box::new(s.step.clone())),
                        session.status,
                    ),
                    None => (String::new(), None, storm_sync::SyncStatus::Completed),
                };
                self.send(ServerEvent::StepValidationResponse {
                    success: true,
                    step_index,
                    phase_type,
                    step_validated: true,
                    server_hash,
                    next_step_data,
                    sync_status,
                    validation_feedback: None,
                    processing_time_ms: started.elapsed().as_millis() as u64,
                });
                if !completed {
                    self.broadcast_current_step(sync_session_id, None);
                }
            }
            Ok(AckOutcome::Duplicate { server_hash }) => {
                self.send(ServerEvent::StepValidationResponse {
                    success: true,
                    step_index,
                    phase_type,
                    step_validated: true,
                    server_hash,
                    next_step_data: None,
                    sync_status: self
                        .state
                        .synchronizer
                        .snapshot(sync_session_id)
                        .map(|s| s.status)
                        .unwrap_or(storm_sync::SyncStatus::Completed),
                    validation_feedback: Some("duplicate acknowledgment".into()),
                    processing_time_ms: started.elapsed().as_millis() as u64,
                });
            }
            Ok(AckOutcome::Desync { plan }) => {
                self.send_recovery_data(&plan);
            }
            Err(err) => {
                self.send(ServerEvent::error(
                    "step_validation_request",
                    "validation_failed",
                    err.to_string(),
                ));
            }
        }
    }

    fn on_client_timeout(&mut self, sync_session_id: Uuid) {
        match self.state.synchronizer.handle_ack_timeout(sync_session_id) {
            Ok(TimeoutOutcome::Retry { attempt }) => {
                self.broadcast_current_step(sync_session_id, Some(attempt));
            }
            Ok(TimeoutOutcome::Exhausted { plan }) => self.send_recovery_data(&plan),
            Err(err) => self.send(ServerEvent::error(
                "acknowledgment_timeout",
                "timeout_failed",
                err.to_string(),
            )),
        }
    }

    fn on_batch_ack(&mut self, sync_session_id: Uuid, entries: Vec<BatchAckEntry>) {
        for entry in entries {
            self.on_step_validation(
                sync_session_id,
                entry.step_index,
                None,
                &entry.client_hash,
                entry.client_timestamp,
                None,
            );
        }
    }

    fn on_desync(
        &mut self,
        sync_session_id: Uuid,
        desync_type: storm_sync::DesyncType,
        step_index: u32,
    ) {
        match self
            .state
            .synchronizer
            .report_desync(sync_session_id, desync_type, step_index)
        {
            Ok(plan) => self.send_recovery_data(&plan),
            Err(err) => self.send(ServerEvent::error(
                "desync_detected",
                "desync_failed",
                err.to_string(),
            )),
        }
    }

    fn on_recovery_apply(&mut self, recovery_id: Uuid, recovery_result: bool) {
        match self
            .state
            .synchronizer
            .apply_recovery_result(recovery_id, recovery_result)
        {
            Ok(RecoveryOutcome::Resumed { resume_step }) => {
                self.send(ServerEvent::RecoveryApplyResponse {
                    success: true,
                    recovery_id,
                    recovery_successful: true,
                    sync_restored: true,
                    new_sync_state: Some(storm_sync::SyncStatus::Broadcasting),
                    next_actions: vec![format!("resume_from_step_{resume_step}")],
                });
                if let Some(sync_id) = self.sync_for_recovery(recovery_id) {
                    self.broadcast_current_step(sync_id, None);
                }
            }
            Ok(RecoveryOutcome::AlreadyApplied) => {
                self.send(ServerEvent::RecoveryApplyResponse {
                    success: true,
                    recovery_id,
                    recovery_successful: true,
                    sync_restored: true,
                    new_sync_state: None,
                    next_actions: vec!["none".into()],
                });
            }
            Ok(RecoveryOutcome::Retrying { plan }) => {
                self.send(ServerEvent::RecoveryApplyResponse {
                    success: true,
                    recovery_id,
                    recovery_successful: false,
                    sync_restored: false,
                    new_sync_state: Some(storm_sync::SyncStatus::Recovering),
                    next_actions: vec!["apply_new_recovery".into()],
                });
                self.send_recovery_data(&plan);
            }
            Ok(RecoveryOutcome::Failed) => {
                self.send(ServerEvent::RecoveryApplyResponse {
                    success: true,
                    recovery_id,
                    recovery_successful: false,
                    sync_restored: false,
                    new_sync_state: Some(storm_sync::SyncStatus::Failed),
                    next_actions: vec!["restart_session".into()],
                });
            }
            Err(err) => self.send(ServerEvent::error(
                "recovery_apply",
                "recovery_not_found",
                err.to_string(),
            )),
        }
    }

    fn sync_for_recovery(&self, recovery_id: Uuid) -> Option<Uuid> {
        self.state
            .synchronizer
            .recovery_status(recovery_id)
            .ok()
            .map(|plan| plan.sync_session_id)
    }

    fn on_recovery_status(&mut self, recovery_id: Uuid) {
        match self.state.synchronizer.recovery_status(recovery_id) {
            Ok(plan) => self.send_recovery_data(&plan),
            Err(err) => self.send(ServerEvent::error(
                "recovery_status",
                "recovery_not_found",
                err.to_string(),
            )),
        }
    }

    fn on_force_resync(&mut self, sync_session_id: Uuid, from_step_index: u32) {
        match self
            .state
            .synchronizer
            .force_resync(sync_session_id, from_step_index)
        {
            Ok(_) => self.broadcast_current_step(sync_session_id, None),
            Err(err) => self.send(ServerEvent::error(
                "force_resync",
                "resync_failed",
                err.to_string(),
            )),
        }
    }

    fn on_grid_validation(
        &mut self,
        grid_state: storm_sync::ClientGrid,
        expected_hash: &str,
        salt: &str,
    ) {
        let (valid, server_hash) = match grid_state.to_grid() {
            Some(grid) => {
                let server_hash = grid_state_hash(&grid, salt);
                (server_hash == expected_hash, server_hash)
            }
            None => (false, String::new()),
        };
        self.send(ServerEvent::GridValidationResponse {
            success: true,
            valid,
            server_hash,
        });
    }

    fn on_session_complete(&mut self, sync_session_id: Uuid, total_win: storm_core::Amount) {
        let started = Instant::now();
        match self
            .state
            .synchronizer
            .complete_session(sync_session_id, total_win)
        {
            Ok(report) => {
                if report.validated {
                    self.cancel_ack_timer(sync_session_id);
                    self.state
                        .sessions
                        .detach_sync_session(self.player_id, sync_session_id);
                }
                self.send(ServerEvent::SyncSessionCompleteResponse {
                    success: true,
                    validated: report.validated,
                    performance_score: report.performance_score,
                    total_steps: report.total_steps,
                    performance_report: report.metrics,
                    processing_time_ms: started.elapsed().as_millis() as u64,
                });
            }
            Err(err) => self.send(ServerEvent::error(
                "sync_session_complete",
                "session_not_found",
                err.to_string(),
            )),
        }
    }

    /// Snapshot accessor for tests and diagnostics
    pub fn session_snapshot(&self, sync_session_id: Uuid) -> Option<SyncSession> {
        self.state.synchronizer.snapshot(sync_session_id).ok()
    }
}
