//! Wire protocol for the cascade-sync WebSocket
//!
//! Messages are JSON objects tagged by a `type` field holding the stable
//! event name; payload fields are camelCase. Client events deserialize
//! into [`ClientEvent`], outbound events serialize from [`ServerEvent`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use storm_core::Amount;
use storm_engine::CascadeStep;
use storm_sync::{ClientGrid, DesyncType, RecoveryData, RecoveryType, SyncMetrics};

/// Step-control actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepControlAction {
    Pause,
    Resume,
    SkipTo,
    Restart,
}

/// One entry of a batched acknowledgment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchAckEntry {
    pub step_index: u32,
    pub client_hash: String,
    #[serde(default)]
    pub client_timestamp: i64,
}

/// Client → server events
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    CascadeSyncStart {
        spin_id: String,
        player_id: Uuid,
        #[serde(default)]
        grid_state: Option<ClientGrid>,
        #[serde(default)]
        enable_broadcast: Option<bool>,
    },
    #[serde(rename_all = "camelCase")]
    CascadeStepNext {
        sync_session_id: Uuid,
        current_step_index: u32,
        ready_for_next: bool,
    },
    #[serde(rename_all = "camelCase")]
    CascadeStepControl {
        sync_session_id: Uuid,
        action: StepControlAction,
        #[serde(default)]
        step_index: Option<u32>,
    },
    #[serde(rename_all = "camelCase")]
    StepValidationRequest {
        sync_session_id: Uuid,
        step_index: u32,
        #[serde(default)]
        grid_state: Option<ClientGrid>,
        client_hash: String,
        client_timestamp: i64,
        #[serde(default)]
        phase_type: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    AcknowledgmentTimeout {
        sync_session_id: Uuid,
        step_index: u32,
        #[serde(default)]
        timeout_reason: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    BatchAcknowledgment {
        sync_session_id: Uuid,
        acknowledgments: Vec<BatchAckEntry>,
    },
    #[serde(rename_all = "camelCase")]
    DesyncDetected {
        sync_session_id: Uuid,
        desync_type: DesyncType,
        #[serde(default)]
        client_state: Option<ClientGrid>,
        step_index: u32,
        #[serde(default)]
        desync_details: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    RecoveryApply {
        recovery_id: Uuid,
        sync_session_id: Uuid,
        #[serde(default)]
        client_state: Option<ClientGrid>,
        recovery_result: bool,
    },
    #[serde(rename_all = "camelCase")]
    RecoveryStatus { recovery_id: Uuid },
    #[serde(rename_all = "camelCase")]
    ForceResync {
        sync_session_id: Uuid,
        from_step_index: u32,
    },
    #[serde(rename_all = "camelCase")]
    GridValidationRequest {
        grid_state: ClientGrid,
        expected_hash: String,
        salt: String,
        #[serde(default)]
        sync_session_id: Option<Uuid>,
    },
    #[serde(rename_all = "camelCase")]
    SyncSessionComplete {
        sync_session_id: Uuid,
        #[serde(default)]
        final_grid_state: Option<ClientGrid>,
        total_win: Amount,
        #[serde(default)]
        client_hash: Option<String>,
        #[serde(default)]
        session_metrics: Option<serde_json::Value>,
    },
    HeartbeatResponse,
}

/// Alert severity for `validation_alert`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

/// Server → client events
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    SyncSessionStart {
        success: bool,
        sync_session_id: Uuid,
        validation_salt: String,
        sync_seed: u64,
        server_timestamp: DateTime<Utc>,
        broadcast_enabled: bool,
        processing_time_ms: u64,
    },
    #[serde(rename_all = "camelCase")]
    CascadeStepBroadcast {
        sync_session_id: Uuid,
        step_index: u32,
        cascade_step: CascadeStep,
        server_timestamp: DateTime<Utc>,
        /// Salted hash the client must echo back
        expected_acknowledgment: String,
        timeout_ms: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        retry_attempt: Option<u32>,
    },
    #[serde(rename_all = "camelCase")]
    StepValidationResponse {
        success: bool,
        step_index: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        phase_type: Option<String>,
        step_validated: bool,
        server_hash: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        next_step_data: Option<Box<CascadeStep>>,
        sync_status: storm_sync::SyncStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        validation_feedback: Option<String>,
        processing_time_ms: u64,
    },
    #[serde(rename_all = "camelCase")]
    RecoveryData {
        success: bool,
        sync_session_id: Uuid,
        desync_type: DesyncType,
        recovery_type: RecoveryType,
        recovery_data: RecoveryData,
        recovery_id: Uuid,
        estimated_duration_ms: u64,
        processing_time_ms: u64,
    },
    #[serde(rename_all = "camelCase")]
    RecoveryApplyResponse {
        success: bool,
        recovery_id: Uuid,
        recovery_successful: bool,
        sync_restored: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        new_sync_state: Option<storm_sync::SyncStatus>,
        next_actions: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    SyncSessionCompleteResponse {
        success: bool,
        validated: bool,
        performance_score: u32,
        total_steps: u32,
        performance_report: SyncMetrics,
        processing_time_ms: u64,
    },
    #[serde(rename_all = "camelCase")]
    GridValidationResponse {
        success: bool,
        valid: bool,
        server_hash: String,
    },
    #[serde(rename_all = "camelCase")]
    Heartbeat { timestamp: DateTime<Utc> },
    #[serde(rename_all = "camelCase")]
    ValidationAlert {
        alert_type: String,
        severity: AlertSeverity,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
    /// Per-event failure; the socket stays up
    #[serde(rename_all = "camelCase")]
    Error {
        success: bool,
        event: String,
        error: String,
        error_message: String,
    },
}

impl ServerEvent {
    /// Failure reply for a named inbound event
    pub fn error(event: &str, error: &str, message: impl Into<String>) -> Self {
        ServerEvent::Error {
            success: false,
            event: event.to_string(),
            error: error.to_string(),
            error_message: message.into(),
        }
    }
}
