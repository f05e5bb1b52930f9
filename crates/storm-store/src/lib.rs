//! # storm-store — Persistence boundary
//!
//! Key/row tables for players, live sessions, and finalized spin results,
//! plus the per-player serialization guards that back the concurrency
//! model: one logical writer per player, parallel across players.
//!
//! This crate is the seam a relational backend would slot into; the
//! in-memory implementation keeps the same transactional shape (short
//! critical sections, `(player_id, created_at)` scan order for history).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use storm_engine::SpinResult;

/// A registered player
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRow {
    pub player_id: Uuid,
    pub username: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

/// A live login session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRow {
    pub session_id: Uuid,
    pub player_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// A finalized spin result bound to its player
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSpin {
    pub player_id: Uuid,
    pub bet_time: DateTime<Utc>,
    pub result: SpinResult,
}

/// The store
pub struct Store {
    players: RwLock<HashMap<Uuid, PlayerRow>>,
    sessions: RwLock<HashMap<Uuid, SessionRow>>,
    /// Spin results by spin id
    spins: RwLock<HashMap<String, Arc<StoredSpin>>>,
    /// Per-player spin ids in `created_at` order
    spin_index: RwLock<HashMap<Uuid, Vec<String>>>,
    /// Per-player serialization guards for the spin pipeline
    guards: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl Store {
    pub fn new() -> Self {
        Self {
            players: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            spins: RwLock::new(HashMap::new()),
            spin_index: RwLock::new(HashMap::new()),
            guards: Mutex::new(HashMap::new()),
        }
    }

    // ── players ────────────────────────────────────────────────────────

    pub fn upsert_player(&self, player: PlayerRow) {
        self.players.write().insert(player.player_id, player);
    }

    pub fn player(&self, player_id: Uuid) -> Option<PlayerRow> {
        self.players.read().get(&player_id).cloned()
    }

    pub fn is_admin(&self, player_id: Uuid) -> bool {
        self.players
            .read()
            .get(&player_id)
            .is_some_and(|p| p.is_admin)
    }

    // ── sessions ───────────────────────────────────────────────────────

    pub fn record_session(&self, session: SessionRow) {
        self.sessions.write().insert(session.session_id, session);
    }

    pub fn touch_session(&self, session_id: Uuid, at: DateTime<Utc>) {
        if let Some(session) = self.sessions.write().get_mut(&session_id) {
            session.last_seen = at;
        }
    }

    pub fn session(&self, session_id: Uuid) -> Option<SessionRow> {
        self.sessions.read().get(&session_id).cloned()
    }

    pub fn remove_session(&self, session_id: Uuid) -> Option<SessionRow> {
        self.sessions.write().remove(&session_id)
    }

    /// Sessions whose `last_seen` predates `cutoff`
    pub fn idle_sessions(&self, cutoff: DateTime<Utc>) -> Vec<SessionRow> {
        self.sessions
            .read()
            .values()
            .filter(|s| s.last_seen < cutoff)
            .cloned()
            .collect()
    }

    // ── spin results ───────────────────────────────────────────────────

    /// Persist a finalized result; results are read-only afterwards
    pub fn record_spin(&self, player_id: Uuid, result: SpinResult) -> Arc<StoredSpin> {
        let stored = Arc::new(StoredSpin {
            player_id,
            bet_time: result.timestamp,
            result,
        });
        let spin_id = stored.result.spin_id.clone();
        self.spins.write().insert(spin_id.clone(), stored.clone());
        self.spin_index
            .write()
            .entry(player_id)
            .or_default()
            .push(spin_id);
        stored
    }

    pub fn spin(&self, spin_id: &str) -> Option<Arc<StoredSpin>> {
        self.spins.read().get(spin_id).cloned()
    }

    /// One page of a player's spins in `created_at` order
    pub fn spins_for(
        &self,
        player_id: Uuid,
        page: usize,
        limit: usize,
        newest_first: bool,
    ) -> (Vec<Arc<StoredSpin>>, usize) {
        let index = self.spin_index.read();
        let Some(ids) = index.get(&player_id) else {
            return (Vec::new(), 0);
        };
        let total = ids.len();
        let limit = limit.max(1);
        let start = (page.max(1) - 1) * limit;

        let spins = self.spins.read();
        let page_ids: Vec<&String> = if newest_first {
            ids.iter().rev().skip(start).take(limit).collect()
        } else {
            ids.iter().skip(start).take(limit).collect()
        };
        let items = page_ids
            .into_iter()
            .filter_map(|id| spins.get(id).cloned())
            .collect();
        (items, total)
    }

    // ── serialization guards ───────────────────────────────────────────

    /// The per-player guard serializing the spin pipeline
    ///
    /// Held across debit → engine → credit so wallet and session
    /// invariants cannot interleave for one player.
    pub fn spin_guard(&self, player_id: Uuid) -> Arc<AsyncMutex<()>> {
        self.guards
            .lock()
            .entry(player_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}
