//! Session directory and spin orchestration

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use uuid::Uuid;

use storm_core::{Amount, GameConfig, StormError};
use storm_engine::{EngineError, GridEngine, SpinParams};
use storm_rng::SpinRng;
use storm_store::{SessionRow, Store, StoredSpin};
use storm_wallet::{Wallet, WalletError};

use crate::session::{GameSession, SessionStats, SessionView};

/// Session-layer failure
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("no active session for player {0}")]
    NotFound(Uuid),

    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl From<SessionError> for StormError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound(id) => StormError::SessionNotFound(id.to_string()),
            SessionError::Wallet(inner) => inner.into(),
            SessionError::Engine(EngineError::InvalidBet(msg)) => StormError::InvalidBet(msg),
            SessionError::Engine(inner @ EngineError::MaxCascadeDepth(_)) => {
                StormError::EngineFatal(inner.to_string())
            }
        }
    }
}

/// Everything a spin call returns to the boundary
#[derive(Debug, Clone)]
pub struct SpinOutcome {
    pub stored: Arc<StoredSpin>,
    pub balance: Amount,
    pub free_spins_remaining: u32,
    pub accumulated_multiplier: u32,
}

/// Directory of live sessions and owner of the spin pipeline
///
/// Spins run inside the player's serialization guard: debit, engine,
/// credit, and counter updates cannot interleave for one player. Different
/// players proceed in parallel.
pub struct SessionManager {
    engine: GridEngine,
    wallet: Arc<Wallet>,
    store: Arc<Store>,
    sessions: RwLock<HashMap<Uuid, Arc<Mutex<GameSession>>>>,
    idle_timeout: Duration,
}

impl SessionManager {
    pub fn new(config: Arc<GameConfig>, wallet: Arc<Wallet>, store: Arc<Store>) -> Self {
        Self {
            engine: GridEngine::new(config),
            wallet,
            store,
            sessions: RwLock::new(HashMap::new()),
            idle_timeout: Duration::minutes(30),
        }
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn engine(&self) -> &GridEngine {
        &self.engine
    }

    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    // ── lifecycle ──────────────────────────────────────────────────────

    /// Open a session with a fresh secure seed chain
    pub fn login(&self, player_id: Uuid) -> SessionView {
        let mut key = [0u8; 32];
        let mut rng = SpinRng::secure();
        for chunk in key.chunks_mut(8) {
            chunk.copy_from_slice(&rng.next_u64().to_le_bytes());
        }
        self.login_with_key(player_id, key)
    }

    /// Open a session with a caller-supplied seed key (replay, tests)
    ///
    /// A re-login retires the previous session first so the idle sweeper
    /// never sees a stale row for an active player.
    pub fn login_with_key(&self, player_id: Uuid, seed_key: [u8; 32]) -> SessionView {
        if let Some(previous) = self.sessions.read().get(&player_id).cloned() {
            self.store.remove_session(previous.lock().session_id);
        }
        let session = GameSession::new(player_id, seed_key);
        let now = Utc::now();
        self.store.record_session(SessionRow {
            session_id: session.session_id,
            player_id,
            created_at: now,
            last_seen: now,
        });
        let view = session.view(self.wallet.balance(player_id).unwrap_or(Amount::ZERO));
        log::info!("session {} opened for player {player_id}", session.session_id);
        self.sessions
            .write()
            .insert(player_id, Arc::new(Mutex::new(session)));
        view
    }

    /// Close a player's session and release its resources
    pub fn logout(&self, player_id: Uuid) -> Result<(), SessionError> {
        let session = self
            .sessions
            .write()
            .remove(&player_id)
            .ok_or(SessionError::NotFound(player_id))?;
        let session = session.lock();
        self.store.remove_session(session.session_id);
        log::info!("session {} closed", session.session_id);
        Ok(())
    }

    /// Drop sessions idle past the configured timeout
    pub fn cleanup_idle(&self) -> usize {
        let cutoff = Utc::now() - self.idle_timeout;
        let idle = self.store.idle_sessions(cutoff);
        let mut dropped = 0;
        for row in idle {
            if self.logout(row.player_id).is_ok() {
                dropped += 1;
            }
        }
        if dropped > 0 {
            log::info!("dropped {dropped} idle sessions");
        }
        dropped
    }

    fn session_handle(&self, player_id: Uuid) -> Result<Arc<Mutex<GameSession>>, SessionError> {
        self.sessions
            .read()
            .get(&player_id)
            .cloned()
            .ok_or(SessionError::NotFound(player_id))
    }

    pub fn view(&self, player_id: Uuid) -> Result<SessionView, SessionError> {
        let handle = self.session_handle(player_id)?;
        let session = handle.lock();
        let balance = self.wallet.balance(player_id)?;
        Ok(session.view(balance))
    }

    pub fn stats(&self, player_id: Uuid) -> Result<SessionStats, SessionError> {
        let handle = self.session_handle(player_id)?;
        let stats = handle.lock().stats.clone();
        Ok(stats)
    }

    pub fn attach_sync_session(&self, player_id: Uuid, sync_id: Uuid) -> Result<(), SessionError> {
        let handle = self.session_handle(player_id)?;
        handle.lock().attach_sync_session(sync_id);
        Ok(())
    }

    pub fn detach_sync_session(&self, player_id: Uuid, sync_id: Uuid) {
        if let Ok(handle) = self.session_handle(player_id) {
            handle.lock().detach_sync_session(sync_id);
        }
    }

    /// Sync sessions attached to a player, for disconnect cleanup
    pub fn active_sync_sessions(&self, player_id: Uuid) -> Vec<Uuid> {
        self.session_handle(player_id)
            .map(|h| h.lock().active_sync_sessions.clone())
            .unwrap_or_default()
    }

    // ── the spin pipeline ──────────────────────────────────────────────

    /// Play one spin: debit → engine → credit → counters → persist
    ///
    /// Runs inside the player's serialization guard. While free spins
    /// remain, the triggering bet is replayed and nothing is debited. A
    /// fatal engine error refunds the debit and surfaces as such.
    pub async fn spin(
        &self,
        player_id: Uuid,
        requested_bet: Amount,
    ) -> Result<SpinOutcome, SessionError> {
        let guard = self.store.spin_guard(player_id);
        let _serialized = guard.lock().await;

        let handle = self.session_handle(player_id)?;
        let spin_id = Uuid::new_v4().to_string();
        let timestamp = Utc::now();

        // Decide bet, mode, and seed under the session lock
        let (bet, charge, params) = {
            let mut session = handle.lock();
            let (bet, charge) = session.chargeable_bet(requested_bet);
            let mode = session.current_mode();
            if mode.is_free() {
                session.consume_free_spin();
            }
            let params = SpinParams {
                spin_id: spin_id.clone(),
                bet,
                mode,
                accumulated_multiplier: session.accumulated_multiplier,
                rng_seed: session.next_seed(),
                timestamp,
            };
            (bet, charge, params)
        };

        // Bet validation happens before the debit so a rejected bet leaves
        // no trace
        if charge {
            self.engine.check_bet(bet)?;
            self.wallet.process_bet(player_id, bet, &spin_id)?;
        }

        let result = match self.engine.compute_spin(params) {
            Ok(result) => result,
            Err(err) => {
                if err.is_fatal() && charge {
                    // Roll the debit back; the spin never happened
                    self.wallet
                        .process_adjustment(player_id, bet, "engine fatal refund", "system")?;
                }
                return Err(err.into());
            }
        };

        if result.total_win.is_positive() {
            self.wallet
                .process_win(player_id, result.total_win, &spin_id)?;
        }

        let (free_spins_remaining, accumulated_multiplier, session_id) = {
            let mut session = handle.lock();
            let charged = if charge { bet } else { Amount::ZERO };
            session.apply_result(&result, charged);
            (
                session.free_spins_remaining,
                session.accumulated_multiplier,
                session.session_id,
            )
        };
        self.store.touch_session(session_id, timestamp);

        let stored = self.store.record_spin(player_id, result);
        let balance = self.wallet.balance(player_id)?;

        Ok(SpinOutcome {
            stored,
            balance,
            free_spins_remaining,
            accumulated_multiplier,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storm_core::GameMode;

    fn manager() -> (SessionManager, Uuid) {
        let config = Arc::new(GameConfig::default());
        let wallet = Arc::new(Wallet::new());
        let store = Arc::new(Store::new());
        let manager = SessionManager::new(config, wallet, store);

        let player = Uuid::new_v4();
        manager
            .wallet()
            .create_account(player, Amount::from_major(10_000))
            .unwrap();
        manager.login_with_key(player, [9u8; 32]);
        (manager, player)
    }

    #[tokio::test]
    async fn test_spin_debits_bet_and_persists_result() {
        let (manager, player) = manager();
        let before = manager.wallet().balance(player).unwrap();

        let outcome = manager.spin(player, Amount::from_major(1)).await.unwrap();
        let result = &outcome.stored.result;
        assert!(result.verify());

        let expected = before - Amount::from_major(1) + result.total_win;
        assert_eq!(outcome.balance, expected);
        assert!(manager.store().spin(&result.spin_id).is_some());
        assert!(manager
            .wallet()
            .validate_consistency(player)
            .unwrap()
            .valid);
    }

    #[tokio::test]
    async fn test_spin_without_session_fails() {
        let config = Arc::new(GameConfig::default());
        let manager = SessionManager::new(
            config,
            Arc::new(Wallet::new()),
            Arc::new(Store::new()),
        );
        let err = manager
            .spin(Uuid::new_v4(), Amount::from_major(1))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_invalid_bet_leaves_no_trace() {
        let (manager, player) = manager();
        let before = manager.wallet().balance(player).unwrap();
        let err = manager.spin(player, Amount::ZERO).await.unwrap_err();
        assert!(matches!(err, SessionError::Engine(EngineError::InvalidBet(_))));
        assert_eq!(manager.wallet().balance(player).unwrap(), before);
        // Seed chain advanced but no transaction was recorded
        let report = manager.wallet().validate_consistency(player).unwrap();
        assert_eq!(report.transactions_validated, 1); // opening only
    }

    #[tokio::test]
    async fn test_free_spins_charge_nothing() {
        let (manager, player) = manager();

        // Hunt the deterministic chain for a trigger
        let mut triggered = None;
        for _ in 0..5_000 {
            let outcome = manager.spin(player, Amount::from_major(1)).await.unwrap();
            if outcome.stored.result.free_spins_triggered {
                triggered = Some(outcome);
                break;
            }
        }
        let triggered = triggered.expect("no trigger within 5000 spins");
        assert!(triggered.free_spins_remaining > 0);

        // The next spin is a free spin: no bet transaction, mode Free
        let before = manager.wallet().balance(player).unwrap();
        let outcome = manager.spin(player, Amount::from_major(5)).await.unwrap();
        let result = &outcome.stored.result;
        assert_eq!(result.game_mode, GameMode::Free);
        assert_eq!(result.bet_amount, Amount::from_major(1), "locked to triggering bet");
        assert_eq!(
            outcome.balance,
            before + result.total_win,
            "free spin must not debit"
        );
    }

    #[tokio::test]
    async fn test_spins_are_serialized_per_player() {
        let (manager, player) = manager();
        let manager = Arc::new(manager);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move {
                manager.spin(player, Amount::from_major(1)).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(manager
            .wallet()
            .validate_consistency(player)
            .unwrap()
            .valid);
        let (_, total) = manager.store().spins_for(player, 1, 10, true);
        assert_eq!(total, 8);
    }

    #[tokio::test]
    async fn test_logout_and_idle_cleanup() {
        let (manager, player) = manager();
        assert!(manager.view(player).is_ok());
        manager.logout(player).unwrap();
        assert!(matches!(
            manager.view(player),
            Err(SessionError::NotFound(_))
        ));

        // Fresh session with zero idle timeout is collected immediately
        let manager = manager.with_idle_timeout(Duration::zero());
        manager.login_with_key(player, [1u8; 32]);
        assert_eq!(manager.cleanup_idle(), 1);
    }

    #[tokio::test]
    async fn test_seeded_sessions_replay_identically() {
        let build = || {
            let config = Arc::new(GameConfig::default());
            let wallet = Arc::new(Wallet::new());
            let store = Arc::new(Store::new());
            let manager = SessionManager::new(config, wallet, store);
            let player = Uuid::new_v4();
            manager
                .wallet()
                .create_account(player, Amount::from_major(100))
                .unwrap();
            manager.login_with_key(player, [5u8; 32]);
            (manager, player)
        };
        let (manager_a, player_a) = build();
        let (manager_b, player_b) = build();

        for _ in 0..10 {
            let a = manager_a.spin(player_a, Amount::from_major(1)).await.unwrap();
            let b = manager_b.spin(player_b, Amount::from_major(1)).await.unwrap();
            assert_eq!(
                a.stored.result.initial_grid,
                b.stored.result.initial_grid
            );
            assert_eq!(a.stored.result.total_win, b.stored.result.total_win);
        }
    }
}
