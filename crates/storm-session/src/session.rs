//! Session state and the seed chain

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use storm_core::{Amount, GameMode};
use storm_engine::SpinResult;

/// Running per-session statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub total_spins: u64,
    pub total_bet: Amount,
    pub total_win: Amount,
    pub wins: u64,
    pub losses: u64,
    pub features_triggered: u64,
    pub cascade_chains: u64,
    pub max_win_ratio: f64,
}

impl SessionStats {
    /// Return-to-player over this session, as a ratio
    pub fn rtp(&self) -> f64 {
        if self.total_bet.is_positive() {
            self.total_win.cents() as f64 / self.total_bet.cents() as f64
        } else {
            0.0
        }
    }

    /// Share of spins that won anything
    pub fn hit_rate(&self) -> f64 {
        if self.total_spins > 0 {
            self.wins as f64 / self.total_spins as f64
        } else {
            0.0
        }
    }

    fn record(&mut self, result: &SpinResult, bet_charged: Amount) {
        self.total_spins += 1;
        self.total_bet += bet_charged;
        self.total_win += result.total_win;
        if result.is_win() {
            self.wins += 1;
        } else {
            self.losses += 1;
        }
        if result.free_spins_triggered {
            self.features_triggered += 1;
        }
        if result.cascade_count() > 1 {
            self.cascade_chains += 1;
        }
        let ratio = result.win_multiplier();
        if ratio > self.max_win_ratio {
            self.max_win_ratio = ratio;
        }
    }
}

/// Wire-safe snapshot of a session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub player_id: Uuid,
    pub session_id: Uuid,
    pub balance: Amount,
    pub current_seed_chain_position: u64,
    pub free_spins_remaining: u32,
    pub free_spins_total: u32,
    pub accumulated_multiplier: u32,
    pub active_sync_session_ids: Vec<Uuid>,
}

/// Authoritative per-player live state
///
/// Sole mutator of free-spin counters and the accumulated multiplier;
/// mutated only inside the player's serialization region.
pub struct GameSession {
    pub player_id: Uuid,
    pub session_id: Uuid,
    /// Secret key of the deterministic seed chain
    seed_key: [u8; 32],
    seed_position: u64,
    pub free_spins_remaining: u32,
    pub free_spins_total: u32,
    /// Bet locked in when free spins triggered
    free_spins_bet: Option<Amount>,
    /// ≥ 1; resets to 1 when a free-spin series ends
    pub accumulated_multiplier: u32,
    pub active_sync_sessions: Vec<Uuid>,
    pub stats: SessionStats,
    pub created_at: DateTime<Utc>,
}

impl GameSession {
    pub fn new(player_id: Uuid, seed_key: [u8; 32]) -> Self {
        Self {
            player_id,
            session_id: Uuid::new_v4(),
            seed_key,
            seed_position: 0,
            free_spins_remaining: 0,
            free_spins_total: 0,
            free_spins_bet: None,
            accumulated_multiplier: 1,
            active_sync_sessions: Vec::new(),
            stats: SessionStats::default(),
            created_at: Utc::now(),
        }
    }

    /// Advance the seed chain and return the next spin seed
    ///
    /// `seed_i = first 8 bytes of SHA-256(key ‖ i)`; the chain is
    /// reproducible from the key, so audited spins replay end to end.
    pub fn next_seed(&mut self) -> u64 {
        let mut hasher = Sha256::new();
        hasher.update(self.seed_key);
        hasher.update(self.seed_position.to_le_bytes());
        let digest = hasher.finalize();
        self.seed_position += 1;
        let mut seed = [0u8; 8];
        seed.copy_from_slice(&digest[..8]);
        u64::from_le_bytes(seed)
    }

    pub fn seed_position(&self) -> u64 {
        self.seed_position
    }

    /// Mode of the next spin
    pub fn current_mode(&self) -> GameMode {
        if self.free_spins_remaining > 0 {
            GameMode::Free
        } else {
            GameMode::Base
        }
    }

    pub fn in_free_spins(&self) -> bool {
        self.free_spins_remaining > 0
    }

    /// Bet to charge for the next spin: `None` while free spins remain
    pub fn chargeable_bet(&self, requested: Amount) -> (Amount, bool) {
        match (self.free_spins_remaining > 0, self.free_spins_bet) {
            (true, Some(locked)) => (locked, false),
            _ => (requested, true),
        }
    }

    /// Consume one free spin at spin start
    pub fn consume_free_spin(&mut self) {
        debug_assert!(self.free_spins_remaining > 0);
        self.free_spins_remaining = self.free_spins_remaining.saturating_sub(1);
    }

    /// Fold a finalized result into the session counters
    pub fn apply_result(&mut self, result: &SpinResult, bet_charged: Amount) {
        self.stats.record(result, bet_charged);

        match result.game_mode {
            GameMode::Base => {
                if result.free_spins_triggered {
                    self.free_spins_remaining = result.free_spins_awarded;
                    self.free_spins_total = result.free_spins_awarded;
                    self.free_spins_bet = Some(result.bet_amount);
                    self.accumulated_multiplier = 1;
                    log::info!(
                        "session {}: free spins triggered, {} awarded",
                        self.session_id,
                        result.free_spins_awarded
                    );
                }
            }
            GameMode::Free => {
                if result.free_spins_triggered {
                    self.free_spins_remaining += result.free_spins_awarded;
                    self.free_spins_total += result.free_spins_awarded;
                }
                self.accumulated_multiplier = self
                    .accumulated_multiplier
                    .saturating_add(result.free_spin_multiplier_earned);
                if self.free_spins_remaining == 0 {
                    // Series over
                    self.free_spins_total = 0;
                    self.free_spins_bet = None;
                    self.accumulated_multiplier = 1;
                }
            }
        }
    }

    pub fn attach_sync_session(&mut self, sync_id: Uuid) {
        if !self.active_sync_sessions.contains(&sync_id) {
            self.active_sync_sessions.push(sync_id);
        }
    }

    pub fn detach_sync_session(&mut self, sync_id: Uuid) {
        self.active_sync_sessions.retain(|&id| id != sync_id);
    }

    /// Snapshot for the wire; the balance is supplied by the wallet
    pub fn view(&self, balance: Amount) -> SessionView {
        SessionView {
            player_id: self.player_id,
            session_id: self.session_id,
            balance,
            current_seed_chain_position: self.seed_position,
            free_spins_remaining: self.free_spins_remaining,
            free_spins_total: self.free_spins_total,
            accumulated_multiplier: self.accumulated_multiplier,
            active_sync_session_ids: self.active_sync_sessions.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storm_core::Grid;
    use storm_core::Symbol;

    fn session() -> GameSession {
        GameSession::new(Uuid::new_v4(), [7u8; 32])
    }

    fn result(mode: GameMode, triggered: bool, awarded: u32, earned: u32) -> SpinResult {
        SpinResult {
            spin_id: "s".into(),
            bet_amount: Amount::from_major(1),
            rng_seed: 0,
            game_mode: mode,
            initial_grid: Grid::filled(Symbol::TimeGem),
            cascade_steps: Vec::new(),
            base_win: Amount::ZERO,
            total_multiplier: 1,
            total_win: Amount::ZERO,
            scatter_count: 0,
            free_spins_triggered: triggered,
            free_spins_awarded: awarded,
            free_spin_multiplier_earned: earned,
            validation_hash: String::new(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_seed_chain_reproducible_and_advancing() {
        let mut a = GameSession::new(Uuid::new_v4(), [1u8; 32]);
        let mut b = GameSession::new(Uuid::new_v4(), [1u8; 32]);
        let seeds_a: Vec<u64> = (0..10).map(|_| a.next_seed()).collect();
        let seeds_b: Vec<u64> = (0..10).map(|_| b.next_seed()).collect();
        assert_eq!(seeds_a, seeds_b);
        assert_eq!(a.seed_position(), 10);
        // Chain values are distinct
        let mut sorted = seeds_a.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), seeds_a.len());
    }

    #[test]
    fn test_different_keys_different_chains() {
        let mut a = GameSession::new(Uuid::new_v4(), [1u8; 32]);
        let mut b = GameSession::new(Uuid::new_v4(), [2u8; 32]);
        assert_ne!(a.next_seed(), b.next_seed());
    }

    #[test]
    fn test_free_spin_trigger_locks_bet() {
        let mut session = session();
        assert_eq!(session.current_mode(), GameMode::Base);
        session.apply_result(&result(GameMode::Base, true, 15, 0), Amount::from_major(1));

        assert_eq!(session.free_spins_remaining, 15);
        assert_eq!(session.free_spins_total, 15);
        assert_eq!(session.current_mode(), GameMode::Free);
        let (bet, charge) = session.chargeable_bet(Amount::from_major(5));
        assert_eq!(bet, Amount::from_major(1));
        assert!(!charge, "free spins must not debit");
    }

    #[test]
    fn test_retrigger_extends_series() {
        let mut session = session();
        session.apply_result(&result(GameMode::Base, true, 15, 0), Amount::from_major(1));
        session.consume_free_spin();
        session.apply_result(&result(GameMode::Free, true, 5, 0), Amount::ZERO);
        assert_eq!(session.free_spins_remaining, 19);
        assert_eq!(session.free_spins_total, 20);
    }

    #[test]
    fn test_accumulator_grows_then_resets() {
        let mut session = session();
        session.apply_result(&result(GameMode::Base, true, 2, 0), Amount::from_major(1));
        assert_eq!(session.accumulated_multiplier, 1);

        session.consume_free_spin();
        session.apply_result(&result(GameMode::Free, false, 0, 5), Amount::ZERO);
        assert_eq!(session.accumulated_multiplier, 6);
        assert!(session.in_free_spins());

        // Last spin of the series: accumulator resets after applying
        session.consume_free_spin();
        session.apply_result(&result(GameMode::Free, false, 0, 3), Amount::ZERO);
        assert_eq!(session.free_spins_remaining, 0);
        assert_eq!(session.accumulated_multiplier, 1);
        assert_eq!(session.free_spins_total, 0);
        assert_eq!(session.current_mode(), GameMode::Base);
    }

    #[test]
    fn test_sync_session_attachment() {
        let mut session = session();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        session.attach_sync_session(a);
        session.attach_sync_session(b);
        session.attach_sync_session(a);
        assert_eq!(session.active_sync_sessions.len(), 2);
        session.detach_sync_session(a);
        assert_eq!(session.active_sync_sessions, vec![b]);
    }

    #[test]
    fn test_stats_rtp_and_hit_rate() {
        let mut stats = SessionStats::default();
        let mut win = result(GameMode::Base, false, 0, 0);
        win.total_win = Amount::from_cents(50);
        stats.record(&win, Amount::from_major(1));
        stats.record(&result(GameMode::Base, false, 0, 0), Amount::from_major(1));

        assert_eq!(stats.total_spins, 2);
        assert!((stats.rtp() - 0.25).abs() < f64::EPSILON);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_view_reports_chain_position() {
        let mut session = session();
        session.next_seed();
        session.next_seed();
        let view = session.view(Amount::from_major(10));
        assert_eq!(view.current_seed_chain_position, 2);
        assert_eq!(view.balance, Amount::from_major(10));
        assert_eq!(view.accumulated_multiplier, 1);
    }
}
