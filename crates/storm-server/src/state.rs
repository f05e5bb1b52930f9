//! Shared application state

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use storm_core::{Amount, GameConfig};
use storm_session::SessionManager;
use storm_store::{PlayerRow, Store};
use storm_sync::CascadeSynchronizer;
use storm_wallet::Wallet;

/// Opening balance granted to newly registered demo players
pub const DEMO_OPENING_BALANCE: Amount = Amount::from_major(1_000);

/// Everything the HTTP and WebSocket handlers share
pub struct AppState {
    pub config: Arc<GameConfig>,
    pub wallet: Arc<Wallet>,
    pub store: Arc<Store>,
    pub sessions: SessionManager,
    pub synchronizer: CascadeSynchronizer,
}

impl AppState {
    pub fn new(config: GameConfig) -> Arc<Self> {
        let config = Arc::new(config);
        let wallet = Arc::new(Wallet::new());
        let store = Arc::new(Store::new());
        let sessions = SessionManager::new(config.clone(), wallet.clone(), store.clone());
        let synchronizer = CascadeSynchronizer::new(config.clone());
        Arc::new(Self {
            config,
            wallet,
            store,
            sessions,
            synchronizer,
        })
    }

    /// Register a player (idempotent) and ensure a funded wallet account
    pub fn register_player(&self, player_id: Uuid, username: &str, is_admin: bool) {
        if self.store.player(player_id).is_none() {
            self.store.upsert_player(PlayerRow {
                player_id,
                username: username.to_string(),
                is_admin,
                created_at: Utc::now(),
            });
        }
        if !self.wallet.has_account(player_id) {
            // Demo provisioning; a production deployment funds accounts
            // through the payment boundary instead
            let _ = self.wallet.create_account(player_id, DEMO_OPENING_BALANCE);
        }
    }
}
