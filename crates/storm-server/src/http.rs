//! HTTP surface and the WebSocket upgrade route
//!
//! Authentication is an upstream concern; handlers read the player
//! identity from the `X-Player-Id` header the gateway injects. Admin-only
//! routes additionally require the player row's admin flag.

use std::time::Duration;

use actix_web::{web, HttpRequest, HttpResponse, Responder};
use chrono::Utc;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc::unbounded_channel;
use uuid::Uuid;

use storm_core::{Amount, Grid, StormError};
use storm_engine::CascadeStep;
use storm_wallet::{TxKind, TxQuery};

use crate::protocol::{ClientEvent, ServerEvent};
use crate::state::AppState;
use crate::transport::SyncTransport;

type State = web::Data<std::sync::Arc<AppState>>;

/// Route registration, shared by the binary and the test harness
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/session/login", web::post().to(login))
        .route("/session/logout", web::post().to(logout))
        .route("/spin", web::post().to(spin))
        .route("/history/spins", web::get().to(spin_history))
        .route("/history/spins/{spin_id}/verify", web::get().to(verify_spin))
        .route("/wallet/balance", web::get().to(balance))
        .route("/wallet/transactions", web::get().to(transactions))
        .route("/wallet/stats", web::get().to(stats))
        .route("/wallet/admin/adjust", web::post().to(admin_adjust))
        .route("/ws", web::get().to(websocket));
}

fn player_id(req: &HttpRequest) -> Result<Uuid, HttpResponse> {
    req.headers()
        .get("X-Player-Id")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value).ok())
        .ok_or_else(|| {
            HttpResponse::Unauthorized().json(json!({
                "success": false,
                "error": "unauthorized",
                "errorMessage": "missing or malformed X-Player-Id"
            }))
        })
}

fn error_response(err: StormError) -> HttpResponse {
    let (mut status, code) = match &err {
        StormError::InsufficientFunds { .. } => {
            (HttpResponse::PaymentRequired(), "insufficient_funds")
        }
        StormError::InvalidBet(_) => (HttpResponse::BadRequest(), "invalid_bet"),
        StormError::EngineFatal(_) => (HttpResponse::InternalServerError(), "engine_fatal"),
        StormError::SessionNotFound(_) => (HttpResponse::NotFound(), "session_not_found"),
        StormError::RecoveryNotFound(_) => (HttpResponse::NotFound(), "recovery_not_found"),
        StormError::ValidationMismatch(_) => (HttpResponse::Conflict(), "validation_mismatch"),
        StormError::Timeout(_) => (HttpResponse::RequestTimeout(), "timeout"),
        StormError::Unauthorized => (HttpResponse::Unauthorized(), "unauthorized"),
        StormError::AdminRequired => (HttpResponse::Forbidden(), "admin_required"),
        StormError::Storage(_) | StormError::Serialization(_) => {
            (HttpResponse::InternalServerError(), "internal")
        }
    };
    status.json(json!({
        "success": false,
        "error": code,
        "errorMessage": err.to_string()
    }))
}

// ── health ─────────────────────────────────────────────────────────────

async fn health() -> impl Responder {
    HttpResponse::Ok().json(json!({ "status": "ok", "timestamp": Utc::now() }))
}

// ── session ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest {
    username: String,
    #[serde(default)]
    player_id: Option<Uuid>,
}

async fn login(state: State, body: web::Json<LoginRequest>) -> impl Responder {
    let player = body.player_id.unwrap_or_else(Uuid::new_v4);
    state.register_player(player, &body.username, false);
    let view = state.sessions.login(player);
    HttpResponse::Ok().json(json!({ "success": true, "session": view }))
}

async fn logout(state: State, req: HttpRequest) -> impl Responder {
    let player = match player_id(&req) {
        Ok(player) => player,
        Err(response) => return response,
    };
    match state.sessions.logout(player) {
        Ok(()) => HttpResponse::Ok().json(json!({ "success": true })),
        Err(err) => error_response(err.into()),
    }
}

// ── spins ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpinRequest {
    bet_amount: Amount,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SpinResponse {
    success: bool,
    spin_id: String,
    grid: Grid,
    cascades: Vec<CascadeStep>,
    base_win: Amount,
    total_win: Amount,
    total_multiplier: u32,
    balance: Amount,
    game_mode: storm_core::GameMode,
    free_spins_triggered: bool,
    free_spins_awarded: u32,
    free_spins_remaining: u32,
    accumulated_multiplier: u32,
    validation_hash: String,
}

async fn spin(state: State, req: HttpRequest, body: web::Json<SpinRequest>) -> impl Responder {
    let player = match player_id(&req) {
        Ok(player) => player,
        Err(response) => return response,
    };
    match state.sessions.spin(player, body.bet_amount).await {
        Ok(outcome) => {
            let result = &outcome.stored.result;
            HttpResponse::Ok().json(SpinResponse {
                success: true,
                spin_id: result.spin_id.clone(),
                grid: result.initial_grid,
                cascades: result.cascade_steps.clone(),
                base_win: result.base_win,
                total_win: result.total_win,
                total_multiplier: result.total_multiplier,
                balance: outcome.balance,
                game_mode: result.game_mode,
                free_spins_triggered: result.free_spins_triggered,
                free_spins_awarded: result.free_spins_awarded,
                free_spins_remaining: outcome.free_spins_remaining,
                accumulated_multiplier: outcome.accumulated_multiplier,
                validation_hash: result.validation_hash.clone(),
            })
        }
        Err(err) => error_response(err.into()),
    }
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    #[serde(default = "default_page")]
    page: usize,
    #[serde(default = "default_limit")]
    limit: usize,
    /// `asc` or `desc` (default)
    #[serde(default)]
    order: Option<String>,
}

fn default_page() -> usize {
    1
}

fn default_limit() -> usize {
    20
}

impl PageQuery {
    fn newest_first(&self) -> bool {
        !matches!(self.order.as_deref(), Some("asc"))
    }
}

async fn spin_history(state: State, req: HttpRequest, query: web::Query<PageQuery>) -> impl Responder {
    let player = match player_id(&req) {
        Ok(player) => player,
        Err(response) => return response,
    };
    let (spins, total) =
        state
            .store
            .spins_for(player, query.page, query.limit, query.newest_first());
    let items: Vec<_> = spins
        .iter()
        .map(|stored| {
            json!({
                "betTime": stored.bet_time,
                "spinId": stored.result.spin_id,
                "betAmount": stored.result.bet_amount,
                "totalWin": stored.result.total_win,
                "gameMode": stored.result.game_mode,
            })
        })
        .collect();
    HttpResponse::Ok().json(json!({
        "success": true,
        "items": items,
        "total": total,
        "page": query.page,
        "limit": query.limit
    }))
}

/// Audit endpoint: recompute the stored spin from its recorded inputs
async fn verify_spin(state: State, req: HttpRequest, path: web::Path<String>) -> impl Responder {
    let player = match player_id(&req) {
        Ok(player) => player,
        Err(response) => return response,
    };
    let spin_id = path.into_inner();
    let Some(stored) = state.store.spin(&spin_id) else {
        return error_response(StormError::SessionNotFound(spin_id));
    };
    if stored.player_id != player && !state.store.is_admin(player) {
        return error_response(StormError::Unauthorized);
    }
    match state.sessions.engine().verify_replay(&stored.result) {
        Ok(reproduced) => HttpResponse::Ok().json(json!({
            "success": true,
            "spinId": stored.result.spin_id,
            "valid": reproduced && stored.result.verify(),
            "validationHash": stored.result.validation_hash,
        })),
        Err(err) => error_response(StormError::EngineFatal(err.to_string())),
    }
}

// ── wallet ─────────────────────────────────────────────────────────────

async fn balance(state: State, req: HttpRequest) -> impl Responder {
    let player = match player_id(&req) {
        Ok(player) => player,
        Err(response) => return response,
    };
    match state.wallet.balance(player) {
        Ok(amount) => HttpResponse::Ok().json(json!({ "success": true, "balance": amount })),
        Err(err) => error_response(err.into()),
    }
}

#[derive(Debug, Deserialize)]
struct TxHistoryQuery {
    #[serde(default = "default_page")]
    page: usize,
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    order: Option<String>,
    #[serde(rename = "type")]
    kind: Option<TxKind>,
}

async fn transactions(
    state: State,
    req: HttpRequest,
    query: web::Query<TxHistoryQuery>,
) -> impl Responder {
    let player = match player_id(&req) {
        Ok(player) => player,
        Err(response) => return response,
    };
    let tx_query = TxQuery {
        kind: query.kind,
        page: query.page,
        limit: query.limit,
        newest_first: !matches!(query.order.as_deref(), Some("asc")),
    };
    match state.wallet.transactions(player, &tx_query) {
        Ok(page) => HttpResponse::Ok().json(json!({ "success": true, "transactions": page })),
        Err(err) => error_response(err.into()),
    }
}

async fn stats(state: State, req: HttpRequest) -> impl Responder {
    let player = match player_id(&req) {
        Ok(player) => player,
        Err(response) => return response,
    };
    let session_stats = match state.sessions.stats(player) {
        Ok(stats) => stats,
        Err(err) => return error_response(err.into()),
    };
    let consistency = match state.wallet.validate_consistency(player) {
        Ok(report) => report,
        Err(err) => return error_response(err.into()),
    };
    HttpResponse::Ok().json(json!({
        "success": true,
        "stats": session_stats,
        "rtp": session_stats.rtp(),
        "hitRate": session_stats.hit_rate(),
        "consistency": consistency,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdjustRequest {
    player_id: Uuid,
    amount: Amount,
    reason: String,
}

async fn admin_adjust(
    state: State,
    req: HttpRequest,
    body: web::Json<AdjustRequest>,
) -> impl Responder {
    let actor = match player_id(&req) {
        Ok(player) => player,
        Err(response) => return response,
    };
    if !state.store.is_admin(actor) {
        return error_response(StormError::AdminRequired);
    }
    match state
        .wallet
        .process_adjustment(body.player_id, body.amount, &body.reason, &actor.to_string())
    {
        Ok(tx) => HttpResponse::Ok().json(json!({ "success": true, "transaction": tx })),
        Err(err) => error_response(err.into()),
    }
}

// ── websocket ──────────────────────────────────────────────────────────

/// Upgrade and spawn the per-socket bridge task
///
/// The bridge multiplexes four sources: outbound protocol events, timer
/// firings, the heartbeat interval, and the inbound socket stream.
async fn websocket(state: State, req: HttpRequest, body: web::Payload) -> impl Responder {
    let player = match player_id(&req) {
        Ok(player) => player,
        Err(response) => return response,
    };
    let (response, mut ws_session, mut stream) = match actix_ws::handle(&req, body) {
        Ok(parts) => parts,
        Err(err) => return HttpResponse::InternalServerError().body(err.to_string()),
    };

    let state = state.into_inner().as_ref().clone();
    actix_web::rt::spawn(async move {
        let (out_tx, mut out_rx) = unbounded_channel();
        let (timer_tx, mut timer_rx) = unbounded_channel();
        let mut transport = SyncTransport::new(state.clone(), player, out_tx, timer_tx);
        let mut heartbeat = tokio::time::interval(Duration::from_millis(
            state.config.timers.heartbeat_interval_ms.max(1),
        ));

        log::info!("ws: player {player} connected");
        'bridge: loop {
            tokio::select! {
                Some(event) = out_rx.recv() => {
                    match serde_json::to_string(&event) {
                        Ok(text) => {
                            if ws_session.text(text).await.is_err() {
                                break 'bridge;
                            }
                        }
                        Err(err) => log::error!("ws: serialize failed: {err}"),
                    }
                }
                Some(timer) = timer_rx.recv() => {
                    transport.handle_timer(timer);
                }
                _ = heartbeat.tick() => {
                    if !transport.heartbeat_tick() {
                        break 'bridge;
                    }
                }
                msg = stream.next() => match msg {
                    Some(Ok(actix_ws::Message::Text(text))) => {
                        match serde_json::from_str::<ClientEvent>(&text) {
                            Ok(event) => transport.handle_event(event),
                            Err(err) => {
                                let reply = ServerEvent::error(
                                    "unknown",
                                    "bad_request",
                                    err.to_string(),
                                );
                                if let Ok(text) = serde_json::to_string(&reply) {
                                    let _ = ws_session.text(text).await;
                                }
                            }
                        }
                    }
                    Some(Ok(actix_ws::Message::Ping(bytes))) => {
                        transport.mark_alive();
                        let _ = ws_session.pong(&bytes).await;
                    }
                    Some(Ok(actix_ws::Message::Close(_))) | None => break 'bridge,
                    Some(Err(_)) => break 'bridge,
                    _ => {}
                },
            }
        }
        transport.shutdown();
        let _ = ws_session.close(None).await;
        log::info!("ws: player {player} disconnected");
    });

    response
}
