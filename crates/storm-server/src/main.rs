//! storm-server binary

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use clap::Parser;

use storm_core::GameConfig;
use storm_server::{configure, AppState};

/// Infinity Storm game server
#[derive(Parser, Debug)]
#[command(name = "storm-server", version, about)]
struct Args {
    /// Bind address
    #[arg(long, default_value = "127.0.0.1:3000")]
    bind: String,

    /// Path to a game config JSON; defaults to the built-in tables
    #[arg(long)]
    config: Option<PathBuf>,

    /// HTTP worker count
    #[arg(long, default_value_t = 4)]
    workers: usize,

    /// Idle-session sweep interval in seconds
    #[arg(long, default_value_t = 60)]
    cleanup_interval_secs: u64,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)?;
            GameConfig::from_json(&json)?
        }
        None => GameConfig::default(),
    };
    config.validate()?;
    log::info!(
        "starting storm-server on {} (rtp target {:.1}%)",
        args.bind,
        config.rtp_target * 100.0
    );

    let state = AppState::new(config);

    // Idle-session sweeper
    {
        let state = state.clone();
        let interval = Duration::from_secs(args.cleanup_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                state.sessions.cleanup_idle();
            }
        });
    }

    let data = web::Data::new(Arc::clone(&state));
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::new("%r %s %Ts"))
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header(),
            )
            .app_data(data.clone())
            .configure(configure)
    })
    .workers(args.workers)
    .bind(&args.bind)?
    .run()
    .await?;
    Ok(())
}
