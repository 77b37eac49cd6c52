//! HTTP server for the venue matching core.
//!
//! Env configuration: `PORT`, `WORKERS_PER_INSTRUMENT`, `MATCH_TIMEOUT_MS`,
//! `INSTRUMENTS` (comma-separated ids opened at startup), `SNAPSHOT_PATH`
//! (restore on boot, save on ctrl-c).

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use venue_matching_engine::api;
use venue_matching_engine::persistence::FilePersistence;
use venue_matching_engine::{Engine, EngineConfig, InstrumentId};

#[tokio::main]
async fn main() {
    let _ = env_logger::try_init();

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8080);
    let workers_per_instrument: usize = std::env::var("WORKERS_PER_INSTRUMENT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(2);
    let match_timeout_ms: u64 = std::env::var("MATCH_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(5000);
    let instruments: Vec<InstrumentId> = std::env::var("INSTRUMENTS")
        .unwrap_or_else(|_| "1".into())
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .map(InstrumentId)
        .collect();
    let persistence = std::env::var("SNAPSHOT_PATH").ok().map(FilePersistence::new);

    let engine = Arc::new(Engine::new(EngineConfig {
        workers_per_instrument,
        match_timeout: Duration::from_millis(match_timeout_ms),
    }));

    if let Some(persistence) = &persistence {
        match persistence.load() {
            Ok(Some(snapshot)) => engine.restore(snapshot),
            Ok(None) => {}
            Err(err) => eprintln!("snapshot load failed: {}", err),
        }
    }
    for instrument in instruments {
        engine.register_instrument(instrument);
    }

    let app = api::create_router(Arc::clone(&engine));
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await.expect("bind");
    eprintln!("listening on http://{}", addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .expect("serve");

    engine.shutdown().await;
    if let Some(persistence) = &persistence {
        if let Err(err) = persistence.save(&engine.snapshot()) {
            eprintln!("snapshot save failed: {}", err);
        }
    }
}
