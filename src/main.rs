use std::sync::Arc;

use chrono::{Datelike, Utc};
use tracing::info;

use innkeep::config::Config;
use innkeep::engine::{Engine, RequestContext};
use innkeep::notify::{NotifyHub, confirmation_payload};
use innkeep::store::{MemoryStore, ReservationStore};
use innkeep::{compactor, observability};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    observability::init(config.metrics_port)?;

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let journal = config.journal_path();
    let notify = Arc::new(NotifyHub::new());
    let store = Arc::new(MemoryStore::open(&journal, notify.clone())?);

    if store.room_count() == 0 {
        for name in &config.rooms {
            let room = store.add_room(name.as_str()).await?;
            info!("seeded {} ({})", room.id, room.name);
        }
    }
    metrics::gauge!(observability::ROOMS).set(store.room_count() as f64);

    let compactor_store = store.clone();
    let (threshold, period) = (config.compact_threshold, config.compact_interval);
    tokio::spawn(async move {
        compactor::run_compactor(compactor_store, threshold, period).await;
    });

    let engine = Engine::new(store.clone(), notify.clone());
    info!("innkeep ready");
    info!("  journal: {}", journal.display());
    info!("  rooms: {}", store.room_count());
    info!("  compaction: every {threshold} appends, checked every {period:?}");
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let mut ctx = RequestContext::new();
    if let Some(timeout) = config.request_timeout {
        ctx = ctx.with_timeout(timeout);
    }
    let today = Utc::now().date_naive();
    let calendar = engine.month_calendar(&ctx, today.year(), today.month()).await?;
    for room in &calendar.rooms {
        let busy = room.occupied.iter().filter(|d| **d).count();
        info!(
            "  {}-{:02} {}: {busy}/{} nights occupied",
            calendar.year, calendar.month, room.room.name, calendar.days_in_month
        );
    }
    let pending = store.reservations(innkeep::model::ReservationFilter::Pending).await?;
    info!("  {} reservation(s) pending review", pending.len());

    // Mailer hook: hand each committed confirmation off as JSON.
    let mut confirmations = notify.subscribe_confirmations();
    tokio::spawn(async move {
        while let Ok(c) = confirmations.recv().await {
            match confirmation_payload(&c) {
                Ok(payload) => info!("confirmation for {} <{}>: {payload}", c.guest.full_name(), c.guest.email),
                Err(e) => tracing::warn!("could not encode confirmation {}: {e}", c.reservation_id),
            }
        }
    });

    // Room activity feed.
    for room in store.all_rooms().await? {
        let mut events = notify.subscribe(room.id);
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                tracing::debug!("{}: {event:?}", room.name);
            }
        });
    }

    shutdown_signal().await?;
    info!("shutdown signal received, compacting journal");
    store.compact_journal().await?;
    info!("innkeep stopped");
    Ok(())
}

async fn shutdown_signal() -> std::io::Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            r = ctrl_c => r?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await?;
    }
    Ok(())
}
