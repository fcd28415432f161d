use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: reservation attempts by outcome. Labels: outcome.
pub const RESERVATIONS_TOTAL: &str = "innkeep_reservations_total";

/// Histogram: reservation workflow latency in seconds.
pub const RESERVATION_DURATION_SECONDS: &str = "innkeep_reservation_duration_seconds";

/// Counter: availability queries. Labels: kind.
pub const AVAILABILITY_QUERIES_TOTAL: &str = "innkeep_availability_queries_total";

/// Counter: administrative operations. Labels: op, status.
pub const ADMIN_OPS_TOTAL: &str = "innkeep_admin_ops_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: rooms in the catalog.
pub const ROOMS: &str = "innkeep_rooms";

/// Counter: journal compactions run.
pub const JOURNAL_COMPACTIONS_TOTAL: &str = "innkeep_journal_compactions_total";

/// Histogram: journal group-commit flush duration in seconds.
pub const JOURNAL_FLUSH_DURATION_SECONDS: &str = "innkeep_journal_flush_duration_seconds";

/// Histogram: journal group-commit batch size (events per flush).
pub const JOURNAL_FLUSH_BATCH_SIZE: &str = "innkeep_journal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
