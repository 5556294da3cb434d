use std::net::SocketAddr;

use crate::sql::Command;

// ── Requests ────────────────────────────────────────────────────

/// Counter: statements executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "squadtime_queries_total";

/// Histogram: statement latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "squadtime_query_duration_seconds";

/// Counter: interval submissions rejected. Labels: kind.
pub const INTERVAL_REJECTIONS_TOTAL: &str = "squadtime_interval_rejections_total";

// ── Connections ─────────────────────────────────────────────────

pub const CONNECTIONS_ACTIVE: &str = "squadtime_connections_active";
pub const CONNECTIONS_TOTAL: &str = "squadtime_connections_total";
/// Counter: connections turned away at the limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "squadtime_connections_rejected_total";

// ── Storage ─────────────────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "squadtime_wal_flush_duration_seconds";

/// Histogram: operations per group-commit flush.
pub const WAL_FLUSH_BATCH_SIZE: &str = "squadtime_wal_flush_batch_size";

/// Counter: WAL compactions completed.
pub const WAL_COMPACTIONS_TOTAL: &str = "squadtime_wal_compactions_total";

/// Counter: intervals dropped by the retention sweep.
pub const RETENTION_REMOVED_TOTAL: &str = "squadtime_retention_removed_total";

/// Install the Prometheus exporter on `port`. No-op without a port.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Short metric label for a command.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::UpsertMember { .. } => "upsert_member",
        Command::SelectMembers { .. } => "select_members",
        Command::SetRole { .. } => "set_role",
        Command::InsertTeam { .. } => "insert_team",
        Command::DeleteTeam { .. } => "delete_team",
        Command::SelectTeam { .. } => "select_team",
        Command::InsertInvite { .. } => "insert_invite",
        Command::DeleteInvite { .. } => "delete_invite",
        Command::SelectInvites { .. } => "select_invites",
        Command::JoinTeam { .. } => "join_team",
        Command::LeaveTeam => "leave_team",
        Command::InsertAvailability { .. } => "insert_availability",
        Command::UpdateAvailability { .. } => "update_availability",
        Command::DeleteAvailability { .. } => "delete_availability",
        Command::SelectAvailability { .. } => "select_availability",
        Command::SelectOverview { .. } => "select_overview",
        Command::SelectMissing { .. } => "select_missing",
    }
}
