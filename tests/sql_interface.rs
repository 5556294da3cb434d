use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_postgres::{Client, Config, NoTls, SimpleQueryMessage, SimpleQueryRow};
use ulid::Ulid;

use squadtime::engine::{now_ms, Engine};
use squadtime::wire;

const PASSWORD: &str = "squadtime";

// ── Test infrastructure ──────────────────────────────────────

async fn start_test_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let dir = std::env::temp_dir().join(format!("squadtime_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let engine = Arc::new(Engine::new(dir.join("squadtime.wal"), "Europe/Berlin").unwrap());

    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let engine = engine.clone();
            tokio::spawn(async move {
                let _ = wire::process_connection(socket, engine, PASSWORD.to_string(), None).await;
            });
        }
    });

    addr
}

/// Connect as the given Discord user.
async fn connect(addr: SocketAddr, discord_user_id: &str) -> Client {
    let mut config = Config::new();
    config
        .host(addr.ip().to_string())
        .port(addr.port())
        .dbname("squadtime")
        .user(discord_user_id)
        .password(PASSWORD);

    let (client, connection) = config.connect(NoTls).await.unwrap();
    tokio::spawn(async move {
        let _ = connection.await;
    });
    client
}

async fn rows(client: &Client, sql: &str) -> Vec<SimpleQueryRow> {
    client
        .simple_query(sql)
        .await
        .unwrap()
        .into_iter()
        .filter_map(|m| match m {
            SimpleQueryMessage::Row(row) => Some(row),
            _ => None,
        })
        .collect()
}

async fn sqlstate(client: &Client, sql: &str) -> String {
    let err = client.simple_query(sql).await.unwrap_err();
    err.as_db_error()
        .map(|db| db.code().code().to_string())
        .unwrap_or_else(|| panic!("expected a database error, got {err}"))
}

fn col(row: &SimpleQueryRow, name: &str) -> String {
    row.get(name).unwrap_or_default().to_string()
}

fn percentage(row: &SimpleQueryRow) -> f64 {
    col(row, "availability_percentage").parse().unwrap()
}

/// Register the Discord user and return a connection acting as them.
async fn member(addr: SocketAddr, discord_user_id: &str, tz: &str) -> (Client, String) {
    let client = connect(addr, discord_user_id).await;
    let registered = rows(
        &client,
        &format!(
            "INSERT INTO members (discord_user_id, display_name, avatar_url, tz) VALUES ('{discord_user_id}', 'user {discord_user_id}', NULL, '{tz}')"
        ),
    )
    .await;
    let id = col(&registered[0], "id");
    (client, id)
}

async fn team(owner: &Client) -> String {
    let created = rows(owner, "INSERT INTO teams (id, name) VALUES (NULL, 'Night Owls')").await;
    col(&created[0], "id")
}

async fn join(owner: &Client, team_id: &str, joiner: &Client) {
    let expires = now_ms() + 86_400_000;
    let invite = rows(
        owner,
        &format!("INSERT INTO invites (id, team_id, expires_at, max_uses) VALUES (NULL, '{team_id}', {expires}, 5)"),
    )
    .await;
    let code = col(&invite[0], "code");
    rows(joiner, &format!("INSERT INTO memberships (invite_code) VALUES ('{code}')")).await;
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn unregistered_login_may_only_register() {
    let addr = start_test_server().await;
    let client = connect(addr, "999").await;

    assert_eq!(sqlstate(&client, "SELECT * FROM teams").await, "28000");

    let registered = rows(
        &client,
        "INSERT INTO members (discord_user_id, display_name) VALUES ('999', 'late')",
    )
    .await;
    assert_eq!(col(&registered[0], "tz"), "Europe/Berlin");
    assert_eq!(col(&registered[0], "discord_user_id"), "999");
}

#[tokio::test]
async fn login_cannot_register_someone_else() {
    let addr = start_test_server().await;
    let (victim, victim_id) = member(addr, "2", "UTC").await;
    let intruder = connect(addr, "1").await;

    let hijack = "INSERT INTO members (discord_user_id, display_name) VALUES ('2', 'hijacked')";
    assert_eq!(sqlstate(&intruder, hijack).await, "42501");
    assert_eq!(sqlstate(&intruder, "SELECT * FROM members").await, "28000");

    let me = rows(&victim, "SELECT * FROM members").await;
    assert_eq!(col(&me[0], "id"), victim_id);
    assert_eq!(col(&me[0], "display_name"), "user 2");
}

#[tokio::test]
async fn insert_normalizes_across_spring_forward() {
    let addr = start_test_server().await;
    let (ana, ana_id) = member(addr, "1", "Europe/Berlin").await;

    let accepted = rows(
        &ana,
        r#"INSERT INTO availability (id, start, "end") VALUES (NULL, '2025-03-30T01:30', '2025-03-30T03:30')"#,
    )
    .await;
    assert_eq!(accepted.len(), 1);
    assert_eq!(col(&accepted[0], "member_id"), ana_id);
    assert_eq!(col(&accepted[0], "start"), "2025-03-30T00:30:00Z");
    assert_eq!(col(&accepted[0], "end"), "2025-03-30T01:30:00Z");
    assert_eq!(col(&accepted[0], "duration_minutes"), "60");
}

#[tokio::test]
async fn overlap_and_range_rejections_carry_sqlstate() {
    let addr = start_test_server().await;
    let (ana, _) = member(addr, "1", "UTC").await;

    rows(
        &ana,
        r#"INSERT INTO availability (id, start, "end") VALUES (NULL, '2025-06-02T10:00:00Z', '2025-06-02T12:00:00Z')"#,
    )
    .await;
    assert_eq!(
        sqlstate(
            &ana,
            r#"INSERT INTO availability (id, start, "end") VALUES (NULL, '2025-06-02T11:00:00Z', '2025-06-02T13:00:00Z')"#
        )
        .await,
        "23P01"
    );
    assert_eq!(
        sqlstate(
            &ana,
            r#"INSERT INTO availability (id, start, "end") VALUES (NULL, '2025-06-03T12:00:00Z', '2025-06-03T10:00:00Z')"#
        )
        .await,
        "22007"
    );
    assert_eq!(
        sqlstate(
            &ana,
            r#"INSERT INTO availability (id, start, "end", tz) VALUES (NULL, '2025-06-04T10:00', '2025-06-04T11:00', 'Mars/Olympus')"#
        )
        .await,
        "22023"
    );

    let listed = rows(
        &ana,
        r#"SELECT * FROM availability WHERE start >= '2025-06-01T00:00:00Z' AND "end" <= '2025-06-08T00:00:00Z'"#,
    )
    .await;
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn team_overview_reports_stats_per_member() {
    let addr = start_test_server().await;
    let (owner, owner_id) = member(addr, "1", "UTC").await;
    let (player, player_id) = member(addr, "2", "UTC").await;
    let team_id = team(&owner).await;
    join(&owner, &team_id, &player).await;

    rows(
        &owner,
        r#"INSERT INTO availability (id, start, "end", tz, available) VALUES (NULL, '2025-06-02T18:00', '2025-06-02T20:00', 'UTC', true)"#,
    )
    .await;
    rows(
        &owner,
        r#"INSERT INTO availability (id, start, "end", tz, available, note) VALUES (NULL, '2025-06-03T18:00', '2025-06-03T21:00', 'UTC', false, 'work')"#,
    )
    .await;

    let window = r#"start >= '2025-06-02T00:00:00Z' AND "end" <= '2025-06-09T00:00:00Z'"#;
    let overview = rows(
        &player,
        &format!("SELECT * FROM team_overview WHERE team_id = '{team_id}' AND {window}"),
    )
    .await;
    assert_eq!(overview.len(), 2);

    let owner_row = overview
        .iter()
        .find(|r| col(r, "member_id") == owner_id)
        .unwrap();
    assert_eq!(col(owner_row, "total_available_minutes"), "120");
    assert_eq!(col(owner_row, "total_unavailable_minutes"), "180");
    assert_eq!(percentage(owner_row), 40.0);
    let intervals: serde_json::Value = serde_json::from_str(&col(owner_row, "intervals")).unwrap();
    assert_eq!(intervals.as_array().unwrap().len(), 2);
    assert_eq!(intervals[1]["note"], "work");

    let player_row = overview
        .iter()
        .find(|r| col(r, "member_id") == player_id)
        .unwrap();
    assert_eq!(percentage(player_row), 0.0);

    let missing = rows(&owner, &format!("SELECT * FROM missing_availability WHERE {window}")).await;
    assert_eq!(missing.len(), 1);
    assert_eq!(col(&missing[0], "id"), player_id);
}

#[tokio::test]
async fn only_owner_or_admin_touches_others_intervals() {
    let addr = start_test_server().await;
    let (owner, _) = member(addr, "1", "UTC").await;
    let (ana, ana_id) = member(addr, "2", "UTC").await;
    let (ben, ben_id) = member(addr, "3", "UTC").await;
    let team_id = team(&owner).await;
    join(&owner, &team_id, &ana).await;
    join(&owner, &team_id, &ben).await;

    let accepted = rows(
        &ana,
        r#"INSERT INTO availability (id, start, "end") VALUES (NULL, '2025-06-02T18:00:00Z', '2025-06-02T20:00:00Z')"#,
    )
    .await;
    let interval_id = col(&accepted[0], "id");
    let delete = format!("DELETE FROM availability WHERE id = '{interval_id}'");

    assert_eq!(sqlstate(&ben, &delete).await, "42501");
    assert_eq!(
        sqlstate(&ben, &format!("UPDATE members SET role = 'admin' WHERE id = '{ben_id}'")).await,
        "42501"
    );

    rows(&owner, &format!("UPDATE members SET role = 'admin' WHERE id = '{ben_id}'")).await;
    let updated = rows(
        &ben,
        &format!(
            r#"UPDATE availability SET start = '2025-06-02T19:00:00Z', "end" = '2025-06-02T21:00:00Z', available = false WHERE id = '{interval_id}'"#
        ),
    )
    .await;
    assert_eq!(col(&updated[0], "member_id"), ana_id);
    assert!(matches!(col(&updated[0], "available").as_str(), "f" | "false"));

    client_deletes(&ben, &delete).await;
    assert_eq!(sqlstate(&ana, &delete).await, "P0002");
}

async fn client_deletes(client: &Client, sql: &str) {
    let messages = client.simple_query(sql).await.unwrap();
    let affected = messages.iter().find_map(|m| match m {
        SimpleQueryMessage::CommandComplete(n) => Some(*n),
        _ => None,
    });
    assert_eq!(affected, Some(1));
}

#[tokio::test]
async fn leaving_last_owner_without_admin_deletes_team() {
    let addr = start_test_server().await;
    let (owner, _) = member(addr, "1", "UTC").await;
    let (ana, _) = member(addr, "2", "UTC").await;
    let team_id = team(&owner).await;
    join(&owner, &team_id, &ana).await;

    owner.simple_query("DELETE FROM memberships").await.unwrap();

    assert_eq!(
        sqlstate(&ana, &format!("SELECT * FROM teams WHERE id = '{team_id}'")).await,
        "P0002"
    );
    let me = rows(&ana, "SELECT * FROM members").await;
    assert!(me.iter().all(|r| r.get("team_id").is_none()));
}
