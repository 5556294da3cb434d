use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::stream;
use futures::Sink;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::data::DataRow;
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use serde_json::json;
use tokio::net::TcpStream;
use ulid::Ulid;

use crate::auth::SquadtimeAuthSource;
use crate::engine::{Engine, EngineError, NewTeam, Proposal};
use crate::model::*;
use crate::observability;
use crate::sql::{self, Command, SqlError};
use crate::timezone::format_utc;

pub struct SquadtimeHandler {
    engine: Arc<Engine>,
    query_parser: Arc<SquadtimeQueryParser>,
}

impl SquadtimeHandler {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            query_parser: Arc::new(SquadtimeQueryParser),
        }
    }

    /// The pgwire login user is the caller's Discord user id.
    fn login<C: ClientInfo>(client: &C) -> PgWireResult<String> {
        client
            .metadata()
            .get("user")
            .cloned()
            .ok_or_else(|| user_error("28000", "no login user".into()))
    }

    fn caller(&self, login: &str) -> PgWireResult<Ulid> {
        self.engine.member_by_discord(login).ok_or_else(|| {
            user_error(
                "28000",
                format!("no member registered for discord user {login}"),
            )
        })
    }

    /// Parse, execute and record metrics for one statement.
    async fn run(&self, login: &str, sql_text: &str) -> PgWireResult<Response> {
        let cmd = sql::parse_sql(sql_text).map_err(sql_err)?;
        let label = observability::command_label(&cmd);
        let started = Instant::now();
        let result = self.execute_command(login, cmd).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status)
            .increment(1);
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn execute_command(&self, login: &str, cmd: Command) -> PgWireResult<Response> {
        // Registration is the one statement an unknown login may run.
        match cmd {
            Command::UpsertMember {
                discord_user_id,
                display_name,
                avatar_url,
                tz,
            } => self.register(login, &discord_user_id, &display_name, avatar_url, tz).await,
            other => {
                let caller = self.caller(login)?;
                self.execute_as(login, caller, other).await
            }
        }
    }

    async fn register(
        &self,
        login: &str,
        discord_user_id: &str,
        display_name: &str,
        avatar_url: Option<String>,
        tz: Option<String>,
    ) -> PgWireResult<Response> {
        check_own_registration(login, discord_user_id)?;
        let info = self
            .engine
            .upsert_member(discord_user_id, display_name, avatar_url, tz)
            .await
            .map_err(engine_err)?;
        Ok(rows(member_schema(), [member_row(&info)]))
    }

    async fn execute_as(&self, login: &str, caller: Ulid, cmd: Command) -> PgWireResult<Response> {
        let engine = &self.engine;
        match cmd {
            Command::UpsertMember {
                discord_user_id,
                display_name,
                avatar_url,
                tz,
            } => self.register(login, &discord_user_id, &display_name, avatar_url, tz).await,
            Command::SelectMembers { team_id } => {
                if let Some(team_id) = &team_id {
                    engine
                        .require_team_member(&caller, team_id)
                        .map_err(engine_err)?;
                }
                let members = engine.list_members(team_id).await.map_err(engine_err)?;
                Ok(rows(member_schema(), members.iter().map(member_row)))
            }
            Command::SetRole { member_id, role } => {
                let team_id = engine.team_of_member(&caller).map_err(engine_err)?;
                engine
                    .set_role(team_id, caller, member_id, role)
                    .await
                    .map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("UPDATE").with_rows(1)))
            }
            Command::InsertTeam {
                id,
                name,
                tz,
                min_players,
                min_duration_minutes,
            } => {
                let team = NewTeam {
                    id,
                    name,
                    tz,
                    min_players,
                    min_duration_minutes,
                };
                let info = engine.create_team(caller, team).await.map_err(engine_err)?;
                Ok(rows(team_schema(), [team_row(&info)]))
            }
            Command::DeleteTeam { id } => {
                engine.delete_team(id, caller).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("DELETE").with_rows(1)))
            }
            Command::SelectTeam { id } => {
                let team_id = match id {
                    Some(id) => id,
                    None => engine.team_of_member(&caller).map_err(engine_err)?,
                };
                let info = engine.team_info(team_id).map_err(engine_err)?;
                Ok(rows(team_schema(), [team_row(&info)]))
            }
            Command::InsertInvite {
                id,
                team_id,
                expires_at,
                max_uses,
            } => {
                let invite = engine
                    .create_invite(team_id, caller, expires_at, max_uses, id)
                    .await
                    .map_err(engine_err)?;
                Ok(rows(invite_schema(), [invite_row(&invite)]))
            }
            Command::DeleteInvite { id } => {
                engine
                    .deactivate_invite(id, caller)
                    .await
                    .map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("DELETE").with_rows(1)))
            }
            Command::SelectInvites { team_id } => {
                let team_id = match team_id {
                    Some(id) => id,
                    None => engine.team_of_member(&caller).map_err(engine_err)?,
                };
                let invites = engine.list_invites(team_id, caller).map_err(engine_err)?;
                Ok(rows(invite_schema(), invites.iter().map(invite_row)))
            }
            Command::JoinTeam { invite_code } => {
                let info = engine
                    .join_team(caller, &invite_code)
                    .await
                    .map_err(engine_err)?;
                Ok(rows(team_schema(), [team_row(&info)]))
            }
            Command::LeaveTeam => {
                engine.leave_team(caller).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("DELETE").with_rows(1)))
            }
            Command::InsertAvailability {
                id,
                start,
                end,
                tz,
                available,
                note,
            } => {
                let proposal = Proposal {
                    id,
                    start,
                    end,
                    tz,
                    available,
                    note,
                };
                let interval = engine
                    .submit(caller, proposal, None)
                    .await
                    .map_err(engine_err)?;
                Ok(rows(availability_schema(), [interval_row(&interval)]))
            }
            Command::UpdateAvailability {
                id,
                start,
                end,
                tz,
                available,
                note,
            } => {
                let is_elevated = self.elevated_over_interval(&caller, &id);
                let proposal = Proposal {
                    id: None,
                    start,
                    end,
                    tz,
                    available,
                    note,
                };
                let interval = engine
                    .update_interval(id, caller, is_elevated, proposal)
                    .await
                    .map_err(engine_err)?;
                Ok(rows(availability_schema(), [interval_row(&interval)]))
            }
            Command::DeleteAvailability { id } => {
                let is_elevated = self.elevated_over_interval(&caller, &id);
                engine
                    .remove(id, caller, is_elevated)
                    .await
                    .map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("DELETE").with_rows(1)))
            }
            Command::SelectAvailability {
                member_id,
                start,
                end,
            } => {
                let member_id = member_id.unwrap_or(caller);
                if !engine.can_view(&caller, &member_id) {
                    return Err(engine_err(EngineError::Forbidden {
                        actor: caller,
                        reason: "intervals are visible to teammates only",
                    }));
                }
                let intervals = engine
                    .member_intervals(member_id, start, end)
                    .await
                    .map_err(engine_err)?;
                Ok(rows(availability_schema(), intervals.iter().map(interval_row)))
            }
            Command::SelectOverview {
                team_id,
                start,
                end,
            } => {
                let team_id = self.readable_team(&caller, team_id)?;
                let overview = engine
                    .team_overview(team_id, start, end)
                    .await
                    .map_err(engine_err)?;
                Ok(rows(overview_schema(), overview.members.iter().map(overview_row)))
            }
            Command::SelectMissing {
                team_id,
                start,
                end,
            } => {
                let team_id = self.readable_team(&caller, team_id)?;
                let members = engine
                    .members_without_availability(team_id, start, end)
                    .await
                    .map_err(engine_err)?;
                Ok(rows(member_schema(), members.iter().map(member_row)))
            }
        }
    }

    fn elevated_over_interval(&self, caller: &Ulid, interval_id: &Ulid) -> bool {
        self.engine
            .owner_of_interval(interval_id)
            .is_some_and(|owner| self.engine.is_elevated_over(caller, &owner))
    }

    fn readable_team(&self, caller: &Ulid, team_id: Option<Ulid>) -> PgWireResult<Ulid> {
        let team_id = match team_id {
            Some(id) => id,
            None => self.engine.team_of_member(caller).map_err(engine_err)?,
        };
        self.engine
            .require_team_member(caller, &team_id)
            .map_err(engine_err)?;
        Ok(team_id)
    }
}

// ── Result schemas and rows ──────────────────────────────────────

fn text(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::VARCHAR, FieldFormat::Text)
}

fn typed(name: &str, ty: Type) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, ty, FieldFormat::Text)
}

fn member_schema() -> Vec<FieldInfo> {
    vec![
        text("id"),
        text("discord_user_id"),
        text("display_name"),
        text("avatar_url"),
        text("tz"),
        text("team_id"),
        text("role"),
    ]
}

fn team_schema() -> Vec<FieldInfo> {
    vec![
        text("id"),
        text("name"),
        text("tz"),
        typed("min_players", Type::INT4),
        typed("min_duration_minutes", Type::INT4),
        text("created_at"),
        typed("member_count", Type::INT8),
    ]
}

fn invite_schema() -> Vec<FieldInfo> {
    vec![
        text("id"),
        text("team_id"),
        text("code"),
        text("expires_at"),
        typed("max_uses", Type::INT4),
        typed("used_count", Type::INT4),
        typed("remaining_uses", Type::INT4),
        typed("active", Type::BOOL),
    ]
}

fn availability_schema() -> Vec<FieldInfo> {
    vec![
        text("id"),
        text("member_id"),
        text("start"),
        text("end"),
        typed("available", Type::BOOL),
        text("note"),
        typed("duration_minutes", Type::INT8),
    ]
}

fn overview_schema() -> Vec<FieldInfo> {
    vec![
        text("member_id"),
        text("display_name"),
        text("avatar_url"),
        typed("total_available_minutes", Type::INT8),
        typed("total_unavailable_minutes", Type::INT8),
        typed("available_slots", Type::INT4),
        typed("unavailable_slots", Type::INT4),
        typed("availability_percentage", Type::FLOAT8),
        text("stats"),
        text("intervals"),
    ]
}

type RowFn = Box<dyn FnOnce(&mut DataRowEncoder) -> PgWireResult<()> + Send>;

fn rows(schema: Vec<FieldInfo>, encoders: impl IntoIterator<Item = RowFn>) -> Response {
    let schema = Arc::new(schema);
    let data: Vec<PgWireResult<DataRow>> = encoders
        .into_iter()
        .map(|fill| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            fill(&mut encoder)?;
            Ok(encoder.take_row())
        })
        .collect();
    Response::Query(QueryResponse::new(schema, stream::iter(data)))
}

fn as_i32(v: u32) -> i32 {
    i32::try_from(v).unwrap_or(i32::MAX)
}

fn member_row(m: &MemberInfo) -> RowFn {
    let m = m.clone();
    Box::new(move |e| {
        e.encode_field(&m.id.to_string())?;
        e.encode_field(&m.discord_user_id)?;
        e.encode_field(&m.display_name)?;
        e.encode_field(&m.avatar_url)?;
        e.encode_field(&m.tz)?;
        e.encode_field(&m.team_id.map(|t| t.to_string()))?;
        e.encode_field(&m.role.map(|r| r.as_str().to_string()))?;
        Ok(())
    })
}

fn team_row(t: &TeamInfo) -> RowFn {
    let t = t.clone();
    Box::new(move |e| {
        e.encode_field(&t.id.to_string())?;
        e.encode_field(&t.name)?;
        e.encode_field(&t.tz)?;
        e.encode_field(&as_i32(t.min_players))?;
        e.encode_field(&as_i32(t.min_duration_minutes))?;
        e.encode_field(&format_utc(t.created_at))?;
        e.encode_field(&(t.member_count as i64))?;
        Ok(())
    })
}

fn invite_row(i: &Invite) -> RowFn {
    let i = i.clone();
    Box::new(move |e| {
        e.encode_field(&i.id.to_string())?;
        e.encode_field(&i.team_id.to_string())?;
        e.encode_field(&i.code)?;
        e.encode_field(&format_utc(i.expires_at))?;
        e.encode_field(&i.max_uses.map(as_i32))?;
        e.encode_field(&as_i32(i.used_count))?;
        e.encode_field(&i.remaining_uses().map(as_i32))?;
        e.encode_field(&i.active)?;
        Ok(())
    })
}

fn interval_row(i: &Interval) -> RowFn {
    let i = i.clone();
    Box::new(move |e| {
        e.encode_field(&i.id.to_string())?;
        e.encode_field(&i.owner_id.to_string())?;
        e.encode_field(&format_utc(i.span.start))?;
        e.encode_field(&format_utc(i.span.end))?;
        e.encode_field(&i.available)?;
        e.encode_field(&i.note)?;
        e.encode_field(&i.span.duration_minutes())?;
        Ok(())
    })
}

fn interval_json(i: &Interval) -> serde_json::Value {
    json!({
        "id": i.id.to_string(),
        "start": format_utc(i.span.start),
        "end": format_utc(i.span.end),
        "available": i.available,
        "note": i.note,
        "durationMinutes": i.span.duration_minutes(),
    })
}

fn overview_row(m: &MemberOverview) -> RowFn {
    let m = m.clone();
    Box::new(move |e| {
        let stats = serde_json::to_string(&m.stats)
            .map_err(|err| user_error("XX000", format!("stats encoding failed: {err}")))?;
        let intervals = serde_json::Value::Array(m.intervals.iter().map(interval_json).collect());
        e.encode_field(&m.member_id.to_string())?;
        e.encode_field(&m.display_name)?;
        e.encode_field(&m.avatar_url)?;
        e.encode_field(&m.stats.total_available_minutes)?;
        e.encode_field(&m.stats.total_unavailable_minutes)?;
        e.encode_field(&as_i32(m.stats.available_slots))?;
        e.encode_field(&as_i32(m.stats.unavailable_slots))?;
        e.encode_field(&m.stats.availability_percentage)?;
        e.encode_field(&stats)?;
        e.encode_field(&intervals.to_string())?;
        Ok(())
    })
}

/// Row shape for a statement, decided from its verb and target table.
fn result_schema(sql_text: &str) -> Vec<FieldInfo> {
    let tokens: Vec<String> = sql_text
        .split_whitespace()
        .map(|t| {
            t.split('(')
                .next()
                .unwrap_or_default()
                .trim_matches(|c: char| c == '"' || c == ';')
                .to_lowercase()
        })
        .collect();
    let verb = tokens.first().map(String::as_str).unwrap_or_default();
    let table_after = |kw: &str| {
        tokens
            .iter()
            .position(|t| t == kw)
            .and_then(|i| tokens.get(i + 1))
            .map(|t| t.rsplit('.').next().unwrap_or(t).to_string())
            .unwrap_or_default()
    };

    match verb {
        "select" => match table_after("from").as_str() {
            "members" | "missing_availability" => member_schema(),
            "teams" => team_schema(),
            "invites" => invite_schema(),
            "availability" => availability_schema(),
            "team_overview" => overview_schema(),
            _ => vec![],
        },
        "insert" => match table_after("into").as_str() {
            "members" => member_schema(),
            "teams" | "memberships" => team_schema(),
            "invites" => invite_schema(),
            "availability" => availability_schema(),
            _ => vec![],
        },
        "update" if table_after("update") == "availability" => availability_schema(),
        _ => vec![],
    }
}

#[async_trait]
impl SimpleQueryHandler for SquadtimeHandler {
    async fn do_query<C>(&self, client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let login = Self::login(client)?;
        Ok(vec![self.run(&login, query).await?])
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct SquadtimeQueryParser;

#[async_trait]
impl QueryParser for SquadtimeQueryParser {
    type Statement = String;

    async fn parse_sql<C>(&self, _client: &C, sql: &str, _types: &[Option<Type>]) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(&self, stmt: &String, _column_format: Option<&Format>) -> PgWireResult<Vec<FieldInfo>> {
        Ok(result_schema(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for SquadtimeHandler {
    type Statement = String;
    type QueryParser = SquadtimeQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let login = Self::login(client)?;
        let sql = substitute_params(portal);
        self.run(&login, &sql).await
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            result_schema(&target.statement),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(result_schema(
            &target.statement.statement,
        )))
    }
}

/// Count the highest $N parameter placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    let bytes = sql.as_bytes();
    let mut max = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'$' {
            i += 1;
            continue;
        }
        i += 1;
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if let Ok(n) = sql[start..i].parse::<usize>() {
            max = max.max(n);
        }
    }
    max
}

/// Substitute $1, $2, ... placeholders with bound parameter values (text format).
///
/// Replaced from the highest index down so `$1` never clobbers `$10`.
fn substitute_params(portal: &Portal<String>) -> String {
    let mut result = portal.statement.statement.to_string();
    for (i, param) in portal.parameters.iter().enumerate().rev() {
        let value = match param {
            Some(bytes) => format!("'{}'", String::from_utf8_lossy(bytes).replace('\'', "''")),
            None => "NULL".to_string(),
        };
        result = result.replace(&format!("${}", i + 1), &value);
    }
    result
}

// ── Factory ──────────────────────────────────────────────────────

pub struct SquadtimeFactory {
    handler: Arc<SquadtimeHandler>,
    auth_handler: Arc<CleartextPasswordAuthStartupHandler<SquadtimeAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl SquadtimeFactory {
    pub fn new(engine: Arc<Engine>, password: String) -> Self {
        Self {
            handler: Arc::new(SquadtimeHandler::new(engine)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                SquadtimeAuthSource::new(password),
                DefaultServerParameterProvider::default(),
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for SquadtimeFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client connection until it closes.
pub async fn process_connection(
    socket: TcpStream,
    engine: Arc<Engine>,
    password: String,
    tls: Option<TlsAcceptor>,
) -> std::io::Result<()> {
    let factory = SquadtimeFactory::new(engine, password);
    pgwire::tokio::process_socket(socket, tls, factory).await
}

// ── Errors ───────────────────────────────────────────────────────

/// A login only ever registers or updates its own Discord identity.
fn check_own_registration(login: &str, discord_user_id: &str) -> PgWireResult<()> {
    if login != discord_user_id {
        return Err(user_error(
            "42501",
            format!("login {login} may not register discord user {discord_user_id}"),
        ));
    }
    Ok(())
}

fn user_error(code: &str, message: String) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new("ERROR".into(), code.into(), message)))
}

/// SQLSTATE for each engine rejection.
fn sqlstate(e: &EngineError) -> &'static str {
    match e {
        EngineError::OverlapConflict { .. } => "23P01",
        EngineError::InvalidRange { .. } | EngineError::DurationExceeded { .. } => "22007",
        EngineError::InvalidTimezone(_) => "22023",
        EngineError::NotFound(_) => "P0002",
        EngineError::Forbidden { .. } => "42501",
        EngineError::AlreadyExists(_) | EngineError::AlreadyInTeam(_) => "23505",
        EngineError::NotInTeam(_) | EngineError::InviteInvalid(_) => "22023",
        EngineError::LimitExceeded(_) => "54000",
        EngineError::StorageUnavailable(_) => "58030",
    }
}

fn engine_err(e: EngineError) -> PgWireError {
    user_error(sqlstate(&e), e.to_string())
}

fn sql_err(e: SqlError) -> PgWireError {
    user_error("42601", e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(schema: &[FieldInfo]) -> Vec<String> {
        schema.iter().map(|f| f.name().to_string()).collect()
    }

    #[test]
    fn schema_follows_verb_and_table() {
        assert_eq!(
            names(&result_schema("SELECT * FROM team_overview WHERE team_id = $1")),
            names(&overview_schema())
        );
        assert_eq!(
            names(&result_schema("INSERT INTO memberships (invite_code) VALUES ($1)")),
            names(&team_schema())
        );
        assert_eq!(
            names(&result_schema(r#"UPDATE availability SET start = $1, "end" = $2 WHERE id = $3"#)),
            names(&availability_schema())
        );
        assert!(result_schema("UPDATE members SET role = $1 WHERE id = $2").is_empty());
        assert!(result_schema("DELETE FROM availability WHERE id = $1").is_empty());
    }

    #[test]
    fn counts_highest_placeholder() {
        assert_eq!(count_params("SELECT 1"), 0);
        assert_eq!(count_params("WHERE a = $2 AND b = $10 AND c = $1"), 10);
        assert_eq!(count_params("trailing $"), 0);
    }

    #[test]
    fn overlap_maps_to_exclusion_violation() {
        let e = EngineError::OverlapConflict {
            owner_id: Ulid::nil(),
            conflicting: Ulid::nil(),
        };
        assert_eq!(sqlstate(&e), "23P01");
        assert_eq!(sqlstate(&EngineError::NotFound(Ulid::nil())), "P0002");
        assert_eq!(sqlstate(&EngineError::LimitExceeded("x")), "54000");
    }

    #[test]
    fn registration_is_limited_to_own_login() {
        assert!(check_own_registration("100", "100").is_ok());
        match check_own_registration("100", "200") {
            Err(PgWireError::UserError(info)) => assert_eq!(info.code, "42501"),
            other => panic!("expected a user error, got {other:?}"),
        }
    }

    #[test]
    fn interval_json_uses_utc_strings() {
        let interval = Interval {
            id: Ulid::nil(),
            owner_id: Ulid::nil(),
            span: Span::new(1_751_328_000_000, 1_751_335_200_000),
            available: true,
            note: None,
            created_at: 0,
        };
        let v = interval_json(&interval);
        assert_eq!(v["start"], "2025-07-01T00:00:00Z");
        assert_eq!(v["durationMinutes"], 120);
        assert!(v["note"].is_null());
    }
}
