use sqlparser::ast::{
    self, AssignmentTarget, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value,
    ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::model::*;
use crate::timezone::{parse_instant, WallClock};

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    UpsertMember {
        discord_user_id: String,
        display_name: String,
        avatar_url: Option<String>,
        tz: Option<String>,
    },
    SelectMembers {
        team_id: Option<Ulid>,
    },
    SetRole {
        member_id: Ulid,
        role: Role,
    },
    InsertTeam {
        id: Option<Ulid>,
        name: String,
        tz: Option<String>,
        min_players: Option<u32>,
        min_duration_minutes: Option<u32>,
    },
    DeleteTeam {
        id: Ulid,
    },
    /// `None` = the caller's own team.
    SelectTeam {
        id: Option<Ulid>,
    },
    InsertInvite {
        id: Option<Ulid>,
        team_id: Ulid,
        expires_at: Ms,
        max_uses: Option<u32>,
    },
    DeleteInvite {
        id: Ulid,
    },
    SelectInvites {
        team_id: Option<Ulid>,
    },
    JoinTeam {
        invite_code: String,
    },
    LeaveTeam,
    InsertAvailability {
        id: Option<Ulid>,
        start: WallClock,
        end: WallClock,
        tz: Option<String>,
        available: bool,
        note: Option<String>,
    },
    UpdateAvailability {
        id: Ulid,
        start: WallClock,
        end: WallClock,
        tz: Option<String>,
        available: bool,
        note: Option<String>,
    },
    DeleteAvailability {
        id: Ulid,
    },
    /// `member_id: None` = the caller.
    SelectAvailability {
        member_id: Option<Ulid>,
        start: Ms,
        end: Ms,
    },
    /// `team_id: None` = the caller's team.
    SelectOverview {
        team_id: Option<Ulid>,
        start: Ms,
        end: Ms,
    },
    SelectMissing {
        team_id: Option<Ulid>,
        start: Ms,
        end: Ms,
    },
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    let Some(stmt) = stmts.first() else {
        return Err(SqlError::Empty);
    };

    match stmt {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Update {
            table,
            assignments,
            selection,
            ..
        } => parse_update(&table.relation, assignments, selection),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let values = extract_insert_values(insert)?;
    let arg = |i: usize| values.get(i);

    match table.as_str() {
        "members" => {
            if values.len() < 2 {
                return Err(SqlError::WrongArity("members", 2, values.len()));
            }
            Ok(Command::UpsertMember {
                discord_user_id: parse_string(&values[0])?,
                display_name: parse_string(&values[1])?,
                avatar_url: opt(arg(2), parse_string_or_null)?,
                tz: opt(arg(3), parse_string_or_null)?,
            })
        }
        "teams" => {
            if values.len() < 2 {
                return Err(SqlError::WrongArity("teams", 2, values.len()));
            }
            Ok(Command::InsertTeam {
                id: parse_ulid_or_null(&values[0])?,
                name: parse_string(&values[1])?,
                tz: opt(arg(2), parse_string_or_null)?,
                min_players: opt(arg(3), parse_u32_or_null)?,
                min_duration_minutes: opt(arg(4), parse_u32_or_null)?,
            })
        }
        "invites" => {
            if values.len() < 3 {
                return Err(SqlError::WrongArity("invites", 3, values.len()));
            }
            Ok(Command::InsertInvite {
                id: parse_ulid_or_null(&values[0])?,
                team_id: parse_ulid(&values[1])?,
                expires_at: parse_instant_expr(&values[2])?,
                max_uses: opt(arg(3), parse_u32_or_null)?,
            })
        }
        "memberships" => {
            if values.is_empty() {
                return Err(SqlError::WrongArity("memberships", 1, 0));
            }
            Ok(Command::JoinTeam {
                invite_code: parse_string(&values[0])?,
            })
        }
        "availability" => {
            if values.len() < 3 {
                return Err(SqlError::WrongArity("availability", 3, values.len()));
            }
            Ok(Command::InsertAvailability {
                id: parse_ulid_or_null(&values[0])?,
                start: parse_wall_clock(&values[1])?,
                end: parse_wall_clock(&values[2])?,
                tz: opt(arg(3), parse_string_or_null)?,
                available: opt(arg(4), parse_bool_or_null)?.unwrap_or(true),
                note: opt(arg(5), parse_string_or_null)?,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;

    match table.as_str() {
        "teams" => Ok(Command::DeleteTeam {
            id: extract_where_id(&delete.selection)?,
        }),
        "invites" => Ok(Command::DeleteInvite {
            id: extract_where_id(&delete.selection)?,
        }),
        "memberships" => Ok(Command::LeaveTeam),
        "availability" => Ok(Command::DeleteAvailability {
            id: extract_where_id(&delete.selection)?,
        }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// Collects `SET col = value` pairs by lower-cased column name.
fn assignment_values(assignments: &[ast::Assignment]) -> Result<Vec<(String, &Expr)>, SqlError> {
    assignments
        .iter()
        .map(|a| match &a.target {
            AssignmentTarget::ColumnName(name) => object_name_last(name)
                .map(|col| (col, &a.value))
                .ok_or_else(|| SqlError::Parse("empty column name".into())),
            AssignmentTarget::Tuple(_) => Err(SqlError::Unsupported("tuple assignment".into())),
        })
        .collect()
}

fn parse_update(
    relation: &TableFactor,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
) -> Result<Command, SqlError> {
    let table = table_factor_name(relation)?;
    let id = extract_where_id(selection)?;
    let set = assignment_values(assignments)?;
    let get = |col: &str| set.iter().find(|(c, _)| c == col).map(|(_, e)| *e);

    match table.as_str() {
        "members" => {
            let role = get("role").ok_or(SqlError::MissingColumn("role"))?;
            Ok(Command::SetRole {
                member_id: id,
                role: parse_role(role)?,
            })
        }
        "availability" => Ok(Command::UpdateAvailability {
            id,
            start: parse_wall_clock(get("start").ok_or(SqlError::MissingColumn("start"))?)?,
            end: parse_wall_clock(get("end").ok_or(SqlError::MissingColumn("end"))?)?,
            tz: opt(get("tz"), parse_string_or_null)?,
            available: opt(get("available"), parse_bool_or_null)?.unwrap_or(true),
            note: opt(get("note"), parse_string_or_null)?,
        }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

#[derive(Default)]
struct Filters {
    id: Option<Ulid>,
    member_id: Option<Ulid>,
    team_id: Option<Ulid>,
    start: Option<Ms>,
    end: Option<Ms>,
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;

    let mut f = Filters::default();
    if let Some(selection) = &select.selection {
        extract_filters(selection, &mut f)?;
    }
    let window = |f: &Filters| -> Result<(Ms, Ms), SqlError> {
        Ok((
            f.start.ok_or(SqlError::MissingFilter("start"))?,
            f.end.ok_or(SqlError::MissingFilter("end"))?,
        ))
    };

    match table.as_str() {
        "members" => Ok(Command::SelectMembers { team_id: f.team_id }),
        "teams" => Ok(Command::SelectTeam { id: f.id }),
        "invites" => Ok(Command::SelectInvites { team_id: f.team_id }),
        "availability" => {
            let (start, end) = window(&f)?;
            Ok(Command::SelectAvailability {
                member_id: f.member_id,
                start,
                end,
            })
        }
        "team_overview" => {
            let (start, end) = window(&f)?;
            Ok(Command::SelectOverview {
                team_id: f.team_id,
                start,
                end,
            })
        }
        "missing_availability" => {
            let (start, end) = window(&f)?;
            Ok(Command::SelectMissing {
                team_id: f.team_id,
                start,
                end,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn extract_filters(expr: &Expr, f: &mut Filters) -> Result<(), SqlError> {
    match expr {
        Expr::Nested(inner) => extract_filters(inner, f)?,
        Expr::BinaryOp { left, op, right } => match op {
            ast::BinaryOperator::And => {
                extract_filters(left, f)?;
                extract_filters(right, f)?;
            }
            ast::BinaryOperator::Eq => match expr_column_name(left).as_deref() {
                Some("id") => f.id = Some(parse_ulid_expr(right)?),
                Some("member_id") => f.member_id = Some(parse_ulid_expr(right)?),
                Some("team_id") => f.team_id = Some(parse_ulid_expr(right)?),
                _ => {}
            },
            ast::BinaryOperator::GtEq => {
                if expr_column_name(left).as_deref() == Some("start") {
                    f.start = Some(parse_instant_expr(right)?);
                }
            }
            ast::BinaryOperator::LtEq => {
                if expr_column_name(left).as_deref() == Some("end") {
                    f.end = Some(parse_instant_expr(right)?);
                }
            }
            _ => {}
        },
        _ => {}
    }
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    match tables_with_joins.first() {
        Some(first) => table_factor_name(&first.relation),
        None => Err(SqlError::Parse("DELETE without table".into())),
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_insert_values(insert: &ast::Insert) -> Result<Vec<Expr>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => match values.rows.as_slice() {
            [] => Err(SqlError::Parse("empty VALUES".into())),
            [row] => Ok(row.clone()),
            _ => Err(SqlError::Unsupported("multi-row VALUES".into())),
        },
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn extract_where_id(selection: &Option<Expr>) -> Result<Ulid, SqlError> {
    let sel = selection.as_ref().ok_or(SqlError::MissingFilter("id"))?;
    match sel {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } if expr_column_name(left).as_deref() == Some("id") => parse_ulid_expr(right),
        _ => Err(SqlError::MissingFilter("id")),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn is_null(expr: &Expr) -> bool {
    matches!(extract_value(expr), Some(Value::Null))
}

/// Optional trailing VALUES column: absent and NULL both mean `None`.
fn opt<T>(
    expr: Option<&Expr>,
    parse: fn(&Expr) -> Result<Option<T>, SqlError>,
) -> Result<Option<T>, SqlError> {
    match expr {
        Some(e) => parse(e),
        None => Ok(None),
    }
}

fn parse_ulid_expr(expr: &Expr) -> Result<Ulid, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => {
            Ulid::from_string(s).map_err(|e| SqlError::Parse(format!("bad ULID: {e}")))
        }
        Some(value) => Err(SqlError::Parse(format!("expected ULID string, got {value:?}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr:?}"))),
    }
}

fn parse_ulid(expr: &Expr) -> Result<Ulid, SqlError> {
    parse_ulid_expr(expr)
}

fn parse_ulid_or_null(expr: &Expr) -> Result<Option<Ulid>, SqlError> {
    if is_null(expr) {
        return Ok(None);
    }
    parse_ulid_expr(expr).map(Some)
}

fn parse_i64_expr(expr: &Expr) -> Result<i64, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) | Value::SingleQuotedString(s) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad integer {s}: {e}"))),
            _ => Err(SqlError::Parse(format!("expected number, got {value:?}"))),
        }
    } else if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        Ok(-parse_i64_expr(expr)?)
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_u32_or_null(expr: &Expr) -> Result<Option<u32>, SqlError> {
    if is_null(expr) {
        return Ok(None);
    }
    let v = parse_i64_expr(expr)?;
    u32::try_from(v)
        .map(Some)
        .map_err(|_| SqlError::Parse(format!("{v} out of range")))
}

fn parse_string(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => Ok(s.clone()),
        Some(Value::Number(s, _)) => Ok(s.clone()),
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr:?}"))),
    }
}

fn parse_string_or_null(expr: &Expr) -> Result<Option<String>, SqlError> {
    if is_null(expr) {
        return Ok(None);
    }
    parse_string(expr).map(Some)
}

/// Absolute instant: Unix milliseconds or an RFC 3339 string.
fn parse_instant_expr(expr: &Expr) -> Result<Ms, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => {
            parse_instant(s).map_err(|e| SqlError::Parse(e.to_string()))
        }
        _ => parse_i64_expr(expr),
    }
}

/// Wall-clock timestamp as written; numbers are Unix milliseconds (UTC).
fn parse_wall_clock(expr: &Expr) -> Result<WallClock, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => {
            WallClock::parse(s).map_err(|e| SqlError::Parse(e.to_string()))
        }
        _ => {
            let ms = parse_i64_expr(expr)?;
            WallClock::utc(ms).ok_or_else(|| SqlError::Parse(format!("timestamp {ms} out of range")))
        }
    }
}

fn parse_bool(expr: &Expr) -> Result<bool, SqlError> {
    match extract_value(expr) {
        Some(Value::Boolean(b)) => Ok(*b),
        Some(Value::SingleQuotedString(s)) => match s.to_lowercase().as_str() {
            "true" | "t" | "1" => Ok(true),
            "false" | "f" | "0" => Ok(false),
            _ => Err(SqlError::Parse(format!("bad bool: {s}"))),
        },
        Some(Value::Number(n, _)) => Ok(n != "0"),
        Some(value) => Err(SqlError::Parse(format!("expected bool, got {value:?}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr:?}"))),
    }
}

fn parse_bool_or_null(expr: &Expr) -> Result<Option<bool>, SqlError> {
    if is_null(expr) {
        return Ok(None);
    }
    parse_bool(expr).map(Some)
}

fn parse_role(expr: &Expr) -> Result<Role, SqlError> {
    let s = parse_string(expr)?;
    match s.to_lowercase().as_str() {
        "owner" => Ok(Role::Owner),
        "admin" => Ok(Role::Admin),
        "player" => Ok(Role::Player),
        _ => Err(SqlError::Parse(format!("unknown role: {s}"))),
    }
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum SqlError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("empty query")]
    Empty,
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("unknown table: {0}")]
    UnknownTable(String),
    #[error("{0}: expected at least {1} values, got {2}")]
    WrongArity(&'static str, usize, usize),
    #[error("missing filter: {0}")]
    MissingFilter(&'static str),
    #[error("missing SET column: {0}")]
    MissingColumn(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "01ARZ3NDEKTSV4RRFFQ69G5FAV";

    fn id() -> Ulid {
        Ulid::from_string(ID).unwrap()
    }

    #[test]
    fn parse_upsert_member() {
        let sql = "INSERT INTO members (discord_user_id, display_name, avatar_url, tz) VALUES ('123456789', 'ana', NULL, 'Europe/Berlin')";
        assert_eq!(
            parse_sql(sql).unwrap(),
            Command::UpsertMember {
                discord_user_id: "123456789".into(),
                display_name: "ana".into(),
                avatar_url: None,
                tz: Some("Europe/Berlin".into()),
            }
        );
    }

    #[test]
    fn parse_upsert_member_minimal() {
        let sql = "INSERT INTO members (discord_user_id, display_name) VALUES ('1', 'ben')";
        match parse_sql(sql).unwrap() {
            Command::UpsertMember { avatar_url, tz, .. } => {
                assert_eq!(avatar_url, None);
                assert_eq!(tz, None);
            }
            other => panic!("expected UpsertMember, got {other:?}"),
        }
    }

    #[test]
    fn parse_set_role() {
        let sql = format!("UPDATE members SET role = 'admin' WHERE id = '{ID}'");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::SetRole {
                member_id: id(),
                role: Role::Admin
            }
        );
        let sql = format!("UPDATE members SET role = 'captain' WHERE id = '{ID}'");
        assert!(parse_sql(&sql).is_err());
    }

    #[test]
    fn parse_insert_team_defaults() {
        let sql = "INSERT INTO teams (id, name) VALUES (NULL, 'Night Owls')";
        assert_eq!(
            parse_sql(sql).unwrap(),
            Command::InsertTeam {
                id: None,
                name: "Night Owls".into(),
                tz: None,
                min_players: None,
                min_duration_minutes: None,
            }
        );
    }

    #[test]
    fn parse_insert_team_full() {
        let sql = format!(
            "INSERT INTO teams (id, name, tz, min_players, min_duration_minutes) VALUES ('{ID}', 'Owls', 'UTC', 5, 120)"
        );
        match parse_sql(&sql).unwrap() {
            Command::InsertTeam {
                id: team_id,
                min_players,
                min_duration_minutes,
                ..
            } => {
                assert_eq!(team_id, Some(id()));
                assert_eq!(min_players, Some(5));
                assert_eq!(min_duration_minutes, Some(120));
            }
            other => panic!("expected InsertTeam, got {other:?}"),
        }
    }

    #[test]
    fn parse_team_delete_and_select() {
        let sql = format!("DELETE FROM teams WHERE id = '{ID}'");
        assert_eq!(parse_sql(&sql).unwrap(), Command::DeleteTeam { id: id() });
        let sql = format!("SELECT * FROM teams WHERE id = '{ID}'");
        assert_eq!(parse_sql(&sql).unwrap(), Command::SelectTeam { id: Some(id()) });
        assert_eq!(
            parse_sql("SELECT * FROM teams").unwrap(),
            Command::SelectTeam { id: None }
        );
    }

    #[test]
    fn parse_insert_invite() {
        let sql = format!(
            "INSERT INTO invites (id, team_id, expires_at, max_uses) VALUES (NULL, '{ID}', '2025-07-01T00:00:00Z', 10)"
        );
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::InsertInvite {
                id: None,
                team_id: id(),
                expires_at: 1_751_328_000_000,
                max_uses: Some(10),
            }
        );
    }

    #[test]
    fn parse_memberships() {
        assert_eq!(
            parse_sql("INSERT INTO memberships (invite_code) VALUES ('ABCD2345')").unwrap(),
            Command::JoinTeam {
                invite_code: "ABCD2345".into()
            }
        );
        assert_eq!(parse_sql("DELETE FROM memberships").unwrap(), Command::LeaveTeam);
    }

    #[test]
    fn parse_insert_availability() {
        let sql = r#"INSERT INTO availability (id, start, "end", tz, available, note) VALUES (NULL, '2025-03-30T01:30', '2025-03-30T03:30', 'Europe/Berlin', false, 'work')"#;
        match parse_sql(sql).unwrap() {
            Command::InsertAvailability {
                id,
                start,
                end,
                tz,
                available,
                note,
            } => {
                assert_eq!(id, None);
                assert!(start.offset.is_none());
                assert_eq!(end.local.to_string(), "2025-03-30 03:30:00");
                assert_eq!(tz.as_deref(), Some("Europe/Berlin"));
                assert!(!available);
                assert_eq!(note.as_deref(), Some("work"));
            }
            other => panic!("expected InsertAvailability, got {other:?}"),
        }
    }

    #[test]
    fn parse_insert_availability_millis_and_defaults() {
        let sql = format!(r#"INSERT INTO availability (id, start, "end") VALUES ('{ID}', 1751328000000, 1751335200000)"#);
        match parse_sql(&sql).unwrap() {
            Command::InsertAvailability {
                id: iv,
                start,
                available,
                tz,
                ..
            } => {
                assert_eq!(iv, Some(id()));
                assert!(start.is_utc());
                assert!(available);
                assert_eq!(tz, None);
            }
            other => panic!("expected InsertAvailability, got {other:?}"),
        }
    }

    #[test]
    fn parse_update_availability() {
        let sql = format!(
            r#"UPDATE availability SET start = '2025-06-02T18:00:00Z', "end" = '2025-06-02T20:00:00Z', available = false, note = NULL WHERE id = '{ID}'"#
        );
        match parse_sql(&sql).unwrap() {
            Command::UpdateAvailability {
                id: iv,
                available,
                note,
                tz,
                ..
            } => {
                assert_eq!(iv, id());
                assert!(!available);
                assert_eq!(note, None);
                assert_eq!(tz, None);
            }
            other => panic!("expected UpdateAvailability, got {other:?}"),
        }
    }

    #[test]
    fn parse_update_requires_id_and_range() {
        assert!(matches!(
            parse_sql(r#"UPDATE availability SET start = 1, "end" = 2"#),
            Err(SqlError::MissingFilter("id"))
        ));
        let sql = format!("UPDATE availability SET start = 1 WHERE id = '{ID}'");
        assert!(matches!(parse_sql(&sql), Err(SqlError::MissingColumn("end"))));
    }

    #[test]
    fn parse_select_availability() {
        let sql = format!(
            r#"SELECT * FROM availability WHERE member_id = '{ID}' AND start >= '2025-06-02T00:00:00+02:00' AND "end" <= 1751328000000"#
        );
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::SelectAvailability {
                member_id: Some(id()),
                start: 1_748_815_200_000,
                end: 1_751_328_000_000,
            }
        );
    }

    #[test]
    fn parse_select_overview_and_missing() {
        let sql = format!(r#"SELECT * FROM team_overview WHERE team_id = '{ID}' AND start >= 0 AND "end" <= 1000"#);
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::SelectOverview {
                team_id: Some(id()),
                start: 0,
                end: 1000
            }
        );
        let sql = r#"SELECT * FROM missing_availability WHERE start >= 0 AND "end" <= 1000"#;
        assert_eq!(
            parse_sql(sql).unwrap(),
            Command::SelectMissing {
                team_id: None,
                start: 0,
                end: 1000
            }
        );
    }

    #[test]
    fn parse_select_requires_window() {
        let sql = format!("SELECT * FROM team_overview WHERE team_id = '{ID}'");
        assert!(matches!(parse_sql(&sql), Err(SqlError::MissingFilter("start"))));
    }

    #[test]
    fn parse_select_members() {
        assert_eq!(
            parse_sql("SELECT * FROM members").unwrap(),
            Command::SelectMembers { team_id: None }
        );
        let sql = format!("SELECT * FROM members WHERE team_id = '{ID}'");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::SelectMembers { team_id: Some(id()) }
        );
    }

    #[test]
    fn parse_delete_availability() {
        let sql = format!("DELETE FROM availability WHERE id = '{ID}'");
        assert_eq!(parse_sql(&sql).unwrap(), Command::DeleteAvailability { id: id() });
        assert!(matches!(
            parse_sql("DELETE FROM availability"),
            Err(SqlError::MissingFilter("id"))
        ));
    }

    #[test]
    fn parse_errors() {
        assert!(matches!(parse_sql(""), Err(SqlError::Empty)));
        assert!(matches!(
            parse_sql("INSERT INTO foobar (id) VALUES ('x')"),
            Err(SqlError::UnknownTable(t)) if t == "foobar"
        ));
        assert!(matches!(
            parse_sql("INSERT INTO availability (id) VALUES (NULL)"),
            Err(SqlError::WrongArity("availability", 3, 1))
        ));
        assert!(matches!(
            parse_sql(r#"INSERT INTO availability (id, start, "end") VALUES (NULL, 'tomorrow', 'later')"#),
            Err(SqlError::Parse(_))
        ));
        assert!(matches!(parse_sql("CREATE TABLE x (a int)"), Err(SqlError::Unsupported(_))));
    }
}
