use crate::model::Ms;

pub const MINUTE_MS: Ms = 60_000;
pub const HOUR_MS: Ms = 60 * MINUTE_MS;
pub const DAY_MS: Ms = 24 * HOUR_MS;

/// Longest interval a member may record, measured in elapsed UTC time.
pub const MAX_INTERVAL_MS: Ms = DAY_MS;

/// Widest window an overview or listing may ask for.
pub const MAX_QUERY_WINDOW_MS: Ms = 366 * DAY_MS;

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2200-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 7_258_118_400_000;

pub const MAX_NOTE_LEN: usize = 500;
pub const MAX_NAME_LEN: usize = 100;
pub const MAX_URL_LEN: usize = 500;
pub const MAX_DISCORD_ID_LEN: usize = 32;

pub const MAX_INTERVALS_PER_MEMBER: usize = 10_000;
pub const MAX_MEMBERS: usize = 100_000;
pub const MAX_TEAMS: usize = 10_000;

pub const MAX_ACTIVE_INVITES_PER_TEAM: usize = 5;
pub const INVITE_CODE_LEN: usize = 8;
pub const INVITE_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

pub const DEFAULT_MIN_PLAYERS: u32 = 4;
pub const DEFAULT_MIN_DURATION_MINUTES: u32 = 90;
