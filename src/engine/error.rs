use ulid::Ulid;

use crate::model::Ms;
use crate::timezone::UnknownTimezone;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("unknown timezone: {0}")]
    InvalidTimezone(String),
    #[error("invalid range: start {start} is not before end {end}")]
    InvalidRange { start: Ms, end: Ms },
    #[error("interval of {duration_ms}ms for member {owner_id} exceeds the 24 hour maximum")]
    DurationExceeded { owner_id: Ulid, duration_ms: Ms },
    #[error("interval for member {owner_id} overlaps existing interval {conflicting}")]
    OverlapConflict { owner_id: Ulid, conflicting: Ulid },
    #[error("not found: {0}")]
    NotFound(Ulid),
    #[error("forbidden for {actor}: {reason}")]
    Forbidden { actor: Ulid, reason: &'static str },
    #[error("already exists: {0}")]
    AlreadyExists(Ulid),
    #[error("member {0} is already in a team")]
    AlreadyInTeam(Ulid),
    #[error("member {0} is not in a team")]
    NotInTeam(Ulid),
    #[error("invite invalid: {0}")]
    InviteInvalid(String),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl EngineError {
    /// Stable label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::InvalidTimezone(_) => "invalid_timezone",
            EngineError::InvalidRange { .. } => "invalid_range",
            EngineError::DurationExceeded { .. } => "duration_exceeded",
            EngineError::OverlapConflict { .. } => "overlap_conflict",
            EngineError::NotFound(_) => "not_found",
            EngineError::Forbidden { .. } => "forbidden",
            EngineError::AlreadyExists(_) => "already_exists",
            EngineError::AlreadyInTeam(_) => "already_in_team",
            EngineError::NotInTeam(_) => "not_in_team",
            EngineError::InviteInvalid(_) => "invite_invalid",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::StorageUnavailable(_) => "storage_unavailable",
        }
    }
}

impl From<UnknownTimezone> for EngineError {
    fn from(e: UnknownTimezone) -> Self {
        EngineError::InvalidTimezone(e.0)
    }
}
