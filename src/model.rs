use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::limits::MINUTE_MS;

/// Unix milliseconds, UTC. The only instant type stored or compared.
pub type Ms = i64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// Whole elapsed minutes, truncated.
    pub fn duration_minutes(&self) -> i64 {
        self.duration_ms() / MINUTE_MS
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// A member's standing inside their team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    Owner,
    Admin,
    Player,
}

impl Role {
    /// Owners and admins may act on other members' intervals.
    pub fn is_elevated(self) -> bool {
        matches!(self, Role::Owner | Role::Admin)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Admin => "admin",
            Role::Player => "player",
        }
    }
}

/// One availability assertion by one member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub id: Ulid,
    pub owner_id: Ulid,
    pub span: Span,
    /// `false` is an explicit "can't make it", not missing data.
    pub available: bool,
    pub note: Option<String>,
    pub created_at: Ms,
}

/// A member's profile plus every interval they own.
#[derive(Debug, Clone)]
pub struct MemberState {
    pub id: Ulid,
    pub discord_user_id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    /// Default timezone for submissions that don't name one.
    pub tz: String,
    pub created_at: Ms,
    /// Sorted by `span.start`; never overlapping.
    pub intervals: Vec<Interval>,
}

impl MemberState {
    pub fn new(
        id: Ulid,
        discord_user_id: String,
        display_name: String,
        avatar_url: Option<String>,
        tz: String,
        created_at: Ms,
    ) -> Self {
        Self {
            id,
            discord_user_id,
            display_name,
            avatar_url,
            tz,
            created_at,
            intervals: Vec::new(),
        }
    }

    /// Insert interval maintaining sort order by span.start.
    pub fn insert_interval(&mut self, interval: Interval) {
        let pos = self
            .intervals
            .binary_search_by_key(&interval.span.start, |i| i.span.start)
            .unwrap_or_else(|e| e);
        self.intervals.insert(pos, interval);
    }

    /// Remove interval by id.
    pub fn remove_interval(&mut self, id: Ulid) -> Option<Interval> {
        let pos = self.intervals.iter().position(|i| i.id == id)?;
        Some(self.intervals.remove(pos))
    }

    pub fn get_interval(&self, id: Ulid) -> Option<&Interval> {
        self.intervals.iter().find(|i| i.id == id)
    }

    /// Return only intervals whose span overlaps the query window.
    /// Uses binary search to skip intervals starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Interval> {
        let right_bound = self
            .intervals
            .partition_point(|i| i.span.start < query.end);
        self.intervals[..right_bound]
            .iter()
            .filter(move |i| i.span.end > query.start)
    }

    /// Overlap candidates for a proposed span, ignoring the record being replaced.
    pub fn overlapping_excluding(
        &self,
        query: &Span,
        exclude_id: Option<Ulid>,
    ) -> impl Iterator<Item = &Interval> {
        self.overlapping(query)
            .filter(move |i| Some(i.id) != exclude_id)
    }
}

#[derive(Debug, Clone)]
pub struct TeamState {
    pub id: Ulid,
    pub name: String,
    pub tz: String,
    pub min_players: u32,
    pub min_duration_minutes: u32,
    pub created_at: Ms,
    pub members: BTreeMap<Ulid, Role>,
}

impl TeamState {
    pub fn role_of(&self, member_id: &Ulid) -> Option<Role> {
        self.members.get(member_id).copied()
    }

    pub fn owners(&self) -> impl Iterator<Item = Ulid> + '_ {
        self.members
            .iter()
            .filter(|(_, r)| **r == Role::Owner)
            .map(|(id, _)| *id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invite {
    pub id: Ulid,
    pub team_id: Ulid,
    pub code: String,
    pub created_by: Ulid,
    pub expires_at: Ms,
    /// `None` = unlimited.
    pub max_uses: Option<u32>,
    pub used_count: u32,
    pub active: bool,
    pub created_at: Ms,
}

impl Invite {
    pub fn is_expired(&self, now: Ms) -> bool {
        now > self.expires_at
    }

    pub fn is_exhausted(&self) -> bool {
        self.max_uses.is_some_and(|max| self.used_count >= max)
    }

    pub fn is_valid(&self, now: Ms) -> bool {
        self.active && !self.is_expired(now) && !self.is_exhausted()
    }

    pub fn remaining_uses(&self) -> Option<u32> {
        self.max_uses.map(|max| max.saturating_sub(self.used_count))
    }
}

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    MemberUpserted {
        id: Ulid,
        discord_user_id: String,
        display_name: String,
        avatar_url: Option<String>,
        tz: String,
        created_at: Ms,
    },
    TeamCreated {
        id: Ulid,
        name: String,
        tz: String,
        min_players: u32,
        min_duration_minutes: u32,
        owner_id: Ulid,
        created_at: Ms,
    },
    TeamDeleted {
        id: Ulid,
    },
    MemberJoined {
        team_id: Ulid,
        member_id: Ulid,
        role: Role,
    },
    MemberRoleChanged {
        team_id: Ulid,
        member_id: Ulid,
        role: Role,
    },
    MemberLeft {
        team_id: Ulid,
        member_id: Ulid,
    },
    InviteCreated {
        id: Ulid,
        team_id: Ulid,
        code: String,
        created_by: Ulid,
        expires_at: Ms,
        max_uses: Option<u32>,
        used_count: u32,
        created_at: Ms,
    },
    InviteUsed {
        id: Ulid,
    },
    InviteDeactivated {
        id: Ulid,
    },
    IntervalAccepted {
        id: Ulid,
        owner_id: Ulid,
        span: Span,
        available: bool,
        note: Option<String>,
        created_at: Ms,
    },
    IntervalReplaced {
        id: Ulid,
        owner_id: Ulid,
        span: Span,
        available: bool,
        note: Option<String>,
    },
    IntervalRemoved {
        id: Ulid,
        owner_id: Ulid,
    },
    /// Written by compaction for ids whose intervals are gone.
    IntervalIdsRetired {
        ids: Vec<Ulid>,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberInfo {
    pub id: Ulid,
    pub discord_user_id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub tz: String,
    pub team_id: Option<Ulid>,
    pub role: Option<Role>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamInfo {
    pub id: Ulid,
    pub name: String,
    pub tz: String,
    pub min_players: u32,
    pub min_duration_minutes: u32,
    pub created_at: Ms,
    pub member_count: usize,
}

/// Per-member aggregate over the intervals in an overview window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalStats {
    pub total_available_minutes: i64,
    pub total_unavailable_minutes: i64,
    pub available_slots: u32,
    pub unavailable_slots: u32,
    /// Rounded to two decimals; `0.0` when nothing was recorded.
    pub availability_percentage: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberOverview {
    pub member_id: Ulid,
    pub display_name: String,
    pub avatar_url: Option<String>,
    /// Sorted by start.
    pub intervals: Vec<Interval>,
    pub stats: IntervalStats,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TeamOverview {
    pub team_id: Ulid,
    pub team_name: String,
    pub window: Span,
    pub members: Vec<MemberOverview>,
}
