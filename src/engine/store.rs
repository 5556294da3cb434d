use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::model::*;

pub type SharedMemberState = Arc<RwLock<MemberState>>;

/// In-memory view of everything the log has committed.
///
/// Member interval sets sit behind their own lock; the directory maps
/// (teams, roster, invites) are only written by `apply_directory`, which
/// the engine runs under its roster lock.
pub struct Store {
    members: DashMap<Ulid, SharedMemberState>,
    discord_index: DashMap<String, Ulid>,
    /// interval id → owning member id
    interval_owner: DashMap<Ulid, Ulid>,
    /// Every interval id ever handed out, live or removed. Ids are never reused.
    interval_ids: DashSet<Ulid>,
    teams: DashMap<Ulid, TeamState>,
    /// member id → team id
    roster: DashMap<Ulid, Ulid>,
    invites: DashMap<Ulid, Invite>,
    invite_codes: DashMap<String, Ulid>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self {
            members: DashMap::new(),
            discord_index: DashMap::new(),
            interval_owner: DashMap::new(),
            interval_ids: DashSet::new(),
            teams: DashMap::new(),
            roster: DashMap::new(),
            invites: DashMap::new(),
            invite_codes: DashMap::new(),
        }
    }

    /// Rebuild state from a replayed log. Nothing else holds these locks yet,
    /// so `try_write` always succeeds.
    pub fn replay(&self, events: &[Event]) {
        for event in events {
            match event {
                Event::MemberUpserted { id, .. } if !self.members.contains_key(id) => {
                    self.insert_member(event);
                }
                Event::MemberUpserted { id, .. }
                | Event::IntervalAccepted { owner_id: id, .. }
                | Event::IntervalReplaced { owner_id: id, .. }
                | Event::IntervalRemoved { owner_id: id, .. } => {
                    if let Some(member) = self.member(id)
                        && let Ok(mut guard) = member.try_write()
                    {
                        self.apply_to_member(&mut guard, event);
                    }
                }
                other => self.apply_directory(other),
            }
        }
    }

    // ── Members ──────────────────────────────────────────────

    pub fn member(&self, id: &Ulid) -> Option<SharedMemberState> {
        self.members.get(id).map(|e| e.value().clone())
    }

    pub fn member_ids(&self) -> Vec<Ulid> {
        self.members.iter().map(|e| *e.key()).collect()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn member_by_discord(&self, discord_user_id: &str) -> Option<Ulid> {
        self.discord_index.get(discord_user_id).map(|e| *e.value())
    }

    pub fn owner_of_interval(&self, interval_id: &Ulid) -> Option<Ulid> {
        self.interval_owner.get(interval_id).map(|e| *e.value())
    }

    /// Claim `id` for a new interval. False if it was ever claimed before.
    pub(super) fn reserve_interval_id(&self, id: Ulid) -> bool {
        self.interval_ids.insert(id)
    }

    /// Give back a claim whose commit never reached the log.
    pub(super) fn release_interval_id(&self, id: &Ulid) {
        if !self.interval_owner.contains_key(id) {
            self.interval_ids.remove(id);
        }
    }

    /// Ids that were used once and no longer name a live interval.
    pub fn retired_interval_ids(&self) -> Vec<Ulid> {
        let mut ids: Vec<Ulid> = self
            .interval_ids
            .iter()
            .map(|e| *e.key())
            .filter(|id| !self.interval_owner.contains_key(id))
            .collect();
        ids.sort();
        ids
    }

    /// Create a member from a `MemberUpserted` event.
    pub fn insert_member(&self, event: &Event) {
        if let Event::MemberUpserted {
            id,
            discord_user_id,
            display_name,
            avatar_url,
            tz,
            created_at,
        } = event
        {
            let state = MemberState::new(
                *id,
                discord_user_id.clone(),
                display_name.clone(),
                avatar_url.clone(),
                tz.clone(),
                *created_at,
            );
            self.discord_index.insert(discord_user_id.clone(), *id);
            self.members.insert(*id, Arc::new(RwLock::new(state)));
        }
    }

    /// Apply a member-scoped event. Caller holds the member's write lock.
    pub fn apply_to_member(&self, ms: &mut MemberState, event: &Event) {
        match event {
            Event::MemberUpserted {
                discord_user_id,
                display_name,
                avatar_url,
                tz,
                ..
            } => {
                if ms.discord_user_id != *discord_user_id {
                    self.discord_index.remove(&ms.discord_user_id);
                    self.discord_index.insert(discord_user_id.clone(), ms.id);
                }
                ms.discord_user_id = discord_user_id.clone();
                ms.display_name = display_name.clone();
                ms.avatar_url = avatar_url.clone();
                ms.tz = tz.clone();
            }
            Event::IntervalAccepted {
                id,
                owner_id,
                span,
                available,
                note,
                created_at,
            } => {
                ms.insert_interval(Interval {
                    id: *id,
                    owner_id: *owner_id,
                    span: *span,
                    available: *available,
                    note: note.clone(),
                    created_at: *created_at,
                });
                self.interval_ids.insert(*id);
                self.interval_owner.insert(*id, *owner_id);
            }
            Event::IntervalReplaced {
                id,
                owner_id,
                span,
                available,
                note,
            } => {
                let created_at = ms
                    .remove_interval(*id)
                    .map(|old| old.created_at)
                    .unwrap_or_default();
                ms.insert_interval(Interval {
                    id: *id,
                    owner_id: *owner_id,
                    span: *span,
                    available: *available,
                    note: note.clone(),
                    created_at,
                });
                self.interval_owner.insert(*id, *owner_id);
            }
            Event::IntervalRemoved { id, .. } => {
                ms.remove_interval(*id);
                self.interval_owner.remove(id);
            }
            _ => {}
        }
    }

    // ── Teams, roster, invites ───────────────────────────────

    pub fn team(&self, id: &Ulid) -> Option<TeamState> {
        self.teams.get(id).map(|e| e.value().clone())
    }

    pub fn team_count(&self) -> usize {
        self.teams.len()
    }

    pub fn team_ids(&self) -> Vec<Ulid> {
        self.teams.iter().map(|e| *e.key()).collect()
    }

    pub fn team_of(&self, member_id: &Ulid) -> Option<Ulid> {
        self.roster.get(member_id).map(|e| *e.value())
    }

    /// `(team, role)` for a member currently on a team.
    pub fn membership(&self, member_id: &Ulid) -> Option<(Ulid, Role)> {
        let team_id = self.team_of(member_id)?;
        let role = self.teams.get(&team_id)?.role_of(member_id)?;
        Some((team_id, role))
    }

    pub fn invite(&self, id: &Ulid) -> Option<Invite> {
        self.invites.get(id).map(|e| e.value().clone())
    }

    pub fn invite_by_code(&self, code: &str) -> Option<Invite> {
        let id = *self.invite_codes.get(code)?.value();
        self.invite(&id)
    }

    pub fn code_taken(&self, code: &str) -> bool {
        self.invite_codes.contains_key(code)
    }

    pub fn invites_for_team(&self, team_id: &Ulid) -> Vec<Invite> {
        let mut out: Vec<Invite> = self
            .invites
            .iter()
            .filter(|e| e.value().team_id == *team_id)
            .map(|e| e.value().clone())
            .collect();
        out.sort_by_key(|i| i.id);
        out
    }

    pub fn all_invites(&self) -> Vec<Invite> {
        let mut out: Vec<Invite> = self.invites.iter().map(|e| e.value().clone()).collect();
        out.sort_by_key(|i| i.id);
        out
    }

    /// Apply a team, roster or invite event.
    pub fn apply_directory(&self, event: &Event) {
        match event {
            Event::TeamCreated {
                id,
                name,
                tz,
                min_players,
                min_duration_minutes,
                owner_id,
                created_at,
            } => {
                let mut members = std::collections::BTreeMap::new();
                members.insert(*owner_id, Role::Owner);
                self.teams.insert(
                    *id,
                    TeamState {
                        id: *id,
                        name: name.clone(),
                        tz: tz.clone(),
                        min_players: *min_players,
                        min_duration_minutes: *min_duration_minutes,
                        created_at: *created_at,
                        members,
                    },
                );
                self.roster.insert(*owner_id, *id);
            }
            Event::TeamDeleted { id } => {
                if let Some((_, team)) = self.teams.remove(id) {
                    for member_id in team.members.keys() {
                        self.roster.remove(member_id);
                    }
                }
                for mut invite in self.invites.iter_mut() {
                    if invite.team_id == *id {
                        invite.active = false;
                    }
                }
            }
            Event::MemberJoined {
                team_id,
                member_id,
                role,
            }
            | Event::MemberRoleChanged {
                team_id,
                member_id,
                role,
            } => {
                if let Some(mut team) = self.teams.get_mut(team_id) {
                    team.members.insert(*member_id, *role);
                    self.roster.insert(*member_id, *team_id);
                }
            }
            Event::MemberLeft { team_id, member_id } => {
                if let Some(mut team) = self.teams.get_mut(team_id) {
                    team.members.remove(member_id);
                }
                self.roster.remove(member_id);
            }
            Event::InviteCreated {
                id,
                team_id,
                code,
                created_by,
                expires_at,
                max_uses,
                used_count,
                created_at,
            } => {
                self.invite_codes.insert(code.clone(), *id);
                self.invites.insert(
                    *id,
                    Invite {
                        id: *id,
                        team_id: *team_id,
                        code: code.clone(),
                        created_by: *created_by,
                        expires_at: *expires_at,
                        max_uses: *max_uses,
                        used_count: *used_count,
                        active: true,
                        created_at: *created_at,
                    },
                );
            }
            Event::InviteUsed { id } => {
                if let Some(mut invite) = self.invites.get_mut(id) {
                    invite.used_count += 1;
                }
            }
            Event::InviteDeactivated { id } => {
                if let Some(mut invite) = self.invites.get_mut(id) {
                    invite.active = false;
                }
            }
            Event::MemberUpserted { .. } => self.insert_member(event),
            Event::IntervalIdsRetired { ids } => {
                for id in ids {
                    self.interval_ids.insert(*id);
                }
            }
            Event::IntervalAccepted { .. }
            | Event::IntervalReplaced { .. }
            | Event::IntervalRemoved { .. } => {}
        }
    }

    // ── Interval lookups ─────────────────────────────────────

    /// Intervals of one member intersecting `window`, ordered by start.
    pub async fn find_by_owner_overlapping(
        &self,
        owner_id: &Ulid,
        window: &Span,
        exclude_id: Option<Ulid>,
    ) -> Option<Vec<Interval>> {
        let member = self.member(owner_id)?;
        let guard = member.read().await;
        Some(
            guard
                .overlapping_excluding(window, exclude_id)
                .cloned()
                .collect(),
        )
    }

    /// Intervals of every current member of `team_id` intersecting `window`,
    /// grouped by member id in ascending order.
    pub async fn find_by_team_overlapping(
        &self,
        team_id: &Ulid,
        window: &Span,
    ) -> Option<Vec<(Ulid, Vec<Interval>)>> {
        let team = self.team(team_id)?;
        let mut out = Vec::with_capacity(team.members.len());
        for member_id in team.members.keys() {
            let intervals = self
                .find_by_owner_overlapping(member_id, window, None)
                .await
                .unwrap_or_default();
            out.push((*member_id, intervals));
        }
        Some(out)
    }
}
