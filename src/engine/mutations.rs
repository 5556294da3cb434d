use std::collections::HashSet;

use tokio::sync::oneshot;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::timezone::{normalize, WallClock};

use super::conflict::{check_no_overlap, now_ms, validate_note, validate_span};
use super::{Engine, EngineError, WalCommand};

/// A member's requested interval, as submitted.
#[derive(Debug, Clone)]
pub struct Proposal {
    /// Requested id for a new interval; the server assigns one when `None`.
    pub id: Option<Ulid>,
    pub start: WallClock,
    pub end: WallClock,
    /// IANA zone the wall clocks are read in; the member's own zone when `None`.
    pub tz: Option<String>,
    pub available: bool,
    pub note: Option<String>,
}

impl Engine {
    /// Validate and store an interval for `owner_id`.
    ///
    /// With `exclude_id` set this replaces that interval in place: it is left
    /// out of the overlap check and keeps its id and `created_at`.
    pub async fn submit(
        &self,
        owner_id: Ulid,
        proposal: Proposal,
        exclude_id: Option<Ulid>,
    ) -> Result<Interval, EngineError> {
        tracing::debug!(%owner_id, ?exclude_id, "submit interval");
        let result = self.submit_inner(owner_id, proposal, exclude_id).await;
        match &result {
            Ok(interval) => tracing::info!(id = %interval.id, %owner_id, "accepted interval"),
            Err(e) => {
                metrics::counter!(crate::observability::INTERVAL_REJECTIONS_TOTAL, "kind" => e.kind())
                    .increment(1);
                tracing::debug!(%owner_id, error = %e, "rejected interval");
            }
        }
        result
    }

    async fn submit_inner(
        &self,
        owner_id: Ulid,
        proposal: Proposal,
        exclude_id: Option<Ulid>,
    ) -> Result<Interval, EngineError> {
        let member = self.member_or_not_found(&owner_id)?;
        let guard = member.write_owned().await;

        let tz = proposal.tz.as_deref().unwrap_or(&guard.tz);
        let start = normalize(&proposal.start, tz)?;
        let end = normalize(&proposal.end, tz)?;
        let span = validate_span(owner_id, start, end)?;
        validate_note(proposal.note.as_deref())?;

        let interval = match exclude_id {
            Some(id) => {
                let existing = guard.get_interval(id).ok_or(EngineError::NotFound(id))?;
                let created_at = existing.created_at;
                check_no_overlap(&guard, &span, Some(id))?;
                Interval {
                    id,
                    owner_id,
                    span,
                    available: proposal.available,
                    note: proposal.note,
                    created_at,
                }
            }
            None => {
                if guard.intervals.len() >= MAX_INTERVALS_PER_MEMBER {
                    return Err(EngineError::LimitExceeded("too many intervals for member"));
                }
                check_no_overlap(&guard, &span, None)?;
                // Last check before commit; the claim is atomic across members.
                let id = proposal.id.unwrap_or_else(Ulid::new);
                if !self.store.reserve_interval_id(id) {
                    return Err(EngineError::AlreadyExists(id));
                }
                Interval {
                    id,
                    owner_id,
                    span,
                    available: proposal.available,
                    note: proposal.note,
                    created_at: now_ms(),
                }
            }
        };

        let event = if exclude_id.is_some() {
            Event::IntervalReplaced {
                id: interval.id,
                owner_id,
                span,
                available: interval.available,
                note: interval.note.clone(),
            }
        } else {
            Event::IntervalAccepted {
                id: interval.id,
                owner_id,
                span,
                available: interval.available,
                note: interval.note.clone(),
                created_at: interval.created_at,
            }
        };
        let committed = self
            .commit(guard, vec![event], |store, ms, ev| store.apply_to_member(ms, ev))
            .await;
        if committed.is_err() && exclude_id.is_none() {
            self.store.release_interval_id(&interval.id);
        }
        committed?;
        Ok(interval)
    }

    /// Replace an interval's range, flag and note.
    ///
    /// Ownership is settled before anything about the new range is looked at.
    pub async fn update_interval(
        &self,
        id: Ulid,
        requester: Ulid,
        is_elevated: bool,
        proposal: Proposal,
    ) -> Result<Interval, EngineError> {
        let owner_id = self.authorize_interval(id, requester, is_elevated)?;
        self.submit(owner_id, proposal, Some(id)).await
    }

    /// Delete an interval outright.
    pub async fn remove(&self, id: Ulid, requester: Ulid, is_elevated: bool) -> Result<Interval, EngineError> {
        let owner_id = self.authorize_interval(id, requester, is_elevated)?;
        let member = self.member_or_not_found(&owner_id)?;
        let guard = member.write_owned().await;
        let removed = guard
            .get_interval(id)
            .cloned()
            .ok_or(EngineError::NotFound(id))?;

        let event = Event::IntervalRemoved { id, owner_id };
        self.commit(guard, vec![event], |store, ms, ev| store.apply_to_member(ms, ev))
            .await?;
        tracing::info!(%id, %owner_id, %requester, "removed interval");
        Ok(removed)
    }

    fn authorize_interval(&self, id: Ulid, requester: Ulid, is_elevated: bool) -> Result<Ulid, EngineError> {
        let owner_id = self
            .store
            .owner_of_interval(&id)
            .ok_or(EngineError::NotFound(id))?;
        if owner_id != requester && !is_elevated {
            return Err(EngineError::Forbidden {
                actor: requester,
                reason: "only the owner or a team admin may change this interval",
            });
        }
        Ok(owner_id)
    }

    /// Delete every interval that ended before `cutoff`. Returns how many went.
    pub async fn remove_ended_before(&self, cutoff: Ms) -> Result<usize, EngineError> {
        let mut removed = 0;
        for member_id in self.store.member_ids() {
            let Some(member) = self.store.member(&member_id) else {
                continue;
            };
            let guard = member.write_owned().await;
            let events: Vec<Event> = guard
                .intervals
                .iter()
                .filter(|i| i.span.end < cutoff)
                .map(|i| Event::IntervalRemoved {
                    id: i.id,
                    owner_id: member_id,
                })
                .collect();
            if events.is_empty() {
                continue;
            }
            removed += events.len();
            self.commit(guard, events, |store, ms, ev| store.apply_to_member(ms, ev))
                .await?;
        }
        Ok(removed)
    }

    /// Rewrite the WAL as the smallest event list that rebuilds current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        // Roster lock plus every member's read lock, taken in id order, pins a
        // consistent snapshot until the compacted file is swapped in.
        let _roster = self.lock_roster().await;
        let mut events = Vec::new();
        let mut member_ids = self.store.member_ids();
        member_ids.sort();

        let mut guards = Vec::with_capacity(member_ids.len());
        for id in &member_ids {
            if let Some(member) = self.store.member(id) {
                guards.push(member.read_owned().await);
            }
        }

        for ms in &guards {
            events.push(Event::MemberUpserted {
                id: ms.id,
                discord_user_id: ms.discord_user_id.clone(),
                display_name: ms.display_name.clone(),
                avatar_url: ms.avatar_url.clone(),
                tz: ms.tz.clone(),
                created_at: ms.created_at,
            });
        }

        let mut team_ids = self.store.team_ids();
        team_ids.sort();
        let mut live_teams = HashSet::new();
        for team_id in team_ids {
            let Some(team) = self.store.team(&team_id) else {
                continue;
            };
            let Some(owner_id) = team.owners().next() else {
                continue;
            };
            live_teams.insert(team_id);
            events.push(Event::TeamCreated {
                id: team.id,
                name: team.name.clone(),
                tz: team.tz.clone(),
                min_players: team.min_players,
                min_duration_minutes: team.min_duration_minutes,
                owner_id,
                created_at: team.created_at,
            });
            for (member_id, role) in &team.members {
                if *member_id != owner_id {
                    events.push(Event::MemberJoined {
                        team_id,
                        member_id: *member_id,
                        role: *role,
                    });
                }
            }
        }

        // Inactive invites stay so their codes remain reserved.
        for invite in self.store.all_invites() {
            events.push(Event::InviteCreated {
                id: invite.id,
                team_id: invite.team_id,
                code: invite.code.clone(),
                created_by: invite.created_by,
                expires_at: invite.expires_at,
                max_uses: invite.max_uses,
                used_count: invite.used_count,
                created_at: invite.created_at,
            });
            if !invite.active || !live_teams.contains(&invite.team_id) {
                events.push(Event::InviteDeactivated { id: invite.id });
            }
        }

        for ms in &guards {
            for interval in &ms.intervals {
                events.push(Event::IntervalAccepted {
                    id: interval.id,
                    owner_id: interval.owner_id,
                    span: interval.span,
                    available: interval.available,
                    note: interval.note.clone(),
                    created_at: interval.created_at,
                });
            }
        }

        let retired = self.store.retired_interval_ids();
        if !retired.is_empty() {
            events.push(Event::IntervalIdsRetired { ids: retired });
        }

        let count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::StorageUnavailable("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::StorageUnavailable("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::StorageUnavailable(e.to_string()))?;
        drop(guards);
        tracing::info!(events = count, "compacted WAL");
        Ok(())
    }
}
