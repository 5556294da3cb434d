use ulid::Ulid;

use crate::model::*;

use super::conflict::validate_window;
use super::stats::interval_stats;
use super::{Engine, EngineError};

impl Engine {
    pub async fn member_info(&self, id: Ulid) -> Result<MemberInfo, EngineError> {
        let member = self.member_or_not_found(&id)?;
        let guard = member.read().await;
        let membership = self.store.membership(&id);
        Ok(MemberInfo {
            id,
            discord_user_id: guard.discord_user_id.clone(),
            display_name: guard.display_name.clone(),
            avatar_url: guard.avatar_url.clone(),
            tz: guard.tz.clone(),
            team_id: membership.map(|(team, _)| team),
            role: membership.map(|(_, role)| role),
        })
    }

    /// Every member, or only those of `team_id`; ordered by id.
    pub async fn list_members(&self, team_id: Option<Ulid>) -> Result<Vec<MemberInfo>, EngineError> {
        let mut ids = match team_id {
            Some(team_id) => {
                let team = self
                    .store
                    .team(&team_id)
                    .ok_or(EngineError::NotFound(team_id))?;
                team.members.keys().copied().collect()
            }
            None => self.store.member_ids(),
        };
        ids.sort();
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            // A member can't disappear, but skip rather than fail the listing.
            if let Ok(info) = self.member_info(id).await {
                out.push(info);
            }
        }
        Ok(out)
    }

    pub fn team_info(&self, team_id: Ulid) -> Result<TeamInfo, EngineError> {
        let team = self
            .store
            .team(&team_id)
            .ok_or(EngineError::NotFound(team_id))?;
        Ok(TeamInfo {
            id: team.id,
            name: team.name,
            tz: team.tz,
            min_players: team.min_players,
            min_duration_minutes: team.min_duration_minutes,
            created_at: team.created_at,
            member_count: team.members.len(),
        })
    }

    /// A member's intervals intersecting `[from, to)`, by start.
    pub async fn member_intervals(&self, member_id: Ulid, from: Ms, to: Ms) -> Result<Vec<Interval>, EngineError> {
        let window = validate_window(from, to)?;
        self.store
            .find_by_owner_overlapping(&member_id, &window, None)
            .await
            .ok_or(EngineError::NotFound(member_id))
    }

    /// Per-member intervals and stats for a team over `[from, to)`.
    ///
    /// Members come back sorted by id; members without intervals in the
    /// window are included with zeroed stats.
    pub async fn team_overview(&self, team_id: Ulid, from: Ms, to: Ms) -> Result<TeamOverview, EngineError> {
        let window = validate_window(from, to)?;
        let team = self
            .store
            .team(&team_id)
            .ok_or(EngineError::NotFound(team_id))?;
        let grouped = self
            .store
            .find_by_team_overlapping(&team_id, &window)
            .await
            .ok_or(EngineError::NotFound(team_id))?;

        let mut members = Vec::with_capacity(grouped.len());
        for (member_id, intervals) in grouped {
            let (display_name, avatar_url) = match self.store.member(&member_id) {
                Some(member) => {
                    let guard = member.read().await;
                    (guard.display_name.clone(), guard.avatar_url.clone())
                }
                None => (String::new(), None),
            };
            let stats = interval_stats(&intervals);
            members.push(MemberOverview {
                member_id,
                display_name,
                avatar_url,
                intervals,
                stats,
            });
        }

        Ok(TeamOverview {
            team_id,
            team_name: team.name,
            window,
            members,
        })
    }

    /// Team members with no interval at all touching `[from, to)`.
    pub async fn members_without_availability(
        &self,
        team_id: Ulid,
        from: Ms,
        to: Ms,
    ) -> Result<Vec<MemberInfo>, EngineError> {
        let window = validate_window(from, to)?;
        let grouped = self
            .store
            .find_by_team_overlapping(&team_id, &window)
            .await
            .ok_or(EngineError::NotFound(team_id))?;
        let mut out = Vec::new();
        for (member_id, intervals) in grouped {
            if intervals.is_empty() {
                out.push(self.member_info(member_id).await?);
            }
        }
        Ok(out)
    }
}
