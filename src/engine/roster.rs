use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::timezone::parse_tz;

use super::conflict::now_ms;
use super::{Engine, EngineError};

/// Parameters for a new team. Unset fields take the usual defaults.
#[derive(Debug, Clone, Default)]
pub struct NewTeam {
    pub id: Option<Ulid>,
    pub name: String,
    pub tz: Option<String>,
    pub min_players: Option<u32>,
    pub min_duration_minutes: Option<u32>,
}

fn check_len(value: &str, max: usize, what: &'static str) -> Result<(), EngineError> {
    if value.trim().is_empty() || value.chars().count() > max {
        return Err(EngineError::LimitExceeded(what));
    }
    Ok(())
}

fn check_tz(tz: &str) -> Result<(), EngineError> {
    parse_tz(tz)?;
    Ok(())
}

impl Engine {
    /// Create or refresh the profile for a Discord account.
    pub async fn upsert_member(
        &self,
        discord_user_id: &str,
        display_name: &str,
        avatar_url: Option<String>,
        tz: Option<String>,
    ) -> Result<MemberInfo, EngineError> {
        check_len(discord_user_id, MAX_DISCORD_ID_LEN, "discord user id must be 1-32 characters")?;
        check_len(display_name, MAX_NAME_LEN, "display name must be 1-100 characters")?;
        if avatar_url.as_ref().is_some_and(|u| u.len() > MAX_URL_LEN) {
            return Err(EngineError::LimitExceeded("avatar url too long"));
        }
        if let Some(tz) = &tz {
            check_tz(tz)?;
        }

        let roster = self.lock_roster().await;
        let member_id = match self.store.member_by_discord(discord_user_id) {
            Some(id) => {
                let member = self.member_or_not_found(&id)?;
                let guard = member.write_owned().await;
                let event = Event::MemberUpserted {
                    id,
                    discord_user_id: discord_user_id.to_string(),
                    display_name: display_name.to_string(),
                    avatar_url,
                    tz: tz.unwrap_or_else(|| guard.tz.clone()),
                    created_at: guard.created_at,
                };
                drop(roster);
                self.commit(guard, vec![event], |store, ms, ev| store.apply_to_member(ms, ev))
                    .await?;
                id
            }
            None => {
                if self.store.member_count() >= MAX_MEMBERS {
                    return Err(EngineError::LimitExceeded("too many members"));
                }
                let id = Ulid::new();
                let event = Event::MemberUpserted {
                    id,
                    discord_user_id: discord_user_id.to_string(),
                    display_name: display_name.to_string(),
                    avatar_url,
                    tz: tz.unwrap_or_else(|| self.default_tz.clone()),
                    created_at: now_ms(),
                };
                self.commit_directory(roster, vec![event]).await?;
                tracing::info!(%id, discord_user_id, "registered member");
                id
            }
        };
        self.member_info(member_id).await
    }

    /// Found a team with `creator` as its owner.
    pub async fn create_team(&self, creator: Ulid, team: NewTeam) -> Result<TeamInfo, EngineError> {
        check_len(&team.name, MAX_NAME_LEN, "team name must be 1-100 characters")?;
        if let Some(tz) = &team.tz {
            check_tz(tz)?;
        }
        let member = self.member_or_not_found(&creator)?;
        let creator_tz = member.read().await.tz.clone();

        let roster = self.lock_roster().await;
        if self.store.team_of(&creator).is_some() {
            return Err(EngineError::AlreadyInTeam(creator));
        }
        if self.store.team_count() >= MAX_TEAMS {
            return Err(EngineError::LimitExceeded("too many teams"));
        }
        let id = team.id.unwrap_or_else(Ulid::new);
        if self.store.team(&id).is_some() {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::TeamCreated {
            id,
            name: team.name.trim().to_string(),
            tz: team.tz.unwrap_or(creator_tz),
            min_players: team.min_players.unwrap_or(DEFAULT_MIN_PLAYERS),
            min_duration_minutes: team
                .min_duration_minutes
                .unwrap_or(DEFAULT_MIN_DURATION_MINUTES),
            owner_id: creator,
            created_at: now_ms(),
        };
        self.commit_directory(roster, vec![event]).await?;
        tracing::info!(team_id = %id, owner_id = %creator, "created team");
        self.team_info(id)
    }

    /// Owner-only. Deactivates the team's invites and releases every member.
    pub async fn delete_team(&self, team_id: Ulid, requester: Ulid) -> Result<(), EngineError> {
        let roster = self.lock_roster().await;
        let team = self
            .store
            .team(&team_id)
            .ok_or(EngineError::NotFound(team_id))?;
        if team.role_of(&requester) != Some(Role::Owner) {
            return Err(EngineError::Forbidden {
                actor: requester,
                reason: "only the team owner may delete the team",
            });
        }
        self.commit_directory(roster, vec![Event::TeamDeleted { id: team_id }])
            .await?;
        tracing::info!(%team_id, members = team.members.len(), "deleted team");
        Ok(())
    }

    pub async fn create_invite(
        &self,
        team_id: Ulid,
        requester: Ulid,
        expires_at: Ms,
        max_uses: Option<u32>,
        id: Option<Ulid>,
    ) -> Result<Invite, EngineError> {
        let now = now_ms();
        if expires_at <= now {
            return Err(EngineError::InviteInvalid("expiry must be in the future".into()));
        }
        if max_uses == Some(0) {
            return Err(EngineError::InviteInvalid("max uses must be positive".into()));
        }

        let roster = self.lock_roster().await;
        self.require_elevated(requester, team_id, "only team admins may create invites")?;
        let active = self
            .store
            .invites_for_team(&team_id)
            .iter()
            .filter(|i| i.is_valid(now))
            .count();
        if active >= MAX_ACTIVE_INVITES_PER_TEAM {
            return Err(EngineError::LimitExceeded("team already has 5 active invites"));
        }
        let id = id.unwrap_or_else(Ulid::new);
        if self.store.invite(&id).is_some() {
            return Err(EngineError::AlreadyExists(id));
        }

        let code = self.fresh_invite_code();
        let event = Event::InviteCreated {
            id,
            team_id,
            code: code.clone(),
            created_by: requester,
            expires_at,
            max_uses,
            used_count: 0,
            created_at: now,
        };
        self.commit_directory(roster, vec![event]).await?;
        tracing::info!(%team_id, invite_id = %id, code, "created invite");
        self.store.invite(&id).ok_or(EngineError::NotFound(id))
    }

    pub async fn deactivate_invite(&self, invite_id: Ulid, requester: Ulid) -> Result<(), EngineError> {
        let roster = self.lock_roster().await;
        let invite = self
            .store
            .invite(&invite_id)
            .ok_or(EngineError::NotFound(invite_id))?;
        self.require_elevated(requester, invite.team_id, "only team admins may deactivate invites")?;
        if !invite.active {
            return Ok(());
        }
        self.commit_directory(roster, vec![Event::InviteDeactivated { id: invite_id }])
            .await?;
        tracing::info!(%invite_id, %requester, "deactivated invite");
        Ok(())
    }

    /// Invites of a team that can still be redeemed. Admins only.
    pub fn list_invites(&self, team_id: Ulid, requester: Ulid) -> Result<Vec<Invite>, EngineError> {
        self.require_elevated(requester, team_id, "only team admins may view invites")?;
        let now = now_ms();
        Ok(self
            .store
            .invites_for_team(&team_id)
            .into_iter()
            .filter(|i| i.is_valid(now))
            .collect())
    }

    /// Redeem an invite code. The joiner becomes a player.
    pub async fn join_team(&self, member_id: Ulid, code: &str) -> Result<TeamInfo, EngineError> {
        self.member_or_not_found(&member_id)?;
        let code = code.trim().to_ascii_uppercase();

        let roster = self.lock_roster().await;
        if self.store.team_of(&member_id).is_some() {
            return Err(EngineError::AlreadyInTeam(member_id));
        }
        let invite = self
            .store
            .invite_by_code(&code)
            .ok_or_else(|| EngineError::InviteInvalid(format!("unknown invite code {code}")))?;
        if !invite.is_valid(now_ms()) {
            return Err(EngineError::InviteInvalid(format!(
                "invite {code} is expired, deactivated or used up"
            )));
        }
        if self.store.team(&invite.team_id).is_none() {
            return Err(EngineError::InviteInvalid(format!("invite {code} has no team")));
        }

        let events = vec![
            Event::MemberJoined {
                team_id: invite.team_id,
                member_id,
                role: Role::Player,
            },
            Event::InviteUsed { id: invite.id },
        ];
        self.commit_directory(roster, events).await?;
        tracing::info!(%member_id, team_id = %invite.team_id, code, "member joined team");
        self.team_info(invite.team_id)
    }

    /// Leave the current team. A sole owner hands the team to another admin,
    /// or takes the team down with them when there is none.
    pub async fn leave_team(&self, member_id: Ulid) -> Result<(), EngineError> {
        let roster = self.lock_roster().await;
        let (team_id, role) = self
            .store
            .membership(&member_id)
            .ok_or(EngineError::NotInTeam(member_id))?;
        let team = self
            .store
            .team(&team_id)
            .ok_or(EngineError::NotFound(team_id))?;

        let sole_owner = role == Role::Owner && team.owners().all(|id| id == member_id);
        let events = if sole_owner {
            let successor = team
                .members
                .iter()
                .find(|(id, role)| **id != member_id && **role == Role::Admin)
                .map(|(id, _)| *id);
            match successor {
                Some(successor) => {
                    tracing::info!(%team_id, from = %member_id, to = %successor, "transferring ownership");
                    vec![
                        Event::MemberRoleChanged {
                            team_id,
                            member_id: successor,
                            role: Role::Owner,
                        },
                        Event::MemberLeft { team_id, member_id },
                    ]
                }
                None => {
                    tracing::info!(%team_id, "last owner left without an admin, deleting team");
                    vec![Event::TeamDeleted { id: team_id }]
                }
            }
        } else {
            vec![Event::MemberLeft { team_id, member_id }]
        };
        self.commit_directory(roster, events).await?;
        tracing::info!(%member_id, %team_id, "member left team");
        Ok(())
    }

    /// Owner-only promotion to admin or demotion to player.
    pub async fn set_role(
        &self,
        team_id: Ulid,
        requester: Ulid,
        member_id: Ulid,
        role: Role,
    ) -> Result<(), EngineError> {
        if role == Role::Owner {
            return Err(EngineError::Forbidden {
                actor: requester,
                reason: "ownership changes hands only when the owner leaves",
            });
        }
        let roster = self.lock_roster().await;
        let team = self
            .store
            .team(&team_id)
            .ok_or(EngineError::NotFound(team_id))?;
        if team.role_of(&requester) != Some(Role::Owner) {
            return Err(EngineError::Forbidden {
                actor: requester,
                reason: "only the team owner may change roles",
            });
        }
        match team.role_of(&member_id) {
            None => return Err(EngineError::NotInTeam(member_id)),
            Some(Role::Owner) => {
                return Err(EngineError::Forbidden {
                    actor: requester,
                    reason: "the owner's role cannot be changed",
                });
            }
            Some(current) if current == role => return Ok(()),
            Some(_) => {}
        }
        let event = Event::MemberRoleChanged {
            team_id,
            member_id,
            role,
        };
        self.commit_directory(roster, vec![event]).await?;
        tracing::info!(%team_id, %member_id, role = role.as_str(), "changed role");
        Ok(())
    }

    fn require_elevated(&self, actor: Ulid, team_id: Ulid, reason: &'static str) -> Result<Role, EngineError> {
        if self.store.team(&team_id).is_none() {
            return Err(EngineError::NotFound(team_id));
        }
        match self.store.membership(&actor) {
            Some((team, role)) if team == team_id && role.is_elevated() => Ok(role),
            _ => Err(EngineError::Forbidden { actor, reason }),
        }
    }

    /// A code from the invite alphabet that no invite, live or dead, uses.
    fn fresh_invite_code(&self) -> String {
        let base = INVITE_CODE_ALPHABET.len() as u128;
        loop {
            let mut bits = Ulid::new().random();
            let code: String = (0..INVITE_CODE_LEN)
                .map(|_| {
                    let c = INVITE_CODE_ALPHABET[(bits % base) as usize] as char;
                    bits /= base;
                    c
                })
                .collect();
            if !self.store.code_taken(&code) {
                return code;
            }
        }
    }
}
