mod conflict;
mod error;
mod mutations;
mod queries;
mod roster;
mod stats;
mod store;

pub use conflict::now_ms;
pub use error::EngineError;
pub use mutations::Proposal;
pub use roster::NewTeam;
pub use stats::interval_stats;
pub use store::{SharedMemberState, Store};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex};
use ulid::Ulid;

use crate::model::*;
use crate::wal::Wal;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    /// Events of one operation; written back to back in one fsync.
    Append {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Vec<Event>, oneshot::Sender<io::Result<()>>);

/// Owns the WAL. Waits for one append, drains whatever else is queued,
/// then commits the whole batch with a single fsync.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let WalCommand::Append { events, response } = cmd else {
            handle_non_append(&mut wal, cmd);
            continue;
        };
        let mut batch = vec![(events, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { events, response }) => batch.push((events, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        if let Err(e) = &result {
            tracing::error!(error = %e, batch = batch.len(), "WAL flush failed");
        }
        respond_batch(batch, &result);

        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let appended = batch
        .iter()
        .flat_map(|(events, _)| events)
        .try_for_each(|event| wal.append_buffered(event));
    // Flush even after a failed append so half-written bytes don't sit in the
    // buffer and leak into the next batch.
    let flushed = wal.flush_sync();
    appended.and(flushed)
}

fn respond_batch(batch: Vec<PendingAppend>, result: &io::Result<()>) {
    for (_, tx) in batch {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result =
                Wal::write_compact_file(wal.path(), &events).and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => {}
    }
}

async fn send_append(wal_tx: &mpsc::Sender<WalCommand>, events: Vec<Event>) -> Result<(), EngineError> {
    let (tx, rx) = oneshot::channel();
    wal_tx
        .send(WalCommand::Append {
            events,
            response: tx,
        })
        .await
        .map_err(|_| EngineError::StorageUnavailable("WAL writer shut down".into()))?;
    rx.await
        .map_err(|_| EngineError::StorageUnavailable("WAL writer dropped response".into()))?
        .map_err(|e| EngineError::StorageUnavailable(e.to_string()))
}

/// Availability intervals, teams and invites, all held in memory and made
/// durable through the WAL before any change becomes visible.
pub struct Engine {
    pub(super) store: Arc<Store>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Serializes team, membership and invite changes.
    pub(super) roster_lock: Arc<Mutex<()>>,
    /// Timezone for members who don't name one.
    pub(super) default_tz: String,
}

impl Engine {
    pub fn new(wal_path: PathBuf, default_tz: impl Into<String>) -> io::Result<Self> {
        let default_tz = default_tz.into();
        crate::timezone::parse_tz(&default_tz)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let store = Store::new();
        store.replay(&events);
        tracing::info!(
            events = events.len(),
            members = store.member_count(),
            teams = store.team_count(),
            "replayed WAL"
        );

        Ok(Self {
            store: Arc::new(store),
            wal_tx,
            roster_lock: Arc::new(Mutex::new(())),
            default_tz,
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn default_tz(&self) -> &str {
        &self.default_tz
    }

    /// Log `events`, then apply them while still holding `guard`.
    ///
    /// Runs on its own task: once validation has passed, dropping the
    /// caller's future can no longer split the log from memory.
    pub(super) async fn commit<G, F>(&self, guard: G, events: Vec<Event>, apply: F) -> Result<(), EngineError>
    where
        G: Send + 'static,
        F: Fn(&Store, &mut G, &Event) + Send + 'static,
    {
        let wal_tx = self.wal_tx.clone();
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            let mut guard = guard;
            send_append(&wal_tx, events.clone()).await?;
            for event in &events {
                apply(&store, &mut guard, event);
            }
            Ok::<(), EngineError>(())
        })
        .await
        .map_err(|e| EngineError::StorageUnavailable(format!("commit task failed: {e}")))?
    }

    /// Commit directory events (teams, roster, invites) under the roster lock.
    pub(super) async fn commit_directory(
        &self,
        guard: tokio::sync::OwnedMutexGuard<()>,
        events: Vec<Event>,
    ) -> Result<(), EngineError> {
        self.commit(guard, events, |store, _, event| store.apply_directory(event))
            .await
    }

    pub(super) async fn lock_roster(&self) -> tokio::sync::OwnedMutexGuard<()> {
        Arc::clone(&self.roster_lock).lock_owned().await
    }

    pub(super) fn member_or_not_found(&self, id: &Ulid) -> Result<SharedMemberState, EngineError> {
        self.store.member(id).ok_or(EngineError::NotFound(*id))
    }

    /// Whether `actor` is an owner or admin on the team `target` belongs to.
    pub fn is_elevated_over(&self, actor: &Ulid, target: &Ulid) -> bool {
        match (self.store.membership(actor), self.store.team_of(target)) {
            (Some((actor_team, role)), Some(target_team)) => {
                actor_team == target_team && role.is_elevated()
            }
            _ => false,
        }
    }

    /// The team `member_id` belongs to.
    pub fn team_of_member(&self, member_id: &Ulid) -> Result<Ulid, EngineError> {
        self.store
            .team_of(member_id)
            .ok_or(EngineError::NotInTeam(*member_id))
    }

    /// Team-scoped reads are open to that team's members only.
    pub fn require_team_member(&self, member_id: &Ulid, team_id: &Ulid) -> Result<(), EngineError> {
        if self.store.team(team_id).is_none() {
            return Err(EngineError::NotFound(*team_id));
        }
        if self.store.team_of(member_id) != Some(*team_id) {
            return Err(EngineError::Forbidden {
                actor: *member_id,
                reason: "not a member of this team",
            });
        }
        Ok(())
    }

    /// Members see their own intervals and those of teammates.
    pub fn can_view(&self, actor: &Ulid, target: &Ulid) -> bool {
        actor == target
            || matches!(
                (self.store.team_of(actor), self.store.team_of(target)),
                (Some(a), Some(b)) if a == b
            )
    }

    pub fn member_by_discord(&self, discord_user_id: &str) -> Option<Ulid> {
        self.store.member_by_discord(discord_user_id)
    }

    pub fn owner_of_interval(&self, interval_id: &Ulid) -> Option<Ulid> {
        self.store.owner_of_interval(interval_id)
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
