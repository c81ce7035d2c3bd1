//! Cron service - scheduled jobs that wake the agent.
//!
//! Jobs live in a JSON store under `~/.femtoclaw/cron/jobs.json`. The
//! scheduler task sleeps until the next due job and, on trigger, synthesizes
//! a system inbound message on the bus — the agent core has no awareness of
//! scheduling semantics, only of the resulting inbound event.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::bus::{InboundMessage, MessageBus};
use crate::error::{FemtoError, Result};

/// How a job decides when to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    /// Run once at a fixed millisecond timestamp.
    At { at_ms: i64 },
    /// Run repeatedly at a fixed millisecond interval.
    Every { every_ms: i64 },
    /// Run on a cron expression (e.g. `0 9 * * *`).
    Cron { expr: String },
}

/// What to do when a job fires.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Payload {
    /// The message injected as the agent's input.
    pub message: String,
    /// Deliver the agent's response to a channel instead of dropping it.
    #[serde(default)]
    pub deliver: bool,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
}

/// Runtime bookkeeping for a job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobState {
    pub next_run_at_ms: Option<i64>,
    pub last_run_at_ms: Option<i64>,
    pub last_status: Option<String>,
}

/// One scheduled job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronJob {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub schedule: Schedule,
    pub payload: Payload,
    #[serde(default)]
    pub state: JobState,
    pub created_at_ms: i64,
    /// One-shot jobs are removed after their first run.
    #[serde(default)]
    pub delete_after_run: bool,
}

/// The persisted job collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CronStore {
    #[serde(default = "CronStore::current_version")]
    pub version: u32,
    #[serde(default)]
    pub jobs: Vec<CronJob>,
}

impl CronStore {
    fn current_version() -> u32 {
        1
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Compute the next run time for a schedule, in epoch milliseconds.
fn next_run_ms(schedule: &Schedule, after_ms: i64) -> Option<i64> {
    match schedule {
        Schedule::At { at_ms } => (*at_ms > after_ms).then_some(*at_ms),
        Schedule::Every { every_ms } => {
            if *every_ms <= 0 {
                return None;
            }
            Some(after_ms + every_ms)
        }
        Schedule::Cron { expr } => {
            let cron: croner::Cron = expr.parse().ok()?;
            let after: DateTime<Utc> = Utc.timestamp_millis_opt(after_ms).single()?;
            cron.iter_after(after).next().map(|t| t.timestamp_millis())
        }
    }
}

/// Owns the job store and the scheduler loop.
pub struct CronService {
    store_path: PathBuf,
    bus: Arc<MessageBus>,
    store: Mutex<CronStore>,
    /// Pokes the scheduler when the job set changes.
    wake_tx: watch::Sender<u64>,
}

impl CronService {
    pub fn new(store_path: PathBuf, bus: Arc<MessageBus>) -> Self {
        let store = Self::load_store(&store_path);
        let (wake_tx, _) = watch::channel(0);
        Self {
            store_path,
            bus,
            store: Mutex::new(store),
            wake_tx,
        }
    }

    fn load_store(path: &PathBuf) -> CronStore {
        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!(error = %e, "Corrupt cron store, starting empty");
                CronStore::default()
            }),
            Err(_) => CronStore::default(),
        }
    }

    async fn persist(&self, store: &CronStore) -> Result<()> {
        if let Some(parent) = self.store_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| FemtoError::Persistence(format!("create cron dir: {}", e)))?;
        }
        let content = serde_json::to_string_pretty(store)?;
        tokio::fs::write(&self.store_path, content)
            .await
            .map_err(|e| FemtoError::Persistence(format!("write cron store: {}", e)))?;
        Ok(())
    }

    fn poke(&self) {
        self.wake_tx.send_modify(|n| *n += 1);
    }

    /// Add a job and return it. `delete_after_run` marks a one-shot job.
    pub async fn add_job(
        &self,
        name: &str,
        schedule: Schedule,
        payload: Payload,
        delete_after_run: bool,
    ) -> Result<CronJob> {
        let now = now_ms();
        let mut job = CronJob {
            id: Uuid::new_v4().to_string()[..8].to_string(),
            name: name.to_string(),
            enabled: true,
            schedule,
            payload,
            state: JobState::default(),
            created_at_ms: now,
            delete_after_run,
        };
        job.state.next_run_at_ms = next_run_ms(&job.schedule, now);
        if job.state.next_run_at_ms.is_none() {
            return Err(FemtoError::Validation(format!(
                "job '{}' would never run",
                name
            )));
        }

        let mut store = self.store.lock().await;
        store.jobs.push(job.clone());
        self.persist(&store).await?;
        drop(store);

        info!(job = %job.name, id = %job.id, "Cron job added");
        self.poke();
        Ok(job)
    }

    pub async fn list_jobs(&self) -> Vec<CronJob> {
        self.store.lock().await.jobs.clone()
    }

    /// Remove a job by id; returns whether it existed.
    pub async fn remove_job(&self, id: &str) -> Result<bool> {
        let mut store = self.store.lock().await;
        let before = store.jobs.len();
        store.jobs.retain(|j| j.id != id);
        let removed = store.jobs.len() < before;
        if removed {
            self.persist(&store).await?;
        }
        drop(store);
        if removed {
            self.poke();
        }
        Ok(removed)
    }

    /// Fire a job: publish its payload as a system inbound event.
    ///
    /// The chat id encodes the delivery target so the agent loop routes the
    /// response like any other system-originated turn.
    fn fire(&self, job: &CronJob) -> Result<()> {
        let (channel, to) = if job.payload.deliver {
            (
                job.payload.channel.as_deref().unwrap_or("cli"),
                job.payload.to.as_deref().unwrap_or("direct"),
            )
        } else {
            ("cli", "direct")
        };

        let mut msg = InboundMessage::new(
            "system",
            "cron",
            &format!("{}:{}", channel, to),
            &job.payload.message,
        );
        if !job.payload.deliver {
            msg.metadata.insert("suppress_reply".into(), "true".into());
        }
        self.bus.publish_inbound(msg)
    }

    /// Run due jobs and return how long to sleep until the next one.
    async fn tick(&self) -> Duration {
        let now = now_ms();
        let mut store = self.store.lock().await;
        let mut dirty = false;

        let mut remaining = Vec::with_capacity(store.jobs.len());
        for mut job in store.jobs.drain(..) {
            let due = job.enabled
                && job
                    .state
                    .next_run_at_ms
                    .is_some_and(|next| next <= now);
            if due {
                debug!(job = %job.name, id = %job.id, "Cron job due");
                let status = match self.fire(&job) {
                    Ok(()) => "ok",
                    Err(e) => {
                        error!(job = %job.name, error = %e, "Cron job failed to publish");
                        "error"
                    }
                };
                job.state.last_run_at_ms = Some(now);
                job.state.last_status = Some(status.to_string());
                job.state.next_run_at_ms = next_run_ms(&job.schedule, now);
                dirty = true;

                if job.delete_after_run || job.state.next_run_at_ms.is_none() {
                    info!(job = %job.name, id = %job.id, "Cron job finished, removing");
                    continue;
                }
            }
            remaining.push(job);
        }
        store.jobs = remaining;

        if dirty {
            if let Err(e) = self.persist(&store).await {
                error!(error = %e, "Failed to persist cron store");
            }
        }

        let next = store
            .jobs
            .iter()
            .filter(|j| j.enabled)
            .filter_map(|j| j.state.next_run_at_ms)
            .min();

        match next {
            Some(next) => Duration::from_millis((next - now_ms()).max(250) as u64),
            // Nothing scheduled; sleep until poked.
            None => Duration::from_secs(3600),
        }
    }

    /// Run the scheduler until the process exits. Sleeps are interrupted
    /// whenever the job set changes.
    pub async fn run(&self) {
        info!("Cron scheduler started");
        let mut wake_rx = self.wake_tx.subscribe();
        loop {
            let sleep_for = self.tick().await;
            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {}
                _ = wake_rx.changed() => {
                    debug!("Cron scheduler woken by job change");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn service(temp: &TempDir) -> (CronService, Arc<MessageBus>) {
        let bus = Arc::new(MessageBus::new());
        let service = CronService::new(temp.path().join("jobs.json"), Arc::clone(&bus));
        (service, bus)
    }

    #[tokio::test]
    async fn test_add_list_remove() {
        let temp = TempDir::new().unwrap();
        let (service, _bus) = service(&temp);

        let job = service
            .add_job(
                "standup",
                Schedule::Every { every_ms: 60_000 },
                Payload {
                    message: "time for standup".into(),
                    ..Default::default()
                },
                false,
            )
            .await
            .unwrap();

        let jobs = service.list_jobs().await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].name, "standup");
        assert!(jobs[0].state.next_run_at_ms.is_some());

        assert!(service.remove_job(&job.id).await.unwrap());
        assert!(service.list_jobs().await.is_empty());
        assert!(!service.remove_job("nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_store_persists_across_instances() {
        let temp = TempDir::new().unwrap();
        {
            let (service, _bus) = service(&temp);
            service
                .add_job(
                    "daily",
                    Schedule::Cron {
                        expr: "0 9 * * *".into(),
                    },
                    Payload::default(),
                    false,
                )
                .await
                .unwrap();
        }

        let (service, _bus) = service(&temp);
        let jobs = service.list_jobs().await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].name, "daily");
    }

    #[tokio::test]
    async fn test_past_one_shot_rejected() {
        let temp = TempDir::new().unwrap();
        let (service, _bus) = service(&temp);

        let err = service
            .add_job(
                "too-late",
                Schedule::At {
                    at_ms: now_ms() - 1000,
                },
                Payload::default(),
                true,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FemtoError::Validation(_)));
    }

    #[tokio::test]
    async fn test_due_job_publishes_system_event() {
        let temp = TempDir::new().unwrap();
        let (service, bus) = service(&temp);

        service
            .add_job(
                "soon",
                Schedule::At {
                    at_ms: now_ms() + 50,
                },
                Payload {
                    message: "wake up".into(),
                    deliver: true,
                    channel: Some("telegram".into()),
                    to: Some("chat42".into()),
                },
                true,
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;
        service.tick().await;

        let msg = bus.consume_inbound().await.unwrap();
        assert_eq!(msg.channel, "system");
        assert_eq!(msg.sender_id, "cron");
        assert_eq!(msg.chat_id, "telegram:chat42");
        assert_eq!(msg.content, "wake up");

        // One-shot job is gone after firing.
        assert!(service.list_jobs().await.is_empty());
    }

    #[tokio::test]
    async fn test_recurring_job_reschedules() {
        let temp = TempDir::new().unwrap();
        let (service, bus) = service(&temp);

        service
            .add_job(
                "ticker",
                Schedule::Every { every_ms: 100_000 },
                Payload {
                    message: "tick".into(),
                    ..Default::default()
                },
                false,
            )
            .await
            .unwrap();

        // Force the job due.
        {
            let mut store = service.store.lock().await;
            store.jobs[0].state.next_run_at_ms = Some(now_ms() - 1);
        }
        service.tick().await;

        let msg = bus.consume_inbound().await.unwrap();
        assert_eq!(msg.content, "tick");
        // Suppressed replies are marked for the agent loop.
        assert_eq!(msg.metadata.get("suppress_reply").map(String::as_str), Some("true"));

        let jobs = service.list_jobs().await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].state.last_status.as_deref(), Some("ok"));
        assert!(jobs[0].state.next_run_at_ms.unwrap() > now_ms());
    }

    #[test]
    fn test_next_run_cron_expression() {
        let next = next_run_ms(
            &Schedule::Cron {
                expr: "0 9 * * *".into(),
            },
            now_ms(),
        );
        assert!(next.is_some());
        assert!(next.unwrap() > now_ms());
    }

    #[test]
    fn test_next_run_invalid_cron() {
        assert!(next_run_ms(
            &Schedule::Cron {
                expr: "not a cron".into()
            },
            now_ms()
        )
        .is_none());
    }
}
