//! Named cron jobs driving the sync service.
//!
//! Each registered job keeps its schedule and desired state. Stopping a job
//! removes it from the cron backend but keeps the entry, so it can be started
//! again and is still reported by [`Scheduler::list_jobs`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono_tz::Tz;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::sync::{RecentSyncReport, SyncError, SyncService};

pub const DAILY_JOB_NAME: &str = "daily-sync";

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("scheduler backend error: {0}")]
    Backend(String),
    #[error("invalid schedule `{schedule}`: {reason}")]
    InvalidSchedule { schedule: String, reason: String },
    #[error(transparent)]
    Sync(#[from] SyncError),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobKind {
    RecentYears,
    ActType(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesiredState {
    Running,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobStatus {
    pub name: String,
    pub schedule: String,
    pub active: bool,
}

struct ScheduledJob {
    kind: JobKind,
    schedule: String,
    backend_id: Option<Uuid>,
    desired: DesiredState,
}

pub struct Scheduler {
    backend: JobScheduler,
    sync: Arc<SyncService>,
    timezone: Tz,
    jobs: Mutex<BTreeMap<String, ScheduledJob>>,
}

pub fn type_job_name(act_type: &str) -> String {
    format!("sync-{act_type}")
}

/// Accepts classic five-field expressions by prepending a zero seconds field.
pub fn normalize_schedule(schedule: &str) -> String {
    let fields: Vec<&str> = schedule.split_whitespace().collect();
    if fields.len() == 5 {
        format!("0 {}", fields.join(" "))
    } else {
        fields.join(" ")
    }
}

impl Scheduler {
    pub async fn new(sync: Arc<SyncService>, timezone: Tz) -> SchedulerResult<Self> {
        let backend = JobScheduler::new()
            .await
            .map_err(|err| SchedulerError::Backend(format!("{err:?}")))?;
        backend
            .start()
            .await
            .map_err(|err| SchedulerError::Backend(format!("{err:?}")))?;
        Ok(Self {
            backend,
            sync,
            timezone,
            jobs: Mutex::new(BTreeMap::new()),
        })
    }

    pub fn sync(&self) -> Arc<SyncService> {
        self.sync.clone()
    }

    /// Registers the recent-years job under [`DAILY_JOB_NAME`].
    pub async fn start_daily_job(&self, schedule: &str) -> SchedulerResult<()> {
        info!(schedule, timezone = %self.timezone, "configuring daily sync job");
        self.register(DAILY_JOB_NAME.to_string(), JobKind::RecentYears, schedule)
            .await
    }

    /// Registers or replaces the `sync-<type>` job, which syncs the given
    /// type for the current year on every tick. All jobs share the sync
    /// service's single-flight guard, so a type job firing at the same time
    /// as the daily job is skipped on every such tick.
    pub async fn configure_type_job(&self, act_type: &str, schedule: &str) -> SchedulerResult<()> {
        info!(act_type, schedule, "configuring type sync job");
        self.register(
            type_job_name(act_type),
            JobKind::ActType(act_type.to_string()),
            schedule,
        )
        .await
    }

    /// Runs the recent-years sync now and waits for it to finish.
    pub async fn run_manual(&self) -> SchedulerResult<RecentSyncReport> {
        info!("manual synchronization requested");
        let started = Instant::now();
        let report = self
            .sync
            .run_recent_exclusive()
            .await
            .inspect_err(|err| error!(error = %err, "manual synchronization failed"))?;
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "manual synchronization finished"
        );
        Ok(report)
    }

    pub async fn stop_all(&self) {
        let mut jobs = self.jobs.lock().await;
        for (name, job) in jobs.iter_mut() {
            if let Some(id) = job.backend_id.take() {
                if let Err(err) = self.backend.remove(&id).await {
                    warn!(job = %name, error = ?err, "failed to remove job from scheduler");
                }
            }
            job.desired = DesiredState::Stopped;
            info!(job = %name, "job stopped");
        }
    }

    pub async fn start_all(&self) -> SchedulerResult<()> {
        let mut jobs = self.jobs.lock().await;
        for (name, job) in jobs.iter_mut() {
            if job.backend_id.is_none() {
                let id = self.schedule_job(&job.kind, &job.schedule).await?;
                job.backend_id = Some(id);
            }
            job.desired = DesiredState::Running;
            info!(job = %name, "job started");
        }
        Ok(())
    }

    pub async fn list_jobs(&self) -> Vec<JobStatus> {
        let jobs = self.jobs.lock().await;
        jobs.iter()
            .map(|(name, job)| JobStatus {
                name: name.clone(),
                schedule: job.schedule.clone(),
                active: job.desired == DesiredState::Running && job.backend_id.is_some(),
            })
            .collect()
    }

    pub async fn shutdown(&self) {
        self.stop_all().await;
        let mut backend = self.backend.clone();
        if let Err(err) = backend.shutdown().await {
            warn!(error = ?err, "scheduler shutdown reported an error");
        }
    }

    async fn register(&self, name: String, kind: JobKind, schedule: &str) -> SchedulerResult<()> {
        let schedule = normalize_schedule(schedule);
        let mut jobs = self.jobs.lock().await;

        // Build the replacement first so an invalid schedule leaves the old job running.
        let id = self.schedule_job(&kind, &schedule).await?;
        if let Some(previous) = jobs.remove(&name) {
            if let Some(previous_id) = previous.backend_id {
                if let Err(err) = self.backend.remove(&previous_id).await {
                    warn!(job = %name, error = ?err, "failed to remove replaced job");
                }
            }
        }

        jobs.insert(
            name.clone(),
            ScheduledJob {
                kind,
                schedule: schedule.clone(),
                backend_id: Some(id),
                desired: DesiredState::Running,
            },
        );
        info!(job = %name, %schedule, "job scheduled");
        Ok(())
    }

    async fn schedule_job(&self, kind: &JobKind, schedule: &str) -> SchedulerResult<Uuid> {
        let job = match kind {
            JobKind::RecentYears => {
                let sync = self.sync.clone();
                Job::new_async_tz(schedule, self.timezone, move |_uuid, _lock| {
                    let sync = sync.clone();
                    Box::pin(async move { run_recent_tick(sync).await })
                })
            }
            JobKind::ActType(act_type) => {
                let sync = self.sync.clone();
                let act_type = act_type.clone();
                Job::new_async_tz(schedule, self.timezone, move |_uuid, _lock| {
                    let sync = sync.clone();
                    let act_type = act_type.clone();
                    Box::pin(async move { run_type_tick(sync, act_type).await })
                })
            }
        }
        .map_err(|err| SchedulerError::InvalidSchedule {
            schedule: schedule.to_string(),
            reason: format!("{err:?}"),
        })?;

        self.backend
            .add(job)
            .await
            .map_err(|err| SchedulerError::Backend(format!("{err:?}")))
    }
}

/// Timer body for the daily job. Never propagates: failures are logged so the
/// job keeps firing on later ticks.
async fn run_recent_tick(sync: Arc<SyncService>) {
    info!("scheduled synchronization starting");
    let started = Instant::now();
    match sync.run_recent_exclusive().await {
        Ok(report) => info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            failed_years = ?report.failed_years(),
            "scheduled synchronization finished"
        ),
        Err(SyncError::AlreadyRunning) => {
            warn!("scheduled synchronization skipped: another run is in progress")
        }
        Err(err) => error!(error = %err, "scheduled synchronization failed"),
    }
}

async fn run_type_tick(sync: Arc<SyncService>, act_type: String) {
    let year = sync.current_year();
    info!(act_type = %act_type, year, "scheduled type synchronization starting");
    match sync.run_type_exclusive(&act_type, Some(year)).await {
        Ok(summary) => info!(
            act_type = %act_type,
            total = summary.total,
            created = summary.created,
            updated = summary.updated,
            "scheduled type synchronization finished"
        ),
        Err(SyncError::AlreadyRunning) => warn!(
            act_type = %act_type,
            "scheduled type synchronization skipped: another run is in progress"
        ),
        Err(err) => error!(act_type = %act_type, error = %err, "scheduled type synchronization failed"),
    }
}
