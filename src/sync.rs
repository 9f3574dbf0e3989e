//! Fetch, map and upsert batches of acts from the Senado API.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Datelike, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::DEFAULT_CRON_TIMEZONE;
use crate::mapper::{map_document, MappingError};
use crate::repository::{ActRepository, RepositoryError, UpsertOutcome};
use crate::senado::{ExternalDocument, FetchError, LegislationSource, ListParams};

pub const RECENT_YEARS: i32 = 3;
pub const DEFAULT_YEAR_PAUSE: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Storage(#[from] RepositoryError),
    #[error("a synchronization run is already in progress")]
    AlreadyRunning,
}

pub type SyncResult<T> = Result<T, SyncError>;

/// Counters for one batch. `total` counts every document the API returned,
/// including the ones that were skipped or failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub total: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum YearOutcome {
    Synced {
        year: i32,
        #[serde(flatten)]
        summary: SyncSummary,
    },
    Failed {
        year: i32,
        error: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecentSyncReport {
    pub years: Vec<YearOutcome>,
}

impl RecentSyncReport {
    pub fn failed_years(&self) -> Vec<i32> {
        self.years
            .iter()
            .filter_map(|outcome| match outcome {
                YearOutcome::Failed { year, .. } => Some(*year),
                YearOutcome::Synced { .. } => None,
            })
            .collect()
    }
}

#[derive(Debug, Error)]
enum DocumentError {
    #[error(transparent)]
    Mapping(#[from] MappingError),
    #[error(transparent)]
    Storage(#[from] RepositoryError),
}

enum DocumentOutcome {
    Stored(UpsertOutcome),
    Skipped,
}

pub struct SyncService {
    source: Arc<dyn LegislationSource>,
    repository: Arc<dyn ActRepository>,
    timezone: Tz,
    year_pause: Duration,
    in_flight: Mutex<()>,
}

impl SyncService {
    pub fn new(source: Arc<dyn LegislationSource>, repository: Arc<dyn ActRepository>) -> Self {
        Self {
            source,
            repository,
            timezone: DEFAULT_CRON_TIMEZONE,
            year_pause: DEFAULT_YEAR_PAUSE,
            in_flight: Mutex::new(()),
        }
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn with_year_pause(mut self, year_pause: Duration) -> Self {
        self.year_pause = year_pause;
        self
    }

    pub fn current_year(&self) -> i32 {
        Utc::now().with_timezone(&self.timezone).year()
    }

    pub async fn sync_year(&self, year: i32) -> SyncResult<SyncSummary> {
        info!(year, "fetching legislation for year");
        let documents = self
            .fetch(ListParams::year(year))
            .await
            .inspect_err(|err| error!(year, error = %err, "failed to fetch legislation for year"))?;
        let summary = self.process(documents).await;
        info!(
            year,
            total = summary.total,
            created = summary.created,
            updated = summary.updated,
            skipped = summary.skipped,
            failed = summary.failed,
            "year synchronized"
        );
        Ok(summary)
    }

    pub async fn sync_type(&self, act_type: &str, year: Option<i32>) -> SyncResult<SyncSummary> {
        info!(act_type, ?year, "fetching legislation for type");
        let documents = self
            .fetch(ListParams::act_type(act_type, year))
            .await
            .inspect_err(|err| {
                error!(act_type, ?year, error = %err, "failed to fetch legislation for type")
            })?;
        let summary = self.process(documents).await;
        info!(
            act_type,
            ?year,
            total = summary.total,
            created = summary.created,
            updated = summary.updated,
            skipped = summary.skipped,
            failed = summary.failed,
            "type synchronized"
        );
        Ok(summary)
    }

    /// Synchronizes the current year and the two before it, in that order.
    /// A failing year is logged and recorded; the loop moves on.
    pub async fn sync_recent_years(&self) -> RecentSyncReport {
        let current = self.current_year();
        let years: Vec<i32> = (0..RECENT_YEARS).map(|offset| current - offset).collect();
        self.sync_years(&years).await
    }

    pub async fn sync_years(&self, years: &[i32]) -> RecentSyncReport {
        let mut report = RecentSyncReport::default();
        for (index, &year) in years.iter().enumerate() {
            let outcome = match self.sync_year(year).await {
                Ok(summary) => YearOutcome::Synced { year, summary },
                Err(err) => {
                    error!(year, error = %err, "failed to synchronize year");
                    YearOutcome::Failed {
                        year,
                        error: err.to_string(),
                    }
                }
            };
            report.years.push(outcome);

            if index + 1 < years.len() && !self.year_pause.is_zero() {
                sleep(self.year_pause).await;
            }
        }
        report
    }

    /// Runs [`Self::sync_recent_years`] unless another exclusive run holds the
    /// guard, in which case [`SyncError::AlreadyRunning`] is returned.
    pub async fn run_recent_exclusive(&self) -> SyncResult<RecentSyncReport> {
        let _guard = self.try_begin()?;
        let started = Instant::now();
        let report = self.sync_recent_years().await;
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            failed_years = ?report.failed_years(),
            "recent years synchronization finished"
        );
        Ok(report)
    }

    pub async fn run_type_exclusive(
        &self,
        act_type: &str,
        year: Option<i32>,
    ) -> SyncResult<SyncSummary> {
        let _guard = self.try_begin()?;
        self.sync_type(act_type, year).await
    }

    pub async fn run_year_exclusive(&self, year: i32) -> SyncResult<SyncSummary> {
        let _guard = self.try_begin()?;
        self.sync_year(year).await
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.try_lock().is_err()
    }

    fn try_begin(&self) -> SyncResult<MutexGuard<'_, ()>> {
        self.in_flight
            .try_lock()
            .map_err(|_| SyncError::AlreadyRunning)
    }

    async fn fetch(&self, params: ListParams) -> SyncResult<Vec<ExternalDocument>> {
        let documents = self.source.fetch_list(&params).await?.into_documents();
        if documents.is_empty() {
            info!(%params, "no documents found");
        } else {
            info!(%params, count = documents.len(), "processing documents");
        }
        Ok(documents)
    }

    async fn process(&self, documents: Vec<ExternalDocument>) -> SyncSummary {
        let mut summary = SyncSummary {
            total: documents.len(),
            ..SyncSummary::default()
        };

        for doc in &documents {
            match self.store_document(doc).await {
                Ok(DocumentOutcome::Stored(UpsertOutcome::Created)) => summary.created += 1,
                Ok(DocumentOutcome::Stored(UpsertOutcome::Updated)) => summary.updated += 1,
                Ok(DocumentOutcome::Skipped) => summary.skipped += 1,
                Err(err) => {
                    warn!(document_id = ?doc.id, code = ?doc.norma, error = %err, "failed to process document");
                    summary.failed += 1;
                }
            }
        }

        summary
    }

    async fn store_document(
        &self,
        doc: &ExternalDocument,
    ) -> Result<DocumentOutcome, DocumentError> {
        let mapped = map_document(doc);
        if let Some(field) = mapped.missing_identity_field() {
            info!(document_id = ?doc.id, field, "document skipped: missing required field");
            return Ok(DocumentOutcome::Skipped);
        }

        let act = mapped.into_new_act()?;
        let (_, outcome) = self.repository.upsert_by_code(act).await?;
        Ok(DocumentOutcome::Stored(outcome))
    }
}
