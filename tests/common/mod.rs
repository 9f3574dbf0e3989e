use std::collections::HashSet;
use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request};
use axum::Router;
use chrono::Utc;
use http_body_util::BodyExt;
use once_cell::sync::Lazy;
use reqwest::StatusCode as UpstreamStatus;
use senado_sync::config::{AppConfig, DEFAULT_CRON_SCHEDULE, DEFAULT_CRON_TIMEZONE};
use senado_sync::db::{self, PgPool};
use senado_sync::models::{ActChanges, LegislativeAct, NewLegislativeAct};
use senado_sync::repository::{ActRepository, RepositoryError, RepositoryResult, UpsertOutcome};
use senado_sync::routes;
use senado_sync::scheduler::Scheduler;
use senado_sync::senado::{ApiResponse, FetchError, FetchResult, LegislationSource, ListParams};
use senado_sync::state::AppState;
use senado_sync::sync::SyncService;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tower::util::ServiceExt;

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

fn injected_failure() -> RepositoryError {
    RepositoryError::Database(diesel::result::Error::QueryBuilderError(
        "injected failure".into(),
    ))
}

/// In-memory stand-in for the `legislacoes` table.
#[derive(Default)]
pub struct FakeRepository {
    rows: Mutex<Vec<LegislativeAct>>,
    next_id: Mutex<i32>,
    failing_codes: Mutex<HashSet<String>>,
    fail_reads: Mutex<bool>,
}

impl FakeRepository {
    #[allow(dead_code)]
    pub async fn fail_upserts_for(&self, code: &str) {
        self.failing_codes.lock().await.insert(code.to_string());
    }

    #[allow(dead_code)]
    pub async fn fail_reads(&self) {
        *self.fail_reads.lock().await = true;
    }

    #[allow(dead_code)]
    pub async fn count(&self) -> usize {
        self.rows.lock().await.len()
    }

    async fn check_reads(&self) -> RepositoryResult<()> {
        if *self.fail_reads.lock().await {
            return Err(injected_failure());
        }
        Ok(())
    }

    async fn insert(&self, act: NewLegislativeAct) -> LegislativeAct {
        let mut next_id = self.next_id.lock().await;
        *next_id += 1;
        let now = Utc::now();
        let row = LegislativeAct {
            id: *next_id,
            code: act.code,
            act_type: act.act_type,
            number: act.number,
            norm_name: act.norm_name,
            description: act.description,
            summary: act.summary,
            signing_date: act.signing_date,
            signing_year: act.signing_year,
            alias: act.alias,
            created_at: now,
            updated_at: now,
        };
        self.rows.lock().await.push(row.clone());
        row
    }
}

fn apply(row: &mut LegislativeAct, changes: ActChanges) {
    if let Some(code) = changes.code {
        row.code = code;
    }
    if let Some(act_type) = changes.act_type {
        row.act_type = act_type;
    }
    if let Some(number) = changes.number {
        row.number = number;
    }
    if let Some(norm_name) = changes.norm_name {
        row.norm_name = norm_name;
    }
    if let Some(description) = changes.description {
        row.description = description;
    }
    if let Some(summary) = changes.summary {
        row.summary = summary;
    }
    if let Some(signing_date) = changes.signing_date {
        row.signing_date = signing_date;
    }
    if let Some(signing_year) = changes.signing_year {
        row.signing_year = signing_year;
    }
    if let Some(alias) = changes.alias {
        row.alias = alias;
    }
    row.updated_at = Utc::now();
}

#[async_trait]
impl ActRepository for FakeRepository {
    async fn find_all(&self) -> RepositoryResult<Vec<LegislativeAct>> {
        self.check_reads().await?;
        Ok(self.rows.lock().await.clone())
    }

    async fn find_by_id(&self, id: i32) -> RepositoryResult<Option<LegislativeAct>> {
        self.check_reads().await?;
        let rows = self.rows.lock().await;
        Ok(rows.iter().find(|row| row.id == id).cloned())
    }

    async fn find_by_code(&self, code: &str) -> RepositoryResult<Option<LegislativeAct>> {
        self.check_reads().await?;
        let rows = self.rows.lock().await;
        Ok(rows.iter().find(|row| row.code == code).cloned())
    }

    async fn create(&self, act: NewLegislativeAct) -> RepositoryResult<LegislativeAct> {
        Ok(self.insert(act).await)
    }

    async fn update(
        &self,
        id: i32,
        changes: ActChanges,
    ) -> RepositoryResult<Option<LegislativeAct>> {
        let mut rows = self.rows.lock().await;
        Ok(rows.iter_mut().find(|row| row.id == id).map(|row| {
            apply(row, changes);
            row.clone()
        }))
    }

    async fn delete(&self, id: i32) -> RepositoryResult<bool> {
        let mut rows = self.rows.lock().await;
        let before = rows.len();
        rows.retain(|row| row.id != id);
        Ok(rows.len() < before)
    }

    async fn find_by_year(&self, year: i32) -> RepositoryResult<Vec<LegislativeAct>> {
        self.check_reads().await?;
        let rows = self.rows.lock().await;
        Ok(rows
            .iter()
            .filter(|row| row.signing_year == Some(year))
            .cloned()
            .collect())
    }

    async fn find_by_type(&self, act_type: &str) -> RepositoryResult<Vec<LegislativeAct>> {
        self.check_reads().await?;
        let rows = self.rows.lock().await;
        Ok(rows
            .iter()
            .filter(|row| row.act_type == act_type)
            .cloned()
            .collect())
    }

    async fn upsert_by_code(
        &self,
        act: NewLegislativeAct,
    ) -> RepositoryResult<(LegislativeAct, UpsertOutcome)> {
        if self.failing_codes.lock().await.contains(&act.code) {
            return Err(injected_failure());
        }
        let existing_id = {
            let rows = self.rows.lock().await;
            rows.iter().find(|row| row.code == act.code).map(|row| row.id)
        };
        match existing_id {
            Some(id) => {
                let updated = self
                    .update(id, ActChanges::from(act))
                    .await?
                    .ok_or_else(injected_failure)?;
                Ok((updated, UpsertOutcome::Updated))
            }
            None => Ok((self.insert(act).await, UpsertOutcome::Created)),
        }
    }
}

enum Canned {
    Documents(Value),
    Unavailable,
}

/// Serves canned list responses keyed by the exact filter set.
#[derive(Default)]
pub struct FakeSource {
    responses: Mutex<Vec<(ListParams, Canned)>>,
    calls: Mutex<Vec<ListParams>>,
    delay: Mutex<Option<Duration>>,
}

impl FakeSource {
    /// `documents` is the value of `ListaDocumento.documentos.documento`.
    #[allow(dead_code)]
    pub async fn respond(&self, params: ListParams, documents: Value) {
        let mut responses = self.responses.lock().await;
        responses.retain(|(existing, _)| existing != &params);
        responses.push((params, Canned::Documents(documents)));
    }

    #[allow(dead_code)]
    pub async fn fail(&self, params: ListParams) {
        let mut responses = self.responses.lock().await;
        responses.retain(|(existing, _)| existing != &params);
        responses.push((params, Canned::Unavailable));
    }

    #[allow(dead_code)]
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.lock().await = Some(delay);
    }

    #[allow(dead_code)]
    pub async fn calls(&self) -> Vec<ListParams> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl LegislationSource for FakeSource {
    async fn fetch_list(&self, params: &ListParams) -> FetchResult<ApiResponse> {
        self.calls.lock().await.push(params.clone());
        let delay = *self.delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let responses = self.responses.lock().await;
        match responses.iter().find(|(existing, _)| existing == params) {
            Some((_, Canned::Documents(documents))) => {
                let envelope = serde_json::json!({
                    "ListaDocumento": { "documentos": { "documento": documents } }
                });
                Ok(serde_json::from_value(envelope).expect("canned response must decode"))
            }
            Some((_, Canned::Unavailable)) => Err(FetchError::Status {
                endpoint: "/legislacao/lista.json".to_string(),
                status: UpstreamStatus::SERVICE_UNAVAILABLE,
            }),
            None => Ok(ApiResponse::default()),
        }
    }
}

#[allow(dead_code)]
pub fn document(code: &str, act_type: &str, number: &str, date: &str, year: &str) -> Value {
    serde_json::json!({
        "id": format!("doc-{code}"),
        "norma": code,
        "tipo": act_type,
        "numero": number,
        "normaNome": format!("{act_type} {number}"),
        "descricao": format!("Descrição de {code}"),
        "ementa": format!("Ementa de {code}"),
        "dataassinatura": date,
        "anoassinatura": year,
    })
}

#[allow(dead_code)]
pub fn sync_service(source: Arc<FakeSource>, repository: Arc<FakeRepository>) -> SyncService {
    SyncService::new(source, repository).with_year_pause(Duration::ZERO)
}

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://localhost/unused".to_string(),
        database_max_pool_size: db::DEFAULT_MAX_POOL_SIZE,
        server_host: "127.0.0.1".to_string(),
        server_port: 0,
        senado_api_base_url: "http://127.0.0.1:9".to_string(),
        senado_api_timeout: Duration::from_secs(5),
        senado_api_min_interval: Duration::ZERO,
        cron_schedule: DEFAULT_CRON_SCHEDULE.to_string(),
        cron_timezone: DEFAULT_CRON_TIMEZONE,
        sync_year_pause: Duration::ZERO,
        cors_allowed_origin: None,
    }
}

pub struct TestApp {
    #[allow(dead_code)]
    pub state: AppState,
    pub source: Arc<FakeSource>,
    pub repository: Arc<FakeRepository>,
    pub scheduler: Arc<Scheduler>,
    router: Router,
}

impl TestApp {
    pub async fn new() -> Result<Self> {
        let config = test_config();
        let source = Arc::new(FakeSource::default());
        let repository = Arc::new(FakeRepository::default());
        let sync = Arc::new(sync_service(source.clone(), repository.clone()));
        let scheduler = Arc::new(
            Scheduler::new(sync, config.cron_timezone)
                .await
                .map_err(|err| anyhow!("failed to start scheduler: {err}"))?,
        );
        scheduler
            .start_daily_job(&config.cron_schedule)
            .await
            .map_err(|err| anyhow!("failed to schedule daily job: {err}"))?;

        let repository_for_state: Arc<dyn ActRepository> = repository.clone();
        let state = AppState::new(config, repository_for_state, scheduler.clone());
        let router = routes::create_router(state.clone())?;

        Ok(Self {
            state,
            source,
            repository,
            scheduler,
            router,
        })
    }

    pub async fn get(&self, path: &str) -> Result<hyper::Response<Body>> {
        self.send(Method::GET, path, Body::empty(), None).await
    }

    #[allow(dead_code)]
    pub async fn post(&self, path: &str) -> Result<hyper::Response<Body>> {
        self.send(Method::POST, path, Body::empty(), None).await
    }

    #[allow(dead_code)]
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        self.send(
            Method::POST,
            path,
            Body::from(body),
            Some("application/json"),
        )
        .await
    }

    #[allow(dead_code)]
    pub async fn delete(&self, path: &str) -> Result<hyper::Response<Body>> {
        self.send(Method::DELETE, path, Body::empty(), None).await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Body,
        content_type: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(content_type) = content_type {
            builder = builder.header("content-type", content_type);
        }
        let request = builder.body(body)?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

#[allow(dead_code)]
pub async fn body_json(response: hyper::Response<Body>) -> Result<Value> {
    let body = body_to_vec(response.into_body()).await?;
    serde_json::from_slice(&body).context("response body is not JSON")
}

#[allow(dead_code)]
pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

/// Pool for the Postgres-backed tests, or `None` when `TEST_DATABASE_URL`
/// is not set.
#[allow(dead_code)]
pub async fn test_pool() -> Result<Option<PgPool>> {
    let Ok(database_url) = env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set; skipping database test");
        return Ok(None);
    };
    let pool = db::init_pool(&database_url)?;
    db::run_migrations(&pool).await?;
    truncate(&pool).await?;
    Ok(Some(pool))
}

#[allow(dead_code)]
pub async fn truncate(pool: &PgPool) -> Result<()> {
    use diesel::connection::SimpleConnection;

    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut conn = pool
            .get()
            .map_err(|err| anyhow!("failed to acquire connection: {err}"))?;
        conn.batch_execute("TRUNCATE TABLE legislacoes RESTART IDENTITY;")
            .context("failed to truncate tables")?;
        Ok(())
    })
    .await
    .context("truncate task panicked")?
}
