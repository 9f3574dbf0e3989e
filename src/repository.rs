use async_trait::async_trait;
use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use thiserror::Error;
use tokio::task;

use crate::db::PgPool;
use crate::models::{ActChanges, LegislativeAct, NewLegislativeAct};
use crate::schema::legislacoes;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("database pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
    #[error("database task failed: {0}")]
    Task(#[from] task::JoinError),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// Storage operations over the `legislacoes` table.
///
/// Each call is a single statement (`upsert_by_code` is a lookup followed by
/// one write); nothing spans a transaction.
#[async_trait]
pub trait ActRepository: Send + Sync + 'static {
    async fn find_all(&self) -> RepositoryResult<Vec<LegislativeAct>>;

    async fn find_by_id(&self, id: i32) -> RepositoryResult<Option<LegislativeAct>>;

    async fn find_by_code(&self, code: &str) -> RepositoryResult<Option<LegislativeAct>>;

    async fn create(&self, act: NewLegislativeAct) -> RepositoryResult<LegislativeAct>;

    async fn update(&self, id: i32, changes: ActChanges)
        -> RepositoryResult<Option<LegislativeAct>>;

    /// Returns whether a row was removed.
    async fn delete(&self, id: i32) -> RepositoryResult<bool>;

    async fn find_by_year(&self, year: i32) -> RepositoryResult<Vec<LegislativeAct>>;

    async fn find_by_type(&self, act_type: &str) -> RepositoryResult<Vec<LegislativeAct>>;

    /// Overwrites every mapped column of the row sharing `act.code`, or
    /// inserts a new row when none exists.
    async fn upsert_by_code(
        &self,
        act: NewLegislativeAct,
    ) -> RepositoryResult<(LegislativeAct, UpsertOutcome)>;
}

#[derive(Clone)]
pub struct PgActRepository {
    pool: PgPool,
}

impl PgActRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn with_conn<F, T>(&self, f: F) -> RepositoryResult<T>
    where
        F: FnOnce(&mut PgConnection) -> QueryResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        task::spawn_blocking(move || -> RepositoryResult<T> {
            let mut conn = pool.get()?;
            Ok(f(&mut conn)?)
        })
        .await?
    }
}

fn find_by_code_query(conn: &mut PgConnection, code: &str) -> QueryResult<Option<LegislativeAct>> {
    legislacoes::table
        .filter(legislacoes::code.eq(code))
        .select(LegislativeAct::as_select())
        .first(conn)
        .optional()
}

#[async_trait]
impl ActRepository for PgActRepository {
    async fn find_all(&self) -> RepositoryResult<Vec<LegislativeAct>> {
        self.with_conn(|conn| {
            legislacoes::table
                .order(legislacoes::id.asc())
                .select(LegislativeAct::as_select())
                .load(conn)
        })
        .await
    }

    async fn find_by_id(&self, id: i32) -> RepositoryResult<Option<LegislativeAct>> {
        self.with_conn(move |conn| {
            legislacoes::table
                .find(id)
                .select(LegislativeAct::as_select())
                .first(conn)
                .optional()
        })
        .await
    }

    async fn find_by_code(&self, code: &str) -> RepositoryResult<Option<LegislativeAct>> {
        let code = code.to_string();
        self.with_conn(move |conn| find_by_code_query(conn, &code))
            .await
    }

    async fn create(&self, act: NewLegislativeAct) -> RepositoryResult<LegislativeAct> {
        self.with_conn(move |conn| {
            diesel::insert_into(legislacoes::table)
                .values(&act)
                .returning(LegislativeAct::as_returning())
                .get_result(conn)
        })
        .await
    }

    async fn update(
        &self,
        id: i32,
        changes: ActChanges,
    ) -> RepositoryResult<Option<LegislativeAct>> {
        self.with_conn(move |conn| {
            diesel::update(legislacoes::table.find(id))
                .set((&changes, legislacoes::updated_at.eq(Utc::now())))
                .returning(LegislativeAct::as_returning())
                .get_result(conn)
                .optional()
        })
        .await
    }

    async fn delete(&self, id: i32) -> RepositoryResult<bool> {
        let deleted = self
            .with_conn(move |conn| diesel::delete(legislacoes::table.find(id)).execute(conn))
            .await?;
        Ok(deleted > 0)
    }

    async fn find_by_year(&self, year: i32) -> RepositoryResult<Vec<LegislativeAct>> {
        self.with_conn(move |conn| {
            legislacoes::table
                .filter(legislacoes::signing_year.eq(year))
                .order(legislacoes::id.asc())
                .select(LegislativeAct::as_select())
                .load(conn)
        })
        .await
    }

    async fn find_by_type(&self, act_type: &str) -> RepositoryResult<Vec<LegislativeAct>> {
        let act_type = act_type.to_string();
        self.with_conn(move |conn| {
            legislacoes::table
                .filter(legislacoes::act_type.eq(&act_type))
                .order(legislacoes::id.asc())
                .select(LegislativeAct::as_select())
                .load(conn)
        })
        .await
    }

    async fn upsert_by_code(
        &self,
        act: NewLegislativeAct,
    ) -> RepositoryResult<(LegislativeAct, UpsertOutcome)> {
        self.with_conn(move |conn| match find_by_code_query(conn, &act.code)? {
            Some(existing) => {
                let updated = diesel::update(legislacoes::table.find(existing.id))
                    .set((&act, legislacoes::updated_at.eq(Utc::now())))
                    .returning(LegislativeAct::as_returning())
                    .get_result(conn)?;
                Ok((updated, UpsertOutcome::Updated))
            }
            None => {
                let created = diesel::insert_into(legislacoes::table)
                    .values(&act)
                    .returning(LegislativeAct::as_returning())
                    .get_result(conn)?;
                Ok((created, UpsertOutcome::Created))
            }
        })
        .await
    }
}
