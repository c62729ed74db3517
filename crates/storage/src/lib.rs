use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flows::{
    CallFinder, CoordinatorAllocator, CoordinatorStore, InstitutionCountryAllocator,
    ScorerAllocator,
};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::domain::{
    Call, CallId, CallType, Coordinator, CoordinatorId, Country, InstitutionId, RequestId, Scorer,
    User, UserId,
};

mod export;
mod requests;

pub use export::{JsonExporter, OverviewRow};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn create_call(
        &self,
        name: &str,
        call_type: CallType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<CallId> {
        if end <= start {
            return Err(anyhow!("call '{name}' must end after it starts"));
        }
        let call_id = CallId::new();
        sqlx::query(
            "INSERT INTO calls (id, name, call_type, start_at, end_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(call_id.to_string())
        .bind(name)
        .bind(call_type.as_str())
        .bind(start)
        .bind(end)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to create call '{name}'"))?;
        Ok(call_id)
    }

    pub async fn delete_call(&self, call_id: CallId, now: DateTime<Utc>) -> Result<bool> {
        let result =
            sqlx::query("UPDATE calls SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL")
                .bind(now)
                .bind(call_id.to_string())
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn upsert_country(&self, code: &str, name: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO countries (code, name) VALUES (?, ?)
             ON CONFLICT(code) DO UPDATE SET name = excluded.name",
        )
        .bind(code)
        .bind(name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn create_institution(
        &self,
        name: &str,
        country_code: Option<&str>,
    ) -> Result<InstitutionId> {
        let institution_id = InstitutionId::new();
        sqlx::query("INSERT INTO institutions (id, name, country_code) VALUES (?, ?, ?)")
            .bind(institution_id.to_string())
            .bind(name)
            .bind(country_code)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to create institution '{name}'"))?;
        Ok(institution_id)
    }

    /// Makes `user` the coordinator of `institution_id` for requests of
    /// `call_type`. Existing institution forms keep their coordinator until
    /// they are reassigned.
    pub async fn assign_coordinator(
        &self,
        institution_id: InstitutionId,
        call_type: CallType,
        user: &User,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO coordinators (institution_id, call_type, user_id, name, email)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(institution_id, call_type) DO UPDATE SET
                user_id = excluded.user_id,
                name = excluded.name,
                email = excluded.email",
        )
        .bind(institution_id.to_string())
        .bind(call_type.as_str())
        .bind(user.id.to_string())
        .bind(&user.name)
        .bind(&user.email)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn add_scorer(&self, user: &User, country_code: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO scorers (user_id, country_code, name, email) VALUES (?, ?, ?, ?)
             ON CONFLICT(user_id, country_code) DO UPDATE SET
                name = excluded.name,
                email = excluded.email",
        )
        .bind(user.id.to_string())
        .bind(country_code)
        .bind(&user.name)
        .bind(&user.email)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

pub(crate) fn id_column<T>(row: &SqliteRow, column: &str) -> Result<T>
where
    T: FromStr<Err = uuid::Error>,
{
    let raw: String = row.try_get(column)?;
    T::from_str(&raw).with_context(|| format!("invalid id '{raw}' in column '{column}'"))
}

fn call_from_row(row: &SqliteRow) -> Result<Call> {
    let call_type: String = row.try_get("call_type")?;
    Ok(Call {
        id: id_column(row, "id")?,
        name: row.try_get("name")?,
        call_type: CallType::from_str(&call_type).map_err(|e| anyhow!(e))?,
        start: row.try_get("start_at")?,
        end: row.try_get("end_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[async_trait]
impl CallFinder for Storage {
    async fn find_call(&self, call_id: CallId) -> Result<Option<Call>> {
        let row = sqlx::query(
            "SELECT id, name, call_type, start_at, end_at, deleted_at FROM calls WHERE id = ?",
        )
        .bind(call_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(call_from_row).transpose()
    }

    async fn find_call_for_request(&self, request_id: RequestId) -> Result<Option<Call>> {
        let row = sqlx::query(
            "SELECT c.id, c.name, c.call_type, c.start_at, c.end_at, c.deleted_at
             FROM calls c
             JOIN requests r ON r.call_id = c.id
             WHERE r.id = ?",
        )
        .bind(request_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(call_from_row).transpose()
    }
}

#[async_trait]
impl CoordinatorAllocator for Storage {
    async fn allocate(
        &self,
        institution_id: InstitutionId,
        call_type: CallType,
    ) -> Result<Option<Coordinator>> {
        let row = sqlx::query(
            "SELECT user_id, name, email FROM coordinators WHERE institution_id = ? AND call_type = ?",
        )
        .bind(institution_id.to_string())
        .bind(call_type.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| coordinator_from_row(&r)).transpose()
    }

    async fn find(&self, coordinator_id: CoordinatorId) -> Result<Option<Coordinator>> {
        let row = sqlx::query("SELECT user_id, name, email FROM coordinators WHERE user_id = ? LIMIT 1")
            .bind(coordinator_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| coordinator_from_row(&r)).transpose()
    }
}

fn coordinator_from_row(row: &SqliteRow) -> Result<Coordinator> {
    Ok(Coordinator {
        id: id_column(row, "user_id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
    })
}

#[async_trait]
impl CoordinatorStore for Storage {
    async fn update_coordinator(
        &self,
        coordinator_id: CoordinatorId,
        institution_id: InstitutionId,
        call_type: CallType,
    ) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE institution_forms SET coordinator_id = ?
             WHERE institution_id = ?
               AND coordinator_id <> ?
               AND request_id IN (SELECT id FROM requests WHERE kind = ?)",
        )
        .bind(coordinator_id.to_string())
        .bind(institution_id.to_string())
        .bind(coordinator_id.to_string())
        .bind(call_type.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ScorerAllocator for Storage {
    async fn find(&self, user_id: UserId, country_code: &str) -> Result<Option<Scorer>> {
        let row = sqlx::query(
            "SELECT user_id, name, email, country_code FROM scorers WHERE user_id = ? AND country_code = ?",
        )
        .bind(user_id.to_string())
        .bind(country_code)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| -> Result<Scorer> {
            Ok(Scorer {
                id: id_column(&r, "user_id")?,
                name: r.try_get("name")?,
                email: r.try_get("email")?,
                country_code: r.try_get("country_code")?,
            })
        })
        .transpose()
    }
}

#[async_trait]
impl InstitutionCountryAllocator for Storage {
    async fn allocate(&self, institution_id: InstitutionId) -> Result<Option<Country>> {
        let row = sqlx::query(
            "SELECT c.code, c.name FROM institutions i
             JOIN countries c ON c.code = i.country_code
             WHERE i.id = ?",
        )
        .bind(institution_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| -> Result<Country> {
            Ok(Country {
                code: r.try_get("code")?,
                name: r.try_get("name")?,
            })
        })
        .transpose()
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
