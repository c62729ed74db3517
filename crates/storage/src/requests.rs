//! Request aggregates as rows: the request itself, its institution forms and,
//! for TA requests, its scorings. Forms are stored as JSON documents.

use std::{collections::BTreeMap, str::FromStr};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use flows::{Insertion, RequestFinder, RequestStore, Save};
use shared::{
    domain::{CallType, Country, InstitutionId, RequestId, ResourceRef, Scorer, ScoringId},
    form::DynamicForm,
    institution::InstitutionForm,
    request::{RequestCore, RequestStatus, TaRequest, VaRequest},
    scoring::Scoring,
};
use sqlx::{sqlite::SqliteRow, Row, Sqlite, Transaction};

use crate::{id_column, Storage};

fn form_column(row: &SqliteRow, column: &str) -> Result<DynamicForm> {
    let raw: String = row.try_get(column)?;
    serde_json::from_str(&raw).with_context(|| format!("corrupt form in column '{column}'"))
}

fn status_column(row: &SqliteRow) -> Result<RequestStatus> {
    let raw: String = row.try_get("status")?;
    RequestStatus::from_str(&raw).map_err(|e| anyhow!(e))
}

fn country_columns(row: &SqliteRow) -> Result<Option<Country>> {
    let code: Option<String> = row.try_get("country_code")?;
    let name: Option<String> = row.try_get("country_name")?;
    Ok(code.zip(name).map(|(code, name)| Country { code, name }))
}

impl Storage {
    async fn load_core(
        &self,
        kind: CallType,
        request_id: RequestId,
    ) -> Result<Option<(RequestCore, Option<Country>)>> {
        let Some(row) = sqlx::query(
            "SELECT id, call_id, author_id, created_at, status, form, country_code, country_name,
                    resource, deleted_at, version
             FROM requests WHERE id = ? AND kind = ?",
        )
        .bind(request_id.to_string())
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let version: i64 = row.try_get("version")?;
        let resource: Option<String> = row.try_get("resource")?;
        let mut core = RequestCore {
            id: id_column(&row, "id")?,
            call_id: id_column(&row, "call_id")?,
            author_id: id_column(&row, "author_id")?,
            created_at: row.try_get("created_at")?,
            status: status_column(&row)?,
            form: form_column(&row, "form")?,
            institutions: BTreeMap::new(),
            deleted_at: row.try_get("deleted_at")?,
            resource: resource.map(ResourceRef),
            version: u64::try_from(version).context("negative request version")?,
        };
        let country = country_columns(&row)?;

        let rows = sqlx::query(
            "SELECT id, institution_id, coordinator_id, form, status, deleted_at
             FROM institution_forms WHERE request_id = ?",
        )
        .bind(request_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        for row in rows {
            let form = InstitutionForm {
                id: id_column(&row, "id")?,
                institution_id: id_column(&row, "institution_id")?,
                coordinator_id: id_column(&row, "coordinator_id")?,
                form: form_column(&row, "form")?,
                status: status_column(&row)?,
                deleted_at: row.try_get("deleted_at")?,
            };
            core.institutions.insert(form.institution_id, form);
        }

        Ok(Some((core, country)))
    }

    async fn load_scorings(&self, request_id: RequestId) -> Result<BTreeMap<ScoringId, Scoring>> {
        let rows = sqlx::query(
            "SELECT id, scorer_id, scorer_name, scorer_email, scorer_country, form, deleted_at
             FROM scorings WHERE request_id = ?",
        )
        .bind(request_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut scorings = BTreeMap::new();
        for row in rows {
            let scoring = Scoring {
                id: id_column(&row, "id")?,
                scorer: Scorer {
                    id: id_column(&row, "scorer_id")?,
                    name: row.try_get("scorer_name")?,
                    email: row.try_get("scorer_email")?,
                    country_code: row.try_get("scorer_country")?,
                },
                request_id,
                form: form_column(&row, "form")?,
                deleted_at: row.try_get("deleted_at")?,
            };
            scorings.insert(scoring.id, scoring);
        }
        Ok(scorings)
    }

    async fn insert_core(
        &self,
        kind: CallType,
        core: &RequestCore,
        country: Option<&Country>,
    ) -> Result<Insertion> {
        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            "INSERT INTO requests
                (id, call_id, kind, author_id, created_at, status, form,
                 country_code, country_name, resource, deleted_at, version)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(core.id.to_string())
        .bind(core.call_id.to_string())
        .bind(kind.as_str())
        .bind(core.author_id.to_string())
        .bind(core.created_at)
        .bind(core.status.as_str())
        .bind(serde_json::to_string(&core.form)?)
        .bind(country.map(|c| c.code.as_str()))
        .bind(country.map(|c| c.name.as_str()))
        .bind(core.resource.as_ref().map(|r| r.0.as_str()))
        .bind(core.deleted_at)
        .bind(version_column(core.version)?)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                return Ok(Insertion::Duplicate)
            }
            Err(err) => return Err(err.into()),
        }

        write_institution_forms(&mut tx, core).await?;
        tx.commit().await?;
        Ok(Insertion::Inserted)
    }

    /// Opens a transaction and claims the next version of the request row.
    /// Returns `None` when another writer got there first.
    async fn begin_versioned_update(
        &self,
        kind: CallType,
        core: &RequestCore,
        country: Option<&Country>,
    ) -> Result<Option<Transaction<'static, Sqlite>>> {
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            "UPDATE requests SET
                status = ?, form = ?, country_code = ?, country_name = ?,
                resource = ?, deleted_at = ?, version = version + 1
             WHERE id = ? AND kind = ? AND version = ?",
        )
        .bind(core.status.as_str())
        .bind(serde_json::to_string(&core.form)?)
        .bind(country.map(|c| c.code.as_str()))
        .bind(country.map(|c| c.name.as_str()))
        .bind(core.resource.as_ref().map(|r| r.0.as_str()))
        .bind(core.deleted_at)
        .bind(core.id.to_string())
        .bind(kind.as_str())
        .bind(version_column(core.version)?)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Ok(None);
        }
        write_institution_forms(&mut tx, core).await?;
        Ok(Some(tx))
    }

    pub async fn institution_name(&self, institution_id: InstitutionId) -> Result<Option<String>> {
        let name = sqlx::query_scalar("SELECT name FROM institutions WHERE id = ?")
            .bind(institution_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(name)
    }
}

fn version_column(version: u64) -> Result<i64> {
    i64::try_from(version).context("request version overflow")
}

async fn write_institution_forms(
    tx: &mut Transaction<'static, Sqlite>,
    core: &RequestCore,
) -> Result<()> {
    for form in core.institutions.values() {
        sqlx::query(
            "INSERT INTO institution_forms
                (id, request_id, institution_id, coordinator_id, form, status, deleted_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                coordinator_id = excluded.coordinator_id,
                form = excluded.form,
                status = excluded.status,
                deleted_at = excluded.deleted_at",
        )
        .bind(form.id.to_string())
        .bind(core.id.to_string())
        .bind(form.institution_id.to_string())
        .bind(form.coordinator_id.to_string())
        .bind(serde_json::to_string(&form.form)?)
        .bind(form.status.as_str())
        .bind(form.deleted_at)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn write_scorings(tx: &mut Transaction<'static, Sqlite>, request: &TaRequest) -> Result<()> {
    for scoring in request.scorings.values() {
        sqlx::query(
            "INSERT INTO scorings
                (id, request_id, scorer_id, scorer_name, scorer_email, scorer_country, form, deleted_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                form = excluded.form,
                deleted_at = excluded.deleted_at",
        )
        .bind(scoring.id.to_string())
        .bind(request.core.id.to_string())
        .bind(scoring.scorer.id.to_string())
        .bind(&scoring.scorer.name)
        .bind(&scoring.scorer.email)
        .bind(&scoring.scorer.country_code)
        .bind(serde_json::to_string(&scoring.form)?)
        .bind(scoring.deleted_at)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

#[async_trait]
impl RequestFinder<TaRequest> for Storage {
    async fn find(&self, request_id: RequestId) -> Result<Option<TaRequest>> {
        let Some((core, country)) = self.load_core(CallType::Ta, request_id).await? else {
            return Ok(None);
        };
        Ok(Some(TaRequest {
            core,
            country,
            scorings: self.load_scorings(request_id).await?,
        }))
    }
}

#[async_trait]
impl RequestStore<TaRequest> for Storage {
    async fn add(&self, request: &TaRequest) -> Result<Insertion> {
        self.insert_core(CallType::Ta, &request.core, request.country.as_ref())
            .await
    }

    async fn save(&self, request: &TaRequest) -> Result<Save> {
        let Some(mut tx) = self
            .begin_versioned_update(CallType::Ta, &request.core, request.country.as_ref())
            .await?
        else {
            return Ok(Save::Stale);
        };
        write_scorings(&mut tx, request).await?;
        tx.commit().await?;
        Ok(Save::Saved)
    }
}

#[async_trait]
impl RequestFinder<VaRequest> for Storage {
    async fn find(&self, request_id: RequestId) -> Result<Option<VaRequest>> {
        Ok(self
            .load_core(CallType::Va, request_id)
            .await?
            .map(|(core, _)| VaRequest::new(core)))
    }
}

#[async_trait]
impl RequestStore<VaRequest> for Storage {
    async fn add(&self, request: &VaRequest) -> Result<Insertion> {
        self.insert_core(CallType::Va, &request.core, None).await
    }

    async fn save(&self, request: &VaRequest) -> Result<Save> {
        let Some(tx) = self
            .begin_versioned_update(CallType::Va, &request.core, None)
            .await?
        else {
            return Ok(Save::Stale);
        };
        tx.commit().await?;
        Ok(Save::Saved)
    }
}
