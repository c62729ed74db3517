use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use flows::{Export, Exporter, RequestFinder};
use serde::Serialize;
use shared::{
    domain::{Call, CallType, RequestId},
    field::FieldId,
    form::FieldValue,
    request::{RequestCore, TaRequest, VaRequest},
};

use crate::{id_column, Storage};

/// Field institutions use to leave remarks on a request.
const COMMENTS_FIELD: &str = "comments";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverviewRow {
    pub request_id: RequestId,
    pub status: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    pub institutions: usize,
    pub approved: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scorings: Option<usize>,
}

/// Renders call overviews as JSON and institution comments as plain text.
#[derive(Clone)]
pub struct JsonExporter {
    storage: Storage,
}

impl JsonExporter {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    async fn request_ids(&self, call: &Call) -> Result<Vec<RequestId>> {
        let rows = sqlx::query(
            "SELECT id FROM requests
             WHERE call_id = ? AND deleted_at IS NULL
             ORDER BY created_at, id",
        )
        .bind(call.id.to_string())
        .fetch_all(self.storage.pool())
        .await?;
        rows.iter().map(|row| id_column(row, "id")).collect()
    }

    async fn overview_for(&self, call: &Call, request_id: RequestId) -> Result<Option<OverviewRow>> {
        let row = match call.call_type {
            CallType::Ta => {
                let request = RequestFinder::<TaRequest>::find(&self.storage, request_id).await?;
                request.map(|r| {
                    let mut row = overview_row(&r.core);
                    row.country = r.country.map(|c| c.name);
                    row.scorings = Some(r.scorings.values().filter(|s| s.is_active()).count());
                    row
                })
            }
            CallType::Va => {
                let request = RequestFinder::<VaRequest>::find(&self.storage, request_id).await?;
                request.map(|r| overview_row(&r.core))
            }
        };
        Ok(row)
    }

    async fn core(&self, call: &Call, request_id: RequestId) -> Result<Option<RequestCore>> {
        Ok(match call.call_type {
            CallType::Ta => RequestFinder::<TaRequest>::find(&self.storage, request_id)
                .await?
                .map(|r| r.core),
            CallType::Va => RequestFinder::<VaRequest>::find(&self.storage, request_id)
                .await?
                .map(|r| r.core),
        })
    }
}

fn overview_row(core: &RequestCore) -> OverviewRow {
    OverviewRow {
        request_id: core.id,
        status: core.status.as_str().to_string(),
        created_at: core.created_at,
        country: None,
        institutions: core.active_institutions().count(),
        approved: core.active_institutions().filter(|f| f.is_approved()).count(),
        scorings: None,
    }
}

fn comment_text(value: Option<&FieldValue>) -> Option<String> {
    match value? {
        FieldValue::Text(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        FieldValue::List(items) if !items.is_empty() => Some(items.join("\n")),
        _ => None,
    }
}

#[async_trait]
impl Exporter for JsonExporter {
    async fn overview(&self, call: &Call) -> Result<Export> {
        let ids = self.request_ids(call).await?;
        let rows: Vec<OverviewRow> =
            try_join_all(ids.into_iter().map(|id| self.overview_for(call, id)))
                .await?
                .into_iter()
                .flatten()
                .collect();
        Ok(Export {
            file_name: format!("{}-overview.json", call.call_type.as_str()),
            content_type: "application/json".into(),
            bytes: serde_json::to_vec_pretty(&rows)?,
        })
    }

    async fn comments(&self, call: &Call, request_id: RequestId) -> Result<Export> {
        let core = self
            .core(call, request_id)
            .await?
            .ok_or_else(|| anyhow!("request {request_id} not found"))?;

        let field = FieldId::new(COMMENTS_FIELD);
        let mut out = String::new();
        for form in core.active_institutions() {
            let Some(text) = comment_text(form.form.value(&field)) else {
                continue;
            };
            let name = self
                .storage
                .institution_name(form.institution_id)
                .await?
                .unwrap_or_else(|| form.institution_id.to_string());
            out.push_str(&format!("## {name}\n{text}\n\n"));
        }

        Ok(Export {
            file_name: format!("{request_id}-comments.txt"),
            content_type: "text/plain; charset=utf-8".into(),
            bytes: out.into_bytes(),
        })
    }
}
