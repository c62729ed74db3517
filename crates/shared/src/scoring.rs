use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{RequestId, Scorer, ScoringId},
    form::DynamicForm,
};

/// A reviewer's score sheet on a TA request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scoring {
    pub id: ScoringId,
    pub scorer: Scorer,
    pub request_id: RequestId,
    pub form: DynamicForm,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Scoring {
    pub fn new(request_id: RequestId, scorer: Scorer, form: DynamicForm) -> Self {
        Self {
            id: ScoringId::for_scorer(request_id, scorer.id),
            scorer,
            request_id,
            form,
            deleted_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }

    pub fn remove(&mut self, now: DateTime<Utc>) {
        self.deleted_at.get_or_insert(now);
    }
}
