use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{CoordinatorId, InstitutionFormId, InstitutionId},
    error::RequestError,
    form::DynamicForm,
    request::RequestStatus,
};

/// One institution's approval unit on a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstitutionForm {
    pub id: InstitutionFormId,
    pub institution_id: InstitutionId,
    pub coordinator_id: CoordinatorId,
    pub form: DynamicForm,
    pub status: RequestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl InstitutionForm {
    pub fn new(
        institution_id: InstitutionId,
        coordinator_id: CoordinatorId,
        form: DynamicForm,
    ) -> Self {
        Self {
            id: InstitutionFormId::new(),
            institution_id,
            coordinator_id,
            form,
            status: RequestStatus::Submitted,
            deleted_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }

    pub fn is_approved(&self) -> bool {
        self.status == RequestStatus::Approved
    }

    pub fn approve(&mut self) {
        self.status = RequestStatus::Approved;
    }

    pub fn undo_approve(&mut self) -> Result<(), RequestError> {
        if !self.is_approved() {
            return Err(RequestError::RequestNotApproved);
        }
        self.status = RequestStatus::Submitted;
        Ok(())
    }

    pub fn remove(&mut self, now: DateTime<Utc>) {
        self.deleted_at.get_or_insert(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form() -> InstitutionForm {
        InstitutionForm::new(
            InstitutionId::new(),
            CoordinatorId::new(),
            DynamicForm::default(),
        )
    }

    #[test]
    fn starts_submitted_and_approves_unconditionally() {
        let mut form = form();
        assert_eq!(form.status, RequestStatus::Submitted);
        form.approve();
        form.approve();
        assert!(form.is_approved());
    }

    #[test]
    fn undo_requires_prior_approval() {
        let mut form = form();
        assert_eq!(form.undo_approve(), Err(RequestError::RequestNotApproved));

        form.approve();
        form.undo_approve().expect("undo");
        assert_eq!(form.status, RequestStatus::Submitted);
    }

    #[test]
    fn remove_keeps_first_deletion_timestamp() {
        let mut form = form();
        let first = Utc::now();
        form.remove(first);
        form.remove(first + chrono::Duration::seconds(30));
        assert_eq!(form.deleted_at, Some(first));
        assert!(!form.is_active());
    }
}
