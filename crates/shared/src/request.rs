//! Request aggregates and their status machine.
//!
//! `RequestCore` holds everything the TA and VA variants share: the general
//! form, the institution forms and the approval rules. Transitions check
//! their guard before touching state, so a returned error leaves the
//! aggregate unchanged.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{
        CallId, CoordinatorId, Country, InstitutionId, RequestId, ResourceRef, Scorer, ScoringId,
        UserId,
    },
    error::RequestError,
    field::{FieldId, GroupId},
    form::{DynamicForm, FieldUpdate, FieldValue},
    institution::InstitutionForm,
    scoring::Scoring,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Draft,
    Submitted,
    BeingHandled,
    Approved,
    Scoring,
    Closed,
    Withdrawn,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Draft => "DRAFT",
            RequestStatus::Submitted => "SUBMITTED",
            RequestStatus::BeingHandled => "BEING_HANDLED",
            RequestStatus::Approved => "APPROVED",
            RequestStatus::Scoring => "SCORING",
            RequestStatus::Closed => "CLOSED",
            RequestStatus::Withdrawn => "WITHDRAWN",
        }
    }
}

impl std::str::FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(RequestStatus::Draft),
            "SUBMITTED" => Ok(RequestStatus::Submitted),
            "BEING_HANDLED" => Ok(RequestStatus::BeingHandled),
            "APPROVED" => Ok(RequestStatus::Approved),
            "SCORING" => Ok(RequestStatus::Scoring),
            "CLOSED" => Ok(RequestStatus::Closed),
            "WITHDRAWN" => Ok(RequestStatus::Withdrawn),
            other => Err(format!("unknown request status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestCore {
    pub id: RequestId,
    pub call_id: CallId,
    pub author_id: UserId,
    pub created_at: DateTime<Utc>,
    pub status: RequestStatus,
    pub form: DynamicForm,
    pub institutions: BTreeMap<InstitutionId, InstitutionForm>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceRef>,
    /// Bumped by the store on every save; compared to detect lost updates.
    pub version: u64,
}

impl RequestCore {
    pub fn new(
        id: RequestId,
        call_id: CallId,
        author_id: UserId,
        form: DynamicForm,
        resource: Option<ResourceRef>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            call_id,
            author_id,
            created_at: now,
            status: RequestStatus::Draft,
            form,
            institutions: BTreeMap::new(),
            deleted_at: None,
            resource,
            version: 0,
        }
    }

    pub fn active_institutions(&self) -> impl Iterator<Item = &InstitutionForm> {
        self.institutions.values().filter(|form| form.is_active())
    }

    pub fn coordinators(&self) -> Vec<CoordinatorId> {
        let mut coordinators: Vec<CoordinatorId> = self
            .active_institutions()
            .map(|form| form.coordinator_id)
            .collect();
        coordinators.sort();
        coordinators.dedup();
        coordinators
    }

    pub fn ensure_institution_absent(&self, institution_id: InstitutionId) -> Result<(), RequestError> {
        if self.institutions.contains_key(&institution_id) {
            return Err(RequestError::InstitutionAlreadyAdded(institution_id));
        }
        Ok(())
    }

    /// Attaches an institution form. Removed forms stay keyed, so an
    /// institution can be attached to a request only once.
    pub fn add_institution(
        &mut self,
        institution_id: InstitutionId,
        coordinator_id: CoordinatorId,
        form: DynamicForm,
    ) -> Result<(), RequestError> {
        self.ensure_institution_absent(institution_id)?;
        self.institutions.insert(
            institution_id,
            InstitutionForm::new(institution_id, coordinator_id, form),
        );
        Ok(())
    }

    /// Soft-deletes the institution's form and hands back its coordinator.
    pub fn remove_institution(
        &mut self,
        institution_id: InstitutionId,
        now: DateTime<Utc>,
    ) -> Result<CoordinatorId, RequestError> {
        let form = self.active_institution_mut(institution_id)?;
        form.remove(now);
        Ok(form.coordinator_id)
    }

    pub fn set_field_value(
        &mut self,
        field: FieldId,
        value: Option<FieldValue>,
    ) -> Result<(), RequestError> {
        Ok(self.form.set_field_value(field, value)?)
    }

    pub fn set_institution_field_value(
        &mut self,
        institution_id: InstitutionId,
        field: FieldId,
        value: Option<FieldValue>,
    ) -> Result<(), RequestError> {
        let institution = self.active_institution_mut(institution_id)?;
        Ok(institution.form.set_field_value(field, value)?)
    }

    pub fn delete_field_group(&mut self, group: &GroupId) {
        self.form.delete_group(group);
    }

    pub fn delete_institution_field_group(
        &mut self,
        institution_id: InstitutionId,
        group: &GroupId,
    ) -> Result<(), RequestError> {
        self.active_institution_mut(institution_id)?
            .form
            .delete_group(group);
        Ok(())
    }

    pub fn submit(&mut self) -> Result<RequestStatus, RequestError> {
        if self.status != RequestStatus::Draft {
            return Err(RequestError::UnableToSendRequest(self.status));
        }
        if self.active_institutions().next().is_none() {
            return Err(RequestError::NoInstitutionAdded);
        }
        self.status = RequestStatus::Submitted;
        Ok(self.status)
    }

    pub fn approve_by_coordinator(
        &mut self,
        coordinator_id: CoordinatorId,
    ) -> Result<RequestStatus, RequestError> {
        if !matches!(
            self.status,
            RequestStatus::Submitted | RequestStatus::BeingHandled
        ) {
            return Err(RequestError::AttemptToApproveNotSubmittedRequest(
                self.status,
            ));
        }
        if !self.has_coordinator(coordinator_id) {
            return Err(RequestError::CantFindAssociatedInstitute(coordinator_id));
        }

        self.status = RequestStatus::BeingHandled;
        for form in self.forms_of_mut(coordinator_id) {
            form.approve();
        }
        if self.all_institutions_approved() {
            self.status = RequestStatus::Approved;
        }
        Ok(self.status)
    }

    pub fn undo_approve_by_coordinator(
        &mut self,
        coordinator_id: CoordinatorId,
    ) -> Result<RequestStatus, RequestError> {
        if !self.has_coordinator(coordinator_id) {
            return Err(RequestError::CantFindAssociatedInstitute(coordinator_id));
        }
        if !self
            .active_institutions()
            .any(|form| form.coordinator_id == coordinator_id && form.is_approved())
        {
            return Err(RequestError::RequestNotApproved);
        }

        for form in self.forms_of_mut(coordinator_id) {
            if form.is_approved() {
                form.undo_approve()?;
            }
        }
        self.status = if self.all_institutions_approved() {
            RequestStatus::Approved
        } else {
            RequestStatus::BeingHandled
        };
        Ok(self.status)
    }

    pub fn close(&mut self) -> Result<RequestStatus, RequestError> {
        if self.status != RequestStatus::Approved {
            return Err(RequestError::AttemptToCloseUnapprovedRequest(self.status));
        }
        self.status = RequestStatus::Closed;
        Ok(self.status)
    }

    pub fn delete(&mut self, now: DateTime<Utc>) -> Result<(), RequestError> {
        if self.status != RequestStatus::Draft {
            return Err(RequestError::UnableToDeleteRequest(self.status));
        }
        self.deleted_at.get_or_insert(now);
        Ok(())
    }

    pub fn withdraw(&mut self) -> RequestStatus {
        self.status = RequestStatus::Withdrawn;
        self.status
    }

    fn has_coordinator(&self, coordinator_id: CoordinatorId) -> bool {
        self.active_institutions()
            .any(|form| form.coordinator_id == coordinator_id)
    }

    fn forms_of_mut(
        &mut self,
        coordinator_id: CoordinatorId,
    ) -> impl Iterator<Item = &mut InstitutionForm> {
        self.institutions
            .values_mut()
            .filter(move |form| form.is_active() && form.coordinator_id == coordinator_id)
    }

    fn all_institutions_approved(&self) -> bool {
        self.active_institutions().all(InstitutionForm::is_approved)
    }

    fn active_institution_mut(
        &mut self,
        institution_id: InstitutionId,
    ) -> Result<&mut InstitutionForm, RequestError> {
        self.institutions
            .get_mut(&institution_id)
            .filter(|form| form.is_active())
            .ok_or(RequestError::InstitutionNotAdded(institution_id))
    }
}

/// Access to the shared part of a request variant.
pub trait RequestAggregate {
    fn core(&self) -> &RequestCore;
    fn core_mut(&mut self) -> &mut RequestCore;

    fn id(&self) -> RequestId {
        self.core().id
    }
}

/// Transnational access request: institutions share one country and an
/// approved request moves on to scoring.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaRequest {
    #[serde(flatten)]
    pub core: RequestCore,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<Country>,
    pub scorings: BTreeMap<ScoringId, Scoring>,
}

impl TaRequest {
    pub fn new(core: RequestCore) -> Self {
        Self {
            core,
            country: None,
            scorings: BTreeMap::new(),
        }
    }

    pub fn add_institution(
        &mut self,
        institution_id: InstitutionId,
        country: Country,
        coordinator_id: CoordinatorId,
        form: DynamicForm,
    ) -> Result<(), RequestError> {
        self.core.ensure_institution_absent(institution_id)?;
        if let Some(assigned) = &self.country {
            if assigned.code != country.code {
                return Err(RequestError::IncorrectInstitutionCountry {
                    expected: assigned.code.clone(),
                    actual: country.code,
                });
            }
        }
        self.core
            .add_institution(institution_id, coordinator_id, form)?;
        self.country.get_or_insert(country);
        Ok(())
    }

    pub fn remove_institution(
        &mut self,
        institution_id: InstitutionId,
        now: DateTime<Utc>,
    ) -> Result<CoordinatorId, RequestError> {
        let coordinator_id = self.core.remove_institution(institution_id, now)?;
        if self.core.active_institutions().next().is_none() {
            self.country = None;
        }
        Ok(coordinator_id)
    }

    pub fn ensure_scorable(&self) -> Result<(), RequestError> {
        match self.core.status {
            RequestStatus::Approved | RequestStatus::Scoring => Ok(()),
            _ => Err(RequestError::RequestNotApproved),
        }
    }

    /// Allocates a score sheet to `scorer`. Allocating the same scorer again
    /// returns the existing sheet's id.
    pub fn create_score(
        &mut self,
        scorer: Scorer,
        form: DynamicForm,
    ) -> Result<ScoringId, RequestError> {
        self.ensure_scorable()?;
        self.core.status = RequestStatus::Scoring;
        let request_id = self.core.id;
        let scoring = self
            .scorings
            .entry(ScoringId::for_scorer(request_id, scorer.id))
            .or_insert_with(|| Scoring::new(request_id, scorer, form));
        scoring.deleted_at = None;
        Ok(scoring.id)
    }

    /// Applies every update or none of them.
    pub fn score(
        &mut self,
        scoring_id: ScoringId,
        updates: Vec<FieldUpdate>,
    ) -> Result<(), RequestError> {
        if self.core.status != RequestStatus::Scoring {
            return Err(RequestError::RequestNotApproved);
        }
        let scoring = self
            .scorings
            .get_mut(&scoring_id)
            .filter(|scoring| scoring.is_active())
            .ok_or(RequestError::ScoreFormNotAdded(scoring_id))?;

        let mut form = scoring.form.clone();
        for update in updates {
            form.set_field_value(update.field, update.value)?;
        }
        scoring.form = form;
        Ok(())
    }

    pub fn delete_score(&mut self, scoring_id: ScoringId, now: DateTime<Utc>) {
        if let Some(scoring) = self.scorings.get_mut(&scoring_id) {
            scoring.remove(now);
        }
    }

    pub fn scoring(&self, scoring_id: ScoringId) -> Option<&Scoring> {
        self.scorings
            .get(&scoring_id)
            .filter(|scoring| scoring.is_active())
    }
}

impl RequestAggregate for TaRequest {
    fn core(&self) -> &RequestCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut RequestCore {
        &mut self.core
    }
}

/// Virtual access request: no country constraint, no scoring.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VaRequest {
    #[serde(flatten)]
    pub core: RequestCore,
}

impl VaRequest {
    pub fn new(core: RequestCore) -> Self {
        Self { core }
    }

    pub fn add_institution(
        &mut self,
        institution_id: InstitutionId,
        coordinator_id: CoordinatorId,
        form: DynamicForm,
    ) -> Result<(), RequestError> {
        self.core
            .add_institution(institution_id, coordinator_id, form)
    }

    pub fn remove_institution(
        &mut self,
        institution_id: InstitutionId,
        now: DateTime<Utc>,
    ) -> Result<CoordinatorId, RequestError> {
        self.core.remove_institution(institution_id, now)
    }
}

impl RequestAggregate for VaRequest {
    fn core(&self) -> &RequestCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut RequestCore {
        &mut self.core
    }
}

#[cfg(test)]
#[path = "tests/request_tests.rs"]
mod tests;
