//! Transnational access flow.

use std::sync::Arc;

use chrono::Utc;
use shared::{
    domain::{CallType, InstitutionId, RequestId, User},
    error::RequestError,
    form::DynamicForm,
    protocol::Command,
    request::TaRequest,
    schema::FormSchemas,
};
use tracing::info;

use crate::{
    collaborators::{InstitutionCountryAllocator, RequestFinder, RequestStore, ScorerAllocator},
    common::{apply_core, open_request, Repository},
    error::{allocation, FlowError},
    notify::notify_coordinators,
    Collaborators,
};

pub struct TaFlow {
    common: Collaborators,
    requests: Repository<TaRequest>,
    countries: Arc<dyn InstitutionCountryAllocator>,
    scorers: Arc<dyn ScorerAllocator>,
    schemas: FormSchemas,
}

impl TaFlow {
    pub fn new(
        common: Collaborators,
        finder: Arc<dyn RequestFinder<TaRequest>>,
        store: Arc<dyn RequestStore<TaRequest>>,
        countries: Arc<dyn InstitutionCountryAllocator>,
        scorers: Arc<dyn ScorerAllocator>,
        schemas: FormSchemas,
    ) -> Self {
        Self {
            common,
            requests: Repository::new(finder, store),
            countries,
            scorers,
            schemas,
        }
    }

    pub async fn handle(
        &self,
        request_id: RequestId,
        user: &User,
        command: Command,
    ) -> Result<TaRequest, FlowError> {
        if let Command::CreateRequest { call_id } = command {
            let core = open_request(
                &self.common,
                request_id,
                user,
                call_id,
                CallType::Ta,
                &self.schemas.general,
            )
            .await?;
            let request = TaRequest::new(core);
            self.requests.add(&request).await?;
            info!(%request_id, %call_id, author_id = %user.id, "ta request created");
            return Ok(request);
        }

        let mut request = self.requests.load(request_id).await?;
        let now = Utc::now();
        let notice = match command {
            Command::AddInstitutionForm { institution_id } => {
                self.add_institution(&mut request, institution_id).await?;
                None
            }
            Command::DeleteInstitutionForm { institution_id } => {
                let coordinator_id = request.remove_institution(institution_id, now)?;
                info!(%request_id, %institution_id, %coordinator_id, "institution removed from request");
                None
            }
            Command::CreateScore => {
                self.create_score(&mut request, user).await?;
                None
            }
            Command::Score { scoring_id, fields } => {
                if let Some(scoring) = request.scoring(scoring_id) {
                    if scoring.scorer.id != user.id {
                        return Err(RequestError::UserCantScoreRequest.into());
                    }
                }
                request.score(scoring_id, fields)?;
                None
            }
            Command::DeleteScore { scoring_id } => {
                request.delete_score(scoring_id, now);
                info!(%request_id, %scoring_id, "score form removed");
                None
            }
            other => apply_core(&mut request.core, user, other, now)?,
        };

        self.requests.save(&mut request).await?;
        if let Some(notice) = notice {
            notify_coordinators(
                self.common.coordinators.as_ref(),
                self.common.mailer.as_ref(),
                &request.core,
                notice,
            )
            .await;
        }
        Ok(request)
    }

    async fn add_institution(
        &self,
        request: &mut TaRequest,
        institution_id: InstitutionId,
    ) -> Result<(), FlowError> {
        request.core.ensure_institution_absent(institution_id)?;
        let country = self
            .countries
            .allocate(institution_id)
            .await
            .map_err(allocation)?
            .ok_or(RequestError::CantFindInstitutionCountry(institution_id))?;
        let coordinator = self
            .common
            .coordinators
            .allocate(institution_id, CallType::Ta)
            .await
            .map_err(allocation)?
            .ok_or(RequestError::CantFindAssociatedCoordinator(institution_id))?;

        request.add_institution(
            institution_id,
            country,
            coordinator.id,
            DynamicForm::from_schema(&self.schemas.institution),
        )?;
        info!(
            request_id = %request.core.id,
            %institution_id,
            coordinator_id = %coordinator.id,
            "institution added to request"
        );
        Ok(())
    }

    /// The calling user becomes a scorer when they qualify for the request's
    /// country.
    async fn create_score(&self, request: &mut TaRequest, user: &User) -> Result<(), FlowError> {
        request.ensure_scorable()?;
        let Some(country) = request.country.clone() else {
            return Err(RequestError::UserCantScoreRequest.into());
        };
        let scorer = self
            .scorers
            .find(user.id, &country.code)
            .await
            .map_err(allocation)?
            .ok_or(RequestError::UserCantScoreRequest)?;

        let scoring_id =
            request.create_score(scorer, DynamicForm::from_schema(&self.schemas.scoring))?;
        info!(request_id = %request.core.id, %scoring_id, scorer_id = %user.id, "score form allocated");
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/ta_tests.rs"]
mod tests;
