//! Virtual access flow: no country constraint and no scoring.

use std::sync::Arc;

use chrono::Utc;
use shared::{
    domain::{CallType, InstitutionId, RequestId, User},
    error::RequestError,
    form::DynamicForm,
    protocol::Command,
    request::VaRequest,
    schema::FormSchemas,
};
use tracing::info;

use crate::{
    collaborators::{RequestFinder, RequestStore},
    common::{apply_core, open_request, Repository},
    error::{allocation, FlowError},
    notify::notify_coordinators,
    Collaborators,
};

pub struct VaFlow {
    common: Collaborators,
    requests: Repository<VaRequest>,
    schemas: FormSchemas,
}

impl VaFlow {
    pub fn new(
        common: Collaborators,
        finder: Arc<dyn RequestFinder<VaRequest>>,
        store: Arc<dyn RequestStore<VaRequest>>,
        schemas: FormSchemas,
    ) -> Self {
        Self {
            common,
            requests: Repository::new(finder, store),
            schemas,
        }
    }

    pub async fn handle(
        &self,
        request_id: RequestId,
        user: &User,
        command: Command,
    ) -> Result<VaRequest, FlowError> {
        if let Command::CreateRequest { call_id } = command {
            let core = open_request(
                &self.common,
                request_id,
                user,
                call_id,
                CallType::Va,
                &self.schemas.general,
            )
            .await?;
            let request = VaRequest::new(core);
            self.requests.add(&request).await?;
            info!(%request_id, %call_id, author_id = %user.id, "va request created");
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
        request: &mut VaRequest,
        institution_id: InstitutionId,
    ) -> Result<(), FlowError> {
        request.core.ensure_institution_absent(institution_id)?;
        let coordinator = self
            .common
            .coordinators
            .allocate(institution_id, CallType::Va)
            .await
            .map_err(allocation)?
            .ok_or(RequestError::CantFindAssociatedCoordinator(institution_id))?;

        request.add_institution(
            institution_id,
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
}

#[cfg(test)]
#[path = "tests/va_tests.rs"]
mod tests;
