//! Steps shared by the TA and VA flows: aggregate load and persist, request
//! creation, and the commands whose meaning does not depend on the variant.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use shared::{
    domain::{CallId, CallType, RequestId, User},
    error::RequestError,
    form::DynamicForm,
    protocol::Command,
    request::{RequestAggregate, RequestCore, RequestStatus},
    schema::FormSchema,
};
use tracing::info;

use crate::{
    collaborators::{Insertion, Registration, RequestFinder, RequestStore, Save},
    error::{storage, FlowError},
    notify::Notice,
    Collaborators,
};

pub(crate) struct Repository<R: Send + Sync> {
    finder: Arc<dyn RequestFinder<R>>,
    store: Arc<dyn RequestStore<R>>,
}

impl<R> Repository<R>
where
    R: RequestAggregate + Send + Sync,
{
    pub(crate) fn new(finder: Arc<dyn RequestFinder<R>>, store: Arc<dyn RequestStore<R>>) -> Self {
        Self { finder, store }
    }

    /// Deleted requests are kept as rows but are not addressable.
    pub(crate) async fn load(&self, request_id: RequestId) -> Result<R, FlowError> {
        self.finder
            .find(request_id)
            .await
            .map_err(storage)?
            .filter(|request| request.core().deleted_at.is_none())
            .ok_or(FlowError::Request(RequestError::CallRequestNotFound(
                request_id,
            )))
    }

    pub(crate) async fn add(&self, request: &R) -> Result<(), FlowError> {
        match self.store.add(request).await.map_err(storage)? {
            Insertion::Inserted => Ok(()),
            Insertion::Duplicate => Err(RequestError::CallRequestAlreadyAdded(request.id()).into()),
        }
    }

    pub(crate) async fn save(&self, request: &mut R) -> Result<(), FlowError> {
        match self.store.save(request).await.map_err(storage)? {
            Save::Saved => {
                request.core_mut().version += 1;
                Ok(())
            }
            Save::Stale => Err(FlowError::ConcurrentModification(request.id())),
        }
    }
}

/// Builds a fresh DRAFT request for an open call and registers its
/// authorization resource.
pub(crate) async fn open_request(
    common: &Collaborators,
    request_id: RequestId,
    user: &User,
    call_id: CallId,
    call_type: CallType,
    general: &FormSchema,
) -> Result<RequestCore, FlowError> {
    let now = Utc::now();
    let call = common
        .calls
        .find_call(call_id)
        .await
        .map_err(storage)?
        .ok_or(FlowError::CallNotFound(call_id))?;
    if call.call_type != call_type {
        return Err(FlowError::UnsupportedCommand("create_request"));
    }
    if !call.is_open_at(now) {
        return Err(RequestError::CallClosedForRequest(call_id).into());
    }

    let resource = match common
        .registrar
        .register(request_id, user)
        .await
        .map_err(FlowError::Registrar)?
    {
        Registration::Created(resource) => resource,
        Registration::AlreadyExists => {
            return Err(RequestError::CallRequestAlreadyAdded(request_id).into())
        }
    };

    Ok(RequestCore::new(
        request_id,
        call_id,
        user.id,
        DynamicForm::from_schema(general),
        Some(resource),
        now,
    ))
}

/// Applies a command that acts on the shared part of a request. Returns the
/// notification the new state calls for, if any.
pub(crate) fn apply_core(
    core: &mut RequestCore,
    user: &User,
    command: Command,
    now: DateTime<Utc>,
) -> Result<Option<Notice>, FlowError> {
    match command {
        Command::SetFieldValue {
            institution_id: None,
            field,
            value,
        } => core.set_field_value(field, value)?,
        Command::SetFieldValue {
            institution_id: Some(institution_id),
            field,
            value,
        } => core.set_institution_field_value(institution_id, field, value)?,
        Command::DeleteFieldGroup {
            institution_id: None,
            group,
        } => core.delete_field_group(&group),
        Command::DeleteFieldGroup {
            institution_id: Some(institution_id),
            group,
        } => core.delete_institution_field_group(institution_id, &group)?,
        Command::SubmitRequest => {
            core.submit()?;
            info!(request_id = %core.id, user_id = %user.id, "request submitted");
            return Ok(Some(Notice::Submitted));
        }
        Command::DeleteRequest => {
            core.delete(now)?;
            info!(request_id = %core.id, user_id = %user.id, "request deleted");
        }
        Command::CloseRequest => {
            core.close()?;
            info!(request_id = %core.id, user_id = %user.id, "request closed");
        }
        Command::ApproveRequest => {
            let status = core.approve_by_coordinator(user.id.into())?;
            info!(request_id = %core.id, coordinator_id = %user.id, status = status.as_str(), "request approved by coordinator");
            if status == RequestStatus::Approved {
                return Ok(Some(Notice::Approved));
            }
        }
        Command::UndoRequestApprove => {
            let status = core.undo_approve_by_coordinator(user.id.into())?;
            info!(request_id = %core.id, coordinator_id = %user.id, status = status.as_str(), "approval withdrawn by coordinator");
        }
        Command::WithdrawRequest => {
            core.withdraw();
            info!(request_id = %core.id, user_id = %user.id, "request withdrawn");
        }
        other => return Err(FlowError::UnsupportedCommand(other.name())),
    }
    Ok(None)
}
