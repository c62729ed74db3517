use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    domain::{CallId, CoordinatorId, InstitutionId, RequestId, ScoringId},
    field::FieldId,
    form::FieldType,
    request::RequestStatus,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("field {0} is not declared on this form")]
    FieldNotFound(FieldId),
    #[error("field {field} expects a {expected:?} value, got {actual:?}")]
    FieldTypeMismatch {
        field: FieldId,
        expected: FieldType,
        actual: FieldType,
    },
    #[error("cannot parse field address '{0}'")]
    ParseFieldFailed(String),
    #[error("unsupported field value: {0}")]
    UnsupportedType(String),
}

impl FormError {
    pub fn name(&self) -> &'static str {
        match self {
            FormError::FieldNotFound(_) => "FieldNotFound",
            FormError::FieldTypeMismatch { .. } => "FieldTypeMismatch",
            FormError::ParseFieldFailed(_) => "ParseFieldFailed",
            FormError::UnsupportedType(_) => "UnsupportedType",
        }
    }
}

/// Violated preconditions of the request lifecycle. Each variant names
/// exactly one guard.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error(transparent)]
    Form(#[from] FormError),
    #[error("request {0} not found")]
    CallRequestNotFound(RequestId),
    #[error("request {0} already exists")]
    CallRequestAlreadyAdded(RequestId),
    #[error("call {0} is not open for requests")]
    CallClosedForRequest(CallId),
    #[error("institution {0} is already part of the request")]
    InstitutionAlreadyAdded(InstitutionId),
    #[error("institution {0} is not part of the request")]
    InstitutionNotAdded(InstitutionId),
    #[error("no institution of the request is associated with coordinator {0}")]
    CantFindAssociatedInstitute(CoordinatorId),
    #[error("institution {0} has no coordinator for this call type")]
    CantFindAssociatedCoordinator(InstitutionId),
    #[error("institution {0} has no configured country")]
    CantFindInstitutionCountry(InstitutionId),
    #[error("request institutions are in {expected}, institution is in {actual}")]
    IncorrectInstitutionCountry { expected: String, actual: String },
    #[error("request cannot be submitted from status {0:?}")]
    UnableToSendRequest(RequestStatus),
    #[error("request has no institutions")]
    NoInstitutionAdded,
    #[error("request in status {0:?} cannot be closed")]
    AttemptToCloseUnapprovedRequest(RequestStatus),
    #[error("request in status {0:?} is not awaiting approval")]
    AttemptToApproveNotSubmittedRequest(RequestStatus),
    #[error("request in status {0:?} cannot be deleted")]
    UnableToDeleteRequest(RequestStatus),
    #[error("request is not approved")]
    RequestNotApproved,
    #[error("score form {0} is not part of the request")]
    ScoreFormNotAdded(ScoringId),
    #[error("user cannot score this request")]
    UserCantScoreRequest,
}

impl RequestError {
    pub fn name(&self) -> &'static str {
        match self {
            RequestError::Form(err) => err.name(),
            RequestError::CallRequestNotFound(_) => "CallRequestNotFound",
            RequestError::CallRequestAlreadyAdded(_) => "CallRequestAlreadyAdded",
            RequestError::CallClosedForRequest(_) => "CallClosedForRequest",
            RequestError::InstitutionAlreadyAdded(_) => "InstitutionAlreadyAdded",
            RequestError::InstitutionNotAdded(_) => "InstitutionNotAdded",
            RequestError::CantFindAssociatedInstitute(_) => "CantFindAssociatedInstitute",
            RequestError::CantFindAssociatedCoordinator(_) => "CantFindAssociatedCoordinator",
            RequestError::CantFindInstitutionCountry(_) => "CantFindInstitutionCountry",
            RequestError::IncorrectInstitutionCountry { .. } => "IncorrectInstitutionCountry",
            RequestError::UnableToSendRequest(_) => "UnableToSendRequest",
            RequestError::NoInstitutionAdded => "NoInstitutionAdded",
            RequestError::AttemptToCloseUnapprovedRequest(_) => "AttemptToCloseUnapprovedRequest",
            RequestError::AttemptToApproveNotSubmittedRequest(_) => {
                "AttemptToApproveNotSubmittedRequest"
            }
            RequestError::UnableToDeleteRequest(_) => "UnableToDeleteRequest",
            RequestError::RequestNotApproved => "RequestNotApproved",
            RequestError::ScoreFormNotAdded(_) => "ScoreFormNotAdded",
            RequestError::UserCantScoreRequest => "UserCantScoreRequest",
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            RequestError::CallRequestNotFound(_)
            | RequestError::InstitutionNotAdded(_)
            | RequestError::ScoreFormNotAdded(_) => ErrorCode::NotFound,
            RequestError::CallRequestAlreadyAdded(_) | RequestError::InstitutionAlreadyAdded(_) => {
                ErrorCode::Conflict
            }
            RequestError::CantFindAssociatedInstitute(_) | RequestError::UserCantScoreRequest => {
                ErrorCode::Forbidden
            }
            _ => ErrorCode::Validation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthorized,
    Forbidden,
    NotFound,
    Validation,
    Conflict,
    Internal,
}

/// Error body returned across the command boundary. `error` carries the
/// stable name of the violated rule, `message` a readable description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub error: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            error: error.into(),
            message: message.into(),
        }
    }
}

impl From<RequestError> for ApiError {
    fn from(value: RequestError) -> Self {
        Self::new(value.code(), value.name(), value.to_string())
    }
}

impl From<FormError> for ApiError {
    fn from(value: FormError) -> Self {
        RequestError::from(value).into()
    }
}
