use shared::{
    domain::{CallId, RequestId},
    error::{ApiError, ErrorCode, FormError, RequestError},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlowError {
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error("call {0} not found")]
    CallNotFound(CallId),
    #[error("{0} is not supported for this request type")]
    UnsupportedCommand(&'static str),
    #[error("request {0} was modified concurrently, reload and retry")]
    ConcurrentModification(RequestId),
    #[error("storage interaction failed: {0}")]
    Storage(anyhow::Error),
    #[error("resource registration failed: {0}")]
    Registrar(anyhow::Error),
    #[error("allocation lookup failed: {0}")]
    Allocation(anyhow::Error),
    #[error("export failed: {0}")]
    Export(anyhow::Error),
}

impl From<FormError> for FlowError {
    fn from(value: FormError) -> Self {
        FlowError::Request(value.into())
    }
}

impl FlowError {
    pub fn name(&self) -> &'static str {
        match self {
            FlowError::Request(err) => err.name(),
            FlowError::CallNotFound(_) => "CallNotFound",
            FlowError::UnsupportedCommand(_) => "UnsupportedCommand",
            FlowError::ConcurrentModification(_) => "ConcurrentModification",
            FlowError::Storage(_) => "StorageFailure",
            FlowError::Registrar(_) => "RegistrarFailure",
            FlowError::Allocation(_) => "AllocationFailure",
            FlowError::Export(_) => "ExportFailure",
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            FlowError::Request(err) => err.code(),
            FlowError::CallNotFound(_) => ErrorCode::NotFound,
            FlowError::UnsupportedCommand(_) => ErrorCode::Validation,
            FlowError::ConcurrentModification(_) => ErrorCode::Conflict,
            FlowError::Storage(_)
            | FlowError::Registrar(_)
            | FlowError::Allocation(_)
            | FlowError::Export(_) => ErrorCode::Internal,
        }
    }

    pub fn is_internal(&self) -> bool {
        self.code() == ErrorCode::Internal
    }
}

impl From<FlowError> for ApiError {
    fn from(value: FlowError) -> Self {
        ApiError::new(value.code(), value.name(), value.to_string())
    }
}

pub(crate) fn storage(err: anyhow::Error) -> FlowError {
    FlowError::Storage(err)
}

pub(crate) fn allocation(err: anyhow::Error) -> FlowError {
    FlowError::Allocation(err)
}
