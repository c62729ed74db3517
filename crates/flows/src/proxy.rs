use std::sync::Arc;

use serde::Serialize;
use shared::{
    domain::{Call, CallId, CallType, RequestId, User},
    error::RequestError,
    protocol::Command,
    request::{RequestCore, TaRequest, VaRequest},
};
use tracing::debug;

use crate::{
    collaborators::{CallFinder, Export, Exporter, MissingExporter},
    error::{storage, FlowError},
    ta::TaFlow,
    va::VaFlow,
};

/// A request of either variant, as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestView {
    Ta(TaRequest),
    Va(VaRequest),
}

impl RequestView {
    pub fn core(&self) -> &RequestCore {
        match self {
            RequestView::Ta(request) => &request.core,
            RequestView::Va(request) => &request.core,
        }
    }
}

/// Routes commands and exports to the flow matching the owning call's type.
pub struct FlowProxy {
    calls: Arc<dyn CallFinder>,
    ta: TaFlow,
    va: VaFlow,
    ta_exporter: Arc<dyn Exporter>,
    va_exporter: Arc<dyn Exporter>,
}

impl FlowProxy {
    pub fn new(calls: Arc<dyn CallFinder>, ta: TaFlow, va: VaFlow) -> Self {
        Self {
            calls,
            ta,
            va,
            ta_exporter: Arc::new(MissingExporter),
            va_exporter: Arc::new(MissingExporter),
        }
    }

    pub fn with_exporters(mut self, ta: Arc<dyn Exporter>, va: Arc<dyn Exporter>) -> Self {
        self.ta_exporter = ta;
        self.va_exporter = va;
        self
    }

    pub async fn handle(
        &self,
        request_id: RequestId,
        user: &User,
        command: Command,
    ) -> Result<RequestView, FlowError> {
        let call = match &command {
            Command::CreateRequest { call_id } => self.call(*call_id).await?,
            _ => self.call_for_request(request_id).await?,
        };
        debug!(%request_id, call_id = %call.id, command = command.name(), "dispatching command");

        match call.call_type {
            CallType::Ta => self
                .ta
                .handle(request_id, user, command)
                .await
                .map(RequestView::Ta),
            CallType::Va => self
                .va
                .handle(request_id, user, command)
                .await
                .map(RequestView::Va),
        }
    }

    pub async fn export_overview(&self, call_id: CallId) -> Result<Export, FlowError> {
        let call = self.call(call_id).await?;
        self.exporter(call.call_type)
            .overview(&call)
            .await
            .map_err(FlowError::Export)
    }

    pub async fn export_comments(
        &self,
        call_id: CallId,
        request_id: RequestId,
    ) -> Result<Export, FlowError> {
        let call = self.call_for_request(request_id).await?;
        if call.id != call_id {
            return Err(RequestError::CallRequestNotFound(request_id).into());
        }
        self.exporter(call.call_type)
            .comments(&call, request_id)
            .await
            .map_err(FlowError::Export)
    }

    fn exporter(&self, call_type: CallType) -> &dyn Exporter {
        match call_type {
            CallType::Ta => self.ta_exporter.as_ref(),
            CallType::Va => self.va_exporter.as_ref(),
        }
    }

    async fn call(&self, call_id: CallId) -> Result<Call, FlowError> {
        self.calls
            .find_call(call_id)
            .await
            .map_err(storage)?
            .ok_or(FlowError::CallNotFound(call_id))
    }

    async fn call_for_request(&self, request_id: RequestId) -> Result<Call, FlowError> {
        self.calls
            .find_call_for_request(request_id)
            .await
            .map_err(storage)?
            .ok_or(FlowError::Request(RequestError::CallRequestNotFound(
                request_id,
            )))
    }
}

#[cfg(test)]
#[path = "tests/proxy_tests.rs"]
mod tests;
