use super::*;
use crate::{
    collaborators::Exporter,
    coordinators::reassign_coordinator,
    support::{user, Fakes},
};
use anyhow::Result;
use async_trait::async_trait;
use shared::{domain::InstitutionId, error::ErrorCode, error::ApiError};

struct NamedExporter(&'static str);

#[async_trait]
impl Exporter for NamedExporter {
    async fn overview(&self, call: &Call) -> Result<Export> {
        Ok(Export {
            file_name: format!("{}-{}.json", self.0, call.id),
            content_type: "application/json".into(),
            bytes: b"[]".to_vec(),
        })
    }

    async fn comments(&self, call: &Call, request_id: RequestId) -> Result<Export> {
        Ok(Export {
            file_name: format!("{}-{}-{request_id}.txt", self.0, call.id),
            content_type: "text/plain".into(),
            bytes: Vec::new(),
        })
    }
}

#[tokio::test]
async fn commands_reach_the_flow_of_the_call_type() {
    let fakes = Fakes::new();
    let proxy = fakes.proxy();
    let author = user("Marie");
    let ta_call = fakes.call(CallType::Ta, true).await;
    let va_call = fakes.call(CallType::Va, true).await;

    let ta_id = RequestId::new();
    let view = proxy
        .handle(ta_id, &author, Command::CreateRequest { call_id: ta_call })
        .await
        .expect("ta");
    assert!(matches!(view, RequestView::Ta(_)));

    let va_id = RequestId::new();
    let view = proxy
        .handle(va_id, &author, Command::CreateRequest { call_id: va_call })
        .await
        .expect("va");
    assert!(matches!(view, RequestView::Va(_)));

    let view = proxy
        .handle(va_id, &author, Command::WithdrawRequest)
        .await
        .expect("withdraw");
    assert_eq!(view.core().id, va_id);
    assert!(matches!(view, RequestView::Va(_)));

    let json = serde_json::to_value(&view).expect("json");
    assert_eq!(json["type"], "va");
    assert_eq!(json["status"], "WITHDRAWN");
}

#[tokio::test]
async fn unknown_request_has_no_call() {
    let fakes = Fakes::new();
    let proxy = fakes.proxy();
    let request_id = RequestId::new();
    let err = proxy
        .handle(request_id, &user("Marie"), Command::SubmitRequest)
        .await
        .expect_err("should fail");
    let api: ApiError = err.into();
    assert_eq!(api.code, ErrorCode::NotFound);
    assert_eq!(api.error, "CallRequestNotFound");
}

#[tokio::test]
async fn exports_go_to_the_variant_exporter() {
    let fakes = Fakes::new();
    let proxy = fakes
        .proxy()
        .with_exporters(Arc::new(NamedExporter("ta")), Arc::new(NamedExporter("va")));
    let author = user("Marie");
    let va_call = fakes.call(CallType::Va, true).await;
    let other_call = fakes.call(CallType::Va, true).await;
    let request_id = RequestId::new();
    proxy
        .handle(request_id, &author, Command::CreateRequest { call_id: va_call })
        .await
        .expect("create");

    let export = proxy.export_overview(va_call).await.expect("overview");
    assert!(export.file_name.starts_with("va-"));

    let export = proxy
        .export_comments(va_call, request_id)
        .await
        .expect("comments");
    assert_eq!(export.content_type, "text/plain");

    let err = proxy
        .export_comments(other_call, request_id)
        .await
        .expect_err("request belongs to another call");
    assert!(matches!(
        err,
        FlowError::Request(RequestError::CallRequestNotFound(id)) if id == request_id
    ));
}

#[tokio::test]
async fn missing_exporter_is_an_internal_failure() {
    let fakes = Fakes::new();
    let proxy = fakes.proxy();
    let call_id = fakes.call(CallType::Ta, true).await;
    let err = proxy
        .export_overview(call_id)
        .await
        .expect_err("no exporter");
    assert!(matches!(err, FlowError::Export(_)));
    assert_eq!(ApiError::from(err).code, ErrorCode::Internal);
}

#[tokio::test]
async fn reassignment_moves_forms_to_the_current_coordinator() {
    let fakes = Fakes::new();
    let proxy = fakes.proxy();
    let author = user("Marie");
    let before = user("Niels");
    let after = user("Hendrik");
    let call_id = fakes.call(CallType::Ta, true).await;
    let institution_id = fakes.institution(CallType::Ta, Some("NL"), &before).await;

    let request_id = RequestId::new();
    proxy
        .handle(request_id, &author, Command::CreateRequest { call_id })
        .await
        .expect("create");
    proxy
        .handle(request_id, &author, Command::AddInstitutionForm { institution_id })
        .await
        .expect("add");
    proxy
        .handle(request_id, &author, Command::SubmitRequest)
        .await
        .expect("submit");

    fakes.assign(institution_id, CallType::Ta, &after).await;
    let updated = reassign_coordinator(&*fakes, &*fakes, institution_id, CallType::Ta)
        .await
        .expect("reassign");
    assert_eq!(updated, 1);

    let err = proxy
        .handle(request_id, &before, Command::ApproveRequest)
        .await
        .expect_err("old coordinator");
    assert_eq!(err.name(), "CantFindAssociatedInstitute");
    let view = proxy
        .handle(request_id, &after, Command::ApproveRequest)
        .await
        .expect("new coordinator approves");
    assert_eq!(view.core().status.as_str(), "APPROVED");

    let err = reassign_coordinator(
        &*fakes,
        &*fakes,
        InstitutionId::new(),
        CallType::Ta,
    )
    .await
    .expect_err("unknown institution");
    assert_eq!(err.code(), ErrorCode::Validation);
}
