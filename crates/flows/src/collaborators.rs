//! Interfaces the flows consume. Each is implemented by the storage or
//! integrations crate and injected as `Arc<dyn _>`.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::domain::{
    Call, CallId, CallType, Coordinator, CoordinatorId, Country, InstitutionId, RequestId,
    ResourceRef, Scorer, User, UserId,
};

#[async_trait]
pub trait CallFinder: Send + Sync {
    async fn find_call(&self, call_id: CallId) -> Result<Option<Call>>;
    async fn find_call_for_request(&self, request_id: RequestId) -> Result<Option<Call>>;
}

#[async_trait]
pub trait RequestFinder<R: Send + Sync>: Send + Sync {
    async fn find(&self, request_id: RequestId) -> Result<Option<R>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    Inserted,
    Duplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Save {
    Saved,
    /// The stored version moved on since the aggregate was loaded.
    Stale,
}

#[async_trait]
pub trait RequestStore<R: Send + Sync>: Send + Sync {
    async fn add(&self, request: &R) -> Result<Insertion>;
    /// Writes the request and all its sub-forms in one transaction, guarded
    /// by the aggregate's version.
    async fn save(&self, request: &R) -> Result<Save>;
}

#[async_trait]
pub trait CoordinatorStore: Send + Sync {
    /// Points every institution form of `institution_id` on requests of
    /// `call_type` at `coordinator_id`. Returns the number of forms changed.
    async fn update_coordinator(
        &self,
        coordinator_id: CoordinatorId,
        institution_id: InstitutionId,
        call_type: CallType,
    ) -> Result<u64>;
}

#[async_trait]
pub trait CoordinatorAllocator: Send + Sync {
    async fn allocate(
        &self,
        institution_id: InstitutionId,
        call_type: CallType,
    ) -> Result<Option<Coordinator>>;
    async fn find(&self, coordinator_id: CoordinatorId) -> Result<Option<Coordinator>>;
}

#[async_trait]
pub trait ScorerAllocator: Send + Sync {
    async fn find(&self, user_id: UserId, country_code: &str) -> Result<Option<Scorer>>;
}

#[async_trait]
pub trait InstitutionCountryAllocator: Send + Sync {
    async fn allocate(&self, institution_id: InstitutionId) -> Result<Option<Country>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    Created(ResourceRef),
    AlreadyExists,
}

#[async_trait]
pub trait ResourceRegistrar: Send + Sync {
    async fn register(&self, request_id: RequestId, owner: &User) -> Result<Registration>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailStatus {
    Sent,
    Failed(String),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, envelope: Envelope) -> MailStatus;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait Exporter: Send + Sync {
    async fn overview(&self, call: &Call) -> Result<Export>;
    async fn comments(&self, call: &Call, request_id: RequestId) -> Result<Export>;
}

pub struct MissingExporter;

#[async_trait]
impl Exporter for MissingExporter {
    async fn overview(&self, call: &Call) -> Result<Export> {
        Err(anyhow!("no exporter configured for call {}", call.id))
    }

    async fn comments(&self, call: &Call, request_id: RequestId) -> Result<Export> {
        Err(anyhow!(
            "no exporter configured for call {} request {}",
            call.id,
            request_id
        ))
    }
}
