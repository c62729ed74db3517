//! In-memory stand-ins for every collaborator the flows consume.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use shared::{
    domain::{
        Call, CallId, CallType, Coordinator, CoordinatorId, Country, InstitutionId, RequestId,
        ResourceRef, Scorer, User, UserId,
    },
    request::{RequestAggregate, TaRequest, VaRequest},
    schema::RequestSchemas,
};
use tokio::sync::Mutex;

use crate::{
    collaborators::{
        CallFinder, CoordinatorAllocator, CoordinatorStore, Envelope, Insertion,
        InstitutionCountryAllocator, MailStatus, Mailer, RequestFinder, RequestStore,
        Registration, ResourceRegistrar, Save, ScorerAllocator,
    },
    Collaborators, FlowProxy, TaFlow, VaFlow,
};

#[derive(Default)]
pub struct Fakes {
    pub calls: Mutex<HashMap<CallId, Call>>,
    pub ta: Mutex<HashMap<RequestId, TaRequest>>,
    pub va: Mutex<HashMap<RequestId, VaRequest>>,
    pub coordinators: Mutex<HashMap<(InstitutionId, CallType), Coordinator>>,
    pub countries: Mutex<HashMap<InstitutionId, Country>>,
    pub scorers: Mutex<Vec<Scorer>>,
    pub registered: Mutex<HashSet<RequestId>>,
    pub outbox: Mutex<Vec<Envelope>>,
    pub mail_down: Mutex<bool>,
}

pub fn user(name: &str) -> User {
    User {
        id: UserId::new(),
        name: name.to_string(),
        email: format!("{}@example.org", name.to_lowercase()),
    }
}

impl Fakes {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn call(&self, call_type: CallType, open: bool) -> CallId {
        let now = Utc::now();
        let (start, end) = if open {
            (now - Duration::days(1), now + Duration::days(30))
        } else {
            (now - Duration::days(30), now - Duration::days(1))
        };
        let call = Call {
            id: CallId::new(),
            name: format!("{} call", call_type.as_str()),
            call_type,
            start,
            end,
            deleted_at: None,
        };
        let id = call.id;
        self.calls.lock().await.insert(id, call);
        id
    }

    /// Registers an institution whose coordinator for `call_type` is
    /// `coordinator`.
    pub async fn institution(
        &self,
        call_type: CallType,
        country: Option<&str>,
        coordinator: &User,
    ) -> InstitutionId {
        let institution_id = InstitutionId::new();
        self.assign(institution_id, call_type, coordinator).await;
        if let Some(code) = country {
            self.countries.lock().await.insert(
                institution_id,
                Country {
                    code: code.to_string(),
                    name: code.to_string(),
                },
            );
        }
        institution_id
    }

    pub async fn assign(&self, institution_id: InstitutionId, call_type: CallType, user: &User) {
        self.coordinators.lock().await.insert(
            (institution_id, call_type),
            Coordinator {
                id: user.id.into(),
                name: user.name.clone(),
                email: user.email.clone(),
            },
        );
    }

    pub async fn scorer(&self, user: &User, country_code: &str) {
        self.scorers.lock().await.push(Scorer {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            country_code: country_code.to_string(),
        });
    }

    pub async fn sent_to(&self) -> Vec<String> {
        self.outbox
            .lock()
            .await
            .iter()
            .map(|envelope| envelope.to.clone())
            .collect()
    }

    pub fn collaborators(self: &Arc<Self>) -> Collaborators {
        Collaborators {
            calls: self.clone(),
            coordinators: self.clone(),
            registrar: self.clone(),
            mailer: self.clone(),
        }
    }

    pub fn ta_flow(self: &Arc<Self>) -> TaFlow {
        TaFlow::new(
            self.collaborators(),
            self.clone(),
            self.clone(),
            self.clone(),
            self.clone(),
            RequestSchemas::default().ta,
        )
    }

    pub fn va_flow(self: &Arc<Self>) -> VaFlow {
        VaFlow::new(
            self.collaborators(),
            self.clone(),
            self.clone(),
            RequestSchemas::default().va,
        )
    }

    pub fn proxy(self: &Arc<Self>) -> FlowProxy {
        FlowProxy::new(self.clone(), self.ta_flow(), self.va_flow())
    }
}

#[async_trait]
impl CallFinder for Fakes {
    async fn find_call(&self, call_id: CallId) -> Result<Option<Call>> {
        Ok(self.calls.lock().await.get(&call_id).cloned())
    }

    async fn find_call_for_request(&self, request_id: RequestId) -> Result<Option<Call>> {
        let call_id = match self.ta.lock().await.get(&request_id) {
            Some(request) => Some(request.core.call_id),
            None => self
                .va
                .lock()
                .await
                .get(&request_id)
                .map(|request| request.core.call_id),
        };
        match call_id {
            Some(call_id) => self.find_call(call_id).await,
            None => Ok(None),
        }
    }
}

fn insert<R: RequestAggregate + Clone>(
    requests: &mut HashMap<RequestId, R>,
    request: &R,
) -> Insertion {
    if requests.contains_key(&request.id()) {
        return Insertion::Duplicate;
    }
    requests.insert(request.id(), request.clone());
    Insertion::Inserted
}

fn save<R: RequestAggregate + Clone>(requests: &mut HashMap<RequestId, R>, request: &R) -> Save {
    let stored_version = requests.get(&request.id()).map(|stored| stored.core().version);
    if stored_version != Some(request.core().version) {
        return Save::Stale;
    }
    let mut saved = request.clone();
    saved.core_mut().version += 1;
    requests.insert(request.id(), saved);
    Save::Saved
}

#[async_trait]
impl RequestFinder<TaRequest> for Fakes {
    async fn find(&self, request_id: RequestId) -> Result<Option<TaRequest>> {
        Ok(self.ta.lock().await.get(&request_id).cloned())
    }
}

#[async_trait]
impl RequestStore<TaRequest> for Fakes {
    async fn add(&self, request: &TaRequest) -> Result<Insertion> {
        Ok(insert(&mut *self.ta.lock().await, request))
    }

    async fn save(&self, request: &TaRequest) -> Result<Save> {
        Ok(save(&mut *self.ta.lock().await, request))
    }
}

#[async_trait]
impl RequestFinder<VaRequest> for Fakes {
    async fn find(&self, request_id: RequestId) -> Result<Option<VaRequest>> {
        Ok(self.va.lock().await.get(&request_id).cloned())
    }
}

#[async_trait]
impl RequestStore<VaRequest> for Fakes {
    async fn add(&self, request: &VaRequest) -> Result<Insertion> {
        Ok(insert(&mut *self.va.lock().await, request))
    }

    async fn save(&self, request: &VaRequest) -> Result<Save> {
        Ok(save(&mut *self.va.lock().await, request))
    }
}

#[async_trait]
impl CoordinatorAllocator for Fakes {
    async fn allocate(
        &self,
        institution_id: InstitutionId,
        call_type: CallType,
    ) -> Result<Option<Coordinator>> {
        Ok(self
            .coordinators
            .lock()
            .await
            .get(&(institution_id, call_type))
            .cloned())
    }

    async fn find(&self, coordinator_id: CoordinatorId) -> Result<Option<Coordinator>> {
        Ok(self
            .coordinators
            .lock()
            .await
            .values()
            .find(|coordinator| coordinator.id == coordinator_id)
            .cloned())
    }
}

#[async_trait]
impl CoordinatorStore for Fakes {
    async fn update_coordinator(
        &self,
        coordinator_id: CoordinatorId,
        institution_id: InstitutionId,
        call_type: CallType,
    ) -> Result<u64> {
        let mut updated = 0;
        let mut reassign = |form: &mut shared::institution::InstitutionForm| {
            if form.coordinator_id != coordinator_id {
                form.coordinator_id = coordinator_id;
                updated += 1;
            }
        };
        match call_type {
            CallType::Ta => self
                .ta
                .lock()
                .await
                .values_mut()
                .filter_map(|request| request.core.institutions.get_mut(&institution_id))
                .for_each(&mut reassign),
            CallType::Va => self
                .va
                .lock()
                .await
                .values_mut()
                .filter_map(|request| request.core.institutions.get_mut(&institution_id))
                .for_each(&mut reassign),
        }
        Ok(updated)
    }
}

#[async_trait]
impl ScorerAllocator for Fakes {
    async fn find(&self, user_id: UserId, country_code: &str) -> Result<Option<Scorer>> {
        Ok(self
            .scorers
            .lock()
            .await
            .iter()
            .find(|scorer| scorer.id == user_id && scorer.country_code == country_code)
            .cloned())
    }
}

#[async_trait]
impl InstitutionCountryAllocator for Fakes {
    async fn allocate(&self, institution_id: InstitutionId) -> Result<Option<Country>> {
        Ok(self.countries.lock().await.get(&institution_id).cloned())
    }
}

#[async_trait]
impl ResourceRegistrar for Fakes {
    async fn register(&self, request_id: RequestId, owner: &User) -> Result<Registration> {
        if !self.registered.lock().await.insert(request_id) {
            return Ok(Registration::AlreadyExists);
        }
        Ok(Registration::Created(ResourceRef(format!(
            "request:{request_id}:{}",
            owner.id
        ))))
    }
}

#[async_trait]
impl Mailer for Fakes {
    async fn send(&self, envelope: Envelope) -> MailStatus {
        if *self.mail_down.lock().await {
            return MailStatus::Failed("relay unreachable".into());
        }
        self.outbox.lock().await.push(envelope);
        MailStatus::Sent
    }
}

/// Registrar that is always down.
pub struct BrokenRegistrar;

#[async_trait]
impl ResourceRegistrar for BrokenRegistrar {
    async fn register(&self, _request_id: RequestId, _owner: &User) -> Result<Registration> {
        Err(anyhow!("authorization server unavailable"))
    }
}
