use std::sync::Arc;

pub mod collaborators;
mod common;
pub mod coordinators;
pub mod error;
pub mod notify;
pub mod proxy;
pub mod ta;
pub mod va;

pub use collaborators::{
    CallFinder, CoordinatorAllocator, CoordinatorStore, Envelope, Export, Exporter, Insertion,
    InstitutionCountryAllocator, MailStatus, Mailer, MissingExporter, Registration,
    RequestFinder, RequestStore, ResourceRegistrar, Save, ScorerAllocator,
};
pub use error::FlowError;
pub use proxy::{FlowProxy, RequestView};
pub use ta::TaFlow;
pub use va::VaFlow;

/// Collaborators both request variants depend on.
#[derive(Clone)]
pub struct Collaborators {
    pub calls: Arc<dyn CallFinder>,
    pub coordinators: Arc<dyn CoordinatorAllocator>,
    pub registrar: Arc<dyn ResourceRegistrar>,
    pub mailer: Arc<dyn Mailer>,
}

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod support;
