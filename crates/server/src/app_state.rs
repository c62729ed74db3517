use std::sync::Arc;

use flows::{Collaborators, FlowProxy, Mailer, ResourceRegistrar, TaFlow, VaFlow};
use shared::schema::RequestSchemas;
use storage::{JsonExporter, Storage};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) storage: Storage,
    pub(crate) flows: Arc<FlowProxy>,
}

impl AppState {
    /// Wires both request flows over one SQLite store.
    pub(crate) fn new(
        storage: Storage,
        registrar: Arc<dyn ResourceRegistrar>,
        mailer: Arc<dyn Mailer>,
        schemas: RequestSchemas,
    ) -> Self {
        let store = Arc::new(storage.clone());
        let common = Collaborators {
            calls: store.clone(),
            coordinators: store.clone(),
            registrar,
            mailer,
        };
        let ta = TaFlow::new(
            common.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            schemas.ta,
        );
        let va = VaFlow::new(common, store.clone(), store.clone(), schemas.va);
        let exporter = Arc::new(JsonExporter::new(storage.clone()));
        let flows = FlowProxy::new(store, ta, va).with_exporters(exporter.clone(), exporter);
        Self {
            storage,
            flows: Arc::new(flows),
        }
    }
}
