//! Axum router assembly for the HTTP surface (spec.md §6), grounded in the
//! teacher's `main.rs` (router nesting, `CorsLayer`) and `tao_interface.rs`
//! (state-holding interface struct handed to route closures).

pub mod handlers;

use std::collections::HashMap;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::datastore::Datastore;

/// Maps `(datastore name, document type)` to a boxed `Datastore`, replacing
/// the Python Django app's module-level `_datastores` dict
/// (`rest_api.py::add_datastore_class`) with an explicit value passed as
/// axum state (spec.md §9 "global state" design note).
#[derive(Clone, Default)]
pub struct DatastoreRegistry {
    inner: Arc<HashMap<(String, String), Arc<dyn Datastore>>>,
}

impl DatastoreRegistry {
    pub fn builder() -> DatastoreRegistryBuilder {
        DatastoreRegistryBuilder { entries: HashMap::new() }
    }

    pub fn get(&self, datastore: &str, document_type: &str) -> Option<Arc<dyn Datastore>> {
        self.inner.get(&(datastore.to_string(), document_type.to_string())).cloned()
    }

    /// `GET /datastores`: the distinct datastore names registered, each
    /// alongside the replica id they report.
    pub fn list(&self) -> Vec<(String, String)> {
        let mut seen = std::collections::BTreeMap::new();
        for ((name, _type), ds) in self.inner.iter() {
            seen.entry(name.clone()).or_insert_with(|| ds.replica_id().to_string());
        }
        seen.into_iter().collect()
    }
}

pub struct DatastoreRegistryBuilder {
    entries: HashMap<(String, String), Arc<dyn Datastore>>,
}

impl DatastoreRegistryBuilder {
    pub fn register(
        mut self,
        datastore_name: impl Into<String>,
        document_type: impl Into<String>,
        ds: Arc<dyn Datastore>,
    ) -> Self {
        self.entries.insert((datastore_name.into(), document_type.into()), ds);
        self
    }

    pub fn build(self) -> DatastoreRegistry {
        DatastoreRegistry { inner: Arc::new(self.entries) }
    }
}

/// Builds the full router: `GET /datastores` plus the per-datastore,
/// per-document-type doc/docs routes from spec.md §6's wire format table.
pub fn build_router(registry: DatastoreRegistry) -> Router {
    Router::new()
        .route("/datastores", get(handlers::list_datastores))
        .route(
            "/{ds}/{doc_type}/doc/{id}",
            get(handlers::get_document),
        )
        .route("/{ds}/{doc_type}/doc", post(handlers::put_document))
        .route("/{ds}/{doc_type}/docs", get(handlers::get_docs_since))
        .route("/{ds}/{doc_type}/docs", post(handlers::put_documents))
        .layer(CorsLayer::permissive())
        .with_state(registry)
}
