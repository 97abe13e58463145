//! `reldatasync`: bidirectional, eventually-consistent synchronization of
//! record-oriented data between independently writable replicas.

pub mod config;
pub mod datastore;
pub mod document;
pub mod error;
pub mod http;
pub mod json_codec;
pub mod replicator;
pub mod vector_clock;

pub use datastore::{Backend, Datastore, PutResult, Store};
pub use document::{DocValue, Document, FieldType, Schema};
pub use error::{AppError, AppResult, DatastoreError, DatastoreResult};
pub use replicator::Replicator;
pub use vector_clock::VectorClock;
