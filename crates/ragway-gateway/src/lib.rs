//! ragway-gateway
//!
//! Wires configuration, the chosen backend, model clients and the
//! orchestrator into one shared [`GatewayContext`].

pub mod catalog;
pub mod context;
pub mod registry;
pub mod settings;

pub use catalog::{CollectionCatalog, StaticCatalog};
pub use context::{default_method, GatewayContext, GatewayParts, SearchParams};
pub use registry::{open_backend, BackendKind};
pub use settings::GatewaySettings;
