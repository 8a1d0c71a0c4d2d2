//! Client-side resource lifecycle for the research dashboard: a typed
//! gateway to the research API, one store per resource family and the
//! workflows that coordinate them.

pub mod app_state;
pub mod config;
pub mod error;
pub mod flight;
pub mod gateway;
pub mod orchestrator;
pub mod poller;
pub mod store;
pub mod stores;
pub mod upload;

pub use app_state::AppState;
pub use config::{load_settings, Settings};
pub use error::{ApiResult, GatewayError, PreconditionError};
pub use flight::{OperationKind, StoreKind};
pub use gateway::{HttpGateway, ResearchApi};
pub use orchestrator::{AnalysisSelection, TaskOrchestrator};
pub use store::{ResourceStore, Settlement, StoreEvent, StoreSnapshot};
pub use upload::{FileAttachment, UploadPolicy, UploadReport, UploadTarget};

#[cfg(test)]
#[path = "tests/gateway_tests.rs"]
mod gateway_tests;

#[cfg(test)]
#[path = "tests/orchestrator_tests.rs"]
mod orchestrator_tests;
