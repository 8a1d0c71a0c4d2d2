//! One store per resource family, each owning its own collection(s),
//! flight flags and last error.

mod analysis;
mod auth;
mod protocols;
mod visualizations;

pub use analysis::AnalysisStore;
pub use auth::{AuthSnapshot, AuthStore};
pub use protocols::ProtocolStore;
pub use visualizations::VisualizationStore;
