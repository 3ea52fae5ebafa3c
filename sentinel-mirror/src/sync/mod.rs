//! Synchronization of sync requests with the hub.

mod error;
mod layout;
mod orchestrator;
mod report;
mod settings;

pub use error::{SyncError, SyncResult};
pub use layout::RequestLayout;
pub use orchestrator::SyncOrchestrator;
pub use report::{BatchReport, DiscoveryOutcome, RequestReport};
pub use settings::SyncSettings;
