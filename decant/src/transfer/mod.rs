//! Download transfer pipeline: strategy selection, the external transform,
//! progress counting, and the orchestration service.

pub mod counter;
pub mod diagnostics;
pub mod plan;
pub mod service;
pub mod transform;

pub use plan::{TransferKind, TransferPlan};
pub use service::{DownloadRequest, TransferService, TransferStream};
pub use transform::TransformConfig;
