//! Transfer progress events and their publish/subscribe bus.

pub mod bus;
pub mod event;

pub use bus::{ProgressBus, ProgressPublisher, ProgressSubscription};
pub use event::{ProgressEvent, ProgressStatus, TransferPhase};
