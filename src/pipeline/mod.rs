//! Tour pipeline: state machine and sequential stage coordinator.

pub mod coordinator;
pub mod state;

pub use coordinator::{RunOutcome, TourPipeline};
pub use state::{PipelineState, TourSnapshot};
