pub mod coordinator;
pub mod correlation;

pub use coordinator::{AuthTokenListener, CoordinatorOptions, SessionCoordinator, SessionState};
pub use correlation::CorrelationId;
