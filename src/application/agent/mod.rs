pub mod barrier;
pub mod scheduler;

pub use barrier::{InFlightBarrier, InFlightGuard};
pub use scheduler::MetricsAgent;
