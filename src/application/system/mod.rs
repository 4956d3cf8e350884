pub mod shutdown;

pub use shutdown::{ShutdownSignal, wait_for_shutdown};
