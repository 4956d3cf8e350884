pub mod restorer;
pub mod write_through;

pub use restorer::{CheckpointMode, Restorer};
pub use write_through::WriteThroughStorage;
