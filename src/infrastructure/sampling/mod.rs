pub mod alloc;
pub mod host;
pub mod runtime;

pub use alloc::CountingAllocator;
pub use host::HostSampler;
pub use runtime::RuntimeSampler;
