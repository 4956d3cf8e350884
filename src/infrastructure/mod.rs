pub mod factory;
pub mod persistence;
pub mod rpc;
pub mod sampling;
pub mod security;
pub mod transport;

pub use factory::StorageFactory;
