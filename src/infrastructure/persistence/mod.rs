pub mod database;
pub mod file;
pub mod memory;
pub mod migrations;

pub use database::DatabaseStorage;
pub use file::FileStorage;
pub use memory::MemoryStorage;
