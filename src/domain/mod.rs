// Metric value type and merge rule
pub mod metric;

// Storage Engine contract
pub mod storage;

// Port interfaces (transport client, samplers)
pub mod ports;

// Domain-specific error types
pub mod errors;
