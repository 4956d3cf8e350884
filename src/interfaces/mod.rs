// Collector HTTP API (axum)
pub mod http;

// Binary RPC protocol server
pub mod rpc_server;

pub use rpc_server::RpcServer;
