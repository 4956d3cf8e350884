pub mod client;
pub mod codec;

pub use client::RpcClient;
pub use codec::{RpcRequest, RpcResponse, RpcStatus};
