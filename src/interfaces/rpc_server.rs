//! TCP server for the binary RPC protocol.
//!
//! One task per connection; requests on a connection are served in order
//! until the peer closes it or shutdown fires.

use crate::application::collector::MetricService;
use crate::application::system::wait_for_shutdown;
use crate::domain::errors::MetricError;
use crate::infrastructure::rpc::codec::{
    decode_request, encode_response, read_frame, write_frame,
};
use crate::infrastructure::rpc::{RpcRequest, RpcResponse};
use crate::infrastructure::security::TrustedSubnet;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

pub struct RpcServer {
    service: MetricService,
    trusted_subnet: Option<TrustedSubnet>,
}

impl RpcServer {
    pub fn new(service: MetricService, trusted_subnet: Option<TrustedSubnet>) -> Self {
        Self {
            service,
            trusted_subnet,
        }
    }

    /// Apply one decoded request to the collector.
    pub async fn dispatch(&self, request: RpcRequest) -> RpcResponse {
        let outcome = match request {
            RpcRequest::UpdateMetric(metric) => self.service.update_metric(metric).await,
            RpcRequest::BatchUpdateMetrics(metrics) => self.service.batch_update(metrics).await,
        };
        match outcome {
            Ok(()) => RpcResponse::ok(),
            Err(e) => {
                warn!("RPC request rejected: {}", e);
                RpcResponse::from_error(&e)
            }
        }
    }

    async fn handle_connection(
        &self,
        mut stream: TcpStream,
        peer: SocketAddr,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), MetricError> {
        loop {
            let frame = tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => return Ok(()),
                frame = read_frame(&mut stream) => frame?,
            };
            let Some(frame) = frame else {
                debug!("RPC peer {} disconnected", peer);
                return Ok(());
            };

            let response = match decode_request(&frame) {
                Ok(request) => self.dispatch(request).await,
                Err(e) => {
                    warn!("Malformed RPC request from {}: {}", peer, e);
                    RpcResponse::from_error(&e)
                }
            };
            write_frame(&mut stream, &encode_response(&response)).await?;
        }
    }

    /// Accept connections until `shutdown` fires.
    pub async fn serve(
        self,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> std::io::Result<()> {
        info!("RPC server listening on {}", listener.local_addr()?);
        let server = std::sync::Arc::new(self);

        loop {
            let (stream, peer) = tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => break,
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!("RPC accept failed: {}", e);
                        continue;
                    }
                },
            };

            if let Some(subnet) = server.trusted_subnet
                && !subnet.contains(peer.ip())
            {
                warn!("Refusing RPC connection from untrusted {}", peer);
                continue;
            }

            stream.set_nodelay(true).ok();
            let server = server.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                if let Err(e) = server.handle_connection(stream, peer, shutdown).await {
                    warn!("RPC connection {} closed: {}", peer, e);
                }
            });
        }

        info!("RPC server stopped");
        Ok(())
    }
}
