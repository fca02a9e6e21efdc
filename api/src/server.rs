//! Accept loop and per-connection handling.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use crate::request::{RequestError, read_request};
use crate::response::Response;
use crate::routes::{ApiState, handle_request};

pub const READ_TIMEOUT: Duration = Duration::from_secs(10);

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Serve connections until `cancel` fires. In-flight connections are aborted
/// on return.
pub async fn serve(listener: TcpListener, state: Arc<ApiState>, cancel: CancellationToken) {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "HTTP server listening");
    }

    let mut connections = JoinSet::new();
    loop {
        let accepted = tokio::select! {
            () = cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
            Some(_) = connections.join_next(), if !connections.is_empty() => continue,
        };

        match accepted {
            Ok((stream, peer)) => {
                let state = Arc::clone(&state);
                connections.spawn(async move {
                    let mut stream = stream;
                    handle_connection(&mut stream, peer, &state, READ_TIMEOUT).await;
                });
            }
            Err(e) => {
                // Usually fd exhaustion; back off instead of spinning.
                tracing::warn!(error = %e, "Failed to accept connection");
                sleep(ACCEPT_BACKOFF).await;
            }
        }
    }

    connections.shutdown().await;
    tracing::info!("HTTP server stopped");
}

/// Read one request, answer it, and close.
pub async fn handle_connection<S>(
    stream: &mut S,
    peer: SocketAddr,
    state: &ApiState,
    read_timeout: Duration,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let response = match timeout(read_timeout, read_request(stream)).await {
        Ok(Ok(request)) => {
            let response = handle_request(&request, state);
            tracing::debug!(
                %peer,
                method = %request.method,
                path = %request.path,
                status = response.status,
                "Handled request"
            );
            response
        }
        Ok(Err(e)) => match e.status() {
            Some(status) => {
                tracing::debug!(%peer, error = %e, "Rejected request");
                Response::text(status, &e.to_string())
            }
            None => {
                if let RequestError::Io(e) = &e {
                    tracing::debug!(%peer, error = %e, "Connection read failed");
                }
                return;
            }
        },
        Err(_) => {
            let e = RequestError::Timeout;
            tracing::debug!(%peer, "Request read timed out");
            Response::text(408, &e.to_string())
        }
    };

    if let Err(e) = write_response(stream, &response).await {
        tracing::debug!(%peer, error = %e, "Failed to write response");
    }
}

async fn write_response<S>(stream: &mut S, response: &Response) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(&response.to_bytes()).await?;
    stream.flush().await?;
    stream.shutdown().await
}
