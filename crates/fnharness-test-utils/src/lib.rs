//! Shared test utilities for fnharness.
//!
//! [`MockFunction`] is an in-process stand-in for a function process: it
//! serves `Function.Ping` and `Function.Invoke` over the same RPC contract a
//! real function runtime uses. The `mock-function` binary wraps it so tests
//! can launch it as a child process.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use fnharness_wire::messages::{
    INVOKE_METHOD, InvokeError, InvokeRequest, InvokeResponse, PING_METHOD, PingRequest,
    PingResponse, StackFrame,
};
use fnharness_wire::{RpcError, ServerConn};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

type Handler = dyn Fn(&InvokeRequest) -> InvokeResponse + Send + Sync;

struct Shared {
    handler: Box<Handler>,
    ping_rejections: AtomicUsize,
    invocations: Mutex<Vec<InvokeRequest>>,
}

/// A scripted function implementation.
#[derive(Clone)]
pub struct MockFunction {
    shared: Arc<Shared>,
}

impl MockFunction {
    /// Replies to every invocation with a handler of the caller's choosing.
    pub fn new(handler: impl Fn(&InvokeRequest) -> InvokeResponse + Send + Sync + 'static) -> Self {
        Self {
            shared: Arc::new(Shared {
                handler: Box::new(handler),
                ping_rejections: AtomicUsize::new(0),
                invocations: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Returns the request payload unchanged.
    pub fn echo() -> Self {
        Self::new(|request| InvokeResponse {
            payload: request.payload.clone(),
            error: None,
        })
    }

    /// Fails every invocation with `error`.
    pub fn failing(error: InvokeError) -> Self {
        Self::new(move |_| InvokeResponse {
            payload: Vec::new(),
            error: Some(error.clone()),
        })
    }

    /// Rejects the first `count` pings with a server-side error.
    pub fn reject_pings(self, count: usize) -> Self {
        self.shared.ping_rejections.store(count, Ordering::SeqCst);
        self
    }

    /// Every invocation request received so far.
    pub fn invocations(&self) -> Vec<InvokeRequest> {
        self.shared
            .invocations
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Binds an ephemeral loopback port and serves on it in the background.
    pub async fn start(self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move { self.serve(listener).await });
        Ok((addr, handle))
    }

    /// Accepts connections forever, one task per connection.
    pub async fn serve(self, listener: TcpListener) {
        loop {
            let stream = match listener.accept().await {
                Ok((stream, _)) => stream,
                Err(e) => {
                    tracing::warn!(error = %e, "mock function accept failed");
                    continue;
                }
            };
            let this = self.clone();
            tokio::spawn(async move {
                if let Err(e) = this.serve_connection(stream).await {
                    tracing::debug!(error = %e, "mock function connection ended");
                }
            });
        }
    }

    /// Serves one connection until the client hangs up.
    pub async fn serve_connection<S>(&self, io: S) -> Result<(), RpcError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut conn = ServerConn::new(io);
        while let Some(request) = conn.read_request().await? {
            match request.service_method.as_str() {
                PING_METHOD => {
                    let _: PingRequest = conn.read_body().await?;
                    if self.take_ping_rejection() {
                        conn.reply_error(&request, "function not ready").await?;
                    } else {
                        conn.reply(&request, &PingResponse).await?;
                    }
                }
                INVOKE_METHOD => {
                    let args: InvokeRequest = conn.read_body().await?;
                    let response = (self.shared.handler)(&args);
                    if let Ok(mut calls) = self.shared.invocations.lock() {
                        calls.push(args);
                    }
                    conn.reply(&request, &response).await?;
                }
                other => {
                    conn.discard_body().await?;
                    conn.reply_error(&request, &format!("rpc: can't find method {other}"))
                        .await?;
                }
            }
        }
        Ok(())
    }

    fn take_ping_rejection(&self) -> bool {
        self.shared
            .ping_rejections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// The error the failing mock reports: `boom` with one frame.
pub fn sample_error() -> InvokeError {
    InvokeError {
        message: "boom".to_owned(),
        error_type: "errorString".to_owned(),
        stack_trace: vec![StackFrame {
            path: "f.go".to_owned(),
            line: 5,
            label: "main.f".to_owned(),
        }],
        should_exit: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fnharness_wire::Client;

    #[tokio::test]
    async fn echoes_and_records_invocations() {
        let mock = MockFunction::echo();
        let (client_io, server_io) = tokio::io::duplex(4096);
        let server = mock.clone();
        tokio::spawn(async move { server.serve_connection(server_io).await });

        let mut client = Client::new(client_io);
        let request = InvokeRequest {
            payload: b"ping".to_vec(),
            ..InvokeRequest::default()
        };
        let response: InvokeResponse = client.call(INVOKE_METHOD, &request).await.unwrap();
        assert_eq!(response.payload, b"ping");
        assert_eq!(mock.invocations(), vec![request]);
    }

    #[tokio::test]
    async fn rejects_only_the_configured_number_of_pings() {
        let mock = MockFunction::echo().reject_pings(2);
        let (client_io, server_io) = tokio::io::duplex(4096);
        tokio::spawn(async move { mock.serve_connection(server_io).await });

        let mut client = Client::new(client_io);
        for _ in 0..2 {
            let err = client
                .call::<_, PingResponse>(PING_METHOD, &PingRequest)
                .await
                .unwrap_err();
            assert!(!err.is_transport());
        }
        let _: PingResponse = client.call(PING_METHOD, &PingRequest).await.unwrap();
    }
}
