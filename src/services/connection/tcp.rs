//! TCP store connector
//!
//! Opens plain TCP sessions to the configured endpoint. The session is kept
//! open for the lifetime of the handle; protocol framing happens above this
//! layer.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use super::{ProfiledOperation, ProfilerSlot, ProfilingHook, StoreConnector, StoreHandle};
use crate::config::EndpointOptions;
use crate::error::ConnectError;
use crate::utils::{deadline_from_millis, with_timeout, TimeoutError};

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Connector producing [`TcpHandle`]s
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

impl TcpConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StoreConnector for TcpConnector {
    async fn connect(&self, options: &EndpointOptions) -> Result<Arc<dyn StoreHandle>, ConnectError> {
        let handle = TcpHandle::open(options.clone()).await?;
        Ok(Arc::new(handle))
    }
}

/// A TCP session to one store endpoint
#[derive(Debug)]
pub struct TcpHandle {
    id: u64,
    address: String,
    options: EndpointOptions,
    stream: Mutex<Option<TcpStream>>,
    connected: AtomicBool,
    profiler: ProfilerSlot,
}

impl TcpHandle {
    pub async fn open(options: EndpointOptions) -> Result<Self, ConnectError> {
        let address = options.address();
        let stream = dial(&address, &options).await?;

        let id = NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(handle = id, address = %address, "Store connection established");

        Ok(Self {
            id,
            address,
            options,
            stream: Mutex::new(Some(stream)),
            connected: AtomicBool::new(true),
            profiler: ProfilerSlot::default(),
        })
    }

    /// Local socket address of the current session, if connected
    pub async fn local_addr(&self) -> Option<std::net::SocketAddr> {
        let stream = self.stream.lock().await;
        stream.as_ref().and_then(|s| s.local_addr().ok())
    }
}

#[async_trait]
impl StoreHandle for TcpHandle {
    fn id(&self) -> u64 {
        self.id
    }

    fn endpoint(&self) -> &str {
        &self.address
    }

    fn register_profiler(&self, hook: ProfilingHook) {
        self.profiler.attach(hook);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn reconnect(&self) -> Result<(), ConnectError> {
        let started = Instant::now();
        let fresh = dial(&self.address, &self.options).await?;

        let mut stream = self.stream.lock().await;
        *stream = Some(fresh);
        self.connected.store(true, Ordering::Release);

        self.profiler.report(ProfiledOperation {
            handle_id: self.id,
            endpoint: self.address.clone(),
            operation: "reconnect",
            elapsed: started.elapsed(),
        });
        Ok(())
    }

    async fn close(&self) {
        let mut stream = self.stream.lock().await;
        if stream.take().is_some() {
            tracing::debug!(handle = self.id, address = %self.address, "Store connection closed");
        }
        self.connected.store(false, Ordering::Release);
    }
}

async fn dial(address: &str, options: &EndpointOptions) -> Result<TcpStream, ConnectError> {
    let timeout = deadline_from_millis(options.connect_timeout_ms);

    let stream = with_timeout(timeout, TcpStream::connect(address))
        .await
        .map_err(|err| match err {
            TimeoutError::Timeout(timeout) => ConnectError::Timeout {
                address: address.to_string(),
                timeout,
            },
            TimeoutError::Inner(source) => ConnectError::Io {
                address: address.to_string(),
                source,
            },
        })?;

    if options.nodelay {
        stream.set_nodelay(true).map_err(|source| ConnectError::Io {
            address: address.to_string(),
            source,
        })?;
    }

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn listener() -> (TcpListener, EndpointOptions) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let options = EndpointOptions {
            host: "127.0.0.1".to_string(),
            port,
            ..Default::default()
        };
        (listener, options)
    }

    #[tokio::test]
    async fn test_connects_to_listening_endpoint() {
        let (_listener, options) = listener().await;

        let handle = TcpConnector::new().connect(&options).await.unwrap();
        assert!(handle.is_connected());
        assert_eq!(handle.endpoint(), options.address());

        handle.close().await;
        assert!(!handle.is_connected());
    }

    #[tokio::test]
    async fn test_reconnect_after_close() {
        let (_listener, options) = listener().await;

        let handle = TcpHandle::open(options).await.unwrap();
        handle.close().await;
        assert!(handle.local_addr().await.is_none());

        handle.reconnect().await.unwrap();
        assert!(handle.is_connected());
        assert!(handle.local_addr().await.is_some());
    }

    #[tokio::test]
    async fn test_refused_connection_is_io_error() {
        let (listener, options) = listener().await;
        drop(listener);

        let err = TcpConnector::new().connect(&options).await.unwrap_err();
        assert!(matches!(err, ConnectError::Io { .. }));
    }

    #[tokio::test]
    async fn test_handle_ids_are_unique() {
        let (_listener, options) = listener().await;

        let first = TcpConnector::new().connect(&options).await.unwrap();
        let second = TcpConnector::new().connect(&options).await.unwrap();
        assert_ne!(first.id(), second.id());
    }
}
