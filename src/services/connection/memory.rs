//! In-process store connector
//!
//! Backs `--dry-run`, the test-suite and the benches. Every handle it opens
//! is remembered so callers can inspect or break them afterwards.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;

use super::{ProfiledOperation, ProfilerSlot, ProfilingHook, StoreConnector, StoreHandle};
use crate::config::EndpointOptions;
use crate::error::ConnectError;

/// Connector that never leaves the process
#[derive(Debug, Default)]
pub struct MemoryConnector {
    attempts: AtomicUsize,
    fail_after: Option<usize>,
    refuse_reconnects: Arc<AtomicBool>,
    next_id: AtomicU64,
    handles: Mutex<Vec<Arc<MemoryHandle>>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every connect attempt after the first `successes` ones
    pub fn fail_after(successes: usize) -> Self {
        Self {
            fail_after: Some(successes),
            ..Self::default()
        }
    }

    /// Number of connect calls made so far, failed ones included
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Make `reconnect` fail on every handle, existing and future
    pub fn refuse_reconnects(&self, refuse: bool) {
        self.refuse_reconnects.store(refuse, Ordering::SeqCst);
    }

    /// Every handle opened so far, in creation order
    pub fn handles(&self) -> Vec<Arc<MemoryHandle>> {
        self.handles
            .lock()
            .map(|handles| handles.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl StoreConnector for MemoryConnector {
    async fn connect(&self, options: &EndpointOptions) -> Result<Arc<dyn StoreHandle>, ConnectError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        let address = options.address();

        if options.host.is_empty() {
            return Err(ConnectError::InvalidAddress(address));
        }
        if let Some(limit) = self.fail_after {
            if attempt >= limit {
                return Err(ConnectError::Refused {
                    address,
                    reason: format!("connect attempt {} exceeds limit {}", attempt + 1, limit),
                });
            }
        }

        let handle = Arc::new(MemoryHandle {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            address,
            connected: AtomicBool::new(true),
            refuse_reconnects: self.refuse_reconnects.clone(),
            reconnect_attempts: AtomicUsize::new(0),
            profiler: ProfilerSlot::default(),
        });

        if let Ok(mut handles) = self.handles.lock() {
            handles.push(handle.clone());
        }
        Ok(handle)
    }
}

/// Handle produced by [`MemoryConnector`]
#[derive(Debug)]
pub struct MemoryHandle {
    id: u64,
    address: String,
    connected: AtomicBool,
    refuse_reconnects: Arc<AtomicBool>,
    reconnect_attempts: AtomicUsize,
    profiler: ProfilerSlot,
}

impl MemoryHandle {
    /// Simulate the session dropping
    pub fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn reconnect_attempts(&self) -> usize {
        self.reconnect_attempts.load(Ordering::SeqCst)
    }

    pub fn has_profiler(&self) -> bool {
        self.profiler.is_attached()
    }
}

#[async_trait]
impl StoreHandle for MemoryHandle {
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
        self.connected.load(Ordering::SeqCst)
    }

    async fn reconnect(&self) -> Result<(), ConnectError> {
        let started = Instant::now();
        self.reconnect_attempts.fetch_add(1, Ordering::SeqCst);

        if self.refuse_reconnects.load(Ordering::SeqCst) {
            return Err(ConnectError::Refused {
                address: self.address.clone(),
                reason: "reconnects are refused".to_string(),
            });
        }

        self.connected.store(true, Ordering::SeqCst);
        self.profiler.report(ProfiledOperation {
            handle_id: self.id,
            endpoint: self.address.clone(),
            operation: "reconnect",
            elapsed: started.elapsed(),
        });
        Ok(())
    }

    async fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}
