//! Store connection primitive
//!
//! The wire protocol is not this crate's concern. A physical connection is an
//! opaque [`StoreHandle`] produced by a [`StoreConnector`]; pools only need to
//! open, profile, reconnect and close them.

mod memory;
mod tcp;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::EndpointOptions;
use crate::error::ConnectError;

pub use memory::{MemoryConnector, MemoryHandle};
pub use tcp::{TcpConnector, TcpHandle};

/// One timed operation reported by a handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfiledOperation {
    pub handle_id: u64,
    pub endpoint: String,
    pub operation: &'static str,
    pub elapsed: Duration,
}

/// Profiling callback attached to every physical connection of a pool
pub trait Profiler: Send + Sync {
    fn record(&self, operation: &ProfiledOperation);
}

pub type ProfilingHook = Arc<dyn Profiler>;

/// A physical connection to a store endpoint
#[async_trait]
pub trait StoreHandle: Send + Sync + fmt::Debug {
    /// Process-unique identifier of this handle
    fn id(&self) -> u64;

    /// `host:port` this handle talks to
    fn endpoint(&self) -> &str;

    /// Attach a profiler. Attaching the same hook again is a no-op.
    fn register_profiler(&self, hook: ProfilingHook);

    fn is_connected(&self) -> bool;

    /// Re-establish the session after it dropped
    async fn reconnect(&self) -> Result<(), ConnectError>;

    async fn close(&self);
}

/// Opens physical connections
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self, options: &EndpointOptions) -> Result<Arc<dyn StoreHandle>, ConnectError>;
}

/// Holds at most one profiler and reports operations to it.
#[derive(Default)]
pub(crate) struct ProfilerSlot {
    hook: std::sync::RwLock<Option<ProfilingHook>>,
}

impl ProfilerSlot {
    pub(crate) fn attach(&self, hook: ProfilingHook) {
        if let Ok(mut slot) = self.hook.write() {
            if let Some(existing) = slot.as_ref() {
                if Arc::ptr_eq(existing, &hook) {
                    return;
                }
            }
            *slot = Some(hook);
        }
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.hook.read().map(|slot| slot.is_some()).unwrap_or(false)
    }

    pub(crate) fn report(&self, operation: ProfiledOperation) {
        if let Ok(slot) = self.hook.read() {
            if let Some(hook) = slot.as_ref() {
                hook.record(&operation);
            }
        }
    }
}

impl fmt::Debug for ProfilerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProfilerSlot")
            .field("attached", &self.is_attached())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingProfiler {
        calls: AtomicUsize,
    }

    impl Profiler for CountingProfiler {
        fn record(&self, _operation: &ProfiledOperation) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn operation() -> ProfiledOperation {
        ProfiledOperation {
            handle_id: 1,
            endpoint: "localhost:6379".to_string(),
            operation: "reconnect",
            elapsed: Duration::from_millis(3),
        }
    }

    #[test]
    fn test_profiler_slot_reports_to_attached_hook() {
        let slot = ProfilerSlot::default();
        slot.report(operation());
        assert!(!slot.is_attached());

        let profiler = Arc::new(CountingProfiler::default());
        slot.attach(profiler.clone());
        slot.report(operation());
        assert_eq!(profiler.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_attaching_same_hook_twice_is_idempotent() {
        let slot = ProfilerSlot::default();
        let profiler = Arc::new(CountingProfiler::default());
        let hook: ProfilingHook = profiler.clone();

        slot.attach(hook.clone());
        slot.attach(hook);
        slot.report(operation());

        assert_eq!(profiler.calls.load(Ordering::SeqCst), 1);
    }
}
