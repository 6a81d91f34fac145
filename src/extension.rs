//! Extension subsystem boundary.
//!
//! Extensions carry the interception logic that runs next to the listener.
//! The core only drives their lifecycle:
//!
//! - `setup` starts background work. It may run for the life of the process;
//!   its outcome is logged, never acted on.
//! - `cleanup` runs exactly once, after the listener has fully stopped, and
//!   releases whatever `setup` acquired.
//!
//! Both hooks take `self: Arc<Self>` and return a boxed `'static` future so
//! the trait stays object-safe and setups can be spawned as tasks.
//!
//! # Example
//!
//! ```ignore
//! use sluice::extension::{Extension, ExtensionFuture, ExtensionManager};
//! use std::sync::Arc;
//!
//! struct Recorder;
//!
//! impl Extension for Recorder {
//!     fn setup(self: Arc<Self>) -> ExtensionFuture {
//!         Box::pin(async move { Ok(()) })
//!     }
//!
//!     fn cleanup(self: Arc<Self>) -> ExtensionFuture {
//!         Box::pin(async move { Ok(()) })
//!     }
//! }
//!
//! let mut extensions = ExtensionManager::new();
//! extensions.register("recorder", Arc::new(Recorder));
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Future returned by extension hooks.
pub type ExtensionFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'static>>;

/// Lifecycle hooks of one extension.
pub trait Extension: Send + Sync + 'static {
    /// Begin background work. May never complete.
    fn setup(self: Arc<Self>) -> ExtensionFuture;

    /// Release resources acquired in `setup`.
    fn cleanup(self: Arc<Self>) -> ExtensionFuture;
}

/// Named set of extensions driven as one unit.
#[derive(Default)]
pub struct ExtensionManager {
    extensions: BTreeMap<String, Arc<dyn Extension>>,
    cleaned_up: AtomicBool,
}

impl ExtensionManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an extension under `name`, returning any extension it replaces.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        extension: Arc<dyn Extension>,
    ) -> Option<Arc<dyn Extension>> {
        self.extensions.insert(name.into(), extension)
    }

    /// Registered names, in cleanup order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.extensions.keys().map(String::as_str)
    }

    /// Number of registered extensions.
    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    /// Whether no extension is registered.
    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    /// Whether `cleanup` has already run.
    pub fn is_cleaned_up(&self) -> bool {
        self.cleaned_up.load(Ordering::SeqCst)
    }

    /// Run every `setup` concurrently and wait for all of them.
    ///
    /// Failures are logged per extension. Dropping the returned future
    /// aborts the setups still running.
    pub async fn setup(&self) {
        let mut tasks = JoinSet::new();

        for (name, extension) in &self.extensions {
            let name = name.clone();
            let setup = extension.clone().setup();
            debug!("Starting extension {}", name);
            tasks.spawn(async move { (name, setup.await) });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, Ok(()))) => debug!("Extension {} setup finished", name),
                Ok((name, Err(e))) => warn!("Extension {} setup failed: {:#}", name, e),
                Err(e) if e.is_cancelled() => {}
                Err(e) => warn!("Extension setup task panicked: {}", e),
            }
        }
    }

    /// Run every `cleanup` once, in name order.
    ///
    /// Returns `false` if cleanup had already run.
    pub async fn cleanup(&self) -> bool {
        if self.cleaned_up.swap(true, Ordering::SeqCst) {
            debug!("Extension cleanup already ran");
            return false;
        }

        for (name, extension) in &self.extensions {
            info!("Cleaning up extension {}", name);
            if let Err(e) = extension.clone().cleanup().await {
                warn!("Extension {} cleanup failed: {:#}", name, e);
            }
        }

        true
    }
}

impl fmt::Debug for ExtensionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionManager")
            .field("extensions", &self.extensions.keys().collect::<Vec<_>>())
            .field("cleaned_up", &self.is_cleaned_up())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Barrier;

    /// Records hook calls into a shared log.
    struct Recording {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        barrier: Option<Arc<Barrier>>,
        fail_setup: bool,
    }

    impl Recording {
        fn new(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                name,
                log: log.clone(),
                barrier: None,
                fail_setup: false,
            }
        }
    }

    impl Extension for Recording {
        fn setup(self: Arc<Self>) -> ExtensionFuture {
            Box::pin(async move {
                if let Some(barrier) = &self.barrier {
                    barrier.wait().await;
                }
                self.log.lock().unwrap().push(format!("setup:{}", self.name));
                if self.fail_setup {
                    anyhow::bail!("setup refused");
                }
                Ok(())
            })
        }

        fn cleanup(self: Arc<Self>) -> ExtensionFuture {
            Box::pin(async move {
                self.log.lock().unwrap().push(format!("cleanup:{}", self.name));
                Ok(())
            })
        }
    }

    #[tokio::test]
    async fn test_setups_run_concurrently() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let barrier = Arc::new(Barrier::new(2));

        let mut manager = ExtensionManager::new();
        for name in ["a", "b"] {
            let mut ext = Recording::new(name, &log);
            ext.barrier = Some(barrier.clone());
            manager.register(name, Arc::new(ext));
        }

        // Sequential setups would wait on the barrier forever
        tokio::time::timeout(Duration::from_secs(5), manager.setup())
            .await
            .unwrap();
        assert_eq!(log.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_setup_failure_does_not_stop_others() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut failing = Recording::new("bad", &log);
        failing.fail_setup = true;

        let mut manager = ExtensionManager::new();
        manager.register("bad", Arc::new(failing));
        manager.register("good", Arc::new(Recording::new("good", &log)));

        manager.setup().await;

        let mut entries = log.lock().unwrap().clone();
        entries.sort();
        assert_eq!(entries, vec!["setup:bad", "setup:good"]);
    }

    #[tokio::test]
    async fn test_cleanup_runs_once_in_name_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = ExtensionManager::new();
        manager.register("zeta", Arc::new(Recording::new("zeta", &log)));
        manager.register("alpha", Arc::new(Recording::new("alpha", &log)));

        assert!(manager.cleanup().await);
        assert!(!manager.cleanup().await);
        assert!(manager.is_cleaned_up());

        assert_eq!(
            *log.lock().unwrap(),
            vec!["cleanup:alpha".to_string(), "cleanup:zeta".to_string()]
        );
    }

    #[test]
    fn test_register_replaces() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = ExtensionManager::new();
        assert!(manager.register("x", Arc::new(Recording::new("x", &log))).is_none());
        assert!(manager.register("x", Arc::new(Recording::new("x2", &log))).is_some());
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.names().collect::<Vec<_>>(), vec!["x"]);
    }
}
