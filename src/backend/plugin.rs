//! User-supplied backends, looked up by URI scheme.

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

use ahash::AHashMap;
use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::backend::{Backend, BackendKind, BackendStats, closed_error};
use crate::errors::{OmniError, Result};

/// The capability set a pluggable sink implements.
pub trait Plugin: Send {
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    /// Apply key/value options before first use.
    fn configure(&mut self, options: &BTreeMap<String, String>) -> Result<()> {
        let _ = options;
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    fn flush(&mut self) -> io::Result<()>;

    fn sync(&mut self) -> io::Result<()> {
        self.flush()
    }

    fn close(&mut self) -> io::Result<()>;

    fn supports_atomic(&self) -> bool {
        false
    }
}

/// Builds plugin instances for one URI scheme.
pub trait PluginFactory: Send + Sync {
    /// The scheme this factory serves, e.g. "kafka".
    fn scheme(&self) -> &str;

    /// Create a plugin for a full destination URI.
    fn create(&self, uri: &str) -> Result<Box<dyn Plugin>>;
}

/// Scheme → factory mapping. The logger takes one at construction; a
/// process-wide registry is available as an opt-in convenience.
#[derive(Default)]
pub struct PluginRegistry {
    factories: RwLock<AHashMap<String, Arc<dyn PluginFactory>>>,
}

impl PluginRegistry {
    pub fn new() -> PluginRegistry {
        PluginRegistry::default()
    }

    /// Register a factory under its scheme, replacing any previous one.
    pub fn register(&self, factory: Arc<dyn PluginFactory>) {
        self.factories
            .write()
            .insert(factory.scheme().to_string(), factory);
    }

    pub fn unregister(&self, scheme: &str) -> bool {
        self.factories.write().remove(scheme).is_some()
    }

    pub fn schemes(&self) -> Vec<String> {
        self.factories.read().keys().cloned().collect()
    }

    pub(crate) fn create(&self, scheme: &str, uri: &str) -> Result<Box<dyn Plugin>> {
        let factory = self
            .factories
            .read()
            .get(scheme)
            .cloned()
            .ok_or_else(|| {
                OmniError::ConfigInvalid(format!("no plugin registered for scheme '{}'", scheme))
            })?;
        factory.create(uri)
    }
}

static GLOBAL_REGISTRY: Lazy<Arc<PluginRegistry>> = Lazy::new(|| Arc::new(PluginRegistry::new()));

/// The opt-in process-wide registry.
pub fn global_registry() -> Arc<PluginRegistry> {
    GLOBAL_REGISTRY.clone()
}

/// Adapts a [`Plugin`] to the internal [`Backend`] interface.
pub(crate) struct PluginBackend {
    plugin: Option<Box<dyn Plugin>>,
    stats: BackendStats,
}

impl PluginBackend {
    pub(crate) fn new(plugin: Box<dyn Plugin>) -> PluginBackend {
        PluginBackend {
            plugin: Some(plugin),
            stats: BackendStats::default(),
        }
    }
}

impl Backend for PluginBackend {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let Some(plugin) = self.plugin.as_mut() else {
            self.stats.record_error();
            return Err(closed_error());
        };
        match plugin.write(buf) {
            Ok(n) => {
                self.stats.record_write(n as u64);
                Ok(n)
            }
            Err(e) => {
                self.stats.record_error();
                Err(e)
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.plugin.as_mut() {
            Some(plugin) => plugin.flush(),
            None => Ok(()),
        }
    }

    fn sync(&mut self) -> io::Result<()> {
        match self.plugin.as_mut() {
            Some(plugin) => plugin.sync(),
            None => Ok(()),
        }
    }

    fn close(&mut self) -> io::Result<()> {
        if let Some(mut plugin) = self.plugin.take() {
            plugin.close()?;
        }
        Ok(())
    }

    fn supports_atomic(&self) -> bool {
        self.plugin
            .as_ref()
            .map(|p| p.supports_atomic())
            .unwrap_or(false)
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Plugin
    }

    fn stats(&self) -> BackendStats {
        self.stats
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use parking_lot::Mutex;

    /// Collects written lines in memory; shared so tests can inspect them.
    pub(crate) struct MemoryPlugin {
        pub(crate) lines: Arc<Mutex<Vec<Vec<u8>>>>,
        pub(crate) fail_writes: bool,
    }

    impl Plugin for MemoryPlugin {
        fn name(&self) -> &str {
            "memory"
        }

        fn version(&self) -> &str {
            "1.0"
        }

        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.fail_writes {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "memory sink down"));
            }
            self.lines.lock().push(buf.to_vec());
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }

        fn close(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    pub(crate) struct MemoryFactory {
        pub(crate) lines: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl PluginFactory for MemoryFactory {
        fn scheme(&self) -> &str {
            "memory"
        }

        fn create(&self, _uri: &str) -> Result<Box<dyn Plugin>> {
            Ok(Box::new(MemoryPlugin {
                lines: self.lines.clone(),
                fail_writes: false,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_registry_lookup() {
        let registry = PluginRegistry::new();
        let lines = Arc::new(Mutex::new(Vec::new()));
        registry.register(Arc::new(MemoryFactory { lines }));

        assert!(registry.create("memory", "memory://sink").is_ok());
        assert!(matches!(
            registry.create("unknown", "unknown://x"),
            Err(OmniError::ConfigInvalid(_))
        ));
        assert_eq!(registry.schemes(), vec!["memory".to_string()]);
        assert!(registry.unregister("memory"));
        assert!(!registry.unregister("memory"));
    }

    #[test]
    fn test_global_registry_is_shared() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        global_registry().register(Arc::new(MemoryFactory { lines }));
        assert!(global_registry().create("memory", "memory://global").is_ok());
        assert!(global_registry().unregister("memory"));
    }

    #[test]
    fn test_backend_adapter_delegates() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let mut backend = PluginBackend::new(Box::new(MemoryPlugin {
            lines: lines.clone(),
            fail_writes: false,
        }));
        backend.write(b"hello\n").unwrap();
        backend.flush().unwrap();
        assert_eq!(lines.lock().len(), 1);
        assert_eq!(backend.stats().writes, 1);

        backend.close().unwrap();
        backend.close().unwrap();
        assert!(backend.write(b"x").is_err());
    }

    #[test]
    fn test_adapter_counts_errors() {
        let mut backend = PluginBackend::new(Box::new(MemoryPlugin {
            lines: Arc::new(Mutex::new(Vec::new())),
            fail_writes: true,
        }));
        assert!(backend.write(b"x").is_err());
        assert_eq!(backend.stats().errors, 1);
    }
}
