//! Provider Registry
//!
//! Maps a drive's backend type tag to a factory producing a
//! [`CloudProvider`] client from a credential reference. Backends register
//! at process init; dispatch is by tag, no inheritance required.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ProviderError, Result};
use crate::provider::CloudProvider;

/// Factory producing a client from an opaque credential reference.
pub type ProviderFactory =
    Arc<dyn Fn(&str) -> Result<Arc<dyn CloudProvider>> + Send + Sync>;

/// Registry of backend factories keyed by type tag.
///
/// Construct one at startup, register every compiled-in backend, then share
/// it behind an `Arc`. Registration after startup is supported but the
/// registry is read-mostly.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: std::sync::RwLock<HashMap<String, ProviderFactory>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend factory under `backend` tag, replacing any
    /// previous registration for the same tag.
    pub fn register<F>(&self, backend: &str, factory: F)
    where
        F: Fn(&str) -> Result<Arc<dyn CloudProvider>> + Send + Sync + 'static,
    {
        let mut factories = self
            .factories
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        factories.insert(backend.to_string(), Arc::new(factory));
    }

    /// Build a client for `backend` from `credential_ref`.
    pub fn create(&self, backend: &str, credential_ref: &str) -> Result<Arc<dyn CloudProvider>> {
        let factory = {
            let factories = self
                .factories
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            factories.get(backend).cloned()
        };
        match factory {
            Some(factory) => factory(credential_ref),
            None => Err(ProviderError::NotSupported(format!(
                "no provider registered for backend '{backend}'"
            ))),
        }
    }

    /// Registered backend tags, for diagnostics.
    pub fn backends(&self) -> Vec<String> {
        let factories = self
            .factories
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        factories.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventPage;
    use crate::provider::{FileListing, RemoteEntry};
    use async_trait::async_trait;

    struct NullProvider;

    #[async_trait]
    impl CloudProvider for NullProvider {
        async fn list_files(&self, _: &str, _: u32, _: u64) -> Result<FileListing> {
            Ok(FileListing::default())
        }

        async fn search_files(&self, _: &str, _: &str) -> Result<Vec<RemoteEntry>> {
            Ok(Vec::new())
        }

        async fn get_download_identifier(&self, file_id: &str) -> Result<String> {
            Ok(file_id.to_string())
        }

        async fn validate_credential(&self) -> Result<bool> {
            Ok(true)
        }

        async fn get_events(&self, cursor: i64, _: u32) -> Result<EventPage> {
            Ok(EventPage {
                events: Vec::new(),
                next_cursor: cursor,
                has_more: false,
            })
        }
    }

    #[test]
    fn create_dispatches_by_tag() {
        let registry = ProviderRegistry::new();
        registry.register("null", |_cred| Ok(Arc::new(NullProvider) as Arc<dyn CloudProvider>));

        assert!(registry.create("null", "cred-ref").is_ok());
        assert!(matches!(
            registry.create("unknown", "cred-ref"),
            Err(ProviderError::NotSupported(_))
        ));
    }

    #[test]
    fn register_replaces_existing() {
        let registry = ProviderRegistry::new();
        registry.register("null", |_| Ok(Arc::new(NullProvider) as Arc<dyn CloudProvider>));
        registry.register("null", |_| {
            Err(ProviderError::Unavailable("down".to_string()))
        });

        assert!(registry.create("null", "cred-ref").is_err());
        assert_eq!(registry.backends(), vec!["null".to_string()]);
    }
}
