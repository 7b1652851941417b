//! Platform registry
//!
//! Maps each [`Platform`] to the adapter that serves it. Platforms without a
//! configuration section are simply never registered. Lookups happen from
//! every job concurrently, so the map sits behind an `RwLock`.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{ConfigError, Result};
use crate::platforms::instagram::InstagramAdapter;
use crate::platforms::tiktok::TikTokAdapter;
use crate::platforms::x::XAdapter;
use crate::platforms::{validate_adapter, PlatformAdapter};
use crate::types::Platform;

#[derive(Clone, Default)]
pub struct PlatformRegistry {
    adapters: Arc<RwLock<HashMap<Platform, Arc<dyn PlatformAdapter>>>>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter for each platform section present in `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        let registry = Self::new();

        if let Some(tiktok) = &config.tiktok {
            registry.register(Arc::new(TikTokAdapter::new(tiktok.clone())?))?;
        }
        if let Some(x) = &config.x {
            registry.register(Arc::new(XAdapter::new(x.clone())?))?;
        }
        if let Some(instagram) = &config.instagram {
            registry.register(Arc::new(InstagramAdapter::new(instagram.clone())?))?;
        }

        info!(platforms = ?registry.platforms(), "Platform registry initialized");
        Ok(registry)
    }

    /// Add or replace the adapter for its platform.
    ///
    /// # Errors
    ///
    /// `ConfigError::InvalidAdapter` if the adapter's capability description
    /// is unusable.
    pub fn register(&self, adapter: Arc<dyn PlatformAdapter>) -> Result<()> {
        validate_adapter(adapter.as_ref()).map_err(ConfigError::InvalidAdapter)?;

        let platform = adapter.platform();
        let mut adapters = self.adapters.write().unwrap_or_else(|e| e.into_inner());
        if adapters.insert(platform, adapter).is_some() {
            debug!(%platform, "Replaced platform adapter");
        }
        Ok(())
    }

    pub fn get(&self, platform: Platform) -> Option<Arc<dyn PlatformAdapter>> {
        let adapters = self.adapters.read().unwrap_or_else(|e| e.into_inner());
        adapters.get(&platform).cloned()
    }

    pub fn unregister(&self, platform: Platform) -> bool {
        let mut adapters = self.adapters.write().unwrap_or_else(|e| e.into_inner());
        adapters.remove(&platform).is_some()
    }

    pub fn is_registered(&self, platform: Platform) -> bool {
        let adapters = self.adapters.read().unwrap_or_else(|e| e.into_inner());
        adapters.contains_key(&platform)
    }

    /// Registered platforms in a stable order
    pub fn platforms(&self) -> Vec<Platform> {
        let adapters = self.adapters.read().unwrap_or_else(|e| e.into_inner());
        let mut platforms: Vec<Platform> = adapters.keys().copied().collect();
        platforms.sort();
        platforms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PolycastError;
    use crate::platforms::mock::MockAdapter;

    #[test]
    fn test_register_and_lookup() {
        let registry = PlatformRegistry::new();
        registry
            .register(Arc::new(MockAdapter::synchronous(Platform::X)))
            .unwrap();

        assert!(registry.is_registered(Platform::X));
        assert!(!registry.is_registered(Platform::TikTok));
        assert_eq!(registry.get(Platform::X).unwrap().platform(), Platform::X);
        assert!(registry.get(Platform::Instagram).is_none());
    }

    #[test]
    fn test_register_rejects_invalid_adapter() {
        let registry = PlatformRegistry::new();
        let result = registry.register(Arc::new(
            MockAdapter::synchronous(Platform::X).with_scopes(vec![]),
        ));

        assert!(matches!(
            result,
            Err(PolycastError::Config(ConfigError::InvalidAdapter(_)))
        ));
        assert!(!registry.is_registered(Platform::X));
    }

    #[test]
    fn test_unregister() {
        let registry = PlatformRegistry::new();
        registry
            .register(Arc::new(MockAdapter::polled(Platform::TikTok)))
            .unwrap();

        assert!(registry.unregister(Platform::TikTok));
        assert!(!registry.unregister(Platform::TikTok));
        assert!(registry.platforms().is_empty());
    }

    #[test]
    fn test_clones_share_state() {
        let registry = PlatformRegistry::new();
        let clone = registry.clone();
        registry
            .register(Arc::new(MockAdapter::synchronous(Platform::Instagram)))
            .unwrap();
        assert!(clone.is_registered(Platform::Instagram));
    }

    #[test]
    fn test_from_config_registers_only_configured_platforms() {
        let config = Config::from_toml(
            r#"
            [database]
            path = "/tmp/polycast.db"

            [tiktok]
            client_key = "key"
            client_secret = "secret"
            redirect_uri = "https://example.com/cb/tiktok"

            [x]
            client_id = "id"
            client_secret = "secret"
            redirect_uri = "https://example.com/cb/x"
            "#,
        )
        .unwrap();

        let registry = PlatformRegistry::from_config(&config).unwrap();
        assert_eq!(registry.platforms(), vec![Platform::TikTok, Platform::X]);
    }

    #[test]
    fn test_concurrent_lookups() {
        let registry = PlatformRegistry::new();
        registry
            .register(Arc::new(MockAdapter::synchronous(Platform::X)))
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.get(Platform::X).is_some())
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap());
        }
    }
}
