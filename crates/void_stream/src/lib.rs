//! # void_stream - Asset Streaming
//!
//! On-demand loading of typed resources by key:
//! - Loaders registered per asset type before the first request
//! - Exactly one load per key, no matter how many concurrent requesters
//! - Non-blocking handles that observe `Unloaded → Loading → Ready | Failed`
//! - Dependencies requested from inside a loader through the same path
//! - Idle, memory-budget and reference-count eviction on `tick`
//!
//! ## Example
//!
//! ```ignore
//! use void_stream::prelude::*;
//!
//! let mut manager = StreamingManager::spawn(StreamingConfig::default())?;
//! manager.register_loader(TextLoader::new("assets"))?;
//!
//! let readme: Handle<Text> = manager.request("readme.txt", LoadMode::Async)?;
//!
//! // Later, once per frame
//! if let Some(text) = readme.retrieve() {
//!     println!("{}", text.0);
//! }
//! manager.tick(std::time::Instant::now());
//! ```

pub mod asset;
pub mod config;
pub mod context;
pub mod entry;
pub mod error;
pub mod event;
pub mod handle;
pub mod loader;
pub mod loaders;
pub mod manager;
pub mod table;

pub use asset::{Asset, ErasedAsset, TypeTag};
pub use config::StreamingConfig;
pub use context::{LoadMode, RequestContext};
pub use entry::{DependencyRef, LoadState, ResourceEntry};
pub use error::{ConfigError, ConfigResult, LoadError, LoadResult, StreamError, StreamResult};
pub use event::{DiagnosticSink, EventQueue, EvictReason, LogSink, StreamEvent};
pub use handle::{Handle, UntypedHandle, WeakHandle};
pub use loader::{AssetLoader, ErasedLoader, FnLoader, LoadedAsset, LoaderRegistry};
pub use manager::{StreamStats, StreamingManager, TickReport};
pub use table::ResourceTable;

pub use void_jobs::{InlineScheduler, ScheduleError, Scheduler, WorkerPool, WorkerPoolConfig};

use std::sync::Arc;

/// Prelude - commonly used types
pub mod prelude {
    pub use crate::asset::Asset;
    pub use crate::config::StreamingConfig;
    pub use crate::context::{LoadMode, RequestContext};
    pub use crate::entry::LoadState;
    pub use crate::error::{LoadError, LoadResult, StreamError, StreamResult};
    pub use crate::handle::{Handle, UntypedHandle, WeakHandle};
    pub use crate::loader::AssetLoader;
    pub use crate::loaders::{Bytes, BytesLoader, Text, TextLoader};
    pub use crate::manager::StreamingManager;
    pub use crate::AssetRef;
}

/// Asset reference for embedding in components
///
/// Holds the key and requests the handle the first time it is resolved.
pub struct AssetRef<T: Asset> {
    key: Option<String>,
    handle: Option<Handle<T>>,
}

impl<T: Asset> AssetRef<T> {
    /// Create an empty asset reference
    pub fn empty() -> Self {
        Self {
            key: None,
            handle: None,
        }
    }

    /// Create from a key (not yet requested)
    pub fn from_key(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            handle: None,
        }
    }

    /// Create from an existing handle
    pub fn from_handle(handle: Handle<T>) -> Self {
        Self {
            key: Some(handle.key().to_string()),
            handle: Some(handle),
        }
    }

    /// Get the key
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Get the handle, if resolved
    pub fn handle(&self) -> Option<&Handle<T>> {
        self.handle.as_ref()
    }

    /// Request the asset if that hasn't happened yet.
    ///
    /// Returns `Ok(None)` for an empty reference.
    pub fn resolve(
        &mut self,
        manager: &StreamingManager,
        mode: LoadMode,
    ) -> StreamResult<Option<&Handle<T>>> {
        if self.handle.is_none() {
            if let Some(key) = &self.key {
                self.handle = Some(manager.request::<T>(key, mode)?);
            }
        }
        Ok(self.handle.as_ref())
    }

    /// Payload if resolved and ready
    pub fn get(&self) -> Option<Arc<T>> {
        self.handle.as_ref().and_then(Handle::retrieve)
    }

    /// Check if resolved and ready
    pub fn is_ready(&self) -> bool {
        self.handle.as_ref().is_some_and(Handle::is_ready)
    }
}

impl<T: Asset> Clone for AssetRef<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            handle: self.handle.clone(),
        }
    }
}

impl<T: Asset> Default for AssetRef<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: Asset> core::fmt::Debug for AssetRef<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AssetRef")
            .field("key", &self.key)
            .field("ready", &self.is_ready())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> StreamingManager {
        let mut manager = StreamingManager::new(
            StreamingConfig::default(),
            Arc::new(InlineScheduler::new()),
        );
        manager
            .register_fn(|_ctx, key| Ok(loaders::Text(format!("text of {}", key))))
            .unwrap();
        manager
    }

    #[test]
    fn test_asset_ref() {
        let asset_ref: AssetRef<loaders::Text> = AssetRef::from_key("test.txt");
        assert!(!asset_ref.is_ready());
        assert!(asset_ref.handle().is_none());
        assert_eq!(asset_ref.key(), Some("test.txt"));
    }

    #[test]
    fn test_asset_ref_resolve() {
        let manager = manager();
        let mut asset_ref: AssetRef<loaders::Text> = AssetRef::from_key("intro.txt");

        let handle = asset_ref.resolve(&manager, LoadMode::Sync).unwrap().cloned();
        assert!(handle.is_some());
        assert!(asset_ref.is_ready());
        assert_eq!(asset_ref.get().unwrap().0, "text of intro.txt");

        // Resolving again reuses the handle
        asset_ref.resolve(&manager, LoadMode::Sync).unwrap();
        assert_eq!(manager.stats().loads_started, 1);
    }

    #[test]
    fn test_empty_asset_ref() {
        let manager = manager();
        let mut asset_ref: AssetRef<loaders::Text> = AssetRef::default();
        assert!(asset_ref.resolve(&manager, LoadMode::Sync).unwrap().is_none());
        assert_eq!(manager.entry_count::<loaders::Text>(), 0);
    }
}
