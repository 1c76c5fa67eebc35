//! Asset Loader - pluggable loading functions keyed by asset type
//!
//! The registry is filled before any request is issued and only read
//! afterwards, so lookups need no locking.

use crate::asset::{Asset, ErasedAsset, TypeTag};
use crate::context::RequestContext;
use crate::error::{LoadResult, StreamError, StreamResult};
use core::any::TypeId;
use core::marker::PhantomData;
use std::collections::HashMap;
use std::sync::Arc;

/// Output of a loader, erased for storage
pub struct LoadedAsset {
    payload: ErasedAsset,
    byte_size: usize,
    tag: TypeTag,
}

impl LoadedAsset {
    /// Erase a decoded asset, capturing its size and type
    pub fn new<T: Asset>(asset: T) -> Self {
        let byte_size = asset.byte_size();
        Self {
            payload: Arc::new(asset),
            byte_size,
            tag: TypeTag::of::<T>(),
        }
    }

    /// Type of the contained asset
    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    pub fn byte_size(&self) -> usize {
        self.byte_size
    }

    pub(crate) fn into_parts(self) -> (ErasedAsset, usize) {
        (self.payload, self.byte_size)
    }
}

/// Trait for asset loaders
///
/// Called on worker threads, concurrently for different keys. The context
/// must not be retained past the call.
pub trait AssetLoader: Send + Sync + 'static {
    /// Asset type this loader produces
    type Asset: Asset;

    /// Turn a key into a decoded asset
    fn load(&self, ctx: &mut RequestContext<'_>, key: &str) -> LoadResult<Self::Asset>;
}

/// Type-erased asset loader
pub trait ErasedLoader: Send + Sync {
    /// Asset type this loader produces
    fn asset_tag(&self) -> TypeTag;

    /// Load an asset into erased storage
    fn load_erased(&self, ctx: &mut RequestContext<'_>, key: &str) -> LoadResult<LoadedAsset>;
}

impl<L: AssetLoader> ErasedLoader for L {
    fn asset_tag(&self) -> TypeTag {
        TypeTag::of::<L::Asset>()
    }

    fn load_erased(&self, ctx: &mut RequestContext<'_>, key: &str) -> LoadResult<LoadedAsset> {
        self.load(ctx, key).map(LoadedAsset::new)
    }
}

/// Adapter turning a closure into an `AssetLoader`
pub struct FnLoader<T, F> {
    f: F,
    _marker: PhantomData<fn() -> T>,
}

impl<T, F> FnLoader<T, F>
where
    T: Asset,
    F: Fn(&mut RequestContext<'_>, &str) -> LoadResult<T> + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

impl<T, F> AssetLoader for FnLoader<T, F>
where
    T: Asset,
    F: Fn(&mut RequestContext<'_>, &str) -> LoadResult<T> + Send + Sync + 'static,
{
    type Asset = T;

    fn load(&self, ctx: &mut RequestContext<'_>, key: &str) -> LoadResult<T> {
        (self.f)(ctx, key)
    }
}

/// Registry of asset loaders, one per asset type
#[derive(Default)]
pub struct LoaderRegistry {
    by_type: HashMap<TypeId, Arc<dyn ErasedLoader>>,
    by_name: HashMap<&'static str, TypeId>,
}

impl LoaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a loader. A type (or type name) can only be registered once.
    pub fn register<L: AssetLoader>(&mut self, loader: L) -> StreamResult<()> {
        self.register_erased(Arc::new(loader))
    }

    /// Register a closure as the loader for `T`
    pub fn register_fn<T, F>(&mut self, f: F) -> StreamResult<()>
    where
        T: Asset,
        F: Fn(&mut RequestContext<'_>, &str) -> LoadResult<T> + Send + Sync + 'static,
    {
        self.register(FnLoader::new(f))
    }

    /// Register an erased loader
    pub fn register_erased(&mut self, loader: Arc<dyn ErasedLoader>) -> StreamResult<()> {
        let tag = loader.asset_tag();
        if self.by_type.contains_key(&tag.id()) || self.by_name.contains_key(tag.name()) {
            return Err(StreamError::AlreadyRegistered(tag.name().to_string()));
        }

        log::debug!("Registered loader for {}", tag);
        self.by_name.insert(tag.name(), tag.id());
        self.by_type.insert(tag.id(), loader);
        Ok(())
    }

    /// Loader for a type
    pub fn get(&self, tag: TypeTag) -> Option<&Arc<dyn ErasedLoader>> {
        self.by_type.get(&tag.id())
    }

    pub fn contains<T: Asset>(&self) -> bool {
        self.by_type.contains_key(&TypeId::of::<T>())
    }

    /// Whether a loader is registered under a type name
    pub fn contains_name(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Tags of all registered types
    pub fn tags(&self) -> impl Iterator<Item = TypeTag> + '_ {
        self.by_type.values().map(|loader| loader.asset_tag())
    }

    pub fn len(&self) -> usize {
        self.by_type.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }
}

impl core::fmt::Debug for LoaderRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut names: Vec<_> = self.by_name.keys().collect();
        names.sort();
        f.debug_struct("LoaderRegistry").field("types", &names).finish()
    }
}
