//! Asset trait and runtime type tags

use core::any::TypeId;
use core::fmt;
use core::hash::{Hash, Hasher};
use std::any::Any;
use std::sync::Arc;

/// A decoded, in-memory resource
pub trait Asset: Send + Sync + 'static {
    /// Name of the resource type namespace ("Image", "Mesh", ...)
    const TYPE_NAME: &'static str;

    /// Estimated memory footprint, used for budget eviction and stats
    fn byte_size(&self) -> usize {
        core::mem::size_of_val(self)
    }
}

/// Shared, type-erased payload stored in an entry
pub type ErasedAsset = Arc<dyn Any + Send + Sync>;

/// Runtime identifier of an asset type
#[derive(Clone, Copy)]
pub struct TypeTag {
    id: TypeId,
    name: &'static str,
}

impl TypeTag {
    /// Tag for a concrete asset type
    pub fn of<T: Asset>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: T::TYPE_NAME,
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether this tag identifies `T`
    pub fn is<T: Asset>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl PartialEq for TypeTag {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeTag {}

impl Hash for TypeTag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypeTag").field(&self.name).finish()
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
