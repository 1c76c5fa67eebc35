//! Asset Handle - caller-side reference to an entry
//!
//! Handles never own the payload. Every access goes back through the
//! entry, so a handle stays valid across failures, reloads and eviction.

use crate::asset::{Asset, TypeTag};
use crate::entry::{DependencyRef, LoadState, ResourceEntry};
use crate::error::{LoadError, StreamError, StreamResult};
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;
use std::sync::{Arc, Weak};

/// Strong handle to an asset of type `T`
pub struct Handle<T: Asset> {
    entry: Arc<ResourceEntry>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Asset> Handle<T> {
    pub(crate) fn new(entry: Arc<ResourceEntry>) -> Self {
        debug_assert!(entry.tag().is::<T>());
        Self::attach(entry)
    }

    fn attach(entry: Arc<ResourceEntry>) -> Self {
        entry.handle_acquired();
        Self {
            entry,
            _marker: PhantomData,
        }
    }

    pub(crate) fn entry(&self) -> &Arc<ResourceEntry> {
        &self.entry
    }

    /// Current payload if the asset is ready, otherwise `None`.
    ///
    /// Never blocks beyond the entry's own lock.
    ///
    /// # Panics
    /// If the entry holds a different asset type than `T`.
    pub fn retrieve(&self) -> Option<Arc<T>> {
        let payload = self.entry.retrieve()?;
        Some(self.downcast(payload))
    }

    /// Payload of the most recent successful load.
    ///
    /// Unlike `retrieve`, this keeps returning the previous payload while a
    /// reload is in flight.
    pub fn last_ready(&self) -> Option<Arc<T>> {
        let payload = self.entry.last_ready()?;
        Some(self.downcast(payload))
    }

    fn downcast(&self, payload: crate::asset::ErasedAsset) -> Arc<T> {
        let expected = TypeTag::of::<T>();
        match payload.downcast::<T>() {
            Ok(asset) => asset,
            Err(_) => panic!(
                "asset type mismatch for '{}': handle expects {}, entry holds {}",
                self.entry.key(),
                expected,
                self.entry.tag()
            ),
        }
    }

    /// Key the asset was requested under
    pub fn key(&self) -> &str {
        self.entry.key()
    }

    /// Current load state
    pub fn state(&self) -> LoadState {
        self.entry.state()
    }

    /// Check if the asset is ready
    pub fn is_ready(&self) -> bool {
        self.state() == LoadState::Ready
    }

    /// Increments on every completed successful load
    pub fn generation(&self) -> u32 {
        self.entry.generation()
    }

    /// Reason of the last failed attempt
    pub fn failure(&self) -> Option<LoadError> {
        self.entry.failure()
    }

    /// Dependencies requested by the last completed load
    pub fn dependencies(&self) -> Vec<DependencyRef> {
        self.entry.dependencies()
    }

    /// Number of strong references to the entry, including the table's
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.entry)
    }

    /// Number of handles to the entry, typed or untyped
    pub fn handle_count(&self) -> usize {
        self.entry.handle_count()
    }

    /// Create a weak handle
    pub fn downgrade(&self) -> WeakHandle<T> {
        WeakHandle {
            entry: Arc::downgrade(&self.entry),
            _marker: PhantomData,
        }
    }

    /// Erase the asset type
    pub fn untyped(&self) -> UntypedHandle {
        UntypedHandle::new(self.entry.clone())
    }

    /// Whether both handles point at the same entry
    pub fn same_entry(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.entry, &other.entry)
    }
}

impl<T: Asset> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self::attach(self.entry.clone())
    }
}

impl<T: Asset> Drop for Handle<T> {
    fn drop(&mut self) {
        self.entry.handle_released();
    }
}

impl<T: Asset> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.same_entry(other)
    }
}

impl<T: Asset> Eq for Handle<T> {}

impl<T: Asset> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.entry).hash(state);
    }
}

impl<T: Asset> core::fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Handle")
            .field("type", &T::TYPE_NAME)
            .field("key", &self.key())
            .field("state", &self.state())
            .field("generation", &self.generation())
            .finish()
    }
}

/// Weak handle to an asset
///
/// Does not keep the entry alive. Fails to upgrade once the entry has been
/// purged from its table and every strong handle is gone.
pub struct WeakHandle<T: Asset> {
    entry: Weak<ResourceEntry>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Asset> WeakHandle<T> {
    /// Upgrade to a strong handle if the entry still exists
    pub fn upgrade(&self) -> Option<Handle<T>> {
        self.entry.upgrade().map(Handle::new)
    }

    /// Check if the entry still exists
    pub fn is_alive(&self) -> bool {
        self.entry.strong_count() > 0
    }
}

impl<T: Asset> Clone for WeakHandle<T> {
    fn clone(&self) -> Self {
        Self {
            entry: self.entry.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Asset> Default for WeakHandle<T> {
    fn default() -> Self {
        Self {
            entry: Weak::new(),
            _marker: PhantomData,
        }
    }
}

/// Handle with the asset type erased
pub struct UntypedHandle {
    entry: Arc<ResourceEntry>,
}

impl UntypedHandle {
    fn new(entry: Arc<ResourceEntry>) -> Self {
        entry.handle_acquired();
        Self { entry }
    }

    pub(crate) fn entry(&self) -> &Arc<ResourceEntry> {
        &self.entry
    }

    /// Key the asset was requested under
    pub fn key(&self) -> &str {
        self.entry.key()
    }

    /// Type of the asset behind this handle
    pub fn tag(&self) -> TypeTag {
        self.entry.tag()
    }

    /// Current load state
    pub fn state(&self) -> LoadState {
        self.entry.state()
    }

    /// Increments on every completed successful load
    pub fn generation(&self) -> u32 {
        self.entry.generation()
    }

    /// Recover the typed handle, checking the stored type tag
    pub fn typed<T: Asset>(&self) -> StreamResult<Handle<T>> {
        let tag = self.entry.tag();
        if !tag.is::<T>() {
            return Err(StreamError::TypeMismatch {
                expected: T::TYPE_NAME.to_string(),
                found: tag.name().to_string(),
            });
        }
        Ok(Handle::new(self.entry.clone()))
    }
}

impl Clone for UntypedHandle {
    fn clone(&self) -> Self {
        Self::new(self.entry.clone())
    }
}

impl Drop for UntypedHandle {
    fn drop(&mut self) {
        self.entry.handle_released();
    }
}

impl PartialEq for UntypedHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.entry, &other.entry)
    }
}

impl Eq for UntypedHandle {}

impl Hash for UntypedHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.entry).hash(state);
    }
}

impl core::fmt::Debug for UntypedHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("UntypedHandle")
            .field("type", &self.tag())
            .field("key", &self.key())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct Font(u8);
    impl Asset for Font {
        const TYPE_NAME: &'static str = "Font";
    }

    struct Clip;
    impl Asset for Clip {
        const TYPE_NAME: &'static str = "Clip";
    }

    fn ready_entry(key: &str, value: u8) -> Arc<ResourceEntry> {
        let entry = Arc::new(ResourceEntry::new(key, TypeTag::of::<Font>()));
        let ticket = entry.begin_load().unwrap();
        entry
            .complete_ready(ticket, Arc::new(Font(value)), 1, Vec::new(), Duration::ZERO)
            .unwrap();
        entry
    }

    #[test]
    fn test_handle_basic() {
        let entry = Arc::new(ResourceEntry::new("mono.ttf", TypeTag::of::<Font>()));
        let handle: Handle<Font> = Handle::new(entry);

        assert_eq!(handle.key(), "mono.ttf");
        assert_eq!(handle.state(), LoadState::Unloaded);
        assert!(!handle.is_ready());
        assert!(handle.retrieve().is_none());
    }

    #[test]
    fn test_handle_retrieve() {
        let handle: Handle<Font> = Handle::new(ready_entry("mono.ttf", 12));
        assert!(handle.is_ready());
        assert_eq!(handle.retrieve().unwrap().0, 12);
        assert_eq!(handle.generation(), 1);
    }

    #[test]
    fn test_handle_clone() {
        let handle1: Handle<Font> = Handle::new(ready_entry("mono.ttf", 1));
        let handle2 = handle1.clone();

        assert_eq!(handle1, handle2);
        assert_eq!(handle1.ref_count(), 2);

        drop(handle2);
        assert_eq!(handle1.ref_count(), 1);
    }

    #[test]
    fn test_handle_count_ignores_other_holders() {
        let entry = ready_entry("mono.ttf", 1);
        let snapshot = entry.clone();
        assert_eq!(entry.handle_count(), 0);

        let handle: Handle<Font> = Handle::new(entry.clone());
        let untyped = handle.untyped();
        let weak = handle.downgrade();
        assert_eq!(handle.handle_count(), 2);

        drop(untyped);
        assert_eq!(handle.handle_count(), 1);

        drop(handle);
        assert_eq!(snapshot.handle_count(), 0);
        let upgraded = weak.upgrade().unwrap();
        assert_eq!(upgraded.handle_count(), 1);
    }

    #[test]
    fn test_weak_handle() {
        let handle: Handle<Font> = Handle::new(ready_entry("mono.ttf", 1));
        let weak = handle.downgrade();

        assert!(weak.is_alive());
        assert!(weak.upgrade().is_some());

        drop(handle);
        assert!(!weak.is_alive());
        assert!(weak.upgrade().is_none());
        assert!(!WeakHandle::<Font>::default().is_alive());
    }

    #[test]
    fn test_untyped_round_trip() {
        let handle: Handle<Font> = Handle::new(ready_entry("mono.ttf", 3));
        let untyped = handle.untyped();

        assert_eq!(untyped.tag().name(), "Font");
        assert_eq!(untyped.typed::<Font>().unwrap(), handle);

        let err = untyped.typed::<Clip>().unwrap_err();
        assert!(matches!(
            err,
            StreamError::TypeMismatch { ref expected, ref found } if expected == "Clip" && found == "Font"
        ));
    }

    #[test]
    #[should_panic(expected = "asset type mismatch")]
    fn test_retrieve_with_wrong_type_panics() {
        // Bypasses the tag check that UntypedHandle::typed performs
        let handle: Handle<Clip> = Handle::attach(ready_entry("mono.ttf", 1));
        let _ = handle.retrieve();
    }
}
