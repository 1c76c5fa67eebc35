//! Request Context - what a loader sees while it runs
//!
//! Lets a loader request the assets it depends on through the same
//! request path, in a mode derived from its own.

use crate::asset::Asset;
use crate::entry::DependencyRef;
use crate::error::StreamResult;
use crate::handle::Handle;
use crate::manager::Shared;
use std::sync::Arc;

/// How a request propagates through the dependency chain
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LoadMode {
    /// Loader runs on a worker; the caller never blocks
    #[default]
    Async,
    /// Loader and every dependency it requests run on the calling thread
    Sync,
    /// Loader runs on the calling thread, its dependencies stream in async
    SyncDeferDependencies,
}

impl LoadMode {
    /// Mode used for dependencies requested from a loader running in `self`
    pub fn dependency_mode(self) -> LoadMode {
        match self {
            Self::Async => Self::Async,
            Self::Sync => Self::Sync,
            Self::SyncDeferDependencies => Self::Async,
        }
    }

    /// Whether the requesting thread runs the loader itself
    pub fn runs_inline(self) -> bool {
        !matches!(self, Self::Async)
    }
}

/// Passed to a loader for the duration of one call
pub struct RequestContext<'a> {
    shared: &'a Arc<Shared>,
    key: &'a str,
    mode: LoadMode,
    dependencies: Vec<DependencyRef>,
}

impl<'a> RequestContext<'a> {
    pub(crate) fn new(shared: &'a Arc<Shared>, key: &'a str, mode: LoadMode) -> Self {
        Self {
            shared,
            key,
            mode,
            dependencies: Vec::new(),
        }
    }

    /// Key of the asset being loaded
    pub fn key(&self) -> &str {
        self.key
    }

    /// Mode the current load runs in
    pub fn mode(&self) -> LoadMode {
        self.mode
    }

    /// Request a dependency.
    ///
    /// Goes through the normal request path, so a sub-asset shared by
    /// several parents is loaded once.
    pub fn request<T: Asset>(&mut self, key: &str) -> StreamResult<Handle<T>> {
        let handle = self.shared.request::<T>(key, self.mode.dependency_mode())?;

        let dependency = DependencyRef {
            type_name: T::TYPE_NAME,
            key: key.to_string(),
        };
        if !self.dependencies.contains(&dependency) {
            self.dependencies.push(dependency);
        }

        Ok(handle)
    }

    /// Dependencies requested so far
    pub fn dependencies(&self) -> &[DependencyRef] {
        &self.dependencies
    }

    pub(crate) fn into_dependencies(self) -> Vec<DependencyRef> {
        self.dependencies
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependency_mode() {
        assert_eq!(LoadMode::Async.dependency_mode(), LoadMode::Async);
        assert_eq!(LoadMode::Sync.dependency_mode(), LoadMode::Sync);
        assert_eq!(
            LoadMode::SyncDeferDependencies.dependency_mode(),
            LoadMode::Async
        );
    }

    #[test]
    fn test_runs_inline() {
        assert!(!LoadMode::Async.runs_inline());
        assert!(LoadMode::Sync.runs_inline());
        assert!(LoadMode::SyncDeferDependencies.runs_inline());
        assert_eq!(LoadMode::default(), LoadMode::Async);
    }
}
