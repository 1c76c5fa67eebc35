//! Built-in file-backed loaders
//!
//! Keys are paths relative to the loader's root directory.

use crate::asset::Asset;
use crate::context::RequestContext;
use crate::error::{LoadError, LoadResult};
use crate::loader::AssetLoader;
use std::path::{Component, Path, PathBuf};

/// Raw bytes asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bytes(pub Vec<u8>);

impl Asset for Bytes {
    const TYPE_NAME: &'static str = "Bytes";

    fn byte_size(&self) -> usize {
        self.0.len()
    }
}

/// UTF-8 text asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Text(pub String);

impl Asset for Text {
    const TYPE_NAME: &'static str = "Text";

    fn byte_size(&self) -> usize {
        self.0.len()
    }
}

fn resolve(root: &Path, key: &str) -> LoadResult<PathBuf> {
    let relative = Path::new(key);
    let escapes = relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(LoadError::NotFound(format!(
            "'{}' is outside the asset root",
            key
        )));
    }
    Ok(root.join(relative))
}

/// Reads `root/key` as bytes
#[derive(Debug, Clone)]
pub struct BytesLoader {
    root: PathBuf,
}

impl BytesLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl AssetLoader for BytesLoader {
    type Asset = Bytes;

    fn load(&self, _ctx: &mut RequestContext<'_>, key: &str) -> LoadResult<Bytes> {
        let path = resolve(&self.root, key)?;
        Ok(Bytes(std::fs::read(path)?))
    }
}

/// Reads `root/key` as UTF-8 text
#[derive(Debug, Clone)]
pub struct TextLoader {
    root: PathBuf,
}

impl TextLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl AssetLoader for TextLoader {
    type Asset = Text;

    fn load(&self, _ctx: &mut RequestContext<'_>, key: &str) -> LoadResult<Text> {
        let path = resolve(&self.root, key)?;
        let bytes = std::fs::read(path)?;
        String::from_utf8(bytes)
            .map(Text)
            .map_err(|e| LoadError::Parse(format!("'{}' is not valid UTF-8: {}", key, e)))
    }
}
