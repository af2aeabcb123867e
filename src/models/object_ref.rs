//! Image references held by a product.

use crate::images::extract::extract_storage_key;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier used to address an asset in the object store.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageKey(String);

impl StorageKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A stored asset, addressed by its public URL.
///
/// The storage key is not persisted; it is re-derived from the URL each
/// time it is needed.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectRef {
    url: String,
}

impl ObjectRef {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn storage_key(&self) -> Option<StorageKey> {
        extract_storage_key(&self.url)
    }
}

/// The image-bearing part of a product: optional cover plus ordered gallery.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImageState {
    pub cover_image: Option<ObjectRef>,
    pub images: Vec<ObjectRef>,
}

impl ImageState {
    /// Every reference held, cover first.
    pub fn all_refs(&self) -> impl Iterator<Item = &ObjectRef> {
        self.cover_image.iter().chain(self.images.iter())
    }
}
