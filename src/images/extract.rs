//! Derive a storage key from a public asset URL.
//!
//! The key is `<folder>/<stem>` where `<folder>` is the path segment right
//! before the file name, or just `<stem>` when the file sits at the root of
//! the path. Scheme, authority, query and fragment never contribute.

use crate::models::object_ref::StorageKey;

/// Best-effort inference of the storage key for `url`.
///
/// Returns `None` for empty input, a missing file extension, or an empty
/// file stem. Callers skip such URLs rather than failing the operation.
pub fn extract_storage_key(url: &str) -> Option<StorageKey> {
    let url = url.trim();
    if url.is_empty() {
        return None;
    }

    let path = strip_query_and_fragment(strip_authority(url));
    let mut segments = path.split('/');
    let file_name = segments.next_back()?;

    let (stem, _ext) = file_name.split_once('.')?;
    if stem.is_empty() {
        return None;
    }

    match segments.next_back() {
        Some(folder) if !folder.is_empty() => Some(StorageKey::new(format!("{folder}/{stem}"))),
        _ => Some(StorageKey::new(stem)),
    }
}

/// Drop `scheme://authority` so the host is never mistaken for a folder.
fn strip_authority(url: &str) -> &str {
    match url.split_once("://") {
        Some((_, rest)) => match rest.find('/') {
            Some(pos) => &rest[pos + 1..],
            None => "",
        },
        None => url,
    }
}

fn strip_query_and_fragment(path: &str) -> &str {
    match path.find(['?', '#']) {
        Some(pos) => &path[..pos],
        None => path,
    }
}
