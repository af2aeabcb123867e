//! Keeps a product's image references in step with the object store.
//!
//! Remote deletions are best-effort: every resolvable key is attempted
//! concurrently, one failure never stops the others, and no outcome is
//! turned into an error. The caller decides what to persist.

use crate::{
    images::gateway::{CleanupAttempt, CleanupReport, DeleteOutcome, DeletionGateway, GatewayError},
    models::object_ref::{ImageState, ObjectRef, StorageKey},
};
use futures::future::join_all;
use std::{collections::HashSet, sync::Arc, time::Duration};
use tracing::{debug, warn};

/// Requested change to a product's images.
#[derive(Clone, Debug, Default)]
pub struct ImageEdit {
    /// URLs the caller asked to remove.
    pub to_delete: Vec<String>,
    /// Freshly uploaded gallery images, in upload order.
    pub new_images: Vec<String>,
    /// Replacement cover, if one was uploaded.
    pub new_cover: Option<String>,
}

#[derive(Clone, Debug)]
pub struct EditOutcome {
    pub state: ImageState,
    pub cleanup: CleanupReport,
}

#[derive(Clone)]
pub struct ImageLifecycle {
    gateway: Arc<dyn DeletionGateway>,
    delete_timeout: Duration,
}

impl ImageLifecycle {
    /// `delete_timeout` bounds each individual remote delete.
    pub fn new(gateway: Arc<dyn DeletionGateway>, delete_timeout: Duration) -> Self {
        Self {
            gateway,
            delete_timeout,
        }
    }

    /// Initial image state for a new product. No remote calls.
    pub fn on_create(new_images: Vec<String>, new_cover: Option<String>) -> ImageState {
        ImageState {
            cover_image: new_cover.map(ObjectRef::new),
            images: new_images.into_iter().map(ObjectRef::new).collect(),
        }
    }

    /// Delete what the edit removes or replaces, then compute the new state.
    ///
    /// Retained gallery images keep their order and new images are appended
    /// in upload order. The cover only changes when a new one is uploaded or
    /// the current cover URL is listed in `to_delete`.
    pub async fn on_edit(&self, existing: &ImageState, edit: ImageEdit) -> EditOutcome {
        let ImageEdit {
            to_delete,
            new_images,
            new_cover,
        } = edit;

        let mut doomed: Vec<String> = to_delete.clone();
        if let (Some(new_cover), Some(old_cover)) = (&new_cover, &existing.cover_image) {
            if old_cover.url() != new_cover {
                doomed.push(old_cover.url().to_string());
            }
        }
        let cleanup = self.delete_urls(doomed).await;

        let removed: HashSet<&str> = to_delete.iter().map(|url| url.trim()).collect();
        let mut images: Vec<ObjectRef> = existing
            .images
            .iter()
            .filter(|img| !removed.contains(img.url()))
            .cloned()
            .collect();
        images.extend(new_images.into_iter().map(ObjectRef::new));

        let cover_image = match new_cover {
            Some(url) => Some(ObjectRef::new(url)),
            None => existing
                .cover_image
                .clone()
                .filter(|cover| !removed.contains(cover.url())),
        };

        EditOutcome {
            state: ImageState {
                cover_image,
                images,
            },
            cleanup,
        }
    }

    /// Delete the cover and every gallery image of a product being removed.
    pub async fn on_delete(&self, state: &ImageState) -> CleanupReport {
        let urls = state.all_refs().map(|r| r.url().to_string()).collect();
        self.delete_urls(urls).await
    }

    /// Fan out deletes for `urls`. Unresolvable URLs are skipped and
    /// URLs that resolve to the same key are deleted once.
    pub async fn delete_urls(&self, urls: Vec<String>) -> CleanupReport {
        let mut skipped = Vec::new();
        let mut targets = Vec::new();
        let mut seen = HashSet::new();

        for url in urls {
            match ObjectRef::new(url.as_str()).storage_key() {
                Some(key) => {
                    if seen.insert(key.clone()) {
                        targets.push((url, key));
                    }
                }
                None => {
                    warn!(url = %url, "skipping image url with no derivable storage key");
                    skipped.push(url);
                }
            }
        }

        let mut report = self.delete_keys(targets).await;
        report.skipped = skipped;
        report
    }

    /// Fan out deletes for already-resolved keys.
    pub async fn delete_keys(&self, targets: Vec<(String, StorageKey)>) -> CleanupReport {
        let attempts = join_all(
            targets
                .into_iter()
                .map(|(url, key)| self.delete_one(url, key)),
        )
        .await;

        CleanupReport {
            attempts,
            skipped: Vec::new(),
        }
    }

    async fn delete_one(&self, url: String, key: StorageKey) -> CleanupAttempt {
        let outcome = match tokio::time::timeout(self.delete_timeout, self.gateway.delete(&key))
            .await
        {
            Ok(Ok(())) => {
                debug!(key = %key, "deleted remote image");
                DeleteOutcome::Deleted
            }
            Ok(Err(GatewayError::NotFound(_))) => {
                debug!(key = %key, "remote image already absent");
                DeleteOutcome::AlreadyAbsent
            }
            Ok(Err(err @ GatewayError::InvalidKey(_))) => {
                warn!(key = %key, url = %url, "refusing to delete image with invalid storage key");
                DeleteOutcome::Rejected(err.to_string())
            }
            Ok(Err(err)) => {
                warn!(key = %key, url = %url, error = %err, "remote image delete failed");
                DeleteOutcome::Failed(err.to_string())
            }
            Err(_) => {
                let reason = format!("timed out after {:?}", self.delete_timeout);
                warn!(key = %key, url = %url, %reason, "remote image delete failed");
                DeleteOutcome::Failed(reason)
            }
        };

        CleanupAttempt { url, key, outcome }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// In-memory gateway: keys in `present` exist, keys in `broken` fail,
    /// keys in `hanging` never answer.
    #[derive(Default)]
    pub(crate) struct FakeGateway {
        pub present: Mutex<HashSet<String>>,
        pub broken: HashSet<String>,
        pub hanging: HashSet<String>,
        pub calls: Mutex<Vec<String>>,
    }

    impl FakeGateway {
        pub(crate) fn with_keys(keys: &[&str]) -> Self {
            Self {
                present: Mutex::new(keys.iter().map(|k| k.to_string()).collect()),
                ..Default::default()
            }
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            let mut calls = self.calls.lock().unwrap().clone();
            calls.sort();
            calls
        }
    }

    #[async_trait]
    impl DeletionGateway for FakeGateway {
        async fn delete(&self, key: &StorageKey) -> Result<(), GatewayError> {
            self.calls.lock().unwrap().push(key.to_string());
            if self.hanging.contains(key.as_str()) {
                futures::future::pending::<()>().await;
            }
            if self.broken.contains(key.as_str()) {
                return Err(GatewayError::Failed {
                    key: key.clone(),
                    reason: "upstream 500".into(),
                });
            }
            if self.present.lock().unwrap().remove(key.as_str()) {
                Ok(())
            } else {
                Err(GatewayError::NotFound(key.clone()))
            }
        }
    }

    fn lifecycle(gateway: Arc<FakeGateway>) -> ImageLifecycle {
        ImageLifecycle::new(gateway, Duration::from_millis(200))
    }

    fn url(name: &str) -> String {
        format!("https://cdn.test/product_images/{name}.jpg")
    }

    fn state(cover: Option<&str>, images: &[&str]) -> ImageState {
        ImageState {
            cover_image: cover.map(|c| ObjectRef::new(url(c))),
            images: images.iter().map(|i| ObjectRef::new(url(i))).collect(),
        }
    }

    #[test]
    fn on_create_wraps_urls_in_order() {
        let created = ImageLifecycle::on_create(vec![url("a"), url("b")], Some(url("c")));
        assert_eq!(created, state(Some("c"), &["a", "b"]));
    }

    #[tokio::test]
    async fn edit_preserves_order_and_appends() {
        let gateway = Arc::new(FakeGateway::with_keys(&["product_images/b"]));
        let existing = state(None, &["a", "b", "c"]);

        let out = lifecycle(gateway.clone())
            .on_edit(
                &existing,
                ImageEdit {
                    to_delete: vec![url("b")],
                    new_images: vec![url("d")],
                    new_cover: None,
                },
            )
            .await;

        assert_eq!(out.state, state(None, &["a", "c", "d"]));
        assert_eq!(gateway.calls(), vec!["product_images/b"]);
        assert_eq!(out.cleanup.failure_count(), 0);
    }

    #[tokio::test]
    async fn new_cover_replaces_and_deletes_old_cover() {
        let gateway = Arc::new(FakeGateway::with_keys(&["product_images/old"]));
        let existing = state(Some("old"), &["a"]);

        let out = lifecycle(gateway.clone())
            .on_edit(
                &existing,
                ImageEdit {
                    new_cover: Some(url("new")),
                    ..Default::default()
                },
            )
            .await;

        assert_eq!(out.state, state(Some("new"), &["a"]));
        assert_eq!(gateway.calls(), vec!["product_images/old"]);
    }

    #[tokio::test]
    async fn cover_survives_omission() {
        let gateway = Arc::new(FakeGateway::default());
        let existing = state(Some("cover"), &["a"]);

        let out = lifecycle(gateway.clone())
            .on_edit(&existing, ImageEdit::default())
            .await;

        assert_eq!(out.state, existing);
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn cover_listed_for_deletion_is_cleared() {
        let gateway = Arc::new(FakeGateway::with_keys(&["product_images/cover"]));
        let existing = state(Some("cover"), &["a"]);

        let out = lifecycle(gateway)
            .on_edit(
                &existing,
                ImageEdit {
                    to_delete: vec![url("cover")],
                    ..Default::default()
                },
            )
            .await;

        assert_eq!(out.state, state(None, &["a"]));
    }

    #[tokio::test]
    async fn repeated_edit_is_stable_and_treats_missing_as_deleted() {
        let gateway = Arc::new(FakeGateway::with_keys(&["product_images/b"]));
        let lifecycle = lifecycle(gateway.clone());
        let edit = ImageEdit {
            to_delete: vec![url("b")],
            ..Default::default()
        };

        let first = lifecycle
            .on_edit(&state(None, &["a", "b", "c"]), edit.clone())
            .await;
        let second = lifecycle.on_edit(&first.state, edit).await;

        assert_eq!(second.state, first.state);
        assert_eq!(
            first.cleanup.attempts[0].outcome,
            DeleteOutcome::Deleted
        );
        assert_eq!(
            second.cleanup.attempts[0].outcome,
            DeleteOutcome::AlreadyAbsent
        );
        assert_eq!(second.cleanup.failure_count(), 0);
    }

    #[tokio::test]
    async fn padded_delete_urls_still_drop_the_reference() {
        let gateway = Arc::new(FakeGateway::with_keys(&["product_images/b"]));
        let out = lifecycle(gateway.clone())
            .on_edit(
                &state(None, &["a", "b"]),
                ImageEdit {
                    to_delete: vec![format!("  {}\n", url("b"))],
                    ..Default::default()
                },
            )
            .await;

        assert_eq!(out.state, state(None, &["a"]));
        assert_eq!(gateway.calls(), vec!["product_images/b"]);
    }

    #[tokio::test]
    async fn unresolvable_urls_are_skipped() {
        let gateway = Arc::new(FakeGateway::default());
        let out = lifecycle(gateway.clone())
            .on_edit(
                &state(None, &["a"]),
                ImageEdit {
                    to_delete: vec!["not-a-url".into()],
                    ..Default::default()
                },
            )
            .await;

        assert_eq!(out.cleanup.skipped, vec!["not-a-url".to_string()]);
        assert!(gateway.calls().is_empty());
        assert_eq!(out.state, state(None, &["a"]));
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_the_rest() {
        let mut gateway = FakeGateway::with_keys(&[
            "product_images/cover",
            "product_images/a",
            "product_images/b",
        ]);
        gateway.broken.insert("product_images/a".into());
        let gateway = Arc::new(gateway);

        let report = lifecycle(gateway.clone())
            .on_delete(&state(Some("cover"), &["a", "b"]))
            .await;

        assert_eq!(
            gateway.calls(),
            vec![
                "product_images/a",
                "product_images/b",
                "product_images/cover"
            ]
        );
        assert_eq!(report.attempts.len(), 3);
        assert_eq!(report.failure_count(), 1);
    }

    #[tokio::test]
    async fn slow_delete_is_bounded_by_timeout() {
        let mut gateway = FakeGateway::with_keys(&["product_images/b"]);
        gateway.hanging.insert("product_images/a".into());
        let gateway = Arc::new(gateway);

        let report = ImageLifecycle::new(gateway, Duration::from_millis(20))
            .delete_urls(vec![url("a"), url("b")])
            .await;

        let failed: Vec<_> = report.failures().map(|a| a.key.to_string()).collect();
        assert_eq!(failed, vec!["product_images/a"]);
        assert_eq!(report.attempts.len(), 2);
    }

    #[tokio::test]
    async fn duplicate_keys_are_deleted_once() {
        let gateway = Arc::new(FakeGateway::with_keys(&["product_images/a"]));
        let report = lifecycle(gateway.clone())
            .on_delete(&state(Some("a"), &["a", "a"]))
            .await;

        assert_eq!(gateway.calls(), vec!["product_images/a"]);
        assert_eq!(report.attempts.len(), 1);
    }
}
