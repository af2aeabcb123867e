//! src/services/product_service.rs
//!
//! ProductService: product CRUD over SQLite, with the image lifecycle run
//! around every mutation. The relational row is authoritative; remote image
//! cleanup is best-effort and its failures are recorded in
//! `failed_deletions` for a later reconciliation sweep.

use crate::{
    images::{
        codec,
        gateway::{CleanupReport, DeleteOutcome},
        lifecycle::{ImageEdit, ImageLifecycle},
    },
    models::{
        object_ref::{ObjectRef, StorageKey},
        product::{NewProduct, Product, ProductRow, ProductUpdate, ValidationError},
    },
};
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum ProductError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("product `{0}` not found")]
    NotFound(i64),
    #[error("product `{id}` was modified concurrently (expected version {expected}); reload and retry")]
    Conflict { id: i64, expected: i64 },
    #[error(transparent)]
    Persistence(#[from] sqlx::Error),
}

pub type ProductResult<T> = Result<T, ProductError>;

/// Outcome of a reconciliation sweep over `failed_deletions`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub retried: usize,
    pub resolved: usize,
    pub remaining: usize,
}

const PRODUCT_COLUMNS: &str = "id, name, description, code, category, price, specifications, \
     date, status, shopee, cover_image, images, version, created_at, updated_at";

#[derive(Clone)]
pub struct ProductService {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,
    lifecycle: ImageLifecycle,
}

impl ProductService {
    pub fn new(db: Arc<SqlitePool>, lifecycle: ImageLifecycle) -> Self {
        Self { db, lifecycle }
    }

    /// Every product, ordered by id.
    pub async fn list(&self) -> ProductResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY id ASC"
        ))
        .fetch_all(&*self.db)
        .await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    pub async fn get(&self, id: i64) -> ProductResult<Product> {
        sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&*self.db)
        .await?
        .map(Product::from)
        .ok_or(ProductError::NotFound(id))
    }

    /// Validate and insert a product. No remote deletions happen here.
    pub async fn create(&self, new: NewProduct) -> ProductResult<Product> {
        let fields = new.input.validate_new()?;
        let state = ImageLifecycle::on_create(new.image_urls, new.cover_url);
        let images = encode_images(&state.images)?;
        if let Some(cover) = &state.cover_image {
            encode_images(std::slice::from_ref(cover))?;
        }

        let now = Utc::now();
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "INSERT INTO products (
                name, description, code, category, price, specifications,
                date, status, shopee, cover_image, images, version, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
            RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(&fields.name)
        .bind(&fields.description)
        .bind(&fields.code)
        .bind(&fields.category)
        .bind(fields.price)
        .bind(&fields.specifications)
        .bind(fields.date)
        .bind(&fields.status)
        .bind(&fields.shopee)
        .bind(state.cover_image.as_ref().map(ObjectRef::url))
        .bind(&images)
        .bind(now)
        .bind(now)
        .fetch_one(&*self.db)
        .await?;

        let product = Product::from(row);
        info!(
            product_id = product.id,
            images = product.images.len(),
            has_cover = product.cover_image.is_some(),
            "created product"
        );
        Ok(product)
    }

    /// Apply an edit: scalar patch plus image additions, removals and cover
    /// replacement.
    ///
    /// Validation, lookup and the caller's version check all happen before
    /// any remote call. The write is conditioned on the version read, so a
    /// concurrent edit surfaces as [`ProductError::Conflict`] instead of
    /// being silently overwritten.
    pub async fn update(
        &self,
        id: i64,
        update: ProductUpdate,
    ) -> ProductResult<(Product, CleanupReport)> {
        let ProductUpdate {
            input,
            cover_url,
            image_urls,
            images_to_delete,
            expected_version,
        } = update;

        let patch = input.validate_patch()?;
        let incoming: Vec<ObjectRef> = cover_url
            .iter()
            .chain(image_urls.iter())
            .map(|url| ObjectRef::new(url.as_str()))
            .collect();
        encode_images(&incoming)?;

        let current = self.get(id).await?;
        if let Some(expected) = expected_version {
            if expected != current.version {
                return Err(ProductError::Conflict { id, expected });
            }
        }

        let outcome = self
            .lifecycle
            .on_edit(
                &current.image_state(),
                ImageEdit {
                    to_delete: images_to_delete,
                    new_images: image_urls,
                    new_cover: cover_url,
                },
            )
            .await;
        self.record_failures(&outcome.cleanup).await;

        let fields = current.fields().apply(patch);
        let images = encode_images(&outcome.state.images)?;

        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "UPDATE products SET
                name = ?, description = ?, code = ?, category = ?, price = ?,
                specifications = ?, date = ?, status = ?, shopee = ?,
                cover_image = ?, images = ?, version = version + 1, updated_at = ?
             WHERE id = ? AND version = ?
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(&fields.name)
        .bind(&fields.description)
        .bind(&fields.code)
        .bind(&fields.category)
        .bind(fields.price)
        .bind(&fields.specifications)
        .bind(fields.date)
        .bind(&fields.status)
        .bind(&fields.shopee)
        .bind(outcome.state.cover_image.as_ref().map(ObjectRef::url))
        .bind(&images)
        .bind(Utc::now())
        .bind(id)
        .bind(current.version)
        .fetch_optional(&*self.db)
        .await?;

        let Some(row) = row else {
            warn!(product_id = id, version = current.version, "concurrent update detected");
            return Err(ProductError::Conflict {
                id,
                expected: current.version,
            });
        };

        let product = Product::from(row);
        info!(
            product_id = id,
            version = product.version,
            cleanup_failures = outcome.cleanup.failure_count(),
            "updated product"
        );
        Ok((product, outcome.cleanup))
    }

    /// Remove every image of the product, then the row itself.
    ///
    /// Remote deletes are all attempted before the row is deleted; their
    /// failures never block it.
    pub async fn delete(&self, id: i64) -> ProductResult<CleanupReport> {
        let current = self.get(id).await?;

        let cleanup = self.lifecycle.on_delete(&current.image_state()).await;
        self.record_failures(&cleanup).await;

        let result = sqlx::query("DELETE FROM products WHERE id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ProductError::NotFound(id));
        }

        info!(
            product_id = id,
            cleanup_failures = cleanup.failure_count(),
            "deleted product"
        );
        Ok(cleanup)
    }

    /// Delete assets uploaded for a request that did not go through.
    pub async fn discard_uploads(&self, urls: Vec<String>) -> CleanupReport {
        if urls.is_empty() {
            return CleanupReport::default();
        }
        let cleanup = self.lifecycle.delete_urls(urls).await;
        self.record_failures(&cleanup).await;
        cleanup
    }

    /// Retry every recorded failed deletion and forget the ones that now
    /// succeed, find the object already gone, or can never be addressed.
    pub async fn reconcile_failed_deletions(&self) -> ProductResult<ReconcileSummary> {
        let pending: Vec<(String, String)> = sqlx::query_as(
            "SELECT storage_key, MIN(url) FROM failed_deletions
             GROUP BY storage_key ORDER BY storage_key",
        )
        .fetch_all(&*self.db)
        .await?;

        let retried = pending.len();
        let report = self
            .lifecycle
            .delete_keys(
                pending
                    .into_iter()
                    .map(|(key, url)| (url, StorageKey::new(key)))
                    .collect(),
            )
            .await;

        let mut resolved = 0;
        for attempt in report.attempts.iter().filter(|a| !a.outcome.is_retryable()) {
            sqlx::query("DELETE FROM failed_deletions WHERE storage_key = ?")
                .bind(attempt.key.as_str())
                .execute(&*self.db)
                .await?;
            resolved += 1;
        }

        let summary = ReconcileSummary {
            retried,
            resolved,
            remaining: retried - resolved,
        };
        info!(?summary, "reconciled failed deletions");
        Ok(summary)
    }

    /// Keys whose deletion failed and has not been reconciled yet.
    pub async fn pending_deletions(&self) -> ProductResult<Vec<String>> {
        let keys = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT storage_key FROM failed_deletions ORDER BY storage_key",
        )
        .fetch_all(&*self.db)
        .await?;
        Ok(keys)
    }

    /// Persist retryable cleanup failures. Never fails the calling operation.
    async fn record_failures(&self, report: &CleanupReport) {
        for attempt in report.failures() {
            let reason = match &attempt.outcome {
                DeleteOutcome::Failed(reason) => reason.as_str(),
                _ => "",
            };
            let res = sqlx::query(
                "INSERT INTO failed_deletions (storage_key, url, reason, recorded_at)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(attempt.key.as_str())
            .bind(&attempt.url)
            .bind(reason)
            .bind(Utc::now())
            .execute(&*self.db)
            .await;

            if let Err(err) = res {
                error!(key = %attempt.key, error = %err, "could not record failed deletion");
            }
        }
    }
}

fn encode_images(refs: &[ObjectRef]) -> Result<String, ValidationError> {
    codec::encode(refs).map_err(|err| ValidationError::InvalidImages(err.to_string()))
}
