//! HTTP handlers for product CRUD.
//!
//! Create and edit take `multipart/form-data`: scalar fields as text parts,
//! `coverImage` (at most one file) and `images` (at most ten files). Files are
//! buffered and checked first; nothing is stored until the form validates.

use crate::{
    errors::AppError,
    models::product::{NewProduct, ProductInput, ProductUpdate},
    services::{
        asset_store::{AssetStore, AssetStoreError},
        product_service::ProductError,
    },
    state::AppState,
};
use axum::{
    Json,
    extract::{Multipart, Path, State, multipart::Field},
    http::StatusCode,
    response::IntoResponse,
};
use bytes::{Bytes, BytesMut};
use futures::stream;
use serde_json::json;
use std::io;

pub const MAX_COVER_FILES: usize = 1;
pub const MAX_GALLERY_FILES: usize = 10;

/// A file part held in memory until the whole form has been checked.
#[derive(Debug)]
struct PendingUpload {
    file_name: String,
    content_type: Option<String>,
    bytes: Bytes,
}

#[derive(Debug, Default)]
struct ProductForm {
    input: ProductInput,
    cover: Option<PendingUpload>,
    images: Vec<PendingUpload>,
    images_to_delete: Vec<String>,
    version: Option<String>,
}

impl ProductForm {
    async fn read(mut multipart: Multipart, assets: &AssetStore) -> Result<Self, AppError> {
        let mut form = ProductForm::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "coverImage" => {
                    if let Some(upload) = read_file(field, assets).await? {
                        if form.cover.is_some() {
                            return Err(AppError::bad_request(format!(
                                "at most {MAX_COVER_FILES} coverImage file is allowed"
                            )));
                        }
                        form.cover = Some(upload);
                    }
                }
                "images" => {
                    if let Some(upload) = read_file(field, assets).await? {
                        if form.images.len() == MAX_GALLERY_FILES {
                            return Err(AppError::bad_request(format!(
                                "at most {MAX_GALLERY_FILES} images files are allowed"
                            )));
                        }
                        form.images.push(upload);
                    }
                }
                "imagesToDelete" | "imagesToDelete[]" => {
                    let text = field.text().await?;
                    form.images_to_delete.extend(parse_url_list(&text)?);
                }
                "version" => form.version = Some(field.text().await?),
                "name" => form.input.name = Some(field.text().await?),
                "description" => form.input.description = Some(field.text().await?),
                "code" => form.input.code = Some(field.text().await?),
                "category" => form.input.category = Some(field.text().await?),
                "price" => form.input.price = Some(field.text().await?),
                "specifications" => form.input.specifications = Some(field.text().await?),
                "date" => form.input.date = Some(field.text().await?),
                "status" => form.input.status = Some(field.text().await?),
                "shopee" => form.input.shopee = Some(field.text().await?),
                other => {
                    tracing::debug!(field = other, "ignoring unknown form field");
                }
            }
        }

        Ok(form)
    }

    fn expected_version(&self) -> Result<Option<i64>, AppError> {
        match self.version.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => raw
                .parse::<i64>()
                .map(Some)
                .map_err(|_| AppError::bad_request(format!("invalid version `{raw}`"))),
        }
    }
}

/// Buffer one file part, enforcing type and size limits as it arrives.
/// Empty parts with no file name (an unset file input) are ignored.
async fn read_file(
    mut field: Field<'_>,
    assets: &AssetStore,
) -> Result<Option<PendingUpload>, AppError> {
    let file_name = field.file_name().unwrap_or_default().to_string();
    let content_type = field.content_type().map(str::to_string);

    let mut buf = BytesMut::new();
    while let Some(chunk) = field.chunk().await? {
        if (buf.len() + chunk.len()) as u64 > assets.max_bytes() {
            return Err(AssetStoreError::TooLarge {
                limit: assets.max_bytes(),
            }
            .into());
        }
        buf.extend_from_slice(&chunk);
    }

    if file_name.is_empty() && buf.is_empty() {
        return Ok(None);
    }
    assets.accepts(content_type.as_deref())?;
    assets.check_signature(content_type.as_deref(), &buf)?;

    Ok(Some(PendingUpload {
        file_name,
        content_type,
        bytes: buf.freeze(),
    }))
}

/// `imagesToDelete` is either one URL per part or a JSON array of URLs.
fn parse_url_list(text: &str) -> Result<Vec<String>, AppError> {
    let trimmed = text.trim();
    if trimmed.starts_with('[') {
        let urls: Vec<String> = serde_json::from_str(trimmed)
            .map_err(|err| AppError::bad_request(format!("invalid imagesToDelete: {err}")))?;
        Ok(urls
            .iter()
            .map(|u| u.trim())
            .filter(|u| !u.is_empty())
            .map(str::to_string)
            .collect())
    } else if trimmed.is_empty() {
        Ok(Vec::new())
    } else {
        Ok(vec![trimmed.to_string()])
    }
}

/// Store the cover and gallery files; returns their URLs.
///
/// If any upload fails, those already stored for this request are removed.
async fn store_uploads(
    state: &AppState,
    cover: Option<PendingUpload>,
    images: Vec<PendingUpload>,
) -> Result<(Option<String>, Vec<String>), AppError> {
    let mut stored: Vec<String> = Vec::new();
    let mut cover_url = None;

    for (is_cover, upload) in cover
        .into_iter()
        .map(|u| (true, u))
        .chain(images.into_iter().map(|u| (false, u)))
    {
        let body = stream::iter([Ok::<_, io::Error>(upload.bytes)]);
        match state
            .assets
            .upload_stream(&upload.file_name, upload.content_type.as_deref(), body)
            .await
        {
            Ok(asset) if is_cover => cover_url = Some(asset.url),
            Ok(asset) => stored.push(asset.url),
            Err(err) => {
                let mut uploaded = stored;
                uploaded.extend(cover_url);
                state.products.discard_uploads(uploaded).await;
                return Err(err.into());
            }
        }
    }

    Ok((cover_url, stored))
}

fn parse_id(raw: &str) -> Result<i64, AppError> {
    raw.parse::<i64>()
        .map_err(|_| AppError::bad_request("Invalid product ID"))
}

/// `GET /products`
pub async fn list_products(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let products = state.products.list().await?;
    Ok(Json(json!({ "success": true, "products": products })))
}

/// `GET /products/{id}`
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let product = state.products.get(parse_id(&id)?).await?;
    Ok(Json(json!({ "success": true, "product": product })))
}

/// `POST /products`
pub async fn create_product(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let form = ProductForm::read(multipart, &state.assets).await?;
    form.input
        .clone()
        .validate_new()
        .map_err(ProductError::from)?;

    let (cover_url, image_urls) = store_uploads(&state, form.cover, form.images).await?;
    let uploaded: Vec<String> = cover_url.iter().chain(image_urls.iter()).cloned().collect();

    let created = state
        .products
        .create(NewProduct {
            input: form.input,
            cover_url,
            image_urls,
        })
        .await;

    match created {
        Ok(product) => Ok((
            StatusCode::CREATED,
            Json(json!({
                "success": true,
                "message": "product created",
                "product": product,
            })),
        )),
        Err(err) => {
            state.products.discard_uploads(uploaded).await;
            Err(err.into())
        }
    }
}

/// `PUT /products/{id}`
pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id)?;
    let form = ProductForm::read(multipart, &state.assets).await?;
    let expected_version = form.expected_version()?;
    form.input
        .clone()
        .validate_patch()
        .map_err(ProductError::from)?;

    let (cover_url, image_urls) = store_uploads(&state, form.cover, form.images).await?;
    let uploaded: Vec<String> = cover_url.iter().chain(image_urls.iter()).cloned().collect();

    let updated = state
        .products
        .update(
            id,
            ProductUpdate {
                input: form.input,
                cover_url,
                image_urls,
                images_to_delete: form.images_to_delete,
                expected_version,
            },
        )
        .await;

    match updated {
        Ok((product, cleanup)) => Ok(Json(json!({
            "success": true,
            "message": "product updated",
            "product": product,
            "cleanupFailures": cleanup.failure_count(),
        }))),
        Err(err) => {
            state.products.discard_uploads(uploaded).await;
            Err(err.into())
        }
    }
}

/// `DELETE /products/{id}`
pub async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let cleanup = state.products.delete(parse_id(&id)?).await?;
    Ok(Json(json!({
        "success": true,
        "message": "product deleted",
        "cleanupFailures": cleanup.failure_count(),
    })))
}
