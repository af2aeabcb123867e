//! Serves stored product images back by their public path.

use crate::{
    errors::AppError,
    images::extract::extract_storage_key,
    services::asset_store::content_type_for,
    state::AppState,
};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header},
    response::Response,
};
use tokio_util::io::ReaderStream;

/// `GET /assets/{*path}`: stream a stored image.
///
/// The path is resolved to a storage key the same way product image URLs
/// are, so `/assets/product_images/name.jpg` serves key `product_images/name`.
/// The extension must name the type of the stored bytes.
pub async fn get_asset(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Response, AppError> {
    let key = extract_storage_key(&path)
        .ok_or_else(|| AppError::not_found(format!("asset `{path}` not found")))?;
    let ext = path.rsplit('.').next().unwrap_or_default();

    let (file, stored_type) = state.assets.open_image(&key).await?;
    if content_type_for(ext) != stored_type {
        return Err(AppError::not_found(format!("asset `{path}` not found")));
    }
    let mut response = Response::new(Body::from_stream(ReaderStream::new(file)));
    *response.status_mut() = StatusCode::OK;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(stored_type),
    );
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );
    Ok(response)
}
