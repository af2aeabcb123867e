//! Defines routes for the product catalog.
//!
//! ## Structure
//! - **Product endpoints**
//!   - `GET    /products`      - list products
//!   - `POST   /products`      - create (multipart: coverImage + up to 10 images)
//!   - `GET    /products/{id}` - fetch one product
//!   - `PUT    /products/{id}` - edit (multipart, plus imagesToDelete and version)
//!   - `DELETE /products/{id}` - delete product and its images
//!
//! - **Asset endpoint**
//!   - `GET    /assets/{*path}` - stream a stored image
//!
//! - **Health**: `GET /healthz`, `GET /readyz`
//!
//! Every route is traced and answers cross-origin requests.

use crate::{
    handlers::{
        asset_handlers::get_asset,
        health_handlers::{healthz, readyz},
        product_handlers::{
            MAX_COVER_FILES, MAX_GALLERY_FILES, create_product, delete_product, get_product,
            list_products, update_product,
        },
    },
    state::AppState,
};
use axum::{Router, extract::DefaultBodyLimit, routing::get};
use tower_http::{cors, trace};

/// Room for form text fields on top of the file payloads.
const FORM_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Build the router. The request body limit admits a full form of
/// `max_upload_bytes`-sized files; per-file limits are enforced in handlers.
pub fn routes(max_upload_bytes: u64) -> Router<AppState> {
    let per_file = usize::try_from(max_upload_bytes).unwrap_or(usize::MAX);
    let body_limit = per_file
        .saturating_mul(MAX_COVER_FILES + MAX_GALLERY_FILES)
        .saturating_add(FORM_OVERHEAD_BYTES);

    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/products", get(list_products).post(create_product))
        .route(
            "/products/{id}",
            get(get_product).put(update_product).delete(delete_product),
        )
        .route("/assets/{*path}", get(get_asset))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            trace::TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(tracing::Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(tracing::Level::INFO)),
        )
        .layer(cors::CorsLayer::permissive())
}
