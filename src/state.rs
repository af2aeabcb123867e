//! Shared state handed to every handler.

use crate::services::{asset_store::AssetStore, product_service::ProductService};

#[derive(Clone)]
pub struct AppState {
    pub products: ProductService,
    pub assets: AssetStore,
}
