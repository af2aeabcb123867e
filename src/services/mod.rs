pub mod asset_store;
pub mod product_service;
