//! Core data models for the product catalog.
//!
//! Products map to the `products` table via `sqlx::FromRow` and serialize
//! as JSON via `serde`. Image references are kept as ordered URL lists.

pub mod object_ref;
pub mod product;
