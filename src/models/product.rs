//! Catalog products and the request shapes that create or edit them.

use crate::{
    images::codec,
    models::object_ref::{ImageState, ObjectRef},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;

/// A product as returned to API callers, with the image list decoded.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// Assigned by the database on insert.
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub code: Option<String>,
    pub category: Option<String>,
    pub price: f64,
    pub specifications: Option<String>,
    pub date: DateTime<Utc>,
    pub status: Option<String>,
    /// Marketplace listing link.
    pub shopee: Option<String>,
    pub cover_image: Option<ObjectRef>,
    pub images: Vec<ObjectRef>,
    /// Incremented on every update; used for optimistic concurrency.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn image_state(&self) -> ImageState {
        ImageState {
            cover_image: self.cover_image.clone(),
            images: self.images.clone(),
        }
    }

    pub fn fields(&self) -> ProductFields {
        ProductFields {
            name: self.name.clone(),
            description: self.description.clone(),
            code: self.code.clone(),
            category: self.category.clone(),
            price: self.price,
            specifications: self.specifications.clone(),
            date: self.date,
            status: self.status.clone(),
            shopee: self.shopee.clone(),
        }
    }
}

/// Raw `products` row. `images` holds the comma-joined URL list.
#[derive(Clone, Debug, FromRow)]
pub struct ProductRow {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub code: Option<String>,
    pub category: Option<String>,
    pub price: f64,
    pub specifications: Option<String>,
    pub date: DateTime<Utc>,
    pub status: Option<String>,
    pub shopee: Option<String>,
    pub cover_image: Option<String>,
    pub images: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            code: row.code,
            category: row.category,
            price: row.price,
            specifications: row.specifications,
            date: row.date,
            status: row.status,
            shopee: row.shopee,
            cover_image: row
                .cover_image
                .filter(|url| !url.is_empty())
                .map(ObjectRef::new),
            images: codec::decode(row.images.as_deref()),
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Validated scalar fields of a product.
#[derive(Clone, Debug, PartialEq)]
pub struct ProductFields {
    pub name: String,
    pub description: Option<String>,
    pub code: Option<String>,
    pub category: Option<String>,
    pub price: f64,
    pub specifications: Option<String>,
    pub date: DateTime<Utc>,
    pub status: Option<String>,
    pub shopee: Option<String>,
}

impl ProductFields {
    /// Overlay the fields present in `patch`.
    pub fn apply(mut self, patch: ProductPatch) -> Self {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(price) = patch.price {
            self.price = price;
        }
        if let Some(date) = patch.date {
            self.date = date;
        }
        self.description = patch.description.or(self.description);
        self.code = patch.code.or(self.code);
        self.category = patch.category.or(self.category);
        self.specifications = patch.specifications.or(self.specifications);
        self.status = patch.status.or(self.status);
        self.shopee = patch.shopee.or(self.shopee);
        self
    }
}

/// Validated partial update; `None` keeps the stored value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub code: Option<String>,
    pub category: Option<String>,
    pub price: Option<f64>,
    pub specifications: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub status: Option<String>,
    pub shopee: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("`{0}` is required")]
    MissingField(&'static str),
    #[error("`{field}` must be a non-negative number, got `{value}`")]
    InvalidNumber { field: &'static str, value: String },
    #[error("`{field}` must be an RFC 3339 timestamp or YYYY-MM-DD date, got `{value}`")]
    InvalidDate { field: &'static str, value: String },
    #[error("invalid image list: {0}")]
    InvalidImages(String),
}

/// Unvalidated scalar fields as they arrive from a form.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub code: Option<String>,
    pub category: Option<String>,
    pub price: Option<String>,
    pub specifications: Option<String>,
    pub date: Option<String>,
    pub status: Option<String>,
    pub shopee: Option<String>,
}

impl ProductInput {
    /// Validate for creation: `name`, `price` and `date` are required.
    pub fn validate_new(self) -> Result<ProductFields, ValidationError> {
        let name = self
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or(ValidationError::MissingField("name"))?
            .to_string();
        let price = self
            .price
            .as_deref()
            .ok_or(ValidationError::MissingField("price"))
            .and_then(parse_price)?;
        let date = self
            .date
            .as_deref()
            .ok_or(ValidationError::MissingField("date"))
            .and_then(parse_date)?;

        Ok(ProductFields {
            name,
            description: self.description,
            code: self.code,
            category: self.category,
            price,
            specifications: self.specifications,
            date,
            status: self.status,
            shopee: self.shopee,
        })
    }

    /// Validate for an edit: every field is optional, present ones must parse.
    pub fn validate_patch(self) -> Result<ProductPatch, ValidationError> {
        let name = match self.name {
            Some(name) if name.trim().is_empty() => {
                return Err(ValidationError::MissingField("name"));
            }
            Some(name) => Some(name.trim().to_string()),
            None => None,
        };
        let price = self.price.as_deref().map(parse_price).transpose()?;
        let date = self.date.as_deref().map(parse_date).transpose()?;

        Ok(ProductPatch {
            name,
            description: self.description,
            code: self.code,
            category: self.category,
            price,
            specifications: self.specifications,
            date,
            status: self.status,
            shopee: self.shopee,
        })
    }
}

fn parse_price(raw: &str) -> Result<f64, ValidationError> {
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Ok(value),
        _ => Err(ValidationError::InvalidNumber {
            field: "price",
            value: raw.to_string(),
        }),
    }
}

fn parse_date(raw: &str) -> Result<DateTime<Utc>, ValidationError> {
    let trimmed = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| ValidationError::InvalidDate {
            field: "date",
            value: raw.to_string(),
        })
}

/// Create request after the upload transport has materialised the files.
#[derive(Clone, Debug, Default)]
pub struct NewProduct {
    pub input: ProductInput,
    pub cover_url: Option<String>,
    pub image_urls: Vec<String>,
}

/// Edit request after the upload transport has materialised the files.
#[derive(Clone, Debug, Default)]
pub struct ProductUpdate {
    pub input: ProductInput,
    pub cover_url: Option<String>,
    pub image_urls: Vec<String>,
    pub images_to_delete: Vec<String>,
    /// Version the caller last read, if it wants the edit to be conditional.
    pub expected_version: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_input() -> ProductInput {
        ProductInput {
            name: Some("Desk lamp".into()),
            price: Some("19.90".into()),
            date: Some("2024-05-01".into()),
            ..Default::default()
        }
    }

    #[test]
    fn validate_new_parses_price_and_date() {
        let fields = full_input().validate_new().unwrap();
        assert_eq!(fields.name, "Desk lamp");
        assert_eq!(fields.price, 19.9);
        assert_eq!(fields.date.to_rfc3339(), "2024-05-01T00:00:00+00:00");
    }

    #[test]
    fn validate_new_accepts_rfc3339() {
        let input = ProductInput {
            date: Some("2024-05-01T10:30:00+02:00".into()),
            ..full_input()
        };
        let fields = input.validate_new().unwrap();
        assert_eq!(fields.date.to_rfc3339(), "2024-05-01T08:30:00+00:00");
    }

    #[test]
    fn validate_new_requires_name_price_date() {
        let missing_name = ProductInput {
            name: Some("  ".into()),
            ..full_input()
        };
        assert_eq!(
            missing_name.validate_new().unwrap_err(),
            ValidationError::MissingField("name")
        );

        let missing_price = ProductInput {
            price: None,
            ..full_input()
        };
        assert_eq!(
            missing_price.validate_new().unwrap_err(),
            ValidationError::MissingField("price")
        );

        let missing_date = ProductInput {
            date: None,
            ..full_input()
        };
        assert_eq!(
            missing_date.validate_new().unwrap_err(),
            ValidationError::MissingField("date")
        );
    }

    #[test]
    fn validate_rejects_bad_numbers_and_dates() {
        for bad in ["abc", "-1", "NaN", "inf"] {
            let input = ProductInput {
                price: Some(bad.into()),
                ..full_input()
            };
            assert!(matches!(
                input.validate_new(),
                Err(ValidationError::InvalidNumber { field: "price", .. })
            ));
        }

        let input = ProductInput {
            date: Some("01/05/2024".into()),
            ..full_input()
        };
        assert!(matches!(
            input.validate_new(),
            Err(ValidationError::InvalidDate { .. })
        ));
    }

    #[test]
    fn patch_keeps_absent_fields() {
        let base = full_input().validate_new().unwrap();
        let patch = ProductInput {
            price: Some("5".into()),
            status: Some("sold".into()),
            ..Default::default()
        }
        .validate_patch()
        .unwrap();

        let merged = base.clone().apply(patch);
        assert_eq!(merged.name, base.name);
        assert_eq!(merged.date, base.date);
        assert_eq!(merged.price, 5.0);
        assert_eq!(merged.status.as_deref(), Some("sold"));
    }

    #[test]
    fn patch_rejects_blank_name() {
        let input = ProductInput {
            name: Some("".into()),
            ..Default::default()
        };
        assert_eq!(
            input.validate_patch().unwrap_err(),
            ValidationError::MissingField("name")
        );
    }

    #[test]
    fn row_decodes_image_list() {
        let now = Utc::now();
        let row = ProductRow {
            id: 7,
            name: "Chair".into(),
            description: None,
            code: None,
            category: None,
            price: 1.0,
            specifications: None,
            date: now,
            status: None,
            shopee: None,
            cover_image: Some("urlC".into()),
            images: Some("urlA,urlB".into()),
            version: 1,
            created_at: now,
            updated_at: now,
        };
        let product = Product::from(row);
        assert_eq!(product.cover_image, Some(ObjectRef::new("urlC")));
        assert_eq!(
            product.images,
            vec![ObjectRef::new("urlA"), ObjectRef::new("urlB")]
        );
    }
}
