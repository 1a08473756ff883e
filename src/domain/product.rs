//! Source catalog entities
//!
//! These types mirror the upstream storefront's product shape as the source
//! adapter surfaces it. They are read-only to the sync core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a catalog record on the source platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductStatus {
    Active,
    Draft,
    Archived,
}

impl std::fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProductStatus::Active => write!(f, "ACTIVE"),
            ProductStatus::Draft => write!(f, "DRAFT"),
            ProductStatus::Archived => write!(f, "ARCHIVED"),
        }
    }
}

/// One sellable variant of a product
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductVariant {
    pub id: String,
    pub title: String,
    /// Stock-keeping unit; the cross-system join key. May be absent or blank.
    pub sku: Option<String>,
    pub price: String,
}

/// A typed attribute attached to a product (namespace + key + value)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metafield {
    pub namespace: String,
    pub key: String,
    pub value: String,
}

impl Metafield {
    pub fn new(
        namespace: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A full catalog record as fetched from the source platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    /// Opaque source identifier (e.g. a GraphQL global id)
    pub id: String,
    pub title: String,
    pub description_html: String,
    pub online_store_url: Option<String>,
    /// Primary image URL, when the record has one
    pub image_url: Option<String>,
    pub variants: Vec<ProductVariant>,
    pub metafields: Vec<Metafield>,
    pub status: ProductStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// SKU of the record, taken from the first variant.
    ///
    /// Returns `None` when there is no variant or the SKU is blank after
    /// trimming. A record without a resolvable SKU is not synchronizable and
    /// must be rejected by the caller, never silently skipped.
    pub fn sku(&self) -> Option<&str> {
        self.variants
            .first()
            .and_then(|v| v.sku.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Price of the first variant, when present
    pub fn price(&self) -> Option<&str> {
        self.variants.first().map(|v| v.price.as_str())
    }
}

/// One page of catalog records from a cursor-paginated listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductPage {
    pub products: Vec<Product>,
    /// Continuation token derived from the last record of this page;
    /// `None` means pagination is exhausted.
    pub next_cursor: Option<String>,
}

impl ProductPage {
    /// Terminal empty page
    pub fn empty() -> Self {
        Self {
            products: Vec::new(),
            next_cursor: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product_with_skus(skus: Vec<Option<&str>>) -> Product {
        Product {
            id: "gid://source/Product/1".to_string(),
            title: "Test".to_string(),
            description_html: String::new(),
            online_store_url: None,
            image_url: None,
            variants: skus
                .into_iter()
                .enumerate()
                .map(|(i, sku)| ProductVariant {
                    id: format!("v{i}"),
                    title: format!("Variant {i}"),
                    sku: sku.map(str::to_string),
                    price: "10.00".to_string(),
                })
                .collect(),
            metafields: Vec::new(),
            status: ProductStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn sku_comes_from_first_variant() {
        let product = product_with_skus(vec![Some("ABC123"), Some("OTHER")]);
        assert_eq!(product.sku(), Some("ABC123"));
    }

    #[test]
    fn blank_sku_resolves_to_none() {
        assert_eq!(product_with_skus(vec![Some("   ")]).sku(), None);
        assert_eq!(product_with_skus(vec![None]).sku(), None);
        assert_eq!(product_with_skus(vec![]).sku(), None);
    }

    #[test]
    fn sku_is_trimmed() {
        let product = product_with_skus(vec![Some("  AB-1 ")]);
        assert_eq!(product.sku(), Some("AB-1"));
    }
}
