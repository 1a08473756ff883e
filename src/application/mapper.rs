//! Record mapper: source product → normalized destination properties
//!
//! Pure and deterministic; no I/O. The mapper assumes the record has already
//! passed the SKU check — rejecting SKU-less records is the orchestrator's
//! responsibility, before mapping runs.

use std::collections::HashSet;

use once_cell::sync::Lazy;

use crate::domain::product::Product;
use crate::domain::services::Properties;

/// Metafield namespaces that are allowed through to the destination
static ALLOWED_NAMESPACES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["custom", "diamond", "gemstone", "jewelry", "loose", "fantasy"]
        .into_iter()
        .collect()
});

/// Separator joining namespace and key into one destination field name
const NAMESPACE_SEPARATOR: &str = "__";

/// Build the normalized property set for one product.
///
/// Combines identity fields (title, description, URL, image, SKU, price,
/// status) with allow-listed metafields, then drops every value that is
/// empty after trimming. The returned map never contains an empty string.
pub fn normalize(product: &Product) -> Properties {
    let mut properties = Properties::new();

    insert_non_empty(&mut properties, "name", &product.title);
    insert_non_empty(&mut properties, "description", &product.description_html);
    insert_non_empty(&mut properties, "source_id", &product.id);
    if let Some(url) = &product.online_store_url {
        insert_non_empty(&mut properties, "url", url);
    }
    if let Some(image) = &product.image_url {
        insert_non_empty(&mut properties, "image", image);
    }
    if let Some(sku) = product.sku() {
        insert_non_empty(&mut properties, "sku", sku);
    }
    if let Some(price) = product.price() {
        insert_non_empty(&mut properties, "price", price);
    }
    insert_non_empty(&mut properties, "status", &product.status.to_string());

    for metafield in &product.metafields {
        if !ALLOWED_NAMESPACES.contains(metafield.namespace.as_str()) {
            continue;
        }
        let field = format!(
            "{}{}{}",
            metafield.namespace, NAMESPACE_SEPARATOR, metafield.key
        );
        insert_non_empty(&mut properties, &field, &metafield.value);
    }

    properties
}

fn insert_non_empty(properties: &mut Properties, field: &str, value: &str) {
    let trimmed = value.trim();
    if !trimmed.is_empty() {
        properties.insert(field.to_string(), trimmed.to_string());
    }
}
