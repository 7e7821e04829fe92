//! Catalog - products and their ordered images.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::SyncError;
use crate::record::Row;
use crate::remote::{Query, RemoteStore, TablesExt};
use crate::session::SessionContext;
use crate::Table;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Table)]
#[table(name = "products")]
pub struct Product {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_month: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_year: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock: Option<u32>,
    /// Percent off.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_url: Option<String>,
}

impl Product {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        if self.name.trim().is_empty() {
            return Err(SyncError::validation("product name is required"));
        }
        for (field, price) in [("price_month", self.price_month), ("price_year", self.price_year)] {
            if let Some(price) = price {
                if !price.is_finite() || price < 0.0 {
                    return Err(SyncError::validation(format!(
                        "{} must be a non-negative number, got {}",
                        field, price
                    )));
                }
            }
        }
        if let Some(discount) = self.discount {
            if discount > 100 {
                return Err(SyncError::validation(format!(
                    "discount {}% exceeds 100%",
                    discount
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Table)]
#[table(name = "product_images")]
pub struct ProductImage {
    pub product_id: String,
    pub image_url: String,
    pub position: u32,
}

/// A product to add, with its image URLs in display order.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProduct {
    pub product: Product,
    pub image_urls: Vec<String>,
}

impl NewProduct {
    pub fn new(product: Product) -> Self {
        Self {
            product,
            image_urls: Vec::new(),
        }
    }

    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.image_urls.push(url.into());
        self
    }
}

/// A product with its images sorted by position.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductListing {
    pub product: Row<Product>,
    pub images: Vec<Row<ProductImage>>,
}

pub struct Catalog<S> {
    store: Arc<S>,
}

impl<S: RemoteStore> Catalog<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn from_context(ctx: &SessionContext<S>) -> Self {
        Self::new(ctx.shared_store())
    }

    /// Insert a product, then its images in the given order. If an image
    /// insert fails, what was already written is removed again.
    pub fn add(&self, owner_id: &str, new_product: NewProduct) -> Result<ProductListing, SyncError> {
        new_product.product.validate()?;
        if new_product.image_urls.iter().any(|url| url.trim().is_empty()) {
            return Err(SyncError::validation("image url is required"));
        }
        let positions = image_positions(new_product.image_urls.len())?;

        let product = self
            .store
            .table::<Product>()
            .insert(owner_id, &new_product.product)?;

        let images = self.store.table::<ProductImage>();
        let mut inserted = Vec::with_capacity(new_product.image_urls.len());
        for (position, url) in positions.zip(new_product.image_urls) {
            let image = images.insert(
                owner_id,
                &ProductImage {
                    product_id: product.id.clone(),
                    image_url: url,
                    position,
                },
            );
            match image {
                Ok(image) => inserted.push(image),
                Err(e) => {
                    self.roll_back(&product.id);
                    return Err(e);
                }
            }
        }

        info!(product_id = %product.id, images = inserted.len(), "product added");
        Ok(ProductListing {
            product,
            images: inserted,
        })
    }

    /// The owner's products, newest first.
    pub fn list(&self, owner_id: &str) -> Result<Vec<ProductListing>, SyncError> {
        let products = self.store.table::<Product>().list(owner_id)?;
        let mut by_product: HashMap<String, Vec<Row<ProductImage>>> = HashMap::new();
        for image in self.store.table::<ProductImage>().list(owner_id)? {
            by_product
                .entry(image.data.product_id.clone())
                .or_default()
                .push(image);
        }

        Ok(products
            .into_iter()
            .map(|product| {
                let mut images = by_product.remove(&product.id).unwrap_or_default();
                images.sort_by_key(|image| image.data.position);
                ProductListing { product, images }
            })
            .collect())
    }

    /// One of the owner's products with its images.
    pub fn get(&self, owner_id: &str, id: &str) -> Result<ProductListing, SyncError> {
        let product = self.store.table::<Product>().require_owned(owner_id, id)?.data;
        let mut images = self
            .store
            .table::<ProductImage>()
            .select(&Query::new().eq("product_id", id))?;
        images.sort_by_key(|image| image.data.position);
        Ok(ProductListing { product, images })
    }

    /// Delete one of the owner's products: its images, then the product. If
    /// removing the images fails the product is left alone. Returns how many
    /// images went.
    pub fn delete(&self, owner_id: &str, id: &str) -> Result<usize, SyncError> {
        let products = self.store.table::<Product>();
        products.require_owned(owner_id, id)?;
        let removed = self
            .store
            .table::<ProductImage>()
            .delete_where("product_id", id)?;
        products.delete(id)?;
        debug!(product_id = id, images = removed, "product deleted");
        Ok(removed)
    }

    fn roll_back(&self, product_id: &str) {
        let undone = self
            .store
            .table::<ProductImage>()
            .delete_where("product_id", product_id)
            .and_then(|_| self.store.table::<Product>().delete(product_id));
        match undone {
            Ok(()) => debug!(product_id, "partial product rolled back"),
            Err(e) => warn!(product_id, error = %e, "partial product left behind"),
        }
    }
}

/// Display positions for `count` images.
fn image_positions(count: usize) -> Result<Range<u32>, SyncError> {
    let end = u32::try_from(count)
        .map_err(|_| SyncError::validation(format!("{} images is more than a product can hold", count)))?;
    Ok(0..end)
}
