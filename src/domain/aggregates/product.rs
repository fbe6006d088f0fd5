//! Product Aggregate
//!
//! Catalog records for records, CDs and cassettes, with their embedded
//! reviews. Updates arrive as typed patches that are validated before they
//! are merged; unknown fields are rejected at deserialization.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::domain::value_objects::{PrincipalId, ProductId};

/// Declares a catalog enum together with its stored and displayed names.
macro_rules! wire_enum {
    ($name:ident { $($variant:ident => $wire:literal),+ $(,)? }) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $wire)] $variant,)+
        }

        impl $name {
            /// Name as stored and shown, e.g. `"Hip Hop"`.
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $wire,)+
                }
            }
        }
    };
}

wire_enum!(Genre {
    Rock => "Rock",
    Jazz => "Jazz",
    Classical => "Classical",
    Pop => "Pop",
    HipHop => "Hip Hop",
    Electronic => "Electronic",
    Other => "Other",
});

wire_enum!(Condition {
    New => "New",
    LikeNew => "Like New",
    VeryGood => "Very Good",
    Good => "Good",
    Fair => "Fair",
    Poor => "Poor",
});

wire_enum!(Format {
    Vinyl => "Vinyl",
    Cd => "CD",
    Cassette => "Cassette",
});

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub author_id: PrincipalId,
    pub author_name: String,
    pub rating: u8,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

/// What the cart needs to know about a product.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatalogProduct {
    pub id: ProductId,
    pub unit_price: Decimal,
    pub available_stock: u32,
    pub display_name: String,
    pub image_ref: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    id: ProductId,
    title: String,
    artist: String,
    description: String,
    price: Decimal,
    genre: Genre,
    condition: Condition,
    format: Format,
    release_year: i32,
    stock: u32,
    images: Vec<String>,
    rating: Decimal,
    num_reviews: u32,
    reviews: Vec<Review>,
    version: i32,
    created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct NewProduct {
    #[validate(length(min = 1, max = 100, message = "title must be 1 to 100 characters"))]
    pub title: String,
    #[validate(length(min = 1, message = "artist is required"))]
    pub artist: String,
    #[validate(length(min = 1, message = "description is required"))]
    pub description: String,
    #[validate(custom = "non_negative")]
    pub price: Decimal,
    pub genre: Genre,
    pub condition: Condition,
    pub format: Format,
    #[validate(range(min = 1877, max = 2100, message = "release year is out of range"))]
    pub release_year: i32,
    pub stock: u32,
    #[validate(length(min = 1, message = "at least one image is required"))]
    pub images: Vec<String>,
}

/// Partial update; absent fields keep their current value.
#[derive(Clone, Debug, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ProductPatch {
    #[validate(length(min = 1, max = 100, message = "title must be 1 to 100 characters"))]
    pub title: Option<String>,
    #[validate(length(min = 1, message = "artist is required"))]
    pub artist: Option<String>,
    #[validate(length(min = 1, message = "description is required"))]
    pub description: Option<String>,
    #[validate(custom = "non_negative")]
    pub price: Option<Decimal>,
    pub genre: Option<Genre>,
    pub condition: Option<Condition>,
    pub format: Option<Format>,
    #[validate(range(min = 1877, max = 2100, message = "release year is out of range"))]
    pub release_year: Option<i32>,
    pub stock: Option<u32>,
    #[validate(length(min = 1, message = "at least one image is required"))]
    pub images: Option<Vec<String>>,
}

fn non_negative(price: &Decimal) -> Result<(), ValidationError> {
    if price.is_sign_negative() && !price.is_zero() {
        return Err(ValidationError::new("price cannot be negative"));
    }
    Ok(())
}

impl Product {
    pub fn create(input: NewProduct, now: DateTime<Utc>) -> Result<Self, ProductError> {
        input.validate()?;
        let NewProduct { title, artist, description, price, genre, condition, format, release_year, stock, images } = input;
        Ok(Self {
            id: ProductId::generate(),
            title: title.trim().to_string(),
            artist: artist.trim().to_string(),
            description,
            price,
            genre,
            condition,
            format,
            release_year,
            stock,
            images,
            rating: Decimal::ZERO,
            num_reviews: 0,
            reviews: vec![],
            version: 1,
            created_at: now,
        })
    }

    pub fn id(&self) -> ProductId { self.id }
    pub fn title(&self) -> &str { &self.title }
    pub fn artist(&self) -> &str { &self.artist }
    pub fn price(&self) -> Decimal { self.price }
    pub fn genre(&self) -> Genre { self.genre }
    pub fn condition(&self) -> Condition { self.condition }
    pub fn format(&self) -> Format { self.format }
    pub fn stock(&self) -> u32 { self.stock }
    pub fn rating(&self) -> Decimal { self.rating }
    pub fn num_reviews(&self) -> u32 { self.num_reviews }
    pub fn reviews(&self) -> &[Review] { &self.reviews }
    pub fn version(&self) -> i32 { self.version }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn is_in_stock(&self) -> bool { self.stock > 0 }

    pub fn catalog_entry(&self) -> CatalogProduct {
        CatalogProduct {
            id: self.id,
            unit_price: self.price,
            available_stock: self.stock,
            display_name: format!("{} - {}", self.artist, self.title),
            image_ref: self.images.first().cloned().unwrap_or_default(),
        }
    }

    /// Validates `patch` and merges it. Nothing changes if validation fails.
    pub fn apply_patch(&mut self, patch: ProductPatch) -> Result<(), ProductError> {
        patch.validate()?;
        if let Some(title) = patch.title { self.title = title.trim().to_string(); }
        if let Some(artist) = patch.artist { self.artist = artist.trim().to_string(); }
        if let Some(description) = patch.description { self.description = description; }
        if let Some(price) = patch.price { self.price = price; }
        if let Some(genre) = patch.genre { self.genre = genre; }
        if let Some(condition) = patch.condition { self.condition = condition; }
        if let Some(format) = patch.format { self.format = format; }
        if let Some(year) = patch.release_year { self.release_year = year; }
        if let Some(stock) = patch.stock { self.stock = stock; }
        if let Some(images) = patch.images { self.images = images; }
        self.version += 1;
        Ok(())
    }

    pub fn has_review_from(&self, author: PrincipalId) -> bool {
        self.reviews.iter().any(|r| r.author_id == author)
    }

    /// Adds a review and refreshes the average rating. One review per author.
    pub fn add_review(&mut self, review: Review) -> Result<(), ProductError> {
        if !(1..=5).contains(&review.rating) {
            return Err(ProductError::InvalidRating(review.rating));
        }
        if self.has_review_from(review.author_id) {
            return Err(ProductError::AlreadyReviewed);
        }
        self.reviews.push(review);
        self.recalculate_rating();
        self.version += 1;
        Ok(())
    }

    fn recalculate_rating(&mut self) {
        self.num_reviews = u32::try_from(self.reviews.len()).unwrap_or(u32::MAX);
        let sum: u32 = self.reviews.iter().map(|r| u32::from(r.rating)).sum();
        self.rating = if self.num_reviews == 0 {
            Decimal::ZERO
        } else {
            (Decimal::from(sum) / Decimal::from(self.num_reviews)).round_dp(2)
        };
    }
}

/// Catalog query; every set field must match.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProductFilter {
    /// Case-insensitive match against title, artist or genre.
    pub keyword: Option<String>,
    pub genre: Option<Genre>,
    pub condition: Option<Condition>,
    pub format: Option<Format>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
}

impl ProductFilter {
    pub fn keyword(&self) -> Option<&str> {
        self.keyword.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }

    pub fn matches(&self, p: &Product) -> bool {
        if let Some(keyword) = self.keyword() {
            let needle = keyword.to_lowercase();
            let hit = [p.title.to_lowercase(), p.artist.to_lowercase(), p.genre.as_str().to_lowercase()]
                .iter()
                .any(|field| field.contains(&needle));
            if !hit {
                return false;
            }
        }
        self.genre.map_or(true, |g| g == p.genre)
            && self.condition.map_or(true, |c| c == p.condition)
            && self.format.map_or(true, |f| f == p.format)
            && self.min_price.map_or(true, |min| p.price >= min)
            && self.max_price.map_or(true, |max| p.price <= max)
    }
}

#[derive(Debug, Error)]
pub enum ProductError {
    #[error("invalid product: {0}")]
    Invalid(#[from] ValidationErrors),
    #[error("rating must be between 1 and 5, got {0}")]
    InvalidRating(u8),
    #[error("Product already reviewed")]
    AlreadyReviewed,
}
