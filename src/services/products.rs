//! Catalog management and reviews.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::instrument;
use validator::Validate;

use super::{require_admin, ServiceError, ServiceResult};
use crate::domain::aggregates::{NewProduct, Product, ProductError, ProductFilter, ProductPatch, Review};
use crate::domain::events::ProductEvent;
use crate::domain::value_objects::{Principal, ProductId};
use crate::events::EventPublisher;
use crate::repository::{PageRequest, ProductPage, ProductRepository, ReviewInsert};

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ReviewInput {
    #[validate(range(min = 1, max = 5, message = "rating must be between 1 and 5"))]
    pub rating: u8,
    #[validate(length(min = 1, max = 2000, message = "comment is required"))]
    pub comment: String,
}

#[derive(Clone)]
pub struct ProductService {
    products: Arc<dyn ProductRepository>,
    events: EventPublisher,
}

impl ProductService {
    pub fn new(products: Arc<dyn ProductRepository>, events: EventPublisher) -> Self {
        Self { products, events }
    }

    pub async fn list(&self, filter: &ProductFilter, page: PageRequest) -> ServiceResult<ProductPage> {
        Ok(self.products.list(filter, page).await?)
    }

    pub async fn get(&self, id: ProductId) -> ServiceResult<Product> {
        self.products.find_by_id(id).await?.ok_or(ServiceError::NotFound("product"))
    }

    #[instrument(skip(self, actor, input), fields(principal_id = %actor.id))]
    pub async fn create(&self, actor: &Principal, input: NewProduct) -> ServiceResult<Product> {
        require_admin(actor)?;
        let product = Product::create(input, Utc::now())?;
        self.products.insert(&product).await?;
        tracing::info!(product_id = %product.id(), "product created");
        self.events.publish(ProductEvent::Created { product_id: product.id() }).await;
        Ok(product)
    }

    #[instrument(skip(self, actor, patch), fields(principal_id = %actor.id))]
    pub async fn update(&self, actor: &Principal, id: ProductId, patch: ProductPatch) -> ServiceResult<Product> {
        require_admin(actor)?;
        let mut product = self.get(id).await?;
        let expected = product.version();
        product.apply_patch(patch)?;
        if !self.products.update(&product, expected).await? {
            return Err(ServiceError::Conflict("product was modified concurrently, reload and retry".into()));
        }
        self.events.publish(ProductEvent::Updated { product_id: id, version: product.version() }).await;
        Ok(product)
    }

    #[instrument(skip(self, actor), fields(principal_id = %actor.id))]
    pub async fn delete(&self, actor: &Principal, id: ProductId) -> ServiceResult<()> {
        require_admin(actor)?;
        if !self.products.delete(id).await? {
            return Err(ServiceError::NotFound("product"));
        }
        tracing::info!(product_id = %id, "product deleted");
        self.events.publish(ProductEvent::Deleted { product_id: id }).await;
        Ok(())
    }

    /// Adds the actor's review. A principal reviews a product at most once.
    #[instrument(skip(self, actor, input), fields(principal_id = %actor.id))]
    pub async fn add_review(&self, actor: &Principal, id: ProductId, input: ReviewInput) -> ServiceResult<Product> {
        input.validate().map_err(ProductError::from)?;
        let mut product = self.get(id).await?;
        let review = Review {
            author_id: actor.id,
            author_name: actor.name.clone().unwrap_or_else(|| "Anonymous".to_string()),
            rating: input.rating,
            comment: input.comment.trim().to_string(),
            created_at: Utc::now(),
        };
        product.add_review(review.clone())?;
        match self.products.add_review(&product, &review).await? {
            ReviewInsert::Added => {}
            ReviewInsert::Duplicate => return Err(ProductError::AlreadyReviewed.into()),
        }
        self.events.publish(ProductEvent::Reviewed { product_id: id, rating: input.rating }).await;
        Ok(product)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::domain::aggregates::product::{Condition, Format, Genre};
    use crate::domain::value_objects::PrincipalId;
    use crate::repository::InMemoryProductRepository;

    fn service() -> ProductService {
        ProductService::new(Arc::new(InMemoryProductRepository::new()), EventPublisher::disabled())
    }

    fn new_product() -> NewProduct {
        NewProduct {
            title: "Kind of Blue".into(),
            artist: "Miles Davis".into(),
            description: "1959 Columbia pressing".into(),
            price: Decimal::new(2500, 2),
            genre: Genre::Jazz,
            condition: Condition::VeryGood,
            format: Format::Vinyl,
            release_year: 1959,
            stock: 3,
            images: vec!["/img/kind-of-blue.jpg".into()],
        }
    }

    fn review(rating: u8) -> ReviewInput {
        ReviewInput { rating, comment: "Essential".into() }
    }

    #[tokio::test]
    async fn test_only_admins_manage_catalog() {
        let svc = service();
        let customer = Principal::customer(PrincipalId::generate());
        assert!(matches!(svc.create(&customer, new_product()).await, Err(ServiceError::Forbidden)));

        let admin = Principal::admin(PrincipalId::generate());
        let product = svc.create(&admin, new_product()).await.unwrap();
        let patch = ProductPatch { price: Some(Decimal::new(2200, 2)), ..Default::default() };
        let updated = svc.update(&admin, product.id(), patch).await.unwrap();
        assert_eq!(updated.price(), Decimal::new(2200, 2));
        assert_eq!(updated.version(), 2);

        svc.delete(&admin, product.id()).await.unwrap();
        assert!(matches!(svc.get(product.id()).await, Err(ServiceError::NotFound(_))));
        assert!(matches!(svc.delete(&admin, product.id()).await, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_review_once_per_principal() {
        let svc = service();
        let admin = Principal::admin(PrincipalId::generate());
        let product = svc.create(&admin, new_product()).await.unwrap();

        let buyer = Principal { id: PrincipalId::generate(), name: Some("Ana".into()), is_admin: false };
        let reviewed = svc.add_review(&buyer, product.id(), review(4)).await.unwrap();
        assert_eq!(reviewed.num_reviews(), 1);
        assert_eq!(reviewed.reviews()[0].author_name, "Ana");

        let again = svc.add_review(&buyer, product.id(), review(5)).await;
        assert!(matches!(again, Err(ServiceError::Product(ProductError::AlreadyReviewed))));

        let other = Principal::customer(PrincipalId::generate());
        let reviewed = svc.add_review(&other, product.id(), review(5)).await.unwrap();
        assert_eq!(reviewed.rating(), Decimal::new(450, 2));
    }

    #[tokio::test]
    async fn test_review_rating_is_validated() {
        let svc = service();
        let admin = Principal::admin(PrincipalId::generate());
        let product = svc.create(&admin, new_product()).await.unwrap();
        let buyer = Principal::customer(PrincipalId::generate());
        assert!(matches!(svc.add_review(&buyer, product.id(), review(6)).await, Err(ServiceError::Product(ProductError::Invalid(_)))));
    }
}
