//! `PostgreSQL` repositories.
//!
//! Records are JSONB documents with a `version` column. Every write is
//! conditioned on the state read before it, so concurrent writers lose
//! cleanly (the statement affects zero rows) instead of overwriting.

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};

use super::{
    OrderRepository, PageRequest, ProductPage, ProductRepository, RepositoryError, ReviewInsert,
};
use crate::domain::aggregates::{Order, Product, ProductFilter, Review, StatusChange};
use crate::domain::value_objects::{OrderId, PrincipalId, ProductId};

#[derive(Clone, Debug)]
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self { Self { pool } }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn insert(&self, order: &Order) -> Result<OrderId, RepositoryError> {
        sqlx::query(
            "INSERT INTO orders (id, owner_id, status, version, created_at, document) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(order.id().as_uuid())
        .bind(order.owner_id().as_uuid())
        .bind(order.status().as_str())
        .bind(order.version())
        .bind(order.created_at())
        .bind(Json(order))
        .execute(&self.pool)
        .await?;
        Ok(order.id())
    }

    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row: Option<(Json<Order>,)> = sqlx::query_as("SELECT document FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(Json(order),)| order))
    }

    async fn find_by_owner(&self, owner: PrincipalId) -> Result<Vec<Order>, RepositoryError> {
        let rows: Vec<(Json<Order>,)> =
            sqlx::query_as("SELECT document FROM orders WHERE owner_id = $1 ORDER BY created_at DESC, id DESC")
                .bind(owner.as_uuid())
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(Json(order),)| order).collect())
    }

    async fn find_all(&self) -> Result<Vec<Order>, RepositoryError> {
        let rows: Vec<(Json<Order>,)> = sqlx::query_as("SELECT document FROM orders ORDER BY created_at DESC, id DESC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(Json(order),)| order).collect())
    }

    async fn apply_transition(&self, id: OrderId, change: &StatusChange) -> Result<bool, RepositoryError> {
        let Some(mut order) = self.find_by_id(id).await? else { return Ok(false) };
        let read_version = order.version();
        if !order.apply(change) {
            return Ok(false);
        }

        let result = sqlx::query(
            "UPDATE orders SET status = $3, version = $4, document = $5 \
             WHERE id = $1 AND status = $2 AND version = $6",
        )
        .bind(id.as_uuid())
        .bind(change.from.as_str())
        .bind(order.status().as_str())
        .bind(order.version())
        .bind(Json(&order))
        .bind(read_version)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[derive(Clone, Debug)]
pub struct PgProductRepository {
    pool: PgPool,
}

impl PgProductRepository {
    pub fn new(pool: PgPool) -> Self { Self { pool } }
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &ProductFilter) {
    qb.push(" WHERE TRUE");
    if let Some(keyword) = filter.keyword() {
        let pattern = format!("%{}%", keyword.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_"));
        qb.push(" AND (title ILIKE ").push_bind(pattern.clone());
        qb.push(" OR artist ILIKE ").push_bind(pattern.clone());
        qb.push(" OR genre ILIKE ").push_bind(pattern).push(")");
    }
    if let Some(genre) = filter.genre {
        qb.push(" AND genre = ").push_bind(genre.as_str());
    }
    if let Some(condition) = filter.condition {
        qb.push(" AND condition = ").push_bind(condition.as_str());
    }
    if let Some(format) = filter.format {
        qb.push(" AND format = ").push_bind(format.as_str());
    }
    if let Some(min) = filter.min_price {
        qb.push(" AND price >= ").push_bind(min);
    }
    if let Some(max) = filter.max_price {
        qb.push(" AND price <= ").push_bind(max);
    }
}

fn to_i64(value: u64, what: &str) -> Result<i64, RepositoryError> {
    i64::try_from(value).map_err(|_| RepositoryError::DataCorruption(format!("{what} out of range")))
}

#[async_trait]
impl ProductRepository for PgProductRepository {
    async fn list(&self, filter: &ProductFilter, page: PageRequest) -> Result<ProductPage, RepositoryError> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM products");
        push_filter(&mut count, filter);
        let (total,): (i64,) = count.build_query_as().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::new("SELECT document FROM products");
        push_filter(&mut select, filter);
        select
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(i64::from(page.size))
            .push(" OFFSET ")
            .push_bind(to_i64(page.offset(), "page offset")?);
        let rows: Vec<(Json<Product>,)> = select.build_query_as().fetch_all(&self.pool).await?;

        let total = u64::try_from(total).map_err(|_| RepositoryError::DataCorruption("negative count".into()))?;
        Ok(ProductPage::new(rows.into_iter().map(|(Json(p),)| p).collect(), page, total))
    }

    async fn find_by_id(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row: Option<(Json<Product>,)> = sqlx::query_as("SELECT document FROM products WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(Json(p),)| p))
    }

    async fn insert(&self, product: &Product) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO products (id, title, artist, genre, condition, format, price, version, created_at, document) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(product.id().as_uuid())
        .bind(product.title())
        .bind(product.artist())
        .bind(product.genre().as_str())
        .bind(product.condition().as_str())
        .bind(product.format().as_str())
        .bind(product.price())
        .bind(product.version())
        .bind(product.created_at())
        .bind(Json(product))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, product: &Product, expected_version: i32) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE products SET title = $2, artist = $3, genre = $4, condition = $5, format = $6, price = $7, \
             version = $8, document = $9 WHERE id = $1 AND version = $10",
        )
        .bind(product.id().as_uuid())
        .bind(product.title())
        .bind(product.artist())
        .bind(product.genre().as_str())
        .bind(product.condition().as_str())
        .bind(product.format().as_str())
        .bind(product.price())
        .bind(product.version())
        .bind(Json(product))
        .bind(expected_version)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete(&self, id: ProductId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn add_review(&self, product: &Product, review: &Review) -> Result<ReviewInsert, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO product_reviews (product_id, author_id, rating, created_at) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (product_id, author_id) DO NOTHING",
        )
        .bind(product.id().as_uuid())
        .bind(review.author_id.as_uuid())
        .bind(i16::from(review.rating))
        .bind(review.created_at)
        .execute(&mut *tx)
        .await?;
        if inserted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(ReviewInsert::Duplicate);
        }

        let updated = sqlx::query("UPDATE products SET version = $2, document = $3 WHERE id = $1 AND version = $4")
            .bind(product.id().as_uuid())
            .bind(product.version())
            .bind(Json(product))
            .bind(product.version() - 1)
            .execute(&mut *tx)
            .await?;
        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(RepositoryError::Conflict(format!("product {}", product.id())));
        }

        tx.commit().await?;
        Ok(ReviewInsert::Added)
    }
}
