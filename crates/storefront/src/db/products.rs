//! Product and category repository.

use std::collections::{BTreeSet, HashMap};

use sqlx::{PgConnection, PgPool};

use corner_shop_core::{CategoryId, Price, ProductId};

use super::{RepositoryError, to_i32, to_u32};
use crate::models::{Category, NewProduct, Product, ProductPatch};

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: ProductId,
    name: String,
    price: Price,
    stock: i32,
    description: String,
    image_url: String,
}

impl ProductRow {
    fn into_product(self, categories: Vec<Category>) -> Result<Product, RepositoryError> {
        Ok(Product {
            id: self.id,
            name: self.name,
            price: self.price,
            stock: to_u32(self.stock, "stock")?,
            description: self.description,
            image_url: self.image_url,
            categories,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ProductCategoryRow {
    product_id: ProductId,
    id: CategoryId,
    name: String,
}

#[derive(sqlx::FromRow)]
struct CategoryRow {
    id: CategoryId,
    name: String,
}

impl From<CategoryRow> for Category {
    fn from(row: CategoryRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
        }
    }
}

const PRODUCT_COLUMNS: &str = "id, name, price, stock, description, image_url";

/// Repository for product database operations.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Every product with its categories, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn list(&self) -> Result<Vec<Product>, RepositoryError> {
        let rows: Vec<ProductRow> = sqlx::query_as(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM shop.product ORDER BY id"
        ))
        .fetch_all(self.pool)
        .await?;

        let links: Vec<ProductCategoryRow> = sqlx::query_as(
            r"
            SELECT pc.product_id, c.id, c.name
            FROM shop.product_category pc
            JOIN shop.category c ON c.id = pc.category_id
            ORDER BY pc.product_id, c.id
            ",
        )
        .fetch_all(self.pool)
        .await?;

        let mut by_product: HashMap<ProductId, Vec<Category>> = HashMap::new();
        for link in links {
            by_product.entry(link.product_id).or_default().push(Category {
                id: link.id,
                name: link.name,
            });
        }

        rows.into_iter()
            .map(|row| {
                let categories = by_product.remove(&row.id).unwrap_or_default();
                row.into_product(categories)
            })
            .collect()
    }

    /// Get a product by its ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        fetch_product(&mut conn, id).await
    }

    /// Number of products.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count(&self) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM shop.product")
            .fetch_one(self.pool)
            .await?;
        u64::try_from(count)
            .map_err(|_| RepositoryError::DataCorruption(format!("negative count: {count}")))
    }

    /// Insert a product and link its categories, creating missing ones.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a statement fails.
    pub async fn create(&self, product: &NewProduct) -> Result<Product, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row: ProductRow = sqlx::query_as(&format!(
            r"
            INSERT INTO shop.product (name, price, stock, description, image_url)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {PRODUCT_COLUMNS}
            "
        ))
        .bind(&product.name)
        .bind(product.price)
        .bind(to_i32(product.stock, "stock")?)
        .bind(&product.description)
        .bind(&product.image_url)
        .fetch_one(&mut *tx)
        .await?;

        let categories = attach_categories(&mut tx, row.id, &product.categories).await?;
        tx.commit().await?;

        row.into_product(categories)
    }

    /// Apply a partial update under the product's row lock.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    /// Returns `RepositoryError::Database` if a statement fails.
    pub async fn update(
        &self,
        id: ProductId,
        patch: &ProductPatch,
    ) -> Result<Product, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let stock = patch.stock.map(|s| to_i32(s, "stock")).transpose()?;
        let row: ProductRow = sqlx::query_as(&format!(
            r"
            UPDATE shop.product
            SET name = COALESCE($2, name),
                price = COALESCE($3, price),
                stock = COALESCE($4, stock),
                description = COALESCE($5, description),
                image_url = COALESCE($6, image_url),
                updated_at = now()
            WHERE id = $1
            RETURNING {PRODUCT_COLUMNS}
            "
        ))
        .bind(id)
        .bind(patch.name.as_deref())
        .bind(patch.price)
        .bind(stock)
        .bind(patch.description.as_deref())
        .bind(patch.image_url.as_deref())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        let categories = match &patch.categories {
            Some(names) => {
                sqlx::query("DELETE FROM shop.product_category WHERE product_id = $1")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                attach_categories(&mut tx, id, names).await?
            }
            None => fetch_categories(&mut tx, id).await?,
        };

        tx.commit().await?;
        row.into_product(categories)
    }

    /// Delete a product. Category links and cart lines cascade.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    pub async fn delete(&self, id: ProductId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM shop.product WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// All categories, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn categories(&self) -> Result<Vec<Category>, RepositoryError> {
        let rows: Vec<CategoryRow> =
            sqlx::query_as("SELECT id, name FROM shop.category ORDER BY id")
                .fetch_all(self.pool)
                .await?;
        Ok(rows.into_iter().map(Category::from).collect())
    }

    /// Delete a category and return the products that carried it.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the category does not exist.
    pub async fn delete_category(&self, id: CategoryId) -> Result<Vec<ProductId>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let affected: Vec<ProductId> = sqlx::query_scalar(
            "SELECT product_id FROM shop.product_category WHERE category_id = $1 ORDER BY product_id",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        let result = sqlx::query("DELETE FROM shop.category WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        tx.commit().await?;
        Ok(affected)
    }
}

async fn fetch_product(
    conn: &mut PgConnection,
    id: ProductId,
) -> Result<Option<Product>, RepositoryError> {
    let row: Option<ProductRow> = sqlx::query_as(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM shop.product WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => {
            let categories = fetch_categories(conn, id).await?;
            row.into_product(categories).map(Some)
        }
        None => Ok(None),
    }
}

async fn fetch_categories(
    conn: &mut PgConnection,
    product: ProductId,
) -> Result<Vec<Category>, RepositoryError> {
    let rows: Vec<CategoryRow> = sqlx::query_as(
        r"
        SELECT c.id, c.name
        FROM shop.product_category pc
        JOIN shop.category c ON c.id = pc.category_id
        WHERE pc.product_id = $1
        ORDER BY c.id
        ",
    )
    .bind(product)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows.into_iter().map(Category::from).collect())
}

/// Get-or-create each named category and link it to `product`.
async fn attach_categories(
    conn: &mut PgConnection,
    product: ProductId,
    names: &[String],
) -> Result<Vec<Category>, RepositoryError> {
    let names: BTreeSet<&str> = names
        .iter()
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .collect();

    let mut categories = Vec::with_capacity(names.len());
    for name in names {
        let row: CategoryRow = sqlx::query_as(
            r"
            INSERT INTO shop.category (name) VALUES ($1)
            ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
            RETURNING id, name
            ",
        )
        .bind(name)
        .fetch_one(&mut *conn)
        .await?;

        sqlx::query(
            r"
            INSERT INTO shop.product_category (product_id, category_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            ",
        )
        .bind(product)
        .bind(row.id)
        .execute(&mut *conn)
        .await?;

        categories.push(Category::from(row));
    }

    categories.sort_by_key(|c| c.id);
    Ok(categories)
}
