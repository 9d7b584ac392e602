//! Cart repository.
//!
//! A cart row is keyed by either `user_id` or `anonymous_token`; both columns
//! are `UNIQUE` and a `CHECK` constraint keeps exactly one of them set.

use sqlx::PgPool;

use corner_shop_core::{AnonymousCartToken, CartId, CartOwner, Price, ProductId, UserId};

use super::{RepositoryError, to_i32, to_u32};
use crate::models::{Cart, CartAbsorb, CartItemView};

#[derive(sqlx::FromRow)]
struct CartRow {
    id: CartId,
    user_id: Option<UserId>,
    anonymous_token: Option<AnonymousCartToken>,
}

impl TryFrom<CartRow> for Cart {
    type Error = RepositoryError;

    fn try_from(row: CartRow) -> Result<Self, Self::Error> {
        let owner = match (row.user_id, row.anonymous_token) {
            (Some(user), None) => CartOwner::User(user),
            (None, Some(token)) => CartOwner::Anonymous(token),
            _ => {
                return Err(RepositoryError::DataCorruption(format!(
                    "cart {} must have exactly one owner",
                    row.id
                )));
            }
        };
        Ok(Self { id: row.id, owner })
    }
}

#[derive(sqlx::FromRow)]
struct CartItemRow {
    product_id: ProductId,
    name: String,
    price: Price,
    image_url: String,
    quantity: i32,
    stock: i32,
}

impl TryFrom<CartItemRow> for CartItemView {
    type Error = RepositoryError;

    fn try_from(row: CartItemRow) -> Result<Self, Self::Error> {
        Ok(Self {
            product_id: row.product_id,
            name: row.name,
            price: row.price,
            image_url: row.image_url,
            quantity: to_u32(row.quantity, "quantity")?,
            stock: to_u32(row.stock, "stock")?,
        })
    }
}

/// Repository for cart database operations.
pub struct CartRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CartRepository<'a> {
    /// Create a new cart repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Find the owner's cart.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find(&self, owner: &CartOwner) -> Result<Option<Cart>, RepositoryError> {
        let row: Option<CartRow> = match owner {
            CartOwner::User(user) => {
                sqlx::query_as(
                    "SELECT id, user_id, anonymous_token FROM shop.cart WHERE user_id = $1",
                )
                .bind(*user)
                .fetch_optional(self.pool)
                .await?
            }
            CartOwner::Anonymous(token) => {
                sqlx::query_as(
                    "SELECT id, user_id, anonymous_token FROM shop.cart WHERE anonymous_token = $1",
                )
                .bind(*token)
                .fetch_optional(self.pool)
                .await?
            }
        };
        row.map(Cart::try_from).transpose()
    }

    /// Find or create the owner's cart.
    ///
    /// Racing creators both succeed: the loser's insert is a no-op and it reads
    /// the winner's row.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn get_or_create(&self, owner: &CartOwner) -> Result<Cart, RepositoryError> {
        let inserted: Option<CartRow> = match owner {
            CartOwner::User(user) => {
                sqlx::query_as(
                    r"
                    INSERT INTO shop.cart (user_id) VALUES ($1)
                    ON CONFLICT (user_id) DO NOTHING
                    RETURNING id, user_id, anonymous_token
                    ",
                )
                .bind(*user)
                .fetch_optional(self.pool)
                .await?
            }
            CartOwner::Anonymous(token) => {
                sqlx::query_as(
                    r"
                    INSERT INTO shop.cart (anonymous_token) VALUES ($1)
                    ON CONFLICT (anonymous_token) DO NOTHING
                    RETURNING id, user_id, anonymous_token
                    ",
                )
                .bind(*token)
                .fetch_optional(self.pool)
                .await?
            }
        };

        match inserted {
            Some(row) => Cart::try_from(row),
            None => self.find(owner).await?.ok_or(RepositoryError::NotFound),
        }
    }

    /// Quantity of one line, if present.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn line(
        &self,
        cart: CartId,
        product: ProductId,
    ) -> Result<Option<u32>, RepositoryError> {
        let quantity: Option<i32> = sqlx::query_scalar(
            "SELECT quantity FROM shop.cart_item WHERE cart_id = $1 AND product_id = $2",
        )
        .bind(cart)
        .bind(product)
        .fetch_optional(self.pool)
        .await?;
        quantity.map(|q| to_u32(q, "quantity")).transpose()
    }

    /// Add to a line in one statement, capped at `stock`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the statement fails.
    pub async fn add_to_line(
        &self,
        cart: CartId,
        product: ProductId,
        requested: u32,
        stock: u32,
    ) -> Result<u32, RepositoryError> {
        // BIGINT arithmetic so existing + requested cannot overflow INTEGER
        let quantity: i32 = sqlx::query_scalar(
            r"
            INSERT INTO shop.cart_item (cart_id, product_id, quantity)
            VALUES ($1, $2, LEAST($3::BIGINT, $4::BIGINT)::INTEGER)
            ON CONFLICT (cart_id, product_id) DO UPDATE
            SET quantity = LEAST(shop.cart_item.quantity::BIGINT + $3::BIGINT, $4::BIGINT)::INTEGER,
                updated_at = now()
            RETURNING quantity
            ",
        )
        .bind(cart)
        .bind(product)
        .bind(i64::from(requested))
        .bind(i64::from(stock))
        .fetch_one(self.pool)
        .await?;
        to_u32(quantity, "quantity")
    }

    /// Overwrite an existing line.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the statement fails.
    pub async fn set_line(
        &self,
        cart: CartId,
        product: ProductId,
        quantity: u32,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE shop.cart_item SET quantity = $3, updated_at = now()
            WHERE cart_id = $1 AND product_id = $2
            ",
        )
        .bind(cart)
        .bind(product)
        .bind(to_i32(quantity, "quantity")?)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete one line.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the statement fails.
    pub async fn remove_line(
        &self,
        cart: CartId,
        product: ProductId,
    ) -> Result<bool, RepositoryError> {
        let result =
            sqlx::query("DELETE FROM shop.cart_item WHERE cart_id = $1 AND product_id = $2")
                .bind(cart)
                .bind(product)
                .execute(self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete the lines for several products.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the statement fails.
    pub async fn remove_lines(
        &self,
        cart: CartId,
        products: &[ProductId],
    ) -> Result<u64, RepositoryError> {
        let ids: Vec<i32> = products.iter().map(ProductId::as_i32).collect();
        let result =
            sqlx::query("DELETE FROM shop.cart_item WHERE cart_id = $1 AND product_id = ANY($2)")
                .bind(cart)
                .bind(ids)
                .execute(self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    /// Delete every line of a cart.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the statement fails.
    pub async fn clear(&self, cart: CartId) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM shop.cart_item WHERE cart_id = $1")
            .bind(cart)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Lines joined with the live product rows.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn items(&self, cart: CartId) -> Result<Vec<CartItemView>, RepositoryError> {
        let rows: Vec<CartItemRow> = sqlx::query_as(
            r"
            SELECT ci.product_id, p.name, p.price, p.image_url, ci.quantity, p.stock
            FROM shop.cart_item ci
            JOIN shop.product p ON p.id = ci.product_id
            WHERE ci.cart_id = $1
            ORDER BY ci.product_id
            ",
        )
        .bind(cart)
        .fetch_all(self.pool)
        .await?;
        rows.into_iter().map(CartItemView::try_from).collect()
    }

    /// Fold every line of `from` into `into` and delete `from`, in one
    /// transaction.
    ///
    /// The source row and its lines are locked first. Each upsert computes
    /// the merged quantity from the target line as it stands at that moment
    /// and the live product stock, so a concurrent add to `into` is kept. The
    /// result never drops below the existing target quantity.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if `from` no longer exists.
    /// Returns `RepositoryError::Database` if a statement fails.
    pub async fn absorb(
        &self,
        from: CartId,
        into: CartId,
    ) -> Result<CartAbsorb, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let locked: Option<CartId> =
            sqlx::query_scalar("SELECT id FROM shop.cart WHERE id = $1 FOR UPDATE")
                .bind(from)
                .fetch_optional(&mut *tx)
                .await?;
        if locked.is_none() {
            return Err(RepositoryError::NotFound);
        }

        let incoming: Vec<ProductId> = sqlx::query_scalar(
            "SELECT product_id FROM shop.cart_item WHERE cart_id = $1 ORDER BY product_id FOR UPDATE",
        )
        .bind(from)
        .fetch_all(&mut *tx)
        .await?;

        let merged: Vec<ProductId> = sqlx::query_scalar(
            r"
            INSERT INTO shop.cart_item AS target (cart_id, product_id, quantity)
            SELECT $2, src.product_id, LEAST(src.quantity, p.stock)
            FROM shop.cart_item src
            JOIN shop.product p ON p.id = src.product_id
            WHERE src.cart_id = $1 AND p.stock > 0
            ORDER BY src.product_id
            ON CONFLICT (cart_id, product_id) DO UPDATE
            SET quantity = GREATEST(
                    target.quantity,
                    LEAST(
                        target.quantity + (
                            SELECT s.quantity FROM shop.cart_item s
                            WHERE s.cart_id = $1 AND s.product_id = EXCLUDED.product_id
                        ),
                        (SELECT p2.stock FROM shop.product p2 WHERE p2.id = EXCLUDED.product_id)
                    )
                ),
                updated_at = now()
            RETURNING product_id
            ",
        )
        .bind(from)
        .bind(into)
        .fetch_all(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM shop.cart_item WHERE cart_id = $1")
            .bind(from)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM shop.cart WHERE id = $1")
            .bind(from)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let dropped = incoming
            .into_iter()
            .filter(|product| !merged.contains(product))
            .collect();
        Ok(CartAbsorb { merged, dropped })
    }
}
