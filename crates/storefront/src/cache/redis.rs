//! Redis sorted-set catalog cache.
//!
//! One key (default `products`) holds every product: score is the product id,
//! member is the JSON snapshot. Replacing an entry removes whatever member has
//! that score and adds the new one in a single `MULTI`.

use async_trait::async_trait;
use redis::{AsyncCommands, Client, aio::ConnectionManager};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};

use corner_shop_core::{PageRequest, ProductId};

use super::{CacheError, CatalogCache};
use crate::models::Product;

/// [`CatalogCache`] backed by a Redis sorted set.
#[derive(Clone)]
pub struct RedisCatalog {
    conn: ConnectionManager,
    key: String,
}

impl RedisCatalog {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Redis` if the URL is invalid or the connection
    /// cannot be established.
    pub async fn connect(url: &SecretString, key: &str) -> Result<Self, CacheError> {
        let client = Client::open(url.expose_secret())?;
        let conn = ConnectionManager::new(client).await?;
        info!(key = %key, "Connected to Redis catalog cache");
        Ok(Self {
            conn,
            key: key.to_string(),
        })
    }

    fn decode(members: &[String]) -> Result<Vec<Product>, CacheError> {
        members
            .iter()
            .map(|m| serde_json::from_str(m).map_err(CacheError::from))
            .collect()
    }
}

fn index(value: u64) -> isize {
    isize::try_from(value).unwrap_or(isize::MAX)
}

#[async_trait]
impl CatalogCache for RedisCatalog {
    async fn range(&self, page: PageRequest) -> Result<Vec<Product>, CacheError> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn
            .zrange(
                &self.key,
                index(u64::from(page.offset())),
                index(page.last_index()),
            )
            .await?;
        Self::decode(&members)
    }

    async fn len(&self) -> Result<u64, CacheError> {
        let mut conn = self.conn.clone();
        let count: u64 = conn.zcard(&self.key).await?;
        Ok(count)
    }

    async fn scan(&self) -> Result<Vec<Product>, CacheError> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn.zrange(&self.key, 0, -1).await?;
        Self::decode(&members)
    }

    async fn upsert(&self, product: &Product) -> Result<(), CacheError> {
        let member = serde_json::to_string(product)?;
        let score = product.id.score();
        let mut conn = self.conn.clone();

        let _: () = redis::pipe()
            .atomic()
            .zrembyscore(&self.key, score, score)
            .ignore()
            .zadd(&self.key, member, score)
            .ignore()
            .query_async(&mut conn)
            .await?;

        debug!(product_id = %product.id, "Upserted catalog entry");
        Ok(())
    }

    async fn remove(&self, id: ProductId) -> Result<(), CacheError> {
        let score = id.score();
        let mut conn = self.conn.clone();
        let _: () = conn.zrembyscore(&self.key, score, score).await?;
        debug!(product_id = %id, "Removed catalog entry");
        Ok(())
    }

    async fn replace_all(&self, products: &[Product]) -> Result<(), CacheError> {
        let items = products
            .iter()
            .map(|p| Ok((p.id.score(), serde_json::to_string(p)?)))
            .collect::<Result<Vec<(f64, String)>, CacheError>>()?;

        let mut pipe = redis::pipe();
        pipe.atomic().del(&self.key).ignore();
        // ZADD with no members is a syntax error
        if !items.is_empty() {
            pipe.zadd_multiple(&self.key, &items).ignore();
        }

        let mut conn = self.conn.clone();
        let _: () = pipe.query_async(&mut conn).await?;

        info!(key = %self.key, count = items.len(), "Rebuilt catalog cache");
        Ok(())
    }
}
