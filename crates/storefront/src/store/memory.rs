//! In-process [`Store`] for development and tests.
//!
//! Mirrors the `PostgreSQL` semantics that checkout depends on:
//!
//! - each product has its own row lock (`tokio::sync::Mutex<()>`), held by a
//!   [`CheckoutTx`] from `lock_product` until commit or drop, and also taken
//!   by admin updates and deletes;
//! - checkout writes are staged and applied in one step at commit, so a
//!   dropped transaction leaves no trace;
//! - cart ownership keeps the one-cart-per-owner rule.
//!
//! Faults can be injected with [`MemoryStore::fail_next`] to exercise the
//! partial-failure paths.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use corner_shop_core::{
    CartId, CartOwner, CategoryId, OrderId, OrderStatus, Price, ProductId, UserId, clamp_to_stock,
    merged_quantity,
};

use super::{CartStore, CheckoutTx, OrderStore, ProductStore, RepositoryError, Store};
use crate::models::{
    Cart, CartAbsorb, CartItemView, Category, LockedProduct, NewOrder, NewProduct, OrderDetail, OrderLine,
    OrderSummary, Product, ProductPatch,
};

/// Operations that can be made to fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    /// `list_products` and `get_product`.
    ProductRead,
    /// `remove_lines`, used for post-checkout cart cleanup.
    CartCleanup,
    /// `CheckoutTx::insert_order`.
    OrderInsert,
}

#[derive(Debug, Clone)]
struct ProductRecord {
    name: String,
    price: Price,
    stock: u32,
    description: String,
    image_url: String,
}

#[derive(Debug, Clone)]
struct StoredOrder {
    user: UserId,
    detail: OrderDetail,
}

#[derive(Default)]
struct State {
    products: BTreeMap<ProductId, ProductRecord>,
    categories: BTreeMap<CategoryId, String>,
    links: BTreeSet<(ProductId, CategoryId)>,
    carts: BTreeMap<CartId, CartOwner>,
    lines: BTreeMap<(CartId, ProductId), u32>,
    orders: BTreeMap<OrderId, StoredOrder>,
    next_product: i32,
    next_category: i32,
    next_cart: i32,
}

impl State {
    fn product(&self, id: ProductId) -> Option<Product> {
        let record = self.products.get(&id)?;
        let categories = self
            .links
            .range((id, CategoryId::new(i32::MIN))..=(id, CategoryId::new(i32::MAX)))
            .filter_map(|(_, category)| {
                self.categories.get(category).map(|name| Category {
                    id: *category,
                    name: name.clone(),
                })
            })
            .collect();

        Some(Product {
            id,
            name: record.name.clone(),
            price: record.price,
            stock: record.stock,
            description: record.description.clone(),
            image_url: record.image_url.clone(),
            categories,
        })
    }

    fn category_named(&mut self, name: &str) -> CategoryId {
        if let Some((id, _)) = self.categories.iter().find(|(_, n)| n.as_str() == name) {
            return *id;
        }
        self.next_category += 1;
        let id = CategoryId::new(self.next_category);
        self.categories.insert(id, name.to_owned());
        id
    }

    fn link_categories(&mut self, product: ProductId, names: &[String]) {
        let names: BTreeSet<&str> = names
            .iter()
            .map(|n| n.trim())
            .filter(|n| !n.is_empty())
            .collect();
        for name in names {
            let category = self.category_named(name);
            self.links.insert((product, category));
        }
    }

    fn find_cart(&self, owner: &CartOwner) -> Option<Cart> {
        self.carts
            .iter()
            .find(|(_, o)| *o == owner)
            .map(|(id, owner)| Cart {
                id: *id,
                owner: *owner,
            })
    }

    fn cart_lines(&self, cart: CartId) -> impl Iterator<Item = (ProductId, u32)> + '_ {
        self.lines
            .range((cart, ProductId::new(i32::MIN))..=(cart, ProductId::new(i32::MAX)))
            .map(|((_, product), quantity)| (*product, *quantity))
    }

    fn require_line_targets(&self, cart: CartId, product: ProductId) -> Result<(), RepositoryError> {
        if !self.carts.contains_key(&cart) {
            return Err(RepositoryError::Conflict(format!("cart {cart} does not exist")));
        }
        if !self.products.contains_key(&product) {
            return Err(RepositoryError::Conflict(format!(
                "product {product} does not exist"
            )));
        }
        Ok(())
    }
}

#[derive(Default)]
struct Inner {
    state: Mutex<State>,
    row_locks: Mutex<HashMap<ProductId, Arc<Mutex<()>>>>,
    faults: Mutex<HashMap<FailPoint, usize>>,
    next_order: AtomicI32,
}

impl Inner {
    async fn row_lock(&self, id: ProductId) -> Arc<Mutex<()>> {
        let mut locks = self.row_locks.lock().await;
        Arc::clone(locks.entry(id).or_default())
    }

    async fn check_fault(&self, point: FailPoint) -> Result<(), RepositoryError> {
        let mut faults = self.faults.lock().await;
        match faults.get_mut(&point) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(RepositoryError::Unavailable(format!(
                    "injected fault at {point:?}"
                )))
            }
            _ => Ok(()),
        }
    }
}

/// In-memory [`Store`].
///
/// Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `times` calls at `point` fail with
    /// `RepositoryError::Unavailable`.
    pub async fn fail_next(&self, point: FailPoint, times: usize) {
        self.inner.faults.lock().await.insert(point, times);
    }

    /// Number of committed orders across all users.
    pub async fn order_count(&self) -> usize {
        self.inner.state.lock().await.orders.len()
    }
}

#[async_trait]
impl ProductStore for MemoryStore {
    async fn list_products(&self) -> Result<Vec<Product>, RepositoryError> {
        self.inner.check_fault(FailPoint::ProductRead).await?;
        let state = self.inner.state.lock().await;
        Ok(state
            .products
            .keys()
            .filter_map(|id| state.product(*id))
            .collect())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        self.inner.check_fault(FailPoint::ProductRead).await?;
        Ok(self.inner.state.lock().await.product(id))
    }

    async fn count_products(&self) -> Result<u64, RepositoryError> {
        let state = self.inner.state.lock().await;
        Ok(state.products.len() as u64)
    }

    async fn create_product(&self, product: &NewProduct) -> Result<Product, RepositoryError> {
        let mut state = self.inner.state.lock().await;
        state.next_product += 1;
        let id = ProductId::new(state.next_product);
        state.products.insert(
            id,
            ProductRecord {
                name: product.name.clone(),
                price: product.price,
                stock: product.stock,
                description: product.description.clone(),
                image_url: product.image_url.clone(),
            },
        );
        state.link_categories(id, &product.categories);
        state.product(id).ok_or(RepositoryError::NotFound)
    }

    async fn update_product(
        &self,
        id: ProductId,
        patch: &ProductPatch,
    ) -> Result<Product, RepositoryError> {
        let row = self.inner.row_lock(id).await;
        let _guard = row.lock().await;

        let mut state = self.inner.state.lock().await;
        let record = state
            .products
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound)?;
        if let Some(name) = &patch.name {
            record.name.clone_from(name);
        }
        if let Some(price) = patch.price {
            record.price = price;
        }
        if let Some(stock) = patch.stock {
            record.stock = stock;
        }
        if let Some(description) = &patch.description {
            record.description.clone_from(description);
        }
        if let Some(image_url) = &patch.image_url {
            record.image_url.clone_from(image_url);
        }
        if let Some(names) = &patch.categories {
            state.links.retain(|(product, _)| *product != id);
            state.link_categories(id, names);
        }
        state.product(id).ok_or(RepositoryError::NotFound)
    }

    async fn delete_product(&self, id: ProductId) -> Result<(), RepositoryError> {
        let row = self.inner.row_lock(id).await;
        let _guard = row.lock().await;

        let mut state = self.inner.state.lock().await;
        if state.products.remove(&id).is_none() {
            return Err(RepositoryError::NotFound);
        }
        state.links.retain(|(product, _)| *product != id);
        state.lines.retain(|(_, product), _| *product != id);
        Ok(())
    }

    async fn list_categories(&self) -> Result<Vec<Category>, RepositoryError> {
        let state = self.inner.state.lock().await;
        Ok(state
            .categories
            .iter()
            .map(|(id, name)| Category {
                id: *id,
                name: name.clone(),
            })
            .collect())
    }

    async fn delete_category(&self, id: CategoryId) -> Result<Vec<ProductId>, RepositoryError> {
        let mut state = self.inner.state.lock().await;
        if state.categories.remove(&id).is_none() {
            return Err(RepositoryError::NotFound);
        }
        let affected: Vec<ProductId> = state
            .links
            .iter()
            .filter(|(_, category)| *category == id)
            .map(|(product, _)| *product)
            .collect();
        state.links.retain(|(_, category)| *category != id);
        Ok(affected)
    }
}

#[async_trait]
impl CartStore for MemoryStore {
    async fn find_cart(&self, owner: &CartOwner) -> Result<Option<Cart>, RepositoryError> {
        Ok(self.inner.state.lock().await.find_cart(owner))
    }

    async fn get_or_create_cart(&self, owner: &CartOwner) -> Result<Cart, RepositoryError> {
        let mut state = self.inner.state.lock().await;
        if let Some(cart) = state.find_cart(owner) {
            return Ok(cart);
        }
        state.next_cart += 1;
        let id = CartId::new(state.next_cart);
        state.carts.insert(id, *owner);
        Ok(Cart { id, owner: *owner })
    }

    async fn cart_line(
        &self,
        cart: CartId,
        product: ProductId,
    ) -> Result<Option<u32>, RepositoryError> {
        let state = self.inner.state.lock().await;
        Ok(state.lines.get(&(cart, product)).copied())
    }

    async fn add_to_line(
        &self,
        cart: CartId,
        product: ProductId,
        requested: u32,
        stock: u32,
    ) -> Result<u32, RepositoryError> {
        let mut state = self.inner.state.lock().await;
        state.require_line_targets(cart, product)?;

        let existing = state.lines.get(&(cart, product)).copied();
        let quantity = clamp_to_stock(existing, requested, stock);
        if quantity == 0 {
            return Err(RepositoryError::Conflict(
                "cart line quantity must be positive".to_owned(),
            ));
        }
        state.lines.insert((cart, product), quantity);
        Ok(quantity)
    }

    async fn set_line(
        &self,
        cart: CartId,
        product: ProductId,
        quantity: u32,
    ) -> Result<bool, RepositoryError> {
        if quantity == 0 {
            return Err(RepositoryError::Conflict(
                "cart line quantity must be positive".to_owned(),
            ));
        }
        let mut state = self.inner.state.lock().await;
        Ok(state
            .lines
            .get_mut(&(cart, product))
            .map(|stored| *stored = quantity)
            .is_some())
    }

    async fn remove_line(&self, cart: CartId, product: ProductId) -> Result<bool, RepositoryError> {
        let mut state = self.inner.state.lock().await;
        Ok(state.lines.remove(&(cart, product)).is_some())
    }

    async fn remove_lines(
        &self,
        cart: CartId,
        products: &[ProductId],
    ) -> Result<u64, RepositoryError> {
        self.inner.check_fault(FailPoint::CartCleanup).await?;
        let mut state = self.inner.state.lock().await;
        let removed = products
            .iter()
            .filter(|product| state.lines.remove(&(cart, **product)).is_some())
            .count();
        Ok(removed as u64)
    }

    async fn clear_cart(&self, cart: CartId) -> Result<u64, RepositoryError> {
        let mut state = self.inner.state.lock().await;
        let before = state.lines.len();
        state.lines.retain(|(c, _), _| *c != cart);
        Ok((before - state.lines.len()) as u64)
    }

    async fn cart_items(&self, cart: CartId) -> Result<Vec<CartItemView>, RepositoryError> {
        let state = self.inner.state.lock().await;
        Ok(state
            .cart_lines(cart)
            .filter_map(|(product, quantity)| {
                state.products.get(&product).map(|record| CartItemView {
                    product_id: product,
                    name: record.name.clone(),
                    price: record.price,
                    image_url: record.image_url.clone(),
                    quantity,
                    stock: record.stock,
                })
            })
            .collect())
    }

    async fn absorb_cart(
        &self,
        from: CartId,
        into: CartId,
    ) -> Result<CartAbsorb, RepositoryError> {
        let mut state = self.inner.state.lock().await;
        if !state.carts.contains_key(&from) {
            return Err(RepositoryError::NotFound);
        }
        if !state.carts.contains_key(&into) {
            return Err(RepositoryError::Conflict(format!("cart {into} does not exist")));
        }

        let incoming: Vec<(ProductId, u32)> = state.cart_lines(from).collect();
        let mut outcome = CartAbsorb::default();

        for (product, quantity) in incoming {
            let stock = state.products.get(&product).map_or(0, |record| record.stock);
            if stock == 0 {
                outcome.dropped.push(product);
                continue;
            }
            let live = state.lines.get(&(into, product)).copied().unwrap_or(0);
            state
                .lines
                .insert((into, product), merged_quantity(live, quantity, stock));
            outcome.merged.push(product);
        }

        state.lines.retain(|(cart, _), _| *cart != from);
        state.carts.remove(&from);
        Ok(outcome)
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn begin_checkout(
        &self,
        lock_timeout: Duration,
    ) -> Result<Box<dyn CheckoutTx>, RepositoryError> {
        Ok(Box::new(MemoryCheckoutTx {
            inner: Arc::clone(&self.inner),
            lock_timeout,
            guards: BTreeMap::new(),
            staged_stock: BTreeMap::new(),
            staged_order: None,
        }))
    }

    async fn list_orders(&self, user: UserId) -> Result<Vec<OrderSummary>, RepositoryError> {
        let state = self.inner.state.lock().await;
        let mut orders: Vec<OrderSummary> = state
            .orders
            .values()
            .filter(|order| order.user == user)
            .map(|order| order.detail.summary.clone())
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(orders)
    }

    async fn get_order(
        &self,
        user: UserId,
        id: OrderId,
    ) -> Result<Option<OrderDetail>, RepositoryError> {
        let state = self.inner.state.lock().await;
        Ok(state
            .orders
            .get(&id)
            .filter(|order| order.user == user)
            .map(|order| order.detail.clone()))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn health_check(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

/// Checkout against [`MemoryStore`].
struct MemoryCheckoutTx {
    inner: Arc<Inner>,
    lock_timeout: Duration,
    guards: BTreeMap<ProductId, OwnedMutexGuard<()>>,
    staged_stock: BTreeMap<ProductId, u32>,
    staged_order: Option<StoredOrder>,
}

#[async_trait]
impl CheckoutTx for MemoryCheckoutTx {
    async fn lock_product(
        &mut self,
        id: ProductId,
    ) -> Result<Option<LockedProduct>, RepositoryError> {
        if !self.guards.contains_key(&id) {
            let row = self.inner.row_lock(id).await;
            let guard = tokio::time::timeout(self.lock_timeout, row.lock_owned())
                .await
                .map_err(|_| RepositoryError::LockTimeout)?;
            self.guards.insert(id, guard);
        }

        let state = self.inner.state.lock().await;
        Ok(state.products.get(&id).map(|record| LockedProduct {
            id,
            name: record.name.clone(),
            price: record.price,
            stock: self.staged_stock.get(&id).copied().unwrap_or(record.stock),
        }))
    }

    async fn set_stock(&mut self, id: ProductId, stock: u32) -> Result<(), RepositoryError> {
        if !self.guards.contains_key(&id) {
            return Err(RepositoryError::Conflict(format!(
                "product {id} is not locked by this checkout"
            )));
        }
        self.staged_stock.insert(id, stock);
        Ok(())
    }

    async fn insert_order(&mut self, order: &NewOrder) -> Result<OrderSummary, RepositoryError> {
        self.inner.check_fault(FailPoint::OrderInsert).await?;

        let id = OrderId::new(self.inner.next_order.fetch_add(1, Ordering::SeqCst) + 1);
        let summary = OrderSummary {
            id,
            created_at: Utc::now(),
            shipping_method: order.shipping_method.clone(),
            total: order.total,
            status: OrderStatus::Pending,
        };
        let items = order
            .items
            .iter()
            .map(|item| OrderLine {
                product_id: item.product_id,
                product_name: item.product_name.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price,
            })
            .collect();

        self.staged_order = Some(StoredOrder {
            user: order.user_id,
            detail: OrderDetail {
                summary: summary.clone(),
                recipient: order.recipient.clone(),
                items,
            },
        });
        Ok(summary)
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        let mut state = self.inner.state.lock().await;
        for (id, stock) in &self.staged_stock {
            let record = state.products.get_mut(id).ok_or_else(|| {
                RepositoryError::Conflict(format!("product {id} vanished while locked"))
            })?;
            record.stock = *stock;
        }
        if let Some(order) = self.staged_order.clone() {
            state.orders.insert(order.detail.summary.id, order);
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use corner_shop_core::AnonymousCartToken;
    use rust_decimal::Decimal;

    use super::*;
    use crate::models::{NewOrderItem, Recipient};

    fn new_product(name: &str, stock: u32, categories: &[&str]) -> NewProduct {
        NewProduct {
            name: name.to_string(),
            price: Price::new(Decimal::new(500, 2)).unwrap(),
            stock,
            description: String::new(),
            image_url: String::new(),
            categories: categories.iter().map(ToString::to_string).collect(),
        }
    }

    fn order_for(user: UserId, product: ProductId, quantity: u32) -> NewOrder {
        let unit_price = Price::new(Decimal::new(500, 2)).unwrap();
        NewOrder {
            user_id: user,
            recipient: Recipient {
                name: "Ada".to_string(),
                address: "1 Loop Rd".to_string(),
                phone: "555-0100".to_string(),
            },
            shipping_method: "standard".to_string(),
            total: unit_price.line_total(quantity),
            items: vec![NewOrderItem {
                product_id: product,
                product_name: "Mug".to_string(),
                quantity,
                unit_price,
            }],
        }
    }

    #[tokio::test]
    async fn test_categories_get_or_created() {
        let store = MemoryStore::new();
        let a = store
            .create_product(&new_product("A", 1, &["tea", "mugs"]))
            .await
            .unwrap();
        let b = store
            .create_product(&new_product("B", 1, &["tea", " "]))
            .await
            .unwrap();

        assert_eq!(a.categories.len(), 2);
        assert_eq!(b.categories.len(), 1);
        assert_eq!(store.list_categories().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_one_cart_per_owner() {
        let store = MemoryStore::new();
        let owner = CartOwner::Anonymous(AnonymousCartToken::generate());
        let first = store.get_or_create_cart(&owner).await.unwrap();
        let second = store.get_or_create_cart(&owner).await.unwrap();
        assert_eq!(first.id, second.id);

        let other = store
            .get_or_create_cart(&CartOwner::User(UserId::new(1)))
            .await
            .unwrap();
        assert_ne!(first.id, other.id);
    }

    #[tokio::test]
    async fn test_add_to_line_clamps() {
        let store = MemoryStore::new();
        let product = store.create_product(&new_product("A", 5, &[])).await.unwrap();
        let cart = store
            .get_or_create_cart(&CartOwner::User(UserId::new(1)))
            .await
            .unwrap();

        assert_eq!(store.add_to_line(cart.id, product.id, 3, 5).await.unwrap(), 3);
        assert_eq!(store.add_to_line(cart.id, product.id, 3, 5).await.unwrap(), 5);
        assert!(store.add_to_line(cart.id, product.id, 1, 0).await.is_err());
    }

    #[tokio::test]
    async fn test_dropped_checkout_rolls_back() {
        let store = MemoryStore::new();
        let product = store.create_product(&new_product("A", 5, &[])).await.unwrap();

        {
            let mut tx = store.begin_checkout(Duration::from_secs(1)).await.unwrap();
            let locked = tx.lock_product(product.id).await.unwrap().unwrap();
            tx.set_stock(product.id, locked.stock - 2).await.unwrap();
            tx.insert_order(&order_for(UserId::new(1), product.id, 2))
                .await
                .unwrap();
        }

        let after = store.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(after.stock, 5);
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn test_commit_applies_staged_writes() {
        let store = MemoryStore::new();
        let product = store.create_product(&new_product("A", 5, &[])).await.unwrap();

        let mut tx = store.begin_checkout(Duration::from_secs(1)).await.unwrap();
        tx.lock_product(product.id).await.unwrap();
        tx.set_stock(product.id, 3).await.unwrap();
        tx.insert_order(&order_for(UserId::new(1), product.id, 2))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.get_product(product.id).await.unwrap().unwrap().stock, 3);
        assert_eq!(store.list_orders(UserId::new(1)).await.unwrap().len(), 1);
        assert!(store.list_orders(UserId::new(2)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_row_lock_blocks_second_checkout() {
        let store = MemoryStore::new();
        let product = store.create_product(&new_product("A", 5, &[])).await.unwrap();

        let mut holder = store.begin_checkout(Duration::from_secs(1)).await.unwrap();
        holder.lock_product(product.id).await.unwrap();

        let mut waiter = store
            .begin_checkout(Duration::from_millis(20))
            .await
            .unwrap();
        let result = waiter.lock_product(product.id).await;
        assert!(matches!(result, Err(RepositoryError::LockTimeout)));

        drop(holder);
        assert!(waiter.lock_product(product.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_set_stock_requires_lock() {
        let store = MemoryStore::new();
        let product = store.create_product(&new_product("A", 5, &[])).await.unwrap();
        let mut tx = store.begin_checkout(Duration::from_secs(1)).await.unwrap();
        assert!(matches!(
            tx.set_stock(product.id, 1).await,
            Err(RepositoryError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_fail_next_is_consumed() {
        let store = MemoryStore::new();
        store.fail_next(FailPoint::ProductRead, 1).await;
        assert!(store.list_products().await.is_err());
        assert!(store.list_products().await.is_ok());
    }

    #[tokio::test]
    async fn test_absorb_cart_removes_source() {
        let store = MemoryStore::new();
        let product = store.create_product(&new_product("A", 5, &[])).await.unwrap();
        let anon = store
            .get_or_create_cart(&CartOwner::Anonymous(AnonymousCartToken::generate()))
            .await
            .unwrap();
        let user = store
            .get_or_create_cart(&CartOwner::User(UserId::new(1)))
            .await
            .unwrap();
        store.add_to_line(anon.id, product.id, 2, 5).await.unwrap();

        let outcome = store.absorb_cart(anon.id, user.id).await.unwrap();

        assert_eq!(outcome.merged, vec![product.id]);
        assert_eq!(store.cart_line(user.id, product.id).await.unwrap(), Some(2));
        assert!(store.find_cart(&anon.owner).await.unwrap().is_none());
        assert!(matches!(
            store.absorb_cart(anon.id, user.id).await,
            Err(RepositoryError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_absorb_cart_applies_to_live_line() {
        let store = MemoryStore::new();
        let mug = store.create_product(&new_product("Mug", 10, &[])).await.unwrap();
        let gone = store.create_product(&new_product("Gone", 3, &[])).await.unwrap();
        let anon = store
            .get_or_create_cart(&CartOwner::Anonymous(AnonymousCartToken::generate()))
            .await
            .unwrap();
        let user = store
            .get_or_create_cart(&CartOwner::User(UserId::new(1)))
            .await
            .unwrap();
        store.add_to_line(anon.id, mug.id, 3, 10).await.unwrap();
        store.add_to_line(anon.id, gone.id, 1, 3).await.unwrap();
        store.add_to_line(user.id, mug.id, 4, 10).await.unwrap();
        store
            .update_product(
                gone.id,
                &ProductPatch {
                    stock: Some(0),
                    ..ProductPatch::default()
                },
            )
            .await
            .unwrap();

        // the user line grew after any snapshot a caller might have taken
        store.add_to_line(user.id, mug.id, 2, 10).await.unwrap();
        let outcome = store.absorb_cart(anon.id, user.id).await.unwrap();

        assert_eq!(store.cart_line(user.id, mug.id).await.unwrap(), Some(9));
        assert_eq!(outcome.dropped, vec![gone.id]);
        assert_eq!(store.cart_line(user.id, gone.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_product_cascades() {
        let store = MemoryStore::new();
        let product = store
            .create_product(&new_product("A", 5, &["tea"]))
            .await
            .unwrap();
        let cart = store
            .get_or_create_cart(&CartOwner::User(UserId::new(1)))
            .await
            .unwrap();
        store.add_to_line(cart.id, product.id, 1, 5).await.unwrap();

        store.delete_product(product.id).await.unwrap();

        assert!(store.cart_items(cart.id).await.unwrap().is_empty());
        assert!(matches!(
            store.delete_product(product.id).await,
            Err(RepositoryError::NotFound)
        ));
    }
}
