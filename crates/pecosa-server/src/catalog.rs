// File: src/catalog.rs
// Purpose: Categories, products, customers and orders, with change events for every mutation

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};
use pecosa_sync::{ChangeAction, ChangeEvent, ChangeTracker, PendingChange, PushActor, SyncError, TableStore};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::auth::{guard, Role};
use crate::error::{AppError, AppResult};

/// Tables exposed through the sync and realtime routes
pub const SYNCED_TABLES: [&str; 4] = ["categories", "products", "customers", "orders"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCategory {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryPatch {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub id: i64,
    pub category_id: Option<i64>,
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub available: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
    #[serde(default)]
    pub category_id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: f64,
    #[serde(default = "default_available")]
    pub available: bool,
}

fn default_available() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductPatch {
    pub category_id: Option<i64>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub available: Option<bool>,
}

/// Filters for the product list
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductQuery {
    pub category_id: Option<i64>,
    pub available: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Customer {
    pub id: i64,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCustomer {
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerPatch {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

/// Order lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum OrderStatus {
    Pendiente,
    Preparando,
    Listo,
    Entregado,
    Cancelado,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Pendiente,
        OrderStatus::Preparando,
        OrderStatus::Listo,
        OrderStatus::Entregado,
        OrderStatus::Cancelado,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pendiente => "pendiente",
            OrderStatus::Preparando => "preparando",
            OrderStatus::Listo => "listo",
            OrderStatus::Entregado => "entregado",
            OrderStatus::Cancelado => "cancelado",
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, OrderStatus::Entregado | OrderStatus::Cancelado)
    }

    /// Orders move forward one step at a time, or get cancelled before delivery
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (Pendiente, Preparando) | (Preparando, Listo) | (Listo, Entregado) => true,
            (current, Cancelado) => !current.is_final(),
            _ => false,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| AppError::bad_request(format!("Estado desconocido: {}", s)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Order {
    pub id: i64,
    pub customer_id: Option<i64>,
    pub employee_id: Option<i64>,
    pub status: OrderStatus,
    pub total: f64,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub unit_price: f64,
    pub subtotal: f64,
}

/// An order with its line items, the shape sent over the feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewOrderItem {
    pub product_id: i64,
    pub quantity: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewOrder {
    #[serde(default)]
    pub customer_id: Option<i64>,
    #[serde(default)]
    pub employee_id: Option<i64>,
    #[serde(default)]
    pub notes: Option<String>,
    pub items: Vec<NewOrderItem>,
}

impl NewOrder {
    /// Credit the order to the signed-in employee. Only admins may name someone else.
    pub fn credit_to(&mut self, role: Role, employee_id: Option<i64>) {
        if role != Role::Admin || self.employee_id.is_none() {
            self.employee_id = employee_id;
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusChange {
    pub status: OrderStatus,
}

/// Admin dashboard figures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub orders_by_status: BTreeMap<OrderStatus, i64>,
    pub orders_today: i64,
    /// Total of today's orders that were not cancelled
    pub sales_today: f64,
}

fn required_name(name: &str) -> AppResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("El nombre es requerido"));
    }
    Ok(name.to_string())
}

fn valid_price(price: f64) -> AppResult<f64> {
    if !price.is_finite() || price < 0.0 {
        return Err(AppError::bad_request("El precio no puede ser negativo"));
    }
    Ok(price)
}

/// Read an order with its items on the given connection
async fn load_order(conn: &mut SqliteConnection, id: i64) -> AppResult<OrderDetail> {
    let order = sqlx::query_as::<_, Order>(
        "SELECT id, customer_id, employee_id, status, total, notes, created_at, updated_at FROM orders WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found("Pedido no encontrado"))?;

    let items = sqlx::query_as::<_, OrderItem>(
        "SELECT id, order_id, product_id, quantity, unit_price, subtotal FROM order_items \
         WHERE order_id = ? ORDER BY id",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(OrderDetail { order, items })
}

/// Catalog and order operations over the shared pool
pub struct Catalog {
    pool: SqlitePool,
    tracker: Arc<ChangeTracker>,
}

impl Catalog {
    pub fn new(pool: SqlitePool, tracker: Arc<ChangeTracker>) -> Self {
        Self { pool, tracker }
    }

    /// Log a change inside the transaction that wrote the row
    async fn record<T: Serialize>(
        &self,
        conn: &mut SqliteConnection,
        table: &str,
        id: i64,
        action: ChangeAction,
        record: Option<&T>,
        old_record: Option<&T>,
        client_id: Option<&str>,
    ) -> AppResult<ChangeEvent> {
        let record = record.map(serde_json::to_value).transpose().map_err(SyncError::from)?;
        let old_record = old_record.map(serde_json::to_value).transpose().map_err(SyncError::from)?;
        let event = self
            .tracker
            .append(
                conn,
                table,
                &id.to_string(),
                action,
                record,
                old_record,
                client_id.map(str::to_string),
            )
            .await?;
        Ok(event)
    }

    /// Commit the row and its log entry, then tell subscribers
    async fn commit(&self, tx: Transaction<'_, Sqlite>, event: &ChangeEvent) -> AppResult<()> {
        tx.commit().await?;
        self.tracker.publish(event);
        Ok(())
    }

    // ---- categories ----

    pub async fn list_categories(&self) -> AppResult<Vec<Category>> {
        let rows = sqlx::query_as::<_, Category>(
            "SELECT id, name, description, created_at FROM categories ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_category(&self, id: i64) -> AppResult<Category> {
        sqlx::query_as::<_, Category>("SELECT id, name, description, created_at FROM categories WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found("Categoría no encontrada"))
    }

    pub async fn create_category(&self, new: NewCategory, client_id: Option<&str>) -> AppResult<(Category, ChangeEvent)> {
        let name = required_name(&new.name)?;
        let mut tx = self.pool.begin().await?;
        let category = sqlx::query_as::<_, Category>(
            "INSERT INTO categories (name, description, created_at) VALUES (?, ?, ?) \
             RETURNING id, name, description, created_at",
        )
        .bind(name)
        .bind(new.description)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        let event = self
            .record(&mut tx, "categories", category.id, ChangeAction::Insert, Some(&category), None, client_id)
            .await?;
        self.commit(tx, &event).await?;
        Ok((category, event))
    }

    pub async fn update_category(
        &self,
        id: i64,
        patch: CategoryPatch,
        client_id: Option<&str>,
    ) -> AppResult<(Category, ChangeEvent)> {
        let old = self.get_category(id).await?;
        let name = match patch.name {
            Some(name) => required_name(&name)?,
            None => old.name.clone(),
        };
        let description = patch.description.or_else(|| old.description.clone());

        let mut tx = self.pool.begin().await?;
        let category = sqlx::query_as::<_, Category>(
            "UPDATE categories SET name = ?, description = ? WHERE id = ? \
             RETURNING id, name, description, created_at",
        )
        .bind(name)
        .bind(description)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        let event = self
            .record(&mut tx, "categories", id, ChangeAction::Update, Some(&category), Some(&old), client_id)
            .await?;
        self.commit(tx, &event).await?;
        Ok((category, event))
    }

    pub async fn delete_category(&self, id: i64, client_id: Option<&str>) -> AppResult<ChangeEvent> {
        let old = self.get_category(id).await?;
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM categories WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let event = self
            .record(&mut tx, "categories", id, ChangeAction::Delete, None, Some(&old), client_id)
            .await?;
        self.commit(tx, &event).await?;
        Ok(event)
    }

    // ---- products ----

    pub async fn list_products(&self, query: &ProductQuery) -> AppResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, Product>(
            "SELECT id, category_id, name, description, price, available, created_at FROM products \
             WHERE (?1 IS NULL OR category_id = ?1) AND (?2 IS NULL OR available = ?2) \
             ORDER BY name",
        )
        .bind(query.category_id)
        .bind(query.available)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_product(&self, id: i64) -> AppResult<Product> {
        self.find_product(id)
            .await?
            .ok_or_else(|| AppError::not_found("Producto no encontrado"))
    }

    async fn find_product(&self, id: i64) -> AppResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            "SELECT id, category_id, name, description, price, available, created_at FROM products WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(product)
    }

    async fn ensure_category(&self, category_id: Option<i64>) -> AppResult<()> {
        let Some(id) = category_id else {
            return Ok(());
        };
        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM categories WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match exists {
            Some(_) => Ok(()),
            None => Err(AppError::bad_request("Categoría no encontrada")),
        }
    }

    pub async fn create_product(&self, new: NewProduct, client_id: Option<&str>) -> AppResult<(Product, ChangeEvent)> {
        let name = required_name(&new.name)?;
        let price = valid_price(new.price)?;
        self.ensure_category(new.category_id).await?;

        let mut tx = self.pool.begin().await?;
        let product = sqlx::query_as::<_, Product>(
            "INSERT INTO products (category_id, name, description, price, available, created_at) \
             VALUES (?, ?, ?, ?, ?, ?) \
             RETURNING id, category_id, name, description, price, available, created_at",
        )
        .bind(new.category_id)
        .bind(name)
        .bind(new.description)
        .bind(price)
        .bind(new.available)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        let event = self
            .record(&mut tx, "products", product.id, ChangeAction::Insert, Some(&product), None, client_id)
            .await?;
        self.commit(tx, &event).await?;
        Ok((product, event))
    }

    pub async fn update_product(
        &self,
        id: i64,
        patch: ProductPatch,
        client_id: Option<&str>,
    ) -> AppResult<(Product, ChangeEvent)> {
        let old = self.get_product(id).await?;
        let name = match patch.name {
            Some(name) => required_name(&name)?,
            None => old.name.clone(),
        };
        let price = match patch.price {
            Some(price) => valid_price(price)?,
            None => old.price,
        };
        let category_id = patch.category_id.or(old.category_id);
        self.ensure_category(category_id).await?;

        let mut tx = self.pool.begin().await?;
        let product = sqlx::query_as::<_, Product>(
            "UPDATE products SET category_id = ?, name = ?, description = ?, price = ?, available = ? \
             WHERE id = ? \
             RETURNING id, category_id, name, description, price, available, created_at",
        )
        .bind(category_id)
        .bind(name)
        .bind(patch.description.or_else(|| old.description.clone()))
        .bind(price)
        .bind(patch.available.unwrap_or(old.available))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        let event = self
            .record(&mut tx, "products", id, ChangeAction::Update, Some(&product), Some(&old), client_id)
            .await?;
        self.commit(tx, &event).await?;
        Ok((product, event))
    }

    pub async fn delete_product(&self, id: i64, client_id: Option<&str>) -> AppResult<ChangeEvent> {
        let old = self.get_product(id).await?;
        let used: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM order_items WHERE product_id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        if used > 0 {
            return Err(AppError::bad_request(
                "El producto aparece en pedidos; márcalo como no disponible",
            ));
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM products WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let event = self
            .record(&mut tx, "products", id, ChangeAction::Delete, None, Some(&old), client_id)
            .await?;
        self.commit(tx, &event).await?;
        Ok(event)
    }

    // ---- customers ----

    /// Customers whose name or phone contains `q` (all when empty)
    pub async fn search_customers(&self, q: Option<&str>) -> AppResult<Vec<Customer>> {
        let pattern = format!("%{}%", q.unwrap_or_default().trim());
        let rows = sqlx::query_as::<_, Customer>(
            "SELECT id, name, phone, email, created_at FROM customers \
             WHERE name LIKE ?1 OR COALESCE(phone, '') LIKE ?1 \
             ORDER BY name LIMIT 50",
        )
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_customer(&self, id: i64) -> AppResult<Customer> {
        sqlx::query_as::<_, Customer>("SELECT id, name, phone, email, created_at FROM customers WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found("Cliente no encontrado"))
    }

    pub async fn create_customer(&self, new: NewCustomer, client_id: Option<&str>) -> AppResult<(Customer, ChangeEvent)> {
        let name = required_name(&new.name)?;
        let mut tx = self.pool.begin().await?;
        let customer = sqlx::query_as::<_, Customer>(
            "INSERT INTO customers (name, phone, email, created_at) VALUES (?, ?, ?, ?) \
             RETURNING id, name, phone, email, created_at",
        )
        .bind(name)
        .bind(new.phone)
        .bind(new.email)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        let event = self
            .record(&mut tx, "customers", customer.id, ChangeAction::Insert, Some(&customer), None, client_id)
            .await?;
        self.commit(tx, &event).await?;
        Ok((customer, event))
    }

    pub async fn update_customer(
        &self,
        id: i64,
        patch: CustomerPatch,
        client_id: Option<&str>,
    ) -> AppResult<(Customer, ChangeEvent)> {
        let old = self.get_customer(id).await?;
        let name = match patch.name {
            Some(name) => required_name(&name)?,
            None => old.name.clone(),
        };

        let mut tx = self.pool.begin().await?;
        let customer = sqlx::query_as::<_, Customer>(
            "UPDATE customers SET name = ?, phone = ?, email = ? WHERE id = ? \
             RETURNING id, name, phone, email, created_at",
        )
        .bind(name)
        .bind(patch.phone.or_else(|| old.phone.clone()))
        .bind(patch.email.or_else(|| old.email.clone()))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        let event = self
            .record(&mut tx, "customers", id, ChangeAction::Update, Some(&customer), Some(&old), client_id)
            .await?;
        self.commit(tx, &event).await?;
        Ok((customer, event))
    }

    // ---- orders ----

    pub async fn list_orders(&self, status: Option<OrderStatus>) -> AppResult<Vec<OrderDetail>> {
        let orders = sqlx::query_as::<_, Order>(
            "SELECT id, customer_id, employee_id, status, total, notes, created_at, updated_at FROM orders \
             WHERE (?1 IS NULL OR status = ?1) ORDER BY created_at DESC, id DESC",
        )
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        let items = sqlx::query_as::<_, OrderItem>(
            "SELECT id, order_id, product_id, quantity, unit_price, subtotal FROM order_items ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut by_order: BTreeMap<i64, Vec<OrderItem>> = BTreeMap::new();
        for item in items {
            by_order.entry(item.order_id).or_default().push(item);
        }

        Ok(orders
            .into_iter()
            .map(|order| OrderDetail {
                items: by_order.remove(&order.id).unwrap_or_default(),
                order,
            })
            .collect())
    }

    pub async fn get_order(&self, id: i64) -> AppResult<OrderDetail> {
        let mut conn = self.pool.acquire().await?;
        load_order(&mut conn, id).await
    }

    /// Create an order priced from the current catalog
    pub async fn create_order(&self, new: NewOrder, client_id: Option<&str>) -> AppResult<(OrderDetail, ChangeEvent)> {
        if new.items.is_empty() {
            return Err(AppError::bad_request("El pedido no tiene productos"));
        }
        if let Some(customer_id) = new.customer_id {
            self.get_customer(customer_id)
                .await
                .map_err(|_| AppError::bad_request("Cliente no encontrado"))?;
        }

        let mut lines = Vec::with_capacity(new.items.len());
        let mut total = 0.0;
        for item in &new.items {
            if item.quantity <= 0 {
                return Err(AppError::bad_request("La cantidad debe ser mayor que cero"));
            }
            let product = self
                .find_product(item.product_id)
                .await?
                .ok_or_else(|| AppError::bad_request(format!("El producto {} no existe", item.product_id)))?;
            if !product.available {
                return Err(AppError::bad_request(format!("{} no está disponible", product.name)));
            }
            let subtotal = product.price * item.quantity as f64;
            total += subtotal;
            lines.push((product, item.quantity, subtotal));
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let order_id: i64 = sqlx::query_scalar(
            "INSERT INTO orders (customer_id, employee_id, status, total, notes, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(new.customer_id)
        .bind(new.employee_id)
        .bind(OrderStatus::Pendiente)
        .bind(total)
        .bind(new.notes)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        for (product, quantity, subtotal) in &lines {
            sqlx::query(
                "INSERT INTO order_items (order_id, product_id, quantity, unit_price, subtotal) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(order_id)
            .bind(product.id)
            .bind(quantity)
            .bind(product.price)
            .bind(subtotal)
            .execute(&mut *tx)
            .await?;
        }

        let detail = load_order(&mut tx, order_id).await?;
        let event = self
            .record(&mut tx, "orders", order_id, ChangeAction::Insert, Some(&detail), None, client_id)
            .await?;
        self.commit(tx, &event).await?;
        tracing::info!(order_id, total, items = lines.len(), "order created");
        Ok((detail, event))
    }

    pub async fn update_order_status(
        &self,
        id: i64,
        status: OrderStatus,
        client_id: Option<&str>,
    ) -> AppResult<(OrderDetail, ChangeEvent)> {
        let old = self.get_order(id).await?;
        if !old.order.status.can_transition_to(status) {
            return Err(AppError::bad_request(format!(
                "No se puede pasar de {} a {}",
                old.order.status, status
            )));
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE orders SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status)
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let detail = load_order(&mut tx, id).await?;
        let event = self
            .record(&mut tx, "orders", id, ChangeAction::Update, Some(&detail), Some(&old), client_id)
            .await?;
        self.commit(tx, &event).await?;
        tracing::info!(order_id = id, from = %old.order.status, to = %status, "order status changed");
        Ok((detail, event))
    }

    // ---- dashboard ----

    pub async fn dashboard_summary(&self) -> AppResult<DashboardSummary> {
        let counts: Vec<(OrderStatus, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM orders GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let mut orders_by_status: BTreeMap<OrderStatus, i64> =
            OrderStatus::ALL.into_iter().map(|status| (status, 0)).collect();
        orders_by_status.extend(counts);

        let start_of_day = Utc::now().date_naive().and_time(NaiveTime::MIN).and_utc();
        let (orders_today, sales_today): (i64, f64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(CASE WHEN status != 'cancelado' THEN total ELSE 0 END), 0.0) \
             FROM orders WHERE created_at >= ?",
        )
        .bind(start_of_day)
        .fetch_one(&self.pool)
        .await?;

        Ok(DashboardSummary {
            orders_by_status,
            orders_today,
            sales_today,
        })
    }
}

fn sync_error(err: AppError) -> SyncError {
    match err {
        AppError::BadRequest(message) | AppError::NotFound(message) => SyncError::InvalidChange(message),
        AppError::Forbidden(message) => SyncError::Rejected { status: 403, message },
        AppError::Sync(e) => e,
        AppError::Database(e) => SyncError::Database(e),
        other => SyncError::Storage(other.to_string()),
    }
}

fn payload<T: DeserializeOwned>(change: &PendingChange) -> Result<T, SyncError> {
    let data = change.data.clone().unwrap_or(Value::Null);
    serde_json::from_value(data).map_err(|e| SyncError::InvalidChange(format!("datos inválidos: {}", e)))
}

fn record_id(change: &PendingChange) -> Result<i64, SyncError> {
    change
        .record_id
        .as_deref()
        .and_then(|id| id.parse().ok())
        .ok_or_else(|| SyncError::InvalidChange("falta un id numérico".to_string()))
}

/// Role of the pushing user; order changes are never applied anonymously
fn actor_role(actor: Option<&PushActor>) -> Result<(Role, Option<i64>), SyncError> {
    let actor = actor.ok_or_else(|| SyncError::Rejected {
        status: 401,
        message: "No autenticado".to_string(),
    })?;
    let role = actor.role.parse::<Role>().map_err(|_| denied())?;
    Ok((role, actor.employee_id))
}

fn denied() -> SyncError {
    SyncError::Rejected {
        status: 403,
        message: "No autorizado".to_string(),
    }
}

#[async_trait]
impl TableStore for Catalog {
    async fn apply_change(
        &self,
        change: &PendingChange,
        client_id: Option<&str>,
        actor: Option<&PushActor>,
    ) -> pecosa_sync::Result<ChangeEvent> {
        use ChangeAction::*;

        let result = match (change.table.as_str(), change.action) {
            ("categories", Insert) => self.create_category(payload(change)?, client_id).await.map(|(_, e)| e),
            ("categories", Update) => {
                self.update_category(record_id(change)?, payload(change)?, client_id)
                    .await
                    .map(|(_, e)| e)
            }
            ("categories", Delete) => self.delete_category(record_id(change)?, client_id).await,

            ("products", Insert) => self.create_product(payload(change)?, client_id).await.map(|(_, e)| e),
            ("products", Update) => {
                self.update_product(record_id(change)?, payload(change)?, client_id)
                    .await
                    .map(|(_, e)| e)
            }
            ("products", Delete) => self.delete_product(record_id(change)?, client_id).await,

            ("customers", Insert) => self.create_customer(payload(change)?, client_id).await.map(|(_, e)| e),
            ("customers", Update) => {
                self.update_customer(record_id(change)?, payload(change)?, client_id)
                    .await
                    .map(|(_, e)| e)
            }

            ("orders", Insert) => {
                let (role, employee_id) = actor_role(actor)?;
                if !guard::takes_orders(role) {
                    return Err(denied());
                }
                let mut new: NewOrder = payload(change)?;
                new.credit_to(role, employee_id);
                self.create_order(new, client_id).await.map(|(_, e)| e)
            }
            ("orders", Update) => {
                let (role, _) = actor_role(actor)?;
                if !guard::moves_orders(role) {
                    return Err(denied());
                }
                let StatusChange { status } = payload(change)?;
                self.update_order_status(record_id(change)?, status, client_id)
                    .await
                    .map(|(_, e)| e)
            }

            (table, action) if SYNCED_TABLES.contains(&table) => {
                return Err(SyncError::InvalidChange(format!("{} no admite {}", table, action)));
            }
            (table, _) => return Err(SyncError::UnknownTable(table.to_string())),
        };

        result.map_err(sync_error)
    }
}
