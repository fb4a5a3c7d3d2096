// File: src/api.rs
// Purpose: JSON REST handlers for the catalog, customers, orders and dashboard

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch},
    Extension, Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::app::AppState;
use crate::auth::session::SessionUser;
use crate::catalog::{
    Category, CategoryPatch, Customer, CustomerPatch, DashboardSummary, NewCategory, NewCustomer,
    NewOrder, NewProduct, OrderDetail, OrderStatus, Product, ProductPatch, ProductQuery, StatusChange,
};
use crate::error::AppResult;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/categories", get(list_categories).post(create_category))
        .route(
            "/api/categories/:id",
            get(get_category).put(update_category).delete(delete_category),
        )
        .route("/api/products", get(list_products).post(create_product))
        .route(
            "/api/products/:id",
            get(get_product).put(update_product).delete(delete_product),
        )
        .route("/api/customers", get(search_customers).post(create_customer))
        .route("/api/customers/:id", get(get_customer).put(update_customer))
        .route("/api/orders", get(list_orders).post(create_order))
        .route("/api/orders/:id", get(get_order))
        .route("/api/orders/:id/status", patch(update_order_status))
        .route("/api/dashboard/summary", get(dashboard_summary))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "sync_protocol": pecosa_sync::SYNC_PROTOCOL_VERSION,
    }))
}

// ---- categories ----

async fn list_categories(State(state): State<AppState>) -> AppResult<Json<Vec<Category>>> {
    Ok(Json(state.catalog.list_categories().await?))
}

async fn get_category(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<Json<Category>> {
    Ok(Json(state.catalog.get_category(id).await?))
}

async fn create_category(
    State(state): State<AppState>,
    Json(new): Json<NewCategory>,
) -> AppResult<(StatusCode, Json<Category>)> {
    let (category, _) = state.catalog.create_category(new, None).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

async fn update_category(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(patch): Json<CategoryPatch>,
) -> AppResult<Json<Category>> {
    let (category, _) = state.catalog.update_category(id, patch, None).await?;
    Ok(Json(category))
}

async fn delete_category(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<StatusCode> {
    state.catalog.delete_category(id, None).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- products ----

async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductQuery>,
) -> AppResult<Json<Vec<Product>>> {
    Ok(Json(state.catalog.list_products(&query).await?))
}

async fn get_product(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<Json<Product>> {
    Ok(Json(state.catalog.get_product(id).await?))
}

async fn create_product(
    State(state): State<AppState>,
    Json(new): Json<NewProduct>,
) -> AppResult<(StatusCode, Json<Product>)> {
    let (product, _) = state.catalog.create_product(new, None).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(patch): Json<ProductPatch>,
) -> AppResult<Json<Product>> {
    let (product, _) = state.catalog.update_product(id, patch, None).await?;
    Ok(Json(product))
}

async fn delete_product(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<StatusCode> {
    state.catalog.delete_product(id, None).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- customers ----

#[derive(Debug, Default, Deserialize)]
struct CustomerSearch {
    q: Option<String>,
}

async fn search_customers(
    State(state): State<AppState>,
    Query(search): Query<CustomerSearch>,
) -> AppResult<Json<Vec<Customer>>> {
    Ok(Json(state.catalog.search_customers(search.q.as_deref()).await?))
}

async fn get_customer(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<Json<Customer>> {
    Ok(Json(state.catalog.get_customer(id).await?))
}

async fn create_customer(
    State(state): State<AppState>,
    Json(new): Json<NewCustomer>,
) -> AppResult<(StatusCode, Json<Customer>)> {
    let (customer, _) = state.catalog.create_customer(new, None).await?;
    Ok((StatusCode::CREATED, Json(customer)))
}

async fn update_customer(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(patch): Json<CustomerPatch>,
) -> AppResult<Json<Customer>> {
    let (customer, _) = state.catalog.update_customer(id, patch, None).await?;
    Ok(Json(customer))
}

// ---- orders ----

#[derive(Debug, Default, Deserialize)]
struct OrderFilter {
    status: Option<OrderStatus>,
}

async fn list_orders(
    State(state): State<AppState>,
    Query(filter): Query<OrderFilter>,
) -> AppResult<Json<Vec<OrderDetail>>> {
    Ok(Json(state.catalog.list_orders(filter.status).await?))
}

async fn get_order(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<Json<OrderDetail>> {
    Ok(Json(state.catalog.get_order(id).await?))
}

async fn create_order(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Json(mut new): Json<NewOrder>,
) -> AppResult<(StatusCode, Json<OrderDetail>)> {
    new.credit_to(user.role, user.employee_id);
    let (order, _) = state.catalog.create_order(new, None).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(change): Json<StatusChange>,
) -> AppResult<Json<OrderDetail>> {
    let (order, _) = state.catalog.update_order_status(id, change.status, None).await?;
    Ok(Json(order))
}

// ---- dashboard ----

async fn dashboard_summary(State(state): State<AppState>) -> AppResult<Json<DashboardSummary>> {
    Ok(Json(state.catalog.dashboard_summary().await?))
}
