// File: src/db.rs
// Purpose: Database pool, schema creation and first-run seed data

use anyhow::{Context, Result};
use sqlx::SqlitePool;

use crate::auth::password::LEGACY_SEED_HASH;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        role TEXT NOT NULL CHECK (role IN ('admin', 'cocina', 'employee')),
        name TEXT NOT NULL,
        employee_id INTEGER,
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS categories (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        description TEXT,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS products (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        category_id INTEGER REFERENCES categories(id) ON DELETE SET NULL,
        name TEXT NOT NULL,
        description TEXT,
        price REAL NOT NULL CHECK (price >= 0),
        available INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS customers (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        phone TEXT,
        email TEXT,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS orders (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        customer_id INTEGER REFERENCES customers(id) ON DELETE SET NULL,
        employee_id INTEGER,
        status TEXT NOT NULL DEFAULT 'pendiente',
        total REAL NOT NULL DEFAULT 0,
        notes TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS order_items (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        order_id INTEGER NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
        product_id INTEGER NOT NULL REFERENCES products(id),
        quantity INTEGER NOT NULL CHECK (quantity > 0),
        unit_price REAL NOT NULL,
        subtotal REAL NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS login_attempts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL,
        success INTEGER NOT NULL,
        attempted_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_login_attempts_user ON login_attempts(username, attempted_at)",
    "CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status)",
];

/// Open the pool and make sure every table exists
pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    let pool = pecosa_sync::db::connect(database_url)
        .await
        .with_context(|| format!("Failed to open database {}", database_url))?;
    init_schema(&pool).await?;
    Ok(pool)
}

pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(pool)
            .await
            .context("Failed to create schema")?;
    }
    Ok(())
}

/// Seed the starter accounts and catalog on an empty database.
///
/// Accounts carry legacy hashes, so they sign in with the configured legacy
/// password and get an argon2 hash on first login.
pub async fn seed(pool: &SqlitePool) -> Result<bool> {
    let users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;
    if users > 0 {
        return Ok(false);
    }

    let mut tx = pool.begin().await?;
    let accounts: [(&str, &str, &str, Option<i64>); 3] = [
        ("admin", "admin", "Administrador", None),
        ("cocina", "cocina", "Cocina", None),
        ("empleado", "employee", "Empleado", Some(1)),
    ];
    for (username, role, name, employee_id) in accounts {
        sqlx::query(
            "INSERT INTO users (username, password_hash, role, name, employee_id) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(username)
        .bind(LEGACY_SEED_HASH)
        .bind(role)
        .bind(name)
        .bind(employee_id)
        .execute(&mut *tx)
        .await?;
    }

    let now = chrono::Utc::now();
    let category_id: i64 = sqlx::query_scalar(
        "INSERT INTO categories (name, description, created_at) VALUES (?, ?, ?) RETURNING id",
    )
    .bind("Tacos")
    .bind("Tacos de la casa")
    .bind(now)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO products (category_id, name, description, price, available, created_at) VALUES (?, ?, ?, ?, 1, ?)",
    )
    .bind(category_id)
    .bind("Taco al pastor")
    .bind("Con piña y cilantro")
    .bind(25.0_f64)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    tracing::info!("Seeded starter users (admin, cocina, empleado) and catalog");
    Ok(true)
}
