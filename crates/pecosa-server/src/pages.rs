// File: src/pages.rs
// Purpose: Server-rendered HTML shells: home, role logins, dashboards, offline page

use axum::extract::State;
use axum::Extension;
use maud::{html, Markup, DOCTYPE};

use crate::app::AppState;
use crate::auth::session::SessionUser;
use crate::auth::Role;
use crate::catalog::{OrderStatus, ProductQuery};
use crate::error::AppResult;

const SW_REGISTRATION: &str =
    "if ('serviceWorker' in navigator) { navigator.serviceWorker.register('/sw.js'); }";

/// Full HTML page with the manifest and service worker wired in
pub fn page(title: &str, body: Markup) -> Markup {
    html! {
        (DOCTYPE)
        html lang="es" {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                title { (title) " · La Pecosa" }
                link rel="manifest" href="/manifest.json";
                link rel="icon" href="/favicon.ico";
            }
            body {
                (body)
                script { (maud::PreEscaped(SW_REGISTRATION)) }
            }
        }
    }
}

pub fn home() -> Markup {
    page(
        "Inicio",
        html! {
            h1 { "La Pecosa" }
            nav {
                ul {
                    @for role in Role::ALL {
                        li { a href={ "/login/" (role) } { (role.label()) } }
                    }
                }
            }
        },
    )
}

/// Login form for one role. Posts back to the same URL.
pub fn login(role: Role, error: Option<&str>, username: Option<&str>) -> Markup {
    page(
        "Iniciar sesión",
        html! {
            h1 { "Iniciar sesión · " (role.label()) }
            @if let Some(error) = error {
                p.error role="alert" { (error) }
            }
            form method="post" action={ "/login/" (role) } {
                label {
                    "Usuario"
                    input type="text" name="username" autocomplete="username" required value=[username];
                }
                label {
                    "Contraseña"
                    input type="password" name="password" autocomplete="current-password" required;
                }
                button type="submit" { "Entrar" }
            }
        },
    )
}

pub fn offline() -> Markup {
    page(
        "Sin conexión",
        html! {
            h1 { "Sin conexión" }
            p { "No hay conexión a internet. Los cambios se guardarán y se sincronizarán al reconectar." }
            a href="/" { "Reintentar" }
        },
    )
}

fn header(user: &SessionUser) -> Markup {
    html! {
        header {
            span { (user.name) " · " (user.role.label()) }
            form method="post" action="/api/auth/logout" {
                button type="submit" { "Cerrar sesión" }
            }
        }
    }
}

pub async fn home_page() -> Markup {
    home()
}

/// GET /admin
pub async fn admin_dashboard(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
) -> AppResult<Markup> {
    let summary = state.catalog.dashboard_summary().await?;
    Ok(page(
        "Administración",
        html! {
            (header(&user))
            h1 { "Panel de administración" }
            section {
                h2 { "Hoy" }
                p { "Pedidos: " (summary.orders_today) }
                p { "Ventas: $" (format!("{:.2}", summary.sales_today)) }
            }
            section {
                h2 { "Pedidos por estado" }
                table {
                    @for (status, count) in &summary.orders_by_status {
                        tr { td { (status) } td { (count) } }
                    }
                }
            }
        },
    ))
}

/// GET /cocina
pub async fn kitchen_dashboard(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
) -> AppResult<Markup> {
    let orders = state.catalog.list_orders(None).await?;
    let open: Vec<_> = orders.iter().filter(|o| !o.order.status.is_final()).collect();
    Ok(page(
        "Cocina",
        html! {
            (header(&user))
            h1 { "Pedidos en cocina" }
            @if open.is_empty() {
                p { "No hay pedidos pendientes" }
            }
            ul {
                @for detail in open {
                    li data-order-id=(detail.order.id) {
                        strong { "#" (detail.order.id) } " · " (detail.order.status)
                        " · " (detail.items.len()) " productos"
                        @if detail.order.status == OrderStatus::Pendiente {
                            " (nuevo)"
                        }
                    }
                }
            }
        },
    ))
}

/// GET /employee
pub async fn employee_dashboard(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
) -> AppResult<Markup> {
    let products = state
        .catalog
        .list_products(&ProductQuery {
            available: Some(true),
            ..ProductQuery::default()
        })
        .await?;
    Ok(page(
        "Caja",
        html! {
            (header(&user))
            h1 { "Nuevo pedido" }
            ul {
                @for product in &products {
                    li data-product-id=(product.id) {
                        (product.name) " · $" (format!("{:.2}", product.price))
                    }
                }
            }
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_page_posts_to_role() {
        let html = login(Role::Cocina, Some("Credenciales inválidas"), Some("pepe")).into_string();
        assert!(html.contains(r#"action="/login/cocina""#));
        assert!(html.contains("Credenciales inválidas"));
        assert!(html.contains(r#"value="pepe""#));
    }

    #[test]
    fn test_pages_register_service_worker() {
        let html = offline().into_string();
        assert!(html.contains("/sw.js"));
        assert!(html.contains(r#"rel="manifest""#));
    }
}
