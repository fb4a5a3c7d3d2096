// File: src/auth/guard.rs
// Purpose: Role guard for dashboard pages and the JSON API

use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use pecosa_sync::{PushActor, TableAccess};

use crate::app::AppState;
use crate::auth::Role;
use crate::catalog::SYNCED_TABLES;
use crate::error::AppError;

const ALL: &[Role] = &[Role::Admin, Role::Cocina, Role::Employee];
const ADMIN: &[Role] = &[Role::Admin];
const FRONT: &[Role] = &[Role::Admin, Role::Employee];
const KITCHEN: &[Role] = &[Role::Admin, Role::Cocina];

/// Roles allowed to read and to write under an API prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Access {
    pub read: &'static [Role],
    pub write: &'static [Role],
}

impl Access {
    const fn new(read: &'static [Role], write: &'static [Role]) -> Self {
        Self { read, write }
    }

    pub fn allows(&self, role: Role, method: &Method) -> bool {
        let roles = if is_read(method) { self.read } else { self.write };
        roles.contains(&role)
    }
}

fn is_read(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// Access rules for a table, shared by its REST and sync endpoints
fn table_access(table: &str) -> Access {
    match table {
        "categories" | "products" => Access::new(ALL, ADMIN),
        "customers" => Access::new(FRONT, FRONT),
        "orders" | "order_items" => Access::new(ALL, ALL),
        _ => Access::new(ADMIN, ADMIN),
    }
}

/// Roles that take orders at the counter
pub fn takes_orders(role: Role) -> bool {
    FRONT.contains(&role)
}

/// Roles that move orders through the kitchen
pub fn moves_orders(role: Role) -> bool {
    KITCHEN.contains(&role)
}

/// Access rule for an API path. `None` means the path is public.
pub fn api_access(path: &str) -> Option<Access> {
    let rest = path.strip_prefix("/api/")?;
    let mut segments = rest.split('/');
    let head = segments.next().unwrap_or_default();

    match head {
        "auth" | "health" => None,
        "dashboard" => Some(Access::new(ADMIN, ADMIN)),
        "realtime" => match segments.next().unwrap_or_default() {
            // Per-table checks happen inside the socket
            "ws" => Some(Access::new(ALL, ALL)),
            table => Some(table_access(table)),
        },
        "sync" => Some(table_access(segments.next().unwrap_or_default())),
        "orders" if path.ends_with("/status") => Some(Access::new(ALL, KITCHEN)),
        // Everyone sees orders; only the front of house creates them
        "orders" => Some(Access::new(ALL, FRONT)),
        table => Some(table_access(table)),
    }
}

/// Synchronized tables a role may follow and push to over the WebSocket feed
pub fn realtime_access(role: Role) -> TableAccess {
    let allowed = |write: bool| {
        SYNCED_TABLES
            .iter()
            .filter(|table| {
                let access = table_access(table);
                let roles = if write { access.write } else { access.read };
                roles.contains(&role)
            })
            .map(|table| table.to_string())
            .collect()
    };
    TableAccess {
        readable: allowed(false),
        writable: allowed(true),
    }
}

/// Middleware for `/api/*`: missing session is 401, wrong role is 403
pub async fn api_guard(
    State(state): State<AppState>,
    jar: CookieJar,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let Some(access) = api_access(&path) else {
        return next.run(request).await;
    };

    if let Some(expected) = state.config.auth.anon_key.as_deref() {
        let presented = request.headers().get("apikey").and_then(|v| v.to_str().ok());
        if presented != Some(expected) {
            return AppError::unauthorized("Clave de API inválida").into_response();
        }
    }

    let user = match state.auth.current_user(&jar).await {
        Ok(Some(user)) => user,
        Ok(None) => return AppError::unauthorized("No autenticado").into_response(),
        Err(e) => return e.into_response(),
    };

    if !access.allows(user.role, request.method()) {
        tracing::info!(user = %user.username, role = %user.role, %path, "API access denied");
        return AppError::forbidden("No autorizado").into_response();
    }

    let mut request = request;
    request.extensions_mut().insert(realtime_access(user.role));
    request.extensions_mut().insert(PushActor {
        role: user.role.as_str().to_string(),
        employee_id: user.employee_id,
    });
    request.extensions_mut().insert(user);
    next.run(request).await
}

/// Role that owns a dashboard path, e.g. `/cocina/...` → cocina
pub fn page_role(path: &str) -> Option<Role> {
    let first = path.trim_start_matches('/').split('/').next()?;
    Role::ALL.into_iter().find(|role| role.as_str() == first)
}

/// Middleware for dashboard pages.
///
/// Unauthenticated visitors go to the role's login page; signed-in users
/// without access go to their own dashboard. Form posts (logins) pass through.
pub async fn page_guard(
    State(state): State<AppState>,
    jar: CookieJar,
    request: Request,
    next: Next,
) -> Response {
    if request.method() == Method::POST {
        return next.run(request).await;
    }

    let path = request.uri().path().to_string();
    let Some(owner) = page_role(&path) else {
        return next.run(request).await;
    };

    let user = match state.auth.current_user(&jar).await {
        Ok(Some(user)) => user,
        Ok(None) => return Redirect::to(&format!("/login/{}", owner)).into_response(),
        Err(e) => return e.into_response(),
    };

    if !user.role.can_access(&path) {
        tracing::info!(user = %user.username, %path, "page access denied, redirecting");
        return Redirect::to(user.role.dashboard()).into_response();
    }

    let mut request = request;
    request.extensions_mut().insert(user);
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("/api/auth/login")]
    #[case("/api/health")]
    #[case("/admin")]
    fn test_public_paths(#[case] path: &str) {
        assert_eq!(api_access(path), None);
    }

    #[rstest]
    #[case("/api/products", Role::Employee, Method::GET, true)]
    #[case("/api/products", Role::Employee, Method::POST, false)]
    #[case("/api/products/3", Role::Admin, Method::PUT, true)]
    #[case("/api/customers", Role::Cocina, Method::GET, false)]
    #[case("/api/customers", Role::Employee, Method::POST, true)]
    #[case("/api/orders", Role::Cocina, Method::POST, false)]
    #[case("/api/orders/7/status", Role::Cocina, Method::PATCH, true)]
    #[case("/api/orders/7/status", Role::Employee, Method::PATCH, false)]
    #[case("/api/dashboard/summary", Role::Cocina, Method::GET, false)]
    #[case("/api/sync/products", Role::Employee, Method::POST, false)]
    #[case("/api/sync/orders", Role::Cocina, Method::POST, true)]
    #[case("/api/realtime/orders", Role::Cocina, Method::GET, true)]
    #[case("/api/realtime/customers", Role::Cocina, Method::GET, false)]
    #[case("/api/realtime/ws", Role::Cocina, Method::GET, true)]
    fn test_api_rules(#[case] path: &str, #[case] role: Role, #[case] method: Method, #[case] allowed: bool) {
        let access = api_access(path).unwrap();
        assert_eq!(access.allows(role, &method), allowed);
    }

    #[test]
    fn test_realtime_access() {
        let kitchen = realtime_access(Role::Cocina);
        assert!(kitchen.can_read("orders"));
        assert!(kitchen.can_write("orders"));
        assert!(!kitchen.can_read("customers"));
        assert!(!kitchen.can_write("products"));

        let admin = realtime_access(Role::Admin);
        assert!(SYNCED_TABLES.iter().all(|t| admin.can_read(t) && admin.can_write(t)));
    }

    #[test]
    fn test_page_role() {
        assert_eq!(page_role("/cocina"), Some(Role::Cocina));
        assert_eq!(page_role("/employee/caja"), Some(Role::Employee));
        assert_eq!(page_role("/login/admin"), None);
    }
}
