//! Versioned API routed through the gateway

pub mod keys;
pub mod ping;
pub mod whoami;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use super::gateway::{gateway_middleware, GatewayLayerState};
use super::state::AppState;

/// Create the v1 router with every route guarded by the gateway
pub fn create_v1_router(gateway: GatewayLayerState) -> Router<AppState> {
    Router::new()
        .route("/ping", get(ping::ping))
        .route("/whoami", get(whoami::whoami))
        .route("/keys", post(keys::create_key).get(keys::list_keys))
        .route("/keys/{key_id}", get(keys::get_key).delete(keys::delete_key))
        .route("/keys/{key_id}/revoke", post(keys::revoke_key))
        .route_layer(middleware::from_fn_with_state(gateway, gateway_middleware))
}
