//! API layer - HTTP endpoints, the gateway middleware and shared extractors

pub mod extract;
pub mod gateway;
pub mod health;
pub mod middleware;
pub mod router;
pub mod state;
pub mod types;
pub mod v1;

pub use extract::Auth;
pub use gateway::{gateway_middleware, GatewayLayerState};
pub use router::{create_router, create_router_with_metrics};
pub use state::AppState;
