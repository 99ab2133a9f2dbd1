//! HTTP handlers
//!
//! Request/response types live next to the handlers that use them; the
//! router wires everything together and splits public routes (health,
//! metrics, SSE) from protected API routes (auth required).

pub mod events;
pub mod health;
pub mod inspect;
pub mod router;
pub mod search;
pub mod state;

pub use router::{build_protected_routes, build_public_routes, build_router};
pub use state::{AppState, ServiceState};
