//! Thin HTTP surface
//!
//! Exposes oracle health and an out-of-band resolution trigger so that
//! eligible markets can be diagnosed and nudged without log access.

pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::AppState;
