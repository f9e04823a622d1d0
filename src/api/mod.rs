//! REST surface for the procurement service.

pub mod routes;

pub use routes::{AppState, api_routes};
