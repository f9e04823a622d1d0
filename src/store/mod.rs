//! Persistence layer — libSQL-backed storage for RFPs, vendors, and proposals.

pub mod libsql_backend;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::Database;
