// API module
//
// This module contains the HTTP transport for the ledger

pub mod handlers;
pub mod routes;

// Re-export main components for easier access
pub use handlers::AppState;
pub use routes::configure_routes;
