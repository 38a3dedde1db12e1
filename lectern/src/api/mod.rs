//! API module for the Lectern HTTP server

pub mod auth;
pub mod middleware;
pub mod routes;
pub mod server;

pub use auth::AdminAuth;
pub use server::ApiServer;
