//! HTTP wiring: admission middleware, key issuance, and the server itself.

mod issuance;
mod middleware;
mod server;

pub use middleware::REJECTION_MESSAGE;
pub use server::{AppState, HttpServer};
