/*
 * Responsibility
 * - HTTP 層の公開ポイント (routes() の re-export など)
 */
pub mod extractors;
pub mod handlers;
mod routes;

pub use routes::{protected_routes, public_routes};
