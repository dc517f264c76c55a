/*
 * Responsibility
 * - URL 構造を定義
 * - public (/health) と protected (/) を分け、protected にだけセッション検証を掛ける
 */
use axum::{Router, routing::get};

use crate::middleware;
use crate::state::AppState;

use crate::api::handlers::{health::health, session::whoami};

pub fn public_routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

pub fn protected_routes(state: AppState) -> Router<AppState> {
    let router = Router::new().route("/", get(whoami));
    middleware::auth::session::apply(router, state)
}
