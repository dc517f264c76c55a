use axum::extract::FromRequestParts;
use axum::http::{StatusCode, request::Parts};

use crate::services::auth::VerifiedIdentity;
use crate::state::AppState;

/// Handler で VerifiedIdentity を受け取るための extractor
/// session middleware が request.extensions() に insert 済みである前提
/// 見つからない場合は 401 を返す（ミドルウェア未設定の route）
pub struct Identity(pub VerifiedIdentity);

impl FromRequestParts<AppState> for Identity
where
    AppState: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<VerifiedIdentity>()
            .cloned()
            .map(Identity)
            .ok_or(StatusCode::UNAUTHORIZED)
    }
}
