//! セッション検証 (OauthHMAC cookie ほか) → VerifiedIdentity を extensions に入れる
//!
//! - 検証そのものは `VerificationPipeline` の責務
//! - ここでは結果をログに出し、HTTP ステータスに写像するだけ
//!   - InternalFault のみ 500, それ以外の失敗はすべて 401 (理由はクライアントに返さない)
//! - 失敗した場合、後続の handler は呼ばれない

use axum::{
    Router,
    body::Body,
    extract::State,
    http::Request,
    middleware::{self, Next},
    response::Response,
};

use crate::error::AppError;
use crate::state::AppState;

/// 保護対象の router にセッション検証を掛ける。
///
/// 例：
/// ```ignore
/// let protected = api::routes(state.clone());
/// let protected = middleware::auth::session::apply(protected, state.clone());
/// ```
pub fn apply(router: Router<AppState>, state: AppState) -> Router<AppState> {
    // axum 0.8 の from_fn は State extractor を受け取れないため、`from_fn_with_state` で明示的に state を渡す
    router.layer(middleware::from_fn_with_state(state, session_middleware))
}

async fn session_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    // Body は Sync ではないので、await を跨いで借用するのは parts だけにする
    let (mut parts, body) = req.into_parts();

    let identity = match state.pipeline.verify(&parts.headers, &parts.uri).await {
        Ok(identity) => identity,
        Err(rejection) => {
            rejection.log();
            return Err(rejection.error.into());
        }
    };

    tracing::debug!(subject = identity.subject_email(), "session verified");

    // middleware → extractor への受け渡し
    parts.extensions.insert(identity);

    Ok(next.run(Request::from_parts(parts, body)).await)
}
