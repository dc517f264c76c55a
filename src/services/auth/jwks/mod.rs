/*
 * Responsibility
 * - JWKS の取得 (fetch) と kid -> 公開鍵 の解決 (resolver)
 * - 鍵セットはプロセス全体で共有する唯一の可変状態 (snapshot を丸ごと差し替える)
 */
pub mod fetch;
pub mod resolver;
pub mod types;

pub use fetch::{FetchError, HttpJwksFetcher, KeySetFetcher};
pub use resolver::{CachePolicy, JwksResolver, KeyResolveError};
pub use types::{KeySnapshot, ResolvedKey};
