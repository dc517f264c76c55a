/*
 * Responsibility
 * - middleware の公開インターフェース
 * - http: 全 route 共通の横断的関心事 / auth: セッション検証
 */
pub mod auth;
pub mod http;
