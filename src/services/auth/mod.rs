/*
 * Responsibility
 * - セッション検証の各コンポーネント (canonical message, HMAC, JWKS, id_token, introspection)
 * - それらを順に実行する VerificationPipeline
 * - Config からの組み立て (factory)
 */
pub mod digest;
pub mod error;
pub mod evidence;
pub mod factory;
pub mod id_token;
pub mod introspection;
pub mod jwks;
pub mod message;
pub mod pipeline;

pub use error::{TokenInvalidReason, VerifyError};
pub use factory::build_pipeline;
pub use pipeline::{Rejection, Stage, VerificationPipeline, VerifiedIdentity};
