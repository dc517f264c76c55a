/*!
 * Verified identity extractor
 *
 * Responsibility:
 * - 検証済みリクエストの identity (VerifiedIdentity) を handler に提供する
 * - 型そのものは services::auth::pipeline が所有する (Accept stage でしか作れない)
 */

mod core;

pub use self::core::Identity;
