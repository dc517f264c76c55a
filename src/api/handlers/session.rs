/*
 * Responsibility
 * - GET / (保護対象のリソース)
 * - 検証済みの subject を text/plain で返す
 */
use crate::api::extractors::Identity;

pub async fn whoami(Identity(identity): Identity) -> String {
    format!("User {} logged in.", identity.subject_email())
}
