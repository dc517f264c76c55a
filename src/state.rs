/*
 * Responsibility
 * - Router に紐づける共有コンテキスト (AppState)
 * - Clone 前提で持つ (内部は Arc)
 */
use std::sync::Arc;

use crate::services::auth::VerificationPipeline;

#[derive(Clone, Debug)]
pub struct AppState {
    pub pipeline: Arc<VerificationPipeline>,
}

impl AppState {
    pub fn new(pipeline: Arc<VerificationPipeline>) -> Self {
        Self { pipeline }
    }
}
