//! Template engine errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ThemeError {
    #[error("Template not found: {0}")]
    NotFound(String),

    /// Parse or render failure, with its cause chain
    #[error("Template error: {0}")]
    TemplateError(String),
}
