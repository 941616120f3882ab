//! Helpers shared by the page handlers

use anyhow::Context;
use axum::body::Bytes;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use std::path::Path;
use tokio::fs;
use uuid::Uuid;

use crate::api::middleware::PageError;
use crate::config::UploadConfig;
use crate::services::{
    CategoryServiceError, CommentServiceError, LocationServiceError, PostServiceError,
    UserServiceError,
};

/// Value format of `<input type="datetime-local">`
pub const DATETIME_INPUT_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// Subdirectory of the media root holding post images
const POST_IMAGE_DIR: &str = "posts";

/// `?page=N` on listing pages
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
}

impl PageQuery {
    /// The requested page; anything but a positive integer is a 404
    pub fn number(&self) -> Result<u32, PageError> {
        match self.page.as_deref() {
            None => Ok(1),
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(n) if n >= 1 => Ok(n),
                _ => Err(PageError::NotFound),
            },
        }
    }
}

/// Parse a datetime-local value as UTC, with or without seconds
pub fn parse_datetime_input(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, DATETIME_INPUT_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .map(|naive| naive.and_utc())
}

pub fn format_datetime_input(value: DateTime<Utc>) -> String {
    value.format(DATETIME_INPUT_FORMAT).to_string()
}

/// A file from a multipart form, not yet written anywhere
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub content_type: String,
    pub data: Bytes,
}

impl ImageUpload {
    /// Check type and size against the upload limits
    pub fn validate(&self, config: &UploadConfig) -> Result<(), String> {
        if !config.is_type_allowed(&self.content_type) {
            return Err(format!(
                "Unsupported image type {}. Allowed: {}",
                self.content_type,
                config.allowed_types.join(", ")
            ));
        }
        if self.data.len() as u64 > config.max_file_size {
            return Err(format!(
                "Image too large. Maximum size: {} MB",
                config.max_file_size / 1024 / 1024
            ));
        }
        Ok(())
    }
}

/// Write an image under the media root, returning its relative path
pub async fn save_image(config: &UploadConfig, upload: &ImageUpload) -> anyhow::Result<String> {
    let dir = config.path.join(POST_IMAGE_DIR);
    fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("Failed to create upload dir {:?}", dir))?;

    let filename = format!(
        "{}.{}",
        Uuid::new_v4(),
        config.extension_for(&upload.content_type)
    );
    let path = dir.join(&filename);
    fs::write(&path, &upload.data)
        .await
        .with_context(|| format!("Failed to save image {:?}", path))?;

    Ok(format!("{}/{}", POST_IMAGE_DIR, filename))
}

/// Remove a previously saved image. Failures are only logged.
pub async fn remove_image(media_root: &Path, relative: &str) {
    if relative.contains("..") {
        tracing::warn!("Refusing to remove suspicious image path {}", relative);
        return;
    }
    let path = media_root.join(relative);
    if let Err(e) = fs::remove_file(&path).await {
        tracing::warn!("Failed to remove image {:?}: {}", path, e);
    }
}

/// Accept a post-login redirect only if it stays on this site
pub fn safe_next(next: Option<&str>) -> Option<String> {
    next.map(str::trim)
        .filter(|n| n.starts_with('/') && !n.starts_with("//") && !n.contains('\\'))
        .map(str::to_string)
}

impl From<PostServiceError> for PageError {
    fn from(e: PostServiceError) -> Self {
        match e {
            PostServiceError::NotFound => PageError::NotFound,
            PostServiceError::InternalError(e) => PageError::Internal(e),
            other => PageError::Internal(anyhow::anyhow!(other.to_string())),
        }
    }
}

impl From<CommentServiceError> for PageError {
    fn from(e: CommentServiceError) -> Self {
        match e {
            CommentServiceError::NotFound => PageError::NotFound,
            CommentServiceError::InternalError(e) => PageError::Internal(e),
            other => PageError::Internal(anyhow::anyhow!(other.to_string())),
        }
    }
}

impl From<CategoryServiceError> for PageError {
    fn from(e: CategoryServiceError) -> Self {
        match e {
            CategoryServiceError::NotFound => PageError::NotFound,
            CategoryServiceError::InternalError(e) => PageError::Internal(e),
            other => PageError::Internal(anyhow::anyhow!(other.to_string())),
        }
    }
}

impl From<LocationServiceError> for PageError {
    fn from(e: LocationServiceError) -> Self {
        match e {
            LocationServiceError::NotFound => PageError::NotFound,
            LocationServiceError::InternalError(e) => PageError::Internal(e),
            other => PageError::Internal(anyhow::anyhow!(other.to_string())),
        }
    }
}

impl From<UserServiceError> for PageError {
    fn from(e: UserServiceError) -> Self {
        match e {
            UserServiceError::InternalError(e) => PageError::Internal(e),
            other => PageError::Internal(anyhow::anyhow!(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use tempfile::TempDir;

    #[test]
    fn test_page_number_parsing() {
        let q = |p: Option<&str>| PageQuery {
            page: p.map(str::to_string),
        };
        assert_eq!(q(None).number().unwrap(), 1);
        assert_eq!(q(Some("3")).number().unwrap(), 3);
        for bad in ["0", "-1", "abc", "", "1.5"] {
            assert!(matches!(q(Some(bad)).number(), Err(PageError::NotFound)));
        }
    }

    #[test]
    fn test_datetime_input_roundtrip() {
        let parsed = parse_datetime_input("2024-03-05T14:30").unwrap();
        assert_eq!((parsed.year(), parsed.month(), parsed.day()), (2024, 3, 5));
        assert_eq!((parsed.hour(), parsed.minute()), (14, 30));
        assert_eq!(format_datetime_input(parsed), "2024-03-05T14:30");

        assert!(parse_datetime_input("2024-03-05T14:30:15").is_some());
        assert!(parse_datetime_input("yesterday").is_none());
        assert!(parse_datetime_input("").is_none());
    }

    #[test]
    fn test_safe_next() {
        assert_eq!(safe_next(Some("/posts/1/")), Some("/posts/1/".to_string()));
        assert_eq!(safe_next(Some("//evil.test/")), None);
        assert_eq!(safe_next(Some("https://evil.test/")), None);
        assert_eq!(safe_next(Some("/\\evil.test")), None);
        assert_eq!(safe_next(None), None);
    }

    #[test]
    fn test_image_validation() {
        let config = UploadConfig {
            max_file_size: 4,
            ..UploadConfig::default()
        };
        let ok = ImageUpload {
            content_type: "image/png".to_string(),
            data: Bytes::from_static(b"1234"),
        };
        assert!(ok.validate(&config).is_ok());

        let too_big = ImageUpload {
            data: Bytes::from_static(b"12345"),
            ..ok.clone()
        };
        assert!(too_big.validate(&config).is_err());

        let wrong_type = ImageUpload {
            content_type: "text/html".to_string(),
            ..ok
        };
        assert!(wrong_type.validate(&config).is_err());
    }

    #[tokio::test]
    async fn test_save_and_remove_image() {
        let dir = TempDir::new().unwrap();
        let config = UploadConfig {
            path: dir.path().to_path_buf(),
            ..UploadConfig::default()
        };
        let upload = ImageUpload {
            content_type: "image/gif".to_string(),
            data: Bytes::from_static(b"GIF89a"),
        };

        let relative = save_image(&config, &upload).await.unwrap();
        assert!(relative.starts_with("posts/"));
        assert!(relative.ends_with(".gif"));
        let stored = dir.path().join(&relative);
        assert_eq!(std::fs::read(&stored).unwrap(), b"GIF89a");

        remove_image(dir.path(), &relative).await;
        assert!(!stored.exists());
    }
}
