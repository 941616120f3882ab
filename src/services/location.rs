//! Location service

use crate::db::repositories::LocationRepository;
use crate::models::{CreateLocationInput, Location, MAX_TITLE_LEN};
use anyhow::Context;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum LocationServiceError {
    #[error("Location not found")]
    NotFound,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct LocationService {
    repo: Arc<dyn LocationRepository>,
}

impl LocationService {
    pub fn new(repo: Arc<dyn LocationRepository>) -> Self {
        Self { repo }
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Location>, LocationServiceError> {
        let location = self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to get location")?;
        Ok(location)
    }

    pub async fn list(&self) -> Result<Vec<Location>, LocationServiceError> {
        let locations = self.repo.list().await.context("Failed to list locations")?;
        Ok(locations)
    }

    pub async fn create(
        &self,
        input: CreateLocationInput,
    ) -> Result<Location, LocationServiceError> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(LocationServiceError::ValidationError(
                "Name cannot be empty".to_string(),
            ));
        }
        if name.chars().count() > MAX_TITLE_LEN {
            return Err(LocationServiceError::ValidationError(format!(
                "Name is limited to {} characters",
                MAX_TITLE_LEN
            )));
        }

        let location = self
            .repo
            .create(&CreateLocationInput {
                name,
                is_published: input.is_published,
            })
            .await
            .context("Failed to create location")?;
        Ok(location)
    }

    pub async fn toggle_published(&self, id: i64) -> Result<Location, LocationServiceError> {
        let location = self
            .get_by_id(id)
            .await?
            .ok_or(LocationServiceError::NotFound)?;
        self.repo
            .set_published(id, !location.is_published)
            .await
            .context("Failed to update location")?;
        Ok(Location {
            is_published: !location.is_published,
            ..location
        })
    }

    /// Delete a location. Its posts stay, without a location.
    pub async fn delete(&self, id: i64) -> Result<(), LocationServiceError> {
        if !self
            .repo
            .delete(id)
            .await
            .context("Failed to delete location")?
        {
            return Err(LocationServiceError::NotFound);
        }
        Ok(())
    }
}
