//! Category service
//!
//! Category lookup for the public category page goes through the cache;
//! every mutation drops the cached entries.

use crate::cache::{Cache, CacheLayer};
use crate::db::repositories::CategoryRepository;
use crate::models::{is_valid_slug, Category, CreateCategoryInput, MAX_SLUG_LEN, MAX_TITLE_LEN};
use anyhow::Context;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const CACHE_KEY_PREFIX: &str = "category:";
const CACHE_KEY_BY_SLUG: &str = "category:slug:";

#[derive(Debug, thiserror::Error)]
pub enum CategoryServiceError {
    #[error("Category not found")]
    NotFound,

    #[error("Category slug already exists: {0}")]
    DuplicateSlug(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Category service for managing blog categories
pub struct CategoryService {
    repo: Arc<dyn CategoryRepository>,
    cache: Arc<Cache>,
    /// Bumped on every invalidation; lookups that raced one skip the cache write
    generation: AtomicU64,
}

impl CategoryService {
    pub fn new(repo: Arc<dyn CategoryRepository>, cache: Arc<Cache>) -> Self {
        Self {
            repo,
            cache,
            generation: AtomicU64::new(0),
        }
    }

    /// Resolve the category behind a public category page.
    ///
    /// Absent and unpublished categories are both `NotFound`.
    pub async fn get_published_by_slug(
        &self,
        slug: &str,
    ) -> Result<Category, CategoryServiceError> {
        let key = format!("{}{}", CACHE_KEY_BY_SLUG, slug);

        let cached = match self.cache.get::<Category>(&key).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!("Dropping unreadable cache entry {}: {:#}", key, e);
                None
            }
        };

        let category = match cached {
            Some(category) => category,
            None => {
                let generation = self.generation.load(Ordering::Acquire);
                let category = self
                    .repo
                    .get_by_slug(slug)
                    .await
                    .context("Failed to get category by slug")?
                    .ok_or(CategoryServiceError::NotFound)?;
                self.store_unless_invalidated(&key, &category, generation)
                    .await?;
                category
            }
        };

        if !category.is_published {
            return Err(CategoryServiceError::NotFound);
        }
        Ok(category)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Category>, CategoryServiceError> {
        let category = self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to get category")?;
        Ok(category)
    }

    /// Every category, published or not, ordered by title
    pub async fn list(&self) -> Result<Vec<Category>, CategoryServiceError> {
        let categories = self.repo.list().await.context("Failed to list categories")?;
        Ok(categories)
    }

    pub async fn create(
        &self,
        input: CreateCategoryInput,
    ) -> Result<Category, CategoryServiceError> {
        let input = CreateCategoryInput {
            title: input.title.trim().to_string(),
            description: input.description.trim().to_string(),
            slug: input.slug.trim().to_string(),
            is_published: input.is_published,
        };
        validate_create_input(&input)?;

        if self
            .repo
            .get_by_slug(&input.slug)
            .await
            .context("Failed to check slug uniqueness")?
            .is_some()
        {
            return Err(CategoryServiceError::DuplicateSlug(input.slug));
        }

        let category = self
            .repo
            .create(&input)
            .await
            .context("Failed to create category")?;
        self.invalidate().await?;

        tracing::info!("Created category {}", category.slug);
        Ok(category)
    }

    /// Flip the published flag, returning the updated category
    pub async fn toggle_published(&self, id: i64) -> Result<Category, CategoryServiceError> {
        let category = self
            .get_by_id(id)
            .await?
            .ok_or(CategoryServiceError::NotFound)?;

        self.repo
            .set_published(id, !category.is_published)
            .await
            .context("Failed to update category")?;
        self.invalidate().await?;

        Ok(Category {
            is_published: !category.is_published,
            ..category
        })
    }

    /// Delete a category. Its posts stay, without a category.
    pub async fn delete(&self, id: i64) -> Result<(), CategoryServiceError> {
        let deleted = self
            .repo
            .delete(id)
            .await
            .context("Failed to delete category")?;
        if !deleted {
            return Err(CategoryServiceError::NotFound);
        }
        self.invalidate().await?;
        Ok(())
    }

    /// Cache a lookup result unless an invalidation ran since `generation`
    /// was read. A store that overlaps an invalidation is rolled back.
    async fn store_unless_invalidated(
        &self,
        key: &str,
        category: &Category,
        generation: u64,
    ) -> Result<(), CategoryServiceError> {
        if self.generation.load(Ordering::Acquire) != generation {
            return Ok(());
        }
        self.cache
            .set(key, category, self.cache.default_ttl())
            .await
            .context("Failed to cache category")?;
        if self.generation.load(Ordering::Acquire) != generation {
            self.cache
                .delete(key)
                .await
                .context("Failed to drop stale category")?;
        }
        Ok(())
    }

    async fn invalidate(&self) -> Result<(), CategoryServiceError> {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.cache
            .delete_prefix(CACHE_KEY_PREFIX)
            .await
            .context("Failed to invalidate category cache")?;
        Ok(())
    }
}

fn validate_create_input(input: &CreateCategoryInput) -> Result<(), CategoryServiceError> {
    if input.title.is_empty() {
        return Err(CategoryServiceError::ValidationError(
            "Title cannot be empty".to_string(),
        ));
    }
    if input.title.chars().count() > MAX_TITLE_LEN {
        return Err(CategoryServiceError::ValidationError(format!(
            "Title is limited to {} characters",
            MAX_TITLE_LEN
        )));
    }
    if input.slug.len() > MAX_SLUG_LEN || !is_valid_slug(&input.slug) {
        return Err(CategoryServiceError::ValidationError(
            "Slug may contain only latin letters, digits, hyphens and underscores".to_string(),
        ));
    }
    Ok(())
}
