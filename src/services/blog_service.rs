use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use crate::domain::slugify;
use crate::handler::errors::ServiceError;
use crate::repository::{BlogPost, BlogPostUpdate, BlogRepository, NewBlogPost};
use crate::services::program_service::clean_optional;

pub const POSTS_PER_PAGE: i64 = 10;
const SLUG_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Deserialize)]
pub struct PostForm {
    pub title: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub excerpt: Option<String>,
    pub body: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostPage {
    pub posts: Vec<BlogPost>,
    pub page: i64,
    pub total_pages: i64,
}

pub struct BlogService<B: BlogRepository> {
    pub blog_repo: Arc<B>,
}

impl<B: BlogRepository> BlogService<B> {
    pub fn new(blog_repo: Arc<B>) -> Self {
        Self { blog_repo }
    }

    pub async fn create_post(&self, form: PostForm, author_id: Option<i64>) -> Result<BlogPost> {
        let (title, body) = check_form(&form)?;
        let base = base_slug(form.slug.clone(), &title)?;
        let excerpt = clean_optional(form.excerpt);

        // A concurrent writer can take the slug between the lookup and the
        // insert; pick the next free one and try again.
        let mut attempt = 1;
        loop {
            let slug = self.unique_slug(&base, None).await?;
            let inserted = self
                .blog_repo
                .insert_post(NewBlogPost {
                    slug: slug.clone(),
                    title: title.clone(),
                    excerpt: excerpt.clone(),
                    body: body.clone(),
                    author_id,
                })
                .await;
            match inserted {
                Ok(post) => {
                    tracing::info!(post_id = post.post_id, slug = %post.slug, "post created");
                    return Ok(post);
                }
                Err(err) if attempt < SLUG_ATTEMPTS && is_conflict(&err) => {
                    tracing::warn!(%slug, attempt, "slug taken concurrently, retrying");
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    pub async fn update_post(&self, post_id: i64, form: PostForm) -> Result<BlogPost> {
        let current = self.get_post(post_id).await?;
        let (title, body) = check_form(&form)?;
        let base = base_slug(form.slug.clone(), &title)?;
        let slug = if base == current.slug {
            base
        } else {
            self.unique_slug(&base, Some(&current.slug)).await?
        };

        self.blog_repo
            .update_post(
                post_id,
                BlogPostUpdate {
                    slug,
                    title,
                    excerpt: clean_optional(form.excerpt),
                    body,
                },
            )
            .await?
            .ok_or_else(|| ServiceError::not_found("post not found"))
    }

    pub async fn delete_post(&self, post_id: i64) -> Result<()> {
        if !self.blog_repo.delete_post(post_id).await? {
            return Err(ServiceError::not_found("post not found"));
        }
        Ok(())
    }

    pub async fn publish(&self, post_id: i64) -> Result<BlogPost> {
        let current = self.get_post(post_id).await?;
        let published_at = current.published_at.unwrap_or_else(Utc::now);
        self.blog_repo
            .set_published(post_id, true, Some(published_at))
            .await?
            .ok_or_else(|| ServiceError::not_found("post not found"))
    }

    /// Hides the post but keeps its original publication date.
    pub async fn unpublish(&self, post_id: i64) -> Result<BlogPost> {
        let current = self.get_post(post_id).await?;
        self.blog_repo
            .set_published(post_id, false, current.published_at)
            .await?
            .ok_or_else(|| ServiceError::not_found("post not found"))
    }

    pub async fn get_post(&self, post_id: i64) -> Result<BlogPost> {
        self.blog_repo
            .find_post_by_id(post_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("post not found"))
    }

    pub async fn get_published_by_slug(&self, slug: &str) -> Result<BlogPost> {
        self.blog_repo
            .find_post_by_slug(slug)
            .await?
            .filter(|p| p.published)
            .ok_or_else(|| ServiceError::not_found("post not found"))
    }

    pub async fn list_published(&self, page: i64) -> Result<PostPage> {
        let page = page.max(1);
        let total = self.blog_repo.count_published().await?;
        let posts = self
            .blog_repo
            .list_published(POSTS_PER_PAGE, (page - 1).saturating_mul(POSTS_PER_PAGE))
            .await?;
        Ok(PostPage {
            posts,
            page,
            total_pages: ((total + POSTS_PER_PAGE - 1) / POSTS_PER_PAGE).max(1),
        })
    }

    pub async fn list_all(&self) -> Result<Vec<BlogPost>> {
        self.blog_repo.list_all().await
    }

    async fn unique_slug(&self, base: &str, keep: Option<&str>) -> Result<String> {
        let taken: HashSet<String> = self
            .blog_repo
            .slugs_with_prefix(base)
            .await?
            .into_iter()
            .filter(|s| Some(s.as_str()) != keep)
            .collect();
        Ok(next_free_slug(base, &taken))
    }
}

fn is_conflict(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<ServiceError>(), Some(ServiceError::Conflict(_)))
}

fn check_form(form: &PostForm) -> Result<(String, String)> {
    let title = form.title.trim().to_string();
    if title.is_empty() {
        return Err(ServiceError::validation("title is required"));
    }
    let body = form.body.trim().to_string();
    if body.is_empty() {
        return Err(ServiceError::validation("body is required"));
    }
    Ok((title, body))
}

fn base_slug(requested: Option<String>, title: &str) -> Result<String> {
    let slug = match clean_optional(requested) {
        Some(s) => slugify(&s),
        None => slugify(title),
    };
    if slug.is_empty() {
        return Err(ServiceError::validation(
            "title must contain letters or digits",
        ));
    }
    Ok(slug)
}

/// `base`, or `base-2`, `base-3`... whichever is free first.
pub fn next_free_slug(base: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(base) {
        return base.to_string();
    }
    (2..)
        .map(|n| format!("{base}-{n}"))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| base.to_string())
}
