//! Image usage index.
//!
//! `post_images` records which post references which image URL so the image
//! library can answer "where is this used?" without parsing every post. The
//! index is rebuilt from post content by reconciliation and kept current on
//! every post save. Databases created before the index existed are still
//! served: listing then falls back to scanning post content directly.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::{
    content,
    error::RepoError,
    models::{
        Image, ImageListing, ImageSummary, ListingSource, Post, PostImageRef, PostRef,
        ReconcileReport, TrackingDiff,
    },
    repository::Repository,
};

/// Every image URL a post references: content images in document order, then the cover.
pub fn post_references(post: &Post) -> Vec<String> {
    let mut urls = content::image_sources(&post.content);
    if let Some(cover) = post.cover_image.as_deref().map(str::trim) {
        if !cover.is_empty() && !urls.iter().any(|u| u == cover) {
            urls.push(cover.to_string());
        }
    }
    urls
}

fn index_rows(post: &Post, image_ids: &HashMap<String, uuid::Uuid>) -> Vec<PostImageRef> {
    post_references(post)
        .into_iter()
        .enumerate()
        .map(|(position, url)| PostImageRef {
            post_id: post.id,
            image_id: image_ids.get(&url).copied(),
            image_url: url,
            position: position as i32,
        })
        .collect()
}

fn ids_by_url(images: &[Image]) -> HashMap<String, uuid::Uuid> {
    images.iter().map(|i| (i.url.clone(), i.id)).collect()
}

/// sync_post
///
/// Brings one post's usage rows in line with its current content.
pub async fn sync_post(repo: &dyn Repository, post: &Post) -> Result<TrackingDiff, RepoError> {
    let images = repo.list_images().await?;
    let rows = index_rows(post, &ids_by_url(&images));
    repo.replace_post_images(post.id, &rows).await
}

/// Like [`sync_post`], but a missing index table only logs: saving a post
/// must not fail on databases without the index.
pub async fn track_post(repo: &dyn Repository, post: &Post) -> Result<(), RepoError> {
    match sync_post(repo, post).await {
        Ok(diff) => {
            tracing::debug!(post_id = %post.id, inserted = diff.inserted, removed = diff.removed, "image index synced");
            Ok(())
        }
        Err(RepoError::MissingTable(table)) => {
            tracing::warn!(post_id = %post.id, %table, "image index unavailable, skipping sync");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// reconcile_all
///
/// Re-scans every post and rebuilds the usage index. A missing index table is
/// returned to the caller since there is nothing to rebuild.
pub async fn reconcile_all(repo: &dyn Repository) -> Result<ReconcileReport, RepoError> {
    let posts = repo.all_posts().await?;
    let images = repo.list_images().await?;
    let image_ids = ids_by_url(&images);

    let mut report = ReconcileReport::default();
    let mut referenced: HashSet<String> = HashSet::new();

    for post in &posts {
        let rows = index_rows(post, &image_ids);
        report.references_found += rows.len() as i64;
        referenced.extend(rows.iter().map(|r| r.image_url.clone()));

        let diff = repo.replace_post_images(post.id, &rows).await?;
        report.rows_inserted += diff.inserted as i64;
        report.rows_removed += diff.removed as i64;
    }

    report.posts_scanned = posts.len() as i64;
    report.orphaned_images = images
        .iter()
        .filter(|i| !referenced.contains(&i.url))
        .map(|i| i.url.clone())
        .collect();

    tracing::info!(
        posts = report.posts_scanned,
        references = report.references_found,
        inserted = report.rows_inserted,
        removed = report.rows_removed,
        orphaned = report.orphaned_images.len(),
        "image reconciliation finished"
    );
    Ok(report)
}

type UsageMap = BTreeMap<String, Vec<PostRef>>;

/// Which posts use which URL, from the index when it exists, else from post content.
async fn usage_map(repo: &dyn Repository) -> Result<(ListingSource, UsageMap), RepoError> {
    let mut usage = UsageMap::new();

    match repo.tracked_usage().await {
        Ok(rows) => {
            for row in rows {
                usage.entry(row.image_url).or_default().push(PostRef {
                    id: row.post_id,
                    title: row.post_title,
                    slug: row.post_slug,
                });
            }
            Ok((ListingSource::Tracked, usage))
        }
        Err(RepoError::MissingTable(table)) => {
            tracing::warn!(%table, "image index unavailable, scanning post content");
            for post in repo.all_posts().await? {
                for url in post_references(&post) {
                    usage.entry(url).or_default().push(PostRef {
                        id: post.id,
                        title: post.title.clone(),
                        slug: post.slug.clone(),
                    });
                }
            }
            Ok((ListingSource::ContentScan, usage))
        }
        Err(e) => Err(e),
    }
}

/// list_library
///
/// One entry per uploaded image (newest first, used or not), followed by
/// externally hosted URLs that posts reference.
pub async fn list_library(repo: &dyn Repository) -> Result<ImageListing, RepoError> {
    let images = repo.list_images().await?;
    let (source, mut usage) = usage_map(repo).await?;

    let mut summaries: Vec<ImageSummary> = images
        .into_iter()
        .map(|image| {
            let posts = usage.remove(&image.url).unwrap_or_default();
            ImageSummary {
                url: image.url.clone(),
                usage_count: posts.len() as i64,
                image: Some(image),
                posts,
            }
        })
        .collect();

    summaries.extend(usage.into_iter().map(|(url, posts)| ImageSummary {
        url,
        image: None,
        usage_count: posts.len() as i64,
        posts,
    }));

    Ok(ImageListing {
        source,
        images: summaries,
    })
}

/// Posts that reference `url`.
pub async fn references_to(repo: &dyn Repository, url: &str) -> Result<Vec<PostRef>, RepoError> {
    let (_, mut usage) = usage_map(repo).await?;
    Ok(usage.remove(url).unwrap_or_default())
}

/// Uploaded images that no post references.
pub async fn unreferenced_count(repo: &dyn Repository) -> Result<i64, RepoError> {
    let images = repo.list_images().await?;
    let (_, usage) = usage_map(repo).await?;
    Ok(images.iter().filter(|i| !usage.contains_key(&i.url)).count() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cover_is_appended_once() {
        let post = Post {
            content: json!({"type": "doc", "content": [
                {"type": "image", "attrs": {"src": "/uploads/a.jpg"}}
            ]}),
            cover_image: Some("/uploads/a.jpg".to_string()),
            ..Post::default()
        };
        assert_eq!(post_references(&post), vec!["/uploads/a.jpg"]);

        let post = Post {
            cover_image: Some(" /uploads/cover.png ".to_string()),
            ..post
        };
        assert_eq!(post_references(&post), vec!["/uploads/a.jpg", "/uploads/cover.png"]);
    }

    #[test]
    fn index_rows_link_uploaded_images() {
        let uploaded = Image {
            id: uuid::Uuid::new_v4(),
            url: "/uploads/b.jpg".to_string(),
            ..Image::default()
        };
        let post = Post {
            id: uuid::Uuid::new_v4(),
            content: json!({"type": "doc", "content": [
                {"type": "image", "attrs": {"src": "https://elsewhere.test/x.jpg"}},
                {"type": "image", "attrs": {"src": "/uploads/b.jpg"}}
            ]}),
            ..Post::default()
        };
        let rows = index_rows(&post, &ids_by_url(std::slice::from_ref(&uploaded)));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].image_id, None);
        assert_eq!(rows[1].image_id, Some(uploaded.id));
        assert_eq!(rows[1].position, 1);
    }
}
