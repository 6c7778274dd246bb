use serde_json::json;
use storyline::{
    MemoryRepository,
    error::RepoError,
    models::{NewImage, NewPost, PostFilter, PostImageRef, PostStatus, Role},
    repository::Repository,
};
use uuid::Uuid;

fn new_post(title: &str, slug: &str, status: PostStatus) -> NewPost {
    NewPost {
        author_id: None,
        title: title.to_string(),
        slug: slug.to_string(),
        content: json!({ "type": "doc", "content": [] }),
        content_text: format!("{title} body"),
        content_html: String::new(),
        excerpt: None,
        cover_image: None,
        status,
        published_at: None,
    }
}

fn image_ref(post_id: Uuid, url: &str, image_id: Option<Uuid>, position: i32) -> PostImageRef {
    PostImageRef {
        post_id,
        image_url: url.to_string(),
        image_id,
        position,
    }
}

fn everything() -> PostFilter {
    PostFilter {
        status: None,
        label_slug: None,
        search: None,
        limit: 100,
        offset: 0,
    }
}

#[tokio::test]
async fn test_slug_uniqueness() {
    let repo = MemoryRepository::new();
    let post = repo.insert_post(new_post("First", "first", PostStatus::Draft)).await.unwrap();

    assert!(repo.post_slug_taken("first", None).await.unwrap());
    assert!(!repo.post_slug_taken("first", Some(post.id)).await.unwrap());
    assert!(!repo.post_slug_taken("second", None).await.unwrap());

    let err = repo
        .insert_post(new_post("Again", "first", PostStatus::Draft))
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::Conflict(_)));
}

#[tokio::test]
async fn test_list_filters_and_pages() {
    let repo = MemoryRepository::new();
    for i in 0..5 {
        let status = if i % 2 == 0 { PostStatus::Published } else { PostStatus::Draft };
        repo.insert_post(new_post(&format!("Post {i}"), &format!("post-{i}"), status))
            .await
            .unwrap();
    }

    let published = repo
        .list_posts(&PostFilter {
            status: Some(PostStatus::Published),
            ..everything()
        })
        .await
        .unwrap();
    assert_eq!(published.len(), 3);

    let page = repo
        .list_posts(&PostFilter {
            limit: 2,
            offset: 4,
            ..everything()
        })
        .await
        .unwrap();
    assert_eq!(page.len(), 1);

    let found = repo
        .list_posts(&PostFilter {
            search: Some("POST 3".to_string()),
            ..everything()
        })
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].slug, "post-3");
}

#[tokio::test]
async fn test_labels_attach_and_count_published() {
    let repo = MemoryRepository::new();
    let label = repo.insert_label("Travel", "travel", None).await.unwrap();
    let live = repo.insert_post(new_post("Live", "live", PostStatus::Published)).await.unwrap();
    let draft = repo.insert_post(new_post("Draft", "draft", PostStatus::Draft)).await.unwrap();
    repo.set_post_labels(live.id, &[label.id]).await.unwrap();
    repo.set_post_labels(draft.id, &[label.id]).await.unwrap();

    let labels = repo.list_labels().await.unwrap();
    assert_eq!(labels[0].post_count, 1);

    let loaded = repo.get_post(live.id).await.unwrap().unwrap();
    assert_eq!(loaded.labels.len(), 1);

    let err = repo.insert_label("Travel again", "travel", None).await.unwrap_err();
    assert!(matches!(err, RepoError::Conflict(_)));

    let err = repo.set_post_labels(live.id, &[Uuid::new_v4()]).await.unwrap_err();
    assert!(matches!(err, RepoError::Conflict(_)));

    assert!(repo.delete_label(label.id).await.unwrap());
    let loaded = repo.get_post(live.id).await.unwrap().unwrap();
    assert!(loaded.labels.is_empty());
}

#[tokio::test]
async fn test_delete_post_cascades() {
    let repo = MemoryRepository::new();
    let post = repo.insert_post(new_post("Gone", "gone", PostStatus::Published)).await.unwrap();
    repo.replace_post_images(post.id, &[image_ref(post.id, "/uploads/a.png", None, 0)])
        .await
        .unwrap();
    assert_eq!(repo.tracked_rows().await, 1);

    assert!(repo.delete_post(post.id).await.unwrap());
    assert_eq!(repo.tracked_rows().await, 0);
    assert!(!repo.delete_post(post.id).await.unwrap());
}

#[tokio::test]
async fn test_replace_post_images_reports_diff() {
    let repo = MemoryRepository::new();
    let post = repo.insert_post(new_post("Album", "album", PostStatus::Draft)).await.unwrap();

    let diff = repo
        .replace_post_images(
            post.id,
            &[
                image_ref(post.id, "/uploads/b.png", None, 0),
                image_ref(post.id, "/uploads/a.png", None, 1),
            ],
        )
        .await
        .unwrap();
    assert_eq!((diff.inserted, diff.removed), (2, 0));

    let diff = repo
        .replace_post_images(
            post.id,
            &[
                image_ref(post.id, "/uploads/a.png", None, 0),
                image_ref(post.id, "/uploads/c.png", None, 1),
            ],
        )
        .await
        .unwrap();
    assert_eq!((diff.inserted, diff.removed), (1, 1));

    let usage = repo.tracked_usage().await.unwrap();
    let urls: Vec<&str> = usage.iter().map(|u| u.image_url.as_str()).collect();
    assert_eq!(urls, vec!["/uploads/a.png", "/uploads/c.png"]);
    assert_eq!(usage[0].post_slug, "album");
}

#[tokio::test]
async fn test_deleting_image_keeps_usage_rows() {
    let repo = MemoryRepository::new();
    let image = repo
        .insert_image(NewImage {
            storage_key: "images/2024/01/x.png".to_string(),
            url: "/uploads/images/2024/01/x.png".to_string(),
            filename: "x.png".to_string(),
            content_type: "image/png".to_string(),
            size_bytes: 10,
            alt_text: None,
            uploaded_by: None,
        })
        .await
        .unwrap();
    let post = repo.insert_post(new_post("Uses X", "uses-x", PostStatus::Draft)).await.unwrap();
    repo.replace_post_images(post.id, &[image_ref(post.id, &image.url, Some(image.id), 0)])
        .await
        .unwrap();

    assert!(repo.delete_image(image.id).await.unwrap());
    assert!(repo.get_image(image.id).await.unwrap().is_none());
    assert_eq!(repo.tracked_usage().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_missing_usage_table() {
    let repo = MemoryRepository::without_image_tracking();
    let post = repo.insert_post(new_post("Old", "old", PostStatus::Draft)).await.unwrap();

    assert!(matches!(repo.tracked_usage().await, Err(RepoError::MissingTable(_))));
    assert!(matches!(
        repo.replace_post_images(post.id, &[]).await,
        Err(RepoError::MissingTable(_))
    ));
    assert_eq!(repo.all_posts().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_profiles_and_settings() {
    let repo = MemoryRepository::new();
    let id = Uuid::new_v4();
    repo.create_profile(id, "writer@example.com", Some("Writer"), Role::User)
        .await
        .unwrap();

    let promoted = repo.set_role(id, Role::Admin).await.unwrap().unwrap();
    assert_eq!(promoted.role, Role::Admin);
    assert!(repo.set_role(Uuid::new_v4(), Role::Admin).await.unwrap().is_none());

    repo.put_setting("site", json!({ "title": "One" })).await.unwrap();
    repo.put_setting("site", json!({ "title": "Two" })).await.unwrap();
    let settings = repo.list_settings().await.unwrap();
    assert_eq!(settings.len(), 1);
    assert_eq!(settings[0].value["title"], "Two");
}
