mod common;

use common::{TestApp, doc_with_image, spawn_app};
use serde_json::{Value, json};
use storyline::models::{Label, Post, PostStatus, PostSummary, SlugCheckResponse};

async fn create(app: &TestApp, token: &str, body: Value) -> reqwest::Response {
    app.client
        .post(app.url("/admin/posts"))
        .bearer_auth(token)
        .json(&body)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn create_derives_slug_text_and_excerpt() {
    let app = spawn_app().await;
    let (admin, token) = app.admin().await;

    let resp = create(
        &app,
        &token,
        json!({
            "title": "  My First Trip ",
            "content": doc_with_image("Hello world", "/uploads/a.jpg"),
            "status": "published"
        }),
    )
    .await;
    assert_eq!(resp.status(), 201);

    let post: Post = resp.json().await.unwrap();
    assert_eq!(post.title, "My First Trip");
    assert_eq!(post.slug, "my-first-trip");
    assert_eq!(post.author_id, Some(admin));
    assert_eq!(post.content_text, "Hello world");
    assert_eq!(post.excerpt.as_deref(), Some("Hello world"));
    assert!(post.content_html.starts_with("<p>Hello world</p>"));
    assert_eq!(post.status, PostStatus::Published);
    assert!(post.published_at.is_some());
}

#[tokio::test]
async fn colliding_and_reserved_titles_get_suffixes() {
    let app = spawn_app().await;
    let (_, token) = app.admin().await;

    let first: Post = create(&app, &token, json!({ "title": "Same Title" })).await.json().await.unwrap();
    let second: Post = create(&app, &token, json!({ "title": "Same Title" })).await.json().await.unwrap();
    let reserved: Post = create(&app, &token, json!({ "title": "Admin" })).await.json().await.unwrap();

    assert_eq!(first.slug, "same-title");
    assert_eq!(second.slug, "same-title-2");
    assert_eq!(reserved.slug, "admin-post");
}

#[tokio::test]
async fn invalid_input_is_422() {
    let app = spawn_app().await;
    let (_, token) = app.admin().await;

    let resp = create(&app, &token, json!({ "title": "Ok", "slug": "Not A Slug" })).await;
    assert_eq!(resp.status(), 422);

    let resp = create(&app, &token, json!({ "title": "   " })).await;
    assert_eq!(resp.status(), 422);

    let resp = create(&app, &token, json!({ "title": "Ok", "content": { "type": "paragraph" } })).await;
    assert_eq!(resp.status(), 422);

    let resp = create(
        &app,
        &token,
        json!({ "title": "Ok", "label_ids": [uuid::Uuid::new_v4()] }),
    )
    .await;
    assert_eq!(resp.status(), 422);
}

#[tokio::test]
async fn drafts_stay_off_the_public_site() {
    let app = spawn_app().await;
    let (_, token) = app.admin().await;

    create(&app, &token, json!({ "title": "Public One", "status": "published" })).await;
    let draft: Post = create(&app, &token, json!({ "title": "Secret Draft" })).await.json().await.unwrap();

    let listed: Vec<PostSummary> = app
        .client
        .get(app.url("/posts"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].slug, "public-one");

    let resp = app
        .client
        .get(app.url(&format!("/posts/{}", draft.slug)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let all: Vec<PostSummary> = app
        .client
        .get(app.url("/admin/posts"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    let drafts: Vec<PostSummary> = app
        .client
        .get(app.url("/admin/posts?status=draft"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(drafts.len(), 1);
}

#[tokio::test]
async fn update_renames_and_publishes() {
    let app = spawn_app().await;
    let (_, token) = app.admin().await;
    let post: Post = create(&app, &token, json!({ "title": "Working Title" })).await.json().await.unwrap();
    assert!(post.published_at.is_none());

    let resp = app
        .client
        .put(app.url(&format!("/admin/posts/{}", post.id)))
        .bearer_auth(&token)
        .json(&json!({ "slug": "final-title", "title": "Final Title" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let updated: Post = resp.json().await.unwrap();
    assert_eq!(updated.slug, "final-title");
    assert_eq!(updated.title, "Final Title");

    let resp = app
        .client
        .put(app.url(&format!("/admin/posts/{}/status", post.id)))
        .bearer_auth(&token)
        .json(&json!({ "status": "published" }))
        .send()
        .await
        .unwrap();
    let published: Post = resp.json().await.unwrap();
    assert_eq!(published.status, PostStatus::Published);
    assert!(published.published_at.is_some());

    let resp = app.client.get(app.url("/posts/final-title")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn content_change_refreshes_derived_fields() {
    let app = spawn_app().await;
    let (_, token) = app.admin().await;
    let post: Post = create(
        &app,
        &token,
        json!({ "title": "Notes", "content": doc_with_image("Old words", "/uploads/old.jpg") }),
    )
    .await
    .json()
    .await
    .unwrap();

    let updated: Post = app
        .client
        .put(app.url(&format!("/admin/posts/{}", post.id)))
        .bearer_auth(&token)
        .json(&json!({ "content": doc_with_image("New words", "/uploads/new.jpg") }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(updated.content_text, "New words");
    assert_eq!(updated.excerpt.as_deref(), Some("New words"));
    assert!(updated.content_html.contains("/uploads/new.jpg"));
}

#[tokio::test]
async fn labels_filter_public_listing() {
    let app = spawn_app().await;
    let (_, token) = app.admin().await;

    let label: Label = app
        .client
        .post(app.url("/admin/labels"))
        .bearer_auth(&token)
        .json(&json!({ "name": "Travel", "color": "#0af" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(label.slug, "travel");

    let tagged: Post = create(
        &app,
        &token,
        json!({ "title": "Tagged", "status": "published", "label_ids": [label.id] }),
    )
    .await
    .json()
    .await
    .unwrap();
    assert_eq!(tagged.labels.len(), 1);
    create(&app, &token, json!({ "title": "Untagged", "status": "published" })).await;

    let listed: Vec<PostSummary> = app
        .client
        .get(app.url("/posts?label=travel"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, tagged.id);

    let labels: Vec<Label> = app
        .client
        .get(app.url("/labels"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(labels[0].post_count, 1);

    let cleared: Post = app
        .client
        .put(app.url(&format!("/admin/posts/{}/labels", tagged.id)))
        .bearer_auth(&token)
        .json(&json!({ "label_ids": [] }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(cleared.labels.is_empty());
}

#[tokio::test]
async fn delete_removes_post() {
    let app = spawn_app().await;
    let (_, token) = app.admin().await;
    let post: Post = create(&app, &token, json!({ "title": "Short Lived" })).await.json().await.unwrap();

    let path = format!("/admin/posts/{}", post.id);
    let resp = app.client.delete(app.url(&path)).bearer_auth(&token).send().await.unwrap();
    assert_eq!(resp.status(), 204);

    let resp = app.client.get(app.url(&path)).bearer_auth(&token).send().await.unwrap();
    assert_eq!(resp.status(), 404);

    let resp = app.client.delete(app.url(&path)).bearer_auth(&token).send().await.unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn slug_check_reports_and_suggests() {
    let app = spawn_app().await;
    let (_, token) = app.admin().await;
    let post: Post = create(&app, &token, json!({ "title": "Taken" })).await.json().await.unwrap();

    let check = |query: String| {
        let app = &app;
        let token = &token;
        async move {
            app.client
                .get(app.url(&format!("/admin/slugs/check?{query}")))
                .bearer_auth(token)
                .send()
                .await
                .unwrap()
                .json::<SlugCheckResponse>()
                .await
                .unwrap()
        }
    };

    let taken = check("slug=taken".to_string()).await;
    assert!(taken.valid);
    assert!(!taken.available);
    assert_eq!(taken.suggestion, "taken-2");

    let own = check(format!("slug=taken&exclude={}", post.id)).await;
    assert!(own.available);
    assert_eq!(own.suggestion, "taken");

    let reserved = check("slug=login".to_string()).await;
    assert!(!reserved.valid);
    assert!(reserved.error.is_some());
    assert_eq!(reserved.suggestion, "login-post");
}
