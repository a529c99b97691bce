use super::*;
use shared::{domain::Category, protocol::LikeChange};

const ADMIN_EMAIL: &str = "editor@vspress.org";

async fn setup() -> ApiContext {
    ApiContext {
        storage: Storage::new("sqlite::memory:").await.expect("db"),
        auth: AuthConfig {
            jwt_secret: "test-secret".into(),
            ttl_seconds: 600,
        },
        admin_email: ADMIN_EMAIL.into(),
        public_url: "http://press.test".into(),
        max_upload_bytes: 5 * 1024 * 1024,
    }
}

async fn signed_up(ctx: &ApiContext, email: &str, name: &str) -> Caller {
    let session = sign_up(
        ctx,
        &Credentials {
            email: email.into(),
            password: "correct horse".into(),
        },
    )
    .await
    .expect("sign up");
    let caller = authenticate(ctx, &session.token).await.expect("authenticate");
    create_profile(
        ctx,
        &caller,
        &NewProfile {
            user_id: caller.user_id,
            email: email.into(),
            display_name: name.into(),
            role: Role::for_signup(email, ADMIN_EMAIL),
        },
    )
    .await
    .expect("profile");
    caller
}

fn spring_fair() -> NewArticle {
    NewArticle {
        fields: ArticleFields {
            title: "Spring Fair".into(),
            excerpt: "Stalls, music and food".into(),
            content: "<p>...</p>".into(),
            image_url: "http://press.test/blobs/press/articles/fair.png".into(),
            category: Category::Events,
            featured: true,
        },
        author_name: "Editor".into(),
    }
}

#[tokio::test]
async fn sign_up_rejects_short_password_and_duplicate_email() {
    let ctx = setup().await;
    let err = sign_up(
        &ctx,
        &Credentials {
            email: "a@vspress.org".into(),
            password: "123".into(),
        },
    )
    .await
    .expect_err("short password");
    assert_eq!(err.code, ErrorCode::Validation);

    signed_up(&ctx, "a@vspress.org", "Ana").await;
    let err = sign_up(
        &ctx,
        &Credentials {
            email: "A@vspress.org".into(),
            password: "long enough".into(),
        },
    )
    .await
    .expect_err("duplicate");
    assert_eq!(err.code, ErrorCode::Conflict);
    assert_eq!(err.message, "email already in use");
}

#[tokio::test]
async fn log_in_checks_password_and_log_out_revokes_session() {
    let ctx = setup().await;
    signed_up(&ctx, "a@vspress.org", "Ana").await;

    let err = log_in(
        &ctx,
        &Credentials {
            email: "a@vspress.org".into(),
            password: "wrong".into(),
        },
    )
    .await
    .expect_err("wrong password");
    assert_eq!(err.code, ErrorCode::Unauthorized);

    let session = log_in(
        &ctx,
        &Credentials {
            email: "a@vspress.org".into(),
            password: "correct horse".into(),
        },
    )
    .await
    .expect("log in");
    let caller = authenticate(&ctx, &session.token).await.expect("auth");

    log_out(&ctx, &caller).await.expect("log out");
    let err = authenticate(&ctx, &session.token)
        .await
        .expect_err("revoked");
    assert_eq!(err.code, ErrorCode::Unauthorized);
}

#[tokio::test]
async fn admin_role_is_only_granted_to_configured_email() {
    let ctx = setup().await;
    let admin = signed_up(&ctx, ADMIN_EMAIL, "Editor").await;
    assert_eq!(
        get_profile(&ctx, admin.user_id).await.expect("profile").role,
        Role::Admin
    );

    let session = sign_up(
        &ctx,
        &Credentials {
            email: "sneaky@vspress.org".into(),
            password: "correct horse".into(),
        },
    )
    .await
    .expect("sign up");
    let caller = authenticate(&ctx, &session.token).await.expect("auth");
    let err = create_profile(
        &ctx,
        &caller,
        &NewProfile {
            user_id: caller.user_id,
            email: "sneaky@vspress.org".into(),
            display_name: "Sneaky".into(),
            role: Role::Admin,
        },
    )
    .await
    .expect_err("admin claim");
    assert_eq!(err.code, ErrorCode::Forbidden);
}

#[tokio::test]
async fn profile_cannot_be_written_for_someone_else() {
    let ctx = setup().await;
    let ana = signed_up(&ctx, "a@vspress.org", "Ana").await;
    let err = create_profile(
        &ctx,
        &ana,
        &NewProfile {
            user_id: UserId(ana.user_id.0 + 100),
            email: "a@vspress.org".into(),
            display_name: "Ana".into(),
            role: Role::User,
        },
    )
    .await
    .expect_err("foreign profile");
    assert_eq!(err.code, ErrorCode::Forbidden);
}

#[tokio::test]
async fn only_admin_can_create_and_delete_articles() {
    let ctx = setup().await;
    let admin = signed_up(&ctx, ADMIN_EMAIL, "Editor").await;
    let reader = signed_up(&ctx, "r@vspress.org", "Reader").await;

    let err = create_article(&ctx, &reader, &spring_fair())
        .await
        .expect_err("reader cannot publish");
    assert_eq!(err.code, ErrorCode::Forbidden);

    let id = create_article(&ctx, &admin, &spring_fair())
        .await
        .expect("admin publishes");
    let article = get_article(&ctx, id).await.expect("article");
    assert_eq!(article.author_id, admin.user_id);
    assert_eq!(article.likes, 0);

    let err = delete_article(&ctx, &reader, id)
        .await
        .expect_err("reader cannot delete");
    assert_eq!(err.code, ErrorCode::Forbidden);

    delete_article(&ctx, &admin, id).await.expect("delete");
    let err = get_article(&ctx, id).await.expect_err("gone");
    assert_eq!(err.code, ErrorCode::NotFound);
}

#[tokio::test]
async fn article_requires_title_content_and_image() {
    let ctx = setup().await;
    let admin = signed_up(&ctx, ADMIN_EMAIL, "Editor").await;
    let mut draft = spring_fair();
    draft.fields.image_url = "  ".into();

    let err = create_article(&ctx, &admin, &draft)
        .await
        .expect_err("missing image");
    assert_eq!(err.code, ErrorCode::Validation);
    assert_eq!(err.message, "image is required");
}

#[tokio::test]
async fn likes_from_two_users_accumulate() {
    let ctx = setup().await;
    let admin = signed_up(&ctx, ADMIN_EMAIL, "Editor").await;
    let u1 = signed_up(&ctx, "u1@vspress.org", "U1").await;
    let u2 = signed_up(&ctx, "u2@vspress.org", "U2").await;
    let id = create_article(&ctx, &admin, &spring_fair())
        .await
        .expect("article");

    for caller in [&u1, &u2] {
        patch_article(
            &ctx,
            caller,
            id,
            &ArticlePatch {
                fields: None,
                like: Some(LikeChange::like(caller.user_id)),
            },
        )
        .await
        .expect("like");
    }

    let article = get_article(&ctx, id).await.expect("article");
    assert_eq!(article.likes, 2);
    assert!(article.is_liked_by(u1.user_id));
    assert!(article.is_liked_by(u2.user_id));
}

#[tokio::test]
async fn like_patch_is_bound_to_the_caller() {
    let ctx = setup().await;
    let admin = signed_up(&ctx, ADMIN_EMAIL, "Editor").await;
    let u1 = signed_up(&ctx, "u1@vspress.org", "U1").await;
    let id = create_article(&ctx, &admin, &spring_fair())
        .await
        .expect("article");

    let err = patch_article(
        &ctx,
        &u1,
        id,
        &ArticlePatch {
            fields: None,
            like: Some(LikeChange::like(admin.user_id)),
        },
    )
    .await
    .expect_err("like on behalf of someone else");
    assert_eq!(err.code, ErrorCode::Forbidden);

    let err = patch_article(
        &ctx,
        &u1,
        id,
        &ArticlePatch {
            fields: None,
            like: Some(LikeChange {
                increment: 5,
                ..LikeChange::like(u1.user_id)
            }),
        },
    )
    .await
    .expect_err("inflated increment");
    assert_eq!(err.code, ErrorCode::Validation);

    let err = patch_article(
        &ctx,
        &u1,
        id,
        &ArticlePatch {
            fields: Some(spring_fair().fields),
            like: None,
        },
    )
    .await
    .expect_err("reader cannot edit");
    assert_eq!(err.code, ErrorCode::Forbidden);
}

#[tokio::test]
async fn comment_delete_allowed_for_author_or_admin_only() {
    let ctx = setup().await;
    let admin = signed_up(&ctx, ADMIN_EMAIL, "Editor").await;
    let author = signed_up(&ctx, "author@vspress.org", "Author").await;
    let other = signed_up(&ctx, "other@vspress.org", "Other").await;
    let id = create_article(&ctx, &admin, &spring_fair())
        .await
        .expect("article");

    let first = create_comment(
        &ctx,
        &author,
        id,
        &NewComment {
            user_name: String::new(),
            text: "See you there".into(),
        },
    )
    .await
    .expect("comment");
    let second = create_comment(
        &ctx,
        &author,
        id,
        &NewComment {
            user_name: "Author".into(),
            text: "Bringing cake".into(),
        },
    )
    .await
    .expect("comment");

    let listed = list_comments(&ctx, id).await.expect("comments");
    assert_eq!(listed[0].id, second);
    assert_eq!(listed[1].user_name, "Author", "falls back to profile name");

    let err = delete_comment(&ctx, &other, id, first)
        .await
        .expect_err("not author");
    assert_eq!(err.code, ErrorCode::Forbidden);

    delete_comment(&ctx, &author, id, first)
        .await
        .expect("author deletes");
    delete_comment(&ctx, &admin, id, second)
        .await
        .expect("admin deletes");
    assert!(list_comments(&ctx, id).await.expect("comments").is_empty());
}

#[tokio::test]
async fn empty_comment_is_rejected() {
    let ctx = setup().await;
    let admin = signed_up(&ctx, ADMIN_EMAIL, "Editor").await;
    let id = create_article(&ctx, &admin, &spring_fair())
        .await
        .expect("article");
    let err = create_comment(
        &ctx,
        &admin,
        id,
        &NewComment {
            user_name: "Editor".into(),
            text: "   ".into(),
        },
    )
    .await
    .expect_err("empty");
    assert_eq!(err.code, ErrorCode::Validation);
}

#[tokio::test]
async fn blob_store_enforces_size_and_path_rules() {
    let mut ctx = setup().await;
    ctx.max_upload_bytes = 8;
    let user = signed_up(&ctx, "a@vspress.org", "Ana").await;

    let err = store_blob(&ctx, &user, "press", "articles/big.png", None, b"123456789")
        .await
        .expect_err("too large");
    assert_eq!(err.code, ErrorCode::PayloadTooLarge);

    let err = store_blob(&ctx, &user, "press", "../etc/passwd", None, b"x")
        .await
        .expect_err("traversal");
    assert_eq!(err.code, ErrorCode::Validation);

    let stored = store_blob(&ctx, &user, "press", "articles/ok.png", Some("image/png"), b"png")
        .await
        .expect("store");
    assert_eq!(stored.size_bytes, 3);
    assert_eq!(stored.content_type, "image/png");

    let url = blob_url(&ctx, "press", "articles/ok.png").await.expect("url");
    assert_eq!(url, "http://press.test/blobs/press/articles/ok.png");

    let err = blob_url(&ctx, "press", "articles/missing.png")
        .await
        .expect_err("missing");
    assert_eq!(err.code, ErrorCode::NotFound);
}
