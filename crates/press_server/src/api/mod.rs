use crate::auth::{
    hash_password, mint_session_token, verify_password, verify_session_token, AuthConfig,
};
use shared::{
    domain::{Article, ArticleId, Comment, CommentId, Role, UserId, UserProfile},
    error::{ApiError, ErrorCode},
    protocol::{
        ArrayOp, ArticleFields, ArticlePatch, ArticleQuery, BlobHandle, BlobStored, Credentials,
        NewArticle, NewComment, NewProfile, Session,
    },
};
use storage::{Storage, StoredBlob};
use tracing::{info, warn};

const MIN_PASSWORD_CHARS: usize = 6;
const MAX_LIST_LIMIT: u32 = 100;
const MAX_BLOB_PATH_BYTES: usize = 512;

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
    pub auth: AuthConfig,
    pub admin_email: String,
    pub public_url: String,
    pub max_upload_bytes: usize,
}

/// The authenticated identity behind a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: UserId,
    pub email: String,
    pub session_id: String,
}

pub async fn sign_up(ctx: &ApiContext, credentials: &Credentials) -> Result<Session, ApiError> {
    let email = credentials.email.trim();
    validate_email(email)?;
    if credentials.password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(ApiError::new(
            ErrorCode::Validation,
            format!("password should be at least {MIN_PASSWORD_CHARS} characters"),
        ));
    }

    let hash = hash_password(&credentials.password)
        .map_err(|e| ApiError::new(ErrorCode::Internal, format!("password hashing failed: {e}")))?;
    let user_id = ctx
        .storage
        .create_account(email, &hash)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::Conflict, "email already in use"))?;
    info!(user_id = user_id.0, "account created");

    open_session(ctx, user_id, email).await
}

pub async fn log_in(ctx: &ApiContext, credentials: &Credentials) -> Result<Session, ApiError> {
    let account = ctx
        .storage
        .account_by_email(credentials.email.trim())
        .await
        .map_err(internal)?;
    let Some(account) = account else {
        return Err(invalid_credentials());
    };
    if !verify_password(&credentials.password, &account.password_hash) {
        warn!(user_id = account.user_id.0, "password mismatch");
        return Err(invalid_credentials());
    }

    open_session(ctx, account.user_id, &account.email).await
}

pub async fn log_out(ctx: &ApiContext, caller: &Caller) -> Result<(), ApiError> {
    ctx.storage
        .delete_session(&caller.session_id)
        .await
        .map_err(internal)?;
    info!(user_id = caller.user_id.0, "session closed");
    Ok(())
}

pub async fn authenticate(ctx: &ApiContext, token: &str) -> Result<Caller, ApiError> {
    let claims = verify_session_token(&ctx.auth, token)
        .map_err(|_| ApiError::new(ErrorCode::Unauthorized, "session is invalid or expired"))?;
    let user_id = claims
        .user_id()
        .ok_or_else(|| ApiError::new(ErrorCode::Unauthorized, "session is invalid or expired"))?;
    let active = ctx
        .storage
        .session_is_active(&claims.sid, user_id)
        .await
        .map_err(internal)?;
    if !active {
        return Err(ApiError::new(
            ErrorCode::Unauthorized,
            "session is invalid or expired",
        ));
    }

    Ok(Caller {
        user_id,
        email: claims.email,
        session_id: claims.sid,
    })
}

pub async fn update_display_name(
    ctx: &ApiContext,
    caller: &Caller,
    display_name: &str,
) -> Result<(), ApiError> {
    let display_name = display_name.trim();
    if display_name.is_empty() {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "display name cannot be empty",
        ));
    }
    ctx.storage
        .set_display_name(caller.user_id, display_name)
        .await
        .map_err(internal)?;
    Ok(())
}

pub async fn get_profile(ctx: &ApiContext, user_id: UserId) -> Result<UserProfile, ApiError> {
    ctx.storage
        .profile(user_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, "profile not found"))
}

pub async fn create_profile(
    ctx: &ApiContext,
    caller: &Caller,
    profile: &NewProfile,
) -> Result<UserProfile, ApiError> {
    if profile.user_id != caller.user_id {
        return Err(ApiError::new(
            ErrorCode::Forbidden,
            "cannot write another user's profile",
        ));
    }
    if !profile.email.trim().eq_ignore_ascii_case(&caller.email) {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "profile email does not match the signed-in account",
        ));
    }
    if profile.role == Role::Admin && Role::for_signup(&caller.email, &ctx.admin_email) != Role::Admin
    {
        warn!(user_id = caller.user_id.0, "rejected admin role claim");
        return Err(ApiError::new(
            ErrorCode::Forbidden,
            "admin role is not granted for this account",
        ));
    }
    if profile.display_name.trim().is_empty() {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "display name cannot be empty",
        ));
    }

    let created = ctx
        .storage
        .create_profile(&NewProfile {
            user_id: caller.user_id,
            email: caller.email.clone(),
            display_name: profile.display_name.trim().to_string(),
            role: profile.role,
        })
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::Conflict, "profile already exists"))?;
    info!(user_id = created.user_id.0, role = created.role.as_str(), "profile created");
    Ok(created)
}

pub async fn list_articles(ctx: &ApiContext, query: &ArticleQuery) -> Result<Vec<Article>, ApiError> {
    let query = ArticleQuery {
        limit: query.limit.map(|limit| limit.clamp(1, MAX_LIST_LIMIT)),
        ..query.clone()
    };
    ctx.storage.list_articles(&query).await.map_err(internal)
}

pub async fn get_article(ctx: &ApiContext, article_id: ArticleId) -> Result<Article, ApiError> {
    ctx.storage
        .article(article_id)
        .await
        .map_err(internal)?
        .ok_or_else(article_not_found)
}

pub async fn create_article(
    ctx: &ApiContext,
    caller: &Caller,
    article: &NewArticle,
) -> Result<ArticleId, ApiError> {
    ensure_admin(ctx, caller).await?;
    validate_article_fields(&article.fields)?;
    let article_id = ctx
        .storage
        .create_article(caller.user_id, article)
        .await
        .map_err(internal)?;
    info!(article_id = article_id.0, "article created");
    Ok(article_id)
}

/// Field edits need the admin role; a like change is allowed for any
/// signed-in user, but only on their own behalf.
pub async fn patch_article(
    ctx: &ApiContext,
    caller: &Caller,
    article_id: ArticleId,
    patch: &ArticlePatch,
) -> Result<(), ApiError> {
    if patch.fields.is_none() && patch.like.is_none() {
        return Err(ApiError::new(ErrorCode::Validation, "patch is empty"));
    }

    if let Some(fields) = &patch.fields {
        ensure_admin(ctx, caller).await?;
        validate_article_fields(fields)?;
    }
    if let Some(like) = &patch.like {
        if like.user_id != caller.user_id {
            return Err(ApiError::new(
                ErrorCode::Forbidden,
                "cannot change likes on behalf of another user",
            ));
        }
        let consistent = matches!(
            (like.op, like.increment),
            (ArrayOp::Union, 1) | (ArrayOp::Remove, -1)
        );
        if !consistent {
            return Err(ApiError::new(
                ErrorCode::Validation,
                "like increment must match the membership change",
            ));
        }
    }

    if let Some(fields) = &patch.fields {
        let updated = ctx
            .storage
            .update_article_fields(article_id, fields)
            .await
            .map_err(internal)?;
        if !updated {
            return Err(article_not_found());
        }
        info!(article_id = article_id.0, "article updated");
    }
    if let Some(like) = patch.like {
        ctx.storage
            .apply_like(article_id, like)
            .await
            .map_err(internal)?
            .ok_or_else(article_not_found)?;
    }
    Ok(())
}

pub async fn delete_article(
    ctx: &ApiContext,
    caller: &Caller,
    article_id: ArticleId,
) -> Result<(), ApiError> {
    ensure_admin(ctx, caller).await?;
    let deleted = ctx
        .storage
        .delete_article(article_id)
        .await
        .map_err(internal)?;
    if !deleted {
        return Err(article_not_found());
    }
    info!(article_id = article_id.0, "article deleted");
    Ok(())
}

pub async fn list_comments(
    ctx: &ApiContext,
    article_id: ArticleId,
) -> Result<Vec<Comment>, ApiError> {
    get_article(ctx, article_id).await?;
    ctx.storage
        .list_comments(article_id)
        .await
        .map_err(internal)
}

pub async fn create_comment(
    ctx: &ApiContext,
    caller: &Caller,
    article_id: ArticleId,
    comment: &NewComment,
) -> Result<CommentId, ApiError> {
    let text = comment.text.trim();
    if text.is_empty() {
        return Err(ApiError::new(ErrorCode::Validation, "comment cannot be empty"));
    }

    let user_name = match comment.user_name.trim() {
        "" => ctx
            .storage
            .profile(caller.user_id)
            .await
            .map_err(internal)?
            .map(|profile| profile.display_name)
            .unwrap_or_else(|| caller.email.clone()),
        name => name.to_string(),
    };

    ctx.storage
        .insert_comment(article_id, caller.user_id, &user_name, text)
        .await
        .map_err(internal)?
        .ok_or_else(article_not_found)
}

pub async fn delete_comment(
    ctx: &ApiContext,
    caller: &Caller,
    article_id: ArticleId,
    comment_id: CommentId,
) -> Result<(), ApiError> {
    let comment = ctx
        .storage
        .comment(article_id, comment_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, "comment not found"))?;

    if comment.user_id != caller.user_id && !caller_is_admin(ctx, caller).await? {
        return Err(ApiError::new(
            ErrorCode::Forbidden,
            "only the author or an admin can delete this comment",
        ));
    }

    ctx.storage
        .delete_comment(article_id, comment_id)
        .await
        .map_err(internal)?;
    Ok(())
}

pub async fn store_blob(
    ctx: &ApiContext,
    caller: &Caller,
    bucket: &str,
    path: &str,
    content_type: Option<&str>,
    bytes: &[u8],
) -> Result<BlobStored, ApiError> {
    validate_blob_location(bucket, path)?;
    if bytes.is_empty() {
        return Err(ApiError::new(ErrorCode::Validation, "upload body cannot be empty"));
    }
    if bytes.len() > ctx.max_upload_bytes {
        return Err(ApiError::new(
            ErrorCode::PayloadTooLarge,
            format!("file exceeds {} bytes", ctx.max_upload_bytes),
        ));
    }

    let content_type = content_type
        .map(str::trim)
        .filter(|ct| !ct.is_empty())
        .unwrap_or("application/octet-stream");
    let size_bytes = ctx
        .storage
        .put_blob(bucket, path, content_type, bytes, caller.user_id)
        .await
        .map_err(internal)?;
    info!(bucket, path, size_bytes, "blob stored");

    Ok(BlobStored {
        handle: BlobHandle {
            bucket: bucket.to_string(),
            path: path.to_string(),
        },
        size_bytes,
        content_type: content_type.to_string(),
    })
}

pub async fn load_blob(ctx: &ApiContext, bucket: &str, path: &str) -> Result<StoredBlob, ApiError> {
    validate_blob_location(bucket, path)?;
    ctx.storage
        .load_blob(bucket, path)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, "file not found"))
}

/// Durable download address for a stored blob.
pub async fn blob_url(ctx: &ApiContext, bucket: &str, path: &str) -> Result<String, ApiError> {
    load_blob(ctx, bucket, path).await?;
    Ok(format!(
        "{}/blobs/{bucket}/{path}",
        ctx.public_url.trim_end_matches('/')
    ))
}

async fn open_session(ctx: &ApiContext, user_id: UserId, email: &str) -> Result<Session, ApiError> {
    let minted = mint_session_token(&ctx.auth, user_id, email)
        .map_err(|e| ApiError::new(ErrorCode::Internal, format!("token mint failed: {e}")))?;
    ctx.storage
        .insert_session(&minted.session_id, user_id, minted.expires_at)
        .await
        .map_err(internal)?;
    Ok(Session {
        token: minted.token,
        user_id,
        email: email.to_string(),
        expires_at: minted.expires_at,
    })
}

async fn caller_is_admin(ctx: &ApiContext, caller: &Caller) -> Result<bool, ApiError> {
    let profile = ctx
        .storage
        .profile(caller.user_id)
        .await
        .map_err(internal)?;
    Ok(profile.is_some_and(|profile| profile.is_admin()))
}

async fn ensure_admin(ctx: &ApiContext, caller: &Caller) -> Result<(), ApiError> {
    if caller_is_admin(ctx, caller).await? {
        Ok(())
    } else {
        Err(ApiError::new(ErrorCode::Forbidden, "admin role required"))
    }
}

fn validate_email(email: &str) -> Result<(), ApiError> {
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'))
        && !email.contains(char::is_whitespace);
    if valid {
        Ok(())
    } else {
        Err(ApiError::new(ErrorCode::Validation, "invalid email address"))
    }
}

fn validate_article_fields(fields: &ArticleFields) -> Result<(), ApiError> {
    let missing = [
        ("title", &fields.title),
        ("content", &fields.content),
        ("image", &fields.image_url),
    ]
    .into_iter()
    .find(|(_, value)| value.trim().is_empty());
    match missing {
        Some((name, _)) => Err(ApiError::new(
            ErrorCode::Validation,
            format!("{name} is required"),
        )),
        None => Ok(()),
    }
}

fn validate_blob_location(bucket: &str, path: &str) -> Result<(), ApiError> {
    let bucket_ok = !bucket.is_empty()
        && bucket
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    let path_ok = !path.is_empty()
        && path.len() <= MAX_BLOB_PATH_BYTES
        && !path.starts_with('/')
        && !path.contains('\\')
        && path.split('/').all(|segment| !segment.is_empty() && segment != "..");
    if bucket_ok && path_ok {
        Ok(())
    } else {
        Err(ApiError::new(ErrorCode::Validation, "invalid storage path"))
    }
}

fn invalid_credentials() -> ApiError {
    ApiError::new(ErrorCode::Unauthorized, "invalid email or password")
}

fn article_not_found() -> ApiError {
    ApiError::new(ErrorCode::NotFound, "article not found")
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}

#[cfg(test)]
#[path = "tests/mod_tests.rs"]
mod tests;
