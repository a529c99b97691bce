use std::sync::Arc;

use shared::{
    domain::{Article, ArticleId, Category, CommentId, Role},
    protocol::{ArticleFields, ArticlePatch, ArticleQuery, LikeChange, NewArticle, NewComment, NewProfile},
};
use tracing::{info, warn};

use crate::{
    collaborators::{BlobCollaborator, DocumentCollaborator, IdentityCollaborator},
    config::{ClientConfig, ConfigError},
    error::ActionError,
    http::HttpBackend,
    router::Route,
    session::{ArticleForm, SessionContext},
    theme::{MemoryThemeStore, Theme, ThemeStore},
};

pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;
const MAX_FILE_NAME_CHARS: usize = 80;

/// Dispatches user actions to the identity, document and blob
/// collaborators and keeps a [`SessionContext`] in step with the results.
pub struct Orchestrator {
    identity: Arc<dyn IdentityCollaborator>,
    documents: Arc<dyn DocumentCollaborator>,
    blobs: Arc<dyn BlobCollaborator>,
    theme_store: Arc<dyn ThemeStore>,
    admin_email: String,
}

impl Orchestrator {
    pub fn new(
        identity: Arc<dyn IdentityCollaborator>,
        documents: Arc<dyn DocumentCollaborator>,
        blobs: Arc<dyn BlobCollaborator>,
        admin_email: impl Into<String>,
    ) -> Self {
        Self {
            identity,
            documents,
            blobs,
            theme_store: Arc::new(MemoryThemeStore::default()),
            admin_email: admin_email.into(),
        }
    }

    /// All three collaborators served by one HTTP backend.
    pub fn over_http(config: &ClientConfig) -> Result<Self, ConfigError> {
        let backend = Arc::new(HttpBackend::new(config)?);
        Ok(Self::new(
            backend.clone(),
            backend.clone(),
            backend,
            config.admin_email.clone(),
        ))
    }

    pub fn with_theme_store(mut self, theme_store: Arc<dyn ThemeStore>) -> Self {
        self.theme_store = theme_store;
        self
    }

    pub fn identity(&self) -> &Arc<dyn IdentityCollaborator> {
        &self.identity
    }

    pub fn theme_store(&self) -> &dyn ThemeStore {
        self.theme_store.as_ref()
    }

    /// Switches to the route named by `token` and fetches what its view
    /// shows. Returns `None` for an unrecognised token.
    pub async fn open(
        &self,
        ctx: &mut SessionContext,
        token: &str,
    ) -> Result<Option<Route>, ActionError> {
        let route = Route::parse(token);
        ctx.route = route;
        match route {
            Some(Route::Home) => self.load_articles(ctx, None).await?,
            Some(Route::Articles { category }) => self.load_articles(ctx, category).await?,
            Some(Route::Article { id }) => self.load_article(ctx, id).await?,
            Some(Route::Admin) if ctx.is_admin() => self.load_articles(ctx, None).await?,
            _ => {}
        }
        Ok(route)
    }

    pub async fn sign_up(
        &self,
        ctx: &mut SessionContext,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<(), ActionError> {
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(ActionError::Validation("display name is required".into()));
        }

        let session = self.identity.create_account(email.trim(), password).await?;
        self.identity
            .update_display_name(&session, display_name)
            .await?;
        let role = Role::for_signup(&session.email, &self.admin_email);
        let profile = self
            .documents
            .create_profile(
                &session,
                &NewProfile {
                    user_id: session.user_id,
                    email: session.email.clone(),
                    display_name: display_name.to_string(),
                    role,
                },
            )
            .await?;
        info!(user_id = session.user_id.0, role = role.as_str(), "signed up");

        ctx.session = Some(session);
        ctx.profile = Some(profile);
        ctx.route = Some(Route::Home);
        ctx.success("Account created");
        Ok(())
    }

    pub async fn log_in(
        &self,
        ctx: &mut SessionContext,
        email: &str,
        password: &str,
    ) -> Result<(), ActionError> {
        let session = self.identity.authenticate(email.trim(), password).await?;
        let profile = self
            .documents
            .get_profile(&session, session.user_id)
            .await?;
        if profile.is_none() {
            warn!(user_id = session.user_id.0, "signed in without a profile");
        }

        ctx.session = Some(session);
        ctx.profile = profile;
        ctx.route = Some(Route::Home);
        ctx.success("Signed in");
        Ok(())
    }

    pub async fn log_out(&self, ctx: &mut SessionContext) -> Result<(), ActionError> {
        let session = ctx.require_session()?;
        self.identity.sign_out(&session).await?;
        ctx.clear_user();
        ctx.route = Some(Route::Home);
        ctx.success("Signed out");
        Ok(())
    }

    /// Authoritative article list; replaces whatever was shown before.
    pub async fn load_articles(
        &self,
        ctx: &mut SessionContext,
        category: Option<Category>,
    ) -> Result<(), ActionError> {
        ctx.articles = self
            .documents
            .list_articles(&ArticleQuery {
                category,
                ..ArticleQuery::default()
            })
            .await?;
        Ok(())
    }

    /// Authoritative article and its comments. Also refreshes the article's
    /// entry in the list, settling any optimistic change made earlier.
    pub async fn load_article(
        &self,
        ctx: &mut SessionContext,
        article_id: ArticleId,
    ) -> Result<(), ActionError> {
        let article = self
            .documents
            .get_article(article_id)
            .await?
            .ok_or(ActionError::NotFound("article"))?;
        let comments = self.documents.list_comments(article_id).await?;

        ctx.install_article(article);
        ctx.comments = comments;
        Ok(())
    }

    /// Fills the admin form from an existing article.
    pub async fn edit_article(
        &self,
        ctx: &mut SessionContext,
        article_id: ArticleId,
    ) -> Result<(), ActionError> {
        ctx.require_admin()?;
        let article = self.article(ctx, article_id).await?;
        ctx.article_form = ArticleForm {
            editing: Some(article_id),
            fields: ArticleFields {
                title: article.title,
                excerpt: article.excerpt,
                content: article.content,
                image_url: article.image_url,
                category: article.category,
                featured: article.featured,
            },
        };
        ctx.route = Some(Route::Admin);
        Ok(())
    }

    /// Creates or updates the article in the admin form.
    pub async fn save_article(&self, ctx: &mut SessionContext) -> Result<ArticleId, ActionError> {
        let session = ctx.require_admin()?;
        let form = ctx.article_form.clone();
        let missing: Vec<&str> = [
            ("title", &form.fields.title),
            ("content", &form.fields.content),
            ("image", &form.fields.image_url),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();
        if !missing.is_empty() {
            return Err(ActionError::Validation(format!(
                "please provide: {}",
                missing.join(", ")
            )));
        }

        let article_id = match form.editing {
            Some(article_id) => {
                self.documents
                    .update_article(
                        &session,
                        article_id,
                        &ArticlePatch {
                            fields: Some(form.fields),
                            like: None,
                        },
                    )
                    .await?;
                ctx.success("Article updated");
                article_id
            }
            None => {
                let author_name = ctx.display_name().unwrap_or_default().to_string();
                let article_id = self
                    .documents
                    .create_article(
                        &session,
                        &NewArticle {
                            fields: form.fields,
                            author_name,
                        },
                    )
                    .await?;
                ctx.success("Article published");
                article_id
            }
        };
        info!(article_id = article_id.0, "article saved");

        ctx.article_form = ArticleForm::default();
        ctx.route = Some(Route::Admin);
        self.load_articles(ctx, None).await?;
        Ok(article_id)
    }

    /// Deletes an article after `confirm` approves it. Declining makes no
    /// call and changes nothing.
    pub async fn delete_article(
        &self,
        ctx: &mut SessionContext,
        article_id: ArticleId,
        confirm: impl FnOnce(&Article) -> bool,
    ) -> Result<(), ActionError> {
        let session = ctx.require_admin()?;
        let article = self.article(ctx, article_id).await?;
        if !confirm(&article) {
            return Err(ActionError::Cancelled);
        }

        self.documents.delete_article(&session, article_id).await?;
        ctx.articles.retain(|listed| listed.id != article_id);
        if ctx
            .current_article
            .as_ref()
            .is_some_and(|current| current.id == article_id)
        {
            ctx.current_article = None;
            ctx.comments.clear();
        }
        if ctx.article_form.editing == Some(article_id) {
            ctx.article_form = ArticleForm::default();
        }
        info!(article_id = article_id.0, "article deleted");
        ctx.success("Article deleted");
        Ok(())
    }

    /// Likes or unlikes the article as the signed-in user. The local copies
    /// are updated without a re-fetch; the next load settles them. Returns
    /// whether the article is now liked.
    pub async fn toggle_like(
        &self,
        ctx: &mut SessionContext,
        article_id: ArticleId,
    ) -> Result<bool, ActionError> {
        let session = ctx.require_session()?;
        let user_id = session.user_id;
        let article = self.article(ctx, article_id).await?;
        let liked = article.is_liked_by(user_id);
        let change = if liked {
            LikeChange::unlike(user_id)
        } else {
            LikeChange::like(user_id)
        };

        self.documents
            .update_article(
                &session,
                article_id,
                &ArticlePatch {
                    fields: None,
                    like: Some(change),
                },
            )
            .await?;

        if ctx.local_article(article_id).is_none() {
            ctx.articles.push(article);
        }
        ctx.update_local_article(article_id, |local| {
            if liked {
                if local.liked_by.remove(&user_id) {
                    local.likes = (local.likes - 1).max(0);
                }
            } else if local.liked_by.insert(user_id) {
                local.likes += 1;
            }
        });
        Ok(!liked)
    }

    /// Uploads an image for the admin form and stores its download URL in
    /// the pending fields.
    pub async fn upload_image(
        &self,
        ctx: &mut SessionContext,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, ActionError> {
        let session = ctx.require_admin()?;
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(ActionError::FileTooLarge {
                size_bytes: bytes.len(),
                max_bytes: MAX_IMAGE_BYTES,
            });
        }
        if bytes.is_empty() {
            return Err(ActionError::Validation("file is empty".into()));
        }

        let path = format!(
            "articles/{}-{}",
            uuid::Uuid::new_v4().simple(),
            sanitize_file_name(file_name)
        );
        let handle = self
            .blobs
            .store(&session, &path, content_type, bytes)
            .await?;
        let url = self.blobs.resolve(&handle).await?;

        ctx.article_form.fields.image_url = url.clone();
        ctx.success("Image uploaded");
        Ok(url)
    }

    /// Adds a comment and then re-reads the whole comment list.
    pub async fn add_comment(
        &self,
        ctx: &mut SessionContext,
        article_id: ArticleId,
        text: &str,
    ) -> Result<CommentId, ActionError> {
        let session = ctx.require_session()?;
        let text = text.trim();
        if text.is_empty() {
            return Err(ActionError::Validation("comment cannot be empty".into()));
        }

        let user_name = ctx.display_name().unwrap_or_default().to_string();
        let comment_id = self
            .documents
            .create_comment(
                &session,
                article_id,
                &NewComment {
                    user_name,
                    text: text.to_string(),
                },
            )
            .await?;

        let comments = self.documents.list_comments(article_id).await?;
        let count = comments.len() as i64;
        ctx.comments = comments;
        ctx.update_local_article(article_id, |local| local.comment_count = count);
        ctx.comment_draft.clear();
        ctx.success("Comment added");
        Ok(comment_id)
    }

    /// Removes a comment when the user wrote it or is an admin. The local
    /// list is updated without a re-fetch.
    pub async fn delete_comment(
        &self,
        ctx: &mut SessionContext,
        article_id: ArticleId,
        comment_id: CommentId,
    ) -> Result<(), ActionError> {
        let session = ctx.require_session()?;
        let comment = ctx
            .comments
            .iter()
            .find(|comment| comment.id == comment_id && comment.article_id == article_id)
            .ok_or(ActionError::NotFound("comment"))?;
        if comment.user_id != session.user_id && !ctx.is_admin() {
            return Err(ActionError::Forbidden(
                "you can only delete your own comments".into(),
            ));
        }

        self.documents
            .delete_comment(&session, article_id, comment_id)
            .await?;
        ctx.comments.retain(|comment| comment.id != comment_id);
        ctx.update_local_article(article_id, |local| {
            local.comment_count = (local.comment_count - 1).max(0)
        });
        ctx.success("Comment deleted");
        Ok(())
    }

    /// Flips the theme and persists it. A failed write keeps the new theme
    /// for this session only.
    pub fn toggle_theme(&self, ctx: &mut SessionContext) -> Theme {
        ctx.theme = ctx.theme.toggled();
        if let Err(error) = self.theme_store.save(ctx.theme) {
            warn!(%error, "theme preference not saved");
        }
        ctx.theme
    }

    /// Local copy if present, otherwise fetched.
    async fn article(
        &self,
        ctx: &SessionContext,
        article_id: ArticleId,
    ) -> Result<Article, ActionError> {
        if let Some(article) = ctx.local_article(article_id) {
            return Ok(article.clone());
        }
        self.documents
            .get_article(article_id)
            .await?
            .ok_or(ActionError::NotFound("article"))
    }
}

/// Keeps a file name safe to use as the last segment of a blob path.
pub fn sanitize_file_name(file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FILE_NAME_CHARS)
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "image".to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
#[path = "tests/orchestrator_tests.rs"]
mod tests;
