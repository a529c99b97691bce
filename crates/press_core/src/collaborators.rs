use anyhow::Result;
use async_trait::async_trait;
use shared::{
    domain::{Article, ArticleId, Comment, CommentId, UserId, UserProfile},
    protocol::{ArticlePatch, ArticleQuery, BlobHandle, NewArticle, NewComment, NewProfile, Session},
};
use tokio::sync::broadcast;

/// Sign-in state transitions published by the identity collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionChange {
    SignedIn { user_id: UserId, email: String },
    SignedOut { user_id: UserId },
}

#[async_trait]
pub trait IdentityCollaborator: Send + Sync {
    async fn create_account(&self, email: &str, password: &str) -> Result<Session>;
    async fn authenticate(&self, email: &str, password: &str) -> Result<Session>;
    async fn sign_out(&self, session: &Session) -> Result<()>;
    async fn update_display_name(&self, session: &Session, display_name: &str) -> Result<()>;
    fn subscribe_session_changes(&self) -> broadcast::Receiver<SessionChange>;
}

#[async_trait]
pub trait DocumentCollaborator: Send + Sync {
    async fn list_articles(&self, query: &ArticleQuery) -> Result<Vec<Article>>;
    async fn get_article(&self, article_id: ArticleId) -> Result<Option<Article>>;
    async fn create_article(&self, session: &Session, article: &NewArticle) -> Result<ArticleId>;
    async fn update_article(
        &self,
        session: &Session,
        article_id: ArticleId,
        patch: &ArticlePatch,
    ) -> Result<()>;
    async fn delete_article(&self, session: &Session, article_id: ArticleId) -> Result<()>;
    async fn list_comments(&self, article_id: ArticleId) -> Result<Vec<Comment>>;
    async fn create_comment(
        &self,
        session: &Session,
        article_id: ArticleId,
        comment: &NewComment,
    ) -> Result<CommentId>;
    async fn delete_comment(
        &self,
        session: &Session,
        article_id: ArticleId,
        comment_id: CommentId,
    ) -> Result<()>;
    async fn get_profile(&self, session: &Session, user_id: UserId) -> Result<Option<UserProfile>>;
    async fn create_profile(&self, session: &Session, profile: &NewProfile) -> Result<UserProfile>;
}

#[async_trait]
pub trait BlobCollaborator: Send + Sync {
    async fn store(
        &self,
        session: &Session,
        path: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<BlobHandle>;
    /// Durable download address for a stored blob.
    async fn resolve(&self, handle: &BlobHandle) -> Result<String>;
}
