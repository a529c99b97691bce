use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{header, Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use shared::{
    domain::{Article, ArticleId, Comment, CommentId, UserId, UserProfile},
    error::ApiError,
    protocol::{
        ArticlePatch, ArticleQuery, BlobHandle, BlobStored, BlobUrl, CreatedResponse, Credentials,
        DisplayNameRequest, NewArticle, NewComment, NewProfile, Session, API_KEY_HEADER,
        APP_ID_HEADER, PROJECT_HEADER,
    },
};
use tokio::sync::broadcast;
use tracing::{debug, info};
use url::Url;

use crate::{
    collaborators::{BlobCollaborator, DocumentCollaborator, IdentityCollaborator, SessionChange},
    config::{ClientConfig, ConfigError},
};

/// Talks to the press backend over HTTP and implements all three
/// collaborator traits against it.
pub struct HttpBackend {
    http: Client,
    base_url: Url,
    api_key: Option<String>,
    project_id: Option<String>,
    app_id: Option<String>,
    bucket: String,
    session_changes: broadcast::Sender<SessionChange>,
}

impl HttpBackend {
    pub fn new(config: &ClientConfig) -> Result<Self, ConfigError> {
        let (session_changes, _) = broadcast::channel(64);
        Ok(Self {
            http: Client::new(),
            base_url: config.base_url()?,
            api_key: config.api_key.clone(),
            project_id: config.project_id.clone(),
            app_id: config.app_id.clone(),
            bucket: config.bucket().to_string(),
            session_changes,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str, session: Option<&Session>) -> Result<RequestBuilder> {
        let url = self
            .base_url
            .join(path)
            .with_context(|| format!("invalid endpoint path {path}"))?;
        debug!(%method, %url, "collaborator request");

        let mut req = self.http.request(method, url);
        for (name, value) in [
            (API_KEY_HEADER, &self.api_key),
            (PROJECT_HEADER, &self.project_id),
            (APP_ID_HEADER, &self.app_id),
        ] {
            if let Some(value) = value {
                req = req.header(name, value);
            }
        }
        if let Some(session) = session {
            req = req.bearer_auth(&session.token);
        }
        Ok(req)
    }

    fn publish(&self, change: SessionChange) {
        // No subscribers is fine.
        let _ = self.session_changes.send(change);
    }
}

/// Turns a non-success response into an error whose text is the backend's
/// own message.
async fn failure(res: Response) -> anyhow::Error {
    let status = res.status();
    match res.json::<ApiError>().await {
        Ok(body) => anyhow!(body.message),
        Err(_) => anyhow!("request failed with status {status}"),
    }
}

async fn read_json<T: DeserializeOwned>(res: Response) -> Result<T> {
    if !res.status().is_success() {
        return Err(failure(res).await);
    }
    res.json::<T>().await.context("malformed response body")
}

async fn read_optional<T: DeserializeOwned>(res: Response) -> Result<Option<T>> {
    if res.status() == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    read_json(res).await.map(Some)
}

async fn expect_success(res: Response) -> Result<()> {
    if res.status().is_success() {
        Ok(())
    } else {
        Err(failure(res).await)
    }
}

#[async_trait]
impl IdentityCollaborator for HttpBackend {
    async fn create_account(&self, email: &str, password: &str) -> Result<Session> {
        let res = self
            .request(Method::POST, "auth/signup", None)?
            .json(&Credentials {
                email: email.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?;
        let session: Session = read_json(res).await?;
        info!(user_id = session.user_id.0, "account created");
        self.publish(SessionChange::SignedIn {
            user_id: session.user_id,
            email: session.email.clone(),
        });
        Ok(session)
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<Session> {
        let res = self
            .request(Method::POST, "auth/login", None)?
            .json(&Credentials {
                email: email.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?;
        let session: Session = read_json(res).await?;
        self.publish(SessionChange::SignedIn {
            user_id: session.user_id,
            email: session.email.clone(),
        });
        Ok(session)
    }

    async fn sign_out(&self, session: &Session) -> Result<()> {
        let res = self
            .request(Method::POST, "auth/logout", Some(session))?
            .send()
            .await?;
        expect_success(res).await?;
        self.publish(SessionChange::SignedOut {
            user_id: session.user_id,
        });
        Ok(())
    }

    async fn update_display_name(&self, session: &Session, display_name: &str) -> Result<()> {
        let res = self
            .request(Method::POST, "auth/display_name", Some(session))?
            .json(&DisplayNameRequest {
                display_name: display_name.to_string(),
            })
            .send()
            .await?;
        expect_success(res).await
    }

    fn subscribe_session_changes(&self) -> broadcast::Receiver<SessionChange> {
        self.session_changes.subscribe()
    }
}

#[async_trait]
impl DocumentCollaborator for HttpBackend {
    async fn list_articles(&self, query: &ArticleQuery) -> Result<Vec<Article>> {
        let res = self
            .request(Method::GET, "articles", None)?
            .query(query)
            .send()
            .await?;
        read_json(res).await
    }

    async fn get_article(&self, article_id: ArticleId) -> Result<Option<Article>> {
        let res = self
            .request(Method::GET, &format!("articles/{article_id}"), None)?
            .send()
            .await?;
        read_optional(res).await
    }

    async fn create_article(&self, session: &Session, article: &NewArticle) -> Result<ArticleId> {
        let res = self
            .request(Method::POST, "articles", Some(session))?
            .json(article)
            .send()
            .await?;
        let created: CreatedResponse = read_json(res).await?;
        Ok(ArticleId(created.id))
    }

    async fn update_article(
        &self,
        session: &Session,
        article_id: ArticleId,
        patch: &ArticlePatch,
    ) -> Result<()> {
        let res = self
            .request(Method::PATCH, &format!("articles/{article_id}"), Some(session))?
            .json(patch)
            .send()
            .await?;
        expect_success(res).await
    }

    async fn delete_article(&self, session: &Session, article_id: ArticleId) -> Result<()> {
        let res = self
            .request(Method::DELETE, &format!("articles/{article_id}"), Some(session))?
            .send()
            .await?;
        expect_success(res).await
    }

    async fn list_comments(&self, article_id: ArticleId) -> Result<Vec<Comment>> {
        let res = self
            .request(Method::GET, &format!("articles/{article_id}/comments"), None)?
            .send()
            .await?;
        read_json(res).await
    }

    async fn create_comment(
        &self,
        session: &Session,
        article_id: ArticleId,
        comment: &NewComment,
    ) -> Result<CommentId> {
        let res = self
            .request(
                Method::POST,
                &format!("articles/{article_id}/comments"),
                Some(session),
            )?
            .json(comment)
            .send()
            .await?;
        let created: CreatedResponse = read_json(res).await?;
        Ok(CommentId(created.id))
    }

    async fn delete_comment(
        &self,
        session: &Session,
        article_id: ArticleId,
        comment_id: CommentId,
    ) -> Result<()> {
        let res = self
            .request(
                Method::DELETE,
                &format!("articles/{article_id}/comments/{comment_id}"),
                Some(session),
            )?
            .send()
            .await?;
        expect_success(res).await
    }

    async fn get_profile(&self, session: &Session, user_id: UserId) -> Result<Option<UserProfile>> {
        let res = self
            .request(Method::GET, &format!("profiles/{user_id}"), Some(session))?
            .send()
            .await?;
        read_optional(res).await
    }

    async fn create_profile(&self, session: &Session, profile: &NewProfile) -> Result<UserProfile> {
        let res = self
            .request(Method::POST, "profiles", Some(session))?
            .json(profile)
            .send()
            .await?;
        read_json(res).await
    }
}

#[async_trait]
impl BlobCollaborator for HttpBackend {
    async fn store(
        &self,
        session: &Session,
        path: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<BlobHandle> {
        let res = self
            .request(
                Method::PUT,
                &format!("blobs/{}/{path}", self.bucket),
                Some(session),
            )?
            .header(header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;
        let stored: BlobStored = read_json(res).await?;
        info!(
            path = %stored.handle.path,
            size_bytes = stored.size_bytes,
            "blob uploaded"
        );
        Ok(stored.handle)
    }

    async fn resolve(&self, handle: &BlobHandle) -> Result<String> {
        let res = self
            .request(
                Method::GET,
                &format!("blob-url/{}/{}", handle.bucket, handle.path),
                None,
            )?
            .send()
            .await?;
        let resolved: BlobUrl = read_json(res).await?;
        Ok(resolved.url)
    }
}

#[cfg(test)]
#[path = "tests/http_tests.rs"]
mod tests;
