//! In-memory collaborators standing in for the press backend in tests.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use shared::{
    domain::{Article, ArticleId, Comment, CommentId, UserId, UserProfile},
    protocol::{
        ArrayOp, ArticlePatch, ArticleQuery, BlobHandle, NewArticle, NewComment, NewProfile,
        Session,
    },
};
use tokio::sync::broadcast;

use crate::{
    collaborators::{BlobCollaborator, DocumentCollaborator, IdentityCollaborator, SessionChange},
    orchestrator::Orchestrator,
};

pub(crate) const ADMIN_EMAIL: &str = "editor@vspress.org";

#[derive(Default)]
struct FakeState {
    next_id: i64,
    accounts: HashMap<String, (UserId, String, String)>,
    tokens: HashMap<String, UserId>,
    profiles: HashMap<UserId, UserProfile>,
    articles: BTreeMap<ArticleId, Article>,
    comments: Vec<Comment>,
    blobs: HashMap<String, Vec<u8>>,
}

impl FakeState {
    fn next(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn stamp(&self) -> DateTime<Utc> {
        let epoch = Utc
            .timestamp_opt(1_700_000_000, 0)
            .single()
            .expect("valid epoch");
        epoch + Duration::seconds(self.next_id)
    }

    fn caller(&self, session: &Session) -> Result<UserId> {
        self.tokens
            .get(&session.token)
            .copied()
            .ok_or_else(|| anyhow!("session is invalid or expired"))
    }

    fn is_admin(&self, user_id: UserId) -> bool {
        self.profiles
            .get(&user_id)
            .is_some_and(UserProfile::is_admin)
    }
}

pub(crate) struct FakeBackend {
    state: Mutex<FakeState>,
    calls: AtomicUsize,
    session_changes: broadcast::Sender<SessionChange>,
}

impl FakeBackend {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FakeState::default()),
            calls: AtomicUsize::new(0),
            session_changes: broadcast::channel(16).0,
        })
    }

    /// Number of collaborator calls made so far.
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn orchestrator(self: &Arc<Self>) -> Orchestrator {
        Orchestrator::new(self.clone(), self.clone(), self.clone(), ADMIN_EMAIL)
    }

    /// Server-side copy of an article, bypassing the call counter.
    pub(crate) fn stored_article(&self, article_id: ArticleId) -> Option<Article> {
        self.lock().articles.get(&article_id).cloned()
    }

    pub(crate) fn stored_blob_paths(&self) -> Vec<String> {
        self.lock().blobs.keys().cloned().collect()
    }

    /// Seeds an article directly, as if another admin had published it.
    pub(crate) fn seed_article(&self, title: &str) -> ArticleId {
        let mut state = self.lock();
        let id = ArticleId(state.next());
        let created_at = state.stamp();
        state.articles.insert(
            id,
            Article {
                id,
                title: title.to_string(),
                excerpt: String::new(),
                content: "...".into(),
                image_url: "http://press.test/blobs/press/seed.png".into(),
                author_name: "Seed".into(),
                author_id: UserId(0),
                created_at,
                category: Default::default(),
                likes: 0,
                liked_by: BTreeSet::new(),
                comment_count: 0,
                featured: false,
            },
        );
        id
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake state poisoned")
    }

    fn call(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.lock()
    }
}

#[async_trait]
impl IdentityCollaborator for FakeBackend {
    async fn create_account(&self, email: &str, password: &str) -> Result<Session> {
        let mut state = self.call();
        let key = email.to_ascii_lowercase();
        if state.accounts.contains_key(&key) {
            return Err(anyhow!("email already in use"));
        }
        if password.chars().count() < 6 {
            return Err(anyhow!("password should be at least 6 characters"));
        }
        let user_id = UserId(state.next());
        state
            .accounts
            .insert(key, (user_id, password.to_string(), email.to_string()));
        let token = format!("token-{}", user_id.0);
        state.tokens.insert(token.clone(), user_id);
        Ok(Session {
            token,
            user_id,
            email: email.to_string(),
            expires_at: state.stamp() + Duration::hours(1),
        })
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<Session> {
        let mut state = self.call();
        let (user_id, stored_password, stored_email) = state
            .accounts
            .get(&email.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| anyhow!("invalid email or password"))?;
        if stored_password != password {
            return Err(anyhow!("invalid email or password"));
        }
        let token = format!("token-{}-{}", user_id.0, state.next());
        state.tokens.insert(token.clone(), user_id);
        let _ = self.session_changes.send(SessionChange::SignedIn {
            user_id,
            email: stored_email.clone(),
        });
        Ok(Session {
            token,
            user_id,
            email: stored_email,
            expires_at: state.stamp() + Duration::hours(1),
        })
    }

    async fn sign_out(&self, session: &Session) -> Result<()> {
        let mut state = self.call();
        state.tokens.remove(&session.token);
        let _ = self.session_changes.send(SessionChange::SignedOut {
            user_id: session.user_id,
        });
        Ok(())
    }

    async fn update_display_name(&self, session: &Session, _display_name: &str) -> Result<()> {
        let state = self.call();
        state.caller(session).map(|_| ())
    }

    fn subscribe_session_changes(&self) -> broadcast::Receiver<SessionChange> {
        self.session_changes.subscribe()
    }
}

#[async_trait]
impl DocumentCollaborator for FakeBackend {
    async fn list_articles(&self, query: &ArticleQuery) -> Result<Vec<Article>> {
        let state = self.call();
        let mut articles: Vec<Article> = state
            .articles
            .values()
            .filter(|a| query.category.map_or(true, |c| a.category == c))
            .filter(|a| query.featured.map_or(true, |f| a.featured == f))
            .cloned()
            .collect();
        articles.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        if let Some(limit) = query.limit {
            articles.truncate(limit as usize);
        }
        Ok(articles)
    }

    async fn get_article(&self, article_id: ArticleId) -> Result<Option<Article>> {
        Ok(self.call().articles.get(&article_id).cloned())
    }

    async fn create_article(&self, session: &Session, article: &NewArticle) -> Result<ArticleId> {
        let mut state = self.call();
        let author_id = state.caller(session)?;
        if !state.is_admin(author_id) {
            return Err(anyhow!("admin role required"));
        }
        let id = ArticleId(state.next());
        let created_at = state.stamp();
        let fields = article.fields.clone();
        state.articles.insert(
            id,
            Article {
                id,
                title: fields.title,
                excerpt: fields.excerpt,
                content: fields.content,
                image_url: fields.image_url,
                author_name: article.author_name.clone(),
                author_id,
                created_at,
                category: fields.category,
                likes: 0,
                liked_by: BTreeSet::new(),
                comment_count: 0,
                featured: fields.featured,
            },
        );
        Ok(id)
    }

    async fn update_article(
        &self,
        session: &Session,
        article_id: ArticleId,
        patch: &ArticlePatch,
    ) -> Result<()> {
        let mut state = self.call();
        let caller = state.caller(session)?;
        if patch.fields.is_some() && !state.is_admin(caller) {
            return Err(anyhow!("admin role required"));
        }
        let article = state
            .articles
            .get_mut(&article_id)
            .ok_or_else(|| anyhow!("article not found"))?;
        if let Some(fields) = &patch.fields {
            article.title = fields.title.clone();
            article.excerpt = fields.excerpt.clone();
            article.content = fields.content.clone();
            article.image_url = fields.image_url.clone();
            article.category = fields.category;
            article.featured = fields.featured;
        }
        if let Some(like) = patch.like {
            let changed = match like.op {
                ArrayOp::Union => article.liked_by.insert(like.user_id),
                ArrayOp::Remove => article.liked_by.remove(&like.user_id),
            };
            if changed {
                article.likes = (article.likes + like.increment).max(0);
            }
        }
        Ok(())
    }

    async fn delete_article(&self, session: &Session, article_id: ArticleId) -> Result<()> {
        let mut state = self.call();
        let caller = state.caller(session)?;
        if !state.is_admin(caller) {
            return Err(anyhow!("admin role required"));
        }
        state
            .articles
            .remove(&article_id)
            .ok_or_else(|| anyhow!("article not found"))?;
        state.comments.retain(|c| c.article_id != article_id);
        Ok(())
    }

    async fn list_comments(&self, article_id: ArticleId) -> Result<Vec<Comment>> {
        let state = self.call();
        let mut comments: Vec<Comment> = state
            .comments
            .iter()
            .filter(|c| c.article_id == article_id)
            .cloned()
            .collect();
        comments.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(comments)
    }

    async fn create_comment(
        &self,
        session: &Session,
        article_id: ArticleId,
        comment: &NewComment,
    ) -> Result<CommentId> {
        let mut state = self.call();
        let user_id = state.caller(session)?;
        let id = CommentId(state.next());
        let created_at = state.stamp();
        let article = state
            .articles
            .get_mut(&article_id)
            .ok_or_else(|| anyhow!("article not found"))?;
        article.comment_count += 1;
        state.comments.push(Comment {
            id,
            article_id,
            user_id,
            user_name: comment.user_name.clone(),
            text: comment.text.clone(),
            created_at,
        });
        Ok(id)
    }

    async fn delete_comment(
        &self,
        session: &Session,
        article_id: ArticleId,
        comment_id: CommentId,
    ) -> Result<()> {
        let mut state = self.call();
        let caller = state.caller(session)?;
        let author = state
            .comments
            .iter()
            .find(|c| c.id == comment_id && c.article_id == article_id)
            .map(|c| c.user_id)
            .ok_or_else(|| anyhow!("comment not found"))?;
        if author != caller && !state.is_admin(caller) {
            return Err(anyhow!("only the author or an admin can delete this comment"));
        }
        state.comments.retain(|c| c.id != comment_id);
        if let Some(article) = state.articles.get_mut(&article_id) {
            article.comment_count -= 1;
        }
        Ok(())
    }

    async fn get_profile(&self, session: &Session, user_id: UserId) -> Result<Option<UserProfile>> {
        let state = self.call();
        state.caller(session)?;
        Ok(state.profiles.get(&user_id).cloned())
    }

    async fn create_profile(&self, session: &Session, profile: &NewProfile) -> Result<UserProfile> {
        let mut state = self.call();
        let caller = state.caller(session)?;
        if caller != profile.user_id {
            return Err(anyhow!("cannot write another user's profile"));
        }
        let created = UserProfile {
            user_id: profile.user_id,
            email: profile.email.clone(),
            display_name: profile.display_name.clone(),
            role: profile.role,
            created_at: state.stamp(),
        };
        state.profiles.insert(profile.user_id, created.clone());
        Ok(created)
    }
}

#[async_trait]
impl BlobCollaborator for FakeBackend {
    async fn store(
        &self,
        session: &Session,
        path: &str,
        _content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<BlobHandle> {
        let mut state = self.call();
        state.caller(session)?;
        state.blobs.insert(path.to_string(), bytes);
        Ok(BlobHandle {
            bucket: "press".into(),
            path: path.to_string(),
        })
    }

    async fn resolve(&self, handle: &BlobHandle) -> Result<String> {
        let state = self.call();
        if !state.blobs.contains_key(&handle.path) {
            return Err(anyhow!("file not found"));
        }
        Ok(format!(
            "http://press.test/blobs/{}/{}",
            handle.bucket, handle.path
        ))
    }
}
