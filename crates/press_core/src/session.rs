use shared::{
    domain::{Article, ArticleId, Comment, UserId, UserProfile},
    protocol::{ArticleFields, Session},
};
use tracing::warn;

use crate::{error::ActionError, router::Route, theme::Theme};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
}

/// Transient message shown to the user after an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

/// Pending state of the admin article form. `editing` is set when the form
/// was filled from an existing article.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArticleForm {
    pub editing: Option<ArticleId>,
    pub fields: ArticleFields,
}

/// Everything one user's session of the site holds locally. Owned by the
/// caller and handed to each handler.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    pub route: Option<Route>,
    pub session: Option<Session>,
    pub profile: Option<UserProfile>,
    pub articles: Vec<Article>,
    pub current_article: Option<Article>,
    pub comments: Vec<Comment>,
    pub article_form: ArticleForm,
    pub comment_draft: String,
    pub theme: Theme,
    notices: Vec<Notice>,
}

impl SessionContext {
    pub fn new(theme: Theme) -> Self {
        Self {
            route: Some(Route::Home),
            theme,
            ..Self::default()
        }
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.session.as_ref().map(|session| session.user_id)
    }

    pub fn is_signed_in(&self) -> bool {
        self.session.is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.profile.as_ref().is_some_and(UserProfile::is_admin)
    }

    /// Name shown on comments and articles written by this user.
    pub fn display_name(&self) -> Option<&str> {
        self.profile
            .as_ref()
            .map(|profile| profile.display_name.as_str())
            .or_else(|| self.session.as_ref().map(|session| session.email.as_str()))
    }

    pub(crate) fn require_session(&self) -> Result<Session, ActionError> {
        self.session.clone().ok_or(ActionError::NotSignedIn)
    }

    pub(crate) fn require_admin(&self) -> Result<Session, ActionError> {
        let session = self.require_session()?;
        if self.is_admin() {
            Ok(session)
        } else {
            Err(ActionError::Forbidden("admin access required".into()))
        }
    }

    /// Local copy of an article, preferring the open one over the list.
    pub fn local_article(&self, article_id: ArticleId) -> Option<&Article> {
        self.current_article
            .as_ref()
            .filter(|article| article.id == article_id)
            .or_else(|| self.articles.iter().find(|article| article.id == article_id))
    }

    /// Applies `edit` to every local copy of the article.
    pub(crate) fn update_local_article(&mut self, article_id: ArticleId, edit: impl Fn(&mut Article)) {
        if let Some(article) = self
            .current_article
            .as_mut()
            .filter(|article| article.id == article_id)
        {
            edit(article);
        }
        if let Some(article) = self.articles.iter_mut().find(|article| article.id == article_id) {
            edit(article);
        }
    }

    /// Makes `fresh` the current article and replaces its list entry, if any.
    pub(crate) fn install_article(&mut self, fresh: Article) {
        if let Some(listed) = self.articles.iter_mut().find(|listed| listed.id == fresh.id) {
            *listed = fresh.clone();
        }
        self.current_article = Some(fresh);
    }

    /// Drops user-local state on sign-out.
    pub(crate) fn clear_user(&mut self) {
        self.session = None;
        self.profile = None;
        self.article_form = ArticleForm::default();
        self.comment_draft.clear();
    }

    pub fn success(&mut self, message: impl Into<String>) {
        self.notices.push(Notice {
            kind: NoticeKind::Success,
            message: message.into(),
        });
    }

    pub fn failure(&mut self, message: impl Into<String>) {
        self.notices.push(Notice {
            kind: NoticeKind::Error,
            message: message.into(),
        });
    }

    /// Converts an action outcome into a notice; errors are shown with
    /// their raw message and otherwise dropped.
    pub fn record<T>(&mut self, outcome: Result<T, ActionError>) -> Option<T> {
        match outcome {
            Ok(value) => Some(value),
            Err(ActionError::Cancelled) => None,
            Err(err) => {
                warn!(error = %err, "action failed");
                self.failure(err.to_string());
                None
            }
        }
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
