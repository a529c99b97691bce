use std::fmt;

use shared::domain::{ArticleId, Category};
use url::Url;

const ROUTE_BASE: &str = "press://site/";

/// One of the six views a route token can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Home,
    Articles { category: Option<Category> },
    Article { id: ArticleId },
    Admin,
    Login,
    Signup,
}

impl Route {
    /// Maps a token such as `/article?id=3` to its route. Unrecognised paths,
    /// and an article route without a numeric `id`, select nothing.
    pub fn parse(token: &str) -> Option<Route> {
        let token = token.trim();
        if token.is_empty() {
            return Some(Route::Home);
        }
        let url = Url::parse(ROUTE_BASE).ok()?.join(token).ok()?;
        if url.scheme() != "press" || url.host_str() != Some("site") {
            return None;
        }
        let param = |name: &str| {
            url.query_pairs()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.into_owned())
        };

        if let Some(id) = url.path().strip_prefix("/article/") {
            return id.parse().ok().map(|id| Route::Article { id: ArticleId(id) });
        }
        match url.path() {
            "/" => Some(Route::Home),
            "/articles" => Some(Route::Articles {
                category: param("category").and_then(|c| c.parse().ok()),
            }),
            "/article" => param("id")
                .and_then(|id| id.parse().ok())
                .map(|id| Route::Article { id: ArticleId(id) }),
            "/admin" => Some(Route::Admin),
            "/login" => Some(Route::Login),
            "/signup" => Some(Route::Signup),
            _ => None,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Home => f.write_str("/"),
            Route::Articles { category: None } => f.write_str("/articles"),
            Route::Articles {
                category: Some(category),
            } => write!(f, "/articles?category={}", category.as_str()),
            Route::Article { id } => write!(f, "/article?id={id}"),
            Route::Admin => f.write_str("/admin"),
            Route::Login => f.write_str("/login"),
            Route::Signup => f.write_str("/signup"),
        }
    }
}

#[cfg(test)]
#[path = "tests/router_tests.rs"]
mod tests;
