use std::fmt;

use shared::domain::{Article, Category, Comment, UserId};

use crate::{
    router::Route,
    session::{ArticleForm, SessionContext},
    theme::Theme,
};

const HOME_LATEST: usize = 6;

/// Snapshot of what one route shows, built from the session context.
#[derive(Debug, Clone, PartialEq)]
pub enum View {
    Home {
        featured: Vec<Article>,
        latest: Vec<Article>,
    },
    Articles {
        category: Option<Category>,
        articles: Vec<Article>,
    },
    Article {
        article: Option<Article>,
        comments: Vec<CommentRow>,
        viewer: Option<UserId>,
    },
    Admin {
        form: ArticleForm,
        articles: Vec<Article>,
    },
    AccessDenied,
    Login,
    Signup,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommentRow {
    pub comment: Comment,
    pub can_delete: bool,
}

/// Builds the view for the current route, or nothing when the route was
/// not recognised.
pub fn render(ctx: &SessionContext) -> Option<View> {
    let view = match ctx.route? {
        Route::Home => View::Home {
            featured: ctx.articles.iter().filter(|a| a.featured).cloned().collect(),
            latest: ctx.articles.iter().take(HOME_LATEST).cloned().collect(),
        },
        Route::Articles { category } => View::Articles {
            category,
            articles: ctx
                .articles
                .iter()
                .filter(|a| category.map_or(true, |c| a.category == c))
                .cloned()
                .collect(),
        },
        Route::Article { id } => {
            let viewer = ctx.user_id();
            let is_admin = ctx.is_admin();
            View::Article {
                article: ctx.current_article.clone().filter(|a| a.id == id),
                comments: ctx
                    .comments
                    .iter()
                    .filter(|c| c.article_id == id)
                    .map(|comment| CommentRow {
                        can_delete: is_admin || viewer == Some(comment.user_id),
                        comment: comment.clone(),
                    })
                    .collect(),
                viewer,
            }
        }
        Route::Admin if ctx.is_admin() => View::Admin {
            form: ctx.article_form.clone(),
            articles: ctx.articles.clone(),
        },
        Route::Admin => View::AccessDenied,
        Route::Login => View::Login,
        Route::Signup => View::Signup,
    };
    Some(view)
}

/// Terminal rendering, framed for the active theme.
pub struct Themed<'a> {
    pub view: &'a View,
    pub theme: Theme,
}

impl fmt::Display for Themed<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = match self.theme {
            Theme::Light => "-",
            Theme::Dark => "=",
        };
        writeln!(f, "{}", rule.repeat(60))?;
        write!(f, "{}", self.view)?;
        write!(f, "{}", rule.repeat(60))
    }
}

fn article_line(f: &mut fmt::Formatter<'_>, article: &Article) -> fmt::Result {
    writeln!(
        f,
        "  [{}] {}{} ({}, {} likes, {} comments)",
        article.id,
        article.title,
        if article.featured { " *" } else { "" },
        article.category.label(),
        article.likes,
        article.comment_count
    )
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            View::Home { featured, latest } => {
                writeln!(f, "VS Press")?;
                if !featured.is_empty() {
                    writeln!(f, "Featured")?;
                    for article in featured {
                        article_line(f, article)?;
                    }
                }
                writeln!(f, "Latest")?;
                if latest.is_empty() {
                    writeln!(f, "  No articles yet.")?;
                }
                for article in latest {
                    article_line(f, article)?;
                }
                Ok(())
            }
            View::Articles { category, articles } => {
                match category {
                    Some(category) => writeln!(f, "Articles: {}", category.label())?,
                    None => writeln!(f, "All articles")?,
                }
                if articles.is_empty() {
                    writeln!(f, "  Nothing here.")?;
                }
                for article in articles {
                    article_line(f, article)?;
                }
                Ok(())
            }
            View::Article {
                article,
                comments,
                viewer,
            } => {
                let Some(article) = article else {
                    return writeln!(f, "Loading article...");
                };
                writeln!(f, "{}", article.title)?;
                writeln!(
                    f,
                    "{} | {} | {}",
                    article.author_name,
                    article.created_at.format("%Y-%m-%d"),
                    article.category.label()
                )?;
                writeln!(f, "image: {}", article.image_url)?;
                writeln!(f)?;
                writeln!(f, "{}", article.content)?;
                writeln!(f)?;
                let liked = viewer.is_some_and(|user| article.is_liked_by(user));
                writeln!(
                    f,
                    "{} {} likes",
                    if liked { "(liked)" } else { "(like)" },
                    article.likes
                )?;
                writeln!(f, "Comments ({})", comments.len())?;
                for row in comments {
                    writeln!(
                        f,
                        "  #{} {} ({}): {}{}",
                        row.comment.id,
                        row.comment.user_name,
                        row.comment.created_at.format("%Y-%m-%d %H:%M"),
                        row.comment.text,
                        if row.can_delete { " [delete]" } else { "" }
                    )?;
                }
                if viewer.is_none() {
                    writeln!(f, "Sign in to comment.")?;
                }
                Ok(())
            }
            View::Admin { form, articles } => {
                writeln!(f, "Admin")?;
                match form.editing {
                    Some(id) => writeln!(f, "Editing article {id}")?,
                    None => writeln!(f, "New article")?,
                }
                writeln!(f, "  title:    {}", form.fields.title)?;
                writeln!(f, "  excerpt:  {}", form.fields.excerpt)?;
                writeln!(f, "  category: {}", form.fields.category.label())?;
                writeln!(f, "  featured: {}", form.fields.featured)?;
                writeln!(f, "  image:    {}", form.fields.image_url)?;
                writeln!(f, "  content:  {} chars", form.fields.content.chars().count())?;
                writeln!(f, "Articles")?;
                for article in articles {
                    article_line(f, article)?;
                }
                Ok(())
            }
            View::AccessDenied => writeln!(f, "Access denied. Admins only."),
            View::Login => writeln!(f, "Sign in with your email and password."),
            View::Signup => writeln!(f, "Create an account: email, password and display name."),
        }
    }
}

#[cfg(test)]
#[path = "tests/views_tests.rs"]
mod tests;
