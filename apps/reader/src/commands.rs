//! Line commands typed at the reader prompt.

use std::path::PathBuf;

use press_core::SessionContext;
use shared::domain::{ArticleId, Category, CommentId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormField {
    Title(String),
    Excerpt(String),
    Content(String),
    Image(String),
    Category(Category),
    Featured(bool),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Open(String),
    SignUp {
        email: String,
        password: String,
        display_name: String,
    },
    LogIn {
        email: String,
        password: String,
    },
    LogOut,
    Like(ArticleId),
    Comment {
        article_id: ArticleId,
        text: String,
    },
    DeleteComment {
        article_id: ArticleId,
        comment_id: CommentId,
    },
    NewArticle,
    Set(FormField),
    Upload(PathBuf),
    Edit(ArticleId),
    Save,
    Delete(ArticleId),
    Theme,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  open <route>                     /, /articles[?category=..], /article?id=N, /admin, /login, /signup
  signup <email> <password> <name>
  login <email> <password>
  logout
  like <article>                   like or unlike
  comment <article> <text>
  uncomment <article> <comment>
  new                              clear the article form
  set <field> <value>              title, excerpt, content, image, category, featured
  upload <file>                    attach an image to the article form
  edit <article> | save | delete <article>
  theme | help | quit";

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Open(_) => "open",
            Command::SignUp { .. } => "signup",
            Command::LogIn { .. } => "login",
            Command::LogOut => "logout",
            Command::Like(_) => "like",
            Command::Comment { .. } => "comment",
            Command::DeleteComment { .. } => "uncomment",
            Command::NewArticle => "new",
            Command::Set(_) => "set",
            Command::Upload(_) => "upload",
            Command::Edit(_) => "edit",
            Command::Save => "save",
            Command::Delete(_) => "delete",
            Command::Theme => "theme",
            Command::Help => "help",
            Command::Quit => "quit",
        }
    }

    pub fn parse(line: &str) -> Result<Command, String> {
        let line = line.trim();
        let (verb, rest) = line
            .split_once(char::is_whitespace)
            .map(|(verb, rest)| (verb, rest.trim()))
            .unwrap_or((line, ""));

        let command = match verb {
            "open" | "go" => Command::Open(required(rest, "route")?.to_string()),
            "signup" => {
                let mut parts = rest.splitn(3, char::is_whitespace);
                Command::SignUp {
                    email: required(parts.next().unwrap_or_default(), "email")?.to_string(),
                    password: required(parts.next().unwrap_or_default(), "password")?.to_string(),
                    display_name: required(parts.next().unwrap_or_default().trim(), "name")?
                        .to_string(),
                }
            }
            "login" => {
                let mut parts = rest.split_whitespace();
                Command::LogIn {
                    email: required(parts.next().unwrap_or_default(), "email")?.to_string(),
                    password: required(parts.next().unwrap_or_default(), "password")?.to_string(),
                }
            }
            "logout" => Command::LogOut,
            "like" => Command::Like(ArticleId(number(rest, "article")?)),
            "comment" => {
                let (id, text) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
                Command::Comment {
                    article_id: ArticleId(number(id, "article")?),
                    text: text.trim().to_string(),
                }
            }
            "uncomment" => {
                let mut parts = rest.split_whitespace();
                Command::DeleteComment {
                    article_id: ArticleId(number(parts.next().unwrap_or_default(), "article")?),
                    comment_id: CommentId(number(parts.next().unwrap_or_default(), "comment")?),
                }
            }
            "new" => Command::NewArticle,
            "set" => Command::Set(form_field(rest)?),
            "upload" => Command::Upload(PathBuf::from(required(rest, "file")?)),
            "edit" => Command::Edit(ArticleId(number(rest, "article")?)),
            "save" => Command::Save,
            "delete" => Command::Delete(ArticleId(number(rest, "article")?)),
            "theme" => Command::Theme,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => return Err(format!("unknown command '{other}', try 'help'")),
        };
        Ok(command)
    }
}

/// Question asked before deleting an article, or `None` when the signed-in
/// user may not delete articles at all.
pub fn delete_prompt(ctx: &SessionContext, article_id: ArticleId) -> Option<String> {
    if !ctx.is_signed_in() || !ctx.is_admin() {
        return None;
    }
    let title = ctx
        .local_article(article_id)
        .map(|article| article.title.clone())
        .unwrap_or_else(|| format!("article {article_id}"));
    Some(format!("Delete \"{title}\"?"))
}

fn required<'a>(value: &'a str, name: &str) -> Result<&'a str, String> {
    let value = value.trim();
    if value.is_empty() {
        Err(format!("missing {name}"))
    } else {
        Ok(value)
    }
}

fn number(value: &str, name: &str) -> Result<i64, String> {
    required(value, name)?
        .parse()
        .map_err(|_| format!("{name} must be a number"))
}

fn form_field(rest: &str) -> Result<FormField, String> {
    let (field, value) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let value = value.trim().to_string();
    Ok(match field {
        "title" => FormField::Title(value),
        "excerpt" => FormField::Excerpt(value),
        "content" => FormField::Content(value),
        "image" => FormField::Image(value),
        "category" => FormField::Category(value.parse().map_err(|_| {
            let known: Vec<&str> = Category::ALL.iter().map(|c| c.as_str()).collect();
            format!("category must be one of {}", known.join(", "))
        })?),
        "featured" => FormField::Featured(matches!(value.as_str(), "yes" | "true" | "on" | "1")),
        other => return Err(format!("unknown field '{other}'")),
    })
}

#[cfg(test)]
#[path = "tests/commands_tests.rs"]
mod tests;
