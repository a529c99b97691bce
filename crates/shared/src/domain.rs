use std::{collections::BTreeSet, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(ArticleId);
id_newtype!(CommentId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }

    /// Role granted at signup: admin only when the email matches the
    /// configured administrator address.
    pub fn for_signup(email: &str, admin_email: &str) -> Self {
        let admin_email = admin_email.trim();
        if !admin_email.is_empty() && email.trim().eq_ignore_ascii_case(admin_email) {
            Role::Admin
        } else {
            Role::User
        }
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    #[default]
    News,
    Events,
    Sports,
    Culture,
    Opinion,
    Community,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::News,
        Category::Events,
        Category::Sports,
        Category::Culture,
        Category::Opinion,
        Category::Community,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::News => "news",
            Category::Events => "events",
            Category::Sports => "sports",
            Category::Culture => "culture",
            Category::Opinion => "opinion",
            Category::Community => "community",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Category::News => "News",
            Category::Events => "Events",
            Category::Sports => "Sports",
            Category::Culture => "Culture",
            Category::Opinion => "Opinion",
            Category::Community => "Community",
        }
    }
}

impl FromStr for Category {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownVariant(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown variant '{0}'")]
pub struct UnknownVariant(pub String);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: ArticleId,
    pub title: String,
    pub excerpt: String,
    pub content: String,
    pub image_url: String,
    pub author_name: String,
    pub author_id: UserId,
    pub created_at: DateTime<Utc>,
    pub category: Category,
    pub likes: i64,
    #[serde(default)]
    pub liked_by: BTreeSet<UserId>,
    pub comment_count: i64,
    pub featured: bool,
}

impl Article {
    pub fn is_liked_by(&self, user_id: UserId) -> bool {
        self.liked_by.contains(&user_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub article_id: ArticleId,
    pub user_id: UserId,
    pub user_name: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
