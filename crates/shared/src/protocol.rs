use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Category, Role, UserId};

pub const API_KEY_HEADER: &str = "x-press-api-key";
pub const PROJECT_HEADER: &str = "x-press-project";
pub const APP_ID_HEADER: &str = "x-press-app-id";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user_id: UserId,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayNameRequest {
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProfile {
    pub user_id: UserId,
    pub email: String,
    pub display_name: String,
    pub role: Role,
}

/// Editable article fields, as submitted from the admin form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleFields {
    pub title: String,
    pub excerpt: String,
    pub content: String,
    pub image_url: String,
    pub category: Category,
    pub featured: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewArticle {
    #[serde(flatten)]
    pub fields: ArticleFields,
    pub author_name: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArticleOrder {
    #[default]
    NewestFirst,
    OldestFirst,
    MostLiked,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleQuery {
    #[serde(default)]
    pub order: ArticleOrder,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub featured: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrayOp {
    Union,
    Remove,
}

/// Membership change on `liked_by` paired with an increment of `likes`,
/// applied by the document store as one write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeChange {
    pub user_id: UserId,
    pub op: ArrayOp,
    pub increment: i64,
}

impl LikeChange {
    pub fn like(user_id: UserId) -> Self {
        Self {
            user_id,
            op: ArrayOp::Union,
            increment: 1,
        }
    }

    pub fn unlike(user_id: UserId) -> Self {
        Self {
            user_id,
            op: ArrayOp::Remove,
            increment: -1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticlePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<ArticleFields>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub like: Option<LikeChange>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewComment {
    pub user_name: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedResponse {
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobHandle {
    pub bucket: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobStored {
    pub handle: BlobHandle,
    pub size_bytes: u64,
    pub content_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobUrl {
    pub url: String,
}
