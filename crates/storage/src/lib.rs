use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow},
    Pool, QueryBuilder, Row, Sqlite,
};
use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use shared::{
    domain::{Article, ArticleId, Comment, CommentId, Role, UserId, UserProfile},
    protocol::{ArrayOp, ArticleFields, ArticleOrder, ArticleQuery, LikeChange, NewArticle, NewProfile},
};

const ARTICLE_COLUMNS: &str = "a.id, a.title, a.excerpt, a.content, a.image_url, a.author_name, \
     a.author_id, a.created_at, a.category, a.likes, a.comment_count, a.featured, \
     (SELECT group_concat(l.user_id) FROM article_likes l WHERE l.article_id = a.id) AS liked_by";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone)]
pub struct StoredAccount {
    pub user_id: UserId,
    pub email: String,
    pub password_hash: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub bucket: String,
    pub path: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        // Every pooled connection to `sqlite::memory:` is its own database.
        let in_memory = database_url.contains(":memory:");
        let mut connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);
        if !in_memory {
            connect_options = connect_options.journal_mode(SqliteJournalMode::Wal);
        }
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .idle_timeout(if in_memory { None } else { Some(Duration::from_secs(600)) })
            .max_lifetime(if in_memory { None } else { Some(Duration::from_secs(1800)) })
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    /// Returns `None` when the email is already registered.
    pub async fn create_account(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<Option<UserId>> {
        let rec = sqlx::query(
            "INSERT INTO accounts (email, password_hash, created_at)
             VALUES (?, ?, ?)
             ON CONFLICT(email) DO NOTHING
             RETURNING id",
        )
        .bind(email)
        .bind(password_hash)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .context("failed to insert account")?;
        Ok(rec.map(|r| UserId(r.get::<i64, _>(0))))
    }

    pub async fn account_by_email(&self, email: &str) -> Result<Option<StoredAccount>> {
        let row = sqlx::query(
            "SELECT id, email, password_hash, display_name
             FROM accounts WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| account_from_row(&r)))
    }

    pub async fn set_display_name(&self, user_id: UserId, display_name: &str) -> Result<bool> {
        let updated = sqlx::query("UPDATE accounts SET display_name = ? WHERE id = ?")
            .bind(display_name)
            .bind(user_id.0)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(updated > 0)
    }

    pub async fn insert_session(
        &self,
        session_id: &str,
        user_id: UserId,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO sessions (session_id, user_id, expires_at, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(session_id)
        .bind(user_id.0)
        .bind(expires_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("failed to insert session")?;
        Ok(())
    }

    pub async fn session_is_active(&self, session_id: &str, user_id: UserId) -> Result<bool> {
        let row = sqlx::query("SELECT expires_at FROM sessions WHERE session_id = ? AND user_id = ?")
            .bind(session_id)
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row
            .map(|r| r.get::<DateTime<Utc>, _>(0) > Utc::now())
            .unwrap_or(false))
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<bool> {
        let deleted = sqlx::query("DELETE FROM sessions WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(deleted > 0)
    }

    /// Profiles are written once; returns `None` if one already exists.
    pub async fn create_profile(&self, profile: &NewProfile) -> Result<Option<UserProfile>> {
        let row = sqlx::query(
            "INSERT INTO profiles (user_id, email, display_name, role, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(user_id) DO NOTHING
             RETURNING user_id, email, display_name, role, created_at",
        )
        .bind(profile.user_id.0)
        .bind(&profile.email)
        .bind(&profile.display_name)
        .bind(profile.role.as_str())
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .context("failed to insert profile")?;
        Ok(row.map(|r| profile_from_row(&r)))
    }

    pub async fn profile(&self, user_id: UserId) -> Result<Option<UserProfile>> {
        let row = sqlx::query(
            "SELECT user_id, email, display_name, role, created_at FROM profiles WHERE user_id = ?",
        )
        .bind(user_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| profile_from_row(&r)))
    }

    pub async fn list_articles(&self, query: &ArticleQuery) -> Result<Vec<Article>> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {ARTICLE_COLUMNS} FROM articles a WHERE 1 = 1"));
        if let Some(category) = query.category {
            builder.push(" AND a.category = ").push_bind(category.as_str());
        }
        if let Some(featured) = query.featured {
            builder.push(" AND a.featured = ").push_bind(featured);
        }
        builder.push(match query.order {
            ArticleOrder::NewestFirst => " ORDER BY a.created_at DESC, a.id DESC",
            ArticleOrder::OldestFirst => " ORDER BY a.created_at ASC, a.id ASC",
            ArticleOrder::MostLiked => " ORDER BY a.likes DESC, a.created_at DESC, a.id DESC",
        });
        if let Some(limit) = query.limit {
            builder.push(" LIMIT ").push_bind(i64::from(limit));
        }

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .context("failed to list articles")?;
        Ok(rows.iter().map(article_from_row).collect())
    }

    pub async fn article(&self, article_id: ArticleId) -> Result<Option<Article>> {
        let row = sqlx::query(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles a WHERE a.id = ?"
        ))
        .bind(article_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(article_from_row))
    }

    pub async fn create_article(&self, author_id: UserId, article: &NewArticle) -> Result<ArticleId> {
        let fields = &article.fields;
        let rec = sqlx::query(
            "INSERT INTO articles (title, excerpt, content, image_url, author_name, author_id, created_at, category, featured)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(&fields.title)
        .bind(&fields.excerpt)
        .bind(&fields.content)
        .bind(&fields.image_url)
        .bind(&article.author_name)
        .bind(author_id.0)
        .bind(Utc::now())
        .bind(fields.category.as_str())
        .bind(fields.featured)
        .fetch_one(&self.pool)
        .await
        .context("failed to insert article")?;
        Ok(ArticleId(rec.get::<i64, _>(0)))
    }

    pub async fn update_article_fields(
        &self,
        article_id: ArticleId,
        fields: &ArticleFields,
    ) -> Result<bool> {
        let updated = sqlx::query(
            "UPDATE articles
             SET title = ?, excerpt = ?, content = ?, image_url = ?, category = ?, featured = ?
             WHERE id = ?",
        )
        .bind(&fields.title)
        .bind(&fields.excerpt)
        .bind(&fields.content)
        .bind(&fields.image_url)
        .bind(fields.category.as_str())
        .bind(fields.featured)
        .bind(article_id.0)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(updated > 0)
    }

    /// Applies a `liked_by` membership change and its counter increment in one
    /// transaction. The counter only moves when membership actually changed.
    /// Returns the resulting like count, or `None` if the article is missing.
    pub async fn apply_like(&self, article_id: ArticleId, change: LikeChange) -> Result<Option<i64>> {
        let mut tx = self.pool.begin().await?;

        // The first statement writes, so the transaction takes the write lock
        // up front instead of upgrading from a read lock.
        let membership = match change.op {
            ArrayOp::Union => sqlx::query(
                "INSERT INTO article_likes (article_id, user_id)
                 SELECT ?, ? WHERE EXISTS (SELECT 1 FROM articles WHERE id = ?)
                 ON CONFLICT(article_id, user_id) DO NOTHING",
            )
            .bind(article_id.0)
            .bind(change.user_id.0)
            .bind(article_id.0),
            ArrayOp::Remove => {
                sqlx::query("DELETE FROM article_likes WHERE article_id = ? AND user_id = ?")
                    .bind(article_id.0)
                    .bind(change.user_id.0)
            }
        };
        let changed = membership
            .execute(&mut *tx)
            .await
            .context("failed to change like membership")?
            .rows_affected();

        if changed > 0 {
            sqlx::query("UPDATE articles SET likes = MAX(likes + ?, 0) WHERE id = ?")
                .bind(change.increment)
                .bind(article_id.0)
                .execute(&mut *tx)
                .await?;
        }

        let likes: Option<i64> = sqlx::query_scalar("SELECT likes FROM articles WHERE id = ?")
            .bind(article_id.0)
            .fetch_optional(&mut *tx)
            .await?;
        tx.commit().await.context("failed to commit like change")?;
        Ok(likes)
    }

    /// Comments and likes go with the article (`ON DELETE CASCADE`).
    pub async fn delete_article(&self, article_id: ArticleId) -> Result<bool> {
        let deleted = sqlx::query("DELETE FROM articles WHERE id = ?")
            .bind(article_id.0)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(deleted > 0)
    }

    /// Newest first; ties on `created_at` are broken by id, highest first.
    pub async fn list_comments(&self, article_id: ArticleId) -> Result<Vec<Comment>> {
        let rows = sqlx::query(
            "SELECT id, article_id, user_id, user_name, text, created_at
             FROM comments
             WHERE article_id = ?
             ORDER BY created_at DESC, id DESC",
        )
        .bind(article_id.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(comment_from_row).collect())
    }

    pub async fn comment(
        &self,
        article_id: ArticleId,
        comment_id: CommentId,
    ) -> Result<Option<Comment>> {
        let row = sqlx::query(
            "SELECT id, article_id, user_id, user_name, text, created_at
             FROM comments WHERE article_id = ? AND id = ?",
        )
        .bind(article_id.0)
        .bind(comment_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(comment_from_row))
    }

    /// Returns `None` when the article does not exist.
    pub async fn insert_comment(
        &self,
        article_id: ArticleId,
        user_id: UserId,
        user_name: &str,
        text: &str,
    ) -> Result<Option<CommentId>> {
        let mut tx = self.pool.begin().await?;
        let bumped = sqlx::query("UPDATE articles SET comment_count = comment_count + 1 WHERE id = ?")
            .bind(article_id.0)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if bumped == 0 {
            return Ok(None);
        }

        let rec = sqlx::query(
            "INSERT INTO comments (article_id, user_id, user_name, text, created_at)
             VALUES (?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(article_id.0)
        .bind(user_id.0)
        .bind(user_name)
        .bind(text)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await.context("failed to commit comment")?;
        Ok(Some(CommentId(rec.get::<i64, _>(0))))
    }

    pub async fn delete_comment(&self, article_id: ArticleId, comment_id: CommentId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let deleted = sqlx::query("DELETE FROM comments WHERE article_id = ? AND id = ?")
            .bind(article_id.0)
            .bind(comment_id.0)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if deleted > 0 {
            sqlx::query(
                "UPDATE articles SET comment_count = MAX(comment_count - 1, 0) WHERE id = ?",
            )
            .bind(article_id.0)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(deleted > 0)
    }

    pub async fn put_blob(
        &self,
        bucket: &str,
        path: &str,
        content_type: &str,
        bytes: &[u8],
        uploader_id: UserId,
    ) -> Result<u64> {
        let size_bytes = i64::try_from(bytes.len()).unwrap_or(i64::MAX);
        sqlx::query(
            "INSERT INTO blobs (bucket, path, content_type, bytes, size_bytes, uploader_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(bucket, path) DO UPDATE SET
                content_type = excluded.content_type,
                bytes = excluded.bytes,
                size_bytes = excluded.size_bytes,
                uploader_id = excluded.uploader_id,
                created_at = excluded.created_at",
        )
        .bind(bucket)
        .bind(path)
        .bind(content_type)
        .bind(bytes)
        .bind(size_bytes)
        .bind(uploader_id.0)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("failed to store blob")?;
        Ok(size_bytes as u64)
    }

    pub async fn load_blob(&self, bucket: &str, path: &str) -> Result<Option<StoredBlob>> {
        let row = sqlx::query(
            "SELECT bucket, path, content_type, bytes, size_bytes, created_at
             FROM blobs WHERE bucket = ? AND path = ?",
        )
        .bind(bucket)
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| StoredBlob {
            bucket: r.get::<String, _>(0),
            path: r.get::<String, _>(1),
            content_type: r.get::<String, _>(2),
            bytes: r.get::<Vec<u8>, _>(3),
            size_bytes: r.get::<i64, _>(4).max(0) as u64,
            created_at: r.get::<DateTime<Utc>, _>(5),
        }))
    }
}

fn account_from_row(r: &SqliteRow) -> StoredAccount {
    StoredAccount {
        user_id: UserId(r.get::<i64, _>(0)),
        email: r.get::<String, _>(1),
        password_hash: r.get::<String, _>(2),
        display_name: r.get::<Option<String>, _>(3),
    }
}

fn profile_from_row(r: &SqliteRow) -> UserProfile {
    UserProfile {
        user_id: UserId(r.get::<i64, _>(0)),
        email: r.get::<String, _>(1),
        display_name: r.get::<String, _>(2),
        role: r.get::<String, _>(3).parse().unwrap_or(Role::User),
        created_at: r.get::<DateTime<Utc>, _>(4),
    }
}

fn article_from_row(r: &SqliteRow) -> Article {
    let liked_by = r
        .get::<Option<String>, _>(12)
        .map(|raw| {
            raw.split(',')
                .filter_map(|id| id.trim().parse::<i64>().ok())
                .map(UserId)
                .collect::<BTreeSet<_>>()
        })
        .unwrap_or_default();

    Article {
        id: ArticleId(r.get::<i64, _>(0)),
        title: r.get::<String, _>(1),
        excerpt: r.get::<String, _>(2),
        content: r.get::<String, _>(3),
        image_url: r.get::<String, _>(4),
        author_name: r.get::<String, _>(5),
        author_id: UserId(r.get::<i64, _>(6)),
        created_at: r.get::<DateTime<Utc>, _>(7),
        category: r.get::<String, _>(8).parse().unwrap_or_default(),
        likes: r.get::<i64, _>(9),
        liked_by,
        comment_count: r.get::<i64, _>(10),
        featured: r.get::<bool, _>(11),
    }
}

fn comment_from_row(r: &SqliteRow) -> Comment {
    Comment {
        id: CommentId(r.get::<i64, _>(0)),
        article_id: ArticleId(r.get::<i64, _>(1)),
        user_id: UserId(r.get::<i64, _>(2)),
        user_name: r.get::<String, _>(3),
        text: r.get::<String, _>(4),
        created_at: r.get::<DateTime<Utc>, _>(5),
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.contains(":memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
