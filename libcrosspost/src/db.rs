//! Database operations for Crosspost

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::credentials::CredentialStore;
use crate::error::{DbError, Result};
use crate::types::{
    CredentialRecord, ErrorLogEntry, PageToken, PlatformKind, PlatformRecord, Post, PostStatus,
};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database and run migrations
    ///
    /// `":memory:"` opens a private in-memory database on a single connection.
    pub async fn new(db_path: &str) -> Result<Self> {
        let pool = if db_path == ":memory:" {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect("sqlite::memory:")
                .await
                .map_err(DbError::SqlxError)?
        } else {
            let expanded_path = shellexpand::tilde(db_path).to_string();
            let path = Path::new(&expanded_path);

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
            }

            // mode=rwc creates the file when missing
            let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));
            SqlitePool::connect(&db_url)
                .await
                .map_err(DbError::SqlxError)?
        };

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    /// Insert a post; an existing row with the same id is left untouched
    pub async fn create_post(&self, post: &Post) -> Result<()> {
        let hashtags = to_json("hashtags", &post.hashtags)?;
        let media = to_json("media", &post.media)?;
        let options = to_json("platform_options", &post.platform_options)?;

        sqlx::query(
            r#"
            INSERT INTO posts (id, user_id, content, hashtags, media, platform_options, created_at, status)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&post.id)
        .bind(&post.user_id)
        .bind(&post.content)
        .bind(hashtags)
        .bind(media)
        .bind(options)
        .bind(post.created_at)
        .bind(post.status.as_str())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn update_post_status(&self, post_id: &str, status: PostStatus) -> Result<()> {
        sqlx::query("UPDATE posts SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(post_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_post(&self, post_id: &str) -> Result<Option<Post>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, content, hashtags, media, platform_options, created_at, status
            FROM posts WHERE id = ?
            "#,
        )
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.map(|r| post_from_row(&r)).transpose()
    }

    /// Most recent posts for a user
    pub async fn list_posts(&self, user_id: &str, limit: usize) -> Result<Vec<Post>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, content, hashtags, media, platform_options, created_at, status
            FROM posts WHERE user_id = ?
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(post_from_row).collect()
    }

    pub async fn create_post_record(&self, record: &PlatformRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO post_records (post_id, platform, platform_post_id, posted_at, success, error_message)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.post_id)
        .bind(record.platform.as_str())
        .bind(&record.platform_post_id)
        .bind(record.posted_at)
        .bind(record.success)
        .bind(&record.error_message)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_post_records(&self, post_id: &str) -> Result<Vec<PlatformRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, post_id, platform, platform_post_id, posted_at, success, error_message
            FROM post_records
            WHERE post_id = ?
            ORDER BY id
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter()
            .map(|r| {
                Ok(PlatformRecord {
                    id: r.get("id"),
                    post_id: r.get("post_id"),
                    platform: parse_platform(r.get("platform"))?,
                    platform_post_id: r.get("platform_post_id"),
                    posted_at: r.get("posted_at"),
                    success: r.get::<bool, _>("success"),
                    error_message: r.get("error_message"),
                })
            })
            .collect()
    }

    /// Store `post_ids.<platform>`
    pub async fn set_platform_post_id(
        &self,
        post_id: &str,
        platform: PlatformKind,
        external_id: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO post_platform_ids (post_id, platform, external_id)
            VALUES (?, ?, ?)
            ON CONFLICT(post_id, platform) DO UPDATE SET external_id = excluded.external_id
            "#,
        )
        .bind(post_id)
        .bind(platform.as_str())
        .bind(external_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_platform_post_ids(
        &self,
        post_id: &str,
    ) -> Result<BTreeMap<PlatformKind, String>> {
        let rows = sqlx::query(
            "SELECT platform, external_id FROM post_platform_ids WHERE post_id = ?",
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter()
            .map(|r| Ok((parse_platform(r.get("platform"))?, r.get("external_id"))))
            .collect()
    }

    pub async fn append_error_log(&self, post_id: &str, entry: &ErrorLogEntry) -> Result<()> {
        sqlx::query("INSERT INTO error_log (post_id, timestamp, error) VALUES (?, ?, ?)")
            .bind(post_id)
            .bind(entry.timestamp)
            .bind(&entry.error)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_error_log(&self, post_id: &str) -> Result<Vec<ErrorLogEntry>> {
        let rows = sqlx::query(
            "SELECT timestamp, error FROM error_log WHERE post_id = ? ORDER BY id",
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows
            .iter()
            .map(|r| ErrorLogEntry {
                timestamp: r.get("timestamp"),
                error: r.get("error"),
            })
            .collect())
    }
}

#[async_trait]
impl CredentialStore for Database {
    async fn put(&self, record: &CredentialRecord) -> Result<()> {
        use secrecy::ExposeSecret;

        sqlx::query(
            r#"
            INSERT INTO credentials (user_id, platform, access_token, refresh_token, expires_at,
                                     provider_user_id, page_id, account_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, platform) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                expires_at = excluded.expires_at,
                provider_user_id = excluded.provider_user_id,
                page_id = excluded.page_id,
                account_id = excluded.account_id,
                created_at = excluded.created_at
            "#,
        )
        .bind(&record.user_id)
        .bind(record.platform.as_str())
        .bind(record.access_token.expose_secret())
        .bind(record.refresh_token.as_ref().map(|t| t.expose_secret().to_string()))
        .bind(record.expires_at)
        .bind(&record.provider_user_id)
        .bind(&record.page_id)
        .bind(&record.account_id)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    async fn get(
        &self,
        user_id: &str,
        platform: PlatformKind,
    ) -> Result<Option<CredentialRecord>> {
        let row = sqlx::query(
            r#"
            SELECT user_id, platform, access_token, refresh_token, expires_at,
                   provider_user_id, page_id, account_id, created_at
            FROM credentials WHERE user_id = ? AND platform = ?
            "#,
        )
        .bind(user_id)
        .bind(platform.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.map(|r| credential_from_row(&r)).transpose()
    }

    async fn delete(&self, user_id: &str, platform: PlatformKind) -> Result<bool> {
        let result = sqlx::query("DELETE FROM credentials WHERE user_id = ? AND platform = ?")
            .bind(user_id)
            .bind(platform.as_str())
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, user_id: &str) -> Result<Vec<CredentialRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, platform, access_token, refresh_token, expires_at,
                   provider_user_id, page_id, account_id, created_at
            FROM credentials WHERE user_id = ?
            ORDER BY platform
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(credential_from_row).collect()
    }

    async fn get_page_token(&self, user_id: &str, page_id: &str) -> Result<Option<PageToken>> {
        let row = sqlx::query(
            "SELECT access_token, expires_at FROM page_tokens WHERE user_id = ? AND page_id = ?",
        )
        .bind(user_id)
        .bind(page_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.map(|r| {
            PageToken::new(r.get::<String, _>("access_token"), r.get::<i64, _>("expires_at"))
        }))
    }

    async fn put_page_token(
        &self,
        user_id: &str,
        page_id: &str,
        token: &PageToken,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO page_tokens (user_id, page_id, access_token, expires_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(user_id, page_id) DO UPDATE SET
                access_token = excluded.access_token,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(user_id)
        .bind(page_id)
        .bind(token.token())
        .bind(token.expires_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    async fn delete_page_tokens(&self, user_id: &str, page_id: Option<&str>) -> Result<()> {
        let query = match page_id {
            Some(page_id) => {
                sqlx::query("DELETE FROM page_tokens WHERE user_id = ? AND page_id = ?")
                    .bind(user_id)
                    .bind(page_id)
            }
            None => sqlx::query("DELETE FROM page_tokens WHERE user_id = ?").bind(user_id),
        };

        query.execute(&self.pool).await.map_err(DbError::SqlxError)?;
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "sqlite"
    }
}

fn to_json<T: serde::Serialize>(column: &str, value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| {
        DbError::Corrupt {
            column: column.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

fn from_json<T: serde::de::DeserializeOwned>(column: &str, value: &str) -> Result<T> {
    serde_json::from_str(value).map_err(|e| {
        DbError::Corrupt {
            column: column.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

fn parse_platform(value: String) -> Result<PlatformKind> {
    value.parse().map_err(|reason| {
        DbError::Corrupt {
            column: "platform".to_string(),
            reason,
        }
        .into()
    })
}

fn post_from_row(r: &sqlx::sqlite::SqliteRow) -> Result<Post> {
    let status: String = r.get("status");
    Ok(Post {
        id: r.get("id"),
        user_id: r.get("user_id"),
        content: r.get("content"),
        hashtags: from_json("hashtags", r.get::<&str, _>("hashtags"))?,
        media: from_json("media", r.get::<&str, _>("media"))?,
        platform_options: from_json("platform_options", r.get::<&str, _>("platform_options"))?,
        created_at: r.get("created_at"),
        status: status.parse().map_err(|reason| DbError::Corrupt {
            column: "status".to_string(),
            reason,
        })?,
    })
}

fn credential_from_row(r: &sqlx::sqlite::SqliteRow) -> Result<CredentialRecord> {
    let mut record = CredentialRecord::new(
        r.get::<String, _>("user_id"),
        parse_platform(r.get("platform"))?,
        r.get::<String, _>("access_token"),
        r.get::<String, _>("provider_user_id"),
    );
    record.expires_at = r.get("expires_at");
    record.page_id = r.get("page_id");
    record.account_id = r.get("account_id");
    record.created_at = r.get("created_at");
    if let Some(refresh) = r.get::<Option<String>, _>("refresh_token") {
        record = record.with_refresh_token(refresh);
    }
    Ok(record)
}
