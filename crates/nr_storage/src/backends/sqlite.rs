use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use nr_core::{
    Article, ArticleStore, Error, FeedSource, PipelineRun, RawArticle, Result, RunLog, Sentiment,
    StagingStore,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqliteRow};
use sqlx::Row;

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS feeds (
        url TEXT PRIMARY KEY,
        last_fetched_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS raw_articles (
        url TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        summary TEXT NOT NULL,
        content TEXT NOT NULL,
        published_at TEXT,
        source TEXT NOT NULL,
        tags TEXT NOT NULL,
        image_url TEXT,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS articles (
        url TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        summary TEXT NOT NULL,
        content TEXT NOT NULL,
        category TEXT NOT NULL,
        tags TEXT NOT NULL,
        sentiment TEXT NOT NULL,
        image_url TEXT,
        source_url TEXT NOT NULL,
        author TEXT NOT NULL,
        upvotes INTEGER NOT NULL DEFAULT 0,
        downvotes INTEGER NOT NULL DEFAULT 0,
        comments_count INTEGER NOT NULL DEFAULT 0,
        views INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS pipeline_runs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TEXT NOT NULL,
        fetched INTEGER NOT NULL,
        processed INTEGER NOT NULL,
        nlp_success INTEGER NOT NULL,
        nlp_fail INTEGER NOT NULL
    )
    "#,
    // Add future migrations here
];

/// SQLite document store. Timestamps are RFC3339 TEXT with fixed
/// microsecond precision so lexicographic ORDER BY matches chronology.
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    pub async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(|e| Error::Storage(format!("failed to open {}: {}", db_path.display(), e)))?;

        for (i, migration) in MIGRATIONS.iter().enumerate() {
            sqlx::query(migration)
                .execute(&pool)
                .await
                .map_err(|e| Error::Storage(format!("failed to run migration {}: {}", i, e)))?;
        }

        Ok(Self { pool })
    }
}

fn ts_to_string(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn ts_from_string(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| Error::Storage(format!("invalid timestamp {}: {}", s, e)))
}

fn raw_from_row(row: &SqliteRow) -> Result<RawArticle> {
    let tags: String = row.get("tags");
    let published_at = row
        .get::<Option<String>, _>("published_at")
        .map(|s| ts_from_string(&s))
        .transpose()?;
    Ok(RawArticle {
        url: row.get("url"),
        title: row.get("title"),
        summary: row.get("summary"),
        content: row.get("content"),
        published_at,
        source: row.get("source"),
        tags: serde_json::from_str(&tags)?,
        image_url: row.get("image_url"),
        created_at: ts_from_string(&row.get::<String, _>("created_at"))?,
    })
}

fn article_from_row(row: &SqliteRow) -> Result<Article> {
    let tags: String = row.get("tags");
    Ok(Article {
        url: row.get("url"),
        title: row.get("title"),
        summary: row.get("summary"),
        content: row.get("content"),
        category: row.get("category"),
        tags: serde_json::from_str(&tags)?,
        sentiment: Sentiment::from_label(&row.get::<String, _>("sentiment")),
        image_url: row.get("image_url"),
        source_url: row.get("source_url"),
        author: row.get("author"),
        upvotes: row.get("upvotes"),
        downvotes: row.get("downvotes"),
        comments_count: row.get("comments_count"),
        views: row.get("views"),
        created_at: ts_from_string(&row.get::<String, _>("created_at"))?,
        updated_at: ts_from_string(&row.get::<String, _>("updated_at"))?,
    })
}

#[async_trait]
impl StagingStore for SqliteStorage {
    async fn is_known(&self, url: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM raw_articles WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Storage(format!("failed to look up {}: {}", url, e)))?;
        Ok(row.is_some())
    }

    async fn stage(&self, article: &RawArticle) -> Result<bool> {
        let tags = serde_json::to_string(&article.tags)?;
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO raw_articles
            (url, title, summary, content, published_at, source, tags, image_url, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&article.url)
        .bind(&article.title)
        .bind(&article.summary)
        .bind(&article.content)
        .bind(article.published_at.as_ref().map(ts_to_string))
        .bind(&article.source)
        .bind(tags)
        .bind(article.image_url.as_deref())
        .bind(ts_to_string(&article.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Storage(format!("failed to stage {}: {}", article.url, e)))?;

        Ok(result.rows_affected() > 0)
    }

    async fn checkpoint(&self, feed_url: &str, fetched_at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO feeds (url, last_fetched_at) VALUES (?, ?)
            ON CONFLICT(url) DO UPDATE SET last_fetched_at = excluded.last_fetched_at
            "#,
        )
        .bind(feed_url)
        .bind(ts_to_string(&fetched_at))
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Storage(format!("failed to checkpoint {}: {}", feed_url, e)))?;
        Ok(())
    }

    async fn checkpoints(&self) -> Result<Vec<FeedSource>> {
        let rows = sqlx::query("SELECT url, last_fetched_at FROM feeds ORDER BY url")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::Storage(format!("failed to list checkpoints: {}", e)))?;

        rows.iter()
            .map(|row| {
                Ok(FeedSource {
                    url: row.get("url"),
                    last_fetched_at: ts_from_string(&row.get::<String, _>("last_fetched_at"))?,
                })
            })
            .collect()
    }

    async fn pending(&self, limit: usize) -> Result<Vec<RawArticle>> {
        let rows = sqlx::query(
            r#"
            SELECT r.* FROM raw_articles r
            LEFT JOIN articles a ON a.url = r.url
            WHERE a.url IS NULL
            ORDER BY r.created_at ASC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Storage(format!("failed to list pending articles: {}", e)))?;

        rows.iter().map(raw_from_row).collect()
    }
}

#[async_trait]
impl ArticleStore for SqliteStorage {
    async fn insert(&self, article: &Article) -> Result<bool> {
        let tags = serde_json::to_string(&article.tags)?;
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO articles
            (url, title, summary, content, category, tags, sentiment, image_url,
             source_url, author, upvotes, downvotes, comments_count, views,
             created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&article.url)
        .bind(&article.title)
        .bind(&article.summary)
        .bind(&article.content)
        .bind(&article.category)
        .bind(tags)
        .bind(article.sentiment.as_str())
        .bind(article.image_url.as_deref())
        .bind(&article.source_url)
        .bind(&article.author)
        .bind(article.upvotes)
        .bind(article.downvotes)
        .bind(article.comments_count)
        .bind(article.views)
        .bind(ts_to_string(&article.created_at))
        .bind(ts_to_string(&article.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Storage(format!("failed to insert {}: {}", article.url, e)))?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<Article>> {
        let row = sqlx::query("SELECT * FROM articles WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Storage(format!("failed to look up {}: {}", url, e)))?;

        row.as_ref().map(article_from_row).transpose()
    }

    async fn list_recent(&self, skip: usize, limit: usize) -> Result<Vec<Article>> {
        let rows = sqlx::query(
            "SELECT * FROM articles ORDER BY created_at DESC LIMIT ? OFFSET ?",
        )
        .bind(limit as i64)
        .bind(skip as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Storage(format!("failed to list articles: {}", e)))?;

        rows.iter().map(article_from_row).collect()
    }

    async fn record_vote(&self, url: &str, upvote: bool) -> Result<bool> {
        let query = if upvote {
            "UPDATE articles SET upvotes = upvotes + 1, updated_at = ? WHERE url = ?"
        } else {
            "UPDATE articles SET downvotes = downvotes + 1, updated_at = ? WHERE url = ?"
        };
        let result = sqlx::query(query)
            .bind(ts_to_string(&Utc::now()))
            .bind(url)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Storage(format!("failed to record vote for {}: {}", url, e)))?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_view(&self, url: &str) -> Result<bool> {
        let result =
            sqlx::query("UPDATE articles SET views = views + 1, updated_at = ? WHERE url = ?")
                .bind(ts_to_string(&Utc::now()))
                .bind(url)
                .execute(&self.pool)
                .await
                .map_err(|e| Error::Storage(format!("failed to record view for {}: {}", url, e)))?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl RunLog for SqliteStorage {
    async fn append(&self, run: &PipelineRun) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO pipeline_runs (timestamp, fetched, processed, nlp_success, nlp_fail)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(ts_to_string(&run.timestamp))
        .bind(run.fetched as i64)
        .bind(run.processed as i64)
        .bind(run.nlp_success as i64)
        .bind(run.nlp_fail as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Storage(format!("failed to append run record: {}", e)))?;
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<PipelineRun>> {
        let rows = sqlx::query(
            r#"
            SELECT timestamp, fetched, processed, nlp_success, nlp_fail
            FROM pipeline_runs ORDER BY id DESC LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Storage(format!("failed to list runs: {}", e)))?;

        rows.iter()
            .map(|row| {
                Ok(PipelineRun {
                    timestamp: ts_from_string(&row.get::<String, _>("timestamp"))?,
                    fetched: row.get::<i64, _>("fetched") as u64,
                    processed: row.get::<i64, _>("processed") as u64,
                    nlp_success: row.get::<i64, _>("nlp_success") as u64,
                    nlp_fail: row.get::<i64, _>("nlp_fail") as u64,
                })
            })
            .collect()
    }
}
