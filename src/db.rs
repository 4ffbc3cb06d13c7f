use crate::config::Config;
use crate::error::StoreError;
use crate::model::{Article, ArticleId};
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Builder, Connection, Database as LibsqlDatabase};
use std::path::Path;

type StoreResult<T> = Result<T, StoreError>;

const SYSTEM_MIGRATIONS: &[(&str, &str)] =
    &[("system/000_migrations_table.sql", include_str!("migrations/system/000_migrations_table.sql"))];

/// Collection migrations; `{collection}` is replaced by the table name.
const MIGRATIONS: &[(&str, &str)] = &[("001_articles.sql", include_str!("migrations/001_articles.sql"))];

/// Document store adapter over a single libsql connection.
///
/// One instance is built by the process entry point and shared behind an
/// `Arc`; the driver connection is safe for concurrent use.
pub struct Database {
    _db: LibsqlDatabase,
    conn: Connection,
    collection: String,
}

fn is_valid_collection(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn format_ctime(ctime: &DateTime<Utc>) -> String {
    ctime.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl Database {
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    async fn is_migration_applied(conn: &Connection, name: &str) -> StoreResult<bool> {
        let query = "SELECT 1 FROM _migrations WHERE name = ?";
        match conn.query(query, libsql::params![name]).await {
            Ok(mut rows) => Ok(rows.next().await.map_err(StoreError::Query)?.is_some()),
            Err(e) => {
                if e.to_string().contains("no such table") {
                    Ok(false)
                } else {
                    Err(StoreError::Query(e))
                }
            }
        }
    }

    async fn record_migration(conn: &Connection, name: &str) -> StoreResult<()> {
        let query = r#"
            INSERT INTO _migrations (name, applied_at)
            VALUES (?, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        "#;
        conn.execute(query, libsql::params![name])
            .await
            .map_err(StoreError::Write)?;
        Ok(())
    }

    async fn run_migration(conn: &Connection, name: &str, sql: &str) -> StoreResult<()> {
        if Self::is_migration_applied(conn, name).await? {
            tracing::debug!("migration {} already applied, skipping", name);
            return Ok(());
        }

        tracing::info!("applying migration: {}", name);
        conn.execute_batch(sql)
            .await
            .map_err(|source| StoreError::Migration {
                name: name.to_string(),
                source,
            })?;

        Self::record_migration(conn, name).await?;
        Ok(())
    }

    /// Opens the store described by `cfg`: a remote libsql database when a
    /// url and token are configured, otherwise `<data_dir>/<database>.db`.
    pub async fn new(cfg: &Config, data_dir: &Path) -> StoreResult<Self> {
        let store = &cfg.store;
        let db = match store.remote() {
            Some((url, token)) => {
                tracing::info!(url = %url, "[db] connecting to remote store");
                Builder::new_remote(url.to_string(), token.to_string())
                    .build()
                    .await
                    .map_err(StoreError::Connect)?
            }
            None => {
                let path = data_dir.join(format!("{}.db", store.get_database()));
                tracing::info!(path = ?path, "[db] opening local store");
                Builder::new_local(&path)
                    .build()
                    .await
                    .map_err(StoreError::Connect)?
            }
        };

        Self::from_database(db, store.get_collection()).await
    }

    /// Opens a private in-memory store. Used by tests.
    pub async fn in_memory(collection: &str) -> StoreResult<Self> {
        let db = Builder::new_local(":memory:")
            .build()
            .await
            .map_err(StoreError::Connect)?;
        Self::from_database(db, collection).await
    }

    async fn from_database(db: LibsqlDatabase, collection: &str) -> StoreResult<Self> {
        if !is_valid_collection(collection) {
            return Err(StoreError::InvalidCollection(collection.to_string()));
        }

        let conn = db.connect().map_err(StoreError::Connect)?;
        conn.query("SELECT 1", ()).await.map_err(StoreError::Connect)?;

        for (filename, sql) in SYSTEM_MIGRATIONS {
            Self::run_migration(&conn, filename, sql).await?;
        }

        for (filename, sql) in MIGRATIONS {
            let name = format!("{}/{}", collection, filename);
            let sql = sql.replace("{collection}", collection);
            Self::run_migration(&conn, &name, &sql).await?;
        }

        Ok(Database {
            _db: db,
            conn,
            collection: collection.to_string(),
        })
    }

    /// All articles, newest first.
    pub async fn list_all(&self) -> StoreResult<Vec<Article>> {
        let query = format!(
            "SELECT id, title, body, ctime FROM {} ORDER BY seq DESC",
            self.collection
        );

        let mut rows = self.conn.query(&query, ()).await.map_err(StoreError::Query)?;
        let mut articles = Vec::new();

        while let Some(row) = rows.next().await.map_err(StoreError::Query)? {
            articles.push(self.row_to_article(&row)?);
        }

        Ok(articles)
    }

    pub async fn find_by_id(&self, id: &str) -> StoreResult<Article> {
        let parsed = ArticleId::parse(id).ok_or_else(|| StoreError::InvalidId(id.to_string()))?;
        let query = format!(
            "SELECT id, title, body, ctime FROM {} WHERE id = ?",
            self.collection
        );

        let mut rows = self
            .conn
            .query(&query, libsql::params![parsed.to_string()])
            .await
            .map_err(StoreError::Query)?;

        match rows.next().await.map_err(StoreError::Query)? {
            Some(row) => self.row_to_article(&row),
            None => Err(StoreError::NotFound(parsed.to_string())),
        }
    }

    pub async fn insert(&self, article: &Article) -> StoreResult<()> {
        let query = format!(
            "INSERT INTO {} (id, title, body, ctime) VALUES (?, ?, ?, ?)",
            self.collection
        );

        self.conn
            .execute(
                &query,
                libsql::params![
                    article.id.to_string(),
                    article.title.clone(),
                    article.body.clone(),
                    format_ctime(&article.ctime)
                ],
            )
            .await
            .map_err(StoreError::Write)?;
        Ok(())
    }

    /// Replaces title and body of the stored article with the same id.
    /// The stored `ctime` is never rewritten.
    pub async fn update(&self, article: &Article) -> StoreResult<()> {
        let query = format!("UPDATE {} SET title = ?, body = ? WHERE id = ?", self.collection);

        let changed = self
            .conn
            .execute(
                &query,
                libsql::params![
                    article.title.clone(),
                    article.body.clone(),
                    article.id.to_string()
                ],
            )
            .await
            .map_err(StoreError::Write)?;

        if changed == 0 {
            return Err(StoreError::NotFound(article.id.to_string()));
        }
        Ok(())
    }

    pub async fn delete(&self, id: &ArticleId) -> StoreResult<()> {
        let query = format!("DELETE FROM {} WHERE id = ?", self.collection);

        let changed = self
            .conn
            .execute(&query, libsql::params![id.to_string()])
            .await
            .map_err(StoreError::Write)?;

        if changed == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    pub async fn count(&self) -> StoreResult<u64> {
        let query = format!("SELECT COUNT(*) FROM {}", self.collection);
        let mut rows = self.conn.query(&query, ()).await.map_err(StoreError::Query)?;

        match rows.next().await.map_err(StoreError::Query)? {
            Some(row) => {
                let n: i64 = row.get(0).map_err(StoreError::Query)?;
                Ok(n as u64)
            }
            None => Ok(0),
        }
    }

    fn row_to_article(&self, row: &libsql::Row) -> StoreResult<Article> {
        let id: String = row.get(0).map_err(StoreError::Query)?;
        let ctime: String = row.get(3).map_err(StoreError::Query)?;

        let id = ArticleId::parse(&id).ok_or_else(|| StoreError::Corrupt(format!("bad id {id:?}")))?;
        let ctime = DateTime::parse_from_rfc3339(&ctime)
            .map_err(|e| StoreError::Corrupt(format!("bad ctime {ctime:?}: {e}")))?
            .with_timezone(&Utc);

        Ok(Article {
            id,
            title: row.get(1).map_err(StoreError::Query)?,
            body: row.get(2).map_err(StoreError::Query)?,
            ctime,
        })
    }
}
