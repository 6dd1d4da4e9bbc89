//! Durable flow storage
//!
//! Holds the full message history, the pseudonymized account and party
//! nodes, and the relationship edges between them. The [`DurableStore`]
//! trait is the contract the pipeline programs against; [`SqliteStore`]
//! is the bundled implementation.
//!
//! Writes are idempotent per natural key so that concurrent requests for
//! the same flow and storage-level retries converge on the same state;
//! edges are the exception and append.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::Connection;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::messages::{QuoteMessage, TransferMessage};
use crate::relationship::RelationshipEdge;
use crate::{PrepError, PrepResult};

/// Storage contract required by the correlation pipeline
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Upsert a full message record under a type-specific collection and
    /// natural key
    async fn save_message_record(
        &self,
        record: &serde_json::Value,
        collection: &str,
        key: &str,
    ) -> PrepResult<()>;

    /// Ensure an account node exists (idempotent)
    async fn add_account_node(&self, account_hash: &str) -> PrepResult<()>;

    /// Ensure a party node exists (idempotent)
    async fn add_party_node(&self, party_id: &str, created_at: &str) -> PrepResult<()>;

    /// Ensure a party is linked to an account it holds (idempotent)
    async fn link_party_to_account(
        &self,
        party_id: &str,
        account_hash: &str,
        created_at: &str,
    ) -> PrepResult<()>;

    /// Append a relationship edge
    async fn save_edge(&self, edge: &RelationshipEdge) -> PrepResult<()>;

    /// All originating-quote records for a flow
    async fn find_quote_by_end_to_end_id(
        &self,
        end_to_end_id: &str,
    ) -> PrepResult<Vec<QuoteMessage>>;

    /// All transfer records for a flow
    async fn find_transfer_by_end_to_end_id(
        &self,
        end_to_end_id: &str,
    ) -> PrepResult<Vec<TransferMessage>>;
}

/// SQLite-backed [`DurableStore`]
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    quote_collection: String,
    transfer_collection: String,
}

impl SqliteStore {
    /// Open the database and run migrations. The collection names are the
    /// ones flow lookups resolve against.
    pub async fn connect(
        path: &str,
        quote_collection: &str,
        transfer_collection: &str,
    ) -> anyhow::Result<Self> {
        info!("Connecting to database at {}", path);

        if path != ":memory:" {
            if let Some(parent) = Path::new(path).parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let conn = Connection::open(path)?;
        Self::run_migrations(&conn)?;

        info!("Database connected successfully");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            quote_collection: quote_collection.to_string(),
            transfer_collection: transfer_collection.to_string(),
        })
    }

    /// Run database migrations
    fn run_migrations(conn: &Connection) -> anyhow::Result<()> {
        debug!("Running database migrations...");

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS message_records (
                record_key TEXT PRIMARY KEY,
                collection TEXT NOT NULL,
                end_to_end_id TEXT,
                body TEXT NOT NULL,
                stored_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_records_collection_e2e
             ON message_records(collection, end_to_end_id)",
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS accounts (
                account_hash TEXT PRIMARY KEY
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS parties (
                party_id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS party_accounts (
                party_id TEXT NOT NULL,
                account_hash TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (party_id, account_hash)
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS edges (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                from_node TEXT NOT NULL,
                to_node TEXT NOT NULL,
                amount REAL,
                currency TEXT,
                created_at TEXT NOT NULL,
                end_to_end_id TEXT NOT NULL,
                message_id TEXT NOT NULL,
                payment_info_id TEXT NOT NULL,
                transaction_type TEXT NOT NULL,
                status TEXT,
                lat TEXT,
                long TEXT
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_edges_e2e ON edges(end_to_end_id)",
            [],
        )?;

        debug!("Database migrations completed");
        Ok(())
    }

    /// Get the database connection
    pub fn conn(&self) -> Arc<Mutex<Connection>> {
        self.conn.clone()
    }

    async fn find_records<T: serde::de::DeserializeOwned>(
        &self,
        collection: &str,
        end_to_end_id: &str,
    ) -> PrepResult<Vec<T>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT body FROM message_records
                 WHERE collection = ?1 AND end_to_end_id = ?2
                 ORDER BY stored_at",
            )
            .map_err(storage_err)?;
        let bodies = stmt
            .query_map([collection, end_to_end_id], |row| row.get::<_, String>(0))
            .map_err(storage_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(storage_err)?;

        bodies
            .iter()
            .map(|body| {
                serde_json::from_str(body).map_err(|e| {
                    PrepError::Storage(format!("stored record failed to parse: {e}"))
                })
            })
            .collect()
    }
}

fn storage_err(e: rusqlite::Error) -> PrepError {
    PrepError::Storage(e.to_string())
}

#[async_trait]
impl DurableStore for SqliteStore {
    async fn save_message_record(
        &self,
        record: &serde_json::Value,
        collection: &str,
        key: &str,
    ) -> PrepResult<()> {
        let end_to_end_id = record
            .get("EndToEndId")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let body = record.to_string();

        let conn = self.conn.lock().await;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO message_records (record_key, collection, end_to_end_id, body)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            rusqlite::params![key, collection, &end_to_end_id, &body],
        )
        .map_err(storage_err)?;
        debug!("DB: Saved message record: collection={}, key={}", collection, key);
        Ok(())
    }

    async fn add_account_node(&self, account_hash: &str) -> PrepResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR IGNORE INTO accounts (account_hash) VALUES (?1)",
            [account_hash],
        )
        .map_err(storage_err)?;
        Ok(())
    }

    async fn add_party_node(&self, party_id: &str, created_at: &str) -> PrepResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR IGNORE INTO parties (party_id, created_at) VALUES (?1, ?2)",
            [party_id, created_at],
        )
        .map_err(storage_err)?;
        Ok(())
    }

    async fn link_party_to_account(
        &self,
        party_id: &str,
        account_hash: &str,
        created_at: &str,
    ) -> PrepResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"
            INSERT OR IGNORE INTO party_accounts (party_id, account_hash, created_at)
            VALUES (?1, ?2, ?3)
            "#,
            [party_id, account_hash, created_at],
        )
        .map_err(storage_err)?;
        Ok(())
    }

    async fn save_edge(&self, edge: &RelationshipEdge) -> PrepResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"
            INSERT INTO edges (from_node, to_node, amount, currency, created_at,
                               end_to_end_id, message_id, payment_info_id,
                               transaction_type, status, lat, long)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            rusqlite::params![
                &edge.from,
                &edge.to,
                edge.amount,
                edge.currency.as_deref(),
                &edge.created_at,
                &edge.end_to_end_id,
                &edge.message_id,
                &edge.payment_info_id,
                &edge.transaction_type,
                edge.status.as_deref(),
                edge.lat.as_deref(),
                edge.long.as_deref(),
            ],
        )
        .map_err(storage_err)?;
        debug!(
            "DB: Saved edge: end_to_end_id={}, type={}",
            edge.end_to_end_id, edge.transaction_type
        );
        Ok(())
    }

    async fn find_quote_by_end_to_end_id(
        &self,
        end_to_end_id: &str,
    ) -> PrepResult<Vec<QuoteMessage>> {
        let collection = self.quote_collection.clone();
        self.find_records(&collection, end_to_end_id).await
    }

    async fn find_transfer_by_end_to_end_id(
        &self,
        end_to_end_id: &str,
    ) -> PrepResult<Vec<TransferMessage>> {
        let collection = self.transfer_collection.clone();
        self.find_records(&collection, end_to_end_id).await
    }
}
