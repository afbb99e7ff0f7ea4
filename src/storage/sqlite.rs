//! SQLite storage backend implementation
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Better concurrency for reads during writes
//! - **Connection pooling**: Efficient resource usage
//! - **Migrations**: Automatic schema versioning with sqlx

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument};

use super::backend::{HealthStatus, Storage};
use super::error::{StorageError, StorageResult};
use super::schema::{AccountRow, BlockReason, GroupRow, HostRow, NewHost, Role};

/// SQLite storage backend
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteBackend {
    /// Create a new SQLite backend
    ///
    /// This will:
    /// 1. Create the database file if it doesn't exist
    /// 2. Run migrations to create tables
    /// 3. Configure SQLite for optimal performance (WAL mode, etc.)
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite backend at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StorageError::MigrationFailed(e.to_string()))?;

        info!("database migrations complete");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    fn timestamp_to_millis(dt: &DateTime<Utc>) -> i64 {
        dt.timestamp_millis()
    }

    fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
    }

    fn row_to_host(row: &sqlx::sqlite::SqliteRow) -> HostRow {
        HostRow {
            id: row.get::<i64, _>("id") as u64,
            uuid: row.get("uuid"),
            name: row.get("name"),
            user_id: row.get::<i64, _>("user_id") as u64,
            display_index: row.get("display_index"),
            public_note: row.get("public_note"),
            hide_from_guests: row.get::<i64, _>("hide_from_guests") != 0,
            created_at: Self::millis_to_timestamp(row.get("created_at")),
            last_active: row
                .get::<Option<i64>, _>("last_active")
                .map(Self::millis_to_timestamp),
        }
    }

    fn row_to_group(row: &sqlx::sqlite::SqliteRow) -> GroupRow {
        GroupRow {
            id: row.get::<i64, _>("id") as u64,
            name: row.get("name"),
            user_id: row.get::<i64, _>("user_id") as u64,
        }
    }
}

#[async_trait]
impl Storage for SqliteBackend {
    #[instrument(skip(self), fields(uuid = %host.uuid))]
    async fn create_host(&self, host: NewHost) -> StorageResult<HostRow> {
        let created_at = Self::timestamp_to_millis(&Utc::now());

        // Host row and optional membership are a single transaction -
        // either both commit or neither is persisted.
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO hosts (uuid, name, user_id, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&host.uuid)
        .bind(&host.name)
        .bind(host.user_id as i64)
        .bind(created_at)
        .execute(&mut *tx)
        .await?;

        let host_id = result.last_insert_rowid();

        if let Some(group_id) = host.group_id {
            sqlx::query(
                r#"
                INSERT INTO host_group_members (group_id, host_id, user_id)
                VALUES (?, ?, ?)
                "#,
            )
            .bind(group_id as i64)
            .bind(host_id)
            .bind(host.user_id as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!("created host {} for account {}", host_id, host.user_id);

        Ok(HostRow {
            id: host_id as u64,
            uuid: host.uuid,
            name: host.name,
            user_id: host.user_id,
            display_index: 0,
            public_note: String::new(),
            hide_from_guests: false,
            created_at: Self::millis_to_timestamp(created_at),
            last_active: None,
        })
    }

    async fn find_group(&self, owner_id: u64, name: &str) -> StorageResult<GroupRow> {
        let row = sqlx::query(
            "SELECT id, name, user_id FROM host_groups WHERE name = ? AND user_id = ?",
        )
        .bind(name)
        .bind(owner_id as i64)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StorageError::NotFound(format!("group '{name}'")))?;

        Ok(Self::row_to_group(&row))
    }

    async fn find_group_any(&self, name: &str) -> StorageResult<GroupRow> {
        let row = sqlx::query("SELECT id, name, user_id FROM host_groups WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("group '{name}'")))?;

        Ok(Self::row_to_group(&row))
    }

    async fn get_account(&self, id: u64) -> StorageResult<AccountRow> {
        let row = sqlx::query("SELECT id, username, role FROM accounts WHERE id = ?")
            .bind(id as i64)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("account {id}")))?;

        Ok(AccountRow {
            id: row.get::<i64, _>("id") as u64,
            username: row.get("username"),
            role: Role::parse(row.get("role")),
        })
    }

    async fn load_agent_secrets(&self) -> StorageResult<HashMap<String, u64>> {
        let rows = sqlx::query("SELECT agent_secret, id FROM accounts")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| (row.get("agent_secret"), row.get::<i64, _>("id") as u64))
            .collect())
    }

    async fn load_hosts(&self) -> StorageResult<Vec<HostRow>> {
        let rows = sqlx::query(
            r#"
            SELECT id, uuid, name, user_id, display_index, public_note,
                   hide_from_guests, created_at, last_active
            FROM hosts
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::row_to_host).collect())
    }

    async fn block_address(&self, address: &str, reason: BlockReason) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO blocked_addresses (address, reason, blocked_at)
            VALUES (?, ?, ?)
            ON CONFLICT (address) DO UPDATE SET
                reason = excluded.reason,
                blocked_at = excluded.blocked_at
            "#,
        )
        .bind(address)
        .bind(reason.to_string())
        .bind(Self::timestamp_to_millis(&Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn unblock_address(&self, address: &str) -> StorageResult<()> {
        sqlx::query("DELETE FROM blocked_addresses WHERE address = ?")
            .bind(address)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => Ok(HealthStatus {
                healthy: true,
                message: format!("SQLite operational at {}", self.db_path),
            }),
            Err(e) => Ok(HealthStatus {
                healthy: false,
                message: format!("SQLite ping failed: {e}"),
            }),
        }
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing SQLite connection pool");
        self.pool.close().await;
        Ok(())
    }
}
