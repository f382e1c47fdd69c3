use crate::db::models::{DailySummary, UserCredential};
use crate::db::schema::SQLITE_INIT;
use crate::error::SyncError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;

pub type SqlitePool = Pool<Sqlite>;

#[derive(Clone)]
pub struct HealthStorage {
    pool: SqlitePool,
}

impl HealthStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a pool against `database_url`, creating the file if needed.
    pub async fn connect(database_url: &str) -> Result<Self, SyncError> {
        let connect_opts = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(connect_opts).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Initialize the schema by executing the bundled DDL.
    pub async fn init_schema(&self) -> Result<(), SyncError> {
        // execute multiple statements safely (SQLite supports multi-commands but sqlx::query doesn't)
        for stmt in SQLITE_INIT.split(';') {
            let s = stmt.trim();
            if s.is_empty() {
                continue;
            }
            sqlx::query(s).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// All registered users' credentials, in stable listing order.
    pub async fn list_credentials(&self) -> Result<Vec<UserCredential>, SyncError> {
        let rows = sqlx::query(
            r#"SELECT id, fitbit_user_id, fitbit_access, fitbit_refresh,
               tanita_access, tanita_refresh
               FROM user_credentials ORDER BY id"#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_credential).collect()
    }

    /// Persist a refreshed Fitbit access/refresh pair for one user.
    pub async fn update_fitbit_tokens(
        &self,
        user_id: i64,
        access: &str,
        refresh: &str,
    ) -> Result<(), SyncError> {
        sqlx::query(
            "UPDATE user_credentials SET fitbit_access = ?, fitbit_refresh = ? WHERE id = ?",
        )
        .bind(access)
        .bind(refresh)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Upsert by the (user_id, date) primary key. A second write for the same
    /// key replaces all metric fields, never merges them.
    pub async fn upsert_summary(&self, summary: &DailySummary) -> Result<(), SyncError> {
        sqlx::query(
            r#"
            INSERT INTO daily_summaries (user_id, date, steps, weight, fat, height)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, date) DO UPDATE SET
                steps=excluded.steps,
                weight=excluded.weight,
                fat=excluded.fat,
                height=excluded.height
            "#,
        )
        .bind(summary.user_id)
        .bind(summary.date)
        .bind(summary.steps)
        .bind(summary.weight)
        .bind(summary.fat)
        .bind(summary.height)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Read back one summary row, mainly for tests and inspection.
    pub async fn get_summary(
        &self,
        user_id: i64,
        date: chrono::NaiveDate,
    ) -> Result<Option<DailySummary>, SyncError> {
        let row = sqlx::query(
            "SELECT user_id, date, steps, weight, fat, height FROM daily_summaries WHERE user_id = ? AND date = ?",
        )
        .bind(user_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_summary).transpose()
    }

    fn row_to_credential(row: SqliteRow) -> Result<UserCredential, SyncError> {
        Ok(UserCredential {
            id: row.try_get("id")?,
            fitbit_user_id: row.try_get("fitbit_user_id")?,
            fitbit_access: row.try_get("fitbit_access")?,
            fitbit_refresh: row.try_get("fitbit_refresh")?,
            tanita_access: row.try_get("tanita_access")?,
            tanita_refresh: row.try_get("tanita_refresh")?,
        })
    }

    fn row_to_summary(row: SqliteRow) -> Result<DailySummary, SyncError> {
        Ok(DailySummary {
            user_id: row.try_get("user_id")?,
            date: row.try_get("date")?,
            steps: row.try_get("steps")?,
            weight: row.try_get("weight")?,
            fat: row.try_get("fat")?,
            height: row.try_get("height")?,
        })
    }
}
