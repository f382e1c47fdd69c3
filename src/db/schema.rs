//! SQL DDL for initializing the health-tracking storage.
//! SQLite-first design; can be adapted for other RDBMS.

/// SQLite schema with:
/// - `user_credentials`: one row per registered user, keyed by an immutable
///   internal id; token columns are nullable (a user may be linked to only
///   one of the two providers). `tanita_refresh` is stored but not used by
///   the refresh path.
/// - `daily_summaries`: one row per (user, date), all metric columns default
///   to the zero sentinel. The composite primary key backs the
///   ON CONFLICT upsert.
pub const SQLITE_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS user_credentials (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    fitbit_user_id TEXT NOT NULL,
    fitbit_access TEXT NULL,
    fitbit_refresh TEXT NULL,
    tanita_access TEXT NULL,
    tanita_refresh TEXT NULL
);

CREATE TABLE IF NOT EXISTS daily_summaries (
    user_id INTEGER NOT NULL,
    date TEXT NOT NULL, -- calendar day, YYYY-MM-DD
    steps INTEGER NOT NULL DEFAULT 0,
    weight REAL NOT NULL DEFAULT 0,
    fat REAL NOT NULL DEFAULT 0,
    height REAL NOT NULL DEFAULT 0,
    PRIMARY KEY (user_id, date)
);
"#;
