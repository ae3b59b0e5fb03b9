use ::duckdb::Connection;

struct Migration {
    version: &'static str,
    sql: &'static str,
}

// cache_key is unique per entry; writers delete then insert inside one transaction.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "0001_series_cache",
        sql: r#"
CREATE TABLE IF NOT EXISTS series_cache (
    cache_key TEXT NOT NULL,
    code TEXT NOT NULL,
    venue TEXT NOT NULL,
    period TEXT NOT NULL,
    interval_secs INTEGER NOT NULL,
    point_count BIGINT NOT NULL,
    stored_at BIGINT NOT NULL,
    expires_at BIGINT NOT NULL,
    seq BIGINT NOT NULL
);

CREATE TABLE IF NOT EXISTS series_points (
    cache_key TEXT NOT NULL,
    idx BIGINT NOT NULL,
    ts BIGINT NOT NULL,
    open DOUBLE NOT NULL,
    high DOUBLE NOT NULL,
    low DOUBLE NOT NULL,
    close DOUBLE NOT NULL,
    volume UBIGINT NOT NULL
);
"#,
    },
    Migration {
        version: "0002_indexes",
        sql: r#"
CREATE INDEX IF NOT EXISTS idx_series_cache_stored_at ON series_cache(stored_at, seq);
CREATE INDEX IF NOT EXISTS idx_series_points_key ON series_points(cache_key);
"#,
    },
    // Cached rows are disposable; the tables are rebuilt rather than altered.
    Migration {
        version: "0003_wide_interval_subsec_ts",
        sql: r#"
DROP INDEX IF EXISTS idx_series_cache_stored_at;
DROP INDEX IF EXISTS idx_series_points_key;
DROP TABLE IF EXISTS series_points;
DROP TABLE IF EXISTS series_cache;

CREATE TABLE series_cache (
    cache_key TEXT NOT NULL,
    code TEXT NOT NULL,
    venue TEXT NOT NULL,
    period TEXT NOT NULL,
    interval_secs BIGINT NOT NULL,
    point_count BIGINT NOT NULL,
    stored_at BIGINT NOT NULL,
    expires_at BIGINT NOT NULL,
    seq BIGINT NOT NULL
);

CREATE TABLE series_points (
    cache_key TEXT NOT NULL,
    idx BIGINT NOT NULL,
    ts BIGINT NOT NULL,
    ts_nanos BIGINT NOT NULL,
    open DOUBLE NOT NULL,
    high DOUBLE NOT NULL,
    low DOUBLE NOT NULL,
    close DOUBLE NOT NULL,
    volume UBIGINT NOT NULL
);

CREATE INDEX idx_series_cache_stored_at ON series_cache(stored_at, seq);
CREATE INDEX idx_series_points_key ON series_points(cache_key);
"#,
    },
];

pub fn apply_migrations(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT NOT NULL,
    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
    )?;

    for migration in MIGRATIONS {
        let applied: i64 = connection.query_row(
            "SELECT COUNT(*) FROM schema_migrations WHERE version = ?",
            [migration.version],
            |row| row.get(0),
        )?;

        if applied == 0 {
            log::debug!("applying store migration {}", migration.version);
            connection.execute_batch(migration.sql)?;
            connection.execute(
                "INSERT INTO schema_migrations (version) VALUES (?)",
                [migration.version],
            )?;
        }
    }

    Ok(())
}
