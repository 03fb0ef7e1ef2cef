use rusqlite::Connection;
use tracing::info;

use crate::error::{PipelineError, PipelineResult};

/// Database schema version
const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Run all necessary database migrations
pub fn run_migrations(conn: &Connection) -> PipelineResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )
    .map_err(migration_error)?;

    let current_version = get_schema_version(conn)?;

    for version in (current_version + 1)..=CURRENT_SCHEMA_VERSION {
        info!("Applying database migration to version {}", version);
        apply_migration(conn, version)?;
        update_schema_version(conn, version)?;
    }

    Ok(())
}

fn migration_error(e: rusqlite::Error) -> PipelineError {
    PipelineError::persist("migrations", e.to_string())
}

fn get_schema_version(conn: &Connection) -> PipelineResult<i32> {
    conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| {
        row.get(0)
    })
    .map_err(migration_error)
}

fn update_schema_version(conn: &Connection, version: i32) -> PipelineResult<()> {
    conn.execute(
        "INSERT INTO schema_version (version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![version, chrono::Utc::now().timestamp()],
    )
    .map_err(migration_error)?;
    Ok(())
}

fn apply_migration(conn: &Connection, version: i32) -> PipelineResult<()> {
    match version {
        1 => apply_migration_v1(conn),
        _ => Err(PipelineError::persist(
            "migrations",
            format!("unknown migration version: {}", version),
        )),
    }
}

/// Migration v1: initial schema
fn apply_migration_v1(conn: &Connection) -> PipelineResult<()> {
    conn.execute(
        "CREATE TABLE analyses (
            id TEXT PRIMARY KEY,
            owner TEXT NOT NULL,
            url TEXT NOT NULL,
            site_title TEXT NOT NULL,
            site_description TEXT NOT NULL,
            product_summary TEXT NOT NULL,
            target_audience TEXT NOT NULL,
            content_angles_json TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )",
        [],
    )
    .map_err(migration_error)?;

    conn.execute(
        "CREATE TABLE keywords (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            analysis_id TEXT NOT NULL,
            keyword TEXT NOT NULL,
            intent TEXT NOT NULL,
            relevance TEXT NOT NULL,
            category TEXT NOT NULL,
            search_volume INTEGER NOT NULL,
            cpc REAL NOT NULL,
            competition REAL NOT NULL,
            competition_level TEXT NOT NULL,
            trend_json TEXT NOT NULL,
            opportunity_score INTEGER NOT NULL,
            serp_difficulty INTEGER,
            source TEXT NOT NULL,
            FOREIGN KEY (analysis_id) REFERENCES analyses (id) ON DELETE CASCADE,
            UNIQUE (analysis_id, keyword)
        )",
        [],
    )
    .map_err(migration_error)?;

    conn.execute(
        "CREATE TABLE competitors (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            analysis_id TEXT NOT NULL,
            name TEXT NOT NULL,
            url TEXT NOT NULL,
            reason TEXT NOT NULL,
            FOREIGN KEY (analysis_id) REFERENCES analyses (id) ON DELETE CASCADE
        )",
        [],
    )
    .map_err(migration_error)?;

    conn.execute(
        "CREATE TABLE clusters (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            analysis_id TEXT NOT NULL,
            topic TEXT NOT NULL,
            article_title TEXT NOT NULL,
            pillar_keyword TEXT NOT NULL,
            supporting_json TEXT NOT NULL,
            search_intent TEXT NOT NULL,
            difficulty TEXT NOT NULL,
            total_volume INTEGER NOT NULL,
            avg_competition REAL NOT NULL,
            FOREIGN KEY (analysis_id) REFERENCES analyses (id) ON DELETE CASCADE
        )",
        [],
    )
    .map_err(migration_error)?;

    // Latest crawled snapshot per site, refreshed after each run
    conn.execute(
        "CREATE TABLE site_pages (
            url TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            structured_text TEXT NOT NULL,
            fetched_at INTEGER NOT NULL
        )",
        [],
    )
    .map_err(migration_error)?;

    conn.execute("CREATE INDEX idx_analyses_owner_url ON analyses (owner, url, created_at)", [])
        .map_err(migration_error)?;
    conn.execute("CREATE INDEX idx_keywords_analysis ON keywords (analysis_id, opportunity_score)", [])
        .map_err(migration_error)?;
    conn.execute("CREATE INDEX idx_clusters_analysis ON clusters (analysis_id)", [])
        .map_err(migration_error)?;
    conn.execute("CREATE INDEX idx_competitors_analysis ON competitors (analysis_id)", [])
        .map_err(migration_error)?;

    Ok(())
}
