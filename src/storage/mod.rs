use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub mod migrations;

use crate::config::DatabaseConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::models::{Competitor, CrawlResult, EnrichedKeyword, KeywordCluster};

/// Keyword rows written per transaction
const KEYWORD_BATCH: usize = 50;

/// One persisted analysis run
#[derive(Debug, Clone)]
pub struct AnalysisRecord {
    pub id: String,
    pub owner: String,
    pub url: String,
    pub site_title: String,
    pub site_description: String,
    pub product_summary: String,
    pub target_audience: String,
    pub content_angles: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// SQLite-backed persistence behind a shared async lock
pub struct StorageManager {
    connection: Arc<Mutex<Connection>>,
}

impl StorageManager {
    pub async fn new(config: &DatabaseConfig) -> PipelineResult<Self> {
        info!("Opening database at {}", config.path.display());

        if let Some(parent) = config.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PipelineError::persist("database", e.to_string()))?;
        }

        let connection = Connection::open(&config.path)
            .map_err(|e| PipelineError::persist("database", e.to_string()))?;
        connection
            .execute("PRAGMA foreign_keys = ON", [])
            .map_err(|e| PipelineError::persist("database", e.to_string()))?;

        migrations::run_migrations(&connection)?;

        Ok(Self { connection: Arc::new(Mutex::new(connection)) })
    }

    pub async fn insert_analysis(&self, record: &AnalysisRecord) -> PipelineResult<()> {
        let angles_json = serde_json::to_string(&record.content_angles)
            .map_err(|e| PipelineError::persist("analysis", e.to_string()))?;

        let conn = self.connection.lock().await;
        conn.execute(
            "INSERT INTO analyses (id, owner, url, site_title, site_description,
                product_summary, target_audience, content_angles_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.id,
                record.owner,
                record.url,
                record.site_title,
                record.site_description,
                record.product_summary,
                record.target_audience,
                angles_json,
                record.created_at.timestamp(),
            ],
        )
        .map_err(|e| PipelineError::persist("analysis", e.to_string()))?;
        Ok(())
    }

    /// Most recent analysis id and creation time for an (owner, url) pair
    pub async fn latest_analysis(
        &self,
        owner: &str,
        url: &str,
    ) -> PipelineResult<Option<(String, DateTime<Utc>)>> {
        let conn = self.connection.lock().await;
        conn.query_row(
            "SELECT id, created_at FROM analyses
             WHERE owner = ?1 AND url = ?2
             ORDER BY created_at DESC LIMIT 1",
            params![owner, url],
            |row| {
                let id: String = row.get(0)?;
                let ts: i64 = row.get(1)?;
                Ok((id, ts))
            },
        )
        .optional()
        .map_err(|e| PipelineError::persist("analysis", e.to_string()))
        .map(|opt| {
            opt.map(|(id, ts)| (id, DateTime::from_timestamp(ts, 0).unwrap_or_else(Utc::now)))
        })
    }

    pub async fn get_analysis(&self, id: &str) -> PipelineResult<Option<AnalysisRecord>> {
        let conn = self.connection.lock().await;
        conn.query_row(
            "SELECT id, owner, url, site_title, site_description, product_summary,
                    target_audience, content_angles_json, created_at
             FROM analyses WHERE id = ?1",
            params![id],
            |row| {
                let angles_json: String = row.get(7)?;
                let ts: i64 = row.get(8)?;
                Ok(AnalysisRecord {
                    id: row.get(0)?,
                    owner: row.get(1)?,
                    url: row.get(2)?,
                    site_title: row.get(3)?,
                    site_description: row.get(4)?,
                    product_summary: row.get(5)?,
                    target_audience: row.get(6)?,
                    content_angles: serde_json::from_str(&angles_json).unwrap_or_default(),
                    created_at: DateTime::from_timestamp(ts, 0).unwrap_or_else(Utc::now),
                })
            },
        )
        .optional()
        .map_err(|e| PipelineError::persist("analysis", e.to_string()))
    }

    /// Insert keywords in batches of 50, one transaction each. A failed
    /// batch is logged and skipped; later batches still run. Returns the
    /// number of rows actually written.
    pub async fn insert_keywords(&self, analysis_id: &str, keywords: &[EnrichedKeyword]) -> usize {
        let mut conn = self.connection.lock().await;
        let mut written = 0usize;

        for (batch_idx, batch) in keywords.chunks(KEYWORD_BATCH).enumerate() {
            match insert_keyword_batch(&mut conn, analysis_id, batch) {
                Ok(()) => {
                    written += batch.len();
                    debug!("Persisted keyword batch {} ({} rows)", batch_idx, batch.len());
                }
                Err(e) => {
                    warn!("Keyword batch {} failed ({} rows lost): {}", batch_idx, batch.len(), e);
                }
            }
        }

        written
    }

    pub async fn insert_competitors(
        &self,
        analysis_id: &str,
        competitors: &[Competitor],
    ) -> PipelineResult<()> {
        let mut conn = self.connection.lock().await;
        let tx = conn
            .transaction()
            .map_err(|e| PipelineError::persist("competitors", e.to_string()))?;
        for c in competitors {
            tx.execute(
                "INSERT INTO competitors (analysis_id, name, url, reason)
                 VALUES (?1, ?2, ?3, ?4)",
                params![analysis_id, c.name, c.url, c.reason],
            )
            .map_err(|e| PipelineError::persist("competitors", e.to_string()))?;
        }
        tx.commit().map_err(|e| PipelineError::persist("competitors", e.to_string()))
    }

    pub async fn insert_clusters(
        &self,
        analysis_id: &str,
        clusters: &[KeywordCluster],
    ) -> PipelineResult<()> {
        let mut conn = self.connection.lock().await;
        let tx =
            conn.transaction().map_err(|e| PipelineError::persist("clusters", e.to_string()))?;
        for c in clusters {
            let supporting_json = serde_json::to_string(&c.supporting_keywords)
                .map_err(|e| PipelineError::persist("clusters", e.to_string()))?;
            tx.execute(
                "INSERT INTO clusters (analysis_id, topic, article_title, pillar_keyword,
                    supporting_json, search_intent, difficulty, total_volume, avg_competition)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    analysis_id,
                    c.topic,
                    c.article_title,
                    c.pillar_keyword,
                    supporting_json,
                    enum_text(&c.search_intent),
                    enum_text(&c.difficulty),
                    c.total_volume as i64,
                    c.avg_competition,
                ],
            )
            .map_err(|e| PipelineError::persist("clusters", e.to_string()))?;
        }
        tx.commit().map_err(|e| PipelineError::persist("clusters", e.to_string()))
    }

    /// Keywords for one analysis, highest opportunity first
    pub async fn top_keywords(
        &self,
        analysis_id: &str,
        limit: usize,
    ) -> PipelineResult<Vec<EnrichedKeyword>> {
        let conn = self.connection.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT keyword, intent, relevance, category, search_volume, cpc,
                        competition, competition_level, trend_json, opportunity_score,
                        serp_difficulty, source
                 FROM keywords WHERE analysis_id = ?1
                 ORDER BY opportunity_score DESC, search_volume DESC, keyword ASC
                 LIMIT ?2",
            )
            .map_err(|e| PipelineError::persist("keywords", e.to_string()))?;

        let rows = stmt
            .query_map(params![analysis_id, limit as i64], |row| {
                let intent: String = row.get(1)?;
                let relevance: String = row.get(2)?;
                let category: String = row.get(3)?;
                let volume: i64 = row.get(4)?;
                let level: String = row.get(7)?;
                let trend_json: String = row.get(8)?;
                let serp: Option<i64> = row.get(10)?;
                let source: String = row.get(11)?;
                Ok(EnrichedKeyword {
                    keyword: row.get(0)?,
                    intent: enum_parse(&intent, Default::default()),
                    relevance: enum_parse(&relevance, Default::default()),
                    category: enum_parse(&category, Default::default()),
                    search_volume: volume.max(0) as u64,
                    cpc: row.get(5)?,
                    competition: row.get(6)?,
                    competition_level: enum_parse(&level, crate::models::CompetitionLevel::Unknown),
                    trend: serde_json::from_str(&trend_json).unwrap_or_default(),
                    opportunity_score: row.get(9)?,
                    serp_difficulty: serp.map(|v| v.clamp(0, 100) as u8),
                    source: enum_parse(&source, crate::models::KeywordSource::Seed),
                })
            })
            .map_err(|e| PipelineError::persist("keywords", e.to_string()))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| PipelineError::persist("keywords", e.to_string()))
    }

    pub async fn clusters_for(&self, analysis_id: &str) -> PipelineResult<Vec<KeywordCluster>> {
        let conn = self.connection.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT topic, article_title, pillar_keyword, supporting_json,
                        search_intent, difficulty, total_volume, avg_competition
                 FROM clusters WHERE analysis_id = ?1 ORDER BY id",
            )
            .map_err(|e| PipelineError::persist("clusters", e.to_string()))?;

        let rows = stmt
            .query_map(params![analysis_id], |row| {
                let supporting_json: String = row.get(3)?;
                let intent: String = row.get(4)?;
                let difficulty: String = row.get(5)?;
                let volume: i64 = row.get(6)?;
                Ok(KeywordCluster {
                    topic: row.get(0)?,
                    article_title: row.get(1)?,
                    pillar_keyword: row.get(2)?,
                    supporting_keywords: serde_json::from_str(&supporting_json)
                        .unwrap_or_default(),
                    search_intent: enum_parse(&intent, Default::default()),
                    difficulty: enum_parse(&difficulty, crate::models::ClusterDifficulty::Medium),
                    total_volume: volume.max(0) as u64,
                    avg_competition: row.get(7)?,
                })
            })
            .map_err(|e| PipelineError::persist("clusters", e.to_string()))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| PipelineError::persist("clusters", e.to_string()))
    }

    /// Replace the stored page snapshot for a site
    pub async fn upsert_site_page(&self, crawl: &CrawlResult) -> PipelineResult<()> {
        let conn = self.connection.lock().await;
        conn.execute(
            "INSERT INTO site_pages (url, title, structured_text, fetched_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (url) DO UPDATE SET
                title = excluded.title,
                structured_text = excluded.structured_text,
                fetched_at = excluded.fetched_at",
            params![crawl.url, crawl.title, crawl.structured_text, Utc::now().timestamp()],
        )
        .map_err(|e| PipelineError::persist("site_pages", e.to_string()))?;
        Ok(())
    }

    pub async fn get_site_page(&self, url: &str) -> PipelineResult<Option<String>> {
        let conn = self.connection.lock().await;
        conn.query_row(
            "SELECT structured_text FROM site_pages WHERE url = ?1",
            params![url],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| PipelineError::persist("site_pages", e.to_string()))
    }
}

fn insert_keyword_batch(
    conn: &mut Connection,
    analysis_id: &str,
    batch: &[EnrichedKeyword],
) -> rusqlite::Result<()> {
    let tx = conn.transaction()?;
    for kw in batch {
        let trend_json = serde_json::to_string(&kw.trend).unwrap_or_else(|_| "[]".to_string());
        tx.execute(
            "INSERT INTO keywords (analysis_id, keyword, intent, relevance, category,
                search_volume, cpc, competition, competition_level, trend_json,
                opportunity_score, serp_difficulty, source)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                analysis_id,
                kw.keyword,
                enum_text(&kw.intent),
                enum_text(&kw.relevance),
                enum_text(&kw.category),
                kw.search_volume as i64,
                kw.cpc,
                kw.competition,
                enum_text(&kw.competition_level),
                trend_json,
                kw.opportunity_score,
                kw.serp_difficulty.map(i64::from),
                enum_text(&kw.source),
            ],
        )?;
    }
    tx.commit()
}

/// Serde rename of a unit enum variant, as stored in TEXT columns
fn enum_text<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => s,
        _ => String::new(),
    }
}

fn enum_parse<T: DeserializeOwned>(text: &str, fallback: T) -> T {
    serde_json::from_value(serde_json::Value::String(text.to_string())).unwrap_or(fallback)
}
