//! libSQL storage layer (local file).
//!
//! The [`Storage`] struct wraps a libSQL database holding saved source
//! configurations, extraction run history, the candidates each run produced,
//! and candidates promoted to deals.
//!
//! **Access rules:**
//! - the CLI `search`/`sources`/`candidates promote` paths: read-write via [`Storage::open`]
//! - listing commands: read-only via [`Storage::open_readonly`]

mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use dealscout_shared::{
    CandidateDeal, DealScoutError, Result, SourceConfiguration, SourceType, SubscriptionTier,
};
use libsql::{Connection, Database, params};
use serde::Serialize;
use uuid::Uuid;

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

fn storage_err(e: libsql::Error) -> DealScoutError {
    DealScoutError::Storage(e.to_string())
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DealScoutError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(DealScoutError::Storage(format!(
                "database not found at {} (run a search first)",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    DealScoutError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            // Table doesn't exist yet
            Err(_) => 0,
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(DealScoutError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Source configurations
    // -----------------------------------------------------------------------

    /// Save a new named configuration. Returns its id.
    pub async fn save_source_config(
        &self,
        name: &str,
        config: &SourceConfiguration,
    ) -> Result<String> {
        self.check_writable()?;
        let name = name.trim();
        if name.is_empty() {
            return Err(DealScoutError::validation("configuration name is required"));
        }
        if self.get_source_config(name).await?.is_some() {
            return Err(DealScoutError::validation(format!(
                "a configuration named '{name}' already exists"
            )));
        }

        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO source_configurations
                   (id, name, source_type, source_urls_json, include_keywords_json,
                    exclude_keywords_json, is_active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    id.as_str(),
                    name,
                    config.source_type.as_str(),
                    to_json(&config.source_urls)?,
                    to_json(&config.include_keywords)?,
                    to_json(&config.exclude_keywords)?,
                    i64::from(config.is_active),
                    now.as_str(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(storage_err)?;
        tracing::debug!(id = %id, name, "saved source configuration");
        Ok(id)
    }

    /// Look up a configuration by id or by name.
    pub async fn get_source_config(&self, key: &str) -> Result<Option<StoredSourceConfig>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, source_type, source_urls_json, include_keywords_json,
                        exclude_keywords_json, is_active, created_at, updated_at
                 FROM source_configurations WHERE id = ?1 OR name = ?1",
                params![key],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_source_config(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// List configurations by name, optionally only the active ones.
    pub async fn list_source_configs(&self, active_only: bool) -> Result<Vec<StoredSourceConfig>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, source_type, source_urls_json, include_keywords_json,
                        exclude_keywords_json, is_active, created_at, updated_at
                 FROM source_configurations
                 WHERE ?1 = 0 OR is_active = 1
                 ORDER BY name",
                params![i64::from(active_only)],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(row_to_source_config(&row)?);
        }
        Ok(results)
    }

    /// Activate or deactivate a configuration. Returns `false` if none matched.
    pub async fn set_source_active(&self, key: &str, active: bool) -> Result<bool> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let changed = self
            .conn
            .execute(
                "UPDATE source_configurations SET is_active = ?1, updated_at = ?2
                 WHERE id = ?3 OR name = ?3",
                params![i64::from(active), now.as_str(), key],
            )
            .await
            .map_err(storage_err)?;
        Ok(changed > 0)
    }

    /// Delete a configuration. Past runs keep their history.
    pub async fn delete_source_config(&self, key: &str) -> Result<bool> {
        self.check_writable()?;
        let Some(stored) = self.get_source_config(key).await? else {
            return Ok(false);
        };
        self.conn
            .execute(
                "UPDATE extraction_runs SET config_id = NULL WHERE config_id = ?1",
                params![stored.id.as_str()],
            )
            .await
            .map_err(storage_err)?;
        let removed = self
            .conn
            .execute(
                "DELETE FROM source_configurations WHERE id = ?1",
                params![stored.id.as_str()],
            )
            .await
            .map_err(storage_err)?;
        Ok(removed > 0)
    }

    // -----------------------------------------------------------------------
    // Extraction runs
    // -----------------------------------------------------------------------

    /// Record the start of a run.
    pub async fn insert_run(
        &self,
        run_id: &str,
        config_id: Option<&str>,
        source_type: SourceType,
        tier: SubscriptionTier,
    ) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO extraction_runs (id, config_id, source_type, tier, started_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    run_id,
                    config_id,
                    source_type.as_str(),
                    tier.as_str(),
                    now.as_str()
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Record how a run ended.
    pub async fn finish_run(&self, run_id: &str, status: &str, stats_json: &str) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE extraction_runs SET status = ?1, finished_at = ?2, stats_json = ?3
                 WHERE id = ?4",
                params![status, now.as_str(), stats_json, run_id],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    pub async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, config_id, source_type, tier, status, started_at, finished_at, stats_json
                 FROM extraction_runs WHERE id = ?1",
                params![run_id],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_run(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// Most recent runs first.
    pub async fn list_runs(&self, limit: u32) -> Result<Vec<RunRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, config_id, source_type, tier, status, started_at, finished_at, stats_json
                 FROM extraction_runs ORDER BY started_at DESC, id DESC LIMIT ?1",
                params![limit],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(row_to_run(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Candidates
    // -----------------------------------------------------------------------

    /// Store a run's candidates in run order. All or nothing: a failed
    /// insert leaves no rows behind for the run.
    pub async fn insert_candidates(
        &self,
        run_id: &str,
        candidates: &[CandidateDeal],
    ) -> Result<Vec<String>> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction().await.map_err(storage_err)?;
        let mut ids = Vec::with_capacity(candidates.len());

        let inserted = async {
            for (position, c) in candidates.iter().enumerate() {
                let id = Uuid::now_v7().to_string();
                tx.execute(
                    "INSERT INTO candidate_deals
                       (id, run_id, position, fingerprint, deal_name, company_name, amount,
                        company_url, contact_email, notes, confidence_score, source_url,
                        matched_keywords_json, relevance_score, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                    params![
                        id.as_str(),
                        run_id,
                        position as i64,
                        c.fingerprint(),
                        c.deal_name.as_str(),
                        c.company_name.as_str(),
                        c.amount,
                        c.company_url.as_str(),
                        c.contact_email.as_str(),
                        c.notes.as_str(),
                        c.confidence_score.map(i64::from),
                        c.source_url.as_str(),
                        to_json(&c.matched_keywords)?,
                        c.relevance_score,
                        now.as_str(),
                    ],
                )
                .await
                .map_err(storage_err)?;
                ids.push(id);
            }
            Ok::<(), DealScoutError>(())
        }
        .await;

        if let Err(e) = inserted {
            if let Err(rollback) = tx.rollback().await {
                tracing::warn!(run_id, error = %rollback, "rollback failed");
            }
            return Err(e);
        }
        tx.commit().await.map_err(storage_err)?;
        tracing::debug!(run_id, count = ids.len(), "stored candidates");
        Ok(ids)
    }

    /// Persist a finished run: its candidates, then its status and stats.
    ///
    /// If the candidates cannot be stored the run is marked `failed` with
    /// the error folded into its stats, and the storage error is returned.
    pub async fn store_results(
        &self,
        run_id: &str,
        candidates: &[CandidateDeal],
        status: &str,
        stats: serde_json::Value,
    ) -> Result<Vec<String>> {
        match self.insert_candidates(run_id, candidates).await {
            Ok(ids) => {
                self.finish_run(run_id, status, &stats.to_string()).await?;
                Ok(ids)
            }
            Err(e) => {
                self.fail_run(run_id, stats, &e.to_string()).await;
                Err(e)
            }
        }
    }

    /// Best-effort `failed` marker for a run that could not be completed.
    pub async fn fail_run(&self, run_id: &str, mut stats: serde_json::Value, error: &str) {
        if let Some(map) = stats.as_object_mut() {
            map.insert("error".into(), serde_json::Value::from(error));
        } else {
            stats = serde_json::json!({ "error": error });
        }
        if let Err(e) = self.finish_run(run_id, "failed", &stats.to_string()).await {
            tracing::warn!(run_id, error = %e, "could not mark run as failed");
        }
    }

    /// Candidates of one run, in run order.
    pub async fn list_candidates(&self, run_id: &str) -> Result<Vec<StoredCandidate>> {
        let mut rows = self
            .conn
            .query(
                &format!("{CANDIDATE_SELECT} WHERE run_id = ?1 ORDER BY position"),
                params![run_id],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(row_to_candidate(&row)?);
        }
        Ok(results)
    }

    pub async fn get_candidate(&self, id: &str) -> Result<Option<StoredCandidate>> {
        let mut rows = self
            .conn
            .query(&format!("{CANDIDATE_SELECT} WHERE id = ?1"), params![id])
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_candidate(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    // -----------------------------------------------------------------------
    // Deals
    // -----------------------------------------------------------------------

    /// Promote a stored candidate to a deal.
    ///
    /// A candidate whose fingerprint was already promoted (from this or any
    /// other run) is rejected with a validation error.
    pub async fn promote_candidate(&self, candidate_id: &str) -> Result<DealRecord> {
        self.check_writable()?;
        let stored = self.get_candidate(candidate_id).await?.ok_or_else(|| {
            DealScoutError::validation(format!("no candidate with id '{candidate_id}'"))
        })?;

        if let Some(existing) = self.get_deal_by_fingerprint(&stored.fingerprint).await? {
            return Err(DealScoutError::validation(format!(
                "'{}' was already promoted as deal {}",
                stored.candidate.deal_name, existing.id
            )));
        }

        let deal = DealRecord {
            id: Uuid::now_v7().to_string(),
            candidate_id: Some(stored.id.clone()),
            fingerprint: stored.fingerprint.clone(),
            deal_name: stored.candidate.deal_name.clone(),
            company_name: stored.candidate.company_name.clone(),
            amount: stored.candidate.amount,
            source_url: stored.candidate.source_url.clone(),
            stage: "sourced".into(),
            created_at: Utc::now(),
        };
        self.conn
            .execute(
                "INSERT INTO deals
                   (id, candidate_id, fingerprint, deal_name, company_name, amount, source_url,
                    stage, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    deal.id.as_str(),
                    deal.candidate_id.as_deref(),
                    deal.fingerprint.as_str(),
                    deal.deal_name.as_str(),
                    deal.company_name.as_str(),
                    deal.amount,
                    deal.source_url.as_str(),
                    deal.stage.as_str(),
                    deal.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(storage_err)?;
        tracing::info!(deal_id = %deal.id, candidate_id, "promoted candidate");
        Ok(deal)
    }

    async fn get_deal_by_fingerprint(&self, fingerprint: &str) -> Result<Option<DealRecord>> {
        let mut rows = self
            .conn
            .query(
                &format!("{DEAL_SELECT} WHERE fingerprint = ?1"),
                params![fingerprint],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_deal(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// All deals, newest first.
    pub async fn list_deals(&self) -> Result<Vec<DealRecord>> {
        let mut rows = self
            .conn
            .query(
                &format!("{DEAL_SELECT} ORDER BY created_at DESC, id DESC"),
                params![],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(row_to_deal(&row)?);
        }
        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A named, persisted [`SourceConfiguration`].
#[derive(Debug, Clone, Serialize)]
pub struct StoredSourceConfig {
    pub id: String,
    pub name: String,
    pub config: SourceConfiguration,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One extraction run.
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub id: String,
    pub config_id: Option<String>,
    pub source_type: SourceType,
    pub tier: SubscriptionTier,
    /// `None` while the run is in flight.
    pub status: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub stats_json: Option<String>,
}

/// A candidate as stored for a run.
#[derive(Debug, Clone, Serialize)]
pub struct StoredCandidate {
    pub id: String,
    pub run_id: String,
    pub position: usize,
    pub fingerprint: String,
    pub candidate: CandidateDeal,
}

/// A promoted deal.
#[derive(Debug, Clone, Serialize)]
pub struct DealRecord {
    pub id: String,
    pub candidate_id: Option<String>,
    pub fingerprint: String,
    pub deal_name: String,
    pub company_name: String,
    pub amount: f64,
    pub source_url: String,
    pub stage: String,
    pub created_at: DateTime<Utc>,
}

const CANDIDATE_SELECT: &str = "SELECT id, run_id, position, fingerprint, deal_name, company_name, amount,
        company_url, contact_email, notes, confidence_score, source_url,
        matched_keywords_json, relevance_score
 FROM candidate_deals";

const DEAL_SELECT: &str = "SELECT id, candidate_id, fingerprint, deal_name, company_name, amount,
        source_url, stage, created_at
 FROM deals";

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| DealScoutError::Storage(e.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(s: &str) -> Result<T> {
    serde_json::from_str(s).map_err(|e| DealScoutError::Storage(format!("corrupt JSON column: {e}")))
}

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DealScoutError::Storage(format!("invalid date: {e}")))
}

fn row_to_source_config(row: &libsql::Row) -> Result<StoredSourceConfig> {
    let source_type: String = row.get(2).map_err(storage_err)?;
    let urls: String = row.get(3).map_err(storage_err)?;
    let include: String = row.get(4).map_err(storage_err)?;
    let exclude: String = row.get(5).map_err(storage_err)?;
    let created: String = row.get(7).map_err(storage_err)?;
    let updated: String = row.get(8).map_err(storage_err)?;

    Ok(StoredSourceConfig {
        id: row.get::<String>(0).map_err(storage_err)?,
        name: row.get::<String>(1).map_err(storage_err)?,
        config: SourceConfiguration {
            source_type: source_type.parse()?,
            source_urls: from_json(&urls)?,
            include_keywords: from_json(&include)?,
            exclude_keywords: from_json(&exclude)?,
            is_active: row.get::<i64>(6).map_err(storage_err)? != 0,
        },
        created_at: parse_time(&created)?,
        updated_at: parse_time(&updated)?,
    })
}

fn row_to_run(row: &libsql::Row) -> Result<RunRecord> {
    let source_type: String = row.get(2).map_err(storage_err)?;
    let tier: String = row.get(3).map_err(storage_err)?;
    let started: String = row.get(5).map_err(storage_err)?;

    Ok(RunRecord {
        id: row.get::<String>(0).map_err(storage_err)?,
        config_id: row.get::<String>(1).ok(),
        source_type: source_type.parse()?,
        tier: tier.parse()?,
        status: row.get::<String>(4).ok(),
        started_at: parse_time(&started)?,
        finished_at: row
            .get::<String>(6)
            .ok()
            .map(|s| parse_time(&s))
            .transpose()?,
        stats_json: row.get::<String>(7).ok(),
    })
}

fn row_to_candidate(row: &libsql::Row) -> Result<StoredCandidate> {
    let keywords: String = row.get(12).map_err(storage_err)?;

    Ok(StoredCandidate {
        id: row.get::<String>(0).map_err(storage_err)?,
        run_id: row.get::<String>(1).map_err(storage_err)?,
        position: row.get::<i64>(2).map_err(storage_err)? as usize,
        fingerprint: row.get::<String>(3).map_err(storage_err)?,
        candidate: CandidateDeal {
            deal_name: row.get::<String>(4).map_err(storage_err)?,
            company_name: row.get::<String>(5).map_err(storage_err)?,
            amount: row.get::<f64>(6).map_err(storage_err)?,
            company_url: row.get::<String>(7).map_err(storage_err)?,
            contact_email: row.get::<String>(8).map_err(storage_err)?,
            notes: row.get::<String>(9).map_err(storage_err)?,
            confidence_score: row.get::<i64>(10).ok().map(|v| v.clamp(0, 100) as u8),
            source_url: row.get::<String>(11).map_err(storage_err)?,
            matched_keywords: from_json(&keywords)?,
            relevance_score: row.get::<f64>(13).ok(),
        },
    })
}

fn row_to_deal(row: &libsql::Row) -> Result<DealRecord> {
    let created: String = row.get(8).map_err(storage_err)?;

    Ok(DealRecord {
        id: row.get::<String>(0).map_err(storage_err)?,
        candidate_id: row.get::<String>(1).ok(),
        fingerprint: row.get::<String>(2).map_err(storage_err)?,
        deal_name: row.get::<String>(3).map_err(storage_err)?,
        company_name: row.get::<String>(4).map_err(storage_err)?,
        amount: row.get::<f64>(5).map_err(storage_err)?,
        source_url: row.get::<String>(6).map_err(storage_err)?,
        stage: row.get::<String>(7).map_err(storage_err)?,
        created_at: parse_time(&created)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("ds_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn config() -> SourceConfiguration {
        SourceConfiguration::new(
            SourceType::Website,
            vec!["https://a.example".into(), "https://b.example".into()],
            vec!["SaaS".into(), "fintech".into()],
            vec!["crypto".into()],
        )
    }

    fn candidate(name: &str, source: &str) -> CandidateDeal {
        CandidateDeal {
            deal_name: name.into(),
            company_name: format!("{name} Inc"),
            amount: 1_500_000.0,
            confidence_score: Some(80),
            source_url: source.into(),
            matched_keywords: vec!["SaaS".into()],
            relevance_score: Some(50.0),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 2);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("ds_test_{}.db", Uuid::now_v7()));
        let s1 = Storage::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 2);
    }

    #[tokio::test]
    async fn source_config_crud() {
        let storage = test_storage().await;
        let id = storage
            .save_source_config("weekly saas", &config())
            .await
            .expect("save");

        let by_id = storage.get_source_config(&id).await.unwrap().unwrap();
        let by_name = storage
            .get_source_config("weekly saas")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_id.id, by_name.id);
        assert_eq!(by_id.config, config());

        let dup = storage.save_source_config("weekly saas", &config()).await;
        assert!(dup.unwrap_err().is_validation());

        assert!(storage.set_source_active(&id, false).await.unwrap());
        assert!(storage.list_source_configs(true).await.unwrap().is_empty());
        assert_eq!(storage.list_source_configs(false).await.unwrap().len(), 1);
        assert!(!storage.set_source_active("missing", true).await.unwrap());

        assert!(storage.delete_source_config("weekly saas").await.unwrap());
        assert!(storage.get_source_config(&id).await.unwrap().is_none());
        assert!(!storage.delete_source_config(&id).await.unwrap());
    }

    #[tokio::test]
    async fn run_lifecycle() {
        let storage = test_storage().await;
        let run_id = Uuid::now_v7().to_string();
        storage
            .insert_run(&run_id, None, SourceType::Api, SubscriptionTier::Pro)
            .await
            .expect("insert run");

        let open = storage.get_run(&run_id).await.unwrap().unwrap();
        assert!(open.status.is_none());
        assert!(open.finished_at.is_none());
        assert_eq!(open.tier, SubscriptionTier::Pro);

        storage
            .finish_run(&run_id, "completed", r#"{"candidates": 4}"#)
            .await
            .expect("finish run");
        let done = storage.get_run(&run_id).await.unwrap().unwrap();
        assert_eq!(done.status.as_deref(), Some("completed"));
        assert!(done.finished_at.is_some());
        assert!(done.stats_json.unwrap().contains("candidates"));

        assert_eq!(storage.list_runs(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn deleting_config_keeps_run_history() {
        let storage = test_storage().await;
        let config_id = storage.save_source_config("c", &config()).await.unwrap();
        let run_id = Uuid::now_v7().to_string();
        storage
            .insert_run(&run_id, Some(&config_id), SourceType::Website, SubscriptionTier::Free)
            .await
            .unwrap();

        storage.delete_source_config(&config_id).await.unwrap();
        let run = storage.get_run(&run_id).await.unwrap().unwrap();
        assert!(run.config_id.is_none());
    }

    #[tokio::test]
    async fn candidates_keep_run_order() {
        let storage = test_storage().await;
        let run_id = Uuid::now_v7().to_string();
        storage
            .insert_run(&run_id, None, SourceType::Website, SubscriptionTier::Free)
            .await
            .unwrap();

        let input = vec![
            candidate("Zeta", "https://a.example"),
            candidate("Alpha", "https://a.example"),
            candidate("Mid", "https://b.example"),
        ];
        let ids = storage.insert_candidates(&run_id, &input).await.unwrap();
        assert_eq!(ids.len(), 3);

        let stored = storage.list_candidates(&run_id).await.unwrap();
        let names: Vec<_> = stored.iter().map(|s| s.candidate.deal_name.as_str()).collect();
        assert_eq!(names, vec!["Zeta", "Alpha", "Mid"]);
        assert_eq!(stored[0].candidate, input[0]);
        assert_eq!(stored[0].fingerprint, input[0].fingerprint());
    }

    /// A run whose position 1 slot is already taken, so a multi-candidate
    /// insert fails after its first row.
    async fn run_with_taken_position(storage: &Storage) -> String {
        let run_id = Uuid::now_v7().to_string();
        storage
            .insert_run(&run_id, None, SourceType::Website, SubscriptionTier::Free)
            .await
            .unwrap();
        storage
            .insert_candidates(
                &run_id,
                &[candidate("Seed", "https://a.example"), candidate("Kept", "https://a.example")],
            )
            .await
            .unwrap();
        storage
            .conn
            .execute(
                "DELETE FROM candidate_deals WHERE run_id = ?1 AND position = 0",
                params![run_id.as_str()],
            )
            .await
            .unwrap();
        run_id
    }

    #[tokio::test]
    async fn failed_candidate_insert_leaves_no_partial_rows() {
        let storage = test_storage().await;
        let run_id = run_with_taken_position(&storage).await;

        let input = vec![
            candidate("First", "https://a.example"),
            candidate("Clash", "https://a.example"),
            candidate("Last", "https://b.example"),
        ];
        let err = storage.insert_candidates(&run_id, &input).await.unwrap_err();
        assert!(matches!(err, DealScoutError::Storage(_)));

        let stored = storage.list_candidates(&run_id).await.unwrap();
        let names: Vec<_> = stored.iter().map(|s| s.candidate.deal_name.as_str()).collect();
        assert_eq!(names, vec!["Kept"]);
    }

    #[tokio::test]
    async fn store_results_finishes_run() {
        let storage = test_storage().await;
        let run_id = Uuid::now_v7().to_string();
        storage
            .insert_run(&run_id, None, SourceType::Website, SubscriptionTier::Free)
            .await
            .unwrap();

        let ids = storage
            .store_results(
                &run_id,
                &[candidate("Alpha", "https://a.example")],
                "completed",
                serde_json::json!({"candidates": 1}),
            )
            .await
            .unwrap();
        assert_eq!(ids.len(), 1);

        let run = storage.get_run(&run_id).await.unwrap().unwrap();
        assert_eq!(run.status.as_deref(), Some("completed"));
        assert!(run.finished_at.is_some());
    }

    #[tokio::test]
    async fn store_results_marks_run_failed_when_insert_fails() {
        let storage = test_storage().await;
        let run_id = run_with_taken_position(&storage).await;

        let input = vec![
            candidate("First", "https://a.example"),
            candidate("Clash", "https://a.example"),
        ];
        let result = storage
            .store_results(&run_id, &input, "completed", serde_json::json!({"candidates": 2}))
            .await;
        assert!(result.is_err());

        let run = storage.get_run(&run_id).await.unwrap().unwrap();
        assert_eq!(run.status.as_deref(), Some("failed"));
        assert!(run.finished_at.is_some());
        let stats = run.stats_json.unwrap();
        assert!(stats.contains("\"candidates\":2"));
        assert!(stats.contains("error"));
    }

    #[tokio::test]
    async fn promotion_is_rejected_for_known_fingerprint() {
        let storage = test_storage().await;
        let (run_a, run_b) = (Uuid::now_v7().to_string(), Uuid::now_v7().to_string());
        for run in [&run_a, &run_b] {
            storage
                .insert_run(run, None, SourceType::Website, SubscriptionTier::Free)
                .await
                .unwrap();
        }
        let same = candidate("Acme Seed", "https://a.example");
        let first = storage.insert_candidates(&run_a, &[same.clone()]).await.unwrap();
        let second = storage.insert_candidates(&run_b, &[same]).await.unwrap();

        let deal = storage.promote_candidate(&first[0]).await.expect("promote");
        assert_eq!(deal.deal_name, "Acme Seed");
        assert_eq!(deal.stage, "sourced");

        let err = storage.promote_candidate(&second[0]).await.unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("already promoted"));

        let deals = storage.list_deals().await.unwrap();
        assert_eq!(deals.len(), 1);
        assert_eq!(deals[0].candidate_id.as_deref(), Some(first[0].as_str()));
    }

    #[tokio::test]
    async fn promoting_unknown_candidate_fails() {
        let storage = test_storage().await;
        let err = storage.promote_candidate("nope").await.unwrap_err();
        assert!(err.to_string().contains("no candidate"));
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("ds_test_{}.db", Uuid::now_v7()));
        let rw = Storage::open(&tmp).await.unwrap();
        rw.save_source_config("first", &config()).await.unwrap();
        drop(rw);

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        assert_eq!(ro.list_source_configs(false).await.unwrap().len(), 1);
        let result = ro.save_source_config("second", &config()).await;
        assert!(result.unwrap_err().to_string().contains("read-only"));
    }

    #[tokio::test]
    async fn readonly_requires_existing_file() {
        let tmp = std::env::temp_dir().join(format!("ds_missing_{}.db", Uuid::now_v7()));
        assert!(Storage::open_readonly(&tmp).await.is_err());
    }
}
