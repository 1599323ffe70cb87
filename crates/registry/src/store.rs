//! SQLite-backed registry store.
//!
//! Agents table: (id, version, name, description, primitive, supports_memory,
//! owner, tags, spec_json, created_at, archived), primary key (id, version).
//!
//! The store owns a `tokio::sync::watch` channel carrying a monotonically
//! increasing registry version; every mutation bumps it. Consumers (the SSE
//! update stream) subscribe instead of polling a process-global counter.

use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use agentgate_core::agent::{AgentDefinition, Credits};

use crate::spec::{normalize_spec, parse_preset_toml};
use crate::RegistryError;

/// A summary row for listing endpoints (no schemas or prompt).
#[derive(Debug, Clone, serde::Serialize)]
pub struct AgentSummary {
    pub id: String,
    pub version: String,
    pub name: String,
    pub description: String,
    pub primitive: String,
    pub supports_memory: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    pub created_at: i64,
    pub archived: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credits: Option<Credits>,
}

/// Filters for [`RegistryStore::list`].
#[derive(Debug, Clone)]
pub struct ListFilter {
    /// Case-insensitive substring match on id, name, or description
    pub q: Option<String>,
    pub primitive: Option<String>,
    pub supports_memory: Option<bool>,
    /// Keep only the newest version per id
    pub latest_only: bool,
    pub include_archived: bool,
}

impl Default for ListFilter {
    fn default() -> Self {
        Self {
            q: None,
            primitive: None,
            supports_memory: None,
            latest_only: true,
            include_archived: false,
        }
    }
}

/// The SQLite-backed agent registry.
pub struct RegistryStore {
    pool: SqlitePool,
    version_tx: watch::Sender<u64>,
}

impl RegistryStore {
    /// Open (or create) the registry at the given SQLite path.
    pub async fn new(path: &str) -> Result<Self, RegistryError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| RegistryError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        // In-memory databases are per-connection; a pool of one keeps a
        // single shared database alive for tests.
        let max_connections = if path.contains(":memory:") { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| RegistryError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self::from_pool(pool).await?;
        info!("Registry store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, RegistryError> {
        let (version_tx, _) = watch::channel(0u64);
        let store = Self { pool, version_tx };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), RegistryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS agents (
                id              TEXT NOT NULL,
                version         TEXT NOT NULL,
                name            TEXT NOT NULL,
                description     TEXT NOT NULL,
                primitive       TEXT NOT NULL,
                supports_memory INTEGER NOT NULL,
                owner           TEXT,
                tags            TEXT,
                spec_json       TEXT NOT NULL,
                created_at      INTEGER NOT NULL,
                archived        INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (id, version)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| RegistryError::Storage(format!("agents table: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_agents_id ON agents (id)")
            .execute(&self.pool)
            .await
            .map_err(|e| RegistryError::Storage(format!("agents index: {e}")))?;

        debug!("Registry migrations complete");
        Ok(())
    }

    // ── Change notification ────────────────────────────────────────────

    /// The current registry version (bumped on every mutation).
    pub fn registry_version(&self) -> u64 {
        *self.version_tx.borrow()
    }

    /// Subscribe to registry version changes.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version_tx.subscribe()
    }

    fn touch(&self) {
        self.version_tx.send_modify(|v| *v += 1);
    }

    // ── Mutations ──────────────────────────────────────────────────────

    /// Validate and register an agent spec. Returns (id, version).
    ///
    /// When `owner` is known and the id already belongs to a different
    /// owner, registration is refused.
    pub async fn register(
        &self,
        raw_spec: &Value,
        owner: Option<&str>,
    ) -> Result<(String, String), RegistryError> {
        let agent = normalize_spec(raw_spec)?;

        if let Some(owner) = owner {
            let rows = sqlx::query("SELECT DISTINCT owner FROM agents WHERE id = ?1")
                .bind(&agent.id)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| RegistryError::Storage(format!("owner lookup: {e}")))?;
            let existing_owners: Vec<String> = rows
                .iter()
                .filter_map(|row| row.try_get::<Option<String>, _>("owner").ok().flatten())
                .collect();
            if !existing_owners.is_empty() && !existing_owners.iter().any(|o| o == owner) {
                return Err(RegistryError::NotOwner);
            }
        }

        let exists = sqlx::query("SELECT 1 FROM agents WHERE id = ?1 AND version = ?2")
            .bind(&agent.id)
            .bind(&agent.version)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RegistryError::Storage(format!("version lookup: {e}")))?;
        if exists.is_some() {
            return Err(RegistryError::VersionExists {
                id: agent.id,
                version: agent.version,
            });
        }

        self.insert(&agent, owner).await?;
        self.touch();
        Ok((agent.id, agent.version))
    }

    /// Archive or unarchive versions of an agent.
    ///
    /// `version: None` affects every version of the id. Returns `false`
    /// when no matching rows exist.
    pub async fn set_archived(
        &self,
        id: &str,
        version: Option<&str>,
        archived: bool,
        owner: Option<&str>,
    ) -> Result<bool, RegistryError> {
        if let Some(owner) = owner {
            let rows = sqlx::query("SELECT DISTINCT owner FROM agents WHERE id = ?1")
                .bind(id)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| RegistryError::Storage(format!("owner lookup: {e}")))?;
            let foreign = rows.iter().any(|row| {
                row.try_get::<Option<String>, _>("owner")
                    .ok()
                    .flatten()
                    .is_some_and(|o| o != owner)
            });
            if foreign {
                return Err(RegistryError::NotOwner);
            }
        }

        let result = match version {
            Some(version) => {
                sqlx::query("UPDATE agents SET archived = ?1 WHERE id = ?2 AND version = ?3")
                    .bind(archived as i64)
                    .bind(id)
                    .bind(version)
                    .execute(&self.pool)
                    .await
            }
            None => {
                sqlx::query("UPDATE agents SET archived = ?1 WHERE id = ?2")
                    .bind(archived as i64)
                    .bind(id)
                    .execute(&self.pool)
                    .await
            }
        }
        .map_err(|e| RegistryError::Storage(format!("UPDATE archived: {e}")))?;

        let changed = result.rows_affected() > 0;
        if changed {
            self.touch();
        }
        Ok(changed)
    }

    // ── Queries ────────────────────────────────────────────────────────

    /// Resolve an agent definition.
    ///
    /// With an explicit version the exact row is returned (archived or not);
    /// without one, the newest non-archived version wins.
    pub async fn resolve(
        &self,
        id: &str,
        version: Option<&str>,
    ) -> Result<Option<AgentDefinition>, RegistryError> {
        let row = match version {
            Some(version) => {
                sqlx::query("SELECT spec_json FROM agents WHERE id = ?1 AND version = ?2")
                    .bind(id)
                    .bind(version)
                    .fetch_optional(&self.pool)
                    .await
            }
            None => {
                sqlx::query(
                    "SELECT spec_json FROM agents WHERE id = ?1 AND archived = 0 \
                     ORDER BY created_at DESC, rowid DESC LIMIT 1",
                )
                .bind(id)
                .fetch_optional(&self.pool)
                .await
            }
        }
        .map_err(|e| RegistryError::Storage(format!("SELECT agent: {e}")))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let spec_json: String = row
            .try_get("spec_json")
            .map_err(|e| RegistryError::Storage(format!("spec_json column: {e}")))?;
        let agent = serde_json::from_str(&spec_json)
            .map_err(|e| RegistryError::Storage(format!("stored spec is corrupt: {e}")))?;
        Ok(Some(agent))
    }

    /// List agents matching the filter.
    pub async fn list(&self, filter: &ListFilter) -> Result<Vec<AgentSummary>, RegistryError> {
        let mut clauses: Vec<String> = Vec::new();
        let mut q_like: Option<String> = None;

        if let Some(q) = &filter.q {
            q_like = Some(format!("%{}%", q.to_lowercase()));
            clauses.push(
                "(LOWER(name) LIKE ?1 OR LOWER(description) LIKE ?1 OR LOWER(id) LIKE ?1)".into(),
            );
        }
        if filter.primitive.is_some() {
            clauses.push(format!("primitive = ?{}", if q_like.is_some() { 2 } else { 1 }));
        }
        if let Some(supports) = filter.supports_memory {
            clauses.push(format!("supports_memory = {}", supports as i64));
        }
        if !filter.include_archived {
            clauses.push("archived = 0".into());
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let sql = format!(
            "SELECT id, version, name, description, primitive, supports_memory, tags, \
             spec_json, created_at, archived FROM agents {where_sql} \
             ORDER BY id, created_at DESC, rowid DESC"
        );

        let mut query = sqlx::query(&sql);
        if let Some(q_like) = &q_like {
            query = query.bind(q_like);
        }
        if let Some(primitive) = &filter.primitive {
            query = query.bind(primitive);
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RegistryError::Storage(format!("SELECT agents: {e}")))?;

        let mut summaries = Vec::with_capacity(rows.len());
        let mut last_id: Option<String> = None;
        for row in &rows {
            let id: String = row
                .try_get("id")
                .map_err(|e| RegistryError::Storage(format!("id column: {e}")))?;
            // Rows arrive newest-first within each id; in latest_only mode
            // everything after the first row of an id is dropped.
            if filter.latest_only && last_id.as_deref() == Some(id.as_str()) {
                continue;
            }
            last_id = Some(id.clone());
            summaries.push(Self::row_to_summary(row, id)?);
        }
        Ok(summaries)
    }

    /// Total number of registered (id, version) rows.
    pub async fn count(&self) -> Result<u64, RegistryError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM agents")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| RegistryError::Storage(format!("COUNT agents: {e}")))?;
        let n: i64 = row
            .try_get("n")
            .map_err(|e| RegistryError::Storage(format!("count column: {e}")))?;
        Ok(n as u64)
    }

    /// Seed the registry from a directory of preset TOML files.
    ///
    /// Files that fail validation abort the seed (a malformed preset is a
    /// deployment error, not something to skip silently); (id, version)
    /// pairs already present are left untouched. Returns how many presets
    /// were inserted.
    pub async fn seed_from_presets(&self, dir: &Path) -> Result<usize, RegistryError> {
        if !dir.is_dir() {
            warn!("Preset directory {} does not exist, skipping seed", dir.display());
            return Ok(0);
        }

        let mut paths: Vec<_> = std::fs::read_dir(dir)
            .map_err(|e| RegistryError::Storage(format!("read presets dir: {e}")))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
            .collect();
        paths.sort();

        let mut inserted = 0usize;
        for path in paths {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| RegistryError::Storage(format!("read {}: {e}", path.display())))?;
            let agent = parse_preset_toml(&content).map_err(|e| match e {
                RegistryError::SpecInvalid { message, details } => RegistryError::SpecInvalid {
                    message: format!("{}: {message}", path.display()),
                    details,
                },
                other => other,
            })?;

            if self.resolve(&agent.id, Some(&agent.version)).await?.is_some() {
                continue;
            }
            self.insert(&agent, None).await?;
            inserted += 1;
            debug!(agent = %agent.id, version = %agent.version, "Seeded preset");
        }

        if inserted > 0 {
            self.touch();
            info!(count = inserted, "Seeded presets into registry");
        }
        Ok(inserted)
    }

    // ── Internal ───────────────────────────────────────────────────────

    async fn insert(&self, agent: &AgentDefinition, owner: Option<&str>) -> Result<(), RegistryError> {
        let spec_json = serde_json::to_string(agent)
            .map_err(|e| RegistryError::Storage(format!("spec serialization: {e}")))?;
        let tags_json = match &agent.tags {
            Some(tags) => Some(
                serde_json::to_string(tags)
                    .map_err(|e| RegistryError::Storage(format!("tags serialization: {e}")))?,
            ),
            None => None,
        };
        let created_at = chrono::Utc::now().timestamp_micros();

        sqlx::query(
            r#"
            INSERT INTO agents (
                id, version, name, description, primitive,
                supports_memory, owner, tags, spec_json, created_at, archived
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 0)
            "#,
        )
        .bind(&agent.id)
        .bind(&agent.version)
        .bind(&agent.name)
        .bind(&agent.description)
        .bind(&agent.primitive)
        .bind(agent.supports_memory as i64)
        .bind(owner)
        .bind(&tags_json)
        .bind(&spec_json)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RegistryError::Storage(format!("INSERT agent failed: {e}")))?;
        Ok(())
    }

    fn row_to_summary(row: &sqlx::sqlite::SqliteRow, id: String) -> Result<AgentSummary, RegistryError> {
        let col = |e: sqlx::Error| RegistryError::Storage(format!("summary column: {e}"));
        let tags_json: Option<String> = row.try_get("tags").map_err(col)?;
        let tags = tags_json.and_then(|raw| serde_json::from_str(&raw).ok());
        let spec_json: String = row.try_get("spec_json").map_err(col)?;
        let credits = serde_json::from_str::<AgentDefinition>(&spec_json)
            .ok()
            .and_then(|agent| agent.credits);

        Ok(AgentSummary {
            id,
            version: row.try_get("version").map_err(col)?,
            name: row.try_get("name").map_err(col)?,
            description: row.try_get("description").map_err(col)?,
            primitive: row.try_get("primitive").map_err(col)?,
            supports_memory: row.try_get::<i64, _>("supports_memory").map_err(col)? != 0,
            tags,
            created_at: row.try_get("created_at").map_err(col)?,
            archived: row.try_get::<i64, _>("archived").map_err(col)? != 0,
            credits,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn spec(id: &str, version: &str) -> Value {
        json!({
            "id": id,
            "version": version,
            "name": format!("Agent {id}"),
            "description": "test agent",
            "primitive": "transform",
            "prompt": "Do the thing.",
            "input_schema": {"type": "object", "properties": {"text": {"type": "string"}}},
            "output_schema": {"type": "object", "properties": {"summary": {"type": "string"}}}
        })
    }

    async fn test_store() -> RegistryStore {
        RegistryStore::new("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn register_and_resolve() {
        let store = test_store().await;
        let (id, version) = store.register(&spec("summarizer", "0.1.0"), None).await.unwrap();
        assert_eq!(id, "summarizer");
        assert_eq!(version, "0.1.0");

        let agent = store.resolve("summarizer", None).await.unwrap().unwrap();
        assert_eq!(agent.version, "0.1.0");
        assert!(store.resolve("missing", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_version_is_rejected() {
        let store = test_store().await;
        store.register(&spec("summarizer", "0.1.0"), None).await.unwrap();
        let err = store
            .register(&spec("summarizer", "0.1.0"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::VersionExists { .. }));
    }

    #[tokio::test]
    async fn resolve_without_version_picks_newest() {
        let store = test_store().await;
        store.register(&spec("summarizer", "0.1.0"), None).await.unwrap();
        store.register(&spec("summarizer", "0.2.0"), None).await.unwrap();

        let agent = store.resolve("summarizer", None).await.unwrap().unwrap();
        assert_eq!(agent.version, "0.2.0");

        let pinned = store
            .resolve("summarizer", Some("0.1.0"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pinned.version, "0.1.0");
    }

    #[tokio::test]
    async fn archived_versions_are_skipped_when_unpinned() {
        let store = test_store().await;
        store.register(&spec("summarizer", "0.1.0"), None).await.unwrap();
        store.register(&spec("summarizer", "0.2.0"), None).await.unwrap();

        let changed = store
            .set_archived("summarizer", Some("0.2.0"), true, None)
            .await
            .unwrap();
        assert!(changed);

        let agent = store.resolve("summarizer", None).await.unwrap().unwrap();
        assert_eq!(agent.version, "0.1.0");
    }

    #[tokio::test]
    async fn ownership_blocks_foreign_registration() {
        let store = test_store().await;
        store
            .register(&spec("summarizer", "0.1.0"), Some("alice"))
            .await
            .unwrap();

        let err = store
            .register(&spec("summarizer", "0.2.0"), Some("bob"))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::NotOwner));

        // Same owner may add versions.
        store
            .register(&spec("summarizer", "0.2.0"), Some("alice"))
            .await
            .unwrap();

        // Anonymous callers are not subject to ownership checks.
        store
            .register(&spec("summarizer", "0.3.0"), None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn list_filters_and_latest_only() {
        let store = test_store().await;
        store.register(&spec("summarizer", "0.1.0"), None).await.unwrap();
        store.register(&spec("summarizer", "0.2.0"), None).await.unwrap();
        let mut extract = spec("extractor", "1.0.0");
        extract["primitive"] = json!("extract");
        store.register(&extract, None).await.unwrap();

        let all = store.list(&ListFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2); // latest_only collapses summarizer versions
        let summarizer = all.iter().find(|a| a.id == "summarizer").unwrap();
        assert_eq!(summarizer.version, "0.2.0");

        let extractors = store
            .list(&ListFilter {
                primitive: Some("extract".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(extractors.len(), 1);
        assert_eq!(extractors[0].id, "extractor");

        let hits = store
            .list(&ListFilter {
                q: Some("SUMMAR".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);

        let every_version = store
            .list(&ListFilter {
                latest_only: false,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(every_version.len(), 3);
    }

    #[tokio::test]
    async fn watch_channel_observes_mutations() {
        let store = test_store().await;
        let rx = store.subscribe();
        assert_eq!(*rx.borrow(), 0);

        store.register(&spec("summarizer", "0.1.0"), None).await.unwrap();
        assert_eq!(store.registry_version(), 1);
        assert_eq!(*rx.borrow(), 1);

        store
            .set_archived("summarizer", None, true, None)
            .await
            .unwrap();
        assert_eq!(store.registry_version(), 2);
    }

    #[tokio::test]
    async fn seed_from_presets_inserts_once() {
        let store = test_store().await;
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("summarizer.toml")).unwrap();
        write!(
            file,
            r#"
id = "summarizer"
version = "0.1.0"
name = "Summarizer"
description = "Summarizes text"
primitive = "transform"
prompt = "Summarize the input."

[input_schema]
type = "object"
required = ["text"]
[input_schema.properties.text]
type = "string"

[output_schema]
type = "object"
required = ["summary"]
[output_schema.properties.summary]
type = "string"
"#
        )
        .unwrap();

        let inserted = store.seed_from_presets(dir.path()).await.unwrap();
        assert_eq!(inserted, 1);
        assert!(store.resolve("summarizer", None).await.unwrap().is_some());

        // Idempotent on the second pass.
        let inserted = store.seed_from_presets(dir.path()).await.unwrap();
        assert_eq!(inserted, 0);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn seeding_missing_directory_is_a_noop() {
        let store = test_store().await;
        let inserted = store
            .seed_from_presets(Path::new("/nonexistent/presets"))
            .await
            .unwrap();
        assert_eq!(inserted, 0);
    }
}
