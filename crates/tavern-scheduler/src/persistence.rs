//! SQLite-backed persistence for campaigns, submissions, votes, tenant
//! settings and the action log. Survives restarts.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tavern_core::error::{Result, TavernError};
use tavern_core::traits::{ActionLog, ActionRecord, WorkflowStore};
use tavern_core::types::{Submission, TenantSettings, Vote, VoteTally, Workflow, WorkflowStatus};

/// Shared SELECT column list for workflow queries.
const WORKFLOW_SELECT: &str = "SELECT id, tenant_id, title, number, description, open_submissions_at, start_voting_at, end_at, status, created_at, updated_at FROM workflows";

const SUBMISSION_SELECT: &str = "SELECT id, workflow_id, participant_id, channel_id, message_id, artifact_url, created_at FROM submissions";

/// SQLite workflow store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(db_err("DB open"))?;
        // WAL lets handlers read while a tick writes.
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;")
            .map_err(db_err("DB pragma"))?;
        Self::with_connection(conn)
    }

    /// Private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err("DB open"))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let store = Self { conn: Mutex::new(conn) };
        store.migrate()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| TavernError::store("connection mutex poisoned"))
    }

    /// Run migrations to create tables.
    fn migrate(&self) -> Result<()> {
        self.conn()?
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS workflows (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                title TEXT NOT NULL,
                number INTEGER NOT NULL DEFAULT 0,
                description TEXT NOT NULL DEFAULT '',
                open_submissions_at TEXT,
                start_voting_at TEXT,
                end_at TEXT,
                status TEXT NOT NULL DEFAULT 'setup',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_workflows_tenant_status ON workflows(tenant_id, status);

            CREATE TABLE IF NOT EXISTS submissions (
                id TEXT PRIMARY KEY,
                workflow_id TEXT NOT NULL,
                participant_id TEXT NOT NULL,
                channel_id TEXT NOT NULL,
                message_id TEXT NOT NULL,
                artifact_url TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_submissions_workflow ON submissions(workflow_id);
            CREATE INDEX IF NOT EXISTS idx_submissions_message ON submissions(message_id);

            CREATE TABLE IF NOT EXISTS votes (
                id TEXT PRIMARY KEY,
                workflow_id TEXT NOT NULL,
                submission_id TEXT NOT NULL,
                participant_id TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_votes_participant ON votes(workflow_id, participant_id);

            -- One row per tenant, settings as JSON
            CREATE TABLE IF NOT EXISTS tenant_settings (
                tenant_id TEXT PRIMARY KEY,
                settings_json TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS action_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tenant_id TEXT NOT NULL,
                actor TEXT NOT NULL,
                action TEXT NOT NULL,
                details TEXT,
                created_at TEXT NOT NULL
            );
         ",
            )
            .map_err(db_err("Migration"))?;
        Ok(())
    }

    /// Most recent audit records for a tenant, newest first.
    pub fn recent_actions(&self, tenant_id: &str, limit: usize) -> Result<Vec<ActionRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT tenant_id, actor, action, details, created_at FROM action_log
                 WHERE tenant_id = ?1 ORDER BY id DESC LIMIT ?2",
            )
            .map_err(db_err("Prepare action log"))?;
        let rows = stmt
            .query_map(params![tenant_id, limit as i64], |row| {
                Ok(ActionRecord {
                    tenant_id: row.get(0)?,
                    actor: row.get(1)?,
                    action: row.get(2)?,
                    details: row.get(3)?,
                    at: parse_time(&row.get::<_, String>(4)?),
                })
            })
            .map_err(db_err("Query action log"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("Read action log"))
    }
}

fn db_err(context: &'static str) -> impl Fn(rusqlite::Error) -> TavernError {
    move |e| TavernError::Store(format!("{context}: {e}"))
}

fn parse_time(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            tracing::warn!("⚠️ Bad timestamp '{}' in store: {e}", s);
            Utc::now()
        })
}

fn parse_opt_time(s: Option<String>) -> Option<DateTime<Utc>> {
    s.as_deref().map(parse_time)
}

fn row_to_workflow(row: &rusqlite::Row) -> rusqlite::Result<Workflow> {
    let status: String = row.get(8)?;
    let status = status.parse::<WorkflowStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Workflow {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        title: row.get(2)?,
        number: row.get(3)?,
        description: row.get(4)?,
        open_submissions_at: parse_opt_time(row.get(5)?),
        start_voting_at: parse_opt_time(row.get(6)?),
        end_at: parse_opt_time(row.get(7)?),
        status,
        created_at: parse_time(&row.get::<_, String>(9)?),
        updated_at: parse_time(&row.get::<_, String>(10)?),
    })
}

fn row_to_submission(row: &rusqlite::Row) -> rusqlite::Result<Submission> {
    Ok(Submission {
        id: row.get(0)?,
        workflow_id: row.get(1)?,
        participant_id: row.get(2)?,
        channel_id: row.get(3)?,
        message_id: row.get(4)?,
        artifact_url: row.get(5)?,
        created_at: parse_time(&row.get::<_, String>(6)?),
    })
}

#[async_trait]
impl WorkflowStore for SqliteStore {
    async fn list_non_terminal_workflows(&self, tenant_id: Option<&str>) -> Result<Vec<Workflow>> {
        let conn = self.conn()?;
        let sql = format!(
            "{WORKFLOW_SELECT} WHERE status != 'archived' AND (?1 IS NULL OR tenant_id = ?1)
             ORDER BY created_at, id"
        );
        let mut stmt = conn.prepare(&sql).map_err(db_err("Prepare workflows"))?;
        let rows = stmt
            .query_map(params![tenant_id], row_to_workflow)
            .map_err(db_err("Query workflows"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("Read workflows"))
    }

    async fn get_workflow(&self, id: &str) -> Result<Option<Workflow>> {
        let conn = self.conn()?;
        conn.query_row(&format!("{WORKFLOW_SELECT} WHERE id = ?1"), params![id], row_to_workflow)
            .optional()
            .map_err(db_err("Get workflow"))
    }

    async fn insert_workflow(&self, workflow: &Workflow) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO workflows
                 (id, tenant_id, title, number, description, open_submissions_at, start_voting_at,
                  end_at, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    workflow.id,
                    workflow.tenant_id,
                    workflow.title,
                    workflow.number,
                    workflow.description,
                    workflow.open_submissions_at.map(|t| t.to_rfc3339()),
                    workflow.start_voting_at.map(|t| t.to_rfc3339()),
                    workflow.end_at.map(|t| t.to_rfc3339()),
                    workflow.status.as_str(),
                    workflow.created_at.to_rfc3339(),
                    workflow.updated_at.to_rfc3339(),
                ],
            )
            .map_err(db_err("Insert workflow"))?;
        Ok(())
    }

    async fn update_status(&self, id: &str, status: WorkflowStatus) -> Result<()> {
        let changed = self
            .conn()?
            .execute(
                "UPDATE workflows SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.as_str(), Utc::now().to_rfc3339(), id],
            )
            .map_err(db_err("Update status"))?;
        if changed == 0 {
            return Err(TavernError::NotFound(format!("workflow {id}")));
        }
        Ok(())
    }

    async fn update_status_from(
        &self,
        id: &str,
        expected: WorkflowStatus,
        status: WorkflowStatus,
    ) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE workflows SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
                params![status.as_str(), Utc::now().to_rfc3339(), id, expected.as_str()],
            )
            .map_err(db_err("Update status"))?;
        if changed > 0 {
            return Ok(true);
        }
        let exists = conn
            .query_row("SELECT 1 FROM workflows WHERE id = ?1", params![id], |_| Ok(()))
            .optional()
            .map_err(db_err("Update status"))?;
        match exists {
            Some(()) => Ok(false),
            None => Err(TavernError::NotFound(format!("workflow {id}"))),
        }
    }

    async fn find_active_workflow(
        &self,
        tenant_id: &str,
        status: WorkflowStatus,
    ) -> Result<Option<Workflow>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("{WORKFLOW_SELECT} WHERE tenant_id = ?1 AND status = ?2 ORDER BY created_at LIMIT 1"),
            params![tenant_id, status.as_str()],
            row_to_workflow,
        )
        .optional()
        .map_err(db_err("Find active workflow"))
    }

    async fn create_submission(&self, submission: &Submission) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT INTO submissions
                 (id, workflow_id, participant_id, channel_id, message_id, artifact_url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    submission.id,
                    submission.workflow_id,
                    submission.participant_id,
                    submission.channel_id,
                    submission.message_id,
                    submission.artifact_url,
                    submission.created_at.to_rfc3339(),
                ],
            )
            .map_err(db_err("Insert submission"))?;
        Ok(())
    }

    async fn list_submissions(&self, workflow_id: &str) -> Result<Vec<Submission>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("{SUBMISSION_SELECT} WHERE workflow_id = ?1 ORDER BY created_at"))
            .map_err(db_err("Prepare submissions"))?;
        let rows = stmt
            .query_map(params![workflow_id], row_to_submission)
            .map_err(db_err("Query submissions"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("Read submissions"))
    }

    async fn find_submission(
        &self,
        workflow_id: &str,
        participant_id: &str,
    ) -> Result<Option<Submission>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("{SUBMISSION_SELECT} WHERE workflow_id = ?1 AND participant_id = ?2 LIMIT 1"),
            params![workflow_id, participant_id],
            row_to_submission,
        )
        .optional()
        .map_err(db_err("Find submission"))
    }

    async fn find_submission_by_message(&self, message_id: &str) -> Result<Option<Submission>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("{SUBMISSION_SELECT} WHERE message_id = ?1 LIMIT 1"),
            params![message_id],
            row_to_submission,
        )
        .optional()
        .map_err(db_err("Find submission by message"))
    }

    async fn create_vote(&self, vote: &Vote) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT INTO votes (id, workflow_id, submission_id, participant_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    vote.id,
                    vote.workflow_id,
                    vote.submission_id,
                    vote.participant_id,
                    vote.created_at.to_rfc3339(),
                ],
            )
            .map_err(db_err("Insert vote"))?;
        Ok(())
    }

    async fn delete_votes(
        &self,
        workflow_id: &str,
        submission_id: &str,
        participant_id: &str,
    ) -> Result<u64> {
        let removed = self
            .conn()?
            .execute(
                "DELETE FROM votes WHERE workflow_id = ?1 AND submission_id = ?2 AND participant_id = ?3",
                params![workflow_id, submission_id, participant_id],
            )
            .map_err(db_err("Delete votes"))?;
        Ok(removed as u64)
    }

    async fn count_votes(&self, workflow_id: &str, participant_id: &str) -> Result<u32> {
        self.conn()?
            .query_row(
                "SELECT COUNT(*) FROM votes WHERE workflow_id = ?1 AND participant_id = ?2",
                params![workflow_id, participant_id],
                |row| row.get::<_, u32>(0),
            )
            .map_err(db_err("Count votes"))
    }

    async fn tally_votes(&self, workflow_id: &str) -> Result<Vec<VoteTally>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT s.id, s.workflow_id, s.participant_id, s.channel_id, s.message_id,
                        s.artifact_url, s.created_at, COUNT(v.id)
                 FROM submissions s
                 LEFT JOIN votes v ON v.submission_id = s.id AND v.workflow_id = s.workflow_id
                 WHERE s.workflow_id = ?1
                 GROUP BY s.id
                 ORDER BY COUNT(v.id) DESC, s.created_at ASC",
            )
            .map_err(db_err("Prepare tally"))?;
        let rows = stmt
            .query_map(params![workflow_id], |row| {
                Ok(VoteTally {
                    submission: row_to_submission(row)?,
                    votes: row.get(7)?,
                })
            })
            .map_err(db_err("Query tally"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("Read tally"))
    }

    async fn tenant_settings(&self, tenant_id: &str) -> Result<TenantSettings> {
        let json: Option<String> = self
            .conn()?
            .query_row(
                "SELECT settings_json FROM tenant_settings WHERE tenant_id = ?1",
                params![tenant_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err("Get tenant settings"))?;
        match json {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(TenantSettings::new(tenant_id)),
        }
    }

    async fn save_tenant_settings(&self, settings: &TenantSettings) -> Result<()> {
        let json = serde_json::to_string(settings)?;
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO tenant_settings (tenant_id, settings_json, updated_at)
                 VALUES (?1, ?2, ?3)",
                params![settings.tenant_id, json, Utc::now().to_rfc3339()],
            )
            .map_err(db_err("Save tenant settings"))?;
        Ok(())
    }
}

#[async_trait]
impl ActionLog for SqliteStore {
    async fn record(&self, record: ActionRecord) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT INTO action_log (tenant_id, actor, action, details, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.tenant_id,
                    record.actor,
                    record.action,
                    record.details,
                    record.at.to_rfc3339(),
                ],
            )
            .map_err(db_err("Insert action log"))?;
        Ok(())
    }
}
