//! SQLite-backed report store implementation.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, types::Type, Connection, OptionalExtension};

use super::{
    Analysis, Completion, CreateReportRequest, Finding, Report, ReportError, ReportFilter,
    ReportStatus, ReportStore, Scope, Severity,
};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const REPORT_COLUMNS: &str = "id, tenant_id, uploaded_by, filename, status, score, finding_count, summary, source_key, output_key, checksum, byte_size, error_message, deleted_at, lease_owner, lease_expires_at, uploaded_at, updated_at";

const ANALYSIS_COLUMNS: &str = "id, report_id, engine, engine_version, score, model_score, passed_rules, failed_rules, started_at, finished_at, duration_ms";

/// SQLite-backed report store.
pub struct SqliteReportStore {
    conn: Mutex<Connection>,
}

impl SqliteReportStore {
    /// Create a new SQLite report store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, ReportError> {
        let conn = Connection::open(path).map_err(db_err)?;
        // The audit log and job queue share the database file.
        conn.busy_timeout(BUSY_TIMEOUT).map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite report store (useful for testing).
    pub fn in_memory() -> Result<Self, ReportError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), ReportError> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS reports (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                uploaded_by TEXT NOT NULL,
                filename TEXT NOT NULL,
                status TEXT NOT NULL,
                score INTEGER,
                finding_count INTEGER NOT NULL DEFAULT 0,
                summary TEXT,
                source_key TEXT NOT NULL,
                output_key TEXT,
                checksum TEXT,
                byte_size INTEGER,
                error_message TEXT,
                deleted_at TEXT,
                lease_owner TEXT,
                lease_expires_at TEXT,
                uploaded_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_reports_tenant ON reports(tenant_id, uploaded_at);
            CREATE INDEX IF NOT EXISTS idx_reports_deleted_at ON reports(deleted_at);

            CREATE TABLE IF NOT EXISTS analyses (
                id TEXT PRIMARY KEY,
                report_id TEXT NOT NULL REFERENCES reports(id) ON DELETE CASCADE,
                engine TEXT NOT NULL,
                engine_version TEXT NOT NULL,
                score INTEGER NOT NULL,
                model_score INTEGER,
                passed_rules INTEGER NOT NULL,
                failed_rules INTEGER NOT NULL,
                started_at TEXT NOT NULL,
                finished_at TEXT NOT NULL,
                duration_ms INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_analyses_report ON analyses(report_id);

            CREATE TABLE IF NOT EXISTS findings (
                id TEXT PRIMARY KEY,
                analysis_id TEXT NOT NULL REFERENCES analyses(id) ON DELETE CASCADE,
                position INTEGER NOT NULL,
                code TEXT NOT NULL,
                severity TEXT NOT NULL,
                message TEXT NOT NULL,
                suggestion TEXT,
                evidence TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_findings_analysis ON findings(analysis_id);
            "#,
        )
        .map_err(db_err)
    }

    fn build_where_clause(filter: &ReportFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = vec!["deleted_at IS NULL"];
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Scope::Tenant(ref tenant_id) = filter.scope {
            conditions.push("tenant_id = ?");
            params.push(Box::new(tenant_id.clone()));
        }

        if let Some(status) = filter.status {
            conditions.push("status = ?");
            params.push(Box::new(status.as_str()));
        }

        if let Some(ref uploaded_by) = filter.uploaded_by {
            conditions.push("uploaded_by = ?");
            params.push(Box::new(uploaded_by.clone()));
        }

        (format!("WHERE {}", conditions.join(" AND ")), params)
    }

    fn row_to_report(row: &rusqlite::Row) -> rusqlite::Result<Report> {
        let status: String = row.get(4)?;
        let byte_size: Option<i64> = row.get(11)?;
        Ok(Report {
            id: row.get(0)?,
            tenant_id: row.get(1)?,
            uploaded_by: row.get(2)?,
            filename: row.get(3)?,
            status: status
                .parse::<ReportStatus>()
                .map_err(|e| conversion_err(4, e))?,
            score: row.get(5)?,
            finding_count: row.get(6)?,
            summary: row.get(7)?,
            source_key: row.get(8)?,
            output_key: row.get(9)?,
            checksum: row.get(10)?,
            byte_size: byte_size.map(|s| s as u64),
            error_message: row.get(12)?,
            deleted_at: parse_opt_ts(row, 13)?,
            lease_owner: row.get(14)?,
            lease_expires_at: parse_opt_ts(row, 15)?,
            uploaded_at: parse_ts(row, 16)?,
            updated_at: parse_ts(row, 17)?,
        })
    }

    fn row_to_analysis(row: &rusqlite::Row) -> rusqlite::Result<Analysis> {
        Ok(Analysis {
            id: row.get(0)?,
            report_id: row.get(1)?,
            engine: row.get(2)?,
            engine_version: row.get(3)?,
            score: row.get(4)?,
            model_score: row.get(5)?,
            passed_rules: row.get(6)?,
            failed_rules: row.get(7)?,
            started_at: parse_ts(row, 8)?,
            finished_at: parse_ts(row, 9)?,
            duration_ms: row.get(10)?,
        })
    }

    fn row_to_finding(row: &rusqlite::Row) -> rusqlite::Result<Finding> {
        let severity: String = row.get(3)?;
        Ok(Finding {
            id: row.get(0)?,
            analysis_id: row.get(1)?,
            code: row.get(2)?,
            severity: severity
                .parse::<Severity>()
                .map_err(|e| conversion_err(3, e))?,
            message: row.get(4)?,
            suggestion: row.get(5)?,
            evidence: row.get(6)?,
        })
    }

    fn select_report(conn: &Connection, id: &str) -> Result<Option<Report>, ReportError> {
        conn.query_row(
            &format!("SELECT {} FROM reports WHERE id = ?", REPORT_COLUMNS),
            params![id],
            Self::row_to_report,
        )
        .optional()
        .map_err(db_err)
    }

    fn select_in_scope(
        conn: &Connection,
        id: &str,
        scope: &Scope,
        include_deleted: bool,
    ) -> Result<Option<Report>, ReportError> {
        let report = Self::select_report(conn, id)?;
        Ok(report.filter(|r| r.visible_to(scope) && (include_deleted || !r.is_deleted())))
    }
}

fn db_err(e: rusqlite::Error) -> ReportError {
    ReportError::Database(e.to_string())
}

fn conversion_err(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, msg.into())
}

fn format_ts(ts: &DateTime<Utc>) -> String {
    // Fixed-width UTC so lexicographic comparison in SQL matches time order.
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, e.to_string()))
}

fn parse_opt_ts(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| {
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| conversion_err(idx, e.to_string()))
    })
    .transpose()
}

impl ReportStore for SqliteReportStore {
    fn create(&self, request: CreateReportRequest) -> Result<Report, ReportError> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO reports (id, tenant_id, uploaded_by, filename, status, finding_count, source_key, uploaded_at, updated_at) VALUES (?, ?, ?, ?, ?, 0, ?, ?, ?)",
            params![
                request.id,
                request.tenant_id,
                request.uploaded_by,
                request.filename,
                ReportStatus::Processing.as_str(),
                request.source_key,
                format_ts(&now),
                format_ts(&now),
            ],
        )
        .map_err(db_err)?;

        Ok(Report {
            id: request.id,
            tenant_id: request.tenant_id,
            uploaded_by: request.uploaded_by,
            filename: request.filename,
            status: ReportStatus::Processing,
            score: None,
            finding_count: 0,
            summary: None,
            source_key: request.source_key,
            output_key: None,
            checksum: None,
            byte_size: None,
            error_message: None,
            deleted_at: None,
            lease_owner: None,
            lease_expires_at: None,
            uploaded_at: now,
            updated_at: now,
        })
    }

    fn get(&self, id: &str) -> Result<Option<Report>, ReportError> {
        let conn = self.conn.lock().unwrap();
        Self::select_report(&conn, id)
    }

    fn find_in_scope(&self, id: &str, scope: &Scope) -> Result<Option<Report>, ReportError> {
        let conn = self.conn.lock().unwrap();
        Self::select_in_scope(&conn, id, scope, false)
    }

    fn list(&self, filter: &ReportFilter) -> Result<Vec<Report>, ReportError> {
        let conn = self.conn.lock().unwrap();

        let (where_clause, params) = Self::build_where_clause(filter);

        let sql = format!(
            "SELECT {} FROM reports {} ORDER BY uploaded_at DESC, id ASC LIMIT ? OFFSET ?",
            REPORT_COLUMNS, where_clause
        );

        let mut stmt = conn.prepare(&sql).map_err(db_err)?;

        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));

        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_report)
            .map_err(db_err)?;

        let mut reports = Vec::new();
        for row_result in rows {
            reports.push(row_result.map_err(db_err)?);
        }

        Ok(reports)
    }

    fn count(&self, filter: &ReportFilter) -> Result<i64, ReportError> {
        let conn = self.conn.lock().unwrap();

        let (where_clause, params) = Self::build_where_clause(filter);

        let sql = format!("SELECT COUNT(*) FROM reports {}", where_clause);

        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(db_err)
    }

    fn try_claim(
        &self,
        id: &str,
        owner: &str,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<Option<Report>, ReportError> {
        let conn = self.conn.lock().unwrap();

        let changed = conn
            .execute(
                "UPDATE reports SET lease_owner = ?, lease_expires_at = ?, updated_at = ? \
                 WHERE id = ? AND status = 'PROCESSING' AND deleted_at IS NULL \
                 AND (lease_owner IS NULL OR lease_expires_at < ?)",
                params![
                    owner,
                    format_ts(&lease_until),
                    format_ts(&now),
                    id,
                    format_ts(&now)
                ],
            )
            .map_err(db_err)?;

        if changed == 0 {
            return Ok(None);
        }

        Self::select_report(&conn, id)
    }

    fn release_claim(&self, id: &str, owner: &str) -> Result<bool, ReportError> {
        let conn = self.conn.lock().unwrap();

        let changed = conn
            .execute(
                "UPDATE reports SET lease_owner = NULL, lease_expires_at = NULL \
                 WHERE id = ? AND lease_owner = ?",
                params![id, owner],
            )
            .map_err(db_err)?;

        Ok(changed > 0)
    }

    fn complete(
        &self,
        id: &str,
        owner: &str,
        completion: &Completion,
        now: DateTime<Utc>,
    ) -> Result<Analysis, ReportError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(db_err)?;

        let changed = tx
            .execute(
                "UPDATE reports SET status = 'DONE', score = ?, finding_count = ?, summary = ?, \
                 output_key = ?, checksum = ?, byte_size = ?, error_message = NULL, \
                 lease_owner = NULL, lease_expires_at = NULL, updated_at = ? \
                 WHERE id = ? AND status = 'PROCESSING' AND lease_owner = ?",
                params![
                    completion.score,
                    completion.findings.len() as i64,
                    completion.summary,
                    completion.output_key,
                    completion.checksum,
                    completion.byte_size as i64,
                    format_ts(&now),
                    id,
                    owner,
                ],
            )
            .map_err(db_err)?;

        if changed == 0 {
            // Dropping the transaction rolls it back.
            return Err(ReportError::LeaseLost(id.to_string()));
        }

        tx.execute("DELETE FROM analyses WHERE report_id = ?", params![id])
            .map_err(db_err)?;

        let analysis = Analysis {
            id: uuid::Uuid::new_v4().to_string(),
            report_id: id.to_string(),
            engine: completion.engine.clone(),
            engine_version: completion.engine_version.clone(),
            score: completion.score,
            model_score: completion.model_score,
            passed_rules: completion.passed_rules,
            failed_rules: completion.failed_rules,
            started_at: completion.started_at,
            finished_at: completion.finished_at,
            duration_ms: (completion.finished_at - completion.started_at).num_milliseconds(),
        };

        tx.execute(
            &format!(
                "INSERT INTO analyses ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                ANALYSIS_COLUMNS
            ),
            params![
                analysis.id,
                analysis.report_id,
                analysis.engine,
                analysis.engine_version,
                analysis.score,
                analysis.model_score,
                analysis.passed_rules,
                analysis.failed_rules,
                format_ts(&analysis.started_at),
                format_ts(&analysis.finished_at),
                analysis.duration_ms,
            ],
        )
        .map_err(db_err)?;

        for (position, finding) in completion.findings.iter().enumerate() {
            tx.execute(
                "INSERT INTO findings (id, analysis_id, position, code, severity, message, suggestion, evidence) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    uuid::Uuid::new_v4().to_string(),
                    analysis.id,
                    position as i64,
                    finding.code,
                    finding.severity.as_str(),
                    finding.message,
                    finding.suggestion,
                    finding.evidence,
                ],
            )
            .map_err(db_err)?;
        }

        tx.commit().map_err(db_err)?;

        Ok(analysis)
    }

    fn fail(
        &self,
        id: &str,
        owner: Option<&str>,
        error_message: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, ReportError> {
        let conn = self.conn.lock().unwrap();

        const SET: &str = "UPDATE reports SET status = 'FAILED', error_message = ?, score = NULL, \
             summary = NULL, finding_count = 0, checksum = NULL, byte_size = NULL, \
             lease_owner = NULL, lease_expires_at = NULL, updated_at = ? \
             WHERE id = ? AND status = 'PROCESSING'";

        let changed = match owner {
            Some(owner) => conn.execute(
                &format!("{} AND lease_owner = ?", SET),
                params![error_message, format_ts(&now), id, owner],
            ),
            None => conn.execute(
                &format!(
                    "{} AND (lease_owner IS NULL OR lease_expires_at < ?)",
                    SET
                ),
                params![error_message, format_ts(&now), id, format_ts(&now)],
            ),
        }
        .map_err(db_err)?;

        Ok(changed > 0)
    }

    fn reset_for_reprocess(
        &self,
        id: &str,
        scope: &Scope,
        now: DateTime<Utc>,
    ) -> Result<Report, ReportError> {
        let conn = self.conn.lock().unwrap();

        let current = Self::select_in_scope(&conn, id, scope, false)?
            .ok_or_else(|| ReportError::NotFound(id.to_string()))?;

        if !current.status.is_terminal() {
            return Err(ReportError::InvalidState {
                id: id.to_string(),
                status: current.status,
                operation: "reprocess".to_string(),
            });
        }

        // The previous output key is kept so a later purge still removes that object.
        let changed = conn
            .execute(
                "UPDATE reports SET status = 'PROCESSING', score = NULL, finding_count = 0, \
                 summary = NULL, checksum = NULL, byte_size = NULL, error_message = NULL, \
                 lease_owner = NULL, lease_expires_at = NULL, updated_at = ? \
                 WHERE id = ? AND status = ? AND deleted_at IS NULL",
                params![format_ts(&now), id, current.status.as_str()],
            )
            .map_err(db_err)?;

        if changed == 0 {
            return Err(ReportError::Conflict {
                id: id.to_string(),
                reason: "report changed concurrently".to_string(),
            });
        }

        Self::select_report(&conn, id)?.ok_or_else(|| ReportError::NotFound(id.to_string()))
    }

    fn soft_delete(
        &self,
        id: &str,
        scope: &Scope,
        now: DateTime<Utc>,
    ) -> Result<Report, ReportError> {
        let conn = self.conn.lock().unwrap();

        let changed = match scope {
            Scope::All => conn.execute(
                "UPDATE reports SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
                params![format_ts(&now), format_ts(&now), id],
            ),
            Scope::Tenant(tenant_id) => conn.execute(
                "UPDATE reports SET deleted_at = ?, updated_at = ? WHERE id = ? AND tenant_id = ? AND deleted_at IS NULL",
                params![format_ts(&now), format_ts(&now), id, tenant_id],
            ),
        }
        .map_err(db_err)?;

        let report = Self::select_in_scope(&conn, id, scope, true)?
            .ok_or_else(|| ReportError::NotFound(id.to_string()))?;

        if changed == 0 {
            return Err(ReportError::Conflict {
                id: id.to_string(),
                reason: "already deleted".to_string(),
            });
        }

        Ok(report)
    }

    fn purge_candidates(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Report>, ReportError> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM reports WHERE deleted_at IS NOT NULL AND deleted_at < ? \
                 ORDER BY deleted_at ASC LIMIT ?",
                REPORT_COLUMNS
            ))
            .map_err(db_err)?;

        let rows = stmt
            .query_map(
                params![format_ts(&cutoff), limit as i64],
                Self::row_to_report,
            )
            .map_err(db_err)?;

        let mut reports = Vec::new();
        for row_result in rows {
            reports.push(row_result.map_err(db_err)?);
        }

        Ok(reports)
    }

    fn delete_purged(&self, id: &str) -> Result<bool, ReportError> {
        let conn = self.conn.lock().unwrap();

        let changed = conn
            .execute(
                "DELETE FROM reports WHERE id = ? AND deleted_at IS NOT NULL",
                params![id],
            )
            .map_err(db_err)?;

        Ok(changed > 0)
    }

    fn latest_analysis(&self, report_id: &str) -> Result<Option<Analysis>, ReportError> {
        let conn = self.conn.lock().unwrap();

        conn.query_row(
            &format!(
                "SELECT {} FROM analyses WHERE report_id = ? ORDER BY finished_at DESC LIMIT 1",
                ANALYSIS_COLUMNS
            ),
            params![report_id],
            Self::row_to_analysis,
        )
        .optional()
        .map_err(db_err)
    }

    fn analyses(&self, report_id: &str) -> Result<Vec<Analysis>, ReportError> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM analyses WHERE report_id = ? ORDER BY finished_at DESC",
                ANALYSIS_COLUMNS
            ))
            .map_err(db_err)?;

        let rows = stmt
            .query_map(params![report_id], Self::row_to_analysis)
            .map_err(db_err)?;

        let mut analyses = Vec::new();
        for row_result in rows {
            analyses.push(row_result.map_err(db_err)?);
        }

        Ok(analyses)
    }

    fn findings(&self, analysis_id: &str) -> Result<Vec<Finding>, ReportError> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn
            .prepare(
                "SELECT id, analysis_id, code, severity, message, suggestion, evidence \
                 FROM findings WHERE analysis_id = ? ORDER BY position ASC",
            )
            .map_err(db_err)?;

        let rows = stmt
            .query_map(params![analysis_id], Self::row_to_finding)
            .map_err(db_err)?;

        let mut findings = Vec::new();
        for row_result in rows {
            findings.push(row_result.map_err(db_err)?);
        }

        Ok(findings)
    }
}
