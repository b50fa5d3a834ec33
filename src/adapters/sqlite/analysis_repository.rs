//! SQLite implementation of the AnalysisRepository.
//!
//! Writes and reads tolerate a schema that lacks the extended analysis
//! columns, each side on its own. A commit tries the extended insert inside
//! a savepoint and, on a missing-column error, rolls back to the savepoint
//! and inserts the core fields in the same transaction. A read that hits the
//! same error class is re-issued selecting core fields only.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use std::time::Duration;
use uuid::Uuid;

use super::schema_gate::SchemaGate;
use super::{parse_datetime, parse_optional_json, parse_uuid, to_optional_json};
use crate::domain::errors::{StoreError, StoreResult};
use crate::domain::models::{
    AnalysisCommit, AnalysisRecord, BiasInstance, CommitOutcome, DocumentStatus, ExtendedSections,
    RecordShape, Severity,
};
use crate::domain::ports::AnalysisRepository;

const CORE_COLUMNS: [&str; 6] = ["id", "document_id", "overall_score", "noise_score", "summary", "created_at"];

const EXTENDED_COLUMNS: [&str; 10] = [
    "noise_stats",
    "fact_check",
    "compliance",
    "swot",
    "simulation",
    "institutional_memory",
    "sentiment",
    "logical_analysis",
    "pre_mortem",
    "cognitive_diversity",
];

fn select_list(shape: RecordShape, alias: &str) -> String {
    let core = CORE_COLUMNS.iter();
    let columns: Vec<String> = match shape {
        RecordShape::Extended => core.chain(EXTENDED_COLUMNS.iter()).map(|c| format!("{alias}.{c}")).collect(),
        RecordShape::Core => core.map(|c| format!("{alias}.{c}")).collect(),
    };
    columns.join(", ")
}

fn record_schema_fallback(side: &'static str) {
    metrics::counter!("docaudit_schema_fallback_total", "side" => side).increment(1);
}

/// SQLite analysis store with independent read and write schema gates.
pub struct SqliteAnalysisRepository {
    pool: SqlitePool,
    write_gate: SchemaGate,
    read_gate: SchemaGate,
}

impl SqliteAnalysisRepository {
    /// Create a repository whose gates re-probe the extended columns every `reprobe_interval`.
    pub fn new(pool: SqlitePool, reprobe_interval: Duration) -> Self {
        Self {
            pool,
            write_gate: SchemaGate::new("write", reprobe_interval),
            read_gate: SchemaGate::new("read", reprobe_interval),
        }
    }

    /// Schema gate consulted by commits.
    pub fn write_gate(&self) -> &SchemaGate {
        &self.write_gate
    }

    /// Schema gate consulted by reads.
    pub fn read_gate(&self) -> &SchemaGate {
        &self.read_gate
    }

    async fn insert_extended(conn: &mut SqliteConnection, commit: &AnalysisCommit) -> StoreResult<()> {
        let report = &commit.report;
        let s = &report.sections;

        sqlx::query(
            r#"INSERT INTO analyses (id, document_id, overall_score, noise_score, summary, created_at,
                   noise_stats, fact_check, compliance, swot, simulation, institutional_memory,
                   sentiment, logical_analysis, pre_mortem, cognitive_diversity)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#
        )
        .bind(commit.analysis_id.to_string())
        .bind(commit.document_id.to_string())
        .bind(report.overall_score)
        .bind(report.noise_score)
        .bind(&report.summary)
        .bind(commit.created_at.to_rfc3339())
        .bind(to_optional_json(s.noise_stats.as_ref())?)
        .bind(to_optional_json(s.fact_check.as_ref())?)
        .bind(to_optional_json(s.compliance.as_ref())?)
        .bind(to_optional_json(s.swot.as_ref())?)
        .bind(to_optional_json(s.simulation.as_ref())?)
        .bind(to_optional_json(s.institutional_memory.as_ref())?)
        .bind(to_optional_json(s.sentiment.as_ref())?)
        .bind(to_optional_json(s.logical_analysis.as_ref())?)
        .bind(to_optional_json(s.pre_mortem.as_ref())?)
        .bind(to_optional_json(s.cognitive_diversity.as_ref())?)
        .execute(conn)
        .await?;

        Ok(())
    }

    async fn insert_core(conn: &mut SqliteConnection, commit: &AnalysisCommit) -> StoreResult<()> {
        let report = &commit.report;

        sqlx::query(
            r#"INSERT INTO analyses (id, document_id, overall_score, noise_score, summary, created_at)
               VALUES (?, ?, ?, ?, ?, ?)"#
        )
        .bind(commit.analysis_id.to_string())
        .bind(commit.document_id.to_string())
        .bind(report.overall_score)
        .bind(report.noise_score)
        .bind(&report.summary)
        .bind(commit.created_at.to_rfc3339())
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Insert the analysis row, preferring the extended column set.
    async fn insert_analysis(&self, conn: &mut SqliteConnection, commit: &AnalysisCommit) -> StoreResult<RecordShape> {
        if !self.write_gate.should_try_extended() {
            Self::insert_core(conn, commit).await?;
            return Ok(RecordShape::Core);
        }

        sqlx::query("SAVEPOINT analysis_extended").execute(&mut *conn).await?;
        match Self::insert_extended(conn, commit).await {
            Ok(()) => {
                sqlx::query("RELEASE SAVEPOINT analysis_extended").execute(&mut *conn).await?;
                self.write_gate.record_extended();
                Ok(RecordShape::Extended)
            }
            Err(e) if e.is_schema_drift() => {
                tracing::warn!(
                    analysis_id = %commit.analysis_id,
                    error = %e,
                    "extended insert failed on missing column, retrying with core fields"
                );
                sqlx::query("ROLLBACK TO SAVEPOINT analysis_extended").execute(&mut *conn).await?;
                sqlx::query("RELEASE SAVEPOINT analysis_extended").execute(&mut *conn).await?;
                self.write_gate.record_core_only();
                record_schema_fallback("write");

                Self::insert_core(conn, commit).await?;
                Ok(RecordShape::Core)
            }
            Err(e) => Err(e),
        }
    }

    async fn insert_biases(conn: &mut SqliteConnection, biases: &[BiasInstance]) -> StoreResult<()> {
        for bias in biases {
            sqlx::query(
                r#"INSERT INTO bias_instances (id, analysis_id, bias_type, severity, excerpt, explanation, suggestion, confidence)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#
            )
            .bind(bias.id.to_string())
            .bind(bias.analysis_id.to_string())
            .bind(&bias.bias_type)
            .bind(bias.severity.as_str())
            .bind(&bias.excerpt)
            .bind(&bias.explanation)
            .bind(&bias.suggestion)
            .bind(bias.confidence)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    async fn query_analysis_rows(&self, shape: RecordShape, tail: &str, key: &str) -> StoreResult<Vec<AnalysisRow>> {
        let sql = format!("SELECT {} {tail}", select_list(shape, "a"));
        let rows = sqlx::query_as::<_, AnalysisRow>(&sql)
            .bind(key)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Run an analyses select with the extended columns, falling back to the
    /// core columns when the schema lacks them.
    async fn fetch_analysis_rows(&self, tail: &str, key: &str) -> StoreResult<Vec<AnalysisRow>> {
        if self.read_gate.should_try_extended() {
            match self.query_analysis_rows(RecordShape::Extended, tail, key).await {
                Ok(rows) => {
                    self.read_gate.record_extended();
                    return Ok(rows);
                }
                Err(e) if e.is_schema_drift() => {
                    tracing::warn!(error = %e, "extended select failed on missing column, retrying with core fields");
                    self.read_gate.record_core_only();
                    record_schema_fallback("read");
                }
                Err(e) => return Err(e),
            }
        }

        self.query_analysis_rows(RecordShape::Core, tail, key).await
    }

    async fn biases_for(&self, analysis_id: Uuid) -> StoreResult<Vec<BiasInstance>> {
        let rows: Vec<BiasRow> = sqlx::query_as(
            r#"SELECT id, analysis_id, bias_type, severity, excerpt, explanation, suggestion, confidence
               FROM bias_instances WHERE analysis_id = ? ORDER BY rowid"#
        )
        .bind(analysis_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(BiasInstance::try_from).collect()
    }
}

#[async_trait]
impl AnalysisRepository for SqliteAnalysisRepository {
    async fn commit(&self, commit: &AnalysisCommit) -> StoreResult<CommitOutcome> {
        let biases = commit.bias_instances();
        let mut tx = self.pool.begin().await?;

        let shape = self.insert_analysis(&mut tx, commit).await?;
        Self::insert_biases(&mut tx, &biases).await?;

        let status = sqlx::query(
            "UPDATE documents SET status = ?, updated_at = ? WHERE id = ? AND run_generation = ?"
        )
        .bind(DocumentStatus::Complete.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(commit.document_id.to_string())
        .bind(commit.generation)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let status_applied = status.rows_affected() > 0;
        if !status_applied {
            tracing::info!(
                document_id = %commit.document_id,
                generation = commit.generation,
                "analysis stored but a newer run owns the document status"
            );
        }

        Ok(CommitOutcome {
            analysis_id: commit.analysis_id,
            shape,
            status_applied,
        })
    }

    async fn latest_for_document(&self, document_id: Uuid) -> StoreResult<Option<AnalysisRecord>> {
        let rows = self
            .fetch_analysis_rows(
                "FROM analyses a WHERE a.document_id = ? ORDER BY a.created_at DESC, a.rowid DESC LIMIT 1",
                &document_id.to_string(),
            )
            .await?;

        let Some(row) = rows.into_iter().next() else {
            return Ok(None);
        };

        let mut record = AnalysisRecord::try_from(row)?;
        record.biases = self.biases_for(record.id).await?;
        Ok(Some(record))
    }

    async fn list_for_owner(&self, owner_id: &str) -> StoreResult<Vec<AnalysisRecord>> {
        let rows = self
            .fetch_analysis_rows(
                "FROM analyses a JOIN documents d ON d.id = a.document_id WHERE d.owner_id = ? ORDER BY a.created_at ASC, a.rowid ASC",
                owner_id,
            )
            .await?;

        rows.into_iter().map(AnalysisRecord::try_from).collect()
    }

    async fn bias_counts_by_type(&self, owner_id: &str) -> StoreResult<Vec<(String, u64)>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"SELECT b.bias_type, COUNT(*) AS n
               FROM bias_instances b
               JOIN analyses a ON a.id = b.analysis_id
               JOIN documents d ON d.id = a.document_id
               WHERE d.owner_id = ?
               GROUP BY b.bias_type
               ORDER BY n DESC, b.bias_type ASC"#
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(t, n)| (t, n.max(0) as u64)).collect())
    }

    async fn bias_counts_by_severity(&self, owner_id: &str) -> StoreResult<Vec<(Severity, u64)>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"SELECT b.severity, COUNT(*) AS n
               FROM bias_instances b
               JOIN analyses a ON a.id = b.analysis_id
               JOIN documents d ON d.id = a.document_id
               WHERE d.owner_id = ?
               GROUP BY b.severity"#
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        let mut counts: Vec<(Severity, u64)> = rows
            .into_iter()
            .filter_map(|(s, n)| match Severity::from_str(&s) {
                Some(severity) => Some((severity, n.max(0) as u64)),
                None => {
                    tracing::warn!(severity = %s, "skipping bias instances with unknown severity");
                    None
                }
            })
            .collect();
        counts.sort_by_key(|(severity, _)| *severity);
        Ok(counts)
    }
}

#[derive(sqlx::FromRow)]
struct AnalysisRow {
    id: String,
    document_id: String,
    overall_score: f64,
    noise_score: f64,
    summary: String,
    created_at: String,
    #[sqlx(default)]
    noise_stats: Option<String>,
    #[sqlx(default)]
    fact_check: Option<String>,
    #[sqlx(default)]
    compliance: Option<String>,
    #[sqlx(default)]
    swot: Option<String>,
    #[sqlx(default)]
    simulation: Option<String>,
    #[sqlx(default)]
    institutional_memory: Option<String>,
    #[sqlx(default)]
    sentiment: Option<String>,
    #[sqlx(default)]
    logical_analysis: Option<String>,
    #[sqlx(default)]
    pre_mortem: Option<String>,
    #[sqlx(default)]
    cognitive_diversity: Option<String>,
}

impl TryFrom<AnalysisRow> for AnalysisRecord {
    type Error = StoreError;

    fn try_from(row: AnalysisRow) -> Result<Self, Self::Error> {
        Ok(AnalysisRecord {
            id: parse_uuid(&row.id)?,
            document_id: parse_uuid(&row.document_id)?,
            overall_score: row.overall_score,
            noise_score: row.noise_score,
            summary: row.summary,
            sections: ExtendedSections {
                noise_stats: parse_optional_json(row.noise_stats)?,
                fact_check: parse_optional_json(row.fact_check)?,
                compliance: parse_optional_json(row.compliance)?,
                swot: parse_optional_json(row.swot)?,
                simulation: parse_optional_json(row.simulation)?,
                institutional_memory: parse_optional_json(row.institutional_memory)?,
                sentiment: parse_optional_json(row.sentiment)?,
                logical_analysis: parse_optional_json(row.logical_analysis)?,
                pre_mortem: parse_optional_json(row.pre_mortem)?,
                cognitive_diversity: parse_optional_json(row.cognitive_diversity)?,
            },
            biases: Vec::new(),
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BiasRow {
    id: String,
    analysis_id: String,
    bias_type: String,
    severity: String,
    excerpt: String,
    explanation: String,
    suggestion: String,
    confidence: f64,
}

impl TryFrom<BiasRow> for BiasInstance {
    type Error = StoreError;

    fn try_from(row: BiasRow) -> Result<Self, Self::Error> {
        let severity = Severity::from_str(&row.severity)
            .ok_or_else(|| StoreError::CorruptRow(format!("Invalid severity: {}", row.severity)))?;

        Ok(BiasInstance {
            id: parse_uuid(&row.id)?,
            analysis_id: parse_uuid(&row.analysis_id)?,
            bias_type: row.bias_type,
            severity,
            excerpt: row.excerpt,
            explanation: row.explanation,
            suggestion: row.suggestion,
            confidence: row.confidence,
        })
    }
}
