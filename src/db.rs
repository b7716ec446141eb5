use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use uuid::Uuid;

use crate::calc::{ElementScore, Gender, NormativeLevel, ScoreRange, ThresholdTable};
use crate::error::StoreError;
use crate::seed::ImportSummary;
use crate::store::{
    now_timestamp, AssessmentDefinition, AssessmentElement, AssessmentKind, AssessmentRecord,
    NewAssessment, NewThresholdRule, RecordWrite, Store, StudentProfile, ThresholdRule, Upserted,
};

pub const DB_FILE_NAME: &str = "scorecard.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            year_level TEXT NOT NULL,
            year INTEGER NOT NULL,
            term TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            date_of_birth TEXT NOT NULL,
            gender TEXT NOT NULL,
            year_level TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_students(
            class_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            enrolled_at TEXT NOT NULL,
            PRIMARY KEY(class_id, student_id),
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_class_students_student ON class_students(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assessment_periods(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            period_type TEXT NOT NULL,
            year INTEGER NOT NULL,
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assessments(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT,
            framework TEXT NOT NULL,
            kind TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            version INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(name, framework)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assessment_elements(
            id TEXT PRIMARY KEY,
            assessment_id TEXT NOT NULL,
            name TEXT NOT NULL,
            description TEXT,
            element_order INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(assessment_id) REFERENCES assessments(id)
        )",
        [],
    )?;
    // Not unique: element ids are the import key.
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assessment_elements_order
         ON assessment_elements(assessment_id, element_order)",
        [],
    )?;

    // No natural-key constraint: re-seeding appends duplicate rules.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS normative_thresholds(
            id TEXT PRIMARY KEY,
            assessment_id TEXT NOT NULL,
            year_level TEXT NOT NULL,
            age_years INTEGER NOT NULL,
            gender TEXT,
            beginning TEXT NOT NULL,
            progressing TEXT NOT NULL,
            achieving TEXT NOT NULL,
            excelling TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(assessment_id) REFERENCES assessments(id)
        )",
        [],
    )?;
    ensure_thresholds_reference_seconds(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_normative_thresholds_lookup
         ON normative_thresholds(assessment_id, age_years, gender)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assessment_records(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            assessment_id TEXT NOT NULL,
            assessment_period_id TEXT NOT NULL,
            element_scores TEXT NOT NULL,
            total_score REAL,
            normative_level TEXT,
            notes TEXT,
            version INTEGER NOT NULL DEFAULT 1,
            server_version INTEGER NOT NULL DEFAULT 0,
            sync_status TEXT NOT NULL DEFAULT 'pending',
            conflict_detected INTEGER NOT NULL DEFAULT 0,
            last_synced_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(assessment_id) REFERENCES assessments(id),
            UNIQUE(student_id, assessment_id, assessment_period_id)
        )",
        [],
    )?;
    ensure_records_time_seconds(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assessment_records_class
         ON assessment_records(class_id, assessment_id, assessment_period_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS import_runs(
            id TEXT PRIMARY KEY,
            source TEXT NOT NULL,
            document_version TEXT,
            generated TEXT,
            skill_count INTEGER NOT NULL,
            sha256 TEXT NOT NULL,
            assessments_created INTEGER NOT NULL,
            elements_created INTEGER NOT NULL,
            rules_created INTEGER NOT NULL,
            imported_at TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

// Workspaces created before time-based skills carried a reference time.
fn ensure_thresholds_reference_seconds(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "normative_thresholds", "reference_seconds")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE normative_thresholds ADD COLUMN reference_seconds REAL",
        [],
    )?;
    Ok(())
}

// Records saved before time-based skills kept their raw time.
fn ensure_records_time_seconds(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "assessment_records", "time_seconds")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE assessment_records ADD COLUMN time_seconds REAL",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub const ASSESSMENT_COLUMNS: &str =
    "id, name, description, framework, kind, active, version";

pub fn assessment_from_row(row: &Row<'_>) -> rusqlite::Result<AssessmentDefinition> {
    let kind: String = row.get(4)?;
    Ok(AssessmentDefinition {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        framework: row.get(3)?,
        // Unknown kinds are treated as component-style scoring.
        kind: AssessmentKind::parse(&kind).unwrap_or(AssessmentKind::Component),
        active: row.get::<_, i64>(5)? != 0,
        version: row.get(6)?,
    })
}

pub const ELEMENT_COLUMNS: &str = "id, assessment_id, name, description, element_order";

pub fn element_from_row(row: &Row<'_>) -> rusqlite::Result<AssessmentElement> {
    Ok(AssessmentElement {
        id: row.get(0)?,
        assessment_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        order: row.get(4)?,
    })
}

pub const RULE_COLUMNS: &str = "id, assessment_id, year_level, age_years, gender,
     beginning, progressing, achieving, excelling, reference_seconds";

pub struct RawRule {
    id: String,
    assessment_id: String,
    year_level: String,
    age_years: i64,
    gender: Option<String>,
    bands: [String; 4],
    reference_seconds: Option<f64>,
}

pub fn raw_rule_from_row(row: &Row<'_>) -> rusqlite::Result<RawRule> {
    Ok(RawRule {
        id: row.get(0)?,
        assessment_id: row.get(1)?,
        year_level: row.get(2)?,
        age_years: row.get(3)?,
        gender: row.get(4)?,
        bands: [row.get(5)?, row.get(6)?, row.get(7)?, row.get(8)?],
        reference_seconds: row.get(9)?,
    })
}

impl RawRule {
    pub fn into_rule(self) -> Result<ThresholdRule, StoreError> {
        let gender = match self.gender.as_deref() {
            None => None,
            Some(g) => Some(Gender::parse(g).ok_or_else(|| StoreError::Corrupt {
                table: "normative_thresholds",
                message: format!("unknown gender '{g}' on rule {}", self.id),
            })?),
        };
        let [b, p, a, e] = &self.bands;
        let band = |s: &str| serde_json::from_str::<Option<ScoreRange>>(s);
        Ok(ThresholdRule {
            thresholds: ThresholdTable {
                beginning: band(b)?,
                progressing: band(p)?,
                achieving: band(a)?,
                excelling: band(e)?,
            },
            id: self.id,
            assessment_id: self.assessment_id,
            year_level: self.year_level,
            age_years: self.age_years,
            gender,
            reference_seconds: self.reference_seconds,
        })
    }
}

pub const RECORD_COLUMNS: &str = "id, student_id, class_id, assessment_id, assessment_period_id,
     element_scores, total_score, normative_level, notes, version, server_version,
     sync_status, conflict_detected, created_at, updated_at, time_seconds";

pub struct RawRecord {
    id: String,
    student_id: String,
    class_id: String,
    assessment_id: String,
    assessment_period_id: String,
    element_scores: String,
    total_score: Option<f64>,
    normative_level: Option<String>,
    notes: Option<String>,
    version: i64,
    server_version: i64,
    sync_status: String,
    conflict_detected: bool,
    created_at: String,
    updated_at: String,
    time_seconds: Option<f64>,
}

pub fn raw_record_from_row(row: &Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok(RawRecord {
        id: row.get(0)?,
        student_id: row.get(1)?,
        class_id: row.get(2)?,
        assessment_id: row.get(3)?,
        assessment_period_id: row.get(4)?,
        element_scores: row.get(5)?,
        total_score: row.get(6)?,
        normative_level: row.get(7)?,
        notes: row.get(8)?,
        version: row.get(9)?,
        server_version: row.get(10)?,
        sync_status: row.get(11)?,
        conflict_detected: row.get::<_, i64>(12)? != 0,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
        time_seconds: row.get(15)?,
    })
}

impl RawRecord {
    pub fn into_record(self) -> Result<AssessmentRecord, StoreError> {
        let element_scores: BTreeMap<String, ElementScore> =
            serde_json::from_str(&self.element_scores)?;
        let normative_level = match self.normative_level.as_deref() {
            None => None,
            Some(s) => Some(NormativeLevel::parse(s).ok_or_else(|| StoreError::Corrupt {
                table: "assessment_records",
                message: format!("unknown normative level '{s}' on record {}", self.id),
            })?),
        };
        Ok(AssessmentRecord {
            id: self.id,
            student_id: self.student_id,
            class_id: self.class_id,
            assessment_id: self.assessment_id,
            assessment_period_id: self.assessment_period_id,
            element_scores,
            time_seconds: self.time_seconds,
            total_score: self.total_score,
            normative_level,
            notes: self.notes,
            version: self.version,
            server_version: self.server_version,
            sync_status: self.sync_status,
            conflict_detected: self.conflict_detected,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub struct RawStudent {
    id: String,
    name: String,
    date_of_birth: String,
    gender: String,
    year_level: String,
}

pub const STUDENT_COLUMNS: &str = "id, name, date_of_birth, gender, year_level";

pub fn raw_student_from_row(row: &Row<'_>) -> rusqlite::Result<RawStudent> {
    Ok(RawStudent {
        id: row.get(0)?,
        name: row.get(1)?,
        date_of_birth: row.get(2)?,
        gender: row.get(3)?,
        year_level: row.get(4)?,
    })
}

impl RawStudent {
    pub fn into_profile(self) -> Result<StudentProfile, StoreError> {
        let corrupt = |message: String| StoreError::Corrupt {
            table: "students",
            message,
        };
        let date_of_birth = chrono::NaiveDate::parse_from_str(&self.date_of_birth, "%Y-%m-%d")
            .map_err(|e| corrupt(format!("bad date_of_birth on {}: {e}", self.id)))?;
        let gender = Gender::parse(&self.gender)
            .ok_or_else(|| corrupt(format!("unknown gender on {}", self.id)))?;
        Ok(StudentProfile {
            id: self.id,
            name: self.name,
            date_of_birth,
            gender,
            year_level: self.year_level,
        })
    }
}

fn band_json(band: Option<ScoreRange>) -> Result<String, StoreError> {
    Ok(serde_json::to_string(&band)?)
}

/// Store backed by a workspace's SQLite connection.
pub struct SqliteStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn list_threshold_rules(&self, assessment_id: &str) -> Result<Vec<ThresholdRule>, StoreError> {
        let sql = format!(
            "SELECT {RULE_COLUMNS} FROM normative_thresholds
             WHERE assessment_id = ?
             ORDER BY age_years, gender, rowid"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let raw = stmt
            .query_map([assessment_id], raw_rule_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter().map(RawRule::into_rule).collect()
    }

    /// Removes an assessment with its elements and rules. Refused while
    /// records still reference it.
    pub fn delete_assessment(&self, assessment_id: &str) -> Result<(), StoreError> {
        let exists: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM assessments WHERE id = ?",
                [assessment_id],
                |r| r.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(StoreError::NotFound {
                entity: "assessment",
                id: assessment_id.to_string(),
            });
        }

        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM assessment_records WHERE assessment_id = ?",
            [assessment_id],
            |r| r.get(0),
        )?;
        if count > 0 {
            return Err(StoreError::InUse {
                entity: "assessment",
                id: assessment_id.to_string(),
                count,
            });
        }

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM normative_thresholds WHERE assessment_id = ?",
            [assessment_id],
        )?;
        tx.execute(
            "DELETE FROM assessment_elements WHERE assessment_id = ?",
            [assessment_id],
        )?;
        tx.execute("DELETE FROM assessments WHERE id = ?", [assessment_id])?;
        tx.commit()?;
        Ok(())
    }

    pub fn record_import_run(
        &self,
        source: &str,
        document_version: Option<&str>,
        generated: Option<&str>,
        skill_count: usize,
        sha256: &str,
        summary: &ImportSummary,
    ) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO import_runs(
                id, source, document_version, generated, skill_count, sha256,
                assessments_created, elements_created, rules_created, imported_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            rusqlite::params![
                id,
                source,
                document_version,
                generated,
                skill_count as i64,
                sha256,
                summary.assessments_created as i64,
                summary.elements_created as i64,
                summary.rules_created as i64,
                now_timestamp(),
            ],
        )?;
        Ok(id)
    }

    /// Newest first.
    pub fn list_import_runs(&self) -> Result<Vec<ImportRun>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, source, document_version, generated, skill_count, sha256,
                    assessments_created, elements_created, rules_created, imported_at
             FROM import_runs
             ORDER BY imported_at DESC, rowid DESC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ImportRun {
                    id: row.get(0)?,
                    source: row.get(1)?,
                    document_version: row.get(2)?,
                    generated: row.get(3)?,
                    skill_count: row.get(4)?,
                    sha256: row.get(5)?,
                    assessments_created: row.get(6)?,
                    elements_created: row.get(7)?,
                    rules_created: row.get(8)?,
                    imported_at: row.get(9)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRun {
    pub id: String,
    pub source: String,
    pub document_version: Option<String>,
    pub generated: Option<String>,
    pub skill_count: i64,
    pub sha256: String,
    pub assessments_created: i64,
    pub elements_created: i64,
    pub rules_created: i64,
    pub imported_at: String,
}

impl Store for SqliteStore<'_> {
    fn find_assessment(
        &self,
        assessment_id: &str,
    ) -> Result<Option<AssessmentDefinition>, StoreError> {
        let sql = format!("SELECT {ASSESSMENT_COLUMNS} FROM assessments WHERE id = ?");
        Ok(self
            .conn
            .query_row(&sql, [assessment_id], assessment_from_row)
            .optional()?)
    }

    fn list_assessment_elements(
        &self,
        assessment_id: &str,
    ) -> Result<Vec<AssessmentElement>, StoreError> {
        let sql = format!(
            "SELECT {ELEMENT_COLUMNS} FROM assessment_elements
             WHERE assessment_id = ? ORDER BY element_order"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([assessment_id], element_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn find_student(&self, student_id: &str) -> Result<Option<StudentProfile>, StoreError> {
        let sql = format!("SELECT {STUDENT_COLUMNS} FROM students WHERE id = ?");
        let raw = self
            .conn
            .query_row(&sql, [student_id], raw_student_from_row)
            .optional()?;
        raw.map(RawStudent::into_profile).transpose()
    }

    fn find_threshold_rule(
        &self,
        assessment_id: &str,
        age_years: i64,
        gender: Option<Gender>,
    ) -> Result<Option<ThresholdRule>, StoreError> {
        let sql = format!(
            "SELECT {RULE_COLUMNS} FROM normative_thresholds
             WHERE assessment_id = ? AND age_years = ? AND gender IS ?
             ORDER BY rowid
             LIMIT 1"
        );
        let raw = self
            .conn
            .query_row(
                &sql,
                rusqlite::params![assessment_id, age_years, gender.map(|g| g.as_str())],
                raw_rule_from_row,
            )
            .optional()?;
        raw.map(RawRule::into_rule).transpose()
    }

    fn upsert_assessment_definition(
        &mut self,
        new: &NewAssessment,
    ) -> Result<Upserted<AssessmentDefinition>, StoreError> {
        let now = now_timestamp();
        let inserted = self.conn.execute(
            "INSERT INTO assessments(id, name, description, framework, kind, active, version, created_at, updated_at)
             VALUES(?, ?, ?, ?, ?, 1, 1, ?, ?)
             ON CONFLICT(name, framework) DO NOTHING",
            rusqlite::params![
                Uuid::new_v4().to_string(),
                new.name,
                new.description,
                new.framework,
                new.kind.as_str(),
                now,
                now,
            ],
        )?;
        let sql = format!(
            "SELECT {ASSESSMENT_COLUMNS} FROM assessments WHERE name = ? AND framework = ?"
        );
        let row = self
            .conn
            .query_row(&sql, (&new.name, &new.framework), assessment_from_row)?;
        Ok(Upserted {
            row,
            created: inserted > 0,
        })
    }

    fn upsert_assessment_element(
        &mut self,
        element: &AssessmentElement,
    ) -> Result<Upserted<AssessmentElement>, StoreError> {
        let inserted = self.conn.execute(
            "INSERT INTO assessment_elements(id, assessment_id, name, description, element_order, created_at)
             VALUES(?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO NOTHING",
            rusqlite::params![
                element.id,
                element.assessment_id,
                element.name,
                element.description,
                element.order,
                now_timestamp(),
            ],
        )?;
        let sql = format!("SELECT {ELEMENT_COLUMNS} FROM assessment_elements WHERE id = ?");
        let row = self.conn.query_row(&sql, [&element.id], element_from_row)?;
        Ok(Upserted {
            row,
            created: inserted > 0,
        })
    }

    fn insert_threshold_rule(
        &mut self,
        rule: &NewThresholdRule,
    ) -> Result<ThresholdRule, StoreError> {
        let id = Uuid::new_v4().to_string();
        let t = &rule.thresholds;
        self.conn.execute(
            "INSERT INTO normative_thresholds(
                id, assessment_id, year_level, age_years, gender,
                beginning, progressing, achieving, excelling, reference_seconds, created_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            rusqlite::params![
                id,
                rule.assessment_id,
                rule.year_level,
                rule.age_years,
                rule.gender.map(|g| g.as_str()),
                band_json(t.beginning)?,
                band_json(t.progressing)?,
                band_json(t.achieving)?,
                band_json(t.excelling)?,
                rule.reference_seconds,
                now_timestamp(),
            ],
        )?;
        Ok(ThresholdRule {
            id,
            assessment_id: rule.assessment_id.clone(),
            year_level: rule.year_level.clone(),
            age_years: rule.age_years,
            gender: rule.gender,
            thresholds: rule.thresholds,
            reference_seconds: rule.reference_seconds,
        })
    }

    fn find_assessment_record(
        &self,
        student_id: &str,
        assessment_id: &str,
        assessment_period_id: &str,
    ) -> Result<Option<AssessmentRecord>, StoreError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM assessment_records
             WHERE student_id = ? AND assessment_id = ? AND assessment_period_id = ?"
        );
        let raw = self
            .conn
            .query_row(
                &sql,
                (student_id, assessment_id, assessment_period_id),
                raw_record_from_row,
            )
            .optional()?;
        raw.map(RawRecord::into_record).transpose()
    }

    fn upsert_assessment_record(
        &mut self,
        write: &RecordWrite,
        version_increment: i64,
    ) -> Result<Upserted<AssessmentRecord>, StoreError> {
        let existed = self
            .find_assessment_record(
                &write.student_id,
                &write.assessment_id,
                &write.assessment_period_id,
            )?
            .is_some();

        let now = now_timestamp();
        let scores = serde_json::to_string(&write.element_scores)?;
        self.conn.execute(
            "INSERT INTO assessment_records(
                id, student_id, class_id, assessment_id, assessment_period_id,
                element_scores, total_score, normative_level, notes,
                version, server_version, sync_status, conflict_detected, created_at, updated_at,
                time_seconds)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 1, 0, 'pending', 0, ?10, ?10, ?12)
             ON CONFLICT(student_id, assessment_id, assessment_period_id) DO UPDATE SET
               class_id = excluded.class_id,
               element_scores = excluded.element_scores,
               time_seconds = excluded.time_seconds,
               total_score = excluded.total_score,
               normative_level = excluded.normative_level,
               notes = excluded.notes,
               version = assessment_records.version + ?11,
               updated_at = excluded.updated_at",
            rusqlite::params![
                Uuid::new_v4().to_string(),
                write.student_id,
                write.class_id,
                write.assessment_id,
                write.assessment_period_id,
                scores,
                write.total_score,
                write.normative_level.map(|l| l.as_str()),
                write.notes,
                now,
                version_increment,
                write.time_seconds,
            ],
        )?;

        let row = self
            .find_assessment_record(
                &write.student_id,
                &write.assessment_id,
                &write.assessment_period_id,
            )?
            .ok_or_else(|| StoreError::NotFound {
                entity: "assessment record",
                id: format!(
                    "{}/{}/{}",
                    write.student_id, write.assessment_id, write.assessment_period_id
                ),
            })?;
        Ok(Upserted {
            row,
            created: !existed,
        })
    }
}
