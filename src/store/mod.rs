pub mod memory;

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::calc::{ElementScore, Gender, NormativeLevel, ThresholdTable};
use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssessmentKind {
    Component,
    Time,
    Rubric,
    Binary,
}

impl AssessmentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AssessmentKind::Component => "component",
            AssessmentKind::Time => "time",
            AssessmentKind::Rubric => "rubric",
            AssessmentKind::Binary => "binary",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "component" => Some(AssessmentKind::Component),
            "time" => Some(AssessmentKind::Time),
            "rubric" => Some(AssessmentKind::Rubric),
            "binary" => Some(AssessmentKind::Binary),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentDefinition {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub framework: String,
    pub kind: AssessmentKind,
    pub active: bool,
    pub version: i64,
}

#[derive(Debug, Clone)]
pub struct NewAssessment {
    pub name: String,
    pub description: String,
    pub framework: String,
    pub kind: AssessmentKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentElement {
    pub id: String,
    pub assessment_id: String,
    pub name: String,
    pub description: Option<String>,
    pub order: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdRule {
    pub id: String,
    pub assessment_id: String,
    pub year_level: String,
    pub age_years: i64,
    pub gender: Option<Gender>,
    pub thresholds: ThresholdTable,
    pub reference_seconds: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct NewThresholdRule {
    pub assessment_id: String,
    pub year_level: String,
    pub age_years: i64,
    pub gender: Option<Gender>,
    pub thresholds: ThresholdTable,
    pub reference_seconds: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentProfile {
    pub id: String,
    pub name: String,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
    pub year_level: String,
}

/// One student's outcome for one assessment in one period. `sync_status`,
/// `server_version` and `conflict_detected` are carried but never interpreted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentRecord {
    pub id: String,
    pub student_id: String,
    pub class_id: String,
    pub assessment_id: String,
    pub assessment_period_id: String,
    pub element_scores: BTreeMap<String, ElementScore>,
    /// Raw time entered for time-based assessments.
    pub time_seconds: Option<f64>,
    pub total_score: Option<f64>,
    pub normative_level: Option<NormativeLevel>,
    pub notes: Option<String>,
    pub version: i64,
    pub server_version: i64,
    pub sync_status: String,
    pub conflict_detected: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct RecordWrite {
    pub student_id: String,
    pub class_id: String,
    pub assessment_id: String,
    pub assessment_period_id: String,
    pub element_scores: BTreeMap<String, ElementScore>,
    pub time_seconds: Option<f64>,
    pub total_score: Option<f64>,
    pub normative_level: Option<NormativeLevel>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Upserted<T> {
    pub row: T,
    pub created: bool,
}

/// Persistence seam shared by the importer and the record-save path.
pub trait Store {
    fn find_assessment(&self, assessment_id: &str)
        -> Result<Option<AssessmentDefinition>, StoreError>;

    fn list_assessment_elements(
        &self,
        assessment_id: &str,
    ) -> Result<Vec<AssessmentElement>, StoreError>;

    fn find_student(&self, student_id: &str) -> Result<Option<StudentProfile>, StoreError>;

    /// Exact match on gender: `None` only matches gender-agnostic rules.
    fn find_threshold_rule(
        &self,
        assessment_id: &str,
        age_years: i64,
        gender: Option<Gender>,
    ) -> Result<Option<ThresholdRule>, StoreError>;

    /// Keyed on (name, framework). An existing row is returned untouched.
    fn upsert_assessment_definition(
        &mut self,
        new: &NewAssessment,
    ) -> Result<Upserted<AssessmentDefinition>, StoreError>;

    /// Keyed on the element id. An existing row is returned untouched.
    fn upsert_assessment_element(
        &mut self,
        element: &AssessmentElement,
    ) -> Result<Upserted<AssessmentElement>, StoreError>;

    /// Always inserts.
    fn insert_threshold_rule(&mut self, rule: &NewThresholdRule)
        -> Result<ThresholdRule, StoreError>;

    fn find_assessment_record(
        &self,
        student_id: &str,
        assessment_id: &str,
        assessment_period_id: &str,
    ) -> Result<Option<AssessmentRecord>, StoreError>;

    /// Keyed on (student, assessment, period). Updating bumps `version` by
    /// `version_increment`.
    fn upsert_assessment_record(
        &mut self,
        write: &RecordWrite,
        version_increment: i64,
    ) -> Result<Upserted<AssessmentRecord>, StoreError>;
}

pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
