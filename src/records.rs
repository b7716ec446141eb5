use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

use crate::calc::{
    age_on, aggregate_score, classify, motor_quotient, select_threshold_rule, ElementScore,
    NormativeLevel,
};
use crate::error::RecordError;
use crate::store::{AssessmentKind, AssessmentRecord, RecordWrite, Store};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRecordInput {
    pub student_id: String,
    pub class_id: String,
    pub assessment_id: String,
    pub assessment_period_id: String,
    #[serde(default)]
    pub element_scores: BTreeMap<String, ElementScore>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub time_seconds: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct SavedRecord {
    pub record: AssessmentRecord,
    pub created: bool,
    /// Id of the threshold rule used; `None` means the record is unclassified.
    pub threshold_rule_id: Option<String>,
}

fn validate(input: &SaveRecordInput) -> Result<(), RecordError> {
    let ids = [
        ("studentId", &input.student_id),
        ("classId", &input.class_id),
        ("assessmentId", &input.assessment_id),
        ("assessmentPeriodId", &input.assessment_period_id),
    ];
    for (field, value) in ids {
        if value.trim().is_empty() {
            return Err(RecordError::Validation(format!("{field} must not be empty")));
        }
    }

    for (element_id, score) in &input.element_scores {
        if let ElementScore::Value(v) = score {
            if !v.is_finite() || *v < 0.0 {
                return Err(RecordError::Validation(format!(
                    "score for element {element_id} must be a non-negative number"
                )));
            }
        }
    }

    if let Some(t) = input.time_seconds {
        if !t.is_finite() || t <= 0.0 {
            return Err(RecordError::Validation(
                "timeSeconds must be a positive number".to_string(),
            ));
        }
    }
    Ok(())
}

/// Totals, classifies and stores one record. A second save for the same
/// (student, assessment, period) updates the row and bumps its version.
pub fn save_record<S: Store + ?Sized>(
    store: &mut S,
    input: &SaveRecordInput,
    today: NaiveDate,
) -> Result<SavedRecord, RecordError> {
    validate(input)?;

    let assessment = store
        .find_assessment(&input.assessment_id)?
        .ok_or_else(|| RecordError::NotFound {
            entity: "assessment",
            id: input.assessment_id.clone(),
        })?;
    let student = store
        .find_student(&input.student_id)?
        .ok_or_else(|| RecordError::NotFound {
            entity: "student",
            id: input.student_id.clone(),
        })?;

    if assessment.kind == AssessmentKind::Time && input.time_seconds.is_none() {
        return Err(RecordError::Validation(
            "timeSeconds is required for time assessments".to_string(),
        ));
    }

    let elements = store.list_assessment_elements(&assessment.id)?;
    if !elements.is_empty() {
        let known: HashSet<&str> = elements.iter().map(|e| e.id.as_str()).collect();
        if let Some(unknown) = input
            .element_scores
            .keys()
            .find(|k| !known.contains(k.as_str()))
        {
            return Err(RecordError::Validation(format!(
                "element {unknown} does not belong to assessment {}",
                assessment.id
            )));
        }
    }

    let age = age_on(student.date_of_birth, today);
    let rule = select_threshold_rule(&*store, &assessment.id, age, student.gender)?;

    let total_score = match assessment.kind {
        AssessmentKind::Time => match (input.time_seconds, rule.as_ref()) {
            (Some(seconds), Some(r)) => r
                .reference_seconds
                .and_then(|reference| motor_quotient(reference, seconds)),
            _ => None,
        },
        AssessmentKind::Component | AssessmentKind::Rubric | AssessmentKind::Binary => {
            Some(aggregate_score(&input.element_scores))
        }
    };

    let normative_level: Option<NormativeLevel> = match (total_score, rule.as_ref()) {
        (Some(score), Some(r)) => Some(classify(score, &r.thresholds)),
        _ => None,
    };
    if normative_level.is_none() {
        warn!(
            student = %student.id,
            assessment = %assessment.id,
            age,
            gender = student.gender.as_str(),
            "no applicable threshold; record saved unclassified"
        );
    }

    let write = RecordWrite {
        student_id: input.student_id.clone(),
        class_id: input.class_id.clone(),
        assessment_id: input.assessment_id.clone(),
        assessment_period_id: input.assessment_period_id.clone(),
        element_scores: input.element_scores.clone(),
        time_seconds: input.time_seconds,
        total_score,
        normative_level,
        notes: input.notes.clone(),
    };
    let up = store.upsert_assessment_record(&write, 1)?;
    debug!(
        record = %up.row.id,
        created = up.created,
        version = up.row.version,
        "assessment record saved"
    );

    Ok(SavedRecord {
        record: up.row,
        created: up.created,
        threshold_rule_id: if normative_level.is_some() {
            rule.map(|r| r.id)
        } else {
            None
        },
    })
}
