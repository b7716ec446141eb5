use uuid::Uuid;

use super::{
    now_timestamp, AssessmentDefinition, AssessmentElement, AssessmentRecord, NewAssessment,
    NewThresholdRule, RecordWrite, Store, StudentProfile, ThresholdRule, Upserted,
};
use crate::calc::Gender;
use crate::error::StoreError;

/// Vec-backed store. Used for dry-run imports and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    pub assessments: Vec<AssessmentDefinition>,
    pub elements: Vec<AssessmentElement>,
    pub rules: Vec<ThresholdRule>,
    pub students: Vec<StudentProfile>,
    pub records: Vec<AssessmentRecord>,
}

impl MemoryStore {
    pub fn insert_student(&mut self, student: StudentProfile) {
        self.students.retain(|s| s.id != student.id);
        self.students.push(student);
    }
}

impl Store for MemoryStore {
    fn find_assessment(
        &self,
        assessment_id: &str,
    ) -> Result<Option<AssessmentDefinition>, StoreError> {
        Ok(self
            .assessments
            .iter()
            .find(|a| a.id == assessment_id)
            .cloned())
    }

    fn list_assessment_elements(
        &self,
        assessment_id: &str,
    ) -> Result<Vec<AssessmentElement>, StoreError> {
        let mut out: Vec<AssessmentElement> = self
            .elements
            .iter()
            .filter(|e| e.assessment_id == assessment_id)
            .cloned()
            .collect();
        out.sort_by_key(|e| e.order);
        Ok(out)
    }

    fn find_student(&self, student_id: &str) -> Result<Option<StudentProfile>, StoreError> {
        Ok(self.students.iter().find(|s| s.id == student_id).cloned())
    }

    fn find_threshold_rule(
        &self,
        assessment_id: &str,
        age_years: i64,
        gender: Option<Gender>,
    ) -> Result<Option<ThresholdRule>, StoreError> {
        Ok(self
            .rules
            .iter()
            .find(|r| {
                r.assessment_id == assessment_id && r.age_years == age_years && r.gender == gender
            })
            .cloned())
    }

    fn upsert_assessment_definition(
        &mut self,
        new: &NewAssessment,
    ) -> Result<Upserted<AssessmentDefinition>, StoreError> {
        if let Some(existing) = self
            .assessments
            .iter()
            .find(|a| a.name == new.name && a.framework == new.framework)
        {
            return Ok(Upserted {
                row: existing.clone(),
                created: false,
            });
        }
        let row = AssessmentDefinition {
            id: Uuid::new_v4().to_string(),
            name: new.name.clone(),
            description: Some(new.description.clone()),
            framework: new.framework.clone(),
            kind: new.kind,
            active: true,
            version: 1,
        };
        self.assessments.push(row.clone());
        Ok(Upserted { row, created: true })
    }

    fn upsert_assessment_element(
        &mut self,
        element: &AssessmentElement,
    ) -> Result<Upserted<AssessmentElement>, StoreError> {
        if let Some(existing) = self.elements.iter().find(|e| e.id == element.id) {
            return Ok(Upserted {
                row: existing.clone(),
                created: false,
            });
        }
        self.elements.push(element.clone());
        Ok(Upserted {
            row: element.clone(),
            created: true,
        })
    }

    fn insert_threshold_rule(
        &mut self,
        rule: &NewThresholdRule,
    ) -> Result<ThresholdRule, StoreError> {
        let row = ThresholdRule {
            id: Uuid::new_v4().to_string(),
            assessment_id: rule.assessment_id.clone(),
            year_level: rule.year_level.clone(),
            age_years: rule.age_years,
            gender: rule.gender,
            thresholds: rule.thresholds,
            reference_seconds: rule.reference_seconds,
        };
        self.rules.push(row.clone());
        Ok(row)
    }

    fn find_assessment_record(
        &self,
        student_id: &str,
        assessment_id: &str,
        assessment_period_id: &str,
    ) -> Result<Option<AssessmentRecord>, StoreError> {
        Ok(self
            .records
            .iter()
            .find(|r| {
                r.student_id == student_id
                    && r.assessment_id == assessment_id
                    && r.assessment_period_id == assessment_period_id
            })
            .cloned())
    }

    fn upsert_assessment_record(
        &mut self,
        write: &RecordWrite,
        version_increment: i64,
    ) -> Result<Upserted<AssessmentRecord>, StoreError> {
        let now = now_timestamp();
        if let Some(existing) = self.records.iter_mut().find(|r| {
            r.student_id == write.student_id
                && r.assessment_id == write.assessment_id
                && r.assessment_period_id == write.assessment_period_id
        }) {
            existing.element_scores = write.element_scores.clone();
            existing.time_seconds = write.time_seconds;
            existing.total_score = write.total_score;
            existing.normative_level = write.normative_level;
            existing.notes = write.notes.clone();
            existing.version += version_increment;
            existing.updated_at = now;
            return Ok(Upserted {
                row: existing.clone(),
                created: false,
            });
        }

        let row = AssessmentRecord {
            id: Uuid::new_v4().to_string(),
            student_id: write.student_id.clone(),
            class_id: write.class_id.clone(),
            assessment_id: write.assessment_id.clone(),
            assessment_period_id: write.assessment_period_id.clone(),
            element_scores: write.element_scores.clone(),
            time_seconds: write.time_seconds,
            total_score: write.total_score,
            normative_level: write.normative_level,
            notes: write.notes.clone(),
            version: 1,
            server_version: 0,
            sync_status: "pending".to_string(),
            conflict_detected: false,
            created_at: now.clone(),
            updated_at: now,
        };
        self.records.push(row.clone());
        Ok(Upserted { row, created: true })
    }
}
