use anyhow::Context;
use rusqlite::Connection;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, error, info, warn};

use crate::calc::{Gender, ThresholdTable};
use crate::db::SqliteStore;
use crate::error::{ImportError, StoreError};
use crate::skills::{
    first_integer, load_skills_document, AgeGroup, AgeThresholds, ScaleLabel, SkillComponent,
    SkillDefinition, SkillShape, SkillsDocument,
};
use crate::store::{AssessmentElement, AssessmentKind, NewAssessment, NewThresholdRule, Store};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub skills_processed: usize,
    pub assessments_created: usize,
    pub elements_created: usize,
    pub rules_created: usize,
}

/// Deterministic element id: `<assessment>_<discriminator>_<index>`.
pub fn element_id(assessment_id: &str, discriminator: &str, index: usize) -> String {
    format!("{assessment_id}_{discriminator}_{index}")
}

/// Imports every skill in order. The first failure aborts the run; writes
/// made before it are kept.
pub fn run_import<S: Store + ?Sized>(
    store: &mut S,
    document: &SkillsDocument,
) -> Result<ImportSummary, ImportError> {
    if let Some(expected) = document.skill_count {
        if expected != document.skills.len() {
            warn!(
                expected,
                actual = document.skills.len(),
                "skillCount does not match the number of skills"
            );
        }
    }

    let mut summary = ImportSummary::default();
    for skill in &document.skills {
        import_skill(store, skill, &mut summary)?;
        summary.skills_processed += 1;
    }

    info!(
        skills = summary.skills_processed,
        assessments_created = summary.assessments_created,
        elements_created = summary.elements_created,
        rules_created = summary.rules_created,
        "skill import finished"
    );
    Ok(summary)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOutcome {
    pub summary: ImportSummary,
    pub run_id: String,
    pub sha256: String,
}

/// Loads a skills document from disk, imports it into the workspace and
/// appends an `import_runs` row.
pub fn import_skills_file(conn: &Connection, path: &Path) -> anyhow::Result<ImportOutcome> {
    let loaded = load_skills_document(path)?;
    let doc = &loaded.document;
    let mut store = SqliteStore::new(conn);
    let summary = match run_import(&mut store, doc) {
        Ok(s) => s,
        Err(e) => {
            error!(source = %path.display(), error = %e, "skill import aborted");
            return Err(e).with_context(|| format!("importing {}", path.display()));
        }
    };
    let run_id = store
        .record_import_run(
            &path.to_string_lossy(),
            doc.version.as_deref(),
            doc.generated.as_deref(),
            doc.skills.len(),
            &loaded.sha256,
            &summary,
        )
        .context("failed to record import run")?;
    Ok(ImportOutcome {
        summary,
        run_id,
        sha256: loaded.sha256,
    })
}

fn import_skill<S: Store + ?Sized>(
    store: &mut S,
    skill: &SkillDefinition,
    summary: &mut ImportSummary,
) -> Result<(), ImportError> {
    let write_err = |source: StoreError| ImportError::Write {
        skill_id: skill.id.clone(),
        source,
    };

    info!(
        skill = %skill.id,
        framework = %skill.category,
        shape = skill.shape.type_name(),
        "importing skill"
    );

    let kind = match &skill.shape {
        SkillShape::Component { .. } => AssessmentKind::Component,
        SkillShape::Time { .. } => AssessmentKind::Time,
        SkillShape::Rubric { .. } => AssessmentKind::Rubric,
        SkillShape::Binary { .. } => AssessmentKind::Binary,
    };
    let assessment = store
        .upsert_assessment_definition(&NewAssessment {
            name: skill.name.clone(),
            description: format!("{} assessment from {} framework", skill.name, skill.category),
            framework: skill.category.clone(),
            kind,
        })
        .map_err(write_err)?;
    if assessment.created {
        summary.assessments_created += 1;
    }
    let assessment_id = assessment.row.id;

    match &skill.shape {
        SkillShape::Component {
            components,
            normative_thresholds,
        } => {
            import_components(store, &assessment_id, components, summary).map_err(write_err)?;
            import_age_thresholds(store, skill, &assessment_id, normative_thresholds, summary)?;
        }
        SkillShape::Time { age_groups } => {
            for group in age_groups.to_list() {
                import_age_group(store, skill, &assessment_id, &group, summary)?;
            }
        }
        SkillShape::Rubric {
            rubric,
            rubric_scale,
            components,
            normative_thresholds,
        } => {
            import_components(store, &assessment_id, components, summary).map_err(write_err)?;
            if let Some(rubric) = rubric {
                let scale = if rubric.scale.is_empty() {
                    rubric_scale
                } else {
                    &rubric.scale
                };
                let labels: Vec<&str> = scale.iter().map(ScaleLabel::text).collect();
                let description = format!("Rubric component: {}", labels.join(", "));
                // Rubric rows follow any component rows.
                let offset = components.len();
                for (i, name) in rubric.components.iter().enumerate() {
                    let element = AssessmentElement {
                        id: element_id(&assessment_id, "rubric", i),
                        assessment_id: assessment_id.clone(),
                        name: name.clone(),
                        description: Some(description.clone()),
                        order: (offset + i + 1) as i64,
                    };
                    let up = store.upsert_assessment_element(&element).map_err(write_err)?;
                    if up.created {
                        summary.elements_created += 1;
                    }
                }
            }
            import_age_thresholds(store, skill, &assessment_id, normative_thresholds, summary)?;
        }
        SkillShape::Binary { binary } => {
            debug!(
                skill = %skill.id,
                labels = ?binary,
                "binary skill: no elements or thresholds"
            );
        }
    }

    Ok(())
}

fn import_components<S: Store + ?Sized>(
    store: &mut S,
    assessment_id: &str,
    components: &[SkillComponent],
    summary: &mut ImportSummary,
) -> Result<(), StoreError> {
    for (i, component) in components.iter().enumerate() {
        let element = AssessmentElement {
            id: element_id(assessment_id, "comp", i),
            assessment_id: assessment_id.to_string(),
            name: component.name.clone(),
            description: Some(format!(
                "Age expectancy: {}",
                component.age_expectancy.as_deref().unwrap_or("N/A")
            )),
            order: (i + 1) as i64,
        };
        let up = store.upsert_assessment_element(&element)?;
        debug!(element = %element.id, created = up.created, "component element");
        if up.created {
            summary.elements_created += 1;
        }
    }
    Ok(())
}

// Gender-agnostic rules, one per age key, always inserted.
fn import_age_thresholds<S: Store + ?Sized>(
    store: &mut S,
    skill: &SkillDefinition,
    assessment_id: &str,
    thresholds: &AgeThresholds,
    summary: &mut ImportSummary,
) -> Result<(), ImportError> {
    let mut by_age: Vec<(i64, &ThresholdTable)> = Vec::with_capacity(thresholds.len());
    for (key, table) in thresholds {
        let age: i64 = key.trim().parse().map_err(|_| ImportError::InvalidSkill {
            skill_id: skill.id.clone(),
            message: format!("age key '{key}' is not a whole number of years"),
        })?;
        by_age.push((age, table));
    }
    by_age.sort_by_key(|(age, _)| *age);

    for (age, table) in by_age {
        insert_rule(
            store,
            skill,
            NewThresholdRule {
                assessment_id: assessment_id.to_string(),
                year_level: format!("Year {age}"),
                age_years: age,
                gender: None,
                thresholds: *table,
                reference_seconds: None,
            },
            summary,
        )?;
    }
    Ok(())
}

fn import_age_group<S: Store + ?Sized>(
    store: &mut S,
    skill: &SkillDefinition,
    assessment_id: &str,
    group: &AgeGroup,
    summary: &mut ImportSummary,
) -> Result<(), ImportError> {
    let age = first_integer(&group.name).ok_or_else(|| ImportError::InvalidSkill {
        skill_id: skill.id.clone(),
        message: format!("age group '{}' does not name an age", group.name),
    })?;
    debug!(
        group = %group.name,
        label = group.label.as_deref().unwrap_or(""),
        age,
        "age group"
    );

    let variants = [(Gender::Female, &group.girls), (Gender::Male, &group.boys)];
    for (gender, norms) in variants {
        let Some(norms) = norms else {
            continue;
        };
        insert_rule(
            store,
            skill,
            NewThresholdRule {
                assessment_id: assessment_id.to_string(),
                year_level: group.name.clone(),
                age_years: age,
                gender: Some(gender),
                thresholds: norms.normative_thresholds,
                reference_seconds: norms.percentile_50,
            },
            summary,
        )?;
    }
    Ok(())
}

fn insert_rule<S: Store + ?Sized>(
    store: &mut S,
    skill: &SkillDefinition,
    rule: NewThresholdRule,
    summary: &mut ImportSummary,
) -> Result<(), ImportError> {
    let row = store
        .insert_threshold_rule(&rule)
        .map_err(|source| ImportError::Write {
            skill_id: skill.id.clone(),
            source,
        })?;
    debug!(
        rule = %row.id,
        age = row.age_years,
        gender = row.gender.map(|g| g.as_str()).unwrap_or("ANY"),
        "threshold rule"
    );
    summary.rules_created += 1;
    Ok(())
}
