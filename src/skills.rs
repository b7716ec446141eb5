use anyhow::Context;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;

use crate::calc::ThresholdTable;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillsDocument {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub generated: Option<String>,
    #[serde(default)]
    pub skill_count: Option<usize>,
    pub skills: Vec<SkillDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SkillDefinition {
    pub id: String,
    pub name: String,
    pub category: String,
    #[serde(flatten)]
    pub shape: SkillShape,
}

/// Age key ("5", "12", ...) to band table.
pub type AgeThresholds = BTreeMap<String, ThresholdTable>;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SkillShape {
    Component {
        #[serde(default)]
        components: Vec<SkillComponent>,
        #[serde(default, rename = "normativeThresholds")]
        normative_thresholds: AgeThresholds,
    },
    #[serde(alias = "time_input")]
    Time {
        #[serde(rename = "ageGroups")]
        age_groups: AgeGroups,
    },
    Rubric {
        #[serde(default)]
        rubric: Option<Rubric>,
        /// Scale given beside the skill instead of inside `rubric`.
        #[serde(default, rename = "rubricScale")]
        rubric_scale: Vec<ScaleLabel>,
        #[serde(default)]
        components: Vec<SkillComponent>,
        #[serde(default, rename = "normativeThresholds")]
        normative_thresholds: AgeThresholds,
    },
    Binary {
        #[serde(default)]
        binary: BTreeMap<String, String>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct SkillComponent {
    pub name: String,
    #[serde(default, rename = "ageExpectancy")]
    pub age_expectancy: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Rubric {
    #[serde(default)]
    pub components: Vec<String>,
    #[serde(default)]
    pub scale: Vec<ScaleLabel>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ScaleLabel {
    Text(String),
    Entry {
        #[serde(default)]
        level: Option<String>,
        #[serde(default)]
        label: Option<String>,
    },
}

impl ScaleLabel {
    /// `level` wins over `label` when an entry has both.
    pub fn text(&self) -> &str {
        match self {
            ScaleLabel::Text(s) => s,
            ScaleLabel::Entry { level, label } => level
                .as_deref()
                .or(label.as_deref())
                .unwrap_or_default(),
        }
    }
}

/// Age groups arrive either as a list of named groups or as a map keyed by
/// group name.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AgeGroups {
    List(Vec<AgeGroup>),
    Map(BTreeMap<String, AgeGroupBody>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgeGroup {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub girls: Option<GenderNorms>,
    #[serde(default)]
    pub boys: Option<GenderNorms>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgeGroupBody {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub girls: Option<GenderNorms>,
    #[serde(default)]
    pub boys: Option<GenderNorms>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenderNorms {
    #[serde(rename = "normativeThresholds")]
    pub normative_thresholds: ThresholdTable,
    #[serde(default, rename = "50th_percentile")]
    pub percentile_50: Option<f64>,
}

impl AgeGroups {
    pub fn to_list(&self) -> Vec<AgeGroup> {
        match self {
            AgeGroups::List(groups) => groups.clone(),
            AgeGroups::Map(map) => map
                .iter()
                .map(|(name, body)| AgeGroup {
                    name: name.clone(),
                    label: body.label.clone(),
                    girls: body.girls.clone(),
                    boys: body.boys.clone(),
                })
                .collect(),
        }
    }
}

impl SkillShape {
    pub fn type_name(&self) -> &'static str {
        match self {
            SkillShape::Component { .. } => "component",
            SkillShape::Time { .. } => "time",
            SkillShape::Rubric { .. } => "rubric",
            SkillShape::Binary { .. } => "binary",
        }
    }
}

pub struct LoadedDocument {
    pub document: SkillsDocument,
    pub sha256: String,
}

pub fn parse_skills_document(bytes: &[u8]) -> anyhow::Result<LoadedDocument> {
    let document: SkillsDocument =
        serde_json::from_slice(bytes).context("skills document is not valid SkillsData JSON")?;
    let sha256 = format!("{:x}", Sha256::digest(bytes));
    Ok(LoadedDocument { document, sha256 })
}

pub fn load_skills_document(path: &Path) -> anyhow::Result<LoadedDocument> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read skills document {}", path.to_string_lossy()))?;
    parse_skills_document(&bytes)
}

/// First run of ASCII digits in `s`, e.g. "6-8" -> 6, "Age 8" -> 8.
pub fn first_integer(s: &str) -> Option<i64> {
    let start = s.find(|c: char| c.is_ascii_digit())?;
    let digits: String = s[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}
