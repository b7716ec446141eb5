use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::StoreError;
use crate::store::{Store, ThresholdRule};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormativeLevel {
    Beginning,
    Progressing,
    Achieving,
    Excelling,
}

impl NormativeLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            NormativeLevel::Beginning => "beginning",
            NormativeLevel::Progressing => "progressing",
            NormativeLevel::Achieving => "achieving",
            NormativeLevel::Excelling => "excelling",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "beginning" => Some(NormativeLevel::Beginning),
            "progressing" => Some(NormativeLevel::Progressing),
            "achieving" => Some(NormativeLevel::Achieving),
            "excelling" => Some(NormativeLevel::Excelling),
            _ => None,
        }
    }

    /// Display text for a possibly-unclassified record.
    pub fn label(level: Option<Self>) -> &'static str {
        match level {
            Some(NormativeLevel::Beginning) => "Beginning",
            Some(NormativeLevel::Progressing) => "Progressing",
            Some(NormativeLevel::Achieving) => "Achieving",
            Some(NormativeLevel::Excelling) => "Excelling",
            None => "Not Assessed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Male => "MALE",
            Gender::Female => "FEMALE",
            Gender::Other => "OTHER",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MALE" => Some(Gender::Male),
            "FEMALE" => Some(Gender::Female),
            "OTHER" => Some(Gender::Other),
            _ => None,
        }
    }
}

/// Inclusive `[low, high]` score range. Serialized as a two-element array;
/// `{ "min": .., "max": .. }` is accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "RangeRepr")]
pub struct ScoreRange(pub f64, pub f64);

#[derive(Deserialize)]
#[serde(untagged)]
enum RangeRepr {
    Pair([f64; 2]),
    MinMax { min: f64, max: f64 },
}

impl From<RangeRepr> for ScoreRange {
    fn from(r: RangeRepr) -> Self {
        match r {
            RangeRepr::Pair([lo, hi]) => ScoreRange(lo, hi),
            RangeRepr::MinMax { min, max } => ScoreRange(min, max),
        }
    }
}

impl ScoreRange {
    pub fn contains(&self, score: f64) -> bool {
        score >= self.0 && score <= self.1
    }
}

/// Four bands for one (assessment, age, gender?) combination. A `None` band
/// never matches.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ThresholdTable {
    #[serde(default)]
    pub beginning: Option<ScoreRange>,
    #[serde(default)]
    pub progressing: Option<ScoreRange>,
    #[serde(default)]
    pub achieving: Option<ScoreRange>,
    #[serde(default)]
    pub excelling: Option<ScoreRange>,
}

fn band_matches(band: Option<ScoreRange>, score: f64) -> bool {
    band.map(|b| b.contains(score)).unwrap_or(false)
}

/// Excelling, then achieving, then progressing; anything else is beginning,
/// including scores below the beginning band. Overlapping bands resolve to
/// the earlier check.
pub fn classify(score: f64, thresholds: &ThresholdTable) -> NormativeLevel {
    if band_matches(thresholds.excelling, score) {
        return NormativeLevel::Excelling;
    }
    if band_matches(thresholds.achieving, score) {
        return NormativeLevel::Achieving;
    }
    if band_matches(thresholds.progressing, score) {
        return NormativeLevel::Progressing;
    }
    NormativeLevel::Beginning
}

/// A single element entry: a checkbox, a numeric score, or blank.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ElementScore {
    Flag(bool),
    Value(f64),
    Blank,
}

impl ElementScore {
    pub fn contribution(self) -> f64 {
        match self {
            ElementScore::Flag(true) => 1.0,
            ElementScore::Flag(false) => 0.0,
            ElementScore::Value(v) if v.is_finite() => v,
            ElementScore::Value(_) | ElementScore::Blank => 0.0,
        }
    }
}

pub fn aggregate_score(element_scores: &BTreeMap<String, ElementScore>) -> f64 {
    element_scores.values().map(|s| s.contribution()).sum()
}

/// `reference / student * 100`; lower times score higher.
pub fn motor_quotient(reference_seconds: f64, student_seconds: f64) -> Option<f64> {
    if reference_seconds <= 0.0 || student_seconds <= 0.0 {
        return None;
    }
    if !reference_seconds.is_finite() || !student_seconds.is_finite() {
        return None;
    }
    Some(reference_seconds / student_seconds * 100.0)
}

/// Gender-specific rule first, then the gender-agnostic one for the same age.
/// `Ok(None)` means there is no table to classify against.
pub fn select_threshold_rule<S: Store + ?Sized>(
    store: &S,
    assessment_id: &str,
    age_years: i64,
    gender: Gender,
) -> Result<Option<ThresholdRule>, StoreError> {
    if let Some(rule) = store.find_threshold_rule(assessment_id, age_years, Some(gender))? {
        return Ok(Some(rule));
    }
    store.find_threshold_rule(assessment_id, age_years, None)
}

/// Whole years between `date_of_birth` and `today`.
pub fn age_on(date_of_birth: NaiveDate, today: NaiveDate) -> i64 {
    let mut age = (today.year() - date_of_birth.year()) as i64;
    if (today.month(), today.day()) < (date_of_birth.month(), date_of_birth.day()) {
        age -= 1;
    }
    age
}

pub fn year_level_from_age(age: i64) -> String {
    match age {
        a if a <= 5 => "Foundation".to_string(),
        6..=12 => format!("Year {}", age - 5),
        _ => "Unknown".to_string(),
    }
}
