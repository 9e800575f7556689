// ✅ Data Quality Engine
// Rule-based checks over pulled observations plus the cleaning pass that
// feeds the parquet artifact. Critical issues drop a row; warnings and info
// only lower its quality score.

use serde::{Deserialize, Serialize};

use crate::schema::{extract_year, Observation};

// ============================================================================
// VALIDATION RESULT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub passed: bool,
    pub rule_name: String,
    pub field: String,
    pub message: String,
    pub severity: Severity,
}

impl ValidationResult {
    pub fn pass(rule_name: &str, field: &str, message: &str) -> Self {
        ValidationResult {
            passed: true,
            rule_name: rule_name.to_string(),
            field: field.to_string(),
            message: message.to_string(),
            severity: Severity::Info,
        }
    }

    pub fn fail(rule_name: &str, field: &str, message: &str, severity: Severity) -> Self {
        ValidationResult {
            passed: false,
            rule_name: rule_name.to_string(),
            field: field.to_string(),
            message: message.to_string(),
            severity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Severity {
    Critical, // Row is unusable for aggregation and gets dropped
    Warning,  // Row is questionable but kept
    Info,     // Row is fine, field could be richer
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityIssue {
    pub severity: Severity,
    pub field: String,
    pub issue: String,
}

// ============================================================================
// QUALITY REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub series_hash: String,
    pub quality: f64,
    pub validations: Vec<ValidationResult>,
    pub issues: Vec<QualityIssue>,
    pub passed_count: usize,
    pub failed_count: usize,
}

impl QualityReport {
    pub fn has_critical_issues(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Critical)
    }

    pub fn summary(&self) -> String {
        format!(
            "Quality: {:.1}%, Issues: {} ({} critical)",
            self.quality * 100.0,
            self.issues.len(),
            self.issues
                .iter()
                .filter(|i| i.severity == Severity::Critical)
                .count()
        )
    }
}

/// Outcome of cleaning a whole batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub kept: usize,
    pub dropped: usize,
    pub warnings: usize,
}

impl BatchSummary {
    pub fn summary(&self) -> String {
        format!(
            "{} observations: {} kept, {} dropped, {} with warnings",
            self.total, self.kept, self.dropped, self.warnings
        )
    }
}

// ============================================================================
// QUALITY ENGINE
// ============================================================================

pub struct QualityEngine {
    /// Observation frequencies the pipeline expects to see.
    known_frequencies: Vec<String>,
}

impl QualityEngine {
    pub fn new() -> Self {
        QualityEngine {
            known_frequencies: vec!["A".to_string(), "Q".to_string(), "M".to_string()],
        }
    }

    /// Validate one observation and produce its quality report.
    pub fn validate(&self, obs: &Observation) -> QualityReport {
        let mut validations = Vec::new();

        validations.push(self.check_obs_value(obs));
        validations.push(self.check_ref_sector(obs));
        validations.push(self.check_year(obs));
        validations.push(self.check_freq(obs));
        validations.push(self.check_ref_area(obs));
        validations.push(self.check_unit_measure(obs));

        let issues: Vec<QualityIssue> = validations
            .iter()
            .filter(|v| !v.passed)
            .map(|v| QualityIssue {
                severity: v.severity,
                field: v.field.clone(),
                issue: v.message.clone(),
            })
            .collect();

        let passed_count = validations.iter().filter(|v| v.passed).count();
        let failed_count = validations.len() - passed_count;
        let quality = passed_count as f64 / validations.len() as f64;

        QualityReport {
            series_hash: obs.compute_series_hash(),
            quality,
            validations,
            issues,
            passed_count,
            failed_count,
        }
    }

    /// Clean a batch: rows with any critical issue are dropped, everything
    /// else survives. Mirrors dropping rows with a missing value, missing
    /// sector or unreadable period before charting.
    pub fn clean(&self, observations: Vec<Observation>) -> (Vec<Observation>, BatchSummary) {
        let total = observations.len();
        let mut kept = Vec::with_capacity(total);
        let mut dropped = 0;
        let mut warnings = 0;

        for obs in observations {
            let report = self.validate(&obs);
            if report.has_critical_issues() {
                dropped += 1;
                continue;
            }
            if report.failed_count > 0 {
                warnings += 1;
            }
            kept.push(obs);
        }

        let summary = BatchSummary {
            total,
            kept: kept.len(),
            dropped,
            warnings,
        };
        (kept, summary)
    }

    fn check_obs_value(&self, obs: &Observation) -> ValidationResult {
        match obs.obs_value {
            Some(v) if v.is_finite() => {
                ValidationResult::pass("obs_value_present", "OBS_VALUE", "Value present")
            }
            Some(v) => ValidationResult::fail(
                "obs_value_present",
                "OBS_VALUE",
                &format!("Non-finite value: {}", v),
                Severity::Critical,
            ),
            None => ValidationResult::fail(
                "obs_value_present",
                "OBS_VALUE",
                "Missing observation value",
                Severity::Critical,
            ),
        }
    }

    fn check_ref_sector(&self, obs: &Observation) -> ValidationResult {
        if obs.ref_sector.is_empty() {
            ValidationResult::fail(
                "ref_sector_present",
                "REF_SECTOR",
                "Missing reporting sector",
                Severity::Critical,
            )
        } else {
            ValidationResult::pass("ref_sector_present", "REF_SECTOR", "Sector present")
        }
    }

    fn check_year(&self, obs: &Observation) -> ValidationResult {
        if extract_year(&obs.time_period).is_some() {
            ValidationResult::pass("year_extractable", "TIME_PERIOD", "Year readable")
        } else {
            ValidationResult::fail(
                "year_extractable",
                "TIME_PERIOD",
                &format!("No calendar year in '{}'", obs.time_period),
                Severity::Critical,
            )
        }
    }

    fn check_freq(&self, obs: &Observation) -> ValidationResult {
        if self.known_frequencies.contains(&obs.freq) {
            ValidationResult::pass("freq_known", "FREQ", "Known frequency")
        } else {
            ValidationResult::fail(
                "freq_known",
                "FREQ",
                &format!("Unexpected frequency '{}'", obs.freq),
                Severity::Warning,
            )
        }
    }

    fn check_ref_area(&self, obs: &Observation) -> ValidationResult {
        let ok = obs.ref_area.len() == 2
            && obs.ref_area.chars().all(|c| c.is_ascii_uppercase());
        if ok {
            ValidationResult::pass("ref_area_code", "REF_AREA", "Two-letter area code")
        } else {
            ValidationResult::fail(
                "ref_area_code",
                "REF_AREA",
                &format!("Not a two-letter area code: '{}'", obs.ref_area),
                Severity::Warning,
            )
        }
    }

    fn check_unit_measure(&self, obs: &Observation) -> ValidationResult {
        if obs.unit_measure.is_empty() {
            ValidationResult::fail(
                "unit_measure_present",
                "UNIT_MEASURE",
                "Missing unit of measure",
                Severity::Info,
            )
        } else {
            ValidationResult::pass("unit_measure_present", "UNIT_MEASURE", "Unit present")
        }
    }
}

impl Default for QualityEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::tests::sample_observation;

    #[test]
    fn test_clean_observation_passes() {
        let engine = QualityEngine::new();
        let report = engine.validate(&sample_observation());

        assert!(!report.has_critical_issues());
        assert_eq!(report.failed_count, 0);
        assert!((report.quality - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_missing_value_is_critical() {
        let engine = QualityEngine::new();
        let mut obs = sample_observation();
        obs.obs_value = None;

        let report = engine.validate(&obs);
        assert!(report.has_critical_issues());
        assert!(report.issues.iter().any(|i| i.field == "OBS_VALUE"));
    }

    #[test]
    fn test_nan_value_is_critical() {
        let engine = QualityEngine::new();
        let mut obs = sample_observation();
        obs.obs_value = Some(f64::INFINITY);

        assert!(engine.validate(&obs).has_critical_issues());
    }

    #[test]
    fn test_missing_sector_is_critical() {
        let engine = QualityEngine::new();
        let mut obs = sample_observation();
        obs.ref_sector = String::new();

        assert!(engine.validate(&obs).has_critical_issues());
    }

    #[test]
    fn test_unknown_freq_is_warning_only() {
        let engine = QualityEngine::new();
        let mut obs = sample_observation();
        obs.freq = "W".to_string();

        let report = engine.validate(&obs);
        assert!(!report.has_critical_issues());
        assert_eq!(report.failed_count, 1);
        assert!(report.quality < 1.0);
    }

    #[test]
    fn test_clean_drops_only_critical_rows() {
        let engine = QualityEngine::new();

        let good = sample_observation();

        let mut no_value = sample_observation();
        no_value.time_period = "2016".to_string();
        no_value.obs_value = None;

        let mut no_sector = sample_observation();
        no_sector.time_period = "2017".to_string();
        no_sector.ref_sector = String::new();

        let mut odd_freq = sample_observation();
        odd_freq.time_period = "2018".to_string();
        odd_freq.freq = "W".to_string();

        let (kept, summary) = engine.clean(vec![good, no_value, no_sector, odd_freq]);

        assert_eq!(summary.total, 4);
        assert_eq!(summary.kept, 2);
        assert_eq!(summary.dropped, 2);
        assert_eq!(summary.warnings, 1);
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|o| o.obs_value.is_some()));
        assert!(kept.iter().all(|o| !o.ref_sector.is_empty()));
    }
}
