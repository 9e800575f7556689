// 📐 Observation Schema - BIS Debt Securities Statistics
// One row per observation tuple of the documented dataset columns

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ============================================================================
// OBSERVATION
// ============================================================================

/// A single BIS DSS observation.
/// The 18 documented columns carry the uppercase SDMX names on the wire;
/// `dataflow` and `market` are pipeline provenance and stay out of the
/// cleaned artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Observation {
    #[serde(rename = "FREQ")]
    pub freq: String,

    #[serde(rename = "ADJUSTMENT")]
    pub adjustment: String,

    #[serde(rename = "REF_AREA")]
    pub ref_area: String,

    #[serde(rename = "COUNTERPART_AREA")]
    pub counterpart_area: String,

    #[serde(rename = "REF_SECTOR")]
    pub ref_sector: String,

    #[serde(rename = "COUNTERPART_SECTOR")]
    pub counterpart_sector: String,

    #[serde(rename = "CONSOLIDATION")]
    pub consolidation: String,

    #[serde(rename = "ACCOUNTING_ENTRY")]
    pub accounting_entry: String,

    #[serde(rename = "STO")]
    pub sto: String,

    #[serde(rename = "INSTR_ASSET")]
    pub instr_asset: String,

    #[serde(rename = "MATURITY")]
    pub maturity: String,

    #[serde(rename = "UNIT_MEASURE")]
    pub unit_measure: String,

    #[serde(rename = "CURRENCY")]
    pub currency: String,

    #[serde(rename = "VALUATION")]
    pub valuation: String,

    #[serde(rename = "PRICES")]
    pub prices: String,

    #[serde(rename = "TRANSFORMATION")]
    pub transformation: String,

    #[serde(rename = "TIME_PERIOD")]
    pub time_period: String,

    /// Missing in the source payload when the series has a gap.
    #[serde(rename = "OBS_VALUE")]
    pub obs_value: Option<f64>,

    // ========================================================================
    // PROVENANCE (pipeline-only, not part of the dataset schema)
    // ========================================================================
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dataflow: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub market: String,
}

/// The documented column names, in dataset order.
pub const COLUMNS: [&str; 18] = [
    "FREQ",
    "ADJUSTMENT",
    "REF_AREA",
    "COUNTERPART_AREA",
    "REF_SECTOR",
    "COUNTERPART_SECTOR",
    "CONSOLIDATION",
    "ACCOUNTING_ENTRY",
    "STO",
    "INSTR_ASSET",
    "MATURITY",
    "UNIT_MEASURE",
    "CURRENCY",
    "VALUATION",
    "PRICES",
    "TRANSFORMATION",
    "TIME_PERIOD",
    "OBS_VALUE",
];

impl Observation {
    /// Dimension values in column order (everything except OBS_VALUE).
    pub fn dimension_values(&self) -> [&str; 17] {
        [
            &self.freq,
            &self.adjustment,
            &self.ref_area,
            &self.counterpart_area,
            &self.ref_sector,
            &self.counterpart_sector,
            &self.consolidation,
            &self.accounting_entry,
            &self.sto,
            &self.instr_asset,
            &self.maturity,
            &self.unit_measure,
            &self.currency,
            &self.valuation,
            &self.prices,
            &self.transformation,
            &self.time_period,
        ]
    }

    /// Compute series hash for duplicate detection.
    /// Two pulls of the same (dimension tuple, period) collapse to one row.
    pub fn compute_series_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.dimension_values().join("|"));
        format!("{:x}", hasher.finalize())
    }

    /// Calendar year of the observation, if one can be read from TIME_PERIOD.
    pub fn year(&self) -> Option<i32> {
        extract_year(&self.time_period)
    }
}

/// Extract the first 4-digit run from a period string.
/// Handles annual (`2015`) and quarterly (`2015-Q3`) periods alike.
pub fn extract_year(time_period: &str) -> Option<i32> {
    let bytes = time_period.as_bytes();
    let mut run_start = None;
    for (i, b) in bytes.iter().enumerate() {
        if b.is_ascii_digit() {
            let start = *run_start.get_or_insert(i);
            if i - start == 3 {
                return time_period[start..=i].parse().ok();
            }
        } else {
            run_start = None;
        }
    }
    None
}

// ============================================================================
// VALIDATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// Validates observations against the core dataset schema before they enter
/// the store. Quality scoring and cleaning live in `quality.rs`.
pub struct ObservationValidator;

impl ObservationValidator {
    pub fn new() -> Self {
        ObservationValidator
    }

    pub fn validate(&self, obs: &Observation) -> ValidationResult {
        let mut errors = Vec::new();

        if obs.freq.is_empty() {
            errors.push(ValidationError {
                field: "FREQ".to_string(),
                message: "Required field is empty".to_string(),
            });
        }

        if obs.ref_area.is_empty() {
            errors.push(ValidationError {
                field: "REF_AREA".to_string(),
                message: "Required field is empty".to_string(),
            });
        }

        if obs.time_period.is_empty() {
            errors.push(ValidationError {
                field: "TIME_PERIOD".to_string(),
                message: "Required field is empty".to_string(),
            });
        } else if extract_year(&obs.time_period).is_none() {
            errors.push(ValidationError {
                field: "TIME_PERIOD".to_string(),
                message: format!("No calendar year in '{}'", obs.time_period),
            });
        }

        if let Some(value) = obs.obs_value {
            if !value.is_finite() {
                errors.push(ValidationError {
                    field: "OBS_VALUE".to_string(),
                    message: format!("Not a finite number: {}", value),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl Default for ObservationValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Shared test fixture: a plausible domestic observation.
    pub(crate) fn sample_observation() -> Observation {
        Observation {
            freq: "A".to_string(),
            adjustment: "N".to_string(),
            ref_area: "AU".to_string(),
            counterpart_area: "XW".to_string(),
            ref_sector: "S13".to_string(),
            counterpart_sector: "S1".to_string(),
            consolidation: "N".to_string(),
            accounting_entry: "L".to_string(),
            sto: "LE".to_string(),
            instr_asset: "F3".to_string(),
            maturity: "L".to_string(),
            unit_measure: "USD".to_string(),
            currency: "XDC".to_string(),
            valuation: "N".to_string(),
            prices: "V".to_string(),
            transformation: "N".to_string(),
            time_period: "2015".to_string(),
            obs_value: Some(1234.5),
            dataflow: "WS_NA_SEC_DSS".to_string(),
            market: "domestic".to_string(),
        }
    }

    #[test]
    fn test_extract_year_annual() {
        assert_eq!(extract_year("2015"), Some(2015));
    }

    #[test]
    fn test_extract_year_quarterly() {
        assert_eq!(extract_year("2015-Q3"), Some(2015));
        assert_eq!(extract_year("Q3-2015"), Some(2015));
    }

    #[test]
    fn test_extract_year_missing() {
        assert_eq!(extract_year(""), None);
        assert_eq!(extract_year("Q3"), None);
        assert_eq!(extract_year("abc-12"), None);
    }

    #[test]
    fn test_series_hash_stable() {
        let obs = sample_observation();
        assert_eq!(obs.compute_series_hash(), obs.compute_series_hash());
        assert_eq!(obs.compute_series_hash().len(), 64);
    }

    #[test]
    fn test_series_hash_ignores_value() {
        let a = sample_observation();
        let mut b = sample_observation();
        b.obs_value = Some(999.0);
        // Same series + period, different value: same row identity
        assert_eq!(a.compute_series_hash(), b.compute_series_hash());
    }

    #[test]
    fn test_series_hash_differs_per_period() {
        let a = sample_observation();
        let mut b = sample_observation();
        b.time_period = "2016".to_string();
        assert_ne!(a.compute_series_hash(), b.compute_series_hash());
    }

    #[test]
    fn test_validate_ok() {
        let validator = ObservationValidator::new();
        assert!(validator.validate(&sample_observation()).is_ok());
    }

    #[test]
    fn test_validate_missing_required() {
        let validator = ObservationValidator::new();
        let mut obs = sample_observation();
        obs.ref_area = String::new();

        let errors = validator.validate(&obs).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "REF_AREA");
    }

    #[test]
    fn test_validate_bad_period() {
        let validator = ObservationValidator::new();
        let mut obs = sample_observation();
        obs.time_period = "Q3".to_string();

        let errors = validator.validate(&obs).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "TIME_PERIOD"));
    }

    #[test]
    fn test_validate_non_finite_value() {
        let validator = ObservationValidator::new();
        let mut obs = sample_observation();
        obs.obs_value = Some(f64::NAN);

        assert!(validator.validate(&obs).is_err());
    }
}
