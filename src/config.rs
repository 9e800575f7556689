// ⚙️ Pipeline Configuration
// Endpoint templates, dataflow identifiers and tuning knobs.
// Defaults match the published BIS SDMX v2 endpoints; the CLI can override
// any of them (flags or environment).

use std::path::PathBuf;

/// `{dataflow_id}` / `{version}` / `{key}` placeholders are substituted at
/// request time.
pub const DEFAULT_DATA_URL: &str =
    "https://stats.bis.org/api/v2/data/dataflow/BIS/{dataflow_id}/{version}/{key}";

/// `{dsd_id}` / `{version}` placeholders.
pub const DEFAULT_STRUCTURE_URL: &str =
    "https://stats.bis.org/api/v2/structure/datastructure/BIS/{dsd_id}/{version}";

/// `{agency}` / `{codelist_id}` / `{version}` placeholders.
pub const DEFAULT_CODELIST_URL: &str =
    "https://stats.bis.org/api/v2/structure/codelist/{agency}/{codelist_id}/{version}";

/// Dataflow and data-structure coordinates for one of the two BIS sources.
#[derive(Debug, Clone)]
pub struct DataflowRef {
    pub dataflow_id: String,
    pub dataflow_version: String,
    pub dsd_id: String,
    pub dsd_version: String,
}

impl DataflowRef {
    /// Domestic debt securities: national-accounts DSS dataflow.
    pub fn domestic() -> Self {
        DataflowRef {
            dataflow_id: "WS_NA_SEC_DSS".to_string(),
            dataflow_version: "1.0".to_string(),
            dsd_id: "NA_SEC".to_string(),
            dsd_version: "1.0".to_string(),
        }
    }

    /// International debt securities: BIS-compiled IDS dataflow.
    pub fn international() -> Self {
        DataflowRef {
            dataflow_id: "WS_DEBT_SEC2_PUB".to_string(),
            dataflow_version: "1.0".to_string(),
            dsd_id: "BIS_DEBT_SEC2".to_string(),
            dsd_version: "1.0".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    // ========================================================================
    // ENDPOINTS
    // ========================================================================
    pub data_base_url: String,
    pub structure_base_url: String,
    pub codelist_base_url: String,

    // ========================================================================
    // PULL WINDOW
    // ========================================================================
    pub start_period: String,
    pub end_period: String,

    // ========================================================================
    // REQUEST TUNING
    // ========================================================================
    /// Jittered sleep bounds between retries, in seconds.
    pub sleep_min_seconds: f64,
    pub sleep_max_seconds: f64,
    pub max_retries: usize,
    /// Countries per data request; 0 disables batching.
    pub ref_area_batch_size: usize,

    // ========================================================================
    // ARTIFACTS
    // ========================================================================
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            data_base_url: DEFAULT_DATA_URL.to_string(),
            structure_base_url: DEFAULT_STRUCTURE_URL.to_string(),
            codelist_base_url: DEFAULT_CODELIST_URL.to_string(),
            start_period: "2003".to_string(),
            end_period: "2020".to_string(),
            sleep_min_seconds: 2.0,
            sleep_max_seconds: 4.0,
            max_retries: 5,
            ref_area_batch_size: 3,
            data_dir: PathBuf::from("_data"),
            output_dir: PathBuf::from("_output"),
        }
    }
}

impl PipelineConfig {
    /// SQLite store for raw pulled observations.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("bis_debt_securities.db")
    }

    /// Cleaned columnar artifact consumed by the aggregation step.
    pub fn cleaned_parquet_path(&self) -> PathBuf {
        self.data_dir.join("bis_debt_securities_cleaned.parquet")
    }

    /// Chart-data artifacts (CSV and JSON forms share the stem).
    pub fn chart_data_stem(&self) -> PathBuf {
        self.output_dir.join("obs_value_by_sector")
    }
}
