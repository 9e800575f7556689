// BIS Debt Securities Statistics Pipeline - Core Library
// Exposes all modules for use in the CLI and tests

pub mod config;
pub mod sdmx;       // SDMX v2 client: structure, codelists, data CSV
pub mod countries;  // Country name -> reference-area code resolution
pub mod schema;     // Observation record + core validation
pub mod parser;     // SDMX-CSV payload parsing
pub mod pull;       // Domestic + international pull orchestration
pub mod db;         // SQLite observation store + audit trail
pub mod quality;    // Quality engine + cleaning pass
pub mod parquet;    // Cleaned columnar artifact
pub mod aggregate;  // Year x sector chart aggregation

// Re-export commonly used types
pub use aggregate::{aggregate_by_year_sector, write_chart_csv, write_chart_json, SectorYearAverage};
pub use config::{DataflowRef, PipelineConfig};
pub use countries::{resolve_country_codes, TARGET_COUNTRIES};
pub use db::{
    get_all_observations, get_dataflow_stats, insert_event, insert_observations,
    setup_database, verify_count, DataflowStat, Event, InsertOutcome,
};
pub use parser::{domestic_mapping, international_mapping, parse_sdmx_csv, DataflowMapping};
pub use pull::{pull_debt_securities, PullRun};
pub use quality::{BatchSummary, QualityEngine, QualityIssue, QualityReport, Severity};
pub use schema::{extract_year, Observation, ObservationValidator};
pub use sdmx::{Codelist, Dimension, KeyBuilder, SdmxClient, SdmxError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
