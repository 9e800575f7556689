// 📄 SDMX-CSV Parser
// Turns raw data-endpoint payloads into unified observations.
// Header-addressed: the BIS CSV carries extra columns (DATAFLOW, OBS_STATUS,
// attribute columns) that the parser ignores, and the two dataflows name
// their dimensions differently.

use std::collections::HashMap;

use anyhow::{Context, Result};

use crate::schema::{Observation, COLUMNS};

/// How one dataflow's CSV columns map onto the unified dataset schema.
#[derive(Debug, Clone)]
pub struct DataflowMapping {
    pub dataflow: &'static str,
    pub market: &'static str,
    /// (csv column, schema column) renames.
    pub renames: &'static [(&'static str, &'static str)],
    /// (schema column, value) constants for dimensions the dataflow lacks.
    pub fixed: &'static [(&'static str, &'static str)],
}

/// Domestic debt securities (WS_NA_SEC_DSS). Columns already use the dataset
/// names except the currency-of-denomination dimension.
pub fn domestic_mapping() -> DataflowMapping {
    DataflowMapping {
        dataflow: "WS_NA_SEC_DSS",
        market: "domestic",
        renames: &[("CURRENCY_DENOM", "CURRENCY")],
        fixed: &[],
    }
}

/// International debt securities (WS_DEBT_SEC2_PUB). Issuer residence plays
/// the reporting-country role and there is no sector breakdown.
pub fn international_mapping() -> DataflowMapping {
    DataflowMapping {
        dataflow: "WS_DEBT_SEC2_PUB",
        market: "international",
        renames: &[
            ("ISSUER_RES", "REF_AREA"),
            ("ISSUE_OR_MAT", "MATURITY"),
        ],
        fixed: &[("REF_SECTOR", "ALL")],
    }
}

/// Parse one data payload into observations.
/// Rows keep a missing OBS_VALUE as `None`; the quality engine decides what
/// to do with them.
pub fn parse_sdmx_csv(payload: &str, mapping: &DataflowMapping) -> Result<Vec<Observation>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(payload.as_bytes());

    let headers = reader
        .headers()
        .context("Failed to read CSV header row")?
        .clone();
    let header_index: HashMap<&str, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h, i))
        .collect();

    // schema column -> csv column it reads from
    let mut source_columns: HashMap<&str, &str> = COLUMNS.iter().map(|c| (*c, *c)).collect();
    for (csv_col, schema_col) in mapping.renames {
        source_columns.insert(schema_col, csv_col);
    }

    let mut observations = Vec::new();

    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Malformed CSV record at line {}", line + 2))?;

        let field = |schema_col: &str| -> String {
            source_columns
                .get(schema_col)
                .and_then(|csv_col| header_index.get(*csv_col))
                .and_then(|&i| record.get(i))
                .unwrap_or("")
                .trim()
                .to_string()
        };

        let mut obs = Observation {
            freq: field("FREQ"),
            adjustment: field("ADJUSTMENT"),
            ref_area: field("REF_AREA"),
            counterpart_area: field("COUNTERPART_AREA"),
            ref_sector: field("REF_SECTOR"),
            counterpart_sector: field("COUNTERPART_SECTOR"),
            consolidation: field("CONSOLIDATION"),
            accounting_entry: field("ACCOUNTING_ENTRY"),
            sto: field("STO"),
            instr_asset: field("INSTR_ASSET"),
            maturity: field("MATURITY"),
            unit_measure: field("UNIT_MEASURE"),
            currency: field("CURRENCY"),
            valuation: field("VALUATION"),
            prices: field("PRICES"),
            transformation: field("TRANSFORMATION"),
            time_period: field("TIME_PERIOD"),
            obs_value: parse_value(&field("OBS_VALUE")),
            dataflow: mapping.dataflow.to_string(),
            market: mapping.market.to_string(),
        };

        for (schema_col, value) in mapping.fixed {
            apply_fixed(&mut obs, schema_col, value);
        }

        observations.push(obs);
    }

    Ok(observations)
}

fn parse_value(raw: &str) -> Option<f64> {
    if raw.is_empty() || raw.eq_ignore_ascii_case("nan") {
        return None;
    }
    raw.parse::<f64>().ok()
}

fn apply_fixed(obs: &mut Observation, schema_col: &str, value: &str) {
    let slot = match schema_col {
        "FREQ" => &mut obs.freq,
        "ADJUSTMENT" => &mut obs.adjustment,
        "REF_AREA" => &mut obs.ref_area,
        "COUNTERPART_AREA" => &mut obs.counterpart_area,
        "REF_SECTOR" => &mut obs.ref_sector,
        "COUNTERPART_SECTOR" => &mut obs.counterpart_sector,
        "CONSOLIDATION" => &mut obs.consolidation,
        "ACCOUNTING_ENTRY" => &mut obs.accounting_entry,
        "STO" => &mut obs.sto,
        "INSTR_ASSET" => &mut obs.instr_asset,
        "MATURITY" => &mut obs.maturity,
        "UNIT_MEASURE" => &mut obs.unit_measure,
        "CURRENCY" => &mut obs.currency,
        "VALUATION" => &mut obs.valuation,
        "PRICES" => &mut obs.prices,
        "TRANSFORMATION" => &mut obs.transformation,
        "TIME_PERIOD" => &mut obs.time_period,
        _ => return,
    };
    *slot = value.to_string();
}
