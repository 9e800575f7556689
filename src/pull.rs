// ⬇️ Pull Orchestration
// Domestic (WS_NA_SEC_DSS) and international (WS_DEBT_SEC2_PUB) pulls with
// batched reference areas, unified into one observation panel.

use anyhow::{Context, Result};
use log::{info, warn};

use crate::config::{DataflowRef, PipelineConfig};
use crate::countries::resolve_country_codes;
use crate::parser::{domestic_mapping, international_mapping, parse_sdmx_csv};
use crate::schema::{Observation, ObservationValidator};
use crate::sdmx::{Dimension, KeyBuilder, SdmxClient};

// ============================================================================
// FIXED DIMENSION SELECTIONS
// ============================================================================

// Domestic: annual general-government (S13) debt-securities liabilities,
// outstanding positions in USD.
const DOMESTIC_FREQUENCY: &str = "A";
const DOMESTIC_ISSUER_SECTORS: [&str; 1] = ["S13"];
const DOMESTIC_MATURITIES: [&str; 2] = ["S", "L"];
const DOMESTIC_INSTRUMENT: &str = "F3";
const DOMESTIC_ACCOUNTING_ENTRY: &str = "L";
const DOMESTIC_STOCK_POSITION: &str = "LE";
const DOMESTIC_ADJUSTMENT: &str = "N";
const DOMESTIC_COUNTERPART_AREA: &str = "XW";
const DOMESTIC_COUNTERPART_SECTOR: &str = "S1";
const DOMESTIC_CONSOLIDATION: &str = "N";
const DOMESTIC_EXPENDITURE: &str = "_Z";
const DOMESTIC_UNIT_MEASURE: &str = "USD";
const DOMESTIC_CURRENCY_DENOM: &str = "XDC";
const DOMESTIC_VALUATION: &str = "N";
const DOMESTIC_PRICES: &str = "V";
const DOMESTIC_TRANSFORMATION: &str = "N";
const DOMESTIC_CUST_BREAKDOWN: &str = "_T";

// International: quarterly amounts outstanding in the international market,
// all issue characteristics aggregated.
const INTERNATIONAL_FREQUENCY: &str = "Q";
const INTERNATIONAL_MATURITIES: [&str; 2] = ["C", "K"];
const INTERNATIONAL_MEASURE: &str = "I";
const INTERNATIONAL_MARKET: &str = "C";
const INTERNATIONAL_ISSUER_ALL: &str = "1";
const INTERNATIONAL_ISSUER_NAT_TOTAL: &str = "3P";
const INTERNATIONAL_ISSUE_TYPE: &str = "A";
const INTERNATIONAL_ISSUE_CUR_GROUP: &str = "A";
const INTERNATIONAL_ISSUE_CUR: &str = "TO1";
const INTERNATIONAL_ISSUE_RE_MAT: &str = "A";
const INTERNATIONAL_ISSUE_RATE: &str = "A";
const INTERNATIONAL_ISSUE_RISK: &str = "A";
const INTERNATIONAL_ISSUE_COL: &str = "A";

// ============================================================================
// PULL RUN
// ============================================================================

/// Result of one pull: the unified panel plus the run identity recorded in
/// the audit trail.
#[derive(Debug)]
pub struct PullRun {
    pub run_id: String,
    pub observations: Vec<Observation>,
}

/// Pull both BIS dataflows for the given country names and merge the
/// results into one panel. Rows failing core schema validation are dropped
/// with a warning rather than failing the run.
pub fn pull_debt_securities(
    client: &SdmxClient,
    config: &PipelineConfig,
    countries: &[String],
) -> Result<PullRun> {
    let run_id = uuid::Uuid::new_v4().to_string();
    info!("Starting pull run {}", run_id);

    let codes_by_name =
        resolve_country_codes(client, countries).context("Country resolution failed")?;
    let mut ref_areas: Vec<String> = codes_by_name.values().cloned().collect();
    ref_areas.sort();

    let mut observations = pull_domestic(client, config, &ref_areas)
        .context("Domestic pull (WS_NA_SEC_DSS) failed")?;
    let international = pull_international(client, config, &ref_areas)
        .context("International pull (WS_DEBT_SEC2_PUB) failed")?;
    observations.extend(international);

    let validator = ObservationValidator::new();
    let total = observations.len();
    observations.retain(|obs| match validator.validate(obs) {
        Ok(()) => true,
        Err(errors) => {
            warn!(
                "Dropping invalid observation ({} {} {}): {}",
                obs.dataflow,
                obs.ref_area,
                obs.time_period,
                errors
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("; ")
            );
            false
        }
    });
    if observations.len() < total {
        info!(
            "Validation dropped {} of {} pulled rows",
            total - observations.len(),
            total
        );
    }

    info!(
        "Pull run {} fetched {} observations for {} countries",
        run_id,
        observations.len(),
        ref_areas.len()
    );

    Ok(PullRun {
        run_id,
        observations,
    })
}

fn pull_domestic(
    client: &SdmxClient,
    config: &PipelineConfig,
    ref_areas: &[String],
) -> Result<Vec<Observation>> {
    let flow = DataflowRef::domestic();
    let dimensions = client.fetch_datastructure(&flow)?;
    let mapping = domestic_mapping();

    let mut observations = Vec::new();

    for batch in batch_ref_areas(ref_areas, config.ref_area_batch_size) {
        let key = domestic_key(&dimensions, batch);
        info!("Fetching {} key {}", flow.dataflow_id, key);

        let payload =
            client.fetch_data_csv(&flow, &key, &config.start_period, &config.end_period)?;
        let rows = parse_sdmx_csv(&payload, &mapping)?;
        info!("{} rows for batch {:?}", rows.len(), batch);
        observations.extend(rows);
    }

    Ok(observations)
}

fn pull_international(
    client: &SdmxClient,
    config: &PipelineConfig,
    ref_areas: &[String],
) -> Result<Vec<Observation>> {
    let flow = DataflowRef::international();
    let dimensions = client.fetch_datastructure(&flow)?;
    let mapping = international_mapping();

    let mut observations = Vec::new();

    for batch in batch_ref_areas(ref_areas, config.ref_area_batch_size) {
        let key = international_key(&dimensions, batch);
        info!("Fetching {} key {}", flow.dataflow_id, key);

        let payload =
            client.fetch_data_csv(&flow, &key, &config.start_period, &config.end_period)?;
        let rows = parse_sdmx_csv(&payload, &mapping)?;
        info!("{} rows for batch {:?}", rows.len(), batch);
        observations.extend(rows);
    }

    Ok(observations)
}

/// Split reference areas into request batches; size 0 means one batch.
fn batch_ref_areas(ref_areas: &[String], batch_size: usize) -> Vec<&[String]> {
    if batch_size == 0 {
        return vec![ref_areas];
    }
    ref_areas.chunks(batch_size).collect()
}

fn domestic_key(dimensions: &[Dimension], ref_areas: &[String]) -> String {
    let mut builder = KeyBuilder::new(dimensions);
    builder
        .set("FREQ", DOMESTIC_FREQUENCY)
        .set_all_owned("REF_AREA", ref_areas)
        .set_all("REF_SECTOR", &DOMESTIC_ISSUER_SECTORS)
        .set("ADJUSTMENT", DOMESTIC_ADJUSTMENT)
        .set("COUNTERPART_AREA", DOMESTIC_COUNTERPART_AREA)
        .set("COUNTERPART_SECTOR", DOMESTIC_COUNTERPART_SECTOR)
        .set("CONSOLIDATION", DOMESTIC_CONSOLIDATION)
        .set_all("MATURITY", &DOMESTIC_MATURITIES)
        .set("INSTR_ASSET", DOMESTIC_INSTRUMENT)
        .set("ACCOUNTING_ENTRY", DOMESTIC_ACCOUNTING_ENTRY)
        .set("STO", DOMESTIC_STOCK_POSITION)
        .set("EXPENDITURE", DOMESTIC_EXPENDITURE)
        .set("UNIT_MEASURE", DOMESTIC_UNIT_MEASURE)
        .set("CURRENCY_DENOM", DOMESTIC_CURRENCY_DENOM)
        .set("VALUATION", DOMESTIC_VALUATION)
        .set("PRICES", DOMESTIC_PRICES)
        .set("TRANSFORMATION", DOMESTIC_TRANSFORMATION)
        .set("CUST_BREAKDOWN", DOMESTIC_CUST_BREAKDOWN);
    builder.build()
}

fn international_key(dimensions: &[Dimension], ref_areas: &[String]) -> String {
    let mut builder = KeyBuilder::new(dimensions);
    builder
        .set("FREQ", INTERNATIONAL_FREQUENCY)
        .set_all_owned("ISSUER_RES", ref_areas)
        .set("ISSUER_NAT", INTERNATIONAL_ISSUER_NAT_TOTAL)
        .set("ISSUER_BUS_IMM", INTERNATIONAL_ISSUER_ALL)
        .set("ISSUER_BUS_ULT", INTERNATIONAL_ISSUER_ALL)
        .set("MARKET", INTERNATIONAL_MARKET)
        .set_all("ISSUE_OR_MAT", &INTERNATIONAL_MATURITIES)
        .set("MEASURE", INTERNATIONAL_MEASURE)
        .set("ISSUE_TYPE", INTERNATIONAL_ISSUE_TYPE)
        .set("ISSUE_CUR_GROUP", INTERNATIONAL_ISSUE_CUR_GROUP)
        .set("ISSUE_CUR", INTERNATIONAL_ISSUE_CUR)
        .set("ISSUE_RE_MAT", INTERNATIONAL_ISSUE_RE_MAT)
        .set("ISSUE_RATE", INTERNATIONAL_ISSUE_RATE)
        .set("ISSUE_RISK", INTERNATIONAL_ISSUE_RISK)
        .set("ISSUE_COL", INTERNATIONAL_ISSUE_COL);
    builder.build()
}
