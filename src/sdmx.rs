// 🌐 BIS SDMX v2 Client
// Structure, codelist and data (CSV) endpoints with bounded retries.
// Request pacing is deliberately slow: the BIS API rate-limits aggressively.

use std::cell::RefCell;
use std::collections::HashMap;
use std::thread;
use std::time::Duration;

use log::{debug, warn};
use rand::Rng;
use serde::Deserialize;

use crate::config::{DataflowRef, PipelineConfig};

const USER_AGENT: &str = "bis-sdmx-pull/0.1";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SdmxError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to parse SDMX-JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Data endpoint returned a non-CSV response for key '{key}'")]
    NonCsvPayload { key: String },

    #[error("Datastructure '{0}' not found in structure response")]
    StructureNotFound(String),

    #[error("Codelist {agency}:{id}({version}) not found in response")]
    CodelistNotFound {
        agency: String,
        id: String,
        version: String,
    },
}

// ============================================================================
// SDMX-JSON PAYLOAD SHAPES
// ============================================================================

#[derive(Debug, Deserialize)]
struct StructureResponse {
    #[serde(default)]
    data: StructureData,
}

#[derive(Debug, Default, Deserialize)]
struct StructureData {
    #[serde(rename = "dataStructures", default)]
    data_structures: Vec<DataStructure>,
}

#[derive(Debug, Deserialize)]
struct DataStructure {
    id: String,
    #[serde(rename = "dataStructureComponents", default)]
    components: DataStructureComponents,
}

#[derive(Debug, Default, Deserialize)]
struct DataStructureComponents {
    #[serde(rename = "dimensionList", default)]
    dimension_list: DimensionList,
}

#[derive(Debug, Default, Deserialize)]
struct DimensionList {
    #[serde(default)]
    dimensions: Vec<Dimension>,
}

/// One dimension of a data structure definition, in key order.
#[derive(Debug, Clone, Deserialize)]
pub struct Dimension {
    pub id: String,
    #[serde(rename = "localRepresentation", default)]
    pub local_representation: Option<LocalRepresentation>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocalRepresentation {
    /// Codelist URN, e.g. `...Codelist=BIS:CL_FREQ(1.0)`.
    #[serde(default)]
    pub enumeration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CodelistResponse {
    #[serde(default)]
    data: CodelistData,
}

#[derive(Debug, Default, Deserialize)]
struct CodelistData {
    #[serde(default)]
    codelists: Vec<Codelist>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Codelist {
    pub id: String,
    #[serde(default)]
    pub codes: Vec<Code>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Code {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

// ============================================================================
// URN & KEY HELPERS
// ============================================================================

/// Parse `(agency, codelist_id, version)` out of a codelist URN of the form
/// `urn:sdmx:...Codelist=BIS:CL_FREQ(1.0)`.
pub fn parse_codelist_urn(urn: &str) -> Option<(String, String, String)> {
    let payload = urn.split("Codelist=").nth(1)?;
    let (left, right) = payload.split_once('(')?;
    let (agency, codelist_id) = left.split_once(':')?;
    let version = right.split(')').next()?;
    Some((
        agency.to_string(),
        codelist_id.to_string(),
        version.to_string(),
    ))
}

/// Pick a sensible wildcard code from a codelist: an explicit total/all code
/// first, then the `_Z` / `_X` placeholders, then the first code.
pub fn select_default_code(codelist: &Codelist) -> String {
    for code in &codelist.codes {
        let name = code.name.as_deref().unwrap_or("").to_lowercase();
        if name.contains("total") || name.contains("all") {
            return code.id.clone();
        }
    }

    for fallback in ["_Z", "_X"] {
        if codelist.codes.iter().any(|c| c.id == fallback) {
            return fallback.to_string();
        }
    }

    codelist
        .codes
        .first()
        .map(|c| c.id.clone())
        .unwrap_or_default()
}

/// Builds a dotted SDMX data key following a DSD's dimension order.
/// Dimensions without a value stay empty (wildcard); multi-valued dimensions
/// join with `+`.
pub struct KeyBuilder {
    order: Vec<String>,
    values: HashMap<String, Vec<String>>,
}

impl KeyBuilder {
    pub fn new(dimensions: &[Dimension]) -> Self {
        KeyBuilder {
            order: dimensions.iter().map(|d| d.id.clone()).collect(),
            values: HashMap::new(),
        }
    }

    pub fn set(&mut self, dimension: &str, value: &str) -> &mut Self {
        self.values
            .insert(dimension.to_string(), vec![value.to_string()]);
        self
    }

    pub fn set_all(&mut self, dimension: &str, values: &[&str]) -> &mut Self {
        self.values.insert(
            dimension.to_string(),
            values.iter().map(|v| v.to_string()).collect(),
        );
        self
    }

    pub fn set_all_owned(&mut self, dimension: &str, values: &[String]) -> &mut Self {
        self.values.insert(dimension.to_string(), values.to_vec());
        self
    }

    pub fn build(&self) -> String {
        self.order
            .iter()
            .map(|dim| {
                self.values
                    .get(dim)
                    .map(|vs| vs.join("+"))
                    .unwrap_or_default()
            })
            .collect::<Vec<_>>()
            .join(".")
    }
}

/// A CSV payload must not open with markup or JSON; the BIS API answers
/// errors with those bodies and a 200 in some edge cases.
pub(crate) fn looks_like_csv(payload: &str) -> bool {
    let head = payload.trim_start();
    !(head.starts_with('<') || head.starts_with('{'))
}

// ============================================================================
// CLIENT
// ============================================================================

pub struct SdmxClient {
    http: reqwest::blocking::Client,
    data_base_url: String,
    structure_base_url: String,
    codelist_base_url: String,
    sleep_min_seconds: f64,
    sleep_max_seconds: f64,
    max_retries: usize,
    codelist_cache: RefCell<HashMap<(String, String, String), Codelist>>,
}

impl SdmxClient {
    pub fn new(config: &PipelineConfig) -> Result<Self, SdmxError> {
        let http = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(SdmxClient {
            http,
            data_base_url: config.data_base_url.clone(),
            structure_base_url: config.structure_base_url.clone(),
            codelist_base_url: config.codelist_base_url.clone(),
            sleep_min_seconds: config.sleep_min_seconds,
            sleep_max_seconds: config.sleep_max_seconds,
            max_retries: config.max_retries.max(1),
            codelist_cache: RefCell::new(HashMap::new()),
        })
    }

    fn sleep_jittered(&self) {
        let seconds = if self.sleep_max_seconds > self.sleep_min_seconds {
            rand::thread_rng().gen_range(self.sleep_min_seconds..self.sleep_max_seconds)
        } else {
            self.sleep_min_seconds
        };
        thread::sleep(Duration::from_secs_f64(seconds.max(0.0)));
    }

    /// GET a URL as text, retrying transient failures with jittered sleeps.
    pub fn get_text_with_retry(
        &self,
        url: &str,
        params: &[(&str, &str)],
    ) -> Result<String, SdmxError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            debug!("GET {} (attempt {}/{})", url, attempt, self.max_retries);

            let result = self
                .http
                .get(url)
                .query(params)
                .send()
                .and_then(|resp| resp.error_for_status())
                .and_then(|resp| resp.text());

            match result {
                Ok(text) => return Ok(text),
                Err(err) if attempt >= self.max_retries => return Err(err.into()),
                Err(err) => {
                    warn!("Request to {} failed ({}), retrying", url, err);
                    self.sleep_jittered();
                }
            }
        }
    }

    /// Fetch a DSD and return its dimensions in key order.
    pub fn fetch_datastructure(&self, flow: &DataflowRef) -> Result<Vec<Dimension>, SdmxError> {
        let url = self
            .structure_base_url
            .replace("{dsd_id}", &flow.dsd_id)
            .replace("{version}", &flow.dsd_version);

        let text = self.get_text_with_retry(&url, &[])?;
        let response: StructureResponse = serde_json::from_str(&text)?;

        let dsd = response
            .data
            .data_structures
            .into_iter()
            .find(|d| d.id == flow.dsd_id)
            .ok_or_else(|| SdmxError::StructureNotFound(flow.dsd_id.clone()))?;

        Ok(dsd.components.dimension_list.dimensions)
    }

    /// Fetch a codelist, memoized per (agency, id, version).
    pub fn fetch_codelist(
        &self,
        agency: &str,
        codelist_id: &str,
        version: &str,
    ) -> Result<Codelist, SdmxError> {
        let cache_key = (
            agency.to_string(),
            codelist_id.to_string(),
            version.to_string(),
        );
        if let Some(hit) = self.codelist_cache.borrow().get(&cache_key) {
            return Ok(hit.clone());
        }

        let url = self
            .codelist_base_url
            .replace("{agency}", agency)
            .replace("{codelist_id}", codelist_id)
            .replace("{version}", version);

        let text = self.get_text_with_retry(&url, &[])?;
        let response: CodelistResponse = serde_json::from_str(&text)?;

        let codelist = response
            .data
            .codelists
            .into_iter()
            .find(|c| c.id == codelist_id)
            .ok_or_else(|| SdmxError::CodelistNotFound {
                agency: agency.to_string(),
                id: codelist_id.to_string(),
                version: version.to_string(),
            })?;

        self.codelist_cache
            .borrow_mut()
            .insert(cache_key, codelist.clone());
        Ok(codelist)
    }

    /// Fetch observations for a data key as raw SDMX-CSV text.
    pub fn fetch_data_csv(
        &self,
        flow: &DataflowRef,
        key: &str,
        start_period: &str,
        end_period: &str,
    ) -> Result<String, SdmxError> {
        let url = self
            .data_base_url
            .replace("{dataflow_id}", &flow.dataflow_id)
            .replace("{version}", &flow.dataflow_version)
            .replace("{key}", key);

        let params = [
            ("startPeriod", start_period),
            ("endPeriod", end_period),
            ("format", "csv"),
        ];

        let payload = self.get_text_with_retry(&url, &params)?;
        if !looks_like_csv(&payload) {
            return Err(SdmxError::NonCsvPayload {
                key: key.to_string(),
            });
        }
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims(ids: &[&str]) -> Vec<Dimension> {
        ids.iter()
            .map(|id| Dimension {
                id: id.to_string(),
                local_representation: None,
            })
            .collect()
    }

    #[test]
    fn test_parse_codelist_urn() {
        let urn =
            "urn:sdmx:org.sdmx.infomodel.codelist.Codelist=BIS:CL_BIS_IF_REF_AREA(1.0)";
        let (agency, id, version) = parse_codelist_urn(urn).unwrap();
        assert_eq!(agency, "BIS");
        assert_eq!(id, "CL_BIS_IF_REF_AREA");
        assert_eq!(version, "1.0");
    }

    #[test]
    fn test_parse_codelist_urn_invalid() {
        assert!(parse_codelist_urn("").is_none());
        assert!(parse_codelist_urn("urn:sdmx:no-codelist-here").is_none());
        assert!(parse_codelist_urn("Codelist=missing-parens").is_none());
    }

    #[test]
    fn test_key_builder_order_and_wildcards() {
        let mut builder = KeyBuilder::new(&dims(&["FREQ", "REF_AREA", "MATURITY", "PRICES"]));
        builder.set("FREQ", "A");
        builder.set_all("MATURITY", &["S", "L"]);

        // REF_AREA and PRICES stay wildcards
        assert_eq!(builder.build(), "A..S+L.");
    }

    #[test]
    fn test_key_builder_ignores_unknown_dimension() {
        let mut builder = KeyBuilder::new(&dims(&["FREQ"]));
        builder.set("FREQ", "Q");
        builder.set("NOT_A_DIM", "X");
        assert_eq!(builder.build(), "Q");
    }

    #[test]
    fn test_select_default_code_prefers_total() {
        let cl = Codelist {
            id: "CL_TEST".to_string(),
            codes: vec![
                Code {
                    id: "A".to_string(),
                    name: Some("Something".to_string()),
                },
                Code {
                    id: "T".to_string(),
                    name: Some("Total economy".to_string()),
                },
            ],
        };
        assert_eq!(select_default_code(&cl), "T");
    }

    #[test]
    fn test_select_default_code_placeholder_then_first() {
        let cl = Codelist {
            id: "CL_TEST".to_string(),
            codes: vec![
                Code {
                    id: "B".to_string(),
                    name: Some("Bonds".to_string()),
                },
                Code {
                    id: "_Z".to_string(),
                    name: Some("Not applicable".to_string()),
                },
            ],
        };
        assert_eq!(select_default_code(&cl), "_Z");

        let cl = Codelist {
            id: "CL_TEST".to_string(),
            codes: vec![Code {
                id: "B".to_string(),
                name: Some("Bonds".to_string()),
            }],
        };
        assert_eq!(select_default_code(&cl), "B");
    }

    #[test]
    fn test_looks_like_csv() {
        assert!(looks_like_csv("FREQ,REF_AREA\nA,AU\n"));
        assert!(!looks_like_csv("  <html><body>error</body></html>"));
        assert!(!looks_like_csv("{\"error\": \"rate limited\"}"));
    }

    #[test]
    fn test_structure_response_parses() {
        let payload = r#"{
            "data": {
                "dataStructures": [{
                    "id": "NA_SEC",
                    "dataStructureComponents": {
                        "dimensionList": {
                            "dimensions": [
                                {"id": "FREQ", "localRepresentation": {"enumeration": "urn:...Codelist=BIS:CL_FREQ(1.0)"}},
                                {"id": "REF_AREA"}
                            ]
                        }
                    }
                }]
            }
        }"#;

        let response: StructureResponse = serde_json::from_str(payload).unwrap();
        let dsd = &response.data.data_structures[0];
        assert_eq!(dsd.id, "NA_SEC");
        let dims = &dsd.components.dimension_list.dimensions;
        assert_eq!(dims.len(), 2);
        assert_eq!(dims[0].id, "FREQ");
        assert!(dims[0]
            .local_representation
            .as_ref()
            .and_then(|r| r.enumeration.as_deref())
            .is_some());
    }

    #[test]
    fn test_codelist_response_parses() {
        let payload = r#"{
            "data": {
                "codelists": [{
                    "id": "CL_BIS_IF_REF_AREA",
                    "codes": [
                        {"id": "AU", "name": "Australia"},
                        {"id": "HK", "name": "Hong Kong SAR"}
                    ]
                }]
            }
        }"#;

        let response: CodelistResponse = serde_json::from_str(payload).unwrap();
        let cl = &response.data.codelists[0];
        assert_eq!(cl.codes.len(), 2);
        assert_eq!(cl.codes[0].id, "AU");
    }
}
