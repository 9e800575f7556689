// 🌍 Country Resolution
// Maps roster country names to BIS reference-area codes, preferring the
// CL_BIS_IF_REF_AREA codelist and falling back to a static table.

use std::collections::HashMap;

use anyhow::{bail, Result};

use crate::sdmx::{Codelist, SdmxClient};

pub const REF_AREA_CODELIST: &str = "CL_BIS_IF_REF_AREA";
pub const REF_AREA_CODELIST_AGENCY: &str = "BIS";
pub const REF_AREA_CODELIST_VERSION: &str = "1.0";

/// Economies the pipeline pulls by default.
pub const TARGET_COUNTRIES: [&str; 12] = [
    "Australia",
    "Hong Kong",
    "Singapore",
    "New Zealand",
    "China",
    "India",
    "Malaysia",
    "Philippines",
    "Russia",
    "South Africa",
    "Israel",
    "Brazil",
];

/// Static fallback for names whose codelist entry spells the country
/// differently (e.g. "Hong Kong SAR").
fn static_code(name: &str) -> Option<&'static str> {
    let code = match name {
        "Australia" => "AU",
        "Hong Kong" => "HK",
        "Singapore" => "SG",
        "New Zealand" => "NZ",
        "China" => "CN",
        "India" => "IN",
        "Malaysia" => "MY",
        "Philippines" => "PH",
        "Russia" => "RU",
        "South Africa" => "ZA",
        "Israel" => "IL",
        "Brazil" => "BR",
        _ => return None,
    };
    Some(code)
}

/// Resolve a list of country names to reference-area codes.
///
/// Resolution order per name: already a code id in the codelist, static
/// fallback table, unique case-insensitive substring match against codelist
/// names. Anything else is an error (ambiguity must not silently pick a
/// country).
pub fn resolve_country_codes(
    client: &SdmxClient,
    names: &[String],
) -> Result<HashMap<String, String>> {
    let codelist = client.fetch_codelist(
        REF_AREA_CODELIST_AGENCY,
        REF_AREA_CODELIST,
        REF_AREA_CODELIST_VERSION,
    )?;
    resolve_against_codelist(&codelist, names)
}

pub fn resolve_against_codelist(
    codelist: &Codelist,
    names: &[String],
) -> Result<HashMap<String, String>> {
    let mut resolved = HashMap::new();

    for name in names {
        if codelist.codes.iter().any(|c| &c.id == name) {
            resolved.insert(name.clone(), name.clone());
            continue;
        }

        if let Some(code) = static_code(name) {
            resolved.insert(name.clone(), code.to_string());
            continue;
        }

        let needle = name.to_lowercase();
        let matches: Vec<&str> = codelist
            .codes
            .iter()
            .filter(|c| {
                c.name
                    .as_deref()
                    .map(|n| n.to_lowercase().contains(&needle))
                    .unwrap_or(false)
            })
            .map(|c| c.id.as_str())
            .collect();

        match matches.as_slice() {
            [only] => {
                resolved.insert(name.clone(), only.to_string());
            }
            [] => bail!("Unable to resolve country code for '{}'", name),
            _ => bail!(
                "Ambiguous country name '{}': matches {}",
                name,
                matches.join(", ")
            ),
        }
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdmx::Code;

    fn ref_area_codelist() -> Codelist {
        Codelist {
            id: REF_AREA_CODELIST.to_string(),
            codes: vec![
                Code {
                    id: "AU".to_string(),
                    name: Some("Australia".to_string()),
                },
                Code {
                    id: "HK".to_string(),
                    name: Some("Hong Kong SAR".to_string()),
                },
                Code {
                    id: "NO".to_string(),
                    name: Some("Norway".to_string()),
                },
                Code {
                    id: "KR".to_string(),
                    name: Some("Korea".to_string()),
                },
                Code {
                    id: "KP".to_string(),
                    name: Some("Korea (DPRK)".to_string()),
                },
            ],
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_resolve_code_passthrough() {
        let resolved = resolve_against_codelist(&ref_area_codelist(), &names(&["AU"])).unwrap();
        assert_eq!(resolved["AU"], "AU");
    }

    #[test]
    fn test_resolve_static_fallback() {
        // "Hong Kong" is not an id and its codelist name is "Hong Kong SAR";
        // the static table answers before substring matching runs.
        let resolved =
            resolve_against_codelist(&ref_area_codelist(), &names(&["Hong Kong"])).unwrap();
        assert_eq!(resolved["Hong Kong"], "HK");
    }

    #[test]
    fn test_resolve_unique_substring() {
        let resolved =
            resolve_against_codelist(&ref_area_codelist(), &names(&["Norway"])).unwrap();
        assert_eq!(resolved["Norway"], "NO");
    }

    #[test]
    fn test_resolve_ambiguous_fails() {
        let err = resolve_against_codelist(&ref_area_codelist(), &names(&["Korea"]));
        assert!(err.is_err());
    }

    #[test]
    fn test_resolve_unknown_fails() {
        let err = resolve_against_codelist(&ref_area_codelist(), &names(&["Atlantis"]));
        assert!(err.is_err());
    }

    #[test]
    fn test_target_roster_all_statically_resolvable() {
        for name in TARGET_COUNTRIES {
            assert!(static_code(name).is_some(), "no static code for {}", name);
        }
    }
}
