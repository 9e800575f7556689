// 📊 Chart Aggregation
// Mean OBS_VALUE per calendar year × reporting sector, the series behind
// the "Average OBS_VALUE by Sector (Annualized)" chart.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::schema::Observation;

/// One chart point: the average observed value for a (year, sector) group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SectorYearAverage {
    pub year: i32,
    #[serde(rename = "REF_SECTOR")]
    pub ref_sector: String,
    pub avg_value: f64,
    pub observation_count: usize,
}

/// Group observations by (year, REF_SECTOR) and average OBS_VALUE within
/// each group. Rows without a value or a readable year contribute nothing
/// (the cleaning pass removes them before this point, so on cleaned input
/// every row counts).
///
/// Output order is deterministic: year ascending, then sector ascending.
pub fn aggregate_by_year_sector(observations: &[Observation]) -> Vec<SectorYearAverage> {
    let mut groups: BTreeMap<(i32, String), (f64, usize)> = BTreeMap::new();

    for obs in observations {
        let (year, value) = match (obs.year(), obs.obs_value) {
            (Some(year), Some(value)) => (year, value),
            _ => continue,
        };

        let entry = groups
            .entry((year, obs.ref_sector.clone()))
            .or_insert((0.0, 0));
        entry.0 += value;
        entry.1 += 1;
    }

    groups
        .into_iter()
        .map(|((year, ref_sector), (sum, count))| SectorYearAverage {
            year,
            ref_sector,
            avg_value: sum / count as f64,
            observation_count: count,
        })
        .collect()
}

/// Write the chart data as CSV.
pub fn write_chart_csv(path: &Path, rows: &[SectorYearAverage]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    Ok(())
}

/// Write the chart data as JSON (one array of points).
pub fn write_chart_json(path: &Path, rows: &[SectorYearAverage]) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(file, rows)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::tests::sample_observation;

    fn obs(period: &str, sector: &str, value: f64) -> Observation {
        let mut o = sample_observation();
        o.time_period = period.to_string();
        o.ref_sector = sector.to_string();
        o.obs_value = Some(value);
        o
    }

    #[test]
    fn test_grouped_mean() {
        let observations = vec![
            obs("2015", "S13", 10.0),
            obs("2015", "S13", 20.0),
            obs("2015", "ALL", 5.0),
            obs("2016", "S13", 40.0),
        ];

        let rows = aggregate_by_year_sector(&observations);
        assert_eq!(rows.len(), 3);

        let s13_2015 = rows
            .iter()
            .find(|r| r.year == 2015 && r.ref_sector == "S13")
            .unwrap();
        assert!((s13_2015.avg_value - 15.0).abs() < f64::EPSILON);
        assert_eq!(s13_2015.observation_count, 2);
    }

    #[test]
    fn test_mean_equals_sum_over_count_per_group() {
        // The checkable property: every reported average is exactly the
        // arithmetic mean of the group's members.
        let observations = vec![
            obs("2015", "S13", 1.5),
            obs("2015-Q1", "S13", 2.5),
            obs("2015-Q3", "S13", 8.0),
            obs("2016", "ALL", 7.0),
            obs("2016", "ALL", 9.0),
        ];

        let rows = aggregate_by_year_sector(&observations);

        for row in &rows {
            let members: Vec<f64> = observations
                .iter()
                .filter(|o| {
                    o.year() == Some(row.year) && o.ref_sector == row.ref_sector
                })
                .filter_map(|o| o.obs_value)
                .collect();

            let expected = members.iter().sum::<f64>() / members.len() as f64;
            assert_eq!(row.observation_count, members.len());
            assert!((row.avg_value - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn test_quarterly_periods_fold_into_year() {
        let observations = vec![
            obs("2015-Q1", "ALL", 10.0),
            obs("2015-Q2", "ALL", 30.0),
        ];

        let rows = aggregate_by_year_sector(&observations);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].year, 2015);
        assert!((rows[0].avg_value - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_deterministic_ordering() {
        let observations = vec![
            obs("2016", "S13", 1.0),
            obs("2015", "S13", 1.0),
            obs("2015", "ALL", 1.0),
        ];

        let rows = aggregate_by_year_sector(&observations);
        let keys: Vec<(i32, &str)> = rows
            .iter()
            .map(|r| (r.year, r.ref_sector.as_str()))
            .collect();
        assert_eq!(keys, vec![(2015, "ALL"), (2015, "S13"), (2016, "S13")]);
    }

    #[test]
    fn test_rows_without_value_are_skipped() {
        let mut missing = obs("2015", "S13", 0.0);
        missing.obs_value = None;

        let rows = aggregate_by_year_sector(&[missing, obs("2015", "S13", 6.0)]);
        assert_eq!(rows.len(), 1);
        assert!((rows[0].avg_value - 6.0).abs() < f64::EPSILON);
        assert_eq!(rows[0].observation_count, 1);
    }

    #[test]
    fn test_chart_csv_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chart.csv");

        let rows = aggregate_by_year_sector(&[obs("2015", "S13", 4.0)]);
        write_chart_csv(&path, &rows).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("year,REF_SECTOR,avg_value,observation_count"));
        assert!(contents.contains("2015,S13,4.0,1"));
    }

    #[test]
    fn test_chart_json_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chart.json");

        let rows = aggregate_by_year_sector(&[obs("2015", "S13", 4.0)]);
        write_chart_json(&path, &rows).unwrap();

        let loaded: Vec<SectorYearAverage> =
            serde_json::from_reader(File::open(&path).unwrap()).unwrap();
        assert_eq!(loaded, rows);
    }
}
