// 📦 Cleaned Columnar Artifact
// Writes the cleaned panel to bis_debt_securities_cleaned.parquet and reads
// it back for aggregation. The artifact carries exactly the 18 documented
// dataset columns; pipeline provenance stays in SQLite.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use arrow_array::{Array, ArrayRef, Float64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema};
use ::parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use ::parquet::arrow::ArrowWriter;
use ::parquet::basic::Compression;
use ::parquet::file::properties::WriterProperties;

use crate::schema::{Observation, COLUMNS};

/// Arrow schema of the cleaned artifact: Utf8 dimensions, Float64 value.
pub fn cleaned_schema() -> Schema {
    let fields: Vec<Field> = COLUMNS
        .iter()
        .map(|name| {
            if *name == "OBS_VALUE" {
                Field::new(*name, DataType::Float64, true)
            } else {
                Field::new(*name, DataType::Utf8, false)
            }
        })
        .collect();
    Schema::new(fields)
}

fn to_record_batch(observations: &[Observation]) -> Result<RecordBatch> {
    let schema = Arc::new(cleaned_schema());

    let mut columns: Vec<ArrayRef> = Vec::with_capacity(COLUMNS.len());
    for (index, _) in COLUMNS.iter().enumerate().take(17) {
        let values: Vec<&str> = observations
            .iter()
            .map(|o| o.dimension_values()[index])
            .collect();
        columns.push(Arc::new(StringArray::from(values)));
    }

    let values: Vec<Option<f64>> = observations.iter().map(|o| o.obs_value).collect();
    columns.push(Arc::new(Float64Array::from(values)));

    RecordBatch::try_new(schema, columns).context("Failed to assemble record batch")
}

/// Write the cleaned panel to a parquet file.
pub fn write_cleaned(path: &Path, observations: &[Observation]) -> Result<()> {
    let batch = to_record_batch(observations)?;

    let file = File::create(path)
        .with_context(|| format!("Failed to create parquet file at {}", path.display()))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();

    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))
        .context("Failed to open parquet writer")?;
    writer.write(&batch).context("Failed to write record batch")?;
    writer.close().context("Failed to finalize parquet file")?;

    Ok(())
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| anyhow!("Parquet file is missing column '{}'", name))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| anyhow!("Column '{}' is not a string column", name))
}

/// Read a cleaned artifact back into observations.
/// Provenance fields come back empty; they are not part of the artifact.
pub fn read_cleaned(path: &Path) -> Result<Vec<Observation>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open parquet file at {}", path.display()))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("Failed to read parquet metadata")?
        .build()
        .context("Failed to build parquet reader")?;

    let mut observations = Vec::new();

    for batch in reader {
        let batch = batch.context("Failed to decode record batch")?;

        let freq = string_column(&batch, "FREQ")?;
        let adjustment = string_column(&batch, "ADJUSTMENT")?;
        let ref_area = string_column(&batch, "REF_AREA")?;
        let counterpart_area = string_column(&batch, "COUNTERPART_AREA")?;
        let ref_sector = string_column(&batch, "REF_SECTOR")?;
        let counterpart_sector = string_column(&batch, "COUNTERPART_SECTOR")?;
        let consolidation = string_column(&batch, "CONSOLIDATION")?;
        let accounting_entry = string_column(&batch, "ACCOUNTING_ENTRY")?;
        let sto = string_column(&batch, "STO")?;
        let instr_asset = string_column(&batch, "INSTR_ASSET")?;
        let maturity = string_column(&batch, "MATURITY")?;
        let unit_measure = string_column(&batch, "UNIT_MEASURE")?;
        let currency = string_column(&batch, "CURRENCY")?;
        let valuation = string_column(&batch, "VALUATION")?;
        let prices = string_column(&batch, "PRICES")?;
        let transformation = string_column(&batch, "TRANSFORMATION")?;
        let time_period = string_column(&batch, "TIME_PERIOD")?;

        let obs_value = batch
            .column_by_name("OBS_VALUE")
            .ok_or_else(|| anyhow!("Parquet file is missing column 'OBS_VALUE'"))?
            .as_any()
            .downcast_ref::<Float64Array>()
            .ok_or_else(|| anyhow!("Column 'OBS_VALUE' is not a float column"))?;

        for i in 0..batch.num_rows() {
            observations.push(Observation {
                freq: freq.value(i).to_string(),
                adjustment: adjustment.value(i).to_string(),
                ref_area: ref_area.value(i).to_string(),
                counterpart_area: counterpart_area.value(i).to_string(),
                ref_sector: ref_sector.value(i).to_string(),
                counterpart_sector: counterpart_sector.value(i).to_string(),
                consolidation: consolidation.value(i).to_string(),
                accounting_entry: accounting_entry.value(i).to_string(),
                sto: sto.value(i).to_string(),
                instr_asset: instr_asset.value(i).to_string(),
                maturity: maturity.value(i).to_string(),
                unit_measure: unit_measure.value(i).to_string(),
                currency: currency.value(i).to_string(),
                valuation: valuation.value(i).to_string(),
                prices: prices.value(i).to_string(),
                transformation: transformation.value(i).to_string(),
                time_period: time_period.value(i).to_string(),
                obs_value: if obs_value.is_null(i) {
                    None
                } else {
                    Some(obs_value.value(i))
                },
                dataflow: String::new(),
                market: String::new(),
            });
        }
    }

    Ok(observations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::tests::sample_observation;

    #[test]
    fn test_cleaned_schema_shape() {
        let schema = cleaned_schema();
        assert_eq!(schema.fields().len(), 18);
        assert_eq!(schema.field(17).name(), "OBS_VALUE");
        assert_eq!(schema.field(17).data_type(), &DataType::Float64);
        assert_eq!(schema.field(0).data_type(), &DataType::Utf8);
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cleaned.parquet");

        let mut second = sample_observation();
        second.time_period = "2016".to_string();
        second.obs_value = Some(77.0);

        write_cleaned(&path, &[sample_observation(), second]).unwrap();
        let loaded = read_cleaned(&path).unwrap();

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].ref_area, "AU");
        assert_eq!(loaded[0].obs_value, Some(1234.5));
        assert_eq!(loaded[1].time_period, "2016");
        assert_eq!(loaded[1].obs_value, Some(77.0));
        // Provenance is not stored in the artifact
        assert!(loaded[0].dataflow.is_empty());
    }

    #[test]
    fn test_write_empty_panel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.parquet");

        write_cleaned(&path, &[]).unwrap();
        let loaded = read_cleaned(&path).unwrap();
        assert!(loaded.is_empty());
    }
}
