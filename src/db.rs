// 🗄️ Observation Store - SQLite + WAL
// Raw pulled observations land here before cleaning. Inserts are idempotent
// via the unique series hash; re-running a pull only adds new series.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::schema::Observation;

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Observations Table
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS observations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            series_hash TEXT UNIQUE NOT NULL,
            freq TEXT NOT NULL,
            adjustment TEXT NOT NULL,
            ref_area TEXT NOT NULL,
            counterpart_area TEXT NOT NULL,
            ref_sector TEXT NOT NULL,
            counterpart_sector TEXT NOT NULL,
            consolidation TEXT NOT NULL,
            accounting_entry TEXT NOT NULL,
            sto TEXT NOT NULL,
            instr_asset TEXT NOT NULL,
            maturity TEXT NOT NULL,
            unit_measure TEXT NOT NULL,
            currency TEXT NOT NULL,
            valuation TEXT NOT NULL,
            prices TEXT NOT NULL,
            transformation TEXT NOT NULL,
            time_period TEXT NOT NULL,
            obs_value REAL,
            dataflow TEXT NOT NULL,
            market TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail for pull runs)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_obs_time_period ON observations(time_period)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_obs_ref_area ON observations(ref_area)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_obs_ref_sector ON observations(ref_sector)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

/// Outcome of a batch insert.
#[derive(Debug, Clone, Copy, Default)]
pub struct InsertOutcome {
    pub inserted: usize,
    pub duplicates: usize,
}

pub fn insert_observations(conn: &Connection, observations: &[Observation]) -> Result<InsertOutcome> {
    let mut outcome = InsertOutcome::default();

    for obs in observations {
        let hash = obs.compute_series_hash();

        let result = conn.execute(
            "INSERT INTO observations (
                series_hash, freq, adjustment, ref_area, counterpart_area,
                ref_sector, counterpart_sector, consolidation, accounting_entry,
                sto, instr_asset, maturity, unit_measure, currency, valuation,
                prices, transformation, time_period, obs_value, dataflow, market
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)",
            params![
                hash,
                obs.freq,
                obs.adjustment,
                obs.ref_area,
                obs.counterpart_area,
                obs.ref_sector,
                obs.counterpart_sector,
                obs.consolidation,
                obs.accounting_entry,
                obs.sto,
                obs.instr_asset,
                obs.maturity,
                obs.unit_measure,
                obs.currency,
                obs.valuation,
                obs.prices,
                obs.transformation,
                obs.time_period,
                obs.obs_value,
                obs.dataflow,
                obs.market,
            ],
        );

        match result {
            Ok(_) => outcome.inserted += 1,
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                outcome.duplicates += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(outcome)
}

fn observation_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Observation> {
    Ok(Observation {
        freq: row.get(0)?,
        adjustment: row.get(1)?,
        ref_area: row.get(2)?,
        counterpart_area: row.get(3)?,
        ref_sector: row.get(4)?,
        counterpart_sector: row.get(5)?,
        consolidation: row.get(6)?,
        accounting_entry: row.get(7)?,
        sto: row.get(8)?,
        instr_asset: row.get(9)?,
        maturity: row.get(10)?,
        unit_measure: row.get(11)?,
        currency: row.get(12)?,
        valuation: row.get(13)?,
        prices: row.get(14)?,
        transformation: row.get(15)?,
        time_period: row.get(16)?,
        obs_value: row.get(17)?,
        dataflow: row.get(18)?,
        market: row.get(19)?,
    })
}

const OBSERVATION_COLUMNS: &str = "freq, adjustment, ref_area, counterpart_area,
        ref_sector, counterpart_sector, consolidation, accounting_entry,
        sto, instr_asset, maturity, unit_measure, currency, valuation,
        prices, transformation, time_period, obs_value, dataflow, market";

pub fn get_all_observations(conn: &Connection) -> Result<Vec<Observation>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM observations ORDER BY time_period, ref_area, ref_sector",
        OBSERVATION_COLUMNS
    ))?;

    let observations = stmt
        .query_map([], observation_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(observations)
}

pub fn verify_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM observations", [], |row| row.get(0))?;

    Ok(count)
}

/// Per-source statistics for a pulled panel.
#[derive(Debug, Clone)]
pub struct DataflowStat {
    pub dataflow: String,
    pub ref_area: String,
    pub observation_count: i64,
    pub first_period: String,
    pub last_period: String,
    pub value_sum: f64,
}

pub fn get_dataflow_stats(conn: &Connection) -> Result<Vec<DataflowStat>> {
    let mut stmt = conn.prepare(
        "SELECT
            dataflow,
            ref_area,
            COUNT(*) as count,
            MIN(time_period) as first_period,
            MAX(time_period) as last_period,
            COALESCE(SUM(obs_value), 0.0) as value_sum
         FROM observations
         GROUP BY dataflow, ref_area
         ORDER BY dataflow, ref_area",
    )?;

    let stats = stmt
        .query_map([], |row| {
            Ok(DataflowStat {
                dataflow: row.get(0)?,
                ref_area: row.get(1)?,
                observation_count: row.get(2)?,
                first_period: row.get(3)?,
                last_period: row.get(4)?,
                value_sum: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(stats)
}

// ============================================================================
// AUDIT TRAIL
// ============================================================================

/// Audit event: pull runs and batch outcomes are recorded, not just logged.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                    .map_err(|_| rusqlite::Error::InvalidQuery)?
                    .with_timezone(&Utc),
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json)
                    .map_err(|_| rusqlite::Error::InvalidQuery)?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::tests::sample_observation;

    #[test]
    fn test_idempotent_insert() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let mut second = sample_observation();
        second.time_period = "2016".to_string();
        second.obs_value = Some(2000.0);
        let observations = vec![sample_observation(), second];

        let first_pass = insert_observations(&conn, &observations).unwrap();
        assert_eq!(first_pass.inserted, 2);
        assert_eq!(first_pass.duplicates, 0);

        let second_pass = insert_observations(&conn, &observations).unwrap();
        assert_eq!(second_pass.inserted, 0);
        assert_eq!(second_pass.duplicates, 2);

        assert_eq!(verify_count(&conn).unwrap(), 2);
    }

    #[test]
    fn test_round_trip_preserves_fields() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let mut missing_value = sample_observation();
        missing_value.time_period = "2017".to_string();
        missing_value.obs_value = None;

        insert_observations(&conn, &[sample_observation(), missing_value.clone()]).unwrap();

        let loaded = get_all_observations(&conn).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0], sample_observation());
        assert_eq!(loaded[1], missing_value);
    }

    #[test]
    fn test_dataflow_stats() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let mut a = sample_observation();
        a.obs_value = Some(10.0);
        let mut b = sample_observation();
        b.time_period = "2016".to_string();
        b.obs_value = Some(30.0);
        let mut c = sample_observation();
        c.ref_area = "SG".to_string();
        c.dataflow = "WS_DEBT_SEC2_PUB".to_string();
        c.obs_value = Some(5.0);

        insert_observations(&conn, &[a, b, c]).unwrap();

        let stats = get_dataflow_stats(&conn).unwrap();
        assert_eq!(stats.len(), 2);

        let au = stats
            .iter()
            .find(|s| s.ref_area == "AU" && s.dataflow == "WS_NA_SEC_DSS")
            .unwrap();
        assert_eq!(au.observation_count, 2);
        assert_eq!(au.first_period, "2015");
        assert_eq!(au.last_period, "2016");
        assert!((au.value_sum - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_event_log() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let event = Event::new(
            "pull_completed",
            "pull_run",
            "run-123",
            serde_json::json!({"inserted": 42}),
            "bis-dss",
        );

        insert_event(&conn, &event).unwrap();

        let events = get_events_for_entity(&conn, "pull_run", "run-123").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "pull_completed");
        assert_eq!(events[0].data["inserted"], 42);
    }
}
