//! Raw results ingestion.
//!
//! Downloads season result files (or combines local copies) into one
//! canonical raw table, then loads that table as `MatchRecord`s. Rows with
//! any required field missing are dropped here, before feature engineering
//! ever sees them.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use reqwest::Client;

use crate::error::{AppError, Result};
use crate::models::{MatchRecord, RawResultRow};
use crate::utils::atomic_write;

pub struct MatchFetcher {
    client: Client,
}

impl MatchFetcher {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    /// Download every source URL and publish the combined raw table.
    pub async fn fetch_raw(&self, urls: &[String], out: &Path) -> Result<usize> {
        let mut combined: Vec<RawResultRow> = Vec::new();
        for url in urls {
            tracing::info!("Fetching raw results from {}", url);
            let response = self.client.get(url).send().await?;
            if !response.status().is_success() {
                return Err(AppError::Ingestion(format!(
                    "{} returned {}",
                    url,
                    response.status()
                )));
            }
            let body = response.text().await?;
            let rows = parse_raw_rows(body.as_bytes(), url)?;
            tracing::info!("Parsed {} rows from {}", rows.len(), url);
            combined.extend(rows);
        }
        write_raw_table(out, &combined)?;
        Ok(combined.len())
    }
}

impl Default for MatchFetcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Combine already-downloaded season files into the canonical raw table.
pub fn combine_local(paths: &[PathBuf], out: &Path) -> Result<usize> {
    let mut combined = Vec::new();
    for path in paths {
        let bytes = std::fs::read(path).map_err(|e| {
            AppError::Ingestion(format!("cannot read {}: {}", path.display(), e))
        })?;
        combined.extend(parse_raw_rows(&bytes, &path.display().to_string())?);
    }
    write_raw_table(out, &combined)?;
    Ok(combined.len())
}

/// Parse one source file. Individual unreadable rows are dropped with a
/// warning; a file that yields nothing at all is malformed source data.
fn parse_raw_rows(bytes: &[u8], source: &str) -> Result<Vec<RawResultRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(bytes);
    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for result in reader.deserialize::<RawResultRow>() {
        match result {
            Ok(row) => rows.push(row),
            Err(_) => skipped += 1,
        }
    }
    if skipped > 0 {
        tracing::warn!("{}: skipped {} unreadable rows", source, skipped);
    }
    if rows.is_empty() {
        return Err(AppError::Ingestion(format!(
            "{} contained no parseable result rows",
            source
        )));
    }
    Ok(rows)
}

fn write_raw_table(path: &Path, rows: &[RawResultRow]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::Ingestion(e.to_string()))?;
    atomic_write(path, &bytes)
}

/// Load the raw table as complete match records, dropping rows with any
/// required field missing.
pub fn load_matches(path: &Path) -> Result<Vec<MatchRecord>> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| AppError::Ingestion(format!("cannot read {}: {}", path.display(), e)))?;
    let mut records = Vec::new();
    let mut dropped = 0usize;
    for result in reader.deserialize::<RawResultRow>() {
        let row = result?;
        match to_record(&row) {
            Some(record) => records.push(record),
            None => dropped += 1,
        }
    }
    if dropped > 0 {
        tracing::info!("Dropped {} incomplete rows from {}", dropped, path.display());
    }
    Ok(records)
}

fn to_record(row: &RawResultRow) -> Option<MatchRecord> {
    Some(MatchRecord {
        date: parse_date(row.date.as_deref()?)?,
        home_team: row.home_team.clone()?,
        away_team: row.away_team.clone()?,
        full_time_home_goals: row.full_time_home_goals?,
        full_time_away_goals: row.full_time_away_goals?,
        full_time_result: row.full_time_result.clone()?,
        home_shots: row.home_shots?,
        home_shots_on_target: row.home_shots_on_target?,
        away_shots: row.away_shots?,
        away_shots_on_target: row.away_shots_on_target?,
    })
}

/// Source files use day-first dates in both two and four digit year forms;
/// our own tables are written ISO.
fn parse_date(raw: &str) -> Option<NaiveDate> {
    for format in ["%d/%m/%y", "%d/%m/%Y", "%Y-%m-%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Some(date);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Div,Date,HomeTeam,AwayTeam,FTHG,FTAG,FTR,HS,AS,HST,AST,Referee
E0,12/08/23,Arsenal,Chelsea,2,1,H,14,9,6,3,M Oliver
E0,19/08/23,Chelsea,Arsenal,0,0,D,11,12,4,5,A Taylor
E0,26/08/23,Arsenal,Spurs,,2,A,8,13,2,7,P Tierney
";

    #[test]
    fn parse_date_accepts_source_and_iso_forms() {
        let expected = NaiveDate::from_ymd_opt(2023, 8, 12).unwrap();
        assert_eq!(parse_date("12/08/23"), Some(expected));
        assert_eq!(parse_date("12/08/2023"), Some(expected));
        assert_eq!(parse_date("2023-08-12"), Some(expected));
        assert_eq!(parse_date("August 12"), None);
    }

    #[test]
    fn load_matches_drops_rows_with_missing_required_fields() {
        let dir = std::env::temp_dir().join(format!("goalforge-ingest-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("raw.csv");
        std::fs::write(&path, SAMPLE).unwrap();

        let records = load_matches(&path).unwrap();
        // The third row is missing FTHG and must be dropped.
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].home_team, "Arsenal");
        assert_eq!(records[0].full_time_result, "H");
        assert_eq!(records[1].full_time_result, "D");
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn combine_local_merges_sources_and_round_trips() {
        let dir = std::env::temp_dir().join(format!("goalforge-ingest-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let a = dir.join("E0.csv");
        let b = dir.join("E1.csv");
        std::fs::write(&a, SAMPLE).unwrap();
        std::fs::write(&b, SAMPLE).unwrap();
        let out = dir.join("raw_combined.csv");

        let n = combine_local(&[a, b], &out).unwrap();
        assert_eq!(n, 6);
        // Incomplete rows survive the combine and are filtered at load time.
        let records = load_matches(&out).unwrap();
        assert_eq!(records.len(), 4);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn unparseable_source_is_an_ingestion_error() {
        let err = parse_raw_rows(b"<html>not a csv</html>", "test");
        assert!(matches!(err, Err(AppError::Ingestion(_))));
    }
}
