use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One played fixture parsed from the raw results table. Immutable once
/// ingested; rows with any required field missing never become a MatchRecord.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchRecord {
    pub date: NaiveDate,
    pub home_team: String,
    pub away_team: String,
    pub full_time_home_goals: u32,
    pub full_time_away_goals: u32,
    /// "H", "D" or "A". Kept as data: the label set the encoder sees is
    /// whatever the source contains, never a hardcoded enum order.
    pub full_time_result: String,
    pub home_shots: u32,
    pub home_shots_on_target: u32,
    pub away_shots: u32,
    pub away_shots_on_target: u32,
}

/// Raw CSV row in the football-data.co.uk column convention. Everything is
/// optional here; the drop-incomplete policy is applied when converting to
/// MatchRecord. Extra columns in the source files are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawResultRow {
    #[serde(rename = "Date")]
    pub date: Option<String>,
    #[serde(rename = "HomeTeam")]
    pub home_team: Option<String>,
    #[serde(rename = "AwayTeam")]
    pub away_team: Option<String>,
    #[serde(rename = "FTHG")]
    pub full_time_home_goals: Option<u32>,
    #[serde(rename = "FTAG")]
    pub full_time_away_goals: Option<u32>,
    #[serde(rename = "FTR")]
    pub full_time_result: Option<String>,
    #[serde(rename = "HS")]
    pub home_shots: Option<u32>,
    #[serde(rename = "AS")]
    pub away_shots: Option<u32>,
    #[serde(rename = "HST")]
    pub home_shots_on_target: Option<u32>,
    #[serde(rename = "AST")]
    pub away_shots_on_target: Option<u32>,
}

/// A MatchRecord reshaped from one team's perspective. Two observations are
/// derived per record, one for each side.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamObservation {
    pub date: NaiveDate,
    pub team: String,
    pub goals_scored: u32,
    pub goals_conceded: u32,
    pub shots: u32,
    pub shots_on_target: u32,
}

/// Rolling averages over a team's own prior matches, excluding the match
/// they are attached to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RollingStats {
    pub avg_goals_scored: f64,
    pub avg_goals_conceded: f64,
    pub avg_shots: f64,
    pub avg_shots_on_target: f64,
}

/// One row of the feature table: the original fixture joined against both
/// sides' rolling stats as of the fixture date. The serde names are the
/// on-disk column contract consumed by training, evaluation and serving.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureRow {
    #[serde(rename = "Date")]
    pub date: NaiveDate,
    #[serde(rename = "HomeTeam")]
    pub home_team: String,
    #[serde(rename = "AwayTeam")]
    pub away_team: String,
    #[serde(rename = "FTR")]
    pub full_time_result: String,
    #[serde(rename = "FTHG")]
    pub full_time_home_goals: u32,
    #[serde(rename = "FTAG")]
    pub full_time_away_goals: u32,
    #[serde(rename = "avg_GoalsScored_home")]
    pub avg_goals_scored_home: f64,
    #[serde(rename = "avg_GoalsConceded_home")]
    pub avg_goals_conceded_home: f64,
    #[serde(rename = "avg_Shots_home")]
    pub avg_shots_home: f64,
    #[serde(rename = "avg_ShotsOnTarget_home")]
    pub avg_shots_on_target_home: f64,
    #[serde(rename = "avg_GoalsScored_away")]
    pub avg_goals_scored_away: f64,
    #[serde(rename = "avg_GoalsConceded_away")]
    pub avg_goals_conceded_away: f64,
    #[serde(rename = "avg_Shots_away")]
    pub avg_shots_away: f64,
    #[serde(rename = "avg_ShotsOnTarget_away")]
    pub avg_shots_on_target_away: f64,
}

impl FeatureRow {
    /// The 8 model inputs in the column order every fitted model expects.
    pub fn feature_vector(&self) -> Vec<f64> {
        vec![
            self.avg_goals_scored_home,
            self.avg_goals_conceded_home,
            self.avg_shots_home,
            self.avg_shots_on_target_home,
            self.avg_goals_scored_away,
            self.avg_goals_conceded_away,
            self.avg_shots_away,
            self.avg_shots_on_target_away,
        ]
    }
}

/// Prediction request body: the 8 rolling-average inputs, named exactly like
/// the feature table columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchFeatures {
    #[serde(rename = "avg_GoalsScored_home")]
    pub avg_goals_scored_home: f64,
    #[serde(rename = "avg_GoalsConceded_home")]
    pub avg_goals_conceded_home: f64,
    #[serde(rename = "avg_Shots_home")]
    pub avg_shots_home: f64,
    #[serde(rename = "avg_ShotsOnTarget_home")]
    pub avg_shots_on_target_home: f64,
    #[serde(rename = "avg_GoalsScored_away")]
    pub avg_goals_scored_away: f64,
    #[serde(rename = "avg_GoalsConceded_away")]
    pub avg_goals_conceded_away: f64,
    #[serde(rename = "avg_Shots_away")]
    pub avg_shots_away: f64,
    #[serde(rename = "avg_ShotsOnTarget_away")]
    pub avg_shots_on_target_away: f64,
}

impl MatchFeatures {
    pub fn to_vector(&self) -> Vec<f64> {
        vec![
            self.avg_goals_scored_home,
            self.avg_goals_conceded_home,
            self.avg_shots_home,
            self.avg_shots_on_target_home,
            self.avg_goals_scored_away,
            self.avg_goals_conceded_away,
            self.avg_shots_away,
            self.avg_shots_on_target_away,
        ]
    }

    /// Assemble the model input from a home-side row and an away-side row,
    /// per the feature table column mapping. No rolling stats are recomputed
    /// here; the last materialized rows are trusted as-is.
    pub fn from_rows(home_row: &FeatureRow, away_row: &FeatureRow) -> Self {
        Self {
            avg_goals_scored_home: home_row.avg_goals_scored_home,
            avg_goals_conceded_home: home_row.avg_goals_conceded_home,
            avg_shots_home: home_row.avg_shots_home,
            avg_shots_on_target_home: home_row.avg_shots_on_target_home,
            avg_goals_scored_away: away_row.avg_goals_scored_away,
            avg_goals_conceded_away: away_row.avg_goals_conceded_away,
            avg_shots_away: away_row.avg_shots_away,
            avg_shots_on_target_away: away_row.avg_shots_on_target_away,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomePrediction {
    /// One of the labels the encoder was fitted on ("H", "D", "A").
    pub predicted_outcome: String,
    /// One entry per known label, non-negative, summing to 1.0.
    pub probabilities: BTreeMap<String, f64>,
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub matches: Vec<MatchFeatures>,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub predictions: Vec<OutcomePrediction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchVerdict {
    HomeWin,
    AwayWin,
    Draw,
}

impl fmt::Display for MatchVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchVerdict::HomeWin => write!(f, "home win"),
            MatchVerdict::AwayWin => write!(f, "away win"),
            MatchVerdict::Draw => write!(f, "draw"),
        }
    }
}

/// Result of the team-name prediction path: a rounded scoreline plus the
/// verdict derived from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorelinePrediction {
    pub home_team: String,
    pub away_team: String,
    pub predicted_home_goals: i64,
    pub predicted_away_goals: i64,
    pub outcome: MatchVerdict,
}

impl ScorelinePrediction {
    pub fn scoreline(&self) -> String {
        format!("{} - {}", self.predicted_home_goals, self.predicted_away_goals)
    }

    pub fn verdict_label(&self) -> String {
        match self.outcome {
            MatchVerdict::HomeWin => format!("Winner: {}", self.home_team),
            MatchVerdict::AwayWin => format!("Winner: {}", self.away_team),
            MatchVerdict::Draw => "Draw".to_string(),
        }
    }
}

// API Response types
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: Utc::now(),
        }
    }
}
