use std::path::PathBuf;

/// Trailing window length for rolling team statistics. The window covers a
/// team's most recent prior matches and never the current one.
pub const ROLLING_WINDOW: usize = 5;

/// Held-out fraction of the feature table.
pub const TEST_RATIO: f64 = 0.2;

/// Seed for the train/test permutation. The split must be reproducible
/// between the trainer and the evaluator, so this is fixed, not sampled.
pub const SPLIT_SEED: u64 = 42;

/// Trees per random forest.
pub const N_TREES: usize = 100;

/// Evaluator cycle interval (seconds).
pub const EVAL_INTERVAL_SECS: u64 = 60;

/// Accuracy drop (previous - current) beyond which a rollback is signalled.
pub const ROLLBACK_THRESHOLD: f64 = 0.05;

/// Season result files consumed when no RAW_SOURCE_URLS override is set.
/// Premier League and Championship, same convention the raw table follows.
pub const DEFAULT_SOURCE_URLS: &[&str] = &[
    "https://www.football-data.co.uk/mmz4281/2324/E0.csv",
    "https://www.football-data.co.uk/mmz4281/2324/E1.csv",
];

#[derive(Debug, Clone)]
pub struct Config {
    /// Combined raw results table.
    pub raw_data_path: PathBuf,
    /// Engineered feature table (the contract between the pipeline and everything downstream).
    pub features_path: PathBuf,
    /// Root directory of the model run registry.
    pub registry_dir: PathBuf,
    pub rolling_window: usize,
    pub test_ratio: f64,
    pub split_seed: u64,
    pub n_trees: usize,
    /// Declared model version recorded with every run.
    pub model_version: String,
    pub eval_interval_secs: u64,
    pub rollback_threshold: f64,
    /// Raw result CSV sources, comma-separated in RAW_SOURCE_URLS.
    pub source_urls: Vec<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            raw_data_path: env_path("RAW_DATA_PATH", "data/raw_epl_data.csv"),
            features_path: env_path("FEATURES_PATH", "data/processed_epl_data.csv"),
            registry_dir: env_path("MODEL_REGISTRY_DIR", "models/registry"),
            rolling_window: env_parsed("ROLLING_WINDOW", ROLLING_WINDOW),
            test_ratio: env_parsed("TEST_RATIO", TEST_RATIO),
            split_seed: env_parsed("SPLIT_SEED", SPLIT_SEED),
            n_trees: env_parsed("N_TREES", N_TREES),
            model_version: std::env::var("MODEL_VERSION").unwrap_or_else(|_| "1.0.0".to_string()),
            eval_interval_secs: env_parsed("EVAL_INTERVAL_SECS", EVAL_INTERVAL_SECS),
            rollback_threshold: env_parsed("ROLLBACK_THRESHOLD", ROLLBACK_THRESHOLD),
            source_urls: std::env::var("RAW_SOURCE_URLS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_else(|_| {
                    DEFAULT_SOURCE_URLS.iter().map(|s| s.to_string()).collect()
                }),
        }
    }
}

fn env_path(key: &str, default: &str) -> PathBuf {
    std::env::var(key).unwrap_or_else(|_| default.to_string()).into()
}

fn env_parsed<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
