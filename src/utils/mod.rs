use std::path::Path;

use crate::error::Result;

/// Normalize probabilities to sum to 1.0
pub fn normalize_probabilities(probs: Vec<f64>) -> Vec<f64> {
    let sum: f64 = probs.iter().sum();
    if sum == 0.0 {
        // Degenerate vote: fall back to uniform so the output still sums to 1.
        let n = probs.len();
        return probs.iter().map(|_| 1.0 / n as f64).collect();
    }
    probs.iter().map(|p| p / sum).collect()
}

/// Round half up, ties away from zero. Predicted goal counts must round the
/// same way everywhere, so this is the single rounding function used for them.
pub fn round_half_up(value: f64) -> i64 {
    if value >= 0.0 {
        (value + 0.5).floor() as i64
    } else {
        (value - 0.5).ceil() as i64
    }
}

/// Write a file via a temp sibling and an atomic rename, so readers never
/// observe a partially written table or artifact.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let tmp = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4()));
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Closest known team name for "did you mean" hints on unknown-team requests.
/// Returns None when nothing is similar enough to be a plausible typo.
pub fn closest_team_name<'a, I>(name: &str, candidates: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<(f64, &str)> = None;
    for candidate in candidates {
        let score = strsim::jaro_winkler(&name.to_lowercase(), &candidate.to_lowercase());
        if best.map_or(true, |(b, _)| score > b) {
            best = Some((score, candidate));
        }
    }
    best.filter(|(score, _)| *score >= 0.80)
        .map(|(_, c)| c.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_probabilities() {
        let probs = vec![0.4, 0.3, 0.2];
        let normalized = normalize_probabilities(probs);
        let sum: f64 = normalized.iter().sum();
        assert!((sum - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_normalize_zero_vector_is_uniform() {
        let normalized = normalize_probabilities(vec![0.0, 0.0, 0.0, 0.0]);
        for p in &normalized {
            assert!((p - 0.25).abs() < 1e-12);
        }
    }

    #[test]
    fn test_round_half_up() {
        assert_eq!(round_half_up(1.4), 1);
        assert_eq!(round_half_up(1.5), 2);
        assert_eq!(round_half_up(2.5), 3);
        assert_eq!(round_half_up(0.49), 0);
        assert_eq!(round_half_up(-0.5), -1);
        assert_eq!(round_half_up(0.0), 0);
    }

    #[test]
    fn test_closest_team_name() {
        let teams = ["Arsenal", "Aston Villa", "Brentford"];
        assert_eq!(
            closest_team_name("arsenal", teams.iter().copied()),
            Some("Arsenal".to_string())
        );
        assert_eq!(
            closest_team_name("Astn Villa", teams.iter().copied()),
            Some("Aston Villa".to_string())
        );
        assert_eq!(closest_team_name("Zenit", teams.iter().copied()), None);
    }

    #[test]
    fn test_atomic_write_replaces_content() {
        let dir = std::env::temp_dir().join(format!("goalforge-utils-{}", uuid::Uuid::new_v4()));
        let path = dir.join("table.csv");
        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
