//! Summary metrics: severity counts, optimization adoption, health score.

use crate::types::{CanonicalConfig, Finding, OptimizationStatus, SeverityCounts};

pub const HEALTH_SCORE_MAX: u8 = 100;

/// Score floor applied when findings exist but penalties would reach zero.
const NONZERO_FLOOR: i64 = 5;

/// Summary of one analyzed configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub severity_counts: SeverityCounts,
    pub optimization: OptimizationStatus,
    pub health_score: u8,
}

pub fn optimization_status(config: &CanonicalConfig) -> OptimizationStatus {
    let provisioners = &config.provisioners;
    OptimizationStatus {
        total_provisioners: provisioners.len(),
        spot_enabled: provisioners.iter().filter(|p| p.spot_allowed).count(),
        graviton_used: provisioners.iter().filter(|p| p.graviton_used).count(),
        consolidation_enabled: provisioners
            .iter()
            .filter(|p| p.consolidation_enabled == Some(true))
            .count(),
        node_class_count: config.node_classes.len(),
    }
}

/// 100 minus severity penalties plus best-practice credit, clamped to 0..=100.
pub fn health_score(counts: &SeverityCounts, optimization: &OptimizationStatus) -> u8 {
    let as_i64 = |n: usize| i64::try_from(n).unwrap_or(i64::MAX / 16);

    let mut score: i64 = i64::from(HEALTH_SCORE_MAX);
    score -= 8 * as_i64(counts.high);
    score -= 5 * as_i64(counts.medium);
    score -= 2 * as_i64(counts.low);
    score += 3 * as_i64(optimization.spot_enabled);
    score += 2 * as_i64(optimization.graviton_used);
    score += 2 * as_i64(optimization.consolidation_enabled);

    let mut score = score.clamp(0, i64::from(HEALTH_SCORE_MAX));
    if score == 0 && counts.total() > 0 {
        score = NONZERO_FLOOR;
    }
    u8::try_from(score).unwrap_or(0)
}

pub fn summarize(config: &CanonicalConfig, findings: &[Finding]) -> Summary {
    let severity_counts = SeverityCounts::from_findings(findings);
    let optimization = optimization_status(config);
    Summary {
        severity_counts,
        optimization,
        health_score: health_score(&severity_counts, &optimization),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::detect_all;
    use crate::parser::parse_documents;

    fn counts(high: usize, medium: usize, low: usize) -> SeverityCounts {
        SeverityCounts { high, medium, low }
    }

    #[test]
    fn test_perfect_score_without_findings() {
        assert_eq!(health_score(&counts(0, 0, 0), &OptimizationStatus::default()), 100);
    }

    #[test]
    fn test_penalties_and_credit() {
        let optimization = OptimizationStatus {
            total_provisioners: 1,
            spot_enabled: 1,
            graviton_used: 0,
            consolidation_enabled: 1,
            node_class_count: 0,
        };
        // 100 - 8 - 5 - 2 + 3 + 2
        assert_eq!(health_score(&counts(1, 1, 1), &optimization), 90);
    }

    #[test]
    fn test_clamped_at_max() {
        let optimization = OptimizationStatus {
            spot_enabled: 5,
            ..Default::default()
        };
        assert_eq!(health_score(&counts(0, 0, 0), &optimization), 100);
    }

    #[test]
    fn test_floor_when_findings_exist() {
        assert_eq!(health_score(&counts(20, 0, 0), &OptimizationStatus::default()), 5);
    }

    #[test]
    fn test_summarize_real_config() {
        let yaml = "kind: Provisioner\nmetadata:\n  name: p\nspec:\n  consolidation:\n    enabled: true\n  ttlSecondsAfterEmpty: 30\n";
        let config = parse_documents(yaml).unwrap();
        let findings = detect_all(&config);
        let summary = summarize(&config, &findings);
        // spot-disabled (high) and graviton-unused (medium)
        assert_eq!(summary.severity_counts, counts(1, 1, 0));
        assert_eq!(summary.optimization.consolidation_enabled, 1);
        assert_eq!(summary.health_score, 100 - 8 - 5 + 2);
    }
}
