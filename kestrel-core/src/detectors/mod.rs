//! Deterministic detectors.
//!
//! Each detector is a pure function over a [`CanonicalConfig`] returning the
//! findings it raises. The set is closed: cost, reliability, and security.

pub mod cost;
pub mod reliability;
pub mod security;

use crate::types::{CanonicalConfig, Finding, ProvisionerKind};

/// Which detector stage produced a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorStage {
    Cost,
    Reliability,
    Security,
}

impl DetectorStage {
    pub const ALL: [DetectorStage; 3] = [
        DetectorStage::Cost,
        DetectorStage::Reliability,
        DetectorStage::Security,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DetectorStage::Cost => "cost",
            DetectorStage::Reliability => "reliability",
            DetectorStage::Security => "security",
        }
    }

    pub fn run(&self, config: &CanonicalConfig) -> Vec<Finding> {
        match self {
            DetectorStage::Cost => cost::detect(config),
            DetectorStage::Reliability => reliability::detect(config),
            DetectorStage::Security => security::detect(config),
        }
    }
}

/// Run every detector in stage order.
pub fn detect_all(config: &CanonicalConfig) -> Vec<Finding> {
    DetectorStage::ALL
        .iter()
        .flat_map(|stage| stage.run(config))
        .collect()
}

/// Structural path of the requirements list for a policy kind.
pub(crate) fn requirements_field(kind: ProvisionerKind) -> &'static str {
    match kind {
        ProvisionerKind::NodePool => "spec.template.spec.requirements",
        ProvisionerKind::Provisioner => "spec.requirements",
    }
}
