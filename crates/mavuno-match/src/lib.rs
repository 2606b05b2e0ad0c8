//! Beneficiary catalogue + listing-to-beneficiary match engine.

use std::path::Path;

use anyhow::{Context, Result};
use mavuno_core::{BeneficiaryOrg, ListingDraft, MatchResult};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

pub const CRATE_NAME: &str = "mavuno-match";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("duplicate beneficiary id `{0}` in registry")]
    DuplicateId(String),
}

#[derive(Debug, Clone, Deserialize)]
struct RegistryFile {
    beneficiaries: Vec<BeneficiaryOrg>,
}

/// Read-only catalogue of beneficiary organizations. Loaded once at
/// startup; entries never change at runtime.
#[derive(Debug, Clone)]
pub struct BeneficiaryRegistry {
    entries: Vec<BeneficiaryOrg>,
}

impl BeneficiaryRegistry {
    pub fn new(entries: Vec<BeneficiaryOrg>) -> Result<Self, RegistryError> {
        for (i, entry) in entries.iter().enumerate() {
            if entries[..i].iter().any(|other| other.id == entry.id) {
                return Err(RegistryError::DuplicateId(entry.id.clone()));
            }
        }
        Ok(Self { entries })
    }

    /// The compiled-in default catalogue, used when no registry file is
    /// configured.
    pub fn builtin() -> Self {
        let org = |id: &str, name: &str, county: &str, distance: f64, capacity: u8| BeneficiaryOrg {
            id: id.to_string(),
            name: name.to_string(),
            county: county.to_string(),
            distance,
            capacity,
        };
        Self {
            entries: vec![
                org("1", "Nairobi Food Bank", "Nairobi", 2.5, 100),
                org("2", "Kisumu Care Centre", "Kisumu", 1.8, 50),
                org("3", "Mombasa Community Kitchen", "Mombasa", 3.2, 75),
                org("4", "Eldoret Feeding Program", "Eldoret", 4.1, 60),
                org("5", "Nakuru Charity Centre", "Nakuru", 2.9, 80),
                org("6", "Machakos Outreach", "Machakos", 5.3, 40),
            ],
        }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let parsed: RegistryFile = serde_yaml::from_str(yaml).context("parsing beneficiary registry yaml")?;
        Self::new(parsed.beneficiaries).context("validating beneficiary registry")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("loading {}", path.display()))
    }

    pub fn entries(&self) -> &[BeneficiaryOrg] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MatchConfig {
    pub top_n: usize,
    pub same_county_points: u32,
    pub nearby_points: u32,
    pub high_capacity_threshold: u8,
    pub high_capacity_points: u32,
    pub medium_capacity_threshold: u8,
    pub medium_capacity_points: u32,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            top_n: 3,
            same_county_points: 50,
            nearby_points: 25,
            high_capacity_threshold: 70,
            high_capacity_points: 30,
            medium_capacity_threshold: 40,
            medium_capacity_points: 15,
        }
    }
}

/// Ranks the catalogue against a new listing. Pure and deterministic for
/// a fixed registry.
#[derive(Debug, Clone)]
pub struct MatchEngine {
    registry: BeneficiaryRegistry,
    config: MatchConfig,
}

impl MatchEngine {
    pub fn new(registry: BeneficiaryRegistry, config: MatchConfig) -> Self {
        Self { registry, config }
    }

    pub fn with_builtin_registry() -> Self {
        Self::new(BeneficiaryRegistry::builtin(), MatchConfig::default())
    }

    pub fn registry(&self) -> &BeneficiaryRegistry {
        &self.registry
    }

    /// Rank beneficiaries for a newly created listing. Waste listings are
    /// never matched. Returns at most `top_n` entries.
    ///
    /// Ordering is a two-tier partition, not a composite sort key:
    /// same-county entries sorted by distance come first, then every other
    /// entry sorted by distance. The tiers are observably different from a
    /// single global sort when counties interleave at varying distances.
    pub fn match_listing(&self, listing: &ListingDraft) -> Vec<MatchResult> {
        if listing.kind.is_waste() {
            return Vec::new();
        }

        let (mut same_county, mut others): (Vec<&BeneficiaryOrg>, Vec<&BeneficiaryOrg>) = self
            .registry
            .entries()
            .iter()
            .partition(|org| org.county == listing.county);
        same_county.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        others.sort_by(|a, b| a.distance.total_cmp(&b.distance));

        let matches: Vec<MatchResult> = same_county
            .into_iter()
            .chain(others)
            .take(self.config.top_n)
            .map(|org| self.score(org, &listing.county))
            .collect();

        debug!(
            county = %listing.county,
            candidates = self.registry.len(),
            matched = matches.len(),
            "ranked beneficiaries for listing"
        );
        matches
    }

    fn score(&self, org: &BeneficiaryOrg, county: &str) -> MatchResult {
        let cfg = &self.config;
        let mut score = 0u32;
        let mut rationale = if org.county == county {
            score += cfg.same_county_points;
            format!("Same county match ({})", org.county)
        } else {
            score += cfg.nearby_points;
            format!("Nearby county ({:.1}km away)", org.distance)
        };

        if org.capacity > cfg.high_capacity_threshold {
            score += cfg.high_capacity_points;
            rationale.push_str(&format!(", High capacity ({}%)", org.capacity));
        } else if org.capacity > cfg.medium_capacity_threshold {
            score += cfg.medium_capacity_points;
            rationale.push_str(&format!(", Medium capacity ({}%)", org.capacity));
        } else {
            rationale.push_str(&format!(", Limited capacity ({}%)", org.capacity));
        }

        MatchResult {
            id: org.id.clone(),
            name: org.name.clone(),
            distance: org.distance,
            score,
            rationale,
        }
    }
}
