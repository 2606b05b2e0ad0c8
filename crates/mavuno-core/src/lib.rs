//! Core domain model for the Mavuno surplus exchange.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const CRATE_NAME: &str = "mavuno-core";

/// What a donor is offering. Waste categories are routed to recycling
/// partners and never matched against the beneficiary catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListingType {
    Surplus,
    Produce,
    Biodegradable,
    #[serde(rename = "Non-Biodegradable")]
    NonBiodegradable,
}

impl ListingType {
    pub fn is_waste(&self) -> bool {
        matches!(self, Self::Biodegradable | Self::NonBiodegradable)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListingSource {
    Restaurant,
    Farmer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListingStatus {
    Available,
    #[serde(rename = "Pending Pickup")]
    PendingPickup,
    Completed,
    Expired,
}

/// Who posted a listing. Account management lives outside this workspace;
/// only the display identity travels with the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostedBy {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
}

/// Caller-supplied listing fields, before the store assigns identity,
/// timestamps, status, and matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingDraft {
    pub title: String,
    pub source: ListingSource,
    #[serde(rename = "type")]
    pub kind: ListingType,
    pub category: String,
    pub quantity: String,
    pub value: f64,
    pub description: String,
    pub county: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<DateTime<Utc>>,
    pub posted_by: PostedBy,
}

/// A persisted offer of surplus food or waste material. `matches` is
/// populated exactly once, at creation time, and never recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: Uuid,
    pub title: String,
    pub source: ListingSource,
    #[serde(rename = "type")]
    pub kind: ListingType,
    pub category: String,
    pub quantity: String,
    pub value: f64,
    pub description: String,
    pub county: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<DateTime<Utc>>,
    pub posted_at: DateTime<Utc>,
    pub posted_by: PostedBy,
    pub status: ListingStatus,
    pub matches: Vec<MatchResult>,
}

impl Listing {
    pub fn from_draft(id: Uuid, posted_at: DateTime<Utc>, draft: ListingDraft, matches: Vec<MatchResult>) -> Self {
        Self {
            id,
            title: draft.title,
            source: draft.source,
            kind: draft.kind,
            category: draft.category,
            quantity: draft.quantity,
            value: draft.value,
            description: draft.description,
            county: draft.county,
            expiry_date: draft.expiry_date,
            posted_at,
            posted_by: draft.posted_by,
            status: ListingStatus::Available,
            matches,
        }
    }
}

/// Static catalogue entry for a beneficiary organization. `distance` is a
/// travel-cost proxy in kilometres; `capacity` is an availability
/// percentage in 0..=100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeneficiaryOrg {
    pub id: String,
    pub name: String,
    pub county: String,
    pub distance: f64,
    pub capacity: u8,
}

/// A ranked suggestion pairing a listing with a candidate beneficiary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub id: String,
    pub name: String,
    pub distance: f64,
    pub score: u32,
    pub rationale: String,
}

/// One day's observed quantity (e.g. meals redirected).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub date: DateTime<Utc>,
    pub value: f64,
}

/// Output of the forecaster: seven projected daily points, an inverse-
/// volatility confidence score, and a templated recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub forecast: Vec<DataPoint>,
    pub confidence: u8,
    pub recommendation: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waste_types_are_flagged() {
        assert!(ListingType::Biodegradable.is_waste());
        assert!(ListingType::NonBiodegradable.is_waste());
        assert!(!ListingType::Surplus.is_waste());
        assert!(!ListingType::Produce.is_waste());
    }

    #[test]
    fn enum_wire_spellings_are_preserved() {
        assert_eq!(
            serde_json::to_string(&ListingType::NonBiodegradable).unwrap(),
            "\"Non-Biodegradable\""
        );
        assert_eq!(
            serde_json::to_string(&ListingStatus::PendingPickup).unwrap(),
            "\"Pending Pickup\""
        );
    }
}
