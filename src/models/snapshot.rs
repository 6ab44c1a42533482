use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Location and environment captured at one point in time. Read-only here.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SnapshotContext {
    pub snapshot_id: Uuid,
    pub lat: f64,
    pub lng: f64,
    pub formatted_address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub timezone: Option<String>,
    pub weather: Option<serde_json::Value>,
    pub air_quality: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl SnapshotContext {
    pub fn address_or_unknown(&self) -> &str {
        self.formatted_address.as_deref().unwrap_or("Unknown")
    }

    /// "City, ST" when both parts are known.
    pub fn locality(&self) -> String {
        match (self.city.as_deref(), self.state.as_deref()) {
            (Some(city), Some(state)) => format!("{}, {}", city, state),
            (Some(city), None) => city.to_string(),
            (None, Some(state)) => state.to_string(),
            (None, None) => "Unknown".to_string(),
        }
    }

    /// Local time in the snapshot's timezone, falling back to UTC when the
    /// zone is unknown.
    pub fn local_time_label(&self) -> String {
        let tz = self.timezone.as_deref().unwrap_or("UTC");
        format!("{} ({})", self.created_at.format("%A %Y-%m-%d %H:%M UTC"), tz)
    }
}

/// Contextual intelligence produced by the briefing pipeline for a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BriefingRecord {
    pub snapshot_id: Uuid,
    pub traffic: Option<serde_json::Value>,
    pub events: Option<serde_json::Value>,
    pub holidays: Option<serde_json::Value>,
    pub travel_advisories: Option<serde_json::Value>,
    pub updated_at: DateTime<Utc>,
}

/// A pre-scored venue near the snapshot. Scoring happens upstream.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct VenueCandidate {
    pub snapshot_id: Uuid,
    pub name: String,
    pub category: Option<String>,
    pub formatted_address: Option<String>,
    pub score: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> SnapshotContext {
        SnapshotContext {
            snapshot_id: Uuid::new_v4(),
            lat: 32.7767,
            lng: -96.7970,
            formatted_address: None,
            city: Some("Dallas".to_string()),
            state: Some("TX".to_string()),
            timezone: None,
            weather: None,
            air_quality: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_locality_joins_city_and_state() {
        assert_eq!(snapshot().locality(), "Dallas, TX");
    }

    #[test]
    fn test_missing_address_reads_unknown() {
        assert_eq!(snapshot().address_or_unknown(), "Unknown");
    }

    #[test]
    fn test_local_time_label_falls_back_to_utc() {
        assert!(snapshot().local_time_label().ends_with("(UTC)"));
    }
}
