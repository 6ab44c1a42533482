//! Prompt builders for the three provider stages.

use serde_json::Value;

use crate::models::{BriefingRecord, SnapshotContext, VenueCandidate};

pub struct Prompt {
    pub system: String,
    pub user: String,
}

const STRATEGIST_SYSTEM: &str = "You are a rideshare strategy expert analyzing current market \
conditions for a driver. Be concrete and actionable.";

const CONSOLIDATOR_SYSTEM: &str = "You merge a strategist's analysis with live local intelligence \
into one final recommendation for a rideshare driver. Keep what is still true, correct what the \
briefing contradicts and stay under 300 words.";

const PLANNER_SYSTEM: &str = "You are a tactical planning expert creating specific venue \
recommendations. Respond with JSON only.";

fn json_or(value: Option<&Value>, empty: &str) -> String {
    match value {
        None | Some(Value::Null) => empty.to_string(),
        Some(Value::Array(items)) if items.is_empty() => empty.to_string(),
        Some(v) => v.to_string(),
    }
}

fn driver_context(snapshot: &SnapshotContext) -> String {
    format!(
        "DRIVER CONTEXT:\n\
         - Location: {} ({})\n\
         - GPS: {:.6}, {:.6}\n\
         - Time: {}\n\
         - Weather: {}\n\
         - Air quality: {}",
        snapshot.address_or_unknown(),
        snapshot.locality(),
        snapshot.lat,
        snapshot.lng,
        snapshot.local_time_label(),
        json_or(snapshot.weather.as_ref(), "Unknown"),
        json_or(snapshot.air_quality.as_ref(), "Unknown"),
    )
}

pub fn strategist(snapshot: &SnapshotContext) -> Prompt {
    Prompt {
        system: STRATEGIST_SYSTEM.to_string(),
        user: format!(
            "{}\n\n\
             TASK:\n\
             Analyze the current market conditions and provide strategic recommendations for \
             maximizing driver earnings.\n\n\
             Include:\n\
             1. Market overview (demand patterns, surge likelihood)\n\
             2. Strategic insights (why certain areas are busy, timing considerations)\n\
             3. Pro tips (specific actionable advice)\n\
             4. Earnings estimate (hourly potential based on conditions)\n\n\
             Write 200-300 words of actionable strategic analysis.",
            driver_context(snapshot)
        ),
    }
}

pub fn consolidator(
    stage_a_output: &str,
    briefing: &BriefingRecord,
    snapshot: &SnapshotContext,
) -> Prompt {
    Prompt {
        system: CONSOLIDATOR_SYSTEM.to_string(),
        user: format!(
            "STRATEGIC ANALYSIS:\n{}\n\n\
             {}\n\n\
             LOCAL BRIEFING:\n\
             - Traffic: {}\n\
             - Events: {}\n\
             - Holidays: {}\n\
             - Travel advisories: {}\n\n\
             TASK:\n\
             Produce the final strategy for the next hour. Name specific areas and times.",
            stage_a_output.trim(),
            driver_context(snapshot),
            json_or(briefing.traffic.as_ref(), "None reported"),
            json_or(briefing.events.as_ref(), "None reported"),
            json_or(briefing.holidays.as_ref(), "None"),
            json_or(briefing.travel_advisories.as_ref(), "None"),
        ),
    }
}

pub fn planner(
    final_output: &str,
    snapshot: &SnapshotContext,
    venues: &[VenueCandidate],
    min_venues: usize,
) -> Prompt {
    let venue_list = if venues.is_empty() {
        "No catalog venues available - generate from GPS coordinates".to_string()
    } else {
        venues
            .iter()
            .map(|v| {
                format!(
                    "- {} ({}) at {}",
                    v.name,
                    v.category.as_deref().unwrap_or("venue"),
                    v.formatted_address.as_deref().unwrap_or("address unknown")
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    Prompt {
        system: PLANNER_SYSTEM.to_string(),
        user: format!(
            "FINAL STRATEGY:\n{}\n\n\
             {}\n\n\
             AVAILABLE VENUES:\n{}\n\n\
             TASK:\n\
             Create a tactical plan with at least {} specific venue recommendations.\n\n\
             REQUIREMENTS:\n\
             1. If catalog venues are available, select from the list above\n\
             2. If there is no catalog, generate specific venues near the GPS coordinates\n\
             3. Staging area: centrally positioned, 1-2 min drive to all venues\n\
             4. Spread venues 2-3 minutes apart\n\n\
             Respond with JSON:\n\
             {{\n  \"staging_area\": {{\"name\": \"string\", \"address\": \"string\", \"reasoning\": \"string\"}},\n  \
             \"venues\": [{{\"name\": \"string\", \"address\": \"string\", \"category\": \"string\", \
             \"distance_miles\": number, \"drive_time_minutes\": number, \"reasoning\": \"string\"}}]\n}}",
            final_output.trim(),
            driver_context(snapshot),
            venue_list,
            min_venues
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn snapshot() -> SnapshotContext {
        SnapshotContext {
            snapshot_id: Uuid::new_v4(),
            lat: 32.7767,
            lng: -96.797,
            formatted_address: Some("1500 Marilla St, Dallas, TX".into()),
            city: Some("Dallas".into()),
            state: Some("TX".into()),
            timezone: Some("America/Chicago".into()),
            weather: Some(json!({"description": "clear", "temperature": 71})),
            air_quality: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_strategist_prompt_carries_location() {
        let prompt = strategist(&snapshot());
        assert!(prompt.user.contains("1500 Marilla St"));
        assert!(prompt.user.contains("Dallas, TX"));
        assert!(prompt.user.contains("\"temperature\":71"));
        assert!(prompt.user.contains("Air quality: Unknown"));
    }

    #[test]
    fn test_consolidator_prompt_marks_missing_briefing_fields() {
        let briefing = BriefingRecord {
            snapshot_id: Uuid::new_v4(),
            traffic: Some(json!({"congestion": "heavy on I-35"})),
            events: Some(json!([])),
            holidays: None,
            travel_advisories: None,
            updated_at: Utc::now(),
        };
        let prompt = consolidator("  Stage A text  ", &briefing, &snapshot());
        assert!(prompt.user.starts_with("STRATEGIC ANALYSIS:\nStage A text\n"));
        assert!(prompt.user.contains("heavy on I-35"));
        assert!(prompt.user.contains("Events: None reported"));
    }

    #[test]
    fn test_planner_prompt_without_catalog_falls_back_to_gps() {
        let prompt = planner("Final", &snapshot(), &[], 4);
        assert!(prompt.user.contains("generate from GPS coordinates"));
        assert!(prompt.user.contains("at least 4"));
    }
}
