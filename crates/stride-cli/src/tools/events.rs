//! Local events search capability (static demo data)

use async_trait::async_trait;
use serde_json::{Value, json};
use stride_agent::{Capability, SessionContext};

use super::resolve_city;

/// (city, category, title, day)
const EVENTS: &[(&str, &str, &str, &str)] = &[
    ("paris", "music", "Jazz at Le Duc des Lombards", "Friday"),
    ("paris", "art", "Impressionist night at the Orsay", "Thursday"),
    ("london", "sports", "Premier League: Arsenal v Spurs", "Saturday"),
    ("london", "music", "Proms in the Park", "Sunday"),
    ("oslo", "food", "Fish market tasting tour", "Saturday"),
    ("rome", "art", "Vatican late opening", "Friday"),
    ("rome", "food", "Trastevere street food walk", "Wednesday"),
    ("tokyo", "music", "City pop revival live", "Saturday"),
    ("new york", "sports", "Yankees home game", "Tuesday"),
    ("berlin", "music", "Techno at the Kraftwerk", "Saturday"),
];

/// Upcoming events in a city, optionally filtered by category
pub struct EventSearchTool;

impl EventSearchTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for EventSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Capability for EventSearchTool {
    fn name(&self) -> &str {
        "search_events"
    }

    fn description(&self) -> &str {
        "Search upcoming local events in a city, optionally by category (music, sports, art, food)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "location": {
                    "type": "string",
                    "description": "City name"
                },
                "category": {
                    "type": "string",
                    "description": "Optional category: music, sports, art, food"
                }
            },
            "required": ["location"]
        })
    }

    async fn execute(&self, args: Value, _context: Option<&SessionContext>) -> Result<Value, String> {
        let location = args
            .get("location")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let category = args
            .get("category")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());

        let mut cities: Vec<&str> = EVENTS.iter().map(|(c, _, _, _)| *c).collect();
        cities.dedup();
        let city = resolve_city(location, cities)
            .ok_or_else(|| format!("No event listings for '{}'", location))?;

        let events: Vec<Value> = EVENTS
            .iter()
            .filter(|(c, cat, _, _)| *c == city && category.as_deref().is_none_or(|want| want == *cat))
            .map(|(_, cat, title, day)| json!({"title": title, "category": cat, "day": day}))
            .collect();

        Ok(json!({
            "location": city,
            "count": events.len(),
            "events": events,
        }))
    }
}
