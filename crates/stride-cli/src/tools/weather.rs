//! Weather lookup capability (static demo data)

use async_trait::async_trait;
use serde_json::{Value, json};
use stride_agent::{Capability, SessionContext};

use super::resolve_city;

/// (city, condition, temperature in Celsius)
const FORECASTS: &[(&str, &str, i32)] = &[
    ("paris", "sunny", 24),
    ("london", "light rain", 16),
    ("oslo", "overcast", 9),
    ("rome", "clear", 28),
    ("tokyo", "humid, scattered showers", 26),
    ("new york", "partly cloudy", 21),
    ("berlin", "windy", 14),
];

/// Current conditions for a city
pub struct WeatherTool;

impl WeatherTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WeatherTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Capability for WeatherTool {
    fn name(&self) -> &str {
        "get_weather"
    }

    fn description(&self) -> &str {
        "Get the current weather for a city."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "location": {
                    "type": "string",
                    "description": "City name, e.g. \"Paris\""
                }
            },
            "required": ["location"]
        })
    }

    async fn execute(&self, args: Value, _context: Option<&SessionContext>) -> Result<Value, String> {
        let location = args
            .get("location")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "location must be a non-empty string".to_string())?;

        let city = resolve_city(location, FORECASTS.iter().map(|(c, _, _)| *c))
            .ok_or_else(|| format!("No weather data for '{}'", location))?;
        let (_, condition, temp) = FORECASTS
            .iter()
            .find(|(c, _, _)| *c == city)
            .ok_or_else(|| format!("No weather data for '{}'", location))?;

        Ok(json!({
            "location": city,
            "condition": condition,
            "temperature_c": temp,
        }))
    }
}
