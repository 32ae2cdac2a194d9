//! Demo capabilities and the capability sets built from them

mod events;
mod shopping;
mod weather;

pub use events::EventSearchTool;
pub use shopping::{AddToCartTool, CartStore, ViewCartTool};
pub use weather::WeatherTool;

use std::sync::Arc;
use stride_agent::{
    CapabilityRegistry, CapabilitySet, FallbackPolicy, FinishAfterObservationRule, KeywordRule,
};

/// Names accepted by [`capability_set`]
pub const SET_NAMES: &[&str] = &["weather", "events", "shopping", "all"];

/// Resolve a known city from free text: exact match first, then the first
/// city mentioned anywhere in the text
pub(crate) fn resolve_city<'a>(
    text: &str,
    cities: impl IntoIterator<Item = &'a str>,
) -> Option<&'a str> {
    let needle = text.trim().to_lowercase();
    let cities: Vec<&'a str> = cities.into_iter().collect();
    cities
        .iter()
        .find(|c| **c == needle)
        .or_else(|| cities.iter().find(|c| needle.contains(**c)))
        .copied()
}

/// Registry with every demo capability
pub fn registry(cart: Arc<CartStore>) -> CapabilityRegistry {
    CapabilityRegistry::new()
        .with(Arc::new(WeatherTool::new()))
        .with(Arc::new(EventSearchTool::new()))
        .with(Arc::new(AddToCartTool::new(cart.clone())))
        .with(Arc::new(ViewCartTool::new(cart)))
}

fn weather_rule() -> KeywordRule {
    KeywordRule::new(
        "weather_keywords",
        ["weather", "forecast", "temperature", "rain", "sunny"],
        "get_weather",
    )
    .with_request_arg("location")
}

fn events_rule() -> KeywordRule {
    KeywordRule::new(
        "event_keywords",
        ["event", "concert", "things to do", "what's on", "happening"],
        "search_events",
    )
    .with_request_arg("location")
}

fn cart_rule() -> KeywordRule {
    KeywordRule::new("cart_keywords", ["cart", "basket"], "view_cart")
}

/// Look up a named capability set
pub fn capability_set(name: &str) -> Option<CapabilitySet> {
    let base = FallbackPolicy::new().with_rule(FinishAfterObservationRule);
    let set = match name {
        "weather" => CapabilitySet::new("weather")
            .with_capabilities(["get_weather"])
            .with_fallback(base.with_rule(weather_rule())),
        "events" => CapabilitySet::new("events")
            .with_capabilities(["search_events", "get_weather"])
            .with_fallback(base.with_rule(events_rule()).with_rule(weather_rule())),
        "shopping" => CapabilitySet::new("shopping")
            .with_capabilities(["add_to_cart", "view_cart"])
            .with_fallback(base.with_rule(cart_rule())),
        "all" => CapabilitySet::new("all").with_fallback(
            base.with_rule(weather_rule())
                .with_rule(events_rule())
                .with_rule(cart_rule()),
        ),
        _ => return None,
    };
    Some(set)
}
