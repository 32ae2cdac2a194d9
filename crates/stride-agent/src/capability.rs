//! Capability trait, session context, and the capability registry

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::fallback::FallbackPolicy;

/// Read-only identity and attribute bag threaded into context-aware capabilities
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for a known user
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Look up a key; `user_id` resolves to the identity field
    pub fn get(&self, key: &str) -> Option<&str> {
        if key == "user_id" {
            return self.user_id.as_deref();
        }
        self.attributes.get(key).map(String::as_str)
    }

    /// A key counts as present only when its value is non-blank
    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some_and(|v| !v.trim().is_empty())
    }

    /// Keys from `required` that are absent or blank
    pub fn missing<'a>(&self, required: &[&'a str]) -> Vec<&'a str> {
        required.iter().copied().filter(|k| !self.has(k)).collect()
    }

    /// JSON form injected as the `context` argument
    pub fn to_value(&self) -> Value {
        let mut map = serde_json::Map::new();
        if let Some(user_id) = &self.user_id {
            map.insert("user_id".into(), Value::String(user_id.clone()));
        }
        for (k, v) in &self.attributes {
            map.insert(k.clone(), Value::String(v.clone()));
        }
        Value::Object(map)
    }
}

/// An external operation the reasoner can invoke by name
#[async_trait]
pub trait Capability: Send + Sync {
    /// Registry key and the name the reasoner uses
    fn name(&self) -> &str;

    /// Description shown to the reasoner
    fn description(&self) -> &str;

    /// JSON Schema for arguments, not including the injected `context`
    fn parameters_schema(&self) -> Value;

    /// Whether the dispatcher must supply session context
    fn requires_context(&self) -> bool {
        false
    }

    /// Context keys that must be present when `requires_context` is true
    fn required_context_keys(&self) -> &'static [&'static str] {
        &["user_id"]
    }

    /// Run the capability. Context-aware capabilities also find the context
    /// under `args["context"]`.
    async fn execute(
        &self,
        args: Value,
        context: Option<&SessionContext>,
    ) -> std::result::Result<Value, String>;
}

/// Type alias for a shared capability
pub type BoxedCapability = Arc<dyn Capability>;

/// What the reasoner is told about a capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    pub requires_context: bool,
}

impl CapabilityDescriptor {
    pub fn from_capability(capability: &dyn Capability) -> Self {
        Self {
            name: capability.name().to_string(),
            description: capability.description().to_string(),
            parameters: capability.parameters_schema(),
            requires_context: capability.requires_context(),
        }
    }
}

/// Capabilities keyed by name, with compiled argument validators
#[derive(Default)]
pub struct CapabilityRegistry {
    capabilities: HashMap<String, BoxedCapability>,
    order: Vec<String>,
    schema_cache: HashMap<String, Arc<jsonschema::Validator>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`register`](Self::register)
    pub fn with(mut self, capability: BoxedCapability) -> Self {
        self.register(capability);
        self
    }

    /// Add a capability, replacing any existing one with the same name
    pub fn register(&mut self, capability: BoxedCapability) {
        let name = capability.name().to_string();
        if self.capabilities.contains_key(&name) {
            tracing::warn!("Capability '{}' registered twice, replacing", name);
        } else {
            self.order.push(name.clone());
        }
        self.cache_schema(&capability);
        self.capabilities.insert(name, capability);
    }

    /// Compile and cache the JSON schema validator for a capability.
    fn cache_schema(&mut self, capability: &BoxedCapability) {
        let schema = capability.parameters_schema();
        match jsonschema::validator_for(&schema) {
            Ok(validator) => {
                self.schema_cache
                    .insert(capability.name().to_string(), Arc::new(validator));
            }
            Err(e) => {
                self.schema_cache.remove(capability.name());
                tracing::warn!(
                    "Invalid parameter schema for capability '{}', skipping validation: {}",
                    capability.name(),
                    e
                );
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&BoxedCapability> {
        self.capabilities.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.capabilities.contains_key(name)
    }

    /// Names in registration order
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    /// Validate arguments against the cached schema.
    /// Returns `Some(error_message)` if validation fails.
    pub fn validate_args(&self, name: &str, args: &Value) -> Option<String> {
        self.schema_cache
            .get(name)
            .and_then(|validator| validate_with_validator(args, validator))
    }

    /// Descriptors for the named capabilities, in registration order.
    /// An empty filter selects every registered capability.
    pub fn descriptors(&self, filter: &[String]) -> Vec<CapabilityDescriptor> {
        self.order
            .iter()
            .filter(|name| filter.is_empty() || filter.iter().any(|f| f == *name))
            .filter_map(|name| self.capabilities.get(name))
            .map(|c| CapabilityDescriptor::from_capability(c.as_ref()))
            .collect()
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("capabilities", &self.order)
            .finish()
    }
}

/// Validate arguments using a pre-compiled validator.
fn validate_with_validator(args: &Value, validator: &jsonschema::Validator) -> Option<String> {
    let errors: Vec<String> = validator
        .iter_errors(args)
        .map(|e| {
            let path = e.instance_path.to_string();
            if path.is_empty() {
                e.to_string()
            } else {
                format!("{}: {}", path, e)
            }
        })
        .collect();

    if errors.is_empty() {
        None
    } else {
        Some(format!(
            "Argument validation failed:\n{}",
            errors.join("\n")
        ))
    }
}

/// A named slice of the registry plus the fallback rules that go with it
#[derive(Debug, Default)]
pub struct CapabilitySet {
    pub name: String,
    /// Capabilities described to the reasoner; empty means all registered
    pub capabilities: Vec<String>,
    pub fallback: FallbackPolicy,
}

impl CapabilitySet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capabilities: Vec::new(),
            fallback: FallbackPolicy::default(),
        }
    }

    pub fn with_capabilities<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackPolicy) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn includes(&self, name: &str) -> bool {
        self.capabilities.is_empty() || self.capabilities.iter().any(|c| c == name)
    }

    /// Descriptors the reasoner sees for this set
    pub fn descriptors(&self, registry: &CapabilityRegistry) -> Vec<CapabilityDescriptor> {
        registry.descriptors(&self.capabilities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoCapability;

    #[async_trait]
    impl Capability for EchoCapability {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes input"
        }
        fn parameters_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            })
        }
        async fn execute(
            &self,
            args: Value,
            _context: Option<&SessionContext>,
        ) -> std::result::Result<Value, String> {
            Ok(args["text"].clone())
        }
    }

    struct BrokenSchemaCapability;

    #[async_trait]
    impl Capability for BrokenSchemaCapability {
        fn name(&self) -> &str {
            "broken"
        }
        fn description(&self) -> &str {
            "Has an invalid schema"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "not-a-type"})
        }
        async fn execute(
            &self,
            _args: Value,
            _context: Option<&SessionContext>,
        ) -> std::result::Result<Value, String> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn test_session_context_lookup() {
        let ctx = SessionContext::for_user("u-1").with_attribute("region", "eu");
        assert_eq!(ctx.get("user_id"), Some("u-1"));
        assert_eq!(ctx.get("region"), Some("eu"));
        assert!(ctx.has("region"));
        assert!(!ctx.has("locale"));
        assert_eq!(ctx.missing(&["user_id", "locale"]), vec!["locale"]);
        assert_eq!(ctx.to_value(), json!({"user_id": "u-1", "region": "eu"}));
    }

    #[test]
    fn test_blank_user_id_is_missing() {
        let ctx = SessionContext::for_user("  ");
        assert_eq!(ctx.missing(&["user_id"]), vec!["user_id"]);
    }

    #[test]
    fn test_registry_validates_args() {
        let registry = CapabilityRegistry::new().with(Arc::new(EchoCapability));
        assert!(registry.validate_args("echo", &json!({"text": "hi"})).is_none());
        let err = registry.validate_args("echo", &json!({})).unwrap();
        assert!(err.contains("text"), "unexpected error: {}", err);
        let err = registry
            .validate_args("echo", &json!({"text": 42}))
            .unwrap();
        assert!(err.contains("/text"), "unexpected error: {}", err);
    }

    #[test]
    fn test_invalid_schema_skips_validation() {
        let registry = CapabilityRegistry::new().with(Arc::new(BrokenSchemaCapability));
        assert!(registry.contains("broken"));
        assert!(registry.validate_args("broken", &json!({"any": 1})).is_none());
    }

    #[test]
    fn test_descriptors_follow_registration_order_and_filter() {
        let registry = CapabilityRegistry::new()
            .with(Arc::new(EchoCapability))
            .with(Arc::new(BrokenSchemaCapability));
        assert_eq!(registry.names(), vec!["echo", "broken"]);

        let all = registry.descriptors(&[]);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "echo");

        let set = CapabilitySet::new("echo-only").with_capabilities(["echo"]);
        let only = set.descriptors(&registry);
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].description, "Echoes input");
        assert!(set.includes("echo"));
        assert!(!set.includes("broken"));
    }

    #[test]
    fn test_register_twice_replaces() {
        let mut registry = CapabilityRegistry::new();
        registry.register(Arc::new(EchoCapability));
        registry.register(Arc::new(EchoCapability));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.names(), vec!["echo"]);
    }
}
