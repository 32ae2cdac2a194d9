//! Tool dispatcher
//!
//! Resolves a capability by name, checks and injects session context,
//! validates arguments, runs the capability under a per-call deadline, and
//! turns every outcome into a [`ToolObservation`]. Nothing raised by a
//! capability escapes this boundary. Each call emits one structured audit
//! record at `info` level.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, timeout};

use crate::capability::{CapabilityRegistry, SessionContext};
use crate::trajectory::{ToolObservation, truncate};

/// Default per-call deadline
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Executes one capability call. The loop controller only talks to this trait.
#[async_trait]
pub trait Dispatch: Send + Sync {
    async fn execute(
        &self,
        name: &str,
        args: &Map<String, Value>,
        context: Option<&SessionContext>,
    ) -> ToolObservation;
}

/// Registry-backed dispatcher
pub struct ToolDispatcher {
    registry: Arc<CapabilityRegistry>,
    timeout: Duration,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self {
            registry,
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    async fn run(
        &self,
        name: &str,
        args: &Map<String, Value>,
        context: Option<&SessionContext>,
    ) -> ToolObservation {
        let Some(capability) = self.registry.get(name) else {
            return ToolObservation::error(format!("Capability not found: {}", name));
        };

        let context = if capability.requires_context() {
            let Some(ctx) = context else {
                return ToolObservation::error(format!(
                    "Capability '{}' requires session context, but none was provided",
                    name
                ));
            };
            let missing = ctx.missing(capability.required_context_keys());
            if !missing.is_empty() {
                return ToolObservation::error(format!(
                    "Capability '{}' is missing session context: {}",
                    name,
                    missing.join(", ")
                ));
            }
            Some(ctx.clone())
        } else {
            None
        };

        let mut args = args.clone();
        // For context-aware capabilities `context` belongs to the dispatcher;
        // a model-supplied value is replaced, not validated.
        if context.is_some() {
            args.remove("context");
        }
        if let Some(err) = self.registry.validate_args(name, &Value::Object(args.clone())) {
            return ToolObservation::error(err);
        }
        if let Some(ctx) = &context {
            args.insert("context".into(), ctx.to_value());
        }
        let call_args = Value::Object(args);

        // Spawned so a panicking capability surfaces as an error observation
        let capability = Arc::clone(capability);
        let handle =
            tokio::spawn(async move { capability.execute(call_args, context.as_ref()).await });
        let abort = handle.abort_handle();

        match timeout(self.timeout, handle).await {
            Ok(Ok(Ok(value))) => ToolObservation::success(value),
            Ok(Ok(Err(message))) => ToolObservation::error(message),
            Ok(Err(join_err)) => ToolObservation::error(format!(
                "Capability '{}' aborted: {}",
                name, join_err
            )),
            Err(_) => {
                abort.abort();
                ToolObservation::Timeout {
                    after_ms: self.timeout.as_millis() as u64,
                }
            }
        }
    }
}

#[async_trait]
impl Dispatch for ToolDispatcher {
    async fn execute(
        &self,
        name: &str,
        args: &Map<String, Value>,
        context: Option<&SessionContext>,
    ) -> ToolObservation {
        let start = Instant::now();
        let observation = self.run(name, args, context).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let audit = serde_json::json!({
            "event": "capability_audit",
            "capability": name,
            "outcome": observation.status(),
            "duration_ms": duration_ms,
            "args_preview": truncate(&Value::Object(args.clone()).to_string(), 200),
        });
        tracing::info!(audit = %audit, "capability");

        observation
    }
}
