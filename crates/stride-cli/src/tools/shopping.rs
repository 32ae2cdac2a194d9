//! Shopping cart capabilities
//!
//! Both capabilities require a `user_id` in the session context; carts are
//! kept per user in a shared [`CartStore`].

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use stride_agent::{Capability, SessionContext};

/// (item, unit price in cents)
const CATALOG: &[(&str, u64)] = &[
    ("coffee beans", 1450),
    ("green tea", 899),
    ("umbrella", 2500),
    ("sunscreen", 1199),
    ("concert ticket", 4500),
    ("notebook", 650),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartLine {
    pub item: String,
    pub quantity: u64,
    pub unit_price_cents: u64,
}

/// In-memory carts keyed by user id
#[derive(Debug, Default)]
pub struct CartStore {
    carts: Mutex<HashMap<String, Vec<CartLine>>>,
}

impl CartStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `quantity` of a catalog item; returns the updated line. The cart
    /// is left unchanged when the new line or cart total would not fit.
    pub fn add(&self, user_id: &str, item: &str, quantity: u64) -> Result<CartLine, String> {
        let needle = item.trim().to_lowercase();
        let (name, price) = CATALOG
            .iter()
            .find(|(name, _)| *name == needle || needle.contains(name))
            .ok_or_else(|| {
                let names: Vec<&str> = CATALOG.iter().map(|(n, _)| *n).collect();
                format!("'{}' is not in the catalog (available: {})", item, names.join(", "))
            })?;

        let mut carts = self.carts.lock();
        let cart = carts.entry(user_id.to_string()).or_default();
        let mut updated = cart.clone();
        let line = Self::add_line(&mut updated, name, *price, quantity)?;
        total_cents(&updated)?;
        *cart = updated;
        Ok(line)
    }

    fn add_line(
        cart: &mut Vec<CartLine>,
        name: &str,
        price: u64,
        quantity: u64,
    ) -> Result<CartLine, String> {
        match cart.iter_mut().find(|line| line.item == name) {
            Some(line) => {
                line.quantity = line
                    .quantity
                    .checked_add(quantity)
                    .ok_or_else(|| format!("quantity of '{}' is too large", name))?;
                Ok(line.clone())
            }
            None => {
                let line = CartLine {
                    item: name.to_string(),
                    quantity,
                    unit_price_cents: price,
                };
                cart.push(line.clone());
                Ok(line)
            }
        }
    }

    pub fn lines(&self, user_id: &str) -> Vec<CartLine> {
        self.carts.lock().get(user_id).cloned().unwrap_or_default()
    }
}

fn user_id(context: Option<&SessionContext>) -> Result<&str, String> {
    context
        .and_then(|c| c.get("user_id"))
        .ok_or_else(|| "no user in session context".to_string())
}

fn total_cents(lines: &[CartLine]) -> Result<u64, String> {
    lines.iter().try_fold(0u64, |total, line| {
        line.quantity
            .checked_mul(line.unit_price_cents)
            .and_then(|cost| total.checked_add(cost))
            .ok_or_else(|| "cart total is too large".to_string())
    })
}

/// Add an item to the user's cart
pub struct AddToCartTool {
    store: Arc<CartStore>,
}

impl AddToCartTool {
    pub fn new(store: Arc<CartStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Capability for AddToCartTool {
    fn name(&self) -> &str {
        "add_to_cart"
    }

    fn description(&self) -> &str {
        "Add an item from the catalog to the current user's shopping cart."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "item": {
                    "type": "string",
                    "description": "Catalog item name, e.g. \"umbrella\""
                },
                "quantity": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "How many to add (default: 1)"
                }
            },
            "required": ["item"]
        })
    }

    fn requires_context(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value, context: Option<&SessionContext>) -> Result<Value, String> {
        let user = user_id(context)?;
        let item = args
            .get("item")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "item must be a string".to_string())?;
        let quantity = args.get("quantity").and_then(|v| v.as_u64()).unwrap_or(1);

        let line = self.store.add(user, item, quantity)?;
        let lines = self.store.lines(user);
        Ok(json!({
            "added": line,
            "cart_items": lines.len(),
            "cart_total_cents": total_cents(&lines)?,
        }))
    }
}

/// Show the user's cart
pub struct ViewCartTool {
    store: Arc<CartStore>,
}

impl ViewCartTool {
    pub fn new(store: Arc<CartStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Capability for ViewCartTool {
    fn name(&self) -> &str {
        "view_cart"
    }

    fn description(&self) -> &str {
        "Show the items and total in the current user's shopping cart."
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    fn requires_context(&self) -> bool {
        true
    }

    async fn execute(&self, _args: Value, context: Option<&SessionContext>) -> Result<Value, String> {
        let user = user_id(context)?;
        let lines = self.store.lines(user);
        Ok(json!({
            "user_id": user,
            "lines": lines,
            "total_cents": total_cents(&lines)?,
        }))
    }
}
