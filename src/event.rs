//! Application events and the message mapping seam.
//!
//! Every `data` section delivered by an opened stack becomes one
//! [`LiveEvent`]. The client looks up a [`MessageDefinition`] by the
//! payload's tag and stores the mapped value next to the raw payload; the
//! core never interprets either.
//!
//! # Tags
//!
//! | `cmd` field | Tag |
//! |-------------|-----|
//! | `"DANMU_MSG"` | `DANMU_MSG` |
//! | `"DANMU_MSG:4:0:2:2:2:0"` | `DANMU_MSG` |
//! | missing / not a string | none |
//!
//! # Example
//!
//! ```ignore
//! let mut registry = MessageRegistry::new();
//! registry.register("DANMU_MSG", |raw: &Value| -> Result<Value> {
//!     Ok(raw["info"][1].clone())
//! });
//!
//! let event = registry.map(json!({"cmd": "DANMU_MSG", "info": [0, "hi"]}));
//! assert_eq!(event.mapped(), Some(&json!("hi")));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::{trace, warn};

use crate::error::Result;

// ============================================================================
// Tag
// ============================================================================

/// Returns the tag of a `cmd` string: everything before the first `:`.
#[inline]
#[must_use]
pub fn command_tag(cmd: &str) -> &str {
    cmd.split_once(':').map_or(cmd, |(tag, _)| tag)
}

// ============================================================================
// LiveEvent
// ============================================================================

/// One application-level event.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveEvent {
    /// The payload's `cmd` field, verbatim.
    cmd: Option<String>,
    /// The payload as received.
    raw: Value,
    /// Output of the matching definition, if any.
    mapped: Option<Value>,
}

impl LiveEvent {
    /// Creates an unmapped event from a raw payload.
    #[must_use]
    pub fn new(raw: Value) -> Self {
        let cmd = raw.get("cmd").and_then(Value::as_str).map(str::to_string);
        Self {
            cmd,
            raw,
            mapped: None,
        }
    }

    /// Returns the verbatim `cmd` field.
    #[inline]
    #[must_use]
    pub fn cmd(&self) -> Option<&str> {
        self.cmd.as_deref()
    }

    /// Returns the tag used for registry lookup.
    #[inline]
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        self.cmd().map(command_tag)
    }

    /// Returns the raw payload.
    #[inline]
    #[must_use]
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Returns the mapped value.
    #[inline]
    #[must_use]
    pub fn mapped(&self) -> Option<&Value> {
        self.mapped.as_ref()
    }

    /// Consumes the event, returning the raw payload.
    #[inline]
    #[must_use]
    pub fn into_raw(self) -> Value {
        self.raw
    }
}

// ============================================================================
// MessageDefinition
// ============================================================================

/// Maps one kind of raw payload to a domain value.
pub trait MessageDefinition: Send + Sync {
    /// Maps `raw`.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload does not have the expected shape.
    fn map(&self, raw: &Value) -> Result<Value>;
}

impl<F> MessageDefinition for F
where
    F: Fn(&Value) -> Result<Value> + Send + Sync,
{
    fn map(&self, raw: &Value) -> Result<Value> {
        self(raw)
    }
}

// ============================================================================
// MessageRegistry
// ============================================================================

/// Definitions keyed by tag.
#[derive(Clone, Default)]
pub struct MessageRegistry {
    definitions: FxHashMap<String, Arc<dyn MessageDefinition>>,
}

impl fmt::Debug for MessageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<_> = self.definitions.keys().collect();
        tags.sort();
        f.debug_struct("MessageRegistry").field("tags", &tags).finish()
    }
}

impl MessageRegistry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `definition` for `tag`, returning the one it replaces.
    pub fn register(
        &mut self,
        tag: impl Into<String>,
        definition: impl MessageDefinition + 'static,
    ) -> Option<Arc<dyn MessageDefinition>> {
        self.definitions.insert(tag.into(), Arc::new(definition))
    }

    /// Returns the definition registered for `tag`.
    #[inline]
    #[must_use]
    pub fn lookup(&self, tag: &str) -> Option<&dyn MessageDefinition> {
        self.definitions.get(tag).map(Arc::as_ref)
    }

    /// Returns the number of registered tags.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Returns `true` if nothing is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Builds the event for `raw`, applying the matching definition.
    ///
    /// A missing definition or a failed mapping leaves the event unmapped.
    #[must_use]
    pub fn map(&self, raw: Value) -> LiveEvent {
        let mut event = LiveEvent::new(raw);

        let Some(tag) = event.tag() else {
            trace!("Payload without cmd left unmapped");
            return event;
        };
        let Some(definition) = self.lookup(tag) else {
            trace!(tag, "No definition for tag");
            return event;
        };

        let mapped = match definition.map(&event.raw) {
            Ok(mapped) => Some(mapped),
            Err(e) => {
                warn!(tag, error = %e, "Message mapping failed");
                None
            }
        };
        event.mapped = mapped;
        event
    }
}

// ============================================================================
// Extension
// ============================================================================

/// A bundle of definitions installed when a client is built.
pub trait Extension: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Registers this extension's definitions.
    fn install(&self, registry: &mut MessageRegistry);
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::error::Error;

    #[test]
    fn test_command_tag() {
        assert_eq!(command_tag("DANMU_MSG"), "DANMU_MSG");
        assert_eq!(command_tag("DANMU_MSG:4:0:2:2:2:0"), "DANMU_MSG");
        assert_eq!(command_tag(":x"), "");
    }

    #[test]
    fn test_event_without_cmd() {
        let event = LiveEvent::new(json!({"info": 1}));
        assert_eq!(event.cmd(), None);
        assert_eq!(event.tag(), None);

        let event = LiveEvent::new(json!({"cmd": 5}));
        assert_eq!(event.cmd(), None);
    }

    #[test]
    fn test_lookup_by_tag() {
        let mut registry = MessageRegistry::new();
        registry.register("SEND_GIFT", |raw: &Value| -> Result<Value> {
            Ok(raw["data"]["num"].clone())
        });

        let event = registry.map(json!({"cmd": "SEND_GIFT:1", "data": {"num": 3}}));
        assert_eq!(event.tag(), Some("SEND_GIFT"));
        assert_eq!(event.mapped(), Some(&json!(3)));
        assert!(registry.lookup("SEND_GIFT").is_some());
        assert!(registry.lookup("SEND_GIFT:1").is_none());
    }

    #[test]
    fn test_unknown_tag_left_unmapped() {
        let registry = MessageRegistry::new();
        let raw = json!({"cmd": "UNKNOWN"});
        let event = registry.map(raw.clone());

        assert_eq!(event.mapped(), None);
        assert_eq!(event.raw(), &raw);
    }

    #[test]
    fn test_mapping_error_left_unmapped() {
        let mut registry = MessageRegistry::new();
        registry.register("X", |_: &Value| -> Result<Value> {
            Err(Error::protocol("bad shape"))
        });

        let event = registry.map(json!({"cmd": "X"}));
        assert_eq!(event.mapped(), None);
    }

    #[test]
    fn test_later_registration_replaces() {
        let mut registry = MessageRegistry::new();
        assert!(registry.register("X", |_: &Value| -> Result<Value> { Ok(json!(1)) }).is_none());
        assert!(registry.register("X", |_: &Value| -> Result<Value> { Ok(json!(2)) }).is_some());

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.map(json!({"cmd": "X"})).mapped(), Some(&json!(2)));
    }

    #[test]
    fn test_debug_lists_sorted_tags() {
        let mut registry = MessageRegistry::new();
        registry.register("B", |v: &Value| -> Result<Value> { Ok(v.clone()) });
        registry.register("A", |v: &Value| -> Result<Value> { Ok(v.clone()) });

        assert_eq!(format!("{registry:?}"), r#"MessageRegistry { tags: ["A", "B"] }"#);
    }
}
