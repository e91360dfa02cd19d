//! The value passed to every hook factory and facet lifecycle callback.

use serde_json::{Map, Value};
use std::collections::HashMap;

/// Per-build configuration and scratch state threaded through the composition run.
///
/// `config` is the heterogeneous, per-kind configuration bag described in
/// `SPEC_FULL.md` §3: each hook interprets its own entry however it likes.
/// `extra` carries arbitrary user keys that aren't tied to a particular kind.
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub config: HashMap<String, Value>,
    pub debug: bool,
    pub extra: HashMap<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_config(mut self, kind: impl Into<String>, value: Value) -> Self {
        self.config.insert(kind.into(), value);
        self
    }

    /// Merge `overlay` on top of `self`, per the §3 merge rule: top-level fields
    /// are last-wins, except `config`, whose entries are deep-merged key by key
    /// (plain-object-to-plain-object recursively; anything else last-wins).
    pub fn merge(&self, overlay: &Context) -> Context {
        let mut config = self.config.clone();
        for (kind, overlay_value) in &overlay.config {
            match config.get(kind) {
                Some(base_value) => {
                    config.insert(kind.clone(), merge_value(base_value, overlay_value));
                }
                None => {
                    config.insert(kind.clone(), overlay_value.clone());
                }
            }
        }

        let mut extra = self.extra.clone();
        extra.extend(overlay.extra.clone());

        Context {
            config,
            debug: overlay.debug,
            extra,
        }
    }
}

/// Deep-merge rule for a single config value: object-over-object merges
/// recursively key by key; any other combination is last-wins (`overlay` replaces `base`).
fn merge_value(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            let mut merged: Map<String, Value> = base_map.clone();
            for (key, overlay_value) in overlay_map {
                match merged.get(key) {
                    Some(base_value) => {
                        let m = merge_value(base_value, overlay_value);
                        merged.insert(key.clone(), m);
                    }
                    None => {
                        merged.insert(key.clone(), overlay_value.clone());
                    }
                }
            }
            Value::Object(merged)
        }
        (_, overlay) => overlay.clone(),
    }
}
