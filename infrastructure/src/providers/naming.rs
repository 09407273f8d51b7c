//! Provider-safe tool names.
//!
//! Qualified names look like `eos-models/pr_z`, but function names sent to
//! providers must match `^[a-zA-Z0-9_-]{1,64}$`. The separator is encoded as
//! `__` and any other disallowed character as `_`. The map remembers every
//! encoding so names the model returns are mapped back exactly.

use reagent_domain::ToolSpec;
use std::collections::HashMap;

const MAX_NAME_LEN: usize = 64;
const SEPARATOR: &str = "__";

#[derive(Debug, Default, Clone)]
pub struct ToolNameMap {
    to_provider: HashMap<String, String>,
    to_qualified: HashMap<String, String>,
}

impl ToolNameMap {
    pub fn new(tools: &[ToolSpec]) -> Self {
        let mut map = Self::default();
        for spec in tools {
            map.insert(spec.name.as_str());
        }
        map
    }

    fn insert(&mut self, qualified: &str) {
        if self.to_provider.contains_key(qualified) {
            return;
        }
        let base = encode(qualified);
        let mut candidate = base.clone();
        let mut n = 2;
        while self.to_qualified.contains_key(&candidate) {
            let suffix = format!("_{}", n);
            let keep = MAX_NAME_LEN.saturating_sub(suffix.len()).min(base.len());
            candidate = format!("{}{}", &base[..keep], suffix);
            n += 1;
        }
        self.to_provider.insert(qualified.to_string(), candidate.clone());
        self.to_qualified.insert(candidate, qualified.to_string());
    }

    /// Provider-safe name for a qualified name.
    pub fn encode(&self, qualified: &str) -> String {
        self.to_provider
            .get(qualified)
            .cloned()
            .unwrap_or_else(|| encode(qualified))
    }

    /// Qualified name for a name the provider returned.
    ///
    /// Names this map never issued are decoded by separator only; the
    /// session reports them as unknown tools if they do not resolve.
    pub fn decode(&self, provider_name: &str) -> String {
        self.to_qualified
            .get(provider_name)
            .cloned()
            .unwrap_or_else(|| provider_name.replacen(SEPARATOR, "/", 1))
    }
}

fn encode(qualified: &str) -> String {
    let joined = qualified.replacen('/', SEPARATOR, 1);
    let mut safe: String = joined
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    safe.truncate(MAX_NAME_LEN);
    safe
}

#[cfg(test)]
mod tests {
    use super::*;
    use reagent_domain::QualifiedName;

    fn spec(source: &str, op: &str) -> ToolSpec {
        ToolSpec {
            name: QualifiedName::new(source, op),
            description: String::new(),
            input_schema: serde_json::json!({"type": "object"}),
        }
    }

    #[test]
    fn separator_is_encoded_and_decoded() {
        let map = ToolNameMap::new(&[spec("eos-models", "pr_z")]);
        assert_eq!(map.encode("eos-models/pr_z"), "eos-models__pr_z");
        assert_eq!(map.decode("eos-models__pr_z"), "eos-models/pr_z");
    }

    #[test]
    fn disallowed_characters_and_collisions() {
        let map = ToolNameMap::new(&[spec("calc", "a.b"), spec("calc", "a:b")]);
        let first = map.encode("calc/a.b");
        let second = map.encode("calc/a:b");
        assert_eq!(first, "calc__a_b");
        assert_ne!(first, second);
        assert_eq!(map.decode(&second), "calc/a:b");
    }

    #[test]
    fn long_names_are_truncated() {
        let long_op = "x".repeat(100);
        let map = ToolNameMap::new(&[spec("src", &long_op)]);
        let encoded = map.encode(&format!("src/{}", long_op));
        assert_eq!(encoded.len(), 64);
        assert_eq!(map.decode(&encoded), format!("src/{}", long_op));
    }

    #[test]
    fn unknown_names_fall_back_to_separator_decoding() {
        let map = ToolNameMap::default();
        assert_eq!(map.decode("ghost__op"), "ghost/op");
        assert_eq!(map.decode("plain"), "plain");
    }
}
