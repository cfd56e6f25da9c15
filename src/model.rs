//! Wire-level data model: topology requests, compute instance sets, and
//! result records (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One region's worth of cloud-instance-id -> scheduler-visible host name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComputeInstanceGroup {
    pub region: String,
    pub instances: BTreeMap<String, String>,
}

pub type ComputeInstanceSet = Vec<ComputeInstanceGroup>;

/// Returns `Err` if any instance id appears in more than one group.
pub fn validate_instance_set(nodes: &ComputeInstanceSet) -> Result<(), crate::error::Error> {
    let mut seen = std::collections::HashSet::new();
    for group in nodes {
        for instance_id in group.instances.keys() {
            if !seen.insert(instance_id.clone()) {
                return Err(crate::error::Error::user(format!(
                    "instance id {instance_id} appears in more than one region group"
                )));
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub creds: serde_json::Value,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologyRequest {
    #[serde(default)]
    pub provider: ProviderRequest,
    #[serde(default)]
    pub engine: EngineRequest,
    #[serde(default)]
    pub nodes: ComputeInstanceSet,
}

impl TopologyRequest {
    /// Stable canonical-JSON hash used as the lookup key throughout the
    /// queue and the `/v1/lookup` endpoint. Two requests hash equal iff
    /// their canonical serialization matches.
    pub fn content_hash(&self) -> String {
        let canonical = canonical_json(&serde_json::to_value(self).expect("serializable"));
        let mut hasher = fnv1a();
        hasher.write(canonical.as_bytes());
        format!("{:016x}", hasher.finish())
    }
}

/// Recursively sorts object keys so structurally-identical JSON always
/// serializes identically regardless of field insertion order.
fn canonical_json(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let body = entries
                .iter()
                .map(|(k, v)| format!("{:?}:{}", k, canonical_json(v)))
                .collect::<Vec<_>>()
                .join(",");
            format!("{{{body}}}")
        }
        serde_json::Value::Array(items) => {
            let body = items.iter().map(canonical_json).collect::<Vec<_>>().join(",");
            format!("[{body}]")
        }
        other => other.to_string(),
    }
}

struct Fnv1a(u64);

fn fnv1a() -> Fnv1a {
    Fnv1a(0xcbf29ce484222325)
}

impl Fnv1a {
    fn write(&mut self, bytes: &[u8]) {
        for b in bytes {
            self.0 ^= *b as u64;
            self.0 = self.0.wrapping_mul(0x100000001b3);
        }
    }

    fn finish(&self) -> u64 {
        self.0
    }
}

/// Lowercase hex FNV-1a of a string, used by the renderer's label-length
/// mitigation (spec §4.D).
pub fn fnv1a_hex(input: &str) -> String {
    let mut hasher = fnv1a();
    hasher.write(input.as_bytes());
    format!("{:016x}", hasher.finish())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRecord {
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl ResultRecord {
    pub fn pending() -> Self {
        Self {
            status: 202,
            body: None,
            message: "pending".to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn ok(body: String) -> Self {
        Self {
            status: 200,
            body: Some(body),
            message: "ok".to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn error(status: u16, message: String) -> Self {
        Self {
            status,
            body: None,
            message,
            created_at: Utc::now(),
        }
    }

    pub fn not_found(id: &str) -> Self {
        Self::error(404, format!("request ID {id} not found"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_order_independent() {
        let a = TopologyRequest {
            provider: ProviderRequest {
                name: "test".into(),
                ..Default::default()
            },
            engine: EngineRequest::default(),
            nodes: vec![],
        };
        let mut b = a.clone();
        // serde_json::Value preserves insertion order for the params maps,
        // but field order in the struct itself never varies across
        // instances, so two semantically-identical requests must hash equal.
        b.provider.name = "test".into();
        assert_eq!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn content_hash_differs_for_different_content() {
        let a = TopologyRequest {
            provider: ProviderRequest {
                name: "aws".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        let b = TopologyRequest {
            provider: ProviderRequest {
                name: "gcp".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_ne!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn validate_instance_set_rejects_duplicate_ids() {
        let nodes = vec![
            ComputeInstanceGroup {
                region: "us-east".into(),
                instances: BTreeMap::from([("i-1".to_string(), "node1".to_string())]),
            },
            ComputeInstanceGroup {
                region: "us-west".into(),
                instances: BTreeMap::from([("i-1".to_string(), "node2".to_string())]),
            },
        ];
        assert!(validate_instance_set(&nodes).is_err());
    }
}
