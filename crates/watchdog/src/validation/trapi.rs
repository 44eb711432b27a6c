//! Translator Reasoner API (TRAPI) message schema.
//!
//! Only the parts of the message the watchdog compares are modelled. Unknown
//! properties are dropped, required ones (edge endpoints, binding ids, the
//! binding maps of a result) must be present with the right shape.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A TRAPI message: query graph, knowledge graph and results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrapiMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_graph: Option<QueryGraph>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge_graph: Option<KnowledgeGraph>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<TrapiResult>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryGraph {
    pub nodes: BTreeMap<String, QNode>,
    pub edges: BTreeMap<String, QEdge>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<String>>,
    #[serde(default)]
    pub is_set: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QEdge {
    pub subject: String,
    pub object: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicates: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeGraph {
    pub nodes: BTreeMap<String, Node>,
    pub edges: BTreeMap<String, Edge>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Vec<Attribute>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub subject: String,
    pub object: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Vec<Attribute>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub attribute_type_id: String,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_attribute_name: Option<String>,
}

/// One answer to the query graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrapiResult {
    pub node_bindings: BTreeMap<String, Vec<NodeBinding>>,
    pub edge_bindings: BTreeMap<String, Vec<EdgeBinding>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeBinding {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeBinding {
    pub id: String,
}

/// Check `raw` against the message schema and return its canonical form
pub(super) fn validate_message(raw: &Value) -> Result<Value, String> {
    let message = TrapiMessage::deserialize(raw).map_err(|e| e.to_string())?;
    serde_json::to_value(&message).map_err(|e| e.to_string())
}

/// Check a request payload: a query envelope `{"message": ...}` or a bare
/// message. Only the message is checked, the envelope may carry anything else.
pub(super) fn check_query(raw: &Value) -> Result<(), String> {
    let message = match raw {
        Value::Object(envelope) => envelope.get("message").unwrap_or(raw),
        _ => raw,
    };
    validate_message(message).map(drop)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_message_is_valid() {
        assert_eq!(validate_message(&json!({})), Ok(json!({})));
    }

    #[test]
    fn test_canonical_form_fills_defaults_and_drops_unknowns() {
        let raw = json!({
            "query_graph": {
                "nodes": {"BADF00D": {"vendor_extension": 1}},
                "edges": {}
            },
            "logs": []
        });
        let canonical = validate_message(&raw).unwrap();
        assert_eq!(
            canonical,
            json!({"query_graph": {"nodes": {"BADF00D": {"is_set": false}}, "edges": {}}})
        );
    }

    #[test]
    fn test_results_with_score() {
        let raw = json!({
            "results": [{"node_bindings": {}, "edge_bindings": {}, "score": 3}]
        });
        let message: TrapiMessage = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(message.results.unwrap()[0].score, Some(3.0));
        assert!(validate_message(&raw).is_ok());
    }

    #[test]
    fn test_query_envelope_checks_the_message() {
        let query = json!({
            "message": {"query_graph": {"nodes": {"n0": {"ids": ["MONDO:0005148"]}}, "edges": {}}},
            "submitter": "watchdog"
        });
        assert_eq!(check_query(&query), Ok(()));
        assert_eq!(check_query(&json!({})), Ok(()));

        let broken = json!({"message": {"results": "not a list"}});
        assert!(check_query(&broken).is_err());
        assert!(check_query(&json!({"message": [1]})).is_err());
    }

    #[test]
    fn test_missing_required_fields_rejected() {
        assert!(validate_message(&json!({"results": [{"score": 1}]})).is_err());
        assert!(
            validate_message(&json!({"query_graph": {"nodes": {}, "edges": {"e0": {"subject": "n0"}}}}))
                .is_err()
        );
        assert!(validate_message(&json!([1, 2, 3])).is_err());
    }
}
