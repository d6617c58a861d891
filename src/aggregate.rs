// src/aggregate.rs

//! Portainer master template list
//!
//! Every Portainer emission appends one v2 template entry. Once all records
//! are converted the aggregator renders `templates.json`, the single file a
//! Portainer instance is pointed at.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Portainer template format version
pub const TEMPLATE_VERSION: &str = "2";

/// Template type for compose stacks
pub const STACK_TEMPLATE_TYPE: u8 = 3;

#[derive(Error, Debug)]
pub enum AggregationError {
    #[error("Duplicate template id {0}")]
    DuplicateId(u32),

    #[error("Template ids out of order: {previous} followed by {current}")]
    OutOfOrder { previous: u32, current: u32 },

    #[error("Failed to serialize templates: {0}")]
    Serialize(String),
}

/// One entry of `templates.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortainerTemplate {
    pub id: u32,
    #[serde(rename = "type")]
    pub kind: u8,
    pub title: String,
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub categories: Vec<String>,
    pub platform: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    pub repository: TemplateRepository,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<TemplateEnv>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateRepository {
    pub url: String,
    pub stackfile: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateEnv {
    pub name: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TemplateDocument {
    version: String,
    templates: Vec<PortainerTemplate>,
}

/// Run-wide accumulator of Portainer templates
#[derive(Debug)]
pub struct TemplateAggregator {
    entries: Vec<(String, PortainerTemplate)>,
    next_id: u32,
}

impl Default for TemplateAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateAggregator {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 1,
        }
    }

    /// Id the next appended entry will receive
    pub fn next_id(&self) -> u32 {
        self.next_id
    }

    /// Add `template` for `record_id`, overwriting its id with the next one
    pub fn append(&mut self, record_id: &str, mut template: PortainerTemplate) -> u32 {
        let id = self.next_id;
        template.id = id;
        self.entries.push((record_id.to_string(), template));
        self.next_id += 1;
        id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render `templates.json`
    pub fn finalize(&self) -> Result<String, AggregationError> {
        let mut entries: Vec<&(String, PortainerTemplate)> = self.entries.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.id.cmp(&b.1.id)));

        let mut previous: Option<u32> = None;
        let mut seen = std::collections::BTreeSet::new();
        for (_, template) in &entries {
            if !seen.insert(template.id) {
                return Err(AggregationError::DuplicateId(template.id));
            }
            if let Some(prev) = previous
                && template.id <= prev
            {
                return Err(AggregationError::OutOfOrder {
                    previous: prev,
                    current: template.id,
                });
            }
            previous = Some(template.id);
        }

        let document = TemplateDocument {
            version: TEMPLATE_VERSION.to_string(),
            templates: entries.into_iter().map(|(_, t)| t.clone()).collect(),
        };
        let mut json = serde_json::to_string_pretty(&document)
            .map_err(|e| AggregationError::Serialize(e.to_string()))?;
        json.push('\n');

        serde_json::from_str::<TemplateDocument>(&json)
            .map_err(|e| AggregationError::Serialize(format!("output does not re-parse: {e}")))?;

        Ok(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(name: &str) -> PortainerTemplate {
        PortainerTemplate {
            id: 0,
            kind: STACK_TEMPLATE_TYPE,
            title: name.to_string(),
            name: name.to_string(),
            description: format!("{name} app"),
            note: None,
            categories: vec!["Utilities".to_string()],
            platform: "linux".to_string(),
            logo: None,
            repository: TemplateRepository {
                url: "https://example.com/repo".to_string(),
                stackfile: format!("converted/portainer/{name}/docker-compose.yml"),
            },
            env: Vec::new(),
        }
    }

    #[test]
    fn test_ids_sequential_from_one() {
        let mut agg = TemplateAggregator::new();
        assert!(agg.is_empty());
        assert_eq!(agg.next_id(), 1);
        assert_eq!(agg.append("alpha", template("alpha")), 1);
        assert_eq!(agg.append("beta", template("beta")), 2);
        assert_eq!(agg.append("gamma", template("gamma")), 3);
        assert_eq!(agg.len(), 3);
        assert_eq!(agg.next_id(), 4);
    }

    #[test]
    fn test_finalize_valid_document() {
        let mut agg = TemplateAggregator::new();
        for name in ["alpha", "beta", "gamma"] {
            agg.append(name, template(name));
        }

        let json = agg.finalize().unwrap();
        let doc: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(doc["version"], "2");
        let templates = doc["templates"].as_array().unwrap();
        assert_eq!(templates.len(), 3);
        let ids: Vec<u64> = templates.iter().map(|t| t["id"].as_u64().unwrap()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(templates[0]["type"], 3);
        assert!(templates[0].get("env").is_none());
    }

    #[test]
    fn test_empty_finalize() {
        let json = TemplateAggregator::new().finalize().unwrap();
        let doc: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(doc["templates"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn test_out_of_order_detected() {
        // Appending in non-sorted record order breaks the id ordering
        let mut agg = TemplateAggregator::new();
        agg.append("zeta", template("zeta"));
        agg.append("alpha", template("alpha"));
        assert!(matches!(
            agg.finalize(),
            Err(AggregationError::OutOfOrder {
                previous: 2,
                current: 1
            })
        ));
    }
}
