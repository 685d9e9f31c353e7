use crate::error::ExtractionParseError;
use crate::models::{Entity, ExtractedGraph, Relationship};
use serde::Deserialize;
use std::collections::HashMap;

pub const EXTRACTION_SYSTEM_PROMPT: &str =
    "You are a helpful assistant that extracts entities and relationships from text in JSON format.";

pub fn extraction_prompt(text: &str) -> String {
    format!(
        r#"Extract the key entities and their relationships from the text below.

Return one JSON object with this exact shape:
{{
  "entities": [{{"id": "unique_id", "name": "entity_name", "type": "entity_type"}}],
  "relationships": [{{"source": "source_id", "target": "target_id", "type": "RELATION_TYPE", "evidence": "optional quote from the text"}}]
}}

Rules:
- Entity types are "Person", "Organization", or "Location".
- Relationship types are uppercase verbs such as WORKS_FOR, FOUNDED, HEADQUARTERED_IN, COLLABORATED_WITH.
- IDs are unique, lowercase, with underscores instead of spaces (e.g. "alice_johnson").
- Every relationship's source and target must be the id of a listed entity.
- Pay attention to founding relationships: "founded by Alice Johnson" yields a FOUNDED relationship.
- If nothing is found, return empty lists.
- Output only the JSON object, with no Markdown and no explanations.

Example:
Text: "Alice Johnson is the CEO of TechCorp, which is headquartered in San Francisco. TechCorp was founded by Alice Johnson."
Output:
{{
  "entities": [
    {{"id": "alice_johnson", "name": "Alice Johnson", "type": "Person"}},
    {{"id": "techcorp", "name": "TechCorp", "type": "Organization"}},
    {{"id": "san_francisco", "name": "San Francisco", "type": "Location"}}
  ],
  "relationships": [
    {{"source": "alice_johnson", "target": "techcorp", "type": "WORKS_FOR"}},
    {{"source": "alice_johnson", "target": "techcorp", "type": "FOUNDED"}},
    {{"source": "techcorp", "target": "san_francisco", "type": "HEADQUARTERED_IN"}}
  ]
}}

Text: {text}

Output:"#
    )
}

#[derive(Debug, Deserialize)]
struct RawExtraction {
    entities: Vec<RawEntity>,
    relationships: Vec<RawRelationship>,
}

#[derive(Debug, Deserialize)]
struct RawEntity {
    id: String,
    name: String,
    #[serde(rename = "type")]
    label: String,
}

#[derive(Debug, Deserialize)]
struct RawRelationship {
    source: String,
    target: String,
    #[serde(rename = "type")]
    relation: String,
    #[serde(default)]
    evidence: Option<String>,
}

/// Removes the Markdown code fences some models wrap JSON output in.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix("```").unwrap_or(trimmed);
    trimmed.trim()
}

/// Parses the model's structured output and validates it against the
/// expected schema before anything reaches the graph store.
pub fn parse_extraction(raw: &str) -> Result<ExtractedGraph, ExtractionParseError> {
    let cleaned = strip_code_fences(raw);
    let parsed: RawExtraction = serde_json::from_str(cleaned)?;

    let mut names_by_id: HashMap<String, usize> = HashMap::new();
    let mut graph = ExtractedGraph::default();

    for raw_entity in parsed.entities {
        let id = raw_entity.id.trim().to_string();
        let name = raw_entity.name.trim().to_string();
        let label = raw_entity.label.trim().to_string();

        if id.is_empty() || name.is_empty() || label.is_empty() {
            return Err(ExtractionParseError::Schema(format!(
                "entity is missing id, name, or type: {id:?}/{name:?}/{label:?}"
            )));
        }

        let entity = Entity { name, label };
        let key = entity.merge_key();
        let position = match graph
            .entities
            .iter()
            .position(|existing| existing.merge_key() == key)
        {
            Some(position) => position,
            None => {
                graph.entities.push(entity);
                graph.entities.len() - 1
            }
        };
        names_by_id.insert(id, position);
    }

    for raw_relationship in parsed.relationships {
        let source = names_by_id.get(raw_relationship.source.trim()).copied();
        let target = names_by_id.get(raw_relationship.target.trim()).copied();

        let (source, target) = match (source, target) {
            (Some(source), Some(target)) => (source, target),
            _ => {
                return Err(ExtractionParseError::Schema(format!(
                    "relationship references unknown entity id: {} -> {}",
                    raw_relationship.source, raw_relationship.target
                )));
            }
        };

        let relation = raw_relationship.relation.trim().to_uppercase();
        if relation.is_empty() {
            return Err(ExtractionParseError::Schema(
                "relationship has an empty type".to_string(),
            ));
        }

        let relationship = Relationship {
            source: graph.entities[source].name.clone(),
            target: graph.entities[target].name.clone(),
            relation,
            evidence: raw_relationship
                .evidence
                .map(|quote| quote.trim().to_string())
                .filter(|quote| !quote.is_empty()),
        };

        if !graph
            .relationships
            .iter()
            .any(|existing| existing.merge_key() == relationship.merge_key())
        {
            graph.relationships.push(relationship);
        }
    }

    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{
        "entities": [
            {"id": "alice", "name": "Alice", "type": "Person"},
            {"id": "acme", "name": "Acme Corp", "type": "Organization"}
        ],
        "relationships": [
            {"source": "alice", "target": "acme", "type": "works_for", "evidence": "Alice works for Acme Corp."}
        ]
    }"#;

    #[test]
    fn valid_output_parses_into_graph() {
        let graph = parse_extraction(VALID).expect("valid extraction");

        assert_eq!(graph.entities.len(), 2);
        assert_eq!(graph.relationships.len(), 1);
        assert_eq!(graph.relationships[0].source, "Alice");
        assert_eq!(graph.relationships[0].target, "Acme Corp");
        assert_eq!(graph.relationships[0].relation, "WORKS_FOR");
        assert_eq!(
            graph.relationships[0].evidence.as_deref(),
            Some("Alice works for Acme Corp.")
        );
    }

    #[test]
    fn code_fences_are_stripped() {
        let fenced = format!("```json\n{VALID}\n```");
        let graph = parse_extraction(&fenced).expect("fenced extraction");
        assert_eq!(graph.entities.len(), 2);
    }

    #[test]
    fn non_json_output_is_a_parse_error() {
        let result = parse_extraction("I could not find any entities, sorry!");
        assert!(matches!(result, Err(ExtractionParseError::Json(_))));
    }

    #[test]
    fn unknown_relationship_endpoint_is_a_schema_error() {
        let raw = r#"{
            "entities": [{"id": "alice", "name": "Alice", "type": "Person"}],
            "relationships": [{"source": "alice", "target": "ghost", "type": "KNOWS"}]
        }"#;
        let result = parse_extraction(raw);
        assert!(matches!(result, Err(ExtractionParseError::Schema(_))));
    }

    #[test]
    fn blank_entity_fields_are_a_schema_error() {
        let raw = r#"{
            "entities": [{"id": "a", "name": "  ", "type": "Person"}],
            "relationships": []
        }"#;
        let result = parse_extraction(raw);
        assert!(matches!(result, Err(ExtractionParseError::Schema(_))));
    }

    #[test]
    fn duplicate_entities_collapse_and_keep_relationships_valid() {
        let raw = r#"{
            "entities": [
                {"id": "acme_1", "name": "Acme Corp", "type": "Organization"},
                {"id": "acme_2", "name": "acme corp", "type": "organization"},
                {"id": "alice", "name": "Alice", "type": "Person"}
            ],
            "relationships": [
                {"source": "alice", "target": "acme_2", "type": "WORKS_FOR"}
            ]
        }"#;
        let graph = parse_extraction(raw).expect("valid extraction");

        assert_eq!(graph.entities.len(), 2);
        assert_eq!(graph.relationships[0].target, "Acme Corp");
    }

    #[test]
    fn missing_keys_are_a_parse_error() {
        let result = parse_extraction(r#"{"entities": []}"#);
        assert!(matches!(result, Err(ExtractionParseError::Json(_))));
    }
}
