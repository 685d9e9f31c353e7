use crate::error::QueryTranslationError;
use regex::Regex;

pub const TRANSLATION_SYSTEM_PROMPT: &str =
    "You are a helpful assistant that generates Cypher queries for a Neo4j database.";

/// Statements the translator may execute. Generated queries are read-only;
/// anything that writes is rejected before it reaches the database.
const FORBIDDEN_CLAUSES: [&str; 9] = [
    "CREATE", "MERGE", "DELETE", "DETACH", "SET", "REMOVE", "DROP", "LOAD", "CALL",
];

pub fn translation_prompt(question: &str) -> String {
    format!(
        r#"Convert the question below into one valid Cypher query for a Neo4j database.

The database contains Entity nodes (name, type) and Document nodes (document_id, file_name). Entities are connected to the documents that mention them by MENTIONED_IN relationships, and to each other by RELATED relationships carrying a 'type' property (e.g. WORKS_FOR, FOUNDED, HEADQUARTERED_IN).

Requirements:
- Return a single read-only query starting with MATCH; never use UNION, CREATE, MERGE, DELETE, or SET.
- Assign matched relationships to a variable (e.g. [r:RELATED]) and use it in the RETURN clause (e.g. type(r) AS relationshipType).
- Every variable in the RETURN clause must be bound in the MATCH clause.
- Match entity names with CONTAINS so partial names work (for 'Alice', use e.name CONTAINS 'Alice' to match 'Alice Johnson').
- For questions about the relationship between two entities, return only the relationship type.
- Output only the Cypher query text, with no Markdown, code fences, or prefixes.

Examples:
Question: "What is the relationship between Alice and TechCorp?"
Cypher Query:
MATCH (e:Entity)-[r:RELATED]->(t:Entity {{name: 'TechCorp'}})
WHERE e.name CONTAINS 'Alice'
RETURN type(r) AS relationshipType

Question: "Who works for TechCorp?"
Cypher Query:
MATCH (e:Entity)-[r:RELATED {{type: 'WORKS_FOR'}}]->(t:Entity {{name: 'TechCorp'}})
RETURN e.name AS entityName

Question: {question}

Cypher Query:"#
    )
}

/// The broadened fallback used when the translated query matches nothing:
/// any entity whose name contains a significant term from the question,
/// with the relationship type constraint dropped.
pub const BROADEN_QUERY: &str = "MATCH (e:Entity)-[r:RELATED]-(other:Entity) \
     WHERE any(term IN $terms WHERE toLower(e.name) CONTAINS term OR toLower(other.name) CONTAINS term) \
     RETURN DISTINCT e.name AS source, r.type AS relation, other.name AS target LIMIT 25";

/// Strips code fences and a leading `cypher` language tag from the model's reply.
pub fn sanitize_generated(raw: &str) -> String {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix("```cypher")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix("```").unwrap_or(trimmed);
    trimmed.trim().trim_end_matches(';').trim().to_string()
}

pub fn validate_cypher(statement: &str) -> Result<(), QueryTranslationError> {
    let trimmed = statement.trim();
    if trimmed.is_empty() {
        return Err(QueryTranslationError::InvalidCypher(
            "empty statement".to_string(),
        ));
    }

    let upper = trimmed.to_ascii_uppercase();
    if !(upper.starts_with("MATCH") || upper.starts_with("OPTIONAL MATCH")) {
        return Err(QueryTranslationError::InvalidCypher(format!(
            "statement must start with MATCH: {trimmed}"
        )));
    }

    let word = Regex::new(r"[A-Z]+")?;
    for token in word.find_iter(&upper) {
        if FORBIDDEN_CLAUSES.contains(&token.as_str()) {
            return Err(QueryTranslationError::InvalidCypher(format!(
                "statement contains a forbidden clause {}: {trimmed}",
                token.as_str()
            )));
        }
    }

    let return_at = upper
        .find("RETURN")
        .ok_or_else(|| {
            QueryTranslationError::InvalidCypher(format!("statement has no RETURN clause: {trimmed}"))
        })?;

    let pattern_part = &trimmed[..return_at];
    let return_part = &trimmed[return_at + "RETURN".len()..];

    for variable in return_variables(return_part)? {
        if !is_bound(pattern_part, &variable)? {
            return Err(QueryTranslationError::InvalidCypher(format!(
                "RETURN uses unbound variable '{variable}': {trimmed}"
            )));
        }
    }

    Ok(())
}

/// Variables referenced by the RETURN clause: the identifier before a dot,
/// the argument of functions like `type(r)`, or a bare identifier.
fn return_variables(return_part: &str) -> Result<Vec<String>, QueryTranslationError> {
    const NON_VARIABLES: [&str; 6] = ["distinct", "as", "type", "count", "collect", "tolower"];

    let identifier = Regex::new(r"[A-Za-z_][A-Za-z0-9_]*")?;
    let mut variables = Vec::new();

    for item in return_part.split(',') {
        let item = item.trim();
        let expression = match item.to_ascii_lowercase().find(" as ") {
            Some(position) => item[..position].trim(),
            None => item,
        };

        if let Some(found) = identifier
            .find_iter(expression)
            .map(|m| m.as_str().to_string())
            .find(|candidate| !NON_VARIABLES.contains(&candidate.to_lowercase().as_str()))
        {
            if !variables.contains(&found) {
                variables.push(found);
            }
        }
    }

    Ok(variables)
}

fn is_bound(pattern_part: &str, variable: &str) -> Result<bool, QueryTranslationError> {
    // Bound as a node `(var` / `(var:` or a relationship `[var:` / `[var]`.
    let binding = Regex::new(&format!(
        r"[(\[]\s*{}\s*[:\)\]]",
        regex::escape(variable)
    ))?;
    Ok(binding.is_match(pattern_part))
}

/// Lowercased tokens of the question worth matching against entity names.
pub fn significant_terms(question: &str) -> Vec<String> {
    let mut terms = Vec::new();
    for token in question.split_whitespace() {
        let term = token
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        if term.len() > 2 && !terms.contains(&term) {
            terms.push(term);
        }
    }
    terms
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_only_query_passes_validation() {
        let statement = "MATCH (e:Entity)-[r:RELATED]->(t:Entity {name: 'TechCorp'}) \
                         WHERE e.name CONTAINS 'Alice' \
                         RETURN type(r) AS relationshipType";
        assert!(validate_cypher(statement).is_ok());
    }

    #[test]
    fn mutating_statement_is_rejected() {
        let statement = "MATCH (e:Entity) DETACH DELETE e RETURN count(e)";
        let result = validate_cypher(statement);
        assert!(matches!(
            result,
            Err(QueryTranslationError::InvalidCypher(_))
        ));
    }

    #[test]
    fn statement_must_start_with_match() {
        let result = validate_cypher("CREATE (e:Entity {name: 'x'}) RETURN e");
        assert!(matches!(
            result,
            Err(QueryTranslationError::InvalidCypher(_))
        ));
    }

    #[test]
    fn unbound_return_variable_is_rejected() {
        let statement = "MATCH (e:Entity) RETURN ghost.name AS name";
        let result = validate_cypher(statement);
        assert!(matches!(
            result,
            Err(QueryTranslationError::InvalidCypher(_))
        ));
    }

    #[test]
    fn missing_return_is_rejected() {
        let result = validate_cypher("MATCH (e:Entity)");
        assert!(matches!(
            result,
            Err(QueryTranslationError::InvalidCypher(_))
        ));
    }

    #[test]
    fn fences_and_language_tag_are_sanitized() {
        let raw = "```cypher\nMATCH (e:Entity) RETURN e.name AS name;\n```";
        assert_eq!(
            sanitize_generated(raw),
            "MATCH (e:Entity) RETURN e.name AS name"
        );
    }

    #[test]
    fn significant_terms_skip_short_tokens_and_punctuation() {
        let terms = significant_terms("Who works for Acme Corp?");
        assert!(terms.contains(&"acme".to_string()));
        assert!(terms.contains(&"corp".to_string()));
        assert!(!terms.contains(&"for".to_string()));
    }

    #[test]
    fn broadened_fallback_passes_its_own_validation() {
        assert!(validate_cypher(BROADEN_QUERY).is_ok());
    }
}
