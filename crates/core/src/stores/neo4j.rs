use crate::models::{DocumentRecord, ExtractedGraph};
use crate::traits::GraphStore;
use crate::StorageError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Map, Value};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub struct Neo4jStore {
    endpoint: String,
    database: String,
    username: String,
    password: String,
    client: Client,
}

impl Neo4jStore {
    pub fn new(
        endpoint: impl Into<String>,
        database: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            database: database.into(),
            username: username.into(),
            password: password.into(),
            client: Client::new(),
        }
    }

    fn tx_url(&self) -> String {
        format!("{}/db/{}/tx/commit", self.endpoint, self.database)
    }

    async fn commit(&self, statements: Vec<Value>) -> Result<Value, StorageError> {
        let response = self
            .client
            .post(self.tx_url())
            .basic_auth(&self.username, Some(&self.password))
            .timeout(REQUEST_TIMEOUT)
            .json(&json!({ "statements": statements }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StorageError::BackendResponse {
                backend: "neo4j".to_string(),
                details: response.status().to_string(),
            });
        }

        let body: Value = response.json().await?;

        if let Some(error) = body
            .pointer("/errors")
            .and_then(Value::as_array)
            .and_then(|errors| errors.first())
        {
            let details = error
                .pointer("/message")
                .and_then(Value::as_str)
                .unwrap_or("unknown transaction error");
            return Err(StorageError::BackendResponse {
                backend: "neo4j".to_string(),
                details: details.to_string(),
            });
        }

        Ok(body)
    }
}

#[async_trait]
impl GraphStore for Neo4jStore {
    async fn ensure_schema(&self) -> Result<(), StorageError> {
        self.commit(vec![
            json!({
                "statement": "CREATE CONSTRAINT entity_identity IF NOT EXISTS \
                              FOR (e:Entity) REQUIRE (e.name, e.type) IS UNIQUE"
            }),
            json!({
                "statement": "CREATE CONSTRAINT document_identity IF NOT EXISTS \
                              FOR (d:Document) REQUIRE d.document_id IS UNIQUE"
            }),
        ])
        .await?;
        Ok(())
    }

    async fn upsert_document(&self, document: &DocumentRecord) -> Result<(), StorageError> {
        let cypher = "MERGE (d:Document {document_id: $document_id}) \
                      SET d.file_name = $file_name, \
                          d.checksum = $checksum, \
                          d.ingested_at = $ingested_at";

        self.commit(vec![json!({
            "statement": cypher,
            "parameters": {
                "document_id": document.document_id,
                "file_name": document.file_name,
                "checksum": document.checksum,
                "ingested_at": document.ingested_at.to_rfc3339(),
            }
        })])
        .await?;
        Ok(())
    }

    async fn upsert_graph(
        &self,
        document_id: &str,
        graph: &ExtractedGraph,
    ) -> Result<(), StorageError> {
        if graph.entities.is_empty() {
            return Ok(());
        }

        let entity_rows: Vec<_> = graph
            .entities
            .iter()
            .map(|entity| {
                json!({
                    "name": entity.name,
                    "label": entity.label,
                })
            })
            .collect();

        let relationship_rows: Vec<_> = graph
            .relationships
            .iter()
            .map(|relationship| {
                json!({
                    "source": relationship.source,
                    "target": relationship.target,
                    "relation": relationship.relation,
                    "evidence": relationship.evidence,
                })
            })
            .collect();

        // Entities merge on name+type, so re-ingesting the same document
        // (or another document mentioning the same entity) never duplicates
        // a node. Edges are written in the same transaction, after their
        // endpoints exist.
        let entity_cypher = "MATCH (d:Document {document_id: $document_id}) \
                             UNWIND $rows AS row \
                             MERGE (e:Entity {name: row.name, type: row.label}) \
                             MERGE (e)-[:MENTIONED_IN]->(d)";

        let relationship_cypher = "UNWIND $rows AS row \
                                   MATCH (source:Entity {name: row.source}) \
                                   MATCH (target:Entity {name: row.target}) \
                                   MERGE (source)-[r:RELATED {type: row.relation}]->(target) \
                                   SET r.evidence = row.evidence, \
                                       r.document_id = $document_id";

        let mut statements = vec![json!({
            "statement": entity_cypher,
            "parameters": { "document_id": document_id, "rows": entity_rows }
        })];

        if !relationship_rows.is_empty() {
            statements.push(json!({
                "statement": relationship_cypher,
                "parameters": { "document_id": document_id, "rows": relationship_rows }
            }));
        }

        self.commit(statements).await?;
        Ok(())
    }

    async fn run_query(
        &self,
        statement: &str,
        parameters: Value,
    ) -> Result<Vec<Value>, StorageError> {
        let body = self
            .commit(vec![json!({
                "statement": statement,
                "parameters": parameters,
            })])
            .await?;

        Ok(rows_from_response(&body))
    }

    async fn list_documents(&self) -> Result<Vec<String>, StorageError> {
        let rows = self
            .run_query(
                "MATCH (d:Document) WHERE d.file_name IS NOT NULL \
                 RETURN DISTINCT d.file_name AS file_name ORDER BY file_name",
                json!({}),
            )
            .await?;

        Ok(rows
            .iter()
            .filter_map(|row| row.pointer("/file_name").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    async fn delete_document(&self, file_name: &str) -> Result<(), StorageError> {
        // Entities mentioned only by this document go with it; entities
        // shared with other documents survive.
        let cypher = "MATCH (d:Document {file_name: $file_name}) \
                      OPTIONAL MATCH (e:Entity)-[:MENTIONED_IN]->(d) \
                      DETACH DELETE d \
                      WITH collect(DISTINCT e) AS entities \
                      UNWIND entities AS entity \
                      WITH entity \
                      WHERE entity IS NOT NULL \
                        AND NOT (entity)-[:MENTIONED_IN]->(:Document) \
                      DETACH DELETE entity";

        self.commit(vec![json!({
            "statement": cypher,
            "parameters": { "file_name": file_name }
        })])
        .await?;
        Ok(())
    }
}

/// Zips the transactional endpoint's columns/rows into one JSON object
/// per result row.
fn rows_from_response(body: &Value) -> Vec<Value> {
    let mut rows = Vec::new();

    for result in body
        .pointer("/results")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        let columns: Vec<&str> = result
            .pointer("/columns")
            .and_then(Value::as_array)
            .map(|columns| columns.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        for entry in result
            .pointer("/data")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            let values = match entry.pointer("/row").and_then(Value::as_array) {
                Some(values) => values,
                None => continue,
            };

            let mut row = Map::new();
            for (column, value) in columns.iter().zip(values.iter()) {
                row.insert((*column).to_string(), value.clone());
            }
            if !row.is_empty() {
                rows.push(Value::Object(row));
            }
        }
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_keyed_by_column_names() {
        let body = json!({
            "results": [
                {
                    "columns": ["entityName", "relationshipType"],
                    "data": [
                        { "row": ["Alice", "WORKS_FOR"] },
                        { "row": ["Bob", "FOUNDED"] }
                    ]
                }
            ],
            "errors": []
        });

        let rows = rows_from_response(&body);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].pointer("/entityName").and_then(Value::as_str), Some("Alice"));
        assert_eq!(
            rows[1].pointer("/relationshipType").and_then(Value::as_str),
            Some("FOUNDED")
        );
    }

    #[test]
    fn empty_results_yield_no_rows() {
        let body = json!({ "results": [], "errors": [] });
        assert!(rows_from_response(&body).is_empty());
    }

    #[test]
    fn rows_without_the_row_key_are_skipped() {
        let body = json!({
            "results": [
                { "columns": ["n"], "data": [ { "meta": [] } ] }
            ],
            "errors": []
        });
        assert!(rows_from_response(&body).is_empty());
    }
}
