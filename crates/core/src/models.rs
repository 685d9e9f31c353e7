use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub document_id: String,
    pub file_name: String,
    pub checksum: String,
    pub text: String,
    pub ingested_at: DateTime<Utc>,
}

impl DocumentRecord {
    pub fn new(file_name: impl Into<String>, bytes: &[u8], text: String) -> Self {
        let file_name = file_name.into();
        Self {
            document_id: sha256_hex(file_name.as_bytes()),
            checksum: sha256_hex(bytes),
            file_name,
            text,
            ingested_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub file_name: String,
    pub chunk_index: u64,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Entity {
    pub name: String,
    pub label: String,
}

impl Entity {
    pub fn merge_key(&self) -> String {
        format!("{}\u{1f}{}", self.name.to_lowercase(), self.label.to_lowercase())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Relationship {
    pub source: String,
    pub target: String,
    pub relation: String,
    pub evidence: Option<String>,
}

impl Relationship {
    pub fn merge_key(&self) -> String {
        format!(
            "{}\u{1f}{}\u{1f}{}",
            self.source.to_lowercase(),
            self.relation,
            self.target.to_lowercase()
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedGraph {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
}

impl ExtractedGraph {
    /// Folds another extraction into this one, collapsing entities that
    /// share a name+label key and exact duplicate relationships.
    pub fn merge(&mut self, other: ExtractedGraph) {
        let mut entity_keys: HashSet<String> =
            self.entities.iter().map(Entity::merge_key).collect();
        for entity in other.entities {
            if entity_keys.insert(entity.merge_key()) {
                self.entities.push(entity);
            }
        }

        let mut relationship_keys: HashSet<String> =
            self.relationships.iter().map(Relationship::merge_key).collect();
        for relationship in other.relationships {
            if relationship_keys.insert(relationship.merge_key()) {
                self.relationships.push(relationship);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    Vector,
    Graph,
    Hybrid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk_id: String,
    pub file_name: String,
    pub text: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeAnswer {
    pub mode: RetrievalMode,
    pub answer: String,
    pub evidence: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum BranchOutcome {
    Answered(ModeAnswer),
    Unavailable { reason: String },
}

impl BranchOutcome {
    pub fn is_answered(&self) -> bool {
        matches!(self, BranchOutcome::Answered(_))
    }

    pub fn evidence(&self) -> &[String] {
        match self {
            BranchOutcome::Answered(answer) => &answer.evidence,
            BranchOutcome::Unavailable { .. } => &[],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryComparison {
    pub question: String,
    pub vector: BranchOutcome,
    pub graph: BranchOutcome,
    pub hybrid: BranchOutcome,
}

#[derive(Debug, Clone, Copy)]
pub struct ChunkingOptions {
    pub chunk_chars: usize,
    pub overlap_chars: usize,
    pub min_chunk_chars: usize,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            chunk_chars: 1_200,
            overlap_chars: 120,
            min_chunk_chars: 40,
        }
    }
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
