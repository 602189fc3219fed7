//! Knowledge base entries seeded into the vector store.
//!
//! Entries come from a JSON file so the business definitions, table DDL and
//! validated example queries can change without a rebuild.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct KnowledgeBase {
    pub version: String,
    pub entries: Vec<Entry>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entry {
    /// Business metric or domain definition
    Documentation {
        title: String,
        content: String,
        #[serde(default = "default_category")]
        category: String,
    },
    /// Validated question/SQL pair used as a few-shot exemplar
    QuestionSql {
        question: String,
        sql: String,
        #[serde(default)]
        score: u8,
    },
    /// Table definition with usage notes
    Ddl { table_name: String, ddl: String },
}

fn default_category() -> String {
    "general".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum EntryKind {
    Documentation,
    QuestionSql,
    Ddl,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Documentation => "documentation",
            EntryKind::QuestionSql => "question_sql",
            EntryKind::Ddl => "ddl",
        }
    }
}

impl Entry {
    pub fn kind(&self) -> EntryKind {
        match self {
            Entry::Documentation { .. } => EntryKind::Documentation,
            Entry::QuestionSql { .. } => EntryKind::QuestionSql,
            Entry::Ddl { .. } => EntryKind::Ddl,
        }
    }

    /// Short human-readable name for progress output
    pub fn label(&self) -> &str {
        match self {
            Entry::Documentation { title, .. } => title,
            Entry::QuestionSql { question, .. } => question,
            Entry::Ddl { table_name, .. } => table_name,
        }
    }

    /// Text sent to the embedding model and stored as `content`
    pub fn embedding_text(&self) -> String {
        match self {
            Entry::Documentation {
                title,
                content,
                category,
            } => format!(
                "Title: {}\nCategory: {}\n\nDefinition:\n{}",
                title,
                category,
                content.trim()
            ),
            Entry::QuestionSql { question, sql, .. } => {
                format!("Question: {}\nSQL: {}", question, sql.trim())
            }
            Entry::Ddl { ddl, .. } => ddl.trim().to_string(),
        }
    }

    /// Point payload: the full text plus the entry's own fields
    pub fn payload(&self, seeded_at: &str) -> serde_json::Value {
        let mut payload = match self {
            Entry::Documentation {
                title, category, ..
            } => json!({ "title": title, "category": category }),
            Entry::QuestionSql { question, sql, score } => {
                json!({ "question": question, "sql": sql, "score": score })
            }
            Entry::Ddl { table_name, .. } => json!({ "table_name": table_name }),
        };
        payload["content"] = json!(self.embedding_text());
        payload["type"] = json!(self.kind().as_str());
        payload["seeded_at"] = json!(seeded_at);
        payload
    }

    /// Stable id derived from the embedded text: re-seeding the same entry
    /// overwrites its point instead of adding a new one
    pub fn point_id(&self) -> Uuid {
        let digest = Sha256::digest(self.embedding_text().as_bytes());
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        Uuid::from_bytes(bytes)
    }
}

/// Load the knowledge base JSON file
pub async fn load_knowledge(path: &Path) -> Result<KnowledgeBase> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read knowledge file {}", path.display()))?;
    parse_knowledge(&content)
}

pub fn parse_knowledge(content: &str) -> Result<KnowledgeBase> {
    serde_json::from_str(content).context("Failed to parse knowledge file")
}
