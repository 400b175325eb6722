//! Natural-language question → Cypher → result records.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use regex::Regex;
use serde_json::{json, Value};

use crate::neo4j::{CypherExecutor, Neo4jError};
use crate::prompts::{fill, CYPHER_GENERATION_PROMPT};
use crate::reasoning::{LlmError, ReasoningEngine};

pub const DEFAULT_TOP_K: usize = 300;

/// Ontology scaffolding that never helps answer questions about the plant.
pub const EXCLUDED_TYPES: &[&str] = &[
    "Class",
    "Relationship",
    "_GraphConfig",
    "SCO_RESTRICTION",
    "DOMAIN",
    "RANGE",
    "isSubClassOf",
    "isSubPropertyOf",
    "hasOptionalAutoOperation",
    "hasOptionalManualOperation",
];

const NODE_PROPERTIES_QUERY: &str =
    "CALL db.schema.nodeTypeProperties() YIELD nodeLabels, propertyName RETURN nodeLabels, propertyName";
const REL_PROPERTIES_QUERY: &str =
    "CALL db.schema.relTypeProperties() YIELD relType, propertyName RETURN relType, propertyName";
const REL_PATTERNS_QUERY: &str = "MATCH (a)-[r]->(b) \
     WITH DISTINCT labels(a) AS start, type(r) AS rel, labels(b) AS end \
     RETURN start, rel, end LIMIT 1000";

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error(transparent)]
    Neo4j(#[from] Neo4jError),
    #[error("cypher generation failed: {0}")]
    Llm(#[from] LlmError),
    #[error("the model produced no Cypher statement")]
    EmptyCypher,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutcome {
    pub records: Vec<Value>,
    pub cypher: Option<String>,
    pub intermediate_steps: Vec<Value>,
}

/// Answers a question with raw records from the knowledge graph.
pub trait GraphQueryEngine: Send + Sync {
    fn query(&self, question: &str) -> Result<QueryOutcome, QueryError>;
}

// =============================================================================
// Schema
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphSchema {
    pub node_properties: BTreeMap<String, BTreeSet<String>>,
    pub relationship_properties: BTreeMap<String, BTreeSet<String>>,
    pub relationships: BTreeSet<(String, String, String)>,
}

impl GraphSchema {
    pub fn fetch(executor: &dyn CypherExecutor) -> Result<Self, Neo4jError> {
        let mut schema = Self::default();

        for row in executor.run(NODE_PROPERTIES_QUERY)? {
            let prop = row.get("propertyName").and_then(Value::as_str);
            for label in string_list(row.get("nodeLabels")) {
                let props = schema.node_properties.entry(label).or_default();
                if let Some(p) = prop {
                    props.insert(p.to_string());
                }
            }
        }

        for row in executor.run(REL_PROPERTIES_QUERY)? {
            let Some(rel) = row.get("relType").and_then(Value::as_str) else {
                continue;
            };
            let props = schema
                .relationship_properties
                .entry(strip_type_quoting(rel))
                .or_default();
            if let Some(p) = row.get("propertyName").and_then(Value::as_str) {
                props.insert(p.to_string());
            }
        }

        for row in executor.run(REL_PATTERNS_QUERY)? {
            let rel = row.get("rel").and_then(Value::as_str).unwrap_or_default();
            let starts = string_list(row.get("start"));
            let ends = string_list(row.get("end"));
            for s in &starts {
                for e in &ends {
                    schema
                        .relationships
                        .insert((s.clone(), rel.to_string(), e.clone()));
                }
            }
        }

        Ok(schema)
    }

    /// Drop the given labels and relationship types, and any pattern that
    /// touches one of them.
    pub fn without(mut self, excluded: &[&str]) -> Self {
        let hidden = |name: &str| excluded.iter().any(|x| *x == name);
        self.node_properties.retain(|label, _| !hidden(label.as_str()));
        self.relationship_properties
            .retain(|rel, _| !hidden(rel.as_str()));
        self.relationships.retain(|(s, r, e)| {
            !hidden(s.as_str()) && !hidden(r.as_str()) && !hidden(e.as_str())
        });
        self
    }

    pub fn render(&self) -> String {
        let mut out = String::from("Node properties:\n");
        for (label, props) in &self.node_properties {
            out.push_str(&format!("{label} {{{}}}\n", join(props)));
        }
        out.push_str("Relationship properties:\n");
        for (rel, props) in &self.relationship_properties {
            out.push_str(&format!("{rel} {{{}}}\n", join(props)));
        }
        out.push_str("The relationships:\n");
        for (s, r, e) in &self.relationships {
            out.push_str(&format!("(:{s})-[:{r}]->(:{e})\n"));
        }
        out
    }
}

fn join(props: &BTreeSet<String>) -> String {
    props.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

fn string_list(v: Option<&Value>) -> Vec<String> {
    match v {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}

/// `` :`hasPredecessor` `` → `hasPredecessor`
fn strip_type_quoting(rel: &str) -> String {
    rel.trim_start_matches(':').trim_matches('`').to_string()
}

// =============================================================================
// Cypher extraction
// =============================================================================

fn fence_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```[A-Za-z]*\s*(.*?)```").ok())
        .as_ref()
}

/// Pull the statement out of a model reply: code fences and a leading
/// `cypher` tag are removed.
pub fn extract_cypher(reply: &str) -> String {
    let body = fence_regex()
        .and_then(|re| re.captures(reply))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(reply)
        .trim();
    let body = match body.get(..6) {
        Some(tag) if tag.eq_ignore_ascii_case("cypher") => {
            let rest = &body[6..];
            if rest.starts_with(char::is_whitespace) || rest.starts_with(':') {
                rest.trim_start_matches(':').trim_start()
            } else {
                body
            }
        }
        _ => body,
    };
    body.trim().to_string()
}

// =============================================================================
// Engine
// =============================================================================

/// Generates Cypher with a language model and runs it against the graph.
pub struct CypherQaEngine {
    llm: Arc<dyn ReasoningEngine>,
    executor: Arc<dyn CypherExecutor>,
    top_k: usize,
    schema: Mutex<Option<Arc<String>>>,
}

impl CypherQaEngine {
    pub fn new(llm: Arc<dyn ReasoningEngine>, executor: Arc<dyn CypherExecutor>) -> Self {
        Self {
            llm,
            executor,
            top_k: DEFAULT_TOP_K,
            schema: Mutex::new(None),
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Rendered schema, fetched once and then cached.
    pub fn schema_text(&self) -> Result<Arc<String>, Neo4jError> {
        let mut cached = self.schema.lock();
        if let Some(text) = cached.as_ref() {
            return Ok(Arc::clone(text));
        }
        let schema = GraphSchema::fetch(self.executor.as_ref())?.without(EXCLUDED_TYPES);
        tracing::info!(
            labels = schema.node_properties.len(),
            relationships = schema.relationship_properties.len(),
            "graph schema loaded"
        );
        let text = Arc::new(schema.render());
        *cached = Some(Arc::clone(&text));
        Ok(text)
    }

    /// Forget the cached schema so the next query re-reads it.
    pub fn refresh_schema(&self) {
        *self.schema.lock() = None;
    }
}

impl GraphQueryEngine for CypherQaEngine {
    fn query(&self, question: &str) -> Result<QueryOutcome, QueryError> {
        let schema = self.schema_text()?;
        let top_k = self.top_k.to_string();
        let prompt = fill(
            CYPHER_GENERATION_PROMPT,
            &[
                ("schema", schema.as_str()),
                ("question", question),
                ("top_k", top_k.as_str()),
            ],
        );
        let cypher = extract_cypher(&self.llm.complete(&prompt)?);
        if cypher.is_empty() {
            return Err(QueryError::EmptyCypher);
        }
        tracing::info!(cypher = %cypher, "generated cypher");

        let mut records = self.executor.run(&cypher)?;
        records.truncate(self.top_k);

        let intermediate_steps = vec![json!({ "query": cypher }), json!({ "context": records })];
        Ok(QueryOutcome {
            records,
            cypher: Some(cypher),
            intermediate_steps,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeGraph {
        schema_calls: AtomicUsize,
        last_statement: Mutex<Option<String>>,
        rows: Vec<Value>,
    }

    impl FakeGraph {
        fn new(rows: Vec<Value>) -> Self {
            Self {
                schema_calls: AtomicUsize::new(0),
                last_statement: Mutex::new(None),
                rows,
            }
        }
    }

    impl CypherExecutor for FakeGraph {
        fn run(&self, statement: &str) -> Result<Vec<Value>, Neo4jError> {
            if statement == NODE_PROPERTIES_QUERY {
                self.schema_calls.fetch_add(1, Ordering::SeqCst);
                return Ok(vec![
                    json!({"nodeLabels": ["Operation"], "propertyName": "name"}),
                    json!({"nodeLabels": ["Operation"], "propertyName": "duration"}),
                    json!({"nodeLabels": ["Class"], "propertyName": "uri"}),
                    json!({"nodeLabels": ["Resource"], "propertyName": null}),
                ]);
            }
            if statement == REL_PROPERTIES_QUERY {
                return Ok(vec![
                    json!({"relType": ":`hasPredecessor`", "propertyName": null}),
                    json!({"relType": ":`isSubClassOf`", "propertyName": null}),
                    json!({"relType": ":`needResource`", "propertyName": "number"}),
                ]);
            }
            if statement == REL_PATTERNS_QUERY {
                return Ok(vec![
                    json!({"start": ["Operation"], "rel": "hasPredecessor", "end": ["Operation"]}),
                    json!({"start": ["Operation"], "rel": "needResource", "end": ["Resource"]}),
                    json!({"start": ["Class"], "rel": "isSubClassOf", "end": ["Class"]}),
                ]);
            }
            *self.last_statement.lock() = Some(statement.to_string());
            Ok(self.rows.clone())
        }
    }

    struct Scripted(&'static str);

    impl ReasoningEngine for Scripted {
        fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
            Ok(self.0.to_string())
        }

        fn model(&self) -> &str {
            "scripted"
        }
    }

    #[test]
    fn extract_cypher_strips_fences_and_tag() {
        assert_eq!(
            extract_cypher("```cypher\nMATCH (n) RETURN n\n```"),
            "MATCH (n) RETURN n"
        );
        assert_eq!(extract_cypher("cypher MATCH (n) RETURN n"), "MATCH (n) RETURN n");
        assert_eq!(
            extract_cypher("Here you go:\n```\nMATCH (a)-->(b) RETURN a, b\n```\nthanks"),
            "MATCH (a)-->(b) RETURN a, b"
        );
        assert_eq!(extract_cypher("  MATCH (n) RETURN n  "), "MATCH (n) RETURN n");
        assert_eq!(extract_cypher("CypherNode"), "CypherNode");
    }

    #[test]
    fn schema_hides_ontology_scaffolding() {
        let graph = FakeGraph::new(Vec::new());
        let schema = GraphSchema::fetch(&graph)
            .expect("schema")
            .without(EXCLUDED_TYPES);
        let text = schema.render();
        assert!(text.contains("Operation {duration, name}"));
        assert!(text.contains("Resource {}"));
        assert!(text.contains("needResource {number}"));
        assert!(text.contains("(:Operation)-[:hasPredecessor]->(:Operation)"));
        assert!(!text.contains("Class"));
        assert!(!text.contains("isSubClassOf"));
    }

    #[test]
    fn query_runs_generated_cypher_and_caps_records() {
        let rows: Vec<Value> = (0..5)
            .map(|i| json!({"op": format!("S40_0401{i}"), "pred": "S40_04010"}))
            .collect();
        let graph = Arc::new(FakeGraph::new(rows));
        let engine = CypherQaEngine::new(
            Arc::new(Scripted("```cypher\nMATCH (o)-[:hasPredecessor]->(p) RETURN o.name AS op, p.name AS pred\n```")),
            graph.clone(),
        )
        .with_top_k(3);

        let out = engine.query("List all predecessors of each operation.").expect("query");
        assert_eq!(out.records.len(), 3);
        let cypher = out.cypher.as_deref().expect("cypher");
        assert!(cypher.starts_with("MATCH (o)"));
        assert_eq!(graph.last_statement.lock().as_deref(), Some(cypher));
        assert_eq!(out.intermediate_steps.len(), 2);
        assert_eq!(out.intermediate_steps[0]["query"], json!(cypher));
        assert_eq!(out.intermediate_steps[1]["context"].as_array().map(Vec::len), Some(3));

        engine.query("again").expect("query");
        assert_eq!(graph.schema_calls.load(Ordering::SeqCst), 1);
        engine.refresh_schema();
        engine.query("again").expect("query");
        assert_eq!(graph.schema_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn empty_generation_is_an_error() {
        let engine = CypherQaEngine::new(
            Arc::new(Scripted("```\n```")),
            Arc::new(FakeGraph::new(Vec::new())),
        );
        assert!(matches!(engine.query("q"), Err(QueryError::EmptyCypher)));
    }
}
