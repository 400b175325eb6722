//! Integration tests for the complete Design-on-Graph pipeline
//!
//! These tests drive whole turns across crates with in-memory collaborators:
//! - routing → Cypher generation → records → graph artifact → answer
//! - general questions with conversation history
//! - failure handling and artifact retention
//!
//! Run with: cargo test --test integration_tests

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use dograph_assistant::{
    Assistant, ConversationHistory, CypherExecutor, CypherQaEngine, LlmError, Neo4jError,
    ReasoningEngine, Route, APOLOGY_MESSAGE,
};
use dograph_viz::{sweep_at, GraphRenderer, VizGraph};
use serde_json::{json, Value};
use tempfile::tempdir;

// ============================================================================
// In-memory collaborators
// ============================================================================

/// Replies from a queue and records every prompt it saw.
struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, ()>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| Ok(r.to_string())).collect()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn push_failure(&self) {
        self.replies.lock().unwrap().push_back(Err(()));
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl ReasoningEngine for ScriptedModel {
    fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            _ => Err(LlmError::EmptyResponse { backend: "scripted" }),
        }
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

/// Serves a tiny assembly graph. Schema procedures get canned answers; any
/// other statement returns `rows` (or an error when `fail` is set).
struct AssemblyGraph {
    rows: Vec<Value>,
    fail: bool,
    statements: Mutex<Vec<String>>,
}

impl AssemblyGraph {
    fn new(rows: Vec<Value>) -> Arc<Self> {
        Arc::new(Self {
            rows,
            fail: false,
            statements: Mutex::new(Vec::new()),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            rows: Vec::new(),
            fail: true,
            statements: Mutex::new(Vec::new()),
        })
    }
}

impl CypherExecutor for AssemblyGraph {
    fn run(&self, statement: &str) -> Result<Vec<Value>, Neo4jError> {
        if statement.contains("db.schema.nodeTypeProperties") {
            return Ok(vec![
                json!({"nodeLabels": ["Operation"], "propertyName": "name"}),
                json!({"nodeLabels": ["Resource"], "propertyName": "name"}),
            ]);
        }
        if statement.contains("db.schema.relTypeProperties") {
            return Ok(vec![json!({"relType": ":`needResource`", "propertyName": "number"})]);
        }
        if statement.starts_with("MATCH (a)-[r]->(b)") {
            return Ok(vec![
                json!({"start": ["Operation"], "rel": "needResource", "end": ["Resource"]}),
            ]);
        }
        self.statements.lock().unwrap().push(statement.to_string());
        if self.fail {
            return Err(Neo4jError::Statement {
                code: "Neo.ClientError.Statement.SyntaxError".to_string(),
                message: "Invalid input".to_string(),
            });
        }
        Ok(self.rows.clone())
    }
}

struct Harness {
    assistant: Assistant,
    router: Arc<ScriptedModel>,
    answerer: Arc<ScriptedModel>,
    planner: Arc<ScriptedModel>,
}

fn harness(
    router: Arc<ScriptedModel>,
    answerer: Arc<ScriptedModel>,
    planner: Arc<ScriptedModel>,
    graph: Arc<AssemblyGraph>,
    dir: &std::path::Path,
) -> Harness {
    let qa = CypherQaEngine::new(router.clone(), graph);
    let assistant = Assistant::new(
        router.clone(),
        answerer.clone(),
        planner.clone(),
        Arc::new(qa),
        GraphRenderer::new(dir),
    );
    Harness {
        assistant,
        router,
        answerer,
        planner,
    }
}

fn artifact_graph(html: &str) -> VizGraph {
    let open = r#"<script id="graph-data" type="application/json">"#;
    let start = html.find(open).expect("graph data") + open.len();
    let end = start + html[start..].find("</script>").expect("closing tag");
    serde_json::from_str(&html[start..end].replace("<\\/", "</")).expect("graph json")
}

// ============================================================================
// Graph path
// ============================================================================

#[test]
fn test_graph_question_renders_required_resources() {
    let dir = tempdir().unwrap();
    let rows = vec![
        json!({"operation": "S40_04012", "resource": "Jig"}),
        json!({"operation": "S40_04013", "resource": "Jig"}),
    ];
    let graph = AssemblyGraph::new(rows);
    let h = harness(
        ScriptedModel::new(&[
            "graph",
            "```cypher\nMATCH (o:Operation)-[:needResource]->(r:Resource) RETURN o.name AS operation, r.name AS resource\n```",
        ]),
        ScriptedModel::new(&["- S40_04012 needs Jig\n- S40_04013 needs Jig"]),
        ScriptedModel::new(&[]),
        graph.clone(),
        dir.path(),
    );
    let mut history = ConversationHistory::default();

    let turn = h
        .assistant
        .handle_turn(&mut history, "Search all relationships between operations and resources.");

    assert_eq!(turn.route, Route::Graph);
    assert_eq!(turn.answer, "- S40_04012 needs Jig\n- S40_04013 needs Jig");
    let cypher = turn.cypher.as_deref().unwrap();
    assert!(cypher.starts_with("MATCH (o:Operation)"));
    assert_eq!(graph.statements.lock().unwrap().as_slice(), [cypher.to_string()]);

    // Router saw the classifier prompt, then the Cypher prompt with the schema.
    let router_prompts = h.router.prompts();
    assert_eq!(router_prompts.len(), 2);
    assert!(router_prompts[1].contains("(:Operation)-[:needResource]->(:Resource)"));

    // The answer model is grounded on the executed query and the raw records.
    let answer_prompt = &h.answerer.prompts()[0];
    assert!(answer_prompt.contains(cypher));
    assert!(answer_prompt.contains(r#""operation":"S40_04012""#));

    // Simple pair: two sources pointing at one shared target.
    let artifact = turn.artifact.expect("artifact");
    let html = std::fs::read_to_string(&artifact.path).unwrap();
    let g = artifact_graph(&html);
    assert_eq!(g.nodes.len(), 3);
    assert_eq!(g.edges.len(), 2);
    assert_eq!(g.node("Jig").unwrap().color, "#fc9797");
    assert_eq!(g.node("S40_04012").unwrap().color, "#97c2fc");
    assert!(h.planner.prompts().is_empty());
    assert_eq!(history.len(), 1);
}

#[test]
fn test_query_records_are_capped_at_top_k() {
    let dir = tempdir().unwrap();
    let rows: Vec<Value> = (0..10)
        .map(|i| json!({"op": format!("S40_0{i}"), "res": "Jig", "rel": "needResource"}))
        .collect();
    let router = ScriptedModel::new(&["graph", "MATCH (o)-[r]->(x) RETURN o.name AS op, x.name AS res, type(r) AS rel"]);
    let answerer = ScriptedModel::new(&["ok"]);
    let qa = CypherQaEngine::new(router.clone(), AssemblyGraph::new(rows)).with_top_k(4);
    let assistant = Assistant::new(
        router,
        answerer,
        ScriptedModel::new(&[]),
        Arc::new(qa),
        GraphRenderer::new(dir.path()),
    );
    let mut history = ConversationHistory::default();

    let turn = assistant.handle_turn(&mut history, "List operations and their resources.");
    let html = std::fs::read_to_string(turn.artifact.unwrap().path).unwrap();
    let g = artifact_graph(&html);
    assert_eq!(g.edges.len(), 4);
    assert_eq!(g.edges[0].label.as_deref(), Some("needResource"));
}

// ============================================================================
// General path
// ============================================================================

#[test]
fn test_marker_routes_general_with_history_window() {
    let dir = tempdir().unwrap();
    let h = harness(
        ScriptedModel::new(&["graph", "MATCH (o)-[:hasPredecessor]->(p) RETURN o.name AS op, p.name AS pred"]),
        ScriptedModel::new(&["S40_04012 follows S40_04011."]),
        ScriptedModel::new(&["| Order | Operation |\n|---|---|\n| 1 | S40_00001 |"]),
        AssemblyGraph::new(vec![json!({"op": "S40_04012", "pred": "S40_04011"})]),
        dir.path(),
    );
    let mut history = ConversationHistory::new(10);

    let first = h
        .assistant
        .handle_turn(&mut history, "List all predecessors of each operation.");
    assert_eq!(first.route, Route::Graph);

    let second = h.assistant.handle_turn(
        &mut history,
        "This is a general question. Please help me design a complete assembly scheme.",
    );
    assert_eq!(second.route, Route::General);
    assert!(second.artifact.is_none());
    assert!(second.answer.starts_with("| Order |"));

    // The marker never reaches the classifier.
    assert_eq!(h.router.prompts().len(), 2);
    let plan_prompt = &h.planner.prompts()[0];
    assert!(plan_prompt.contains("Human: List all predecessors of each operation."));
    assert!(plan_prompt.contains("AI: S40_04012 follows S40_04011."));
    assert_eq!(history.len(), 2);
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_failed_cypher_apologizes_and_records_the_turn() {
    let dir = tempdir().unwrap();
    let h = harness(
        ScriptedModel::new(&["graph", "MATCH (n RETURN n"]),
        ScriptedModel::new(&["unused"]),
        ScriptedModel::new(&[]),
        AssemblyGraph::failing(),
        dir.path(),
    );
    let mut history = ConversationHistory::default();

    let turn = h.assistant.handle_turn(&mut history, "List all information of resources.");
    assert_eq!(turn.answer, APOLOGY_MESSAGE);
    assert!(turn.artifact.is_none());
    assert!(h.answerer.prompts().is_empty());
    assert_eq!(history.window()[0].input, "List all information of resources.");
    assert_eq!(history.window()[0].output, APOLOGY_MESSAGE);
    assert_eq!(std::fs::read_dir(dir.path()).map(|d| d.count()).unwrap_or(0), 0);
}

#[test]
fn test_router_failure_defaults_to_graph() {
    let dir = tempdir().unwrap();
    let router = ScriptedModel::new(&[]);
    router.push_failure();
    let h = harness(
        router,
        ScriptedModel::new(&["Resources: Jig"]),
        ScriptedModel::new(&[]),
        AssemblyGraph::new(vec![json!({"r": {"name": "Jig", "cost": 12}})]),
        dir.path(),
    );
    // Queue the Cypher reply after the failed classification.
    h.router
        .replies
        .lock()
        .unwrap()
        .push_back(Ok("MATCH (r:Resource) RETURN r".to_string()));
    let mut history = ConversationHistory::default();

    let turn = h.assistant.handle_turn(&mut history, "List all information of resources.");
    assert_eq!(turn.route, Route::Graph);
    assert_eq!(turn.answer, "Resources: Jig");

    let html = std::fs::read_to_string(turn.artifact.unwrap().path).unwrap();
    let g = artifact_graph(&html);
    assert_eq!(g.nodes.len(), 1);
    assert_eq!(g.nodes[0].label, "Jig\ncost: 12");
}

// ============================================================================
// Retention
// ============================================================================

#[test]
fn test_sweep_removes_expired_turn_artifacts_only() {
    let dir = tempdir().unwrap();
    let renderer = GraphRenderer::new(dir.path());
    let first = renderer.render(&[json!({"a": "P1", "b": "R1"})]).unwrap();
    let second = renderer.render(&[json!({"a": "P2", "b": "R1"})]).unwrap();
    std::fs::write(dir.path().join("notes.html"), "keep").unwrap();

    let old = SystemTime::now() - Duration::from_secs(7200);
    std::fs::File::options()
        .write(true)
        .open(&first.path)
        .unwrap()
        .set_modified(old)
        .unwrap();

    let report = sweep_at(dir.path(), Duration::from_secs(3600), SystemTime::now());
    assert_eq!(report.removed, 1);
    assert_eq!(report.retained, 1);
    assert!(!first.path.exists());
    assert!(second.path.exists());
    assert!(dir.path().join("notes.html").exists());
}
