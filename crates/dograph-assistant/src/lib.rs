//! dograph-assistant: question answering over the assembly knowledge graph.
//!
//! ```text
//!                   ┌─ graph ──► CypherQaEngine ──► GraphRenderer ──► answer model
//!  question ──► classify_route
//!                   └─ general ─► planner model (with history window)
//! ```
//!
//! [`Assistant::handle_turn`] is the single entry point. It never fails: any
//! error on the query or reasoning path becomes a fixed apology, and the
//! exchange is always recorded in the caller's [`ConversationHistory`].

pub mod assistant;
pub mod config;
pub mod history;
pub mod neo4j;
pub mod prompts;
pub mod query;
pub mod reasoning;
pub mod router;

pub use assistant::{Assistant, TurnResponse, APOLOGY_MESSAGE};
pub use config::{AssistantConfig, ConfigError, LlmBackendKind, LlmConfig, ModelRoles, Neo4jConfig};
pub use history::{ConversationHistory, Exchange};
pub use neo4j::{CypherExecutor, Neo4jClient, Neo4jError};
pub use query::{CypherQaEngine, GraphQueryEngine, GraphSchema, QueryError, QueryOutcome};
pub use reasoning::{build_engine, LlmError, ReasoningEngine};
pub use router::{classify_route, Route, GENERAL_QUESTION_MARKER};

#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Neo4j(#[from] Neo4jError),
}
