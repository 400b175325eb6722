//! One conversational turn: route, answer, render, remember.

use std::sync::Arc;

use dograph_viz::{ArtifactRef, GraphRenderer};
use serde::Serialize;

use crate::config::AssistantConfig;
use crate::history::ConversationHistory;
use crate::neo4j::Neo4jClient;
use crate::prompts::{fill, GENERAL_QA_PROMPT, GRAPH_RESPONSE_PROMPT};
use crate::query::{CypherQaEngine, GraphQueryEngine, QueryError};
use crate::reasoning::{build_engine, LlmError, ReasoningEngine};
use crate::router::{classify_route, Route};
use crate::AssistantError;

pub const APOLOGY_MESSAGE: &str = "Sorry, there was an error processing your question. Please try asking the question again or ask a different question.";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnResponse {
    pub answer: String,
    pub route: Route,
    /// Present only when a graph query produced a rendered result.
    pub artifact: Option<ArtifactRef>,
    pub cypher: Option<String>,
}

#[derive(Debug, thiserror::Error)]
enum TurnError {
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("failed to serialize query results: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The collaborators a turn needs. Holds no per-session state; history is
/// passed into every call.
pub struct Assistant {
    router: Arc<dyn ReasoningEngine>,
    answerer: Arc<dyn ReasoningEngine>,
    planner: Arc<dyn ReasoningEngine>,
    graph: Arc<dyn GraphQueryEngine>,
    renderer: GraphRenderer,
}

impl Assistant {
    pub fn new(
        router: Arc<dyn ReasoningEngine>,
        answerer: Arc<dyn ReasoningEngine>,
        planner: Arc<dyn ReasoningEngine>,
        graph: Arc<dyn GraphQueryEngine>,
        renderer: GraphRenderer,
    ) -> Self {
        Self {
            router,
            answerer,
            planner,
            graph,
            renderer,
        }
    }

    /// Wire up the configured backends, Neo4j and the artifact directory.
    pub fn from_config(config: &AssistantConfig) -> Result<Self, AssistantError> {
        let router = build_engine(&config.llm, &config.models.router)?;
        let answerer = build_engine(&config.llm, &config.models.answer)?;
        let planner = build_engine(&config.llm, &config.models.planner)?;
        let neo4j = Neo4jClient::new(&config.neo4j)?;
        tracing::info!(
            endpoint = neo4j.endpoint(),
            backend = config.llm.backend.as_str(),
            "assistant configured"
        );
        let graph = CypherQaEngine::new(Arc::clone(&router), Arc::new(neo4j))
            .with_top_k(config.query_top_k);
        Ok(Self::new(
            router,
            answerer,
            planner,
            Arc::new(graph),
            GraphRenderer::new(&config.static_dir),
        ))
    }

    pub fn renderer(&self) -> &GraphRenderer {
        &self.renderer
    }

    pub fn handle_turn(&self, history: &mut ConversationHistory, question: &str) -> TurnResponse {
        let context = history.render_window();
        let route = classify_route(self.router.as_ref(), question);
        tracing::info!(route = %route, "answering question");

        let outcome = match route {
            Route::Graph => self.answer_from_graph(question),
            Route::General => self.answer_generally(question, &context),
        };

        let response = match outcome {
            Ok((answer, artifact, cypher)) => TurnResponse {
                answer,
                route,
                artifact,
                cypher,
            },
            Err(e) => {
                tracing::error!(route = %route, error = %e, "turn failed");
                TurnResponse {
                    answer: APOLOGY_MESSAGE.to_string(),
                    route,
                    artifact: None,
                    cypher: None,
                }
            }
        };

        history.append(question, response.answer.as_str());
        response
    }

    fn answer_from_graph(
        &self,
        question: &str,
    ) -> Result<(String, Option<ArtifactRef>, Option<String>), TurnError> {
        let outcome = self.graph.query(question)?;
        let cypher = outcome.cypher.clone().unwrap_or_default();
        tracing::debug!(cypher = %cypher, records = outcome.records.len(), "graph query returned");

        let artifact = match self.renderer.render(&outcome.records) {
            Ok(a) => {
                tracing::debug!(path = %a.path.display(), "graph artifact written");
                Some(a)
            }
            Err(e) => {
                tracing::warn!(error = %e, "graph rendering failed; answering without a graph");
                None
            }
        };

        let graph_data = serde_json::to_string(&outcome.records)?;
        let prompt = fill(
            GRAPH_RESPONSE_PROMPT,
            &[
                ("question", question),
                ("cypher", cypher.as_str()),
                ("graph_data", graph_data.as_str()),
            ],
        );
        let answer = self.answerer.complete(&prompt)?;
        Ok((answer, artifact, outcome.cypher))
    }

    fn answer_generally(
        &self,
        question: &str,
        history: &str,
    ) -> Result<(String, Option<ArtifactRef>, Option<String>), TurnError> {
        let prompt = fill(
            GENERAL_QA_PROMPT,
            &[("question", question), ("history", history)],
        );
        Ok((self.planner.complete(&prompt)?, None, None))
    }
}
