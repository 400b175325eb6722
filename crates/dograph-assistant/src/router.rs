//! Graph vs. general routing.

use serde::{Deserialize, Serialize};

use crate::prompts::{fill, ROUTER_PROMPT};
use crate::reasoning::ReasoningEngine;

/// Users add this phrase to force the general-reasoning path.
pub const GENERAL_QUESTION_MARKER: &str = "This is a general question";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Route {
    Graph,
    General,
}

impl Route {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Graph => "graph",
            Self::General => "general",
        }
    }

    /// Interpret a classifier reply. Only an exact `graph`/`general` (after
    /// trimming, lowercasing and dropping punctuation) is accepted.
    pub fn parse_reply(reply: &str) -> Option<Self> {
        let cleaned: String = reply
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| !c.is_ascii_punctuation())
            .collect();
        match cleaned.trim() {
            "graph" => Some(Self::Graph),
            "general" => Some(Self::General),
            _ => None,
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn has_general_marker(question: &str) -> bool {
    question
        .to_lowercase()
        .contains(&GENERAL_QUESTION_MARKER.to_lowercase())
}

/// Decide which path answers `question`.
///
/// The marker wins without consulting the model. Otherwise the classifier is
/// asked once; an error or an unrecognized reply falls back to [`Route::Graph`].
pub fn classify_route(engine: &dyn ReasoningEngine, question: &str) -> Route {
    if has_general_marker(question) {
        tracing::debug!("general-question marker present");
        return Route::General;
    }
    let prompt = fill(ROUTER_PROMPT, &[("question", question)]);
    match engine.complete(&prompt) {
        Ok(reply) => match Route::parse_reply(&reply) {
            Some(route) => route,
            None => {
                tracing::warn!(reply = %reply, "unrecognized routing reply; using graph");
                Route::Graph
            }
        },
        Err(e) => {
            tracing::warn!(error = %e, "routing failed; using graph");
            Route::Graph
        }
    }
}
