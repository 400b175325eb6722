//! Graph → standalone HTML artifact.
//!
//! The document is rendered from `templates/graph.html`. Graph data and layout
//! options are inlined as JSON and the force-directed simulation ships inside
//! the page, so an artifact opens offline with no external assets.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::mapper::map_records;
use crate::model::VizGraph;
use crate::{Result, VizError};

pub const ARTIFACT_PREFIX: &str = "graph_";
pub const ARTIFACT_EXTENSION: &str = "html";
pub const DEFAULT_URL_PREFIX: &str = "/static";

/// `forceAtlas2Based` solver parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhysicsOptions {
    pub enabled: bool,
    pub gravitational_constant: f64,
    pub central_gravity: f64,
    pub spring_length: f64,
    pub spring_constant: f64,
    pub damping: f64,
    /// The simulation stops once every node moves slower than this.
    pub min_velocity: f64,
    pub max_velocity: f64,
    pub timestep: f64,
    pub stabilization_iterations: u32,
}

impl Default for PhysicsOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            gravitational_constant: -50.0,
            central_gravity: 0.01,
            spring_length: 100.0,
            spring_constant: 0.08,
            damping: 0.4,
            min_velocity: 0.75,
            max_velocity: 50.0,
            timestep: 0.5,
            stabilization_iterations: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderOptions {
    pub title: String,
    pub height: String,
    pub width: String,
    pub directed: bool,
    pub font_size: u32,
    pub physics: PhysicsOptions,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            title: "Knowledge graph".to_string(),
            height: "750px".to_string(),
            width: "100%".to_string(),
            directed: true,
            font_size: 14,
            physics: PhysicsOptions::default(),
        }
    }
}

impl RenderOptions {
    /// Layout options in the shape the page script reads.
    pub fn to_options_json(&self) -> Value {
        let p = &self.physics;
        json!({
            "physics": {
                "enabled": p.enabled,
                "solver": "forceAtlas2Based",
                "forceAtlas2Based": {
                    "gravitationalConstant": p.gravitational_constant,
                    "centralGravity": p.central_gravity,
                    "springLength": p.spring_length,
                    "springConstant": p.spring_constant,
                    "damping": p.damping,
                },
                "minVelocity": p.min_velocity,
                "maxVelocity": p.max_velocity,
                "timestep": p.timestep,
                "stabilizationIterations": p.stabilization_iterations,
            },
            "nodes": { "font": { "size": self.font_size } },
            "edges": { "arrows": self.directed },
        })
    }
}

/// Reference to a written artifact: where it lives and how the UI fetches it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub path: PathBuf,
    pub url: String,
}

impl ArtifactRef {
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }
}

pub fn render_json(g: &VizGraph) -> Result<String> {
    Ok(serde_json::to_string_pretty(g)?)
}

pub fn render_html(g: &VizGraph, options: &RenderOptions) -> Result<String> {
    // `</` is escaped so record text can never close the data <script> tag.
    let graph_json = serde_json::to_string(g)?.replace("</", "<\\/");
    let options_json = serde_json::to_string(&options.to_options_json())?.replace("</", "<\\/");

    let template = include_str!("../templates/graph.html");
    let nodes_count = g.nodes.len().to_string();
    let edges_count = g.edges.len().to_string();
    Ok(fill_template(
        template,
        &[
            ("TITLE", &escape_html(&options.title)),
            ("WIDTH", &escape_html(&options.width)),
            ("HEIGHT", &escape_html(&options.height)),
            ("NODES_COUNT", &nodes_count),
            ("EDGES_COUNT", &edges_count),
            ("OPTIONS_JSON", &options_json),
            ("GRAPH_JSON", &graph_json),
        ],
    ))
}

/// Single pass over `template`: substituted text is never scanned again, so a
/// title or record value containing `{{...}}` stays literal.
fn fill_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let value = after.find("}}").and_then(|end| {
            let key = &after[..end];
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v, end))
        });
        match value {
            Some((v, end)) => {
                out.push_str(v);
                rest = &after[end + 2..];
            }
            None => {
                out.push_str("{{");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// `graph_<32 hex chars>.html`; random per call so concurrent renders never collide.
pub fn artifact_file_name() -> String {
    format!(
        "{ARTIFACT_PREFIX}{}.{ARTIFACT_EXTENSION}",
        Uuid::new_v4().simple()
    )
}

pub fn is_artifact_file_name(name: &str) -> bool {
    name.strip_prefix(ARTIFACT_PREFIX)
        .and_then(|rest| rest.strip_suffix(ARTIFACT_EXTENSION))
        .and_then(|stem| stem.strip_suffix('.'))
        .is_some_and(|token| !token.is_empty() && !token.contains(['/', '\\']))
}

/// Writes result sets as artifacts under one output directory.
#[derive(Debug, Clone)]
pub struct GraphRenderer {
    output_dir: PathBuf,
    url_prefix: String,
    options: RenderOptions,
}

impl GraphRenderer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            url_prefix: DEFAULT_URL_PREFIX.to_string(),
            options: RenderOptions::default(),
        }
    }

    pub fn with_url_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.url_prefix = prefix.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_options(mut self, options: RenderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    pub fn render(&self, records: &[Value]) -> Result<ArtifactRef> {
        let (layout, graph) = map_records(records);
        tracing::debug!(
            layout = %layout,
            records = records.len(),
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            "mapped result set"
        );
        self.write_graph(&graph)
    }

    pub fn write_graph(&self, graph: &VizGraph) -> Result<ArtifactRef> {
        let html = render_html(graph, &self.options)?;

        fs::create_dir_all(&self.output_dir).map_err(|source| VizError::Io {
            path: self.output_dir.clone(),
            source,
        })?;
        let file_name = artifact_file_name();
        let path = self.output_dir.join(&file_name);
        fs::write(&path, html).map_err(|source| VizError::Io {
            path: path.clone(),
            source,
        })?;

        Ok(ArtifactRef {
            url: format!("{}/{file_name}", self.url_prefix),
            path,
        })
    }
}
