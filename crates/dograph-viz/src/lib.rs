//! dograph-viz: knowledge-graph query results → interactive node-link artifacts.
//!
//! ```text
//!  result set ──► detect_layout ──► RecordLayout::ingest ──► render_html ──► graph_<hex>.html
//!  (records)      (tag A/B/C/D)     (GraphBuilder)           (template)      (ArtifactRef)
//! ```
//!
//! Records come from an upstream query engine and have no static schema: each
//! is a JSON object whose values are scalars or nested entities carrying a
//! `name`. The detector classifies the first record, the matching mapper
//! variant turns the whole set into nodes and labeled edges, and the renderer
//! writes a self-contained HTML document. [`sweep`] removes old artifacts.

pub mod detect;
pub mod mapper;
pub mod model;
pub mod render;
pub mod sweep;

use std::path::PathBuf;

pub use detect::{detect_layout, RecordLayout};
pub use mapper::map_records;
pub use model::{GraphBuilder, NodeRole, NodeShape, VizEdge, VizGraph, VizNode};
pub use render::{render_html, render_json, ArtifactRef, GraphRenderer, PhysicsOptions, RenderOptions};
pub use sweep::{sweep, sweep_at, SweepReport, DEFAULT_RETENTION};

#[derive(Debug, thiserror::Error)]
pub enum VizError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize graph: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, VizError>;
