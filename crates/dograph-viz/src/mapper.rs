//! Record → node/edge mapping, one variant per [`RecordLayout`].
//!
//! Every variant consumes the whole result set and only ever adds to the
//! accumulator. Records that do not match the sampled shape are skipped;
//! nothing here returns an error.

use serde_json::{Map, Value};

use crate::detect::{detect_layout, RecordLayout};
use crate::model::{attribute_label, entity_identity, value_text, GraphBuilder, NodeRole, VizGraph};

impl RecordLayout {
    pub fn ingest(self, records: &[Value], graph: &mut GraphBuilder) {
        match self {
            Self::EntityBag => ingest_entity_bag(records, graph),
            Self::SimplePair => ingest_simple_pair(records, graph),
            Self::EntityWithKey => ingest_entity_with_key(records, graph),
            Self::Triple => ingest_triple(records, graph),
        }
    }
}

/// Detect the layout of `records` and map them into a fresh graph.
pub fn map_records(records: &[Value]) -> (RecordLayout, VizGraph) {
    let layout = detect_layout(records);
    let mut graph = GraphBuilder::new();
    layout.ingest(records, &mut graph);
    (layout, graph.finish())
}

fn sample_fields(records: &[Value]) -> Option<Vec<String>> {
    match records.first() {
        Some(Value::Object(sample)) => Some(sample.keys().cloned().collect()),
        _ => None,
    }
}

fn add_entity_node(entity: &Map<String, Value>, graph: &mut GraphBuilder) -> String {
    let id = entity_identity(entity);
    graph.add_node(&id, Some(attribute_label(entity)), NodeRole::Source);
    id
}

fn ingest_entity_bag(records: &[Value], graph: &mut GraphBuilder) {
    for record in records {
        let Value::Object(fields) = record else {
            continue;
        };
        for value in fields.values() {
            if let Value::Object(entity) = value {
                add_entity_node(entity, graph);
            }
        }
    }
}

fn ingest_simple_pair(records: &[Value], graph: &mut GraphBuilder) {
    let Some(fields) = sample_fields(records) else {
        return;
    };
    let [source_field, target_field, ..] = fields.as_slice() else {
        return;
    };

    for record in records {
        let Value::Object(row) = record else {
            continue;
        };
        let source = value_text(row.get(source_field));
        let target = value_text(row.get(target_field));
        if source.is_empty() || target.is_empty() {
            continue;
        }
        graph.add_node(&source, None, NodeRole::Source);
        graph.add_node(&target, None, NodeRole::Target);
        graph.add_edge(&source, &target, None);
    }
}

fn ingest_entity_with_key(records: &[Value], graph: &mut GraphBuilder) {
    let Some(Value::Object(sample)) = records.first() else {
        return;
    };
    let Some(entity_field) = sample
        .iter()
        .find(|(_, v)| v.is_object())
        .map(|(k, _)| k.clone())
    else {
        return;
    };

    let empty = Map::new();
    for record in records {
        let Value::Object(row) = record else {
            continue;
        };
        let entity = row
            .get(&entity_field)
            .and_then(Value::as_object)
            .unwrap_or(&empty);
        let primary = add_entity_node(entity, graph);

        let mut others = row.keys().filter(|k| **k != entity_field);
        let Some(key_field) = others.next() else {
            continue;
        };
        let secondary = value_text(row.get(key_field));
        if secondary.is_empty() {
            continue;
        }
        graph.add_node(&secondary, None, NodeRole::Related);

        let label = others.next().map(|f| value_text(row.get(f)));
        graph.add_edge(&primary, &secondary, label);
    }
}

fn ingest_triple(records: &[Value], graph: &mut GraphBuilder) {
    let Some(fields) = sample_fields(records) else {
        return;
    };
    let [source_field, target_field, label_field, ..] = fields.as_slice() else {
        return;
    };

    for record in records {
        let Value::Object(row) = record else {
            continue;
        };
        let source = value_text(row.get(source_field));
        let target = value_text(row.get(target_field));
        let label = value_text(row.get(label_field));
        if source.is_empty() || target.is_empty() {
            continue;
        }
        graph.add_node(&source, None, NodeRole::Source);
        graph.add_node(&target, None, NodeRole::Source);
        graph.add_edge(&source, &target, Some(label));
    }
}
