// ABOUTME: Pipeline engine - routes a change event through every matching pipeline
// ABOUTME: Produces index (insert) or upsert (update) write operations keyed by row id

use std::collections::HashMap;
use tracing::trace;

use super::config::PipelineConfig;
use super::transforms::{StageArgs, TransformError, TransformFn, TransformRegistry};
use super::value::{document, flatten, FieldValue, Row};
use crate::destination::{WriteKind, WriteOp};
use crate::event::{Action, ChangeEvent};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("pipeline '{routing_key}' references unknown transform '{function}'")]
    UnknownTransform {
        routing_key: String,
        function: String,
    },
    #[error("transform '{function}' failed in pipeline '{routing_key}'")]
    Transform {
        routing_key: String,
        function: String,
        #[source]
        source: TransformError,
    },
    #[error("pipeline '{routing_key}' produced a row for index '{index}' without an 'id' field")]
    MissingId { routing_key: String, index: String },
}

struct ResolvedStage {
    function: String,
    transform: TransformFn,
    args: StageArgs,
}

struct ResolvedPipeline {
    index: String,
    stages: Vec<ResolvedStage>,
}

/// Resolved pipelines grouped by routing key, in configuration order.
pub struct PipelineEngine {
    routes: HashMap<String, Vec<ResolvedPipeline>>,
}

impl PipelineEngine {
    /// Resolve every stage against `registry`. Fails on the first unknown
    /// transform name so misconfiguration surfaces before any event is read.
    pub fn new(
        configs: Vec<PipelineConfig>,
        registry: &TransformRegistry,
    ) -> Result<Self, PipelineError> {
        let mut routes: HashMap<String, Vec<ResolvedPipeline>> = HashMap::new();

        for config in configs {
            let mut stages = Vec::with_capacity(config.stages.len());
            for stage in config.stages {
                let transform = registry.get(&stage.function).ok_or_else(|| {
                    PipelineError::UnknownTransform {
                        routing_key: config.routing_key.clone(),
                        function: stage.function.clone(),
                    }
                })?;
                stages.push(ResolvedStage {
                    function: stage.function,
                    transform,
                    args: stage.args,
                });
            }

            routes
                .entry(config.routing_key)
                .or_default()
                .push(ResolvedPipeline {
                    index: config.destination_index,
                    stages,
                });
        }

        Ok(Self { routes })
    }

    /// Run `event` through every pipeline registered for its routing key.
    ///
    /// A stage returning no rows for some input ends that pipeline for this
    /// event; other pipelines still run. A transform error aborts the whole
    /// event.
    pub fn apply(&self, event: &ChangeEvent) -> Result<Vec<WriteOp>, PipelineError> {
        let key = event.routing_key();
        let Some(pipelines) = self.routes.get(&key) else {
            return Ok(Vec::new());
        };

        let initial = flatten(event);
        let mut ops = Vec::new();

        'pipelines: for pipeline in pipelines {
            let mut rows = vec![initial.clone()];

            for stage in &pipeline.stages {
                let mut next = Vec::with_capacity(rows.len());
                for row in &rows {
                    let produced = (stage.transform)(row, &stage.args).map_err(|source| {
                        PipelineError::Transform {
                            routing_key: key.clone(),
                            function: stage.function.clone(),
                            source,
                        }
                    })?;
                    if produced.is_empty() {
                        trace!(
                            "Stage '{}' dropped event for {} (index {})",
                            stage.function,
                            key,
                            pipeline.index
                        );
                        continue 'pipelines;
                    }
                    next.extend(produced);
                }
                rows = next;
            }

            for row in rows {
                let id = document_id(&row).ok_or_else(|| PipelineError::MissingId {
                    routing_key: key.clone(),
                    index: pipeline.index.clone(),
                })?;
                ops.push(WriteOp {
                    kind: match event.action {
                        Action::Insert => WriteKind::Index,
                        Action::Update => WriteKind::Upsert,
                    },
                    index: pipeline.index.clone(),
                    id,
                    doc: document(&row, event),
                });
            }
        }

        Ok(ops)
    }

    pub fn has_route(&self, routing_key: &str) -> bool {
        self.routes.contains_key(routing_key)
    }

    /// Routing keys with at least one pipeline, sorted
    pub fn routing_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.routes.keys().map(|s| s.as_str()).collect();
        keys.sort_unstable();
        keys
    }
}

fn document_id(row: &Row) -> Option<String> {
    match row.get("id")? {
        FieldValue::Null => None,
        FieldValue::String(s) if s.is_empty() => None,
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::config::PipelineFile;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn event(action: Action, body: &[(&str, &str)]) -> ChangeEvent {
        ChangeEvent {
            schema: "shop".to_string(),
            table: "items".to_string(),
            action,
            body: body
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn engine(json: &str, registry: &TransformRegistry) -> PipelineEngine {
        let file = PipelineFile::parse(json).unwrap();
        PipelineEngine::new(file.configs, registry).unwrap()
    }

    #[test]
    fn test_insert_produces_index_operation() {
        let engine = engine(
            r#"[{"schema":"shop","tables":["items"],"actions":["insert"],"stages":[{"pass":{}}],"destination":{"index":"items"}}]"#,
            &TransformRegistry::with_builtins(),
        );

        let ops = engine
            .apply(&event(Action::Insert, &[("id", "7"), ("name", "a")]))
            .unwrap();

        let expected_doc: Row = BTreeMap::from([
            ("id".to_string(), FieldValue::from("7")),
            ("name".to_string(), FieldValue::from("a")),
        ]);
        assert_eq!(
            ops,
            vec![WriteOp {
                kind: WriteKind::Index,
                index: "items".to_string(),
                id: "7".to_string(),
                doc: expected_doc,
            }]
        );
    }

    #[test]
    fn test_column_named_action_reaches_document() {
        let engine = engine(
            r#"[{"schema":"shop","tables":["items"],"actions":["insert"],"stages":[{"pass":{}}],"destination":{"index":"items"}}]"#,
            &TransformRegistry::with_builtins(),
        );

        let ops = engine
            .apply(&event(Action::Insert, &[("id", "7"), ("_action", "refund")]))
            .unwrap();

        assert_eq!(ops.len(), 1);
        assert_eq!(
            ops[0].doc,
            BTreeMap::from([
                ("_action".to_string(), FieldValue::from("refund")),
                ("id".to_string(), FieldValue::from("7")),
            ])
        );
    }

    #[test]
    fn test_update_produces_upsert_operation() {
        let engine = engine(
            r#"[{"schema":"shop","tables":["items"],"actions":["update"],"stages":[],"destination":{"index":"items"}}]"#,
            &TransformRegistry::with_builtins(),
        );

        let ops = engine
            .apply(&event(Action::Update, &[("id", "7")]))
            .unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].kind, WriteKind::Upsert);
    }

    #[test]
    fn test_unrouted_event_produces_nothing() {
        let engine = engine(
            r#"[{"schema":"shop","tables":["items"],"actions":["insert"],"stages":[],"destination":{"index":"items"}}]"#,
            &TransformRegistry::with_builtins(),
        );
        assert!(engine
            .apply(&event(Action::Update, &[("id", "7")]))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_all_matching_pipelines_run() {
        let engine = engine(
            r#"[
                {"schema":"shop","tables":["items"],"actions":["insert"],"stages":[],"destination":{"index":"a"}},
                {"schema":"shop","tables":["items"],"actions":["insert"],"stages":[],"destination":{"index":"b"}}
            ]"#,
            &TransformRegistry::with_builtins(),
        );

        let ops = engine
            .apply(&event(Action::Insert, &[("id", "1")]))
            .unwrap();
        let indexes: Vec<&str> = ops.iter().map(|op| op.index.as_str()).collect();
        assert_eq!(indexes, vec!["a", "b"]);
    }

    #[test]
    fn test_empty_stage_result_short_circuits_only_that_pipeline() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut registry = TransformRegistry::with_builtins();
        registry.register("count", move |row: &Row, _: &StageArgs| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(vec![row.clone()])
        });

        let engine = engine(
            r#"[
                {"schema":"shop","tables":["items"],"actions":["insert"],
                 "stages":[{"filter":{"field":"status","equals":"1"}},{"count":{}}],
                 "destination":{"index":"active"}},
                {"schema":"shop","tables":["items"],"actions":["insert"],
                 "stages":[{"pass":{}}],
                 "destination":{"index":"all"}}
            ]"#,
            &registry,
        );

        let ops = engine
            .apply(&event(Action::Insert, &[("id", "1"), ("status", "0")]))
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].index, "all");
    }

    #[test]
    fn test_fan_out_produces_one_operation_per_row() {
        let engine = engine(
            r#"[{"schema":"shop","tables":["items"],"actions":["insert"],
                 "stages":[{"split":{"field":"id"}}],
                 "destination":{"index":"items"}}]"#,
            &TransformRegistry::with_builtins(),
        );

        let ops = engine
            .apply(&event(Action::Insert, &[("id", "1,2,3")]))
            .unwrap();
        let ids: Vec<&str> = ops.iter().map(|op| op.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_unknown_transform_rejected_at_construction() {
        let file = PipelineFile::parse(
            r#"[{"schema":"shop","tables":["items"],"actions":["insert"],"stages":[{"nope":{}}],"destination":{"index":"items"}}]"#,
        )
        .unwrap();
        let result = PipelineEngine::new(file.configs, &TransformRegistry::with_builtins());
        assert!(matches!(
            result,
            Err(PipelineError::UnknownTransform { ref function, .. }) if function == "nope"
        ));
    }

    #[test]
    fn test_transform_error_is_propagated() {
        let engine = engine(
            r#"[{"schema":"shop","tables":["items"],"actions":["insert"],
                 "stages":[{"rename":{}}],
                 "destination":{"index":"items"}}]"#,
            &TransformRegistry::with_builtins(),
        );
        let err = engine
            .apply(&event(Action::Insert, &[("id", "1")]))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Transform { ref function, .. } if function == "rename"));
    }

    #[test]
    fn test_missing_id_is_an_error() {
        let engine = engine(
            r#"[{"schema":"shop","tables":["items"],"actions":["insert"],"stages":[],"destination":{"index":"items"}}]"#,
            &TransformRegistry::with_builtins(),
        );
        let err = engine
            .apply(&event(Action::Insert, &[("name", "a")]))
            .unwrap_err();
        assert!(matches!(err, PipelineError::MissingId { .. }));
    }

    #[test]
    fn test_numeric_id_is_rendered() {
        let mut row = Row::new();
        row.insert("id".to_string(), FieldValue::Int(42));
        assert_eq!(document_id(&row), Some("42".to_string()));
        row.insert("id".to_string(), FieldValue::Null);
        assert_eq!(document_id(&row), None);
    }

    #[test]
    fn test_routing_keys() {
        let engine = engine(
            r#"[{"schema":"shop","tables":["items","orders"],"actions":["insert"],"stages":[],"destination":{"index":"x"}}]"#,
            &TransformRegistry::with_builtins(),
        );
        assert_eq!(
            engine.routing_keys(),
            vec!["shop_items_insert", "shop_orders_insert"]
        );
        assert!(engine.has_route("shop_orders_insert"));
    }
}
