//! Bundle Emitter
//!
//! Serializes a finalized graph into bounded bundles and dispatches them.
//!
//! Order inside a cycle is stable:
//! marking → identity → observables → network traffic → artifacts → malware →
//! indicators → relationships. Referenced objects therefore always precede their
//! referrers.

pub mod bundle;

use std::time::Duration;

use serde_json::Value;

use crate::logic::graph::Graph;
use crate::logic::objects::{object_to_stix, relationship_to_stix, CandidateObject};
use crate::logic::platform::{PlatformClient, SubmitError};

pub use bundle::{BatchAck, BatchResult, Bundle, EmitReport, Rejection};

pub struct BundleEmitter {
    max_objects: usize,
    call_timeout: Duration,
}

impl BundleEmitter {
    pub fn new(max_objects: usize, call_timeout: Duration) -> Self {
        Self {
            max_objects: max_objects.max(1),
            call_timeout,
        }
    }

    pub fn max_objects(&self) -> usize {
        self.max_objects
    }

    /// Serialize the graph in emission order and chunk it
    pub fn plan(&self, graph: &Graph) -> Vec<Bundle> {
        let mut objects: Vec<&CandidateObject> = graph.objects.values().collect();
        // Stable sort: ids stay ascending within a rank
        objects.sort_by_key(|o| o.kind.emit_rank());

        let serialized: Vec<Value> = objects
            .into_iter()
            .map(object_to_stix)
            .chain(graph.relationships.iter().map(relationship_to_stix))
            .collect();

        serialized
            .chunks(self.max_objects)
            .map(|chunk| Bundle::new(chunk.to_vec()))
            .collect()
    }

    /// Dispatch all bundles.
    ///
    /// A transient failure stops emission and is returned. A durable failure
    /// is recorded on its batch and emission continues.
    pub async fn emit(
        &self,
        graph: &Graph,
        platform: &dyn PlatformClient,
        work_id: Option<&str>,
    ) -> Result<EmitReport, SubmitError> {
        let bundles = self.plan(graph);
        let total = bundles.len();
        let mut report = EmitReport::default();

        for (index, bundle) in bundles.into_iter().enumerate() {
            let submitted = bundle.len();
            let outcome = tokio::time::timeout(self.call_timeout, platform.submit(&bundle, work_id))
                .await
                .unwrap_or(Err(SubmitError::Timeout));

            let result = match outcome {
                Ok(ack) => {
                    for rejection in &ack.rejected {
                        tracing::warn!("Platform rejected {}: {}", rejection.id, rejection.reason);
                    }
                    BatchResult {
                        index,
                        bundle_id: bundle.id,
                        submitted,
                        accepted: ack.accepted,
                        rejected: ack.rejected,
                        error: None,
                    }
                }
                Err(e) if e.is_transient() => {
                    tracing::warn!("Batch {}/{} hit transient error: {}", index + 1, total, e);
                    return Err(e);
                }
                Err(e) => {
                    tracing::error!("Batch {}/{} failed: {}", index + 1, total, e);
                    BatchResult {
                        index,
                        bundle_id: bundle.id,
                        submitted,
                        accepted: 0,
                        rejected: Vec::new(),
                        error: Some(e.to_string()),
                    }
                }
            };

            tracing::debug!(
                "Batch {}/{}: {} submitted, {} accepted",
                index + 1,
                total,
                result.submitted,
                result.accepted
            );
            report.batches.push(result);
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::graph::GraphBuilder;
    use crate::logic::normalizer::{Normalizer, RawRecord, SourceConfig};
    use crate::logic::objects::SourceRef;
    use crate::logic::platform::StateError;
    use crate::logic::scheduler::Cursor;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    fn graph() -> Graph {
        let normalizer = Normalizer::new(SourceConfig::default()).unwrap();
        let mut builder = GraphBuilder::new(normalizer.anchors());
        let records = [
            json!({"indicator_type": "domain", "indicator_data": "evil.com", "malware_family": "qakbot", "confidence": 90}),
            json!({"value": "1.2.3.4", "categories": {"spam": 40}}),
        ];
        for (i, body) in records.into_iter().enumerate() {
            builder.ingest(&normalizer, &RawRecord::new(SourceRef::new("t", i), body));
        }
        builder.finalize()
    }

    /// Records bundles; fails batches whose index is in `fail_on`
    struct RecordingPlatform {
        bundles: Mutex<Vec<Bundle>>,
        fail_on: Vec<(usize, SubmitError)>,
    }

    impl RecordingPlatform {
        fn new(fail_on: Vec<(usize, SubmitError)>) -> Self {
            Self { bundles: Mutex::new(Vec::new()), fail_on }
        }
    }

    #[async_trait]
    impl PlatformClient for RecordingPlatform {
        async fn submit(&self, bundle: &Bundle, _work_id: Option<&str>) -> Result<BatchAck, SubmitError> {
            let index = {
                let mut bundles = self.bundles.lock();
                bundles.push(bundle.clone());
                bundles.len() - 1
            };
            if let Some((_, err)) = self.fail_on.iter().find(|(i, _)| *i == index) {
                return Err(err.clone());
            }
            Ok(BatchAck { accepted: bundle.len(), rejected: Vec::new() })
        }

        async fn read_cursor(&self) -> Result<Option<Cursor>, StateError> {
            Ok(None)
        }

        async fn write_cursor(&self, _cursor: &Cursor) -> Result<(), StateError> {
            Ok(())
        }
    }

    fn rank_of(object: &Value) -> u8 {
        match object["type"].as_str().unwrap() {
            "marking-definition" => 0,
            "identity" => 1,
            "network-traffic" => 3,
            "artifact" => 4,
            "malware" => 5,
            "indicator" => 6,
            "relationship" => 7,
            _ => 2,
        }
    }

    #[test]
    fn test_plan_order_and_bounds() {
        let graph = graph();
        let emitter = BundleEmitter::new(3, Duration::from_secs(1));
        let bundles = emitter.plan(&graph);

        assert!(bundles.iter().all(|b| b.len() <= 3));
        let all: Vec<&Value> = bundles.iter().flat_map(|b| b.objects.iter()).collect();
        assert_eq!(all.len(), graph.len());
        assert!(all.windows(2).all(|w| rank_of(w[0]) <= rank_of(w[1])));
        assert_eq!(all[0]["type"], "marking-definition");
        assert_eq!(all[1]["type"], "identity");
    }

    #[test]
    fn test_plan_is_stable() {
        let graph = graph();
        let emitter = BundleEmitter::new(100, Duration::from_secs(1));
        let ids = |bundles: Vec<Bundle>| -> Vec<String> {
            bundles
                .iter()
                .flat_map(|b| b.object_ids().into_iter().map(String::from).collect::<Vec<_>>())
                .collect()
        };
        assert_eq!(ids(emitter.plan(&graph)), ids(emitter.plan(&graph)));
    }

    #[test]
    fn test_bundle_wire_form() {
        let bundle = Bundle::new(vec![json!({"id": "x"})]);
        let wire: Value = serde_json::from_str(&bundle.to_json()).unwrap();
        assert_eq!(wire["type"], "bundle");
        assert!(wire["id"].as_str().unwrap().starts_with("bundle--"));
        assert_eq!(wire["objects"], json!([{"id": "x"}]));
    }

    #[tokio::test]
    async fn test_emit_all_batches() {
        let graph = graph();
        let platform = RecordingPlatform::new(Vec::new());
        let emitter = BundleEmitter::new(4, Duration::from_secs(1));

        let report = emitter.emit(&graph, &platform, None).await.unwrap();
        assert!(report.fully_dispatched());
        assert_eq!(report.accepted(), graph.len());
        assert_eq!(report.batches.len(), platform.bundles.lock().len());
    }

    #[tokio::test]
    async fn test_durable_failure_continues() {
        let graph = graph();
        let platform = RecordingPlatform::new(vec![(0, SubmitError::Unauthorized)]);
        let emitter = BundleEmitter::new(4, Duration::from_secs(1));

        let report = emitter.emit(&graph, &platform, None).await.unwrap();
        assert!(!report.fully_dispatched());
        assert_eq!(report.failed_batches(), 1);
        assert!(report.batches.len() > 1);
    }

    #[tokio::test]
    async fn test_transient_failure_stops() {
        let graph = graph();
        let platform = RecordingPlatform::new(vec![(1, SubmitError::ServerError(503))]);
        let emitter = BundleEmitter::new(4, Duration::from_secs(1));

        let err = emitter.emit(&graph, &platform, None).await.unwrap_err();
        assert_eq!(err, SubmitError::ServerError(503));
        assert_eq!(platform.bundles.lock().len(), 2);
    }
}
