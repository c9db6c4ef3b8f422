// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tool execution coordination
//!
//! Runs invocation batches against the external capability. Each batch is a
//! spawned task tracked by a generated batch id, so a conversation-level
//! cancel aborts that batch's in-flight work without touching batches owned
//! by other conversations. A failing tool becomes a `success = false` result
//! fed back to the model; it never aborts the turn.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::task::AbortHandle;
use uuid::Uuid;

use crate::cancel::CancelSignal;
use crate::error::{ColloquyError, Result};
use crate::tools::{ToolCapability, ToolDescriptor, ToolInvocation, ToolResult};

/// Executes invocation batches as independently cancellable tasks.
#[derive(Clone)]
pub struct ToolExecutionCoordinator {
    capability: Arc<dyn ToolCapability>,
    in_flight: Arc<Mutex<HashMap<Uuid, AbortHandle>>>,
}

impl ToolExecutionCoordinator {
    pub fn new(capability: Arc<dyn ToolCapability>) -> Self {
        Self {
            capability,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Descriptors of the tools behind this coordinator
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.capability.descriptors()
    }

    /// Number of batches currently executing
    pub fn in_flight_batches(&self) -> usize {
        self.in_flight.lock().unwrap().len()
    }

    /// Abort every in-flight batch
    pub fn cancel_all(&self) {
        let handles = self.in_flight.lock().unwrap();
        for handle in handles.values() {
            handle.abort();
        }
    }

    /// Execute a batch of invocations, aggregating all results in order.
    ///
    /// An empty batch returns immediately without touching the capability.
    /// Cancellation through `cancel` aborts the batch task and returns
    /// `ColloquyError::Cancelled`.
    pub async fn execute_batch(
        &self,
        invocations: Vec<ToolInvocation>,
        cancel: &CancelSignal,
    ) -> Result<Vec<ToolResult>> {
        if invocations.is_empty() {
            return Ok(Vec::new());
        }

        let batch_id = Uuid::new_v4();
        let batch_size = invocations.len();
        tracing::debug!(
            target: "colloquy.tools.coordinator",
            %batch_id,
            batch_size,
            "starting tool execution batch"
        );

        let capability = self.capability.clone();
        let mut task = tokio::spawn(async move {
            let mut results = Vec::with_capacity(invocations.len());
            for invocation in &invocations {
                let result = match capability.execute(invocation).await {
                    Ok(result) => result,
                    Err(error) => {
                        tracing::warn!(
                            target: "colloquy.tools.coordinator",
                            tool_name = %invocation.name,
                            error = %error,
                            "tool execution failed; converting to error result"
                        );
                        ToolResult::error(invocation.name.clone(), error.to_string())
                    }
                };
                results.push(result);
            }
            results
        });

        self.in_flight
            .lock()
            .unwrap()
            .insert(batch_id, task.abort_handle());

        let outcome = tokio::select! {
            joined = &mut task => match joined {
                Ok(results) => Ok(results),
                Err(join_error) if join_error.is_cancelled() => Err(ColloquyError::Cancelled),
                Err(join_error) => Err(ColloquyError::Internal(format!(
                    "tool batch task failed: {}",
                    join_error
                ))),
            },
            _ = cancel.cancelled() => {
                task.abort();
                Err(ColloquyError::Cancelled)
            }
        };

        self.in_flight.lock().unwrap().remove(&batch_id);

        match &outcome {
            Ok(results) => tracing::debug!(
                target: "colloquy.tools.coordinator",
                %batch_id,
                result_count = results.len(),
                "tool execution batch complete"
            ),
            Err(error) => tracing::debug!(
                target: "colloquy.tools.coordinator",
                %batch_id,
                error = %error,
                "tool execution batch ended early"
            ),
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Behavior keyed on tool name: "boom" fails, "slow" never finishes in
    /// test time, anything else echoes.
    struct ScriptedCapability {
        calls: AtomicUsize,
    }

    impl ScriptedCapability {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ToolCapability for ScriptedCapability {
        fn descriptors(&self) -> Vec<ToolDescriptor> {
            vec![ToolDescriptor {
                name: "echo".to_string(),
                description: "echoes".to_string(),
                parameters: vec![],
            }]
        }

        async fn execute(&self, invocation: &ToolInvocation) -> Result<ToolResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match invocation.name.as_str() {
                "boom" => Err(ColloquyError::ToolExecution("scripted failure".to_string())),
                "slow" => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(ToolResult::success("slow", "finally"))
                }
                name => Ok(ToolResult::success(name, format!("ran {}", name))),
            }
        }
    }

    fn invocation(name: &str) -> ToolInvocation {
        ToolInvocation::new(name, vec![])
    }

    #[tokio::test]
    async fn test_batch_aggregates_results_in_order() {
        let coordinator = ToolExecutionCoordinator::new(Arc::new(ScriptedCapability::new()));
        let cancel = CancelSignal::new();

        let results = coordinator
            .execute_batch(vec![invocation("alpha"), invocation("beta")], &cancel)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].tool_name, "alpha");
        assert_eq!(results[0].payload, "ran alpha");
        assert_eq!(results[1].tool_name, "beta");
        assert_eq!(coordinator.in_flight_batches(), 0);
    }

    #[tokio::test]
    async fn test_failing_tool_becomes_error_result() {
        let coordinator = ToolExecutionCoordinator::new(Arc::new(ScriptedCapability::new()));
        let cancel = CancelSignal::new();

        let results = coordinator
            .execute_batch(vec![invocation("boom"), invocation("after")], &cancel)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert!(results[0].is_error());
        assert!(results[0].payload.contains("scripted failure"));
        // The batch keeps going after a failure
        assert!(!results[1].is_error());
    }

    #[tokio::test]
    async fn test_empty_batch_skips_capability() {
        let capability = Arc::new(ScriptedCapability::new());
        let coordinator = ToolExecutionCoordinator::new(capability.clone());
        let cancel = CancelSignal::new();

        let results = coordinator.execute_batch(vec![], &cancel).await.unwrap();
        assert!(results.is_empty());
        assert_eq!(capability.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_aborts_in_flight_batch() {
        let coordinator = ToolExecutionCoordinator::new(Arc::new(ScriptedCapability::new()));
        let cancel = CancelSignal::new();

        let batch = {
            let coordinator = coordinator.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                coordinator
                    .execute_batch(vec![invocation("slow")], &cancel)
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let error = batch.await.unwrap().unwrap_err();
        assert!(matches!(error, ColloquyError::Cancelled));
        assert_eq!(coordinator.in_flight_batches(), 0);
    }

    #[tokio::test]
    async fn test_cancel_leaves_other_batches_running() {
        let coordinator = ToolExecutionCoordinator::new(Arc::new(ScriptedCapability::new()));
        let cancelled = CancelSignal::new();
        let unrelated = CancelSignal::new();

        let doomed = {
            let coordinator = coordinator.clone();
            let cancel = cancelled.clone();
            tokio::spawn(async move {
                coordinator
                    .execute_batch(vec![invocation("slow")], &cancel)
                    .await
            })
        };
        let survivor = {
            let coordinator = coordinator.clone();
            let cancel = unrelated.clone();
            tokio::spawn(async move {
                coordinator
                    .execute_batch(vec![invocation("fine")], &cancel)
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancelled.cancel();

        assert!(matches!(
            doomed.await.unwrap().unwrap_err(),
            ColloquyError::Cancelled
        ));
        let results = survivor.await.unwrap().unwrap();
        assert_eq!(results[0].payload, "ran fine");
    }
}
