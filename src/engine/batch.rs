// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Batch execution of masking and validation over a bounded worker pool.
//!
//! Results land in a pre-sized slot per input index, so output order always
//! matches input order. The coordinator never touches the ledger.

use futures::future::join_all;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::engine::masking::{MaskOutcome, MaskingEngine, PolicyHandle};
use crate::engine::validator::{SchemaHandle, SchemaValidator, ValidationResult};
use crate::engine_core::errors::CoreError;

type Slots<R> = Arc<Mutex<Vec<Option<R>>>>;

#[derive(Debug)]
pub struct BatchOutcome<R> {
    /// One slot per input item. `None` for items that never completed.
    pub results: Vec<Option<R>>,
    pub cancelled: bool,
}

impl<R> BatchOutcome<R> {
    pub fn completed(&self) -> usize {
        self.results.iter().filter(|r| r.is_some()).count()
    }
}

/// Running batch. Dropping it does not stop the workers; call `cancel`.
pub struct BatchHandle<R> {
    token: CancellationToken,
    workers: Vec<JoinHandle<()>>,
    slots: Slots<R>,
}

impl<R> BatchHandle<R> {
    /// Completed slots keep their results, in-flight results are discarded
    /// and unscheduled items never start.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Token tied to this batch, for linking with a caller's shutdown signal.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub async fn join(self) -> BatchOutcome<R> {
        for joined in join_all(self.workers).await {
            if let Err(e) = joined {
                warn!("Batch worker failed: {}", e);
            }
        }
        let results = std::mem::take(&mut *self.slots.lock());
        BatchOutcome {
            results,
            cancelled: self.token.is_cancelled(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchCoordinator {
    workers: usize,
}

impl Default for BatchCoordinator {
    fn default() -> Self {
        Self::new(std::thread::available_parallelism().map_or(1, |n| n.get()))
    }
}

impl BatchCoordinator {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `operation` over every item on the current tokio runtime.
    /// Fails with `CoreError::Batch` when called outside a runtime.
    pub fn run_batch<T, R, F>(&self, items: Vec<T>, operation: F) -> Result<BatchHandle<R>, CoreError>
    where
        T: Send + Sync + 'static,
        R: Send + 'static,
        F: Fn(&T) -> R + Send + Sync + 'static,
    {
        let runtime = Handle::try_current()
            .map_err(|e| CoreError::Batch(format!("no tokio runtime: {}", e)))?;
        let total = items.len();
        let items = Arc::new(items);
        let operation = Arc::new(operation);
        let slots: Slots<R> = Arc::new(Mutex::new((0..total).map(|_| None).collect()));
        let next = Arc::new(AtomicUsize::new(0));
        let token = CancellationToken::new();

        let pool = self.workers.min(total);
        debug!(items = total, workers = pool, "Batch scheduled");

        let workers = (0..pool)
            .map(|_| {
                let items = Arc::clone(&items);
                let operation = Arc::clone(&operation);
                let slots = Arc::clone(&slots);
                let next = Arc::clone(&next);
                let token = token.clone();
                runtime.spawn(async move {
                    loop {
                        let index = next.fetch_add(1, Ordering::SeqCst);
                        if index >= items.len() || token.is_cancelled() {
                            break;
                        }

                        let task_items = Arc::clone(&items);
                        let task_operation = Arc::clone(&operation);
                        let task = tokio::task::spawn_blocking(move || {
                            task_operation(&task_items[index])
                        });

                        let result = tokio::select! {
                            _ = token.cancelled() => break,
                            joined = task => joined,
                        };
                        match result {
                            Ok(value) => {
                                if token.is_cancelled() {
                                    break;
                                }
                                slots.lock()[index] = Some(value);
                            }
                            Err(e) => warn!(index, "Batch item failed: {}", e),
                        }
                    }
                })
            })
            .collect();

        Ok(BatchHandle {
            token,
            workers,
            slots,
        })
    }

    pub fn mask_batch(
        &self,
        texts: Vec<String>,
        policy: PolicyHandle,
    ) -> Result<BatchHandle<MaskOutcome>, CoreError> {
        self.run_batch(texts, move |text: &String| MaskingEngine::mask(text, &policy))
    }

    pub fn validate_batch(
        &self,
        records: Vec<Value>,
        schema: SchemaHandle,
    ) -> Result<BatchHandle<ValidationResult>, CoreError> {
        self.run_batch(records, move |record: &Value| {
            SchemaValidator::validate(record, &schema)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_batch() {
        let outcome = BatchCoordinator::new(4)
            .run_batch(Vec::<u32>::new(), |n: &u32| *n)
            .unwrap()
            .join()
            .await;
        assert!(outcome.results.is_empty());
        assert!(!outcome.cancelled);
    }

    #[tokio::test]
    async fn test_panicking_item_leaves_empty_slot() {
        let outcome = BatchCoordinator::new(2)
            .run_batch(vec![1u32, 2, 3], |n: &u32| {
                if *n == 2 {
                    panic!("boom");
                }
                *n * 10
            })
            .unwrap()
            .join()
            .await;
        assert_eq!(outcome.results, vec![Some(10), None, Some(30)]);
    }

    #[test]
    fn test_outside_runtime_is_an_error() {
        let err = BatchCoordinator::new(2)
            .run_batch(vec![1u32], |n: &u32| *n)
            .err()
            .unwrap();
        assert!(matches!(err, CoreError::Batch(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_worker_count_floor() {
        assert_eq!(BatchCoordinator::new(0).workers(), 1);
        assert!(BatchCoordinator::default().workers() >= 1);
    }
}
