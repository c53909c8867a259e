/// Bulk room operation engine.
///
/// Rooms are processed in input order, `batch_size` at a time. Within a batch
/// every room runs as its own unit of work: it waits the rate-limit delay and
/// then calls the operation, and all units of the batch are polled together.
/// The next batch starts only once every unit of the current one has settled.
///
/// A failing room never stops its siblings. Failures are collected in the
/// result, so retrying just the failed rooms is another call to `run` with
/// `BatchResult::failed`.
use futures_util::StreamExt;
use serde::{Serialize, Serializer};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::client::OperationError;
use crate::progress::BatchProgress;
use crate::room::RoomRef;

pub const DEFAULT_BATCH_SIZE: usize = 25;
pub const DEFAULT_DELAY: Duration = Duration::from_millis(500);

/// Batching and rate-limit settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    /// Rooms in flight at once. Zero is treated as one.
    pub batch_size: usize,
    /// Wait before each room's operation.
    pub delay: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            delay: DEFAULT_DELAY,
        }
    }
}

/// A failed room together with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomError {
    #[serde(flatten)]
    pub room: RoomRef,
    #[serde(serialize_with = "error_as_string")]
    pub error: OperationError,
}

fn error_as_string<S: Serializer>(error: &OperationError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

impl std::fmt::Display for RoomError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.room.room_name, self.room.room_id, self.error)
    }
}

/// Outcome of a bulk run.
///
/// Every input room ends up in exactly one of `succeeded` and `failed`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub succeeded: Vec<RoomRef>,
    pub failed: Vec<RoomRef>,
    pub errors: Vec<RoomError>,
}

impl BatchResult {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Runs a per-room operation over a room list in batches.
#[derive(Debug, Clone)]
pub struct BatchRunner {
    options: BatchOptions,
    verb: String,
    show_progress: bool,
}

impl BatchRunner {
    pub fn new(options: BatchOptions) -> Self {
        Self {
            options,
            verb: "processing".to_owned(),
            show_progress: false,
        }
    }

    /// Enables terminal progress labelled with `verb`.
    pub fn with_progress(mut self, verb: &str) -> Self {
        self.verb = verb.to_owned();
        self.show_progress = true;
        self
    }

    /// Applies `operation` to every room and collects the outcomes.
    ///
    /// Never fails; per-room errors end up in the result. Within a batch,
    /// outcomes are recorded in completion order.
    pub async fn run<F, Fut>(&self, rooms: Vec<RoomRef>, operation: F) -> BatchResult
    where
        F: Fn(RoomRef) -> Fut,
        Fut: Future<Output = Result<(), OperationError>>,
    {
        let total = rooms.len();
        let batch_size = self.options.batch_size.max(1);
        let delay = self.options.delay;
        let progress = if self.show_progress {
            BatchProgress::new(total, &self.verb)
        } else {
            BatchProgress::hidden()
        };

        let mut result = BatchResult::default();
        let op = &operation;

        // Batches run one after another, in input order. A batch starts only
        // once every room of the previous one has settled.
        for (index, batch) in rooms.chunks(batch_size).enumerate() {
            let left = total - result.total();
            progress.set_counts(&self.verb, result.succeeded.len(), result.failed.len(), left);
            info!(
                verb = %self.verb,
                batch = index + 1,
                size = batch.len(),
                done = result.succeeded.len(),
                failed = result.failed.len(),
                left,
                "Starting batch"
            );

            // The window is the whole batch: every room sleeps `delay` and then
            // calls the server, so rooms in a batch overlap and the batch takes
            // roughly `delay` plus its slowest call.
            let mut outcomes = futures_util::stream::iter(batch.iter().cloned())
                .map(move |room| async move {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    let outcome = op(room.clone()).await;
                    (room, outcome)
                })
                .buffer_unordered(batch.len());

            // A failed room is recorded and the rest of the batch keeps going.
            while let Some((room, outcome)) = outcomes.next().await {
                match outcome {
                    Ok(()) => {
                        debug!(room_id = %room.room_id, verb = %self.verb, "Room done");
                        progress.record(&room.room_name, None);
                        result.succeeded.push(room);
                    }
                    Err(error) => {
                        warn!(room_id = %room.room_id, verb = %self.verb, %error, "Room failed");
                        progress.record(&room.room_name, Some(&error.to_string()));
                        result.failed.push(room.clone());
                        result.errors.push(RoomError { room, error });
                    }
                }
            }
        }

        progress.finish();
        info!(
            verb = %self.verb,
            succeeded = result.succeeded.len(),
            failed = result.failed.len(),
            "Bulk operation finished"
        );
        result
    }

    /// Runs the operation on all rooms at once, without delay.
    pub async fn fan_out<F, Fut>(&self, rooms: Vec<RoomRef>, operation: F) -> BatchResult
    where
        F: Fn(RoomRef) -> Fut,
        Fut: Future<Output = Result<(), OperationError>>,
    {
        let runner = BatchRunner {
            options: BatchOptions {
                batch_size: rooms.len(),
                delay: Duration::ZERO,
            },
            ..self.clone()
        };
        runner.run(rooms, operation).await
    }
}
