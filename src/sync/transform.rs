//! Asset transform pipeline
//!
//! Fetch tasks push [`TransformTask`]s onto a bounded channel; a fixed pool
//! of workers pulls them and runs the CPU-bound re-encode on tokio's blocking
//! pool. A full queue makes `enqueue` wait, which throttles the fetch side.
//!
//! Per task:
//! - the temporary source file is removed on every exit path;
//! - on success the re-encoded image is at the destination;
//! - on failure the original bytes are moved, unmodified, to the fallback
//!   path (which keeps the source's extension) and the move is reported in
//!   [`TransformStats::relocations`].
//!
//! Dropping the last sender closes the channel; workers drain what is
//! queued and then exit.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Errors raised by transforms and the queue
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Transform queue is full")]
    QueueFull,

    #[error("Transform queue is closed")]
    QueueClosed,
}

/// A queued asset: a temporary file and where its result belongs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformTask {
    pub source: PathBuf,
    pub destination: PathBuf,
    /// Where the untouched original goes when the transform fails
    pub fallback: PathBuf,
}

/// An asset kept in its original encoding instead of at its destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relocation {
    pub destination: PathBuf,
    pub kept_at: PathBuf,
}

/// A synchronous, possibly slow, file-to-file transform
pub trait AssetTransform: Send + Sync + 'static {
    fn transform(&self, source: &Path, destination: &Path) -> Result<(), TransformError>;
}

/// Decodes any supported image and re-encodes it as lossless WebP
#[derive(Debug, Clone, Copy, Default)]
pub struct WebpTransform;

impl AssetTransform for WebpTransform {
    fn transform(&self, source: &Path, destination: &Path) -> Result<(), TransformError> {
        let decoded = image::ImageReader::open(source)?
            .with_guessed_format()?
            .decode()?;
        decoded
            .to_rgba8()
            .save_with_format(destination, image::ImageFormat::WebP)?;
        Ok(())
    }
}

/// Per-outcome task counts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformStats {
    pub converted: u64,
    pub relocated: u64,
    pub failed: u64,
    /// Tasks whose original was kept at the fallback path
    pub relocations: Vec<Relocation>,
}

impl TransformStats {
    fn record(&mut self, result: TaskResult) {
        match result {
            TaskResult::Converted => self.converted += 1,
            TaskResult::Relocated(relocation) => {
                self.relocated += 1;
                self.relocations.push(relocation);
            }
            TaskResult::Failed => self.failed += 1,
        }
    }

    fn merge(&mut self, other: TransformStats) {
        self.converted += other.converted;
        self.relocated += other.relocated;
        self.failed += other.failed;
        self.relocations.extend(other.relocations);
    }
}

#[derive(Debug)]
enum TaskResult {
    Converted,
    Relocated(Relocation),
    Failed,
}

/// Producer handle onto the transform queue
#[derive(Debug, Clone)]
pub struct TransformQueue {
    sender: mpsc::Sender<TransformTask>,
}

impl TransformQueue {
    /// Queues a task, waiting while the queue is full
    pub async fn enqueue(&self, task: TransformTask) -> Result<(), TransformError> {
        self.sender
            .send(task)
            .await
            .map_err(|_| TransformError::QueueClosed)
    }

    /// Queues a task without waiting
    pub fn try_enqueue(&self, task: TransformTask) -> Result<(), TransformError> {
        self.sender.try_send(task).map_err(|e| match e {
            TrySendError::Full(_) => TransformError::QueueFull,
            TrySendError::Closed(_) => TransformError::QueueClosed,
        })
    }
}

/// A running pool of transform workers
pub struct TransformPipeline {
    queue: TransformQueue,
    workers: Vec<JoinHandle<TransformStats>>,
}

impl TransformPipeline {
    /// Starts `workers` workers over a queue holding at most `capacity` tasks
    pub fn start(transform: Arc<dyn AssetTransform>, workers: usize, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..workers.max(1))
            .map(|worker_id| {
                let receiver = receiver.clone();
                let transform = transform.clone();
                tokio::spawn(run_worker(worker_id, receiver, transform))
            })
            .collect();

        Self {
            queue: TransformQueue { sender },
            workers,
        }
    }

    /// A producer handle; the queue stays open while any handle is alive
    pub fn queue(&self) -> TransformQueue {
        self.queue.clone()
    }

    /// Closes the pipeline's own sender and waits for workers to drain
    pub async fn shutdown(self) -> TransformStats {
        drop(self.queue);

        let mut stats = TransformStats::default();
        for worker in self.workers {
            match worker.await {
                Ok(worker_stats) => stats.merge(worker_stats),
                Err(e) => tracing::error!("Transform worker panicked: {}", e),
            }
        }

        tracing::debug!(
            "Transform pipeline drained: {} converted, {} relocated, {} failed",
            stats.converted,
            stats.relocated,
            stats.failed
        );
        stats
    }
}

async fn run_worker(
    worker_id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<TransformTask>>>,
    transform: Arc<dyn AssetTransform>,
) -> TransformStats {
    let mut stats = TransformStats::default();

    loop {
        let next = receiver.lock().await.recv().await;
        let Some(task) = next else {
            break;
        };

        let transform = transform.clone();
        let result =
            tokio::task::spawn_blocking(move || process_task(transform.as_ref(), &task)).await;

        match result {
            Ok(result) => stats.record(result),
            Err(e) => {
                tracing::error!("Transform task on worker {} panicked: {}", worker_id, e);
                stats.failed += 1;
            }
        }
    }

    stats
}

/// Removes the wrapped file when dropped
struct TempFileGuard<'a>(&'a Path);

impl Drop for TempFileGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(self.0) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove temp file {}: {}", self.0.display(), e);
            }
        }
    }
}

fn process_task(transform: &dyn AssetTransform, task: &TransformTask) -> TaskResult {
    let _guard = TempFileGuard(&task.source);

    if let Some(parent) = task.destination.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            tracing::error!("Cannot create {}: {}", parent.display(), e);
            return TaskResult::Failed;
        }
    }

    match transform.transform(&task.source, &task.destination) {
        Ok(()) => {
            // an original kept by an earlier run is superseded
            if task.fallback != task.destination {
                let _ = fs::remove_file(&task.fallback);
            }
            TaskResult::Converted
        }
        Err(e) => {
            tracing::warn!(
                "Transform of {} failed ({}), keeping original bytes",
                task.source.display(),
                e
            );
            let _ = fs::remove_file(&task.destination);

            match relocate(&task.source, &task.fallback) {
                Ok(()) => TaskResult::Relocated(Relocation {
                    destination: task.destination.clone(),
                    kept_at: task.fallback.clone(),
                }),
                Err(e) => {
                    tracing::error!(
                        "Failed to relocate {} to {}: {}",
                        task.source.display(),
                        task.fallback.display(),
                        e
                    );
                    TaskResult::Failed
                }
            }
        }
    }
}

/// Moves a file, copying when a rename is not possible (e.g. across devices)
fn relocate(source: &Path, destination: &Path) -> std::io::Result<()> {
    if fs::rename(source, destination).is_ok() {
        return Ok(());
    }
    fs::copy(source, destination).map(|_| ())
}
