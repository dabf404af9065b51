//! [`PipelineBuilder`], [`Pipeline`] and [`PipelineHandle`].

use std::{
  future::Future,
  sync::{Arc, Mutex, PoisonError},
};

use tokio::{
  sync::{Mutex as AsyncMutex, mpsc},
  task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::{BoxError, PipelineError, Result};

/// Queue bound used when a task does not set one, and for the tail queue.
pub const DEFAULT_QUEUE_SIZE: usize = 64;

// ─── Task configuration ──────────────────────────────────────────────────────

/// Name, input queue bound and worker count of one task.
#[derive(Debug, Clone)]
pub struct TaskConfig {
  name:       String,
  queue_size: usize,
  workers:    usize,
}

impl TaskConfig {
  pub fn new(name: impl Into<String>) -> Self {
    Self { name: name.into(), queue_size: DEFAULT_QUEUE_SIZE, workers: 1 }
  }

  /// Bound of the task's input queue; at least 1.
  pub fn queue_size(mut self, queue_size: usize) -> Self {
    self.queue_size = queue_size.max(1);
    self
  }

  /// Number of concurrent workers; at least 1.
  pub fn workers(mut self, workers: usize) -> Self {
    self.workers = workers.max(1);
    self
  }
}

// ─── Shared run state ────────────────────────────────────────────────────────

struct Shared {
  cancel:  CancellationToken,
  failure: Mutex<Option<PipelineError>>,
  workers: Mutex<Vec<(Arc<str>, JoinHandle<()>)>>,
}

impl Shared {
  fn new(cancel: CancellationToken) -> Self {
    Self { cancel, failure: Mutex::new(None), workers: Mutex::new(Vec::new()) }
  }

  /// Record the first failure and stop every stage.
  fn fail(&self, err: PipelineError) {
    {
      let mut slot = self.failure.lock().unwrap_or_else(PoisonError::into_inner);
      if slot.is_none() {
        error!("pipeline failed: {err}");
        *slot = Some(err);
      } else {
        debug!("discarding later pipeline failure: {err}");
      }
    }
    self.cancel.cancel();
  }

  fn take_failure(&self) -> Option<PipelineError> {
    self.failure.lock().unwrap_or_else(PoisonError::into_inner).take()
  }

  fn track(&self, stage: Arc<str>, handle: JoinHandle<()>) {
    self
      .workers
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .push((stage, handle));
  }

  fn take_workers(&self) -> Vec<(Arc<str>, JoinHandle<()>)> {
    std::mem::take(&mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner))
  }
}

// ─── Builder ─────────────────────────────────────────────────────────────────

/// Spawns the workers of every stage so far and returns the receiving end of
/// the last stage's output queue, bounded by the given capacity.
type Wire<I, O> =
  Box<dyn FnOnce(mpsc::Receiver<I>, &Arc<Shared>, usize) -> mpsc::Receiver<O> + Send>;

/// Typed builder: each [`add_task`](Self::add_task) changes the output type.
pub struct PipelineBuilder<I, O> {
  wire:            Wire<I, O>,
  head_queue_size: Option<usize>,
  stages:          Vec<String>,
}

impl<I: Send + 'static> PipelineBuilder<I, I> {
  pub fn new() -> Self {
    Self { wire: Box::new(|input, _, _| input), head_queue_size: None, stages: Vec::new() }
  }
}

impl<I: Send + 'static> Default for PipelineBuilder<I, I> {
  fn default() -> Self { Self::new() }
}

impl<I: Send + 'static, O: Send + 'static> PipelineBuilder<I, O> {
  /// Append a task turning each `O` into zero or more `N`.
  pub fn add_task<N, F, Fut, E>(self, config: TaskConfig, task: F) -> PipelineBuilder<I, N>
  where
    N: Send + 'static,
    F: Fn(O) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<N>, E>> + Send + 'static,
    E: Into<BoxError> + Send + 'static,
  {
    let TaskConfig { name, queue_size, workers } = config;
    let stage: Arc<str> = name.as_str().into();
    let task = Arc::new(task);
    let upstream = self.wire;

    let wire: Wire<I, N> = Box::new(move |input, shared, out_capacity| {
      let queue = upstream(input, shared, queue_size);
      let queue = Arc::new(AsyncMutex::new(queue));
      let (tx, rx) = mpsc::channel(out_capacity);
      for _ in 0..workers {
        let handle = tokio::spawn(run_worker(
          stage.clone(),
          queue.clone(),
          tx.clone(),
          task.clone(),
          shared.clone(),
        ));
        shared.track(stage.clone(), handle);
      }
      rx
    });

    let mut stages = self.stages;
    stages.push(name);
    PipelineBuilder {
      wire,
      head_queue_size: self.head_queue_size.or(Some(queue_size)),
      stages,
    }
  }

  pub fn build(self) -> Pipeline<I, O> {
    Pipeline {
      wire:            self.wire,
      head_queue_size: self.head_queue_size.unwrap_or(DEFAULT_QUEUE_SIZE),
      stages:          self.stages,
    }
  }
}

async fn run_worker<O, N, F, Fut, E>(
  stage: Arc<str>,
  input: Arc<AsyncMutex<mpsc::Receiver<O>>>,
  output: mpsc::Sender<N>,
  task: Arc<F>,
  shared: Arc<Shared>,
) where
  F: Fn(O) -> Fut,
  Fut: Future<Output = Result<Vec<N>, E>>,
  E: Into<BoxError> + Send + 'static,
{
  let cancel = shared.cancel.clone();
  loop {
    let item = tokio::select! {
      biased;
      _ = cancel.cancelled() => None,
      item = async { input.lock().await.recv().await } => item,
    };
    let Some(item) = item else { break };

    let produced = tokio::select! {
      biased;
      _ = cancel.cancelled() => break,
      produced = (*task)(item) => produced,
    };

    match produced {
      Ok(items) => {
        for next in items {
          tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            sent = output.send(next) => {
              if sent.is_err() {
                return;
              }
            }
          }
        }
      }
      Err(e) => {
        shared.fail(PipelineError::Failed { stage: stage.to_string(), source: e.into() });
        break;
      }
    }
  }
}

// ─── Pipeline ────────────────────────────────────────────────────────────────

/// A composed pipeline, ready to run once.
pub struct Pipeline<I, O> {
  wire:            Wire<I, O>,
  head_queue_size: usize,
  stages:          Vec<String>,
}

impl<I: Send + 'static, O: Send + 'static> Pipeline<I, O> {
  pub fn stages(&self) -> &[String] { &self.stages }

  pub fn run<In>(self, inputs: In) -> PipelineHandle<O>
  where
    In: IntoIterator<Item = I>,
    In::IntoIter: Send + 'static,
  {
    self.run_with_cancel(inputs, CancellationToken::new())
  }

  /// Run, stopping early when `cancel` fires. The pipeline works on a child
  /// of `cancel`, so cancelling or dropping the handle never cancels the
  /// caller's token.
  pub fn run_with_cancel<In>(self, inputs: In, cancel: CancellationToken) -> PipelineHandle<O>
  where
    In: IntoIterator<Item = I>,
    In::IntoIter: Send + 'static,
  {
    let shared = Arc::new(Shared::new(cancel.child_token()));
    let (tx, rx) = mpsc::channel(self.head_queue_size);
    let output = (self.wire)(rx, &shared, DEFAULT_QUEUE_SIZE);

    let token = shared.cancel.clone();
    let inputs = inputs.into_iter();
    let feeder = tokio::spawn(async move {
      for item in inputs {
        tokio::select! {
          biased;
          _ = token.cancelled() => return,
          sent = tx.send(item) => {
            if sent.is_err() {
              return;
            }
          }
        }
      }
    });
    shared.track("input".into(), feeder);

    debug!(stages = ?self.stages, "pipeline started");
    PipelineHandle {
      cancel: shared.cancel.clone(),
      task:   tokio::spawn(collect(output, shared)),
    }
  }
}

async fn collect<O>(mut output: mpsc::Receiver<O>, shared: Arc<Shared>) -> Result<Vec<O>> {
  let mut items = Vec::new();
  let drained = loop {
    tokio::select! {
      biased;
      _ = shared.cancel.cancelled() => break false,
      item = output.recv() => match item {
        Some(item) => items.push(item),
        None => break true,
      },
    }
  };
  drop(output);

  for (stage, handle) in shared.take_workers() {
    if let Err(e) = handle.await {
      if e.is_panic() {
        shared.fail(PipelineError::Panicked { stage: stage.to_string() });
      }
    }
  }

  if let Some(err) = shared.take_failure() {
    return Err(err);
  }
  if !drained {
    return Err(PipelineError::Cancelled);
  }
  Ok(items)
}

// ─── Handle ──────────────────────────────────────────────────────────────────

/// Completion handle of a running pipeline. Dropping it cancels the run.
pub struct PipelineHandle<O> {
  cancel: CancellationToken,
  task:   JoinHandle<Result<Vec<O>>>,
}

impl<O> PipelineHandle<O> {
  /// Ask every stage to stop. [`join`](Self::join) then reports
  /// [`PipelineError::Cancelled`] unless the run already failed.
  pub fn cancel(&self) { self.cancel.cancel(); }

  pub fn is_cancelled(&self) -> bool { self.cancel.is_cancelled() }

  /// Wait for the tail's output, or the first failure.
  pub async fn join(mut self) -> Result<Vec<O>> {
    match (&mut self.task).await {
      Ok(result) => result,
      Err(_) => Err(PipelineError::Panicked { stage: "collector".into() }),
    }
  }
}

impl<O> Drop for PipelineHandle<O> {
  fn drop(&mut self) { self.cancel.cancel(); }
}
