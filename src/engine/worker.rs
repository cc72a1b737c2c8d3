use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::detect::{InferenceBackend, RawOutput};
use crate::tensor::InputTensor;

const WORKER_THREAD_NAME: &str = "fallguard-inference";

struct Job {
    tick: u64,
    tensor: InputTensor,
}

/// Output of one inference run, tagged with the tick that dispatched it.
pub(crate) struct JobResult {
    pub tick: u64,
    pub output: Result<RawOutput>,
    pub elapsed: Duration,
}

pub(crate) enum Received {
    Result(JobResult),
    Empty,
    /// The worker thread is gone. No further results will arrive.
    Disconnected,
}

/// Owns the backend on a dedicated thread so inference never blocks the
/// caller's loop.
///
/// Dropping the worker closes the job channel; the thread exits once its
/// current run returns. It is never joined, so a stuck backend cannot hang
/// shutdown.
pub(crate) struct InferenceWorker {
    jobs: Option<Sender<Job>>,
    results: Receiver<JobResult>,
    _join: JoinHandle<()>,
}

impl InferenceWorker {
    pub fn spawn(mut backend: Box<dyn InferenceBackend>) -> std::io::Result<Self> {
        let (job_tx, job_rx) = mpsc::channel::<Job>();
        let (result_tx, result_rx) = mpsc::channel::<JobResult>();
        let join = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                log::debug!("inference worker started ({})", backend.name());
                while let Ok(job) = job_rx.recv() {
                    let started = Instant::now();
                    let output = backend.run(&job.tensor);
                    // the input buffer is released before the result is handed back
                    drop(job.tensor);
                    let result = JobResult {
                        tick: job.tick,
                        output,
                        elapsed: started.elapsed(),
                    };
                    if result_tx.send(result).is_err() {
                        break;
                    }
                }
                log::debug!("inference worker exiting");
            })?;
        Ok(Self {
            jobs: Some(job_tx),
            results: result_rx,
            _join: join,
        })
    }

    /// Hand a tensor to the worker. Returns false if the worker is gone.
    pub fn submit(&self, tick: u64, tensor: InputTensor) -> bool {
        match &self.jobs {
            Some(jobs) => jobs.send(Job { tick, tensor }).is_ok(),
            None => false,
        }
    }

    pub fn try_recv(&self) -> Received {
        match self.results.try_recv() {
            Ok(result) => Received::Result(result),
            Err(TryRecvError::Empty) => Received::Empty,
            Err(TryRecvError::Disconnected) => Received::Disconnected,
        }
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Received {
        match self.results.recv_timeout(timeout) {
            Ok(result) => Received::Result(result),
            Err(RecvTimeoutError::Timeout) => Received::Empty,
            Err(RecvTimeoutError::Disconnected) => Received::Disconnected,
        }
    }
}

impl Drop for InferenceWorker {
    fn drop(&mut self) {
        self.jobs.take();
    }
}
