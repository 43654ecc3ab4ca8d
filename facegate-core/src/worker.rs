use crate::flow::{FlowError, Gatekeeper, LoginOutcome, Registration};
use crate::frame::Frame;
use crate::recognition::{RecognitionError, Recognizer};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub type JobId = u64;

#[derive(Debug, Clone)]
pub enum Job {
    Login { frame: Frame },
    Register { name: String, frame: Frame },
}

#[derive(Debug)]
pub enum JobOutcome {
    Login(LoginOutcome),
    Registered(Registration),
}

#[derive(Debug)]
pub struct JobResult {
    pub id: JobId,
    pub result: Result<JobOutcome, FlowError>,
}

/// Runs recognition jobs off the caller's thread.
///
/// The worker owns the recognizer and the gatekeeper; jobs go in over one
/// channel and results come back over another, tagged with the id returned
/// by [`RecognitionWorker::submit`].
pub struct RecognitionWorker {
    jobs: Option<Sender<(JobId, Job)>>,
    results: Receiver<JobResult>,
    // Answers jobs the worker thread can no longer take
    replies: Sender<JobResult>,
    cancelled: Arc<AtomicBool>,
    next_id: JobId,
}

impl RecognitionWorker {
    /// Start the worker thread. `build` runs on that thread, so slow model
    /// loading never blocks the caller.
    pub fn spawn<R, F>(gatekeeper: Gatekeeper, build: F) -> Self
    where
        R: Recognizer + 'static,
        F: FnOnce() -> Result<R, RecognitionError> + Send + 'static,
    {
        let (jobs_tx, jobs_rx) = crossbeam_channel::unbounded::<(JobId, Job)>();
        let (results_tx, results_rx) = crossbeam_channel::unbounded::<JobResult>();
        let cancelled = Arc::new(AtomicBool::new(false));

        let replies = results_tx.clone();
        let thread_cancelled = cancelled.clone();
        let spawned = thread::Builder::new()
            .name("facegate-recognition".to_string())
            .spawn(move || {
                let mut recognizer = build().map_err(|e| {
                    log::error!("Recognizer unavailable: {}", e);
                    e.to_string()
                });
                if recognizer.is_ok() {
                    log::info!("Recognizer ready");
                }

                for (id, job) in jobs_rx.iter() {
                    let result = if thread_cancelled.load(Ordering::Relaxed) {
                        Err(FlowError::Cancelled)
                    } else {
                        match recognizer.as_mut() {
                            Ok(recognizer) => run_job(&gatekeeper, recognizer, job, &thread_cancelled),
                            Err(reason) => Err(FlowError::RecognizerUnavailable(reason.clone())),
                        }
                    };

                    if results_tx.send(JobResult { id, result }).is_err() {
                        break;
                    }
                }
                log::debug!("Recognition worker exiting");
            });

        if let Err(e) = spawned {
            // The job channel has no reader now, so submit() answers every job itself
            log::error!("Failed to start recognition worker: {}", e);
        }

        Self {
            jobs: Some(jobs_tx),
            results: results_rx,
            replies,
            cancelled,
            next_id: 0,
        }
    }

    /// Queue a job and return the id its result will carry.
    pub fn submit(&mut self, job: Job) -> JobId {
        self.next_id += 1;
        let id = self.next_id;

        let sent = self
            .jobs
            .as_ref()
            .map_or(false, |jobs| jobs.send((id, job)).is_ok());
        if !sent {
            log::warn!("Recognition worker is gone; failing job {}", id);
            let _ = self.replies.send(JobResult {
                id,
                result: Err(FlowError::RecognizerUnavailable(
                    "recognition worker stopped".to_string(),
                )),
            });
        }
        id
    }

    /// Next finished job, if any. Never blocks.
    pub fn try_recv(&self) -> Option<JobResult> {
        self.results.try_recv().ok()
    }

    /// Wait up to `timeout` for the next finished job.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<JobResult> {
        match self.results.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Stop the job in flight at its next checkpoint and refuse later ones.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::Relaxed) {
            log::info!("Recognition cancelled");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

impl Drop for RecognitionWorker {
    fn drop(&mut self) {
        self.cancel();
        // Closing the job channel ends the worker loop once the current job returns
        self.jobs.take();
    }
}

fn run_job<R: Recognizer + ?Sized>(
    gatekeeper: &Gatekeeper,
    recognizer: &mut R,
    job: Job,
    cancelled: &AtomicBool,
) -> Result<JobOutcome, FlowError> {
    match job {
        Job::Login { frame } => gatekeeper
            .login(recognizer, frame.image(), cancelled)
            .map(JobOutcome::Login),
        Job::Register { name, frame } => gatekeeper
            .register(recognizer, &name, frame.image())
            .map(JobOutcome::Registered),
    }
}
