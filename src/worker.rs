//! Background row fetching
//!
//! Decoding on a cache miss can take longer than a UI frame, so a
//! [`RowFetcher`] answers `rows`/`prefetch` requests on its own thread. Each
//! request gets exactly one response, in the order requests were made, and
//! every response reflects all mutations that returned before its request was
//! issued.

use std::ops::Range;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::error::Result;
use crate::session::{SessionInner, ViewRow};

/// Identifies a request in the response stream
pub type RequestId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchRequest {
    Rows(Range<u64>),
    Prefetch(Range<u64>),
}

#[derive(Debug)]
pub enum FetchResult {
    Rows(Result<Vec<ViewRow>>),
    /// Number of rows decoded into the cache
    Prefetched(Result<usize>),
}

#[derive(Debug)]
pub struct FetchResponse {
    pub id: RequestId,
    pub request: FetchRequest,
    pub result: FetchResult,
}

struct Job {
    id: RequestId,
    request: FetchRequest,
}

pub struct RowFetcher {
    jobs: Option<Sender<Job>>,
    responses: Receiver<FetchResponse>,
    next_id: RequestId,
    handle: Option<JoinHandle<()>>,
}

impl RowFetcher {
    pub(crate) fn spawn(session: Arc<SessionInner>) -> Self {
        let (job_tx, job_rx) = mpsc::channel::<Job>();
        let (response_tx, response_rx) = mpsc::channel();

        let handle = std::thread::spawn(move || {
            while let Ok(job) = job_rx.recv() {
                let result = match &job.request {
                    FetchRequest::Rows(range) => FetchResult::Rows(session.rows(range.clone())),
                    FetchRequest::Prefetch(range) => {
                        FetchResult::Prefetched(session.prefetch(range.clone()))
                    }
                };
                let response = FetchResponse {
                    id: job.id,
                    request: job.request,
                    result,
                };
                if response_tx.send(response).is_err() {
                    break;
                }
            }
            tracing::trace!("Row fetcher stopped");
        });

        Self {
            jobs: Some(job_tx),
            responses: response_rx,
            next_id: 0,
            handle: Some(handle),
        }
    }

    /// Queue a `rows(range)` request
    pub fn request(&mut self, range: Range<u64>) -> RequestId {
        self.submit(FetchRequest::Rows(range))
    }

    /// Queue a cache warm-up for `range`
    pub fn prefetch(&mut self, range: Range<u64>) -> RequestId {
        self.submit(FetchRequest::Prefetch(range))
    }

    fn submit(&mut self, request: FetchRequest) -> RequestId {
        let id = self.next_id;
        self.next_id += 1;
        if let Some(jobs) = &self.jobs {
            if jobs.send(Job { id, request }).is_err() {
                tracing::warn!("Row fetcher thread is gone; request {} dropped", id);
            }
        }
        id
    }

    /// Block until the next response arrives
    pub fn recv(&self) -> Option<FetchResponse> {
        self.responses.recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<FetchResponse> {
        match self.responses.recv_timeout(timeout) {
            Ok(response) => Some(response),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Non-blocking poll, for use from a UI loop
    pub fn try_recv(&self) -> Option<FetchResponse> {
        self.responses.try_recv().ok()
    }
}

impl Drop for RowFetcher {
    fn drop(&mut self) {
        // Closing the job channel ends the worker loop
        self.jobs.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
