//! Background recognition worker
//!
//! Moves recognition off the capture thread: frames are queued over a channel
//! to a dedicated thread that owns a handle to the shared pipeline, and each
//! caller gets its own reply channel.

use anyhow::{Context, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info};

use super::{OcrPipeline, Recognition};
use crate::capture::RawFrame;
use crate::error::OcrError;

/// Messages sent to the worker thread
enum Job {
    /// Recognize a frame and reply on the given channel
    Recognize {
        frame: RawFrame,
        reply: Sender<Result<Recognition, OcrError>>,
    },
    /// Request the worker to exit
    Shutdown,
}

/// Runs recognitions on a background thread
pub struct RecognitionWorker {
    jobs: Sender<Job>,
    handle: Option<JoinHandle<()>>,
}

impl RecognitionWorker {
    /// Start a worker thread for the pipeline
    pub fn spawn(pipeline: Arc<OcrPipeline>) -> Result<Self> {
        let (jobs, queue) = unbounded();

        let handle = std::thread::Builder::new()
            .name("ocr-worker".to_string())
            .spawn(move || {
                info!("OCR worker thread starting...");
                run(&pipeline, queue);
                info!("OCR worker thread exiting...");
            })
            .context("Failed to spawn OCR worker thread")?;

        Ok(Self {
            jobs,
            handle: Some(handle),
        })
    }

    /// Queue a frame; the result arrives on the returned channel
    ///
    /// A stopped worker answers with `OcrError::Uninitialized`.
    pub fn submit(&self, frame: RawFrame) -> Receiver<Result<Recognition, OcrError>> {
        let (reply, result) = bounded(1);

        if let Err(err) = self.jobs.send(Job::Recognize { frame, reply }) {
            if let Job::Recognize { reply, .. } = err.into_inner() {
                let _ = reply.send(Err(OcrError::Uninitialized));
            }
        }
        result
    }

    /// Check if the worker thread is still running
    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Finish queued jobs, then stop the thread
    pub fn stop(&mut self) {
        let _ = self.jobs.send(Job::Shutdown);

        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for RecognitionWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(pipeline: &OcrPipeline, queue: Receiver<Job>) {
    for job in queue {
        match job {
            Job::Recognize { frame, reply } => {
                let result = pipeline.recognize_detailed(frame);
                if let Err(e) = &result {
                    debug!("Queued recognition failed: {}", e);
                }
                // The caller may have stopped waiting
                let _ = reply.send(result);
            }
            Job::Shutdown => break,
        }
    }
}
