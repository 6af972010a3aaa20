//! Capture-backed source provider.

use super::SourceProvider;
use crate::error::CaptureError;
use crate::frame::{SourceFrame, VideoFrame};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Pause before the capture thread retries after a failed grab.
const RETRY_DELAY: Duration = Duration::from_millis(100);

/// A platform capture mechanism. Implementations may fail on any call.
pub trait CaptureBackend {
    /// Grabs the most recent frame. Backends whose device blocks until the
    /// next frame arrives belong behind a [`ThreadedCapture`].
    fn capture_frame(&mut self) -> Result<VideoFrame, CaptureError>;

    /// Returns the current frame dimensions.
    fn frame_size(&self) -> (u32, u32);
}

/// Configuration for opening a capture device.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Device index
    pub device_index: u32,
    /// Desired frame width
    pub width: u32,
    /// Desired frame height
    pub height: u32,
    /// Desired frame rate
    pub fps: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            width: 1280,
            height: 720,
            fps: 30,
        }
    }
}

/// Runs a blocking backend on its own thread and hands out the newest frame
/// without waiting.
///
/// The backend is opened on the capture thread, so it need not be `Send`.
/// Dropping the handle stops the thread after its current grab.
pub struct ThreadedCapture {
    frames: Receiver<Result<VideoFrame, CaptureError>>,
    stop: Arc<AtomicBool>,
    size: (u32, u32),
    _worker: JoinHandle<()>,
}

impl ThreadedCapture {
    /// Starts the capture thread and waits until `open` has finished there.
    pub fn spawn<B, F>(open: F) -> Result<Self, CaptureError>
    where
        B: CaptureBackend + 'static,
        F: FnOnce() -> Result<B, CaptureError> + Send + 'static,
    {
        let (ready_tx, ready_rx) = mpsc::channel();
        // One slot keeps the thread at most a frame ahead of the renderer.
        let (frame_tx, frames) = mpsc::sync_channel(1);
        let stop = Arc::new(AtomicBool::new(false));
        let worker_stop = stop.clone();

        let worker = thread::Builder::new()
            .name("capture".to_string())
            .spawn(move || {
                let mut backend = match open() {
                    Ok(backend) => {
                        let _ = ready_tx.send(Ok(backend.frame_size()));
                        backend
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                while !worker_stop.load(Ordering::Relaxed) {
                    let result = backend.capture_frame();
                    let failed = result.is_err();
                    if frame_tx.send(result).is_err() {
                        break;
                    }
                    if failed {
                        thread::sleep(RETRY_DELAY);
                    }
                }
                debug!("Capture thread stopped");
            })
            .map_err(|e| CaptureError::Unavailable(format!("could not start capture thread: {}", e)))?;

        let size = ready_rx
            .recv()
            .map_err(|_| CaptureError::Unavailable("capture thread exited while opening".to_string()))??;
        Ok(Self {
            frames,
            stop,
            size,
            _worker: worker,
        })
    }
}

impl CaptureBackend for ThreadedCapture {
    /// Takes the newest result the thread has published, or
    /// [`CaptureError::NotReady`] when nothing new arrived since the last call.
    fn capture_frame(&mut self) -> Result<VideoFrame, CaptureError> {
        let mut latest = None;
        loop {
            match self.frames.try_recv() {
                Ok(result) => latest = Some(result),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if latest.is_none() {
                        return Err(CaptureError::Unavailable("capture thread stopped".to_string()));
                    }
                    break;
                }
            }
        }
        let result = latest.ok_or(CaptureError::NotReady)?;
        if let Ok(frame) = &result {
            self.size = (frame.width, frame.height);
        }
        result
    }

    fn frame_size(&self) -> (u32, u32) {
        self.size
    }
}

impl Drop for ThreadedCapture {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

/// Folds backend failures into "unavailable" so they never reach the
/// frame loop as errors.
pub struct CaptureSource<B> {
    backend: B,
    consecutive_failures: u64,
}

impl<B: CaptureBackend> CaptureSource<B> {
    pub fn new(backend: B) -> Self {
        let (width, height) = backend.frame_size();
        info!("Capture source ready at {}x{}", width, height);
        Self {
            backend,
            consecutive_failures: 0,
        }
    }

    #[cfg(test)]
    fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures
    }

    fn grab(&mut self) -> Result<SourceFrame, CaptureError> {
        let frame = self.backend.capture_frame()?;
        let (width, height) = (frame.width, frame.height);
        frame.into_rgba().ok_or(CaptureError::Malformed { width, height })
    }
}

impl<B: CaptureBackend> SourceProvider for CaptureSource<B> {
    fn try_grab(&mut self) -> Option<SourceFrame> {
        match self.grab() {
            // Between frames of a slower device; not a failure.
            Err(CaptureError::NotReady) => None,
            Ok(frame) => {
                if self.consecutive_failures > 0 {
                    info!("Capture recovered after {} failed grabs", self.consecutive_failures);
                }
                self.consecutive_failures = 0;
                Some(frame)
            }
            Err(e) => {
                if self.consecutive_failures == 0 {
                    warn!("Capture unavailable: {}", e);
                } else {
                    debug!("Capture still unavailable: {}", e);
                }
                self.consecutive_failures += 1;
                None
            }
        }
    }
}
