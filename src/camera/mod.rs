//! FrameSource: camera ownership, acquisition thread, frame hand-off.
//!
//! ```text
//!  ┌──────────── acquisition thread ────────────┐
//!  │ CameraPort::read_frame ──▶ FpsMeter         │
//!  │            │                                │
//!  │            ▼                                │      control thread
//!  │   FrameQueue (cap 10, drop-oldest) ─────────┼──▶ FrameSource::next_frame
//!  └─────────────────────────────────────────────┘
//! ```
//!
//! The device is opened *inside* the acquisition thread through a factory
//! closure, so camera handles never cross threads.  Open errors travel back
//! over a channel and surface from [`FrameSource::open`].

pub mod fps;
#[cfg(feature = "camera")]
pub mod nokhwa_device;
pub mod queue;
pub mod synthetic;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use image::DynamicImage;
use log::{debug, error, info, warn};
use parking_lot::Mutex;

use crate::config::CameraConfig;
use crate::error::CameraError;
use crate::vision::Frame;

use fps::FpsMeter;
use queue::{FrameQueue, PopError};

/// How long [`FrameSource::open`] waits for the device to come up.
pub const OPEN_TIMEOUT: Duration = Duration::from_secs(5);
/// Default bound on joining the acquisition thread.
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(2);
/// Pause after a failed read before retrying.
const READ_BACKOFF: Duration = Duration::from_millis(10);

// ───────────────────────────────────────────────────────────────
// Camera port (driven adapter: device → acquisition thread)
// ───────────────────────────────────────────────────────────────

/// A capture device.  Implementations block until the next frame is ready.
pub trait CameraPort {
    fn read_frame(&mut self) -> Result<DynamicImage, CameraError>;

    /// Release the device.  Called once when acquisition ends.
    fn release(&mut self) {}
}

// ───────────────────────────────────────────────────────────────
// FrameSource
// ───────────────────────────────────────────────────────────────

pub struct FrameSource {
    queue: Arc<FrameQueue<Frame>>,
    meter: Arc<Mutex<FpsMeter>>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    done: mpsc::Receiver<()>,
}

impl FrameSource {
    /// Spawn the acquisition thread and open the device in it.
    pub fn open<C, F>(factory: F, config: &CameraConfig) -> Result<Self, CameraError>
    where
        C: CameraPort,
        F: FnOnce(&CameraConfig) -> Result<C, CameraError> + Send + 'static,
    {
        let queue: Arc<FrameQueue<Frame>> = Arc::new(FrameQueue::new());
        let meter = Arc::new(Mutex::new(FpsMeter::new()));
        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), CameraError>>();
        let (done_tx, done_rx) = mpsc::channel::<()>();

        let acq = Acquisition {
            queue: Arc::clone(&queue),
            meter: Arc::clone(&meter),
            running: Arc::clone(&running),
            max_failures: config.max_consecutive_read_failures.max(1),
        };
        let cfg = config.clone();

        let handle = thread::Builder::new()
            .name("frame-acquisition".into())
            .spawn(move || {
                match factory(&cfg) {
                    Ok(mut camera) => {
                        let _ = ready_tx.send(Ok(()));
                        acq.run(&mut camera);
                        camera.release();
                        info!("Camera released");
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        acq.queue.close();
                    }
                }
                let _ = done_tx.send(());
            })
            .map_err(|e| CameraError::ThreadSpawn(e.to_string()))?;

        let mut source = Self {
            queue,
            meter,
            running,
            handle: Some(handle),
            done: done_rx,
        };

        match ready_rx.recv_timeout(OPEN_TIMEOUT) {
            Ok(Ok(())) => {
                info!(
                    "Camera {} opened ({}x{} @ {} fps requested)",
                    config.device_id, config.width, config.height, config.fps
                );
                Ok(source)
            }
            Ok(Err(e)) => {
                source.stop(JOIN_TIMEOUT);
                Err(e)
            }
            Err(_) => {
                source.stop(JOIN_TIMEOUT);
                Err(CameraError::OpenFailed(format!(
                    "device {} did not open within {:?}",
                    config.device_id, OPEN_TIMEOUT
                )))
            }
        }
    }

    /// Wait up to `timeout` for the next frame.
    ///
    /// `Timeout` is an ordinary "no frame this tick"; `Disconnected` means
    /// the acquisition loop has ended and no frame will ever arrive.
    pub fn next_frame(&self, timeout: Duration) -> Result<Frame, CameraError> {
        self.queue.pop_timeout(timeout).map_err(|e| match e {
            PopError::Timeout => CameraError::Timeout,
            PopError::Closed => CameraError::Disconnected,
        })
    }

    /// Frame rate over the last second, as seen by the acquisition thread.
    pub fn measured_fps(&self) -> f32 {
        self.meter.lock().fps(Instant::now())
    }

    pub fn dropped_frames(&self) -> u64 {
        self.queue.dropped()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire) && !self.queue.is_closed()
    }

    /// Signal the acquisition thread to exit and join it, waiting at most
    /// `join_timeout`.  Returns `false` if the thread did not finish in
    /// time; it is then detached and releases the camera when its current
    /// read returns.
    pub fn stop(&mut self, join_timeout: Duration) -> bool {
        self.running.store(false, Ordering::Release);
        let Some(handle) = self.handle.take() else {
            return true;
        };
        match self.done.recv_timeout(join_timeout) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                if handle.join().is_err() {
                    error!("Acquisition thread panicked");
                }
                true
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                warn!("Acquisition thread did not stop within {join_timeout:?}; detaching");
                false
            }
        }
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.stop(JOIN_TIMEOUT);
    }
}

// ───────────────────────────────────────────────────────────────
// Acquisition loop
// ───────────────────────────────────────────────────────────────

struct Acquisition {
    queue: Arc<FrameQueue<Frame>>,
    meter: Arc<Mutex<FpsMeter>>,
    running: Arc<AtomicBool>,
    max_failures: u32,
}

impl Acquisition {
    fn run(&self, camera: &mut impl CameraPort) {
        let mut sequence = 0u64;
        let mut failures = 0u32;

        while self.running.load(Ordering::Acquire) {
            match camera.read_frame() {
                Ok(image) => {
                    failures = 0;
                    sequence += 1;
                    let now = Instant::now();
                    self.meter.lock().record(now);
                    if let Some(stale) = self.queue.push(Frame::new(image, now, sequence)) {
                        debug!("Frame queue full, dropped frame #{}", stale.sequence);
                    }
                }
                Err(e) => {
                    failures += 1;
                    if failures >= self.max_failures {
                        error!("Camera lost after {failures} consecutive read failures: {e}");
                        break;
                    }
                    warn!("Camera read failed ({failures}/{}): {e}", self.max_failures);
                    thread::sleep(READ_BACKOFF);
                }
            }
        }
        self.queue.close();
    }
}
