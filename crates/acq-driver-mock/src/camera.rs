//! Mock camera adapter with polling and callback delivery.
//!
//! Simulates the driver side of the acquisition contract: buffers are
//! queued, a frame "completes" every `frame_period`, and the completion is
//! reported either through [`PollWaiter::wait_buffer`] or through a
//! registered callback invoked from the mock's own hardware thread (the
//! same foreign-thread situation a real SDK callback creates). Running out
//! of armed buffers reports a hardware overflow, and `fail_after` injects a
//! terminal driver fault for error-path tests.

use crate::pattern::generate_test_pattern;
use acq_core::{
    AdapterError, AdapterErrorKind, CallbackEvent, CallbackRegistrar, CameraAdapter,
    FrameCallback, PollEvent, PollWaiter, RawSlot,
};
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

const ADAPTER_NAME: &str = "mock_camera";

/// Configuration for the mock camera.
#[derive(Debug, Clone, Deserialize)]
pub struct MockCameraConfig {
    /// Frame width in pixels (default: 640)
    #[serde(default = "default_width")]
    pub width: u32,

    /// Frame height in pixels (default: 480)
    #[serde(default = "default_height")]
    pub height: u32,

    /// Interval between simulated frame completions (default: 10ms)
    #[serde(default = "default_frame_period", with = "humantime_serde")]
    pub frame_period: Duration,

    /// Report a terminal hardware fault after this many frames.
    #[serde(default)]
    pub fail_after: Option<u64>,

    /// Maximum buffers the mock accepts in flight, if limited.
    #[serde(default)]
    pub queue_limit: Option<usize>,
}

fn default_width() -> u32 {
    640
}
fn default_height() -> u32 {
    480
}
fn default_frame_period() -> Duration {
    Duration::from_millis(10)
}

impl Default for MockCameraConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            frame_period: default_frame_period(),
            fail_after: None,
            queue_limit: None,
        }
    }
}

struct MockState {
    configured_bytes: Option<usize>,
    capturing: bool,
    armed: VecDeque<RawSlot>,
    frames_emitted: u64,
    next_due: Option<Instant>,
    callback: Option<FrameCallback>,
    hw_thread: Option<thread::JoinHandle<()>>,
}

/// Simulated camera implementing the full adapter surface.
pub struct MockCamera {
    config: MockCameraConfig,
    inner: Arc<Mutex<MockState>>,
}

impl MockCamera {
    /// Create a mock camera with the given configuration.
    #[must_use]
    pub fn with_config(config: MockCameraConfig) -> Self {
        Self {
            config,
            inner: Arc::new(Mutex::new(MockState {
                configured_bytes: None,
                capturing: false,
                armed: VecDeque::new(),
                frames_emitted: 0,
                next_due: None,
                callback: None,
                hw_thread: None,
            })),
        }
    }

    /// Create a mock camera with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(MockCameraConfig::default())
    }

    /// Frames the simulated sensor has completed so far.
    #[must_use]
    pub fn frames_emitted(&self) -> u64 {
        self.inner.lock().frames_emitted
    }

    fn frame_bytes(&self) -> usize {
        self.config.width as usize * self.config.height as usize * 2
    }

    fn injected_fault(&self) -> AdapterError {
        AdapterError::new(
            ADAPTER_NAME,
            AdapterErrorKind::Hardware,
            format!(
                "injected fault after {} frames",
                self.config.fail_after.unwrap_or(0)
            ),
        )
    }

    /// Write the next test-pattern frame into an armed buffer.
    #[allow(unsafe_code)]
    fn fill_slot(raw: &RawSlot, width: u32, height: u32, frame_number: u64) {
        let pattern = generate_test_pattern(width, height, frame_number);
        let pixel_count = (raw.len / 2).min(pattern.len());
        // SAFETY: the pointer targets a queued ring slot of raw.len bytes;
        // the slot is driver-owned until this completion is reported.
        let dst = unsafe { std::slice::from_raw_parts_mut(raw.ptr, raw.len) };
        for (i, px) in pattern.iter().enumerate().take(pixel_count) {
            let [lo, hi] = px.to_le_bytes();
            dst[i * 2] = lo;
            dst[i * 2 + 1] = hi;
        }
    }

    fn hw_loop(inner: &Arc<Mutex<MockState>>, config: &MockCameraConfig) {
        debug!("mock hardware thread started");
        loop {
            {
                let mut state = inner.lock();
                if !state.capturing {
                    break;
                }
                let now = Instant::now();
                let due = state.next_due.unwrap_or(now);
                if due <= now {
                    state.next_due = Some(due + config.frame_period);

                    if let Some(limit) = config.fail_after {
                        if state.frames_emitted >= limit {
                            let fault = CallbackEvent::Fault(AdapterError::new(
                                ADAPTER_NAME,
                                AdapterErrorKind::Hardware,
                                format!("injected fault after {} frames", limit),
                            ));
                            if let Some(callback) = state.callback.as_mut() {
                                callback(fault);
                            }
                            break;
                        }
                    }

                    let event = match state.armed.pop_front() {
                        Some(raw) => {
                            let frame_number = state.frames_emitted;
                            Self::fill_slot(&raw, config.width, config.height, frame_number);
                            state.frames_emitted += 1;
                            CallbackEvent::Frame { slot: raw.slot }
                        }
                        None => CallbackEvent::Overflow,
                    };
                    if let Some(callback) = state.callback.as_mut() {
                        callback(event);
                    }
                    continue;
                }
            }
            thread::sleep(Duration::from_micros(500));
        }
        debug!("mock hardware thread exited");
    }
}

impl Default for MockCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraAdapter for MockCamera {
    fn name(&self) -> &str {
        ADAPTER_NAME
    }

    fn configure(&self, _frame_bytes: usize) -> Result<usize, AdapterError> {
        // The sensor geometry decides the real frame size; the core is
        // responsible for noticing a disagreement.
        let actual = self.frame_bytes();
        self.inner.lock().configured_bytes = Some(actual);
        Ok(actual)
    }

    fn queue_limit(&self) -> Option<usize> {
        self.config.queue_limit
    }

    fn queue_buffer(&self, slot: RawSlot) -> Result<(), AdapterError> {
        let mut state = self.inner.lock();
        let Some(expected) = state.configured_bytes else {
            return Err(AdapterError::new(
                ADAPTER_NAME,
                AdapterErrorKind::Configuration,
                "queue_buffer before configure",
            ));
        };
        if slot.len != expected {
            return Err(AdapterError::new(
                ADAPTER_NAME,
                AdapterErrorKind::Configuration,
                format!("buffer is {} bytes, frames are {}", slot.len, expected),
            ));
        }
        if let Some(limit) = self.config.queue_limit {
            if state.armed.len() >= limit {
                return Err(AdapterError::new(
                    ADAPTER_NAME,
                    AdapterErrorKind::Configuration,
                    format!("driver accepts at most {} buffers in flight", limit),
                ));
            }
        }
        state.armed.push_back(slot);
        Ok(())
    }

    fn start_capture(&self) -> Result<(), AdapterError> {
        let mut state = self.inner.lock();
        if state.capturing {
            return Err(AdapterError::new(
                ADAPTER_NAME,
                AdapterErrorKind::Capture,
                "capture already running",
            ));
        }
        state.capturing = true;
        state.frames_emitted = 0;
        state.next_due = Some(Instant::now() + self.config.frame_period);

        if state.callback.is_some() {
            // Callback delivery runs on the mock's own "hardware" thread.
            let inner = Arc::clone(&self.inner);
            let config = self.config.clone();
            state.hw_thread = Some(
                thread::Builder::new()
                    .name("mock-cam-hw".to_string())
                    .spawn(move || MockCamera::hw_loop(&inner, &config))
                    .map_err(|err| {
                        AdapterError::new(
                            ADAPTER_NAME,
                            AdapterErrorKind::Capture,
                            format!("failed to spawn hardware thread: {}", err),
                        )
                    })?,
            );
        }
        Ok(())
    }

    fn stop_capture(&self) -> Result<(), AdapterError> {
        let handle = {
            let mut state = self.inner.lock();
            state.capturing = false;
            state.armed.clear();
            state.next_due = None;
            state.hw_thread.take()
        };
        if let Some(handle) = handle {
            let _ = handle.join();
        }
        Ok(())
    }
}

impl PollWaiter for MockCamera {
    fn wait_buffer(&self, timeout: Duration) -> Result<PollEvent, AdapterError> {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut state = self.inner.lock();
                if !state.capturing {
                    return Ok(PollEvent::WouldBlock);
                }
                if let Some(limit) = self.config.fail_after {
                    if state.frames_emitted >= limit {
                        return Err(self.injected_fault());
                    }
                }
                let now = Instant::now();
                let due = state.next_due.unwrap_or(now);
                if due <= now {
                    state.next_due = Some(due + self.config.frame_period);
                    return Ok(match state.armed.pop_front() {
                        Some(raw) => {
                            let frame_number = state.frames_emitted;
                            Self::fill_slot(
                                &raw,
                                self.config.width,
                                self.config.height,
                                frame_number,
                            );
                            state.frames_emitted += 1;
                            PollEvent::Frame { slot: raw.slot }
                        }
                        None => PollEvent::Overflow,
                    });
                }
            }
            if Instant::now() >= deadline {
                return Ok(PollEvent::WouldBlock);
            }
            thread::sleep(Duration::from_micros(500));
        }
    }
}

impl CallbackRegistrar for MockCamera {
    fn register_frame_callback(&self, callback: FrameCallback) -> Result<(), AdapterError> {
        self.inner.lock().callback = Some(callback);
        Ok(())
    }

    fn unregister_frame_callback(&self) -> Result<(), AdapterError> {
        self.inner.lock().callback = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_camera(period: Duration) -> MockCamera {
        MockCamera::with_config(MockCameraConfig {
            width: 4,
            height: 2,
            frame_period: period,
            ..MockCameraConfig::default()
        })
    }

    fn slot_for(buffer: &mut [u8], slot: usize) -> RawSlot {
        RawSlot {
            slot,
            ptr: buffer.as_mut_ptr(),
            len: buffer.len(),
        }
    }

    #[test]
    fn configure_reports_the_sensor_frame_size() {
        let camera = small_camera(Duration::from_millis(1));
        let reported = camera.configure(999).expect("configure");
        assert_eq!(reported, 4 * 2 * 2, "16-bit 4x2 sensor");
    }

    #[test]
    fn queue_buffer_rejects_wrong_sizes() {
        let camera = small_camera(Duration::from_millis(1));
        camera.configure(16).expect("configure");

        let mut wrong = vec![0u8; 8];
        let err = camera.queue_buffer(slot_for(&mut wrong, 0));
        assert!(err.is_err(), "8-byte buffer for 16-byte frames");

        let mut right = vec![0u8; 16];
        camera
            .queue_buffer(slot_for(&mut right, 0))
            .expect("correctly sized buffer");
    }

    #[test]
    fn wait_buffer_emits_a_pattern_frame() {
        let camera = small_camera(Duration::from_millis(2));
        camera.configure(16).expect("configure");

        let mut buffer = vec![0u8; 16];
        camera
            .queue_buffer(slot_for(&mut buffer, 3))
            .expect("queue");
        camera.start_capture().expect("start");

        let event = camera
            .wait_buffer(Duration::from_secs(5))
            .expect("wait should not fault");
        assert_eq!(event, PollEvent::Frame { slot: 3 });

        // Frame 0's marker pixels are zero, but the body carries the ramp.
        assert!(buffer[4..].iter().any(|&b| b != 0), "pattern was written");
        camera.stop_capture().expect("stop");
    }

    #[test]
    fn starving_the_mock_reports_overflow() {
        let camera = small_camera(Duration::from_millis(2));
        camera.configure(16).expect("configure");
        camera.start_capture().expect("start");

        // No buffers armed: the next tick overflows.
        let event = camera
            .wait_buffer(Duration::from_secs(5))
            .expect("wait should not fault");
        assert_eq!(event, PollEvent::Overflow);
        camera.stop_capture().expect("stop");
    }

    #[test]
    fn fail_after_injects_a_hardware_fault() {
        let camera = MockCamera::with_config(MockCameraConfig {
            width: 4,
            height: 2,
            frame_period: Duration::from_millis(1),
            fail_after: Some(0),
            ..MockCameraConfig::default()
        });
        camera.configure(16).expect("configure");
        camera.start_capture().expect("start");

        let err = camera.wait_buffer(Duration::from_millis(50));
        match err {
            Err(fault) => assert_eq!(fault.kind, AdapterErrorKind::Hardware),
            Ok(event) => panic!("expected a fault, got {:?}", event),
        }
        camera.stop_capture().expect("stop");
    }

    #[test]
    fn wait_buffer_times_out_between_frames() {
        let camera = small_camera(Duration::from_secs(60));
        camera.configure(16).expect("configure");
        camera.start_capture().expect("start");

        let event = camera
            .wait_buffer(Duration::from_millis(10))
            .expect("wait should not fault");
        assert_eq!(event, PollEvent::WouldBlock);
        camera.stop_capture().expect("stop");
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: MockCameraConfig =
            serde_json::from_str(r#"{"frame_period": "5ms"}"#).expect("parse");
        assert_eq!(config.width, 640);
        assert_eq!(config.height, 480);
        assert_eq!(config.frame_period, Duration::from_millis(5));
        assert!(config.fail_after.is_none());
    }
}
