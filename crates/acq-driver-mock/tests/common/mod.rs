//! Shared helpers for the mock-driver integration tests.

use acq_core::{AcqConfig, FrameShape};
use acq_driver_mock::{MockCamera, MockCameraConfig};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Install a test subscriber so `RUST_LOG` controls tracing output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Small, fast sensor for integration tests.
pub fn mock_camera(width: u32, height: u32, period: Duration) -> Arc<MockCamera> {
    Arc::new(MockCamera::with_config(MockCameraConfig {
        width,
        height,
        frame_period: period,
        ..MockCameraConfig::default()
    }))
}

/// Acquisition config with short timeouts suited to test periods.
pub fn acq_config(buffer_count: usize, overflow_margin: usize) -> AcqConfig {
    AcqConfig {
        buffer_count,
        overflow_margin,
        poll_timeout: Duration::from_millis(20),
        wait_interval: Duration::from_millis(1),
        stop_deadline: Duration::from_secs(5),
    }
}

/// Shape matching a 16-bit mock sensor.
pub fn shape(width: u32, height: u32) -> FrameShape {
    FrameShape {
        width,
        height,
        bytes_per_pixel: 2,
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}
