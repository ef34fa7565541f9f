//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use pointflow::config::ResolutionConfig;
use pointflow::{EngineConfig, PointEngine};
use std::time::{Duration, Instant};

/// Create a test timeout duration
pub fn test_timeout() -> Duration {
    Duration::from_secs(2)
}

/// Engine with a fast resolution poll so tests don't wait long
pub fn test_engine() -> PointEngine {
    let config = EngineConfig {
        resolution: ResolutionConfig {
            poll_interval_ms: 20,
        },
        ..EngineConfig::default()
    };
    PointEngine::new(config).expect("engine should start")
}

/// Poll `condition` until it holds or the timeout elapses
pub fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + test_timeout();
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    condition()
}
