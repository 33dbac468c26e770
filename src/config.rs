use std::{env, path::PathBuf, time::Duration};

/// Mission-wide settings: defaults, overridable through the environment.
#[derive(Debug, Clone)]
pub struct MissionConfig {
    /// Address the ground-link listener binds to.
    pub ground_addr: String,
    /// Where phase reports and health artifacts are written.
    pub report_dir: PathBuf,
    /// Interval between `is_ready` attempts during the handshake.
    pub ready_retry: Duration,
    /// Receive timeout of one choreography or main-loop iteration.
    pub poll_interval: Duration,
    /// Bound for replies to synchronous commands.
    pub reply_timeout: Duration,
    /// Watchdog bound of phases 1 and 2.
    pub phase_watchdog: Duration,
    /// Watchdog bound of every phase-3 sub-phase.
    pub phase3_watchdog: Duration,
    pub sample_interval: Duration,
    pub sample_count: usize,
    /// Range at which 3c counts as docked.
    pub dock_distance_cm: f64,
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self {
            ground_addr: "0.0.0.0:8000".to_string(),
            report_dir: PathBuf::from("./reports"),
            ready_retry: Duration::from_secs(1),
            poll_interval: Duration::from_millis(100),
            reply_timeout: Duration::from_secs(5),
            phase_watchdog: Duration::from_secs(600),
            phase3_watchdog: Duration::from_secs(300),
            sample_interval: Duration::from_secs(1),
            sample_count: 10,
            dock_distance_cm: 10.0,
        }
    }
}

impl MissionConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(addr) = env::var("VECTOR_GROUND_ADDR") {
            config.ground_addr = addr;
        }
        if let Ok(dir) = env::var("VECTOR_REPORT_DIR") {
            config.report_dir = PathBuf::from(dir);
        }
        let watchdog = env::var("VECTOR_PHASE3_WATCHDOG_SECS").ok().and_then(|s| s.parse().ok());
        if let Some(secs) = watchdog {
            config.phase3_watchdog = Duration::from_secs(secs);
        }
        config
    }
}
