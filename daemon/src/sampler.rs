use anyhow::{bail, Result};
use sysinfo::{CpuRefreshKind, RefreshKind, System, MINIMUM_CPU_UPDATE_INTERVAL};
use tokio::time::{sleep, Duration};

/// Measures whole-machine CPU utilisation.
///
/// Each call to [`Sampler::sample`] waits for the requested interval and then
/// reports the busy share of that window. The wait is what paces the render
/// loop, so no separate icon timer exists.
pub struct Sampler {
    sys: System,
}

impl Sampler {
    pub fn new() -> Self {
        let mut sys = System::new_with_specifics(
            RefreshKind::new().with_cpu(CpuRefreshKind::new().with_cpu_usage()),
        );
        // Establish the baseline the first window is measured against.
        sys.refresh_cpu_usage();
        Self { sys }
    }

    /// Waits roughly `interval`, then returns the CPU busy percentage in `[0, 100]`
    /// measured since the previous refresh.
    ///
    /// Dropping the future mid-wait is harmless: the next call simply measures
    /// a slightly longer window.
    pub async fn sample(&mut self, interval: Duration) -> Result<u8> {
        sleep(interval.max(MINIMUM_CPU_UPDATE_INTERVAL)).await;
        self.sys.refresh_cpu_usage();
        if self.sys.cpus().is_empty() {
            bail!("CPU usage counters are unavailable");
        }
        Ok(to_percentage(self.sys.global_cpu_usage()))
    }
}

/// Rounds a raw usage reading to the nearest whole percent, clamped to `[0, 100]`.
pub fn to_percentage(raw: f32) -> u8 {
    if !raw.is_finite() {
        return 0;
    }
    raw.round().clamp(0.0, 100.0) as u8
}
