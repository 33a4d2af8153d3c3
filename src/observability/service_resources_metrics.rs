use crate::observability::metrics::get_metrics;
use anyhow::{anyhow, Result};
use chrono::Utc;
use std::time::Duration;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tokio::time::sleep;

const SAMPLE_INTERVAL: Duration = Duration::from_secs(5);

/// Samples this process' cpu, memory and fd usage into the metrics registry.
/// Returns immediately when metrics are disabled.
pub async fn collect_process_metrics(is_metrics_enabled: bool) -> Result<()> {
    if !is_metrics_enabled {
        return Ok(());
    }
    let metrics = get_metrics();
    let pid = sysinfo::get_current_pid().map_err(|e| anyhow!("cannot resolve own pid: {}", e))?;
    let mut sys = System::new();

    let started_at = Utc::now().timestamp();
    metrics.process_start_time.set(started_at);

    loop {
        sample(&mut sys, pid);
        metrics.process_uptime.set(Utc::now().timestamp() - started_at);
        sleep(SAMPLE_INTERVAL).await;
    }
}

fn sample(sys: &mut System, pid: Pid) {
    let metrics = get_metrics();
    sys.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        false,
        ProcessRefreshKind::nothing().with_cpu().with_memory(),
    );

    let Some(process) = sys.process(pid) else {
        return;
    };
    // % over the last sample interval
    metrics.process_cpu_usage.set(process.cpu_usage().into());
    metrics.process_memory_usage.set(process.memory() as i64);

    #[cfg(target_family = "unix")]
    if let Ok(entries) = std::fs::read_dir(format!("/proc/{}/fd", pid.as_u32())) {
        metrics.process_open_fds.set(entries.count() as i64);
    }
}
