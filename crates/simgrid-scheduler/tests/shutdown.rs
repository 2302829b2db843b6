//! terminate_all against a real engine process.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use simgrid_core::config::SchedulerSettings;
use simgrid_core::{InputParams, Job};
use simgrid_device::{DeviceMonitor, DeviceResult, MemorySource};
use simgrid_engine::CommandEngine;
use simgrid_scheduler::{JobStatus, RunOutcome, SimulationManager};

struct RoomyDevice;

#[async_trait]
impl MemorySource for RoomyDevice {
    async fn free_memory(&self) -> DeviceResult<Vec<f64>> {
        Ok(vec![24_000.0])
    }
}

/// Zero-step runs report a footprint; real runs record their pid in the bundle
/// and sleep far longer than the test.
fn sleepy_engine() -> CommandEngine {
    let script = r#"if grep -q '^steps = 0$' "$0"; then echo 'memory: 64' >&2; else echo $$ > engine.pid; exec sleep 300; fi"#;
    CommandEngine::new("sh").with_args(vec!["-c".to_string(), script.to_string()])
}

/// Alive means present in /proc and not a zombie.
fn is_alive(pid: u32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat
            .rsplit_once(") ")
            .is_some_and(|(_, rest)| !rest.starts_with('Z')),
        Err(_) => false,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn terminate_all_kills_running_engines() {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("long");
    std::fs::create_dir_all(&dir).unwrap();
    let job = Job::from_input(&dir, InputParams::default()).unwrap();

    let settings = SchedulerSettings {
        slots: 1,
        headroom_interval: Duration::from_millis(50),
        drain_interval: Duration::from_millis(50),
        ..SchedulerSettings::default()
    };
    let mgr = SimulationManager::new(
        settings,
        DeviceMonitor::most_free(Arc::new(RoomyDevice)),
        Arc::new(sleepy_engine()),
    );
    let id = mgr.submit(job);

    let RunOutcome::Started(handle) = mgr.run(false).await.unwrap() else {
        panic!("non-blocking run should return a handle");
    };

    let running = tokio::time::timeout(Duration::from_secs(10), async {
        while mgr.tracker().status(id) != Some(JobStatus::Running) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(running.is_ok(), "job never started");
    assert_eq!(mgr.tracker().get(id).unwrap().measured_memory_mib, Some(64.0));

    let pid_file = dir.join("engine.pid");
    let pid = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let Some(pid) = std::fs::read_to_string(&pid_file)
                .ok()
                .and_then(|s| s.trim().parse::<u32>().ok())
            {
                return pid;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("engine never wrote its pid");
    assert!(is_alive(pid));

    mgr.terminate_all();
    let summary = tokio::time::timeout(Duration::from_secs(10), handle.wait())
        .await
        .expect("terminate_all should stop the run promptly")
        .unwrap();

    assert_eq!(summary.cancelled, 1);
    assert_eq!(mgr.running(), 0);
    assert!(!dir.join("log.log").exists());

    let gone = tokio::time::timeout(Duration::from_secs(5), async {
        while is_alive(pid) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(gone.is_ok(), "engine process {pid} survived terminate_all");
}
