//! Control operations against a scripted process table

use lantern_core::{
    Error, LogRecord, LogType, Project, Result, ServiceKey, EXIT_FOUND_DEAD, EXIT_KILLED,
};
use lantern_db::{Database, LogSelector};
use lantern_runtime::{ProcessControl, Signal};
use lantern_supervisor::{ServiceState, Supervisor, WaitOutcome, WatchOptions, WatchOutcome};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Process table where pids live until signalled
#[derive(Default)]
struct FakeControl {
    alive: Mutex<HashSet<u32>>,
    denied: HashSet<u32>,
    signals: Mutex<Vec<(u32, Signal)>>,
}

impl FakeControl {
    fn with_alive(pids: &[u32]) -> Self {
        Self {
            alive: Mutex::new(pids.iter().copied().collect()),
            ..Default::default()
        }
    }

    fn deny(mut self, pid: u32) -> Self {
        self.denied.insert(pid);
        self
    }

    fn signals(&self) -> Vec<(u32, Signal)> {
        self.signals.lock().unwrap().clone()
    }
}

impl ProcessControl for FakeControl {
    fn is_alive(&self, pid: u32) -> bool {
        self.alive.lock().unwrap().contains(&pid)
    }

    fn signal(&self, pid: u32, signal: Signal) -> Result<bool> {
        if self.denied.contains(&pid) {
            return Err(Error::PermissionDenied(format!("cannot signal {}", pid)));
        }
        self.signals.lock().unwrap().push((pid, signal));
        if signal == Signal::SIGUSR1 {
            return Ok(self.is_alive(pid));
        }
        Ok(self.alive.lock().unwrap().remove(&pid))
    }

    fn kill_tree(&self, pid: u32, signal: Signal) -> Result<bool> {
        self.signal(pid, signal)
    }
}

struct Fixture {
    dir: TempDir,
    db: Database,
    control: Arc<FakeControl>,
    supervisor: Supervisor,
}

async fn fixture(control: FakeControl) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(&dir.path().join("test.db")).await.unwrap();
    let control = Arc::new(control);
    let supervisor = Supervisor::new(db.clone(), control.clone(), "lantern-wrapper".into())
        .with_kill_grace(Duration::from_millis(20), Duration::from_millis(10));
    Fixture {
        dir,
        db,
        control,
        supervisor,
    }
}

impl Fixture {
    fn key(&self, name: &str) -> ServiceKey {
        ServiceKey::new(name, self.dir.path())
    }

    /// Running record with its pids already reported
    async fn launched(&self, key: &ServiceKey, pid: u32, wrapper_pid: Option<u32>) -> i64 {
        let processes = self.db.processes();
        let id = processes
            .create(key, "npm run dev", self.dir.path(), None)
            .await
            .unwrap();
        processes.update_pid(id, pid).await.unwrap();
        if let Some(wrapper_pid) = wrapper_pid {
            processes.update_wrapper_pid(id, wrapper_pid).await.unwrap();
        }
        id
    }

    async fn log(&self, id: i64, key: &ServiceKey, line: i64, content: &str, log_type: LogType) {
        self.db
            .logs()
            .append(id, key, line, content, log_type)
            .await
            .unwrap();
    }

    async fn exit_code(&self, id: i64) -> (bool, Option<i32>) {
        let record = self.db.processes().get(id).await.unwrap().unwrap();
        (record.is_running, record.exit_code)
    }
}

#[tokio::test]
async fn kill_all_sorts_processes_into_buckets() {
    let f = fixture(FakeControl::with_alive(&[101, 103]).deny(103)).await;
    let live = f.launched(&f.key("web"), 101, None).await;
    let dead = f.launched(&f.key("api"), 102, None).await;
    let stubborn = f.launched(&f.key("worker"), 103, None).await;

    let report = f.supervisor.kill_all().await.unwrap();

    assert_eq!(report.summary.total_found, 3);
    assert_eq!(report.summary.killed, 1);
    assert_eq!(report.summary.already_dead, 1);
    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.killed[0].launch_id, live);
    assert_eq!(report.already_dead[0].launch_id, dead);
    assert_eq!(report.failed[0].record.launch_id, stubborn);
    assert!(report.failed[0].error.contains("cannot signal 103"));
    assert!(report.message.is_none());

    assert_eq!(f.exit_code(live).await, (false, Some(EXIT_KILLED)));
    assert_eq!(f.exit_code(dead).await, (false, Some(EXIT_FOUND_DEAD)));
    assert_eq!(f.exit_code(stubborn).await, (true, None));
    assert!(!f.control.signals().iter().any(|(pid, _)| *pid == 102));
}

#[tokio::test]
async fn kill_all_with_nothing_running() {
    let f = fixture(FakeControl::default()).await;
    let report = f.supervisor.kill_all().await.unwrap();
    assert_eq!(report.summary.total_found, 0);
    assert_eq!(
        report.message.as_deref(),
        Some("No running processes found to kill.")
    );
}

#[tokio::test]
async fn kill_terminates_wrapper_before_child() {
    let f = fixture(FakeControl::with_alive(&[200, 201, 301])).await;
    let web = f.key("web");
    let id = f.launched(&web, 201, Some(200)).await;
    let other = f.launched(&f.key("api"), 301, None).await;

    let output = f.supervisor.kill(&web).await.unwrap();

    assert_eq!(output.killed.len(), 1);
    assert!(output.message.is_none());
    assert_eq!(
        f.control.signals(),
        vec![(200, Signal::SIGTERM), (201, Signal::SIGTERM)]
    );
    assert_eq!(f.exit_code(id).await, (false, Some(EXIT_KILLED)));
    assert_eq!(f.exit_code(other).await, (true, None));
}

#[tokio::test]
async fn kill_escalates_when_terminate_is_ignored() {
    let f = fixture(FakeControl::with_alive(&[401])).await;
    let web = f.key("web");
    f.launched(&web, 401, None).await;

    // A process that survives SIGTERM
    struct Stubborn(FakeControl);
    impl ProcessControl for Stubborn {
        fn is_alive(&self, pid: u32) -> bool {
            self.0.is_alive(pid)
        }
        fn signal(&self, pid: u32, signal: Signal) -> Result<bool> {
            if signal == Signal::SIGTERM {
                self.0.signals.lock().unwrap().push((pid, signal));
                return Ok(true);
            }
            self.0.signal(pid, signal)
        }
        fn kill_tree(&self, pid: u32, signal: Signal) -> Result<bool> {
            self.signal(pid, signal)
        }
    }

    let control = Arc::new(Stubborn(FakeControl::with_alive(&[401])));
    let supervisor = Supervisor::new(f.db.clone(), control.clone(), "lantern-wrapper".into())
        .with_kill_grace(Duration::from_millis(20), Duration::from_millis(10));
    supervisor.kill(&web).await.unwrap();

    assert_eq!(
        control.0.signals(),
        vec![(401, Signal::SIGTERM), (401, Signal::SIGKILL)]
    );
    assert!(!control.is_alive(401));
}

#[tokio::test]
async fn kill_without_match_reports_nothing_to_kill() {
    let f = fixture(FakeControl::default()).await;
    let web = f.key("web");
    let output = f.supervisor.kill(&web).await.unwrap();
    assert!(output.killed.is_empty());
    assert_eq!(
        output.message.unwrap(),
        format!(
            "No running processes found for service 'web' in project '{}'",
            f.dir.path().display()
        )
    );
}

#[tokio::test]
async fn sweep_marks_dead_records_and_spares_launching_ones() {
    let f = fixture(FakeControl::with_alive(&[501])).await;
    let dead = f.launched(&f.key("web"), 500, None).await;
    let wrapper_only = f.launched(&f.key("api"), 502, Some(501)).await;
    let launching = f
        .db
        .processes()
        .create(&f.key("worker"), "cargo run", f.dir.path(), None)
        .await
        .unwrap();

    let running = f.supervisor.list_running(None).await.unwrap();
    let ids: HashSet<i64> = running.iter().map(|r| r.launch_id).collect();

    assert_eq!(ids, HashSet::from([wrapper_only, launching]));
    assert_eq!(f.exit_code(dead).await, (false, Some(EXIT_FOUND_DEAD)));
}

#[tokio::test]
async fn list_services_reports_running_and_stopped() {
    let f = fixture(FakeControl::with_alive(&[601])).await;
    std::fs::write(
        f.dir.path().join(".lantern-setup.json"),
        r#"{"services":[{"name":"web","shell":"npm run dev","default":true},{"name":"api","shell":"cargo run","root":"api"}]}"#,
    )
    .unwrap();
    let project = Project::discover(f.dir.path()).unwrap();

    let web = project.resolve(Some("web")).unwrap().key();
    f.launched(&web, 601, None).await;

    let statuses = f.supervisor.list_services(&project).await.unwrap();
    assert_eq!(statuses.len(), 2);
    assert_eq!(statuses[0].name, "web");
    assert_eq!(statuses[0].state, ServiceState::Running);
    assert_eq!(statuses[0].record.as_ref().unwrap().pid, 601);
    assert_eq!(statuses[1].name, "api");
    assert_eq!(statuses[1].state, ServiceState::Stopped);
    assert!(statuses[1].record.is_none());
    assert_eq!(statuses[1].cwd, project.project_dir.join("api"));
}

#[tokio::test]
async fn in_place_restart_signals_the_wrapper() {
    let f = fixture(FakeControl::with_alive(&[700, 701])).await;
    let web = f.key("web");
    f.launched(&web, 701, Some(700)).await;

    let record = f.supervisor.signal_restart(&web).await.unwrap();
    assert_eq!(record.wrapper_pid, Some(700));
    assert_eq!(f.control.signals(), vec![(700, Signal::SIGUSR1)]);

    let missing = f.supervisor.signal_restart(&f.key("api")).await;
    assert!(matches!(missing, Err(Error::ProcessNotFound(_))));
}

#[tokio::test]
async fn assign_port_rejects_a_port_held_elsewhere() {
    let f = fixture(FakeControl::with_alive(&[801])).await;
    let other = tempfile::tempdir().unwrap();
    let key = ServiceKey::new("web", other.path());
    let id = f
        .db
        .processes()
        .create(&key, "npm run dev", other.path(), Some(3500))
        .await
        .unwrap();
    f.db.processes().update_pid(id, 801).await.unwrap();

    let held = f.supervisor.assign_port(f.dir.path(), 3500).await;
    assert!(matches!(held, Err(Error::PortUnavailable(3500))));

    f.supervisor.assign_port(f.dir.path(), 3501).await.unwrap();
    assert_eq!(f.db.ports().get(f.dir.path()).await.unwrap(), Some(3501));
}

async fn wait(f: &Fixture, key: &ServiceKey, message: &str) -> WaitOutcome {
    f.supervisor
        .wait_for_log(
            key,
            message,
            Duration::from_secs(3),
            Duration::from_millis(20),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn wait_for_log_needs_a_started_process() {
    let f = fixture(FakeControl::default()).await;
    assert_eq!(wait(&f, &f.key("web"), "ready").await, WaitOutcome::NotStarted);
}

#[tokio::test]
async fn wait_for_log_finds_existing_and_new_lines() {
    let f = fixture(FakeControl::with_alive(&[901])).await;
    let web = f.key("web");
    let id = f.launched(&web, 901, None).await;
    f.log(id, &web, 1, "Process started (pid 901)", LogType::ProcessStarted)
        .await;
    f.log(id, &web, 2, "compiling", LogType::Stdout).await;

    match wait(&f, &web, "compiling").await {
        WaitOutcome::Found { line } => assert_eq!(line.line_number, 2),
        other => panic!("unexpected {:?}", other),
    }

    let db = f.db.clone();
    let later = web.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        db.logs()
            .append(id, &later, 3, "listening on :3000", LogType::Stdout)
            .await
            .unwrap();
    });
    match wait(&f, &web, "listening").await {
        WaitOutcome::Found { line } => assert_eq!(line.content, "listening on :3000"),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn wait_for_log_stops_when_the_process_exits() {
    let f = fixture(FakeControl::with_alive(&[902])).await;
    let web = f.key("web");
    let id = f.launched(&web, 902, None).await;
    f.log(id, &web, 1, "Process started (pid 902)", LogType::ProcessStarted)
        .await;
    f.log(id, &web, 2, "Process exited with code 2", LogType::ProcessExited)
        .await;

    assert_eq!(
        wait(&f, &web, "ready").await,
        WaitOutcome::Exited { exit_code: Some(2) }
    );
}

#[tokio::test]
async fn wait_for_log_searches_a_launch_longer_than_the_tail() {
    let f = fixture(FakeControl::with_alive(&[903])).await;
    let web = f.key("web");
    let id = f.launched(&web, 903, None).await;
    f.log(id, &web, 1, "Process started (pid 903)", LogType::ProcessStarted)
        .await;
    f.log(id, &web, 2, "compiled in 2s", LogType::Stdout).await;
    for line in 3..=1003 {
        f.log(id, &web, line, "GET /health 200", LogType::Stdout)
            .await;
    }

    match wait(&f, &web, "compiled").await {
        WaitOutcome::Found { line } => assert_eq!(line.line_number, 2),
        other => panic!("unexpected {:?}", other),
    }

    let db = f.db.clone();
    let later = web.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        db.logs()
            .append(id, &later, 1004, "ready on :3000", LogType::Stdout)
            .await
            .unwrap();
    });
    match wait(&f, &web, "ready on").await {
        WaitOutcome::Found { line } => assert_eq!(line.line_number, 1004),
        other => panic!("unexpected {:?}", other),
    }
}

fn fast_watch() -> WatchOptions {
    WatchOptions {
        poll_interval: Duration::from_millis(20),
        exit_after: Some(Duration::from_secs(5)),
        initial_limit: 2,
    }
}

#[tokio::test]
async fn watch_follows_until_the_process_stops() {
    let f = fixture(FakeControl::with_alive(&[1001])).await;
    let web = f.key("web");
    let id = f.launched(&web, 1001, None).await;
    for line in 1..=3 {
        f.log(id, &web, line, &format!("line {}", line), LogType::Stdout)
            .await;
    }

    let db = f.db.clone();
    let later = web.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        db.logs()
            .append(id, &later, 4, "line 4", LogType::Stdout)
            .await
            .unwrap();
        db.processes().mark_exited(id, 0).await.unwrap();
    });

    let mut seen: Vec<LogRecord> = Vec::new();
    let outcome = f
        .supervisor
        .watch(
            LogSelector::Service(web),
            fast_watch(),
            |rows| seen.extend_from_slice(rows),
            std::future::pending(),
        )
        .await
        .unwrap();

    assert_eq!(outcome, WatchOutcome::Stopped { exit_code: Some(0) });
    let lines: Vec<_> = seen.iter().map(|r| r.content.as_str()).collect();
    assert_eq!(lines, ["line 2", "line 3", "line 4"]);
    assert_eq!(
        outcome.describe("web"),
        "Process 'web' has stopped: completed successfully"
    );
}

#[tokio::test]
async fn interrupted_watch_leaves_the_process_running() {
    let f = fixture(FakeControl::with_alive(&[1101])).await;
    let web = f.key("web");
    let id = f.launched(&web, 1101, None).await;

    let outcome = f
        .supervisor
        .watch(
            LogSelector::Launch(id),
            fast_watch(),
            |_| {},
            tokio::time::sleep(Duration::from_millis(80)),
        )
        .await
        .unwrap();

    assert_eq!(outcome, WatchOutcome::Interrupted);
    assert_eq!(
        outcome.describe("web"),
        "Stopped watching, process is still running in background"
    );
    assert_eq!(f.exit_code(id).await, (true, None));
    assert!(f.control.signals().is_empty());
}

#[tokio::test]
async fn watch_reports_a_missing_record() {
    let f = fixture(FakeControl::default()).await;
    let outcome = f
        .supervisor
        .watch(
            LogSelector::Launch(42),
            fast_watch(),
            |_| {},
            std::future::pending(),
        )
        .await
        .unwrap();
    assert_eq!(outcome, WatchOutcome::Disappeared);
}

#[tokio::test]
async fn watch_gives_up_after_exit_after() {
    let f = fixture(FakeControl::with_alive(&[1201])).await;
    let web = f.key("web");
    let id = f.launched(&web, 1201, None).await;

    let options = WatchOptions {
        exit_after: Some(Duration::from_millis(50)),
        ..fast_watch()
    };
    let outcome = f
        .supervisor
        .watch(
            LogSelector::Service(web),
            options,
            |_| {},
            std::future::pending(),
        )
        .await
        .unwrap();

    assert_eq!(outcome, WatchOutcome::TimedOut);
    assert_eq!(
        outcome.describe("web"),
        "Stopped watching, process is still running in background"
    );
    assert_eq!(f.exit_code(id).await, (true, None));
    assert!(f.control.signals().is_empty());
}
