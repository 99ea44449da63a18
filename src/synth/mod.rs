//! Synthesis orchestration
//!
//! Runs the CDK app, loads what it wrote and installs the resulting snapshot. All of
//! this happens on one worker thread that owns its own tokio runtime, fed by a
//! std channel from the LSP loop. Every request carries the generation allocated
//! when it was queued. A newer request kills the run in flight, and requests that
//! pile up meanwhile are coalesced into a single follow-up run.
//!
//! Policy violations make the synthesis command exit non-zero while still writing
//! every artifact, so the exit status is only logged. Whether a run produced
//! anything is decided by the artifact loader.

pub mod errors;
pub mod messages;
pub mod stats;

pub use errors::{SynthError, SynthResult};
pub use messages::{SynthEvent, SynthRequest, SynthTrigger};
pub use stats::{StatsSnapshot, SynthStats};

use crate::{
    assembly::CloudAssembly,
    config::{CdkLspConfig, SynthConfig},
    synthesis::{Synthesis, SynthesisStore},
};
use std::{
    path::{Path, PathBuf},
    process::Stdio,
    sync::{mpsc, Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const PROJECT_MARKER: &str = "cdk.json";

/// Nearest directory at or above `start` holding a `cdk.json`.
pub fn find_project_root(start: &Path) -> SynthResult<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(PROJECT_MARKER).is_file())
        .map(Path::to_path_buf)
        .ok_or_else(|| SynthError::ProjectRootNotFound {
            start: start.to_path_buf(),
        })
}

#[derive(Debug, Clone)]
pub struct SynthOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stderr: String,
    pub duration: Duration,
}

#[derive(Debug, Clone)]
pub struct SynthRunner {
    config: SynthConfig,
}

impl SynthRunner {
    pub fn new(config: SynthConfig) -> Self {
        Self { config }
    }

    pub fn command_args(&self, output_dir: &Path) -> Vec<String> {
        let mut args = self.config.args.clone();
        args.push("--output".to_string());
        args.push(output_dir.to_string_lossy().into_owned());
        args
    }

    pub async fn run(
        &self,
        project_root: &Path,
        output_dir: &Path,
        cancel: &CancellationToken,
        operation_id: Uuid,
    ) -> SynthResult<SynthOutput> {
        clear_output_dir(output_dir).await?;

        let args = self.command_args(output_dir);
        debug!(
            "Running `{} {}` in {:?}",
            self.config.program,
            args.join(" "),
            project_root
        );

        let child = Command::new(&self.config.program)
            .args(&args)
            .envs(&self.config.env)
            .current_dir(project_root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SynthError::SpawnFailed {
                program: self.config.program.clone(),
                source,
            })?;

        let start = Instant::now();
        let timeout = self.config.timeout();

        let output = tokio::select! {
            result = tokio::time::timeout(timeout, child.wait_with_output()) => {
                match result {
                    Ok(output) => output.map_err(|source| SynthError::SpawnFailed {
                        program: self.config.program.clone(),
                        source,
                    })?,
                    Err(_) => {
                        return Err(SynthError::Timeout {
                            project_root: project_root.to_path_buf(),
                            timeout_secs: self.config.timeout_seconds,
                        });
                    }
                }
            }
            _ = cancel.cancelled() => {
                return Err(SynthError::Cancelled { operation_id });
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() {
            warn!(
                "Synthesis exited with {:?}: {}",
                output.status.code(),
                stderr.trim()
            );
        }

        Ok(SynthOutput {
            success: output.status.success(),
            exit_code: output.status.code(),
            stderr,
            duration: start.elapsed(),
        })
    }
}

async fn clear_output_dir(output_dir: &Path) -> SynthResult<()> {
    match tokio::fs::remove_dir_all(output_dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(SynthError::ArtifactIo {
            path: output_dir.to_path_buf(),
            source,
        }),
    }
}

pub type SynthCallback = Box<dyn Fn(SynthEvent) + Send + 'static>;

type InFlight = Arc<Mutex<Option<CancellationToken>>>;

fn lock_in_flight(in_flight: &InFlight) -> MutexGuard<'_, Option<CancellationToken>> {
    in_flight
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Sending side of the synth worker.
///
/// The generation is allocated here, when the request is queued, so a run that is
/// still building can tell it has been overtaken. Queueing also cancels the run in
/// flight: its result would be discarded anyway.
#[derive(Debug, Clone)]
pub struct SynthHandle {
    request_tx: mpsc::Sender<SynthRequest>,
    store: Arc<SynthesisStore>,
    in_flight: InFlight,
    shutdown: CancellationToken,
}

impl SynthHandle {
    pub fn synthesize(&self, trigger: SynthTrigger, document: Option<PathBuf>) -> SynthResult<u64> {
        let generation = self.store.next_generation();

        if let Some(running) = lock_in_flight(&self.in_flight).as_ref() {
            debug!("Generation {} supersedes the run in flight", generation);
            running.cancel();
        }

        self.request_tx
            .send(SynthRequest::Synthesize {
                trigger,
                document,
                generation,
            })
            .map_err(|_| SynthError::WorkerStopped)?;
        Ok(generation)
    }

    /// Kills an in-flight synthesis and stops the worker loop.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        let _ = self.request_tx.send(SynthRequest::Shutdown);
    }
}

pub struct SynthManager {
    config: CdkLspConfig,
    store: Arc<SynthesisStore>,
    stats: SynthStats,
    shutdown: CancellationToken,
    in_flight: InFlight,
    on_event: SynthCallback,
}

impl SynthManager {
    pub fn new(config: CdkLspConfig, store: Arc<SynthesisStore>, on_event: SynthCallback) -> Self {
        Self {
            config,
            store,
            stats: SynthStats::new(),
            shutdown: CancellationToken::new(),
            in_flight: Arc::new(Mutex::new(None)),
            on_event,
        }
    }

    pub fn stats(&self) -> SynthStats {
        self.stats.clone()
    }

    /// Handle feeding the receiver later passed to [`SynthManager::run`].
    pub fn handle(&self, request_tx: mpsc::Sender<SynthRequest>) -> SynthHandle {
        SynthHandle {
            request_tx,
            store: Arc::clone(&self.store),
            in_flight: Arc::clone(&self.in_flight),
            shutdown: self.shutdown.clone(),
        }
    }

    pub fn run(self, request_rx: mpsc::Receiver<SynthRequest>) {
        let rt = match tokio::runtime::Runtime::new() {
            Ok(rt) => rt,
            Err(e) => {
                error!("Failed to create tokio runtime for synthesis: {}", e);
                return;
            }
        };

        rt.block_on(async {
            let runner = SynthRunner::new(self.config.synth.clone());

            loop {
                let request = match request_rx.recv() {
                    Ok(request) => request,
                    Err(_) => {
                        info!("Request channel disconnected, shutting down");
                        break;
                    }
                };

                let Some(pending) = coalesce(request, &request_rx) else {
                    info!("Shutdown requested");
                    self.shutdown.cancel();
                    break;
                };

                if self.shutdown.is_cancelled() {
                    break;
                }

                debug!(
                    "Synthesis generation {} triggered by {}",
                    pending.generation,
                    pending.trigger.as_str()
                );
                self.synthesize(&runner, pending.generation, pending.document)
                    .await;
            }

            let snapshot = self.stats.snapshot();
            info!(
                "SynthManager shutdown complete: {} runs, {} failed, {} superseded, avg {}ms",
                snapshot.total_runs,
                snapshot.failed_runs,
                snapshot.superseded_runs,
                snapshot.average_duration_ms
            );
        });
    }

    async fn synthesize(&self, runner: &SynthRunner, generation: u64, document: Option<PathBuf>) {
        let operation_id = Uuid::new_v4();

        let start = document
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_default();

        let project_root = match find_project_root(&start) {
            Ok(root) => root,
            Err(e) => {
                warn!("Skipping synthesis: {}", e);
                (self.on_event)(SynthEvent::Failed {
                    operation_id,
                    generation,
                    error: e.to_string(),
                });
                return;
            }
        };

        // set before the check: a newer request either cancels this token or is seen
        let cancel = self.shutdown.child_token();
        *lock_in_flight(&self.in_flight) = Some(cancel.clone());
        if self.store.is_superseded(generation) {
            cancel.cancel();
        }

        info!(
            "Starting synthesis {} (generation {}) in {:?}",
            operation_id, generation, project_root
        );
        self.stats.synth_started();
        (self.on_event)(SynthEvent::Started {
            operation_id,
            generation,
            project_root: project_root.clone(),
        });

        let started = Instant::now();
        let result = self
            .build(runner, &project_root, generation, operation_id, &cancel)
            .await;
        *lock_in_flight(&self.in_flight) = None;

        match result {
            Ok(Some(synthesis)) => {
                let duration = started.elapsed();
                if self.store.install(Arc::clone(&synthesis)) {
                    self.stats.synth_completed(duration);
                    (self.on_event)(SynthEvent::Installed {
                        operation_id,
                        synthesis,
                        duration_ms: duration.as_millis() as u64,
                    });
                } else {
                    self.superseded(operation_id, generation);
                }
            }
            Ok(None) => self.superseded(operation_id, generation),
            Err(SynthError::Cancelled { .. }) if !self.shutdown.is_cancelled() => {
                self.superseded(operation_id, generation)
            }
            Err(e) => {
                error!("Synthesis {} failed: {}", operation_id, e);
                self.stats.synth_failed();
                (self.on_event)(SynthEvent::Failed {
                    operation_id,
                    generation,
                    error: e.to_string(),
                });
            }
        }
    }

    fn superseded(&self, operation_id: Uuid, generation: u64) {
        info!("Synthesis generation {} superseded, result dropped", generation);
        self.stats.synth_superseded();
        (self.on_event)(SynthEvent::Superseded {
            operation_id,
            generation,
        });
    }

    /// `Ok(None)` when a newer generation made this run obsolete.
    async fn build(
        &self,
        runner: &SynthRunner,
        project_root: &Path,
        generation: u64,
        operation_id: Uuid,
        cancel: &CancellationToken,
    ) -> SynthResult<Option<Arc<Synthesis>>> {
        let output_dir = self.config.synth.resolved_output_dir();
        let output = runner
            .run(project_root, &output_dir, cancel, operation_id)
            .await?;
        debug!(
            "Synthesis process finished in {}ms (success: {})",
            output.duration.as_millis(),
            output.success
        );

        if self.store.is_superseded(generation) {
            debug!("Generation {} superseded before loading artifacts", generation);
            return Ok(None);
        }

        let assembly = CloudAssembly::load(&output_dir)?;
        let synthesis = Synthesis::build(generation, assembly, &self.config)?;
        if self.store.is_superseded(generation) {
            debug!("Generation {} superseded while loading artifacts", generation);
            return Ok(None);
        }
        Ok(Some(Arc::new(synthesis)))
    }
}

#[derive(Debug, PartialEq, Eq)]
struct PendingSynth {
    trigger: SynthTrigger,
    document: Option<PathBuf>,
    generation: u64,
}

/// Folds every request already queued behind `first` into one. `None` on shutdown.
fn coalesce(first: SynthRequest, request_rx: &mpsc::Receiver<SynthRequest>) -> Option<PendingSynth> {
    let mut pending = match first {
        SynthRequest::Synthesize {
            trigger,
            document,
            generation,
        } => PendingSynth {
            trigger,
            document,
            generation,
        },
        SynthRequest::Shutdown => return None,
    };

    while let Ok(next) = request_rx.try_recv() {
        match next {
            SynthRequest::Synthesize {
                trigger,
                document,
                generation,
            } => {
                debug!("Coalescing queued {} request", trigger.as_str());
                pending = PendingSynth {
                    trigger,
                    document: document.or(pending.document),
                    generation: generation.max(pending.generation),
                };
            }
            SynthRequest::Shutdown => return None,
        }
    }

    Some(pending)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{MANIFEST_FILE, TREE_FILE};
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_runner(script: &str, timeout_seconds: u64) -> SynthRunner {
        SynthRunner::new(SynthConfig {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            timeout_seconds,
            ..SynthConfig::default()
        })
    }

    fn create_test_project() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(PROJECT_MARKER), "{ \"app\": \"npx ts-node bin/app.ts\" }")
            .unwrap();
        dir
    }

    #[test]
    fn test_find_project_root() {
        let project = create_test_project();
        let nested = project.path().join("lib").join("constructs");
        fs::create_dir_all(&nested).unwrap();
        let file = nested.join("bucket.ts");
        fs::write(&file, "").unwrap();

        assert_eq!(find_project_root(&file).unwrap(), project.path());
        assert_eq!(find_project_root(project.path()).unwrap(), project.path());
    }

    #[test]
    fn test_find_project_root_missing() {
        let dir = TempDir::new().unwrap();
        let result = find_project_root(dir.path());
        assert!(matches!(result, Err(SynthError::ProjectRootNotFound { .. })));
    }

    #[test]
    fn test_command_args_append_output() {
        let runner = SynthRunner::new(SynthConfig::default());
        let args = runner.command_args(Path::new("/tmp/cdk.out"));

        assert_eq!(args[0], "cdk");
        assert_eq!(args[1], "synth");
        assert_eq!(args[args.len() - 2], "--output");
        assert_eq!(args[args.len() - 1], "/tmp/cdk.out");
    }

    fn create_test_request(
        trigger: SynthTrigger,
        document: Option<&str>,
        generation: u64,
    ) -> SynthRequest {
        SynthRequest::Synthesize {
            trigger,
            document: document.map(PathBuf::from),
            generation,
        }
    }

    #[test]
    fn test_coalesce_keeps_latest_document_and_generation() {
        let (tx, rx) = mpsc::channel();
        tx.send(create_test_request(SynthTrigger::Save, Some("/app/b.ts"), 2))
            .unwrap();
        tx.send(create_test_request(SynthTrigger::Command, None, 3))
            .unwrap();

        let first = create_test_request(SynthTrigger::Open, Some("/app/a.ts"), 1);
        let pending = coalesce(first, &rx).unwrap();

        assert_eq!(
            pending,
            PendingSynth {
                trigger: SynthTrigger::Command,
                document: Some(PathBuf::from("/app/b.ts")),
                generation: 3,
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_coalesce_stops_on_shutdown() {
        let (tx, rx) = mpsc::channel();
        tx.send(SynthRequest::Shutdown).unwrap();

        let first = create_test_request(SynthTrigger::Save, None, 1);
        assert!(coalesce(first, &rx).is_none());
        assert!(coalesce(SynthRequest::Shutdown, &rx).is_none());
    }

    #[test]
    fn test_handle_allocates_generations() {
        let store = Arc::new(SynthesisStore::new());
        let manager = SynthManager::new(
            CdkLspConfig::default(),
            Arc::clone(&store),
            Box::new(|_: SynthEvent| {}),
        );
        let (request_tx, request_rx) = mpsc::channel();
        let handle = manager.handle(request_tx);

        assert_eq!(handle.synthesize(SynthTrigger::Open, None).unwrap(), 1);
        assert_eq!(handle.synthesize(SynthTrigger::Save, None).unwrap(), 2);
        assert_eq!(store.latest_generation(), 2);

        match request_rx.try_recv().unwrap() {
            SynthRequest::Synthesize { generation, .. } => assert_eq!(generation, 1),
            other => panic!("Expected synthesize request, got {:?}", other),
        }

        drop(request_rx);
        assert!(matches!(
            handle.synthesize(SynthTrigger::Command, None),
            Err(SynthError::WorkerStopped)
        ));
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_not_an_error() {
        let project = create_test_project();
        let output_dir = project.path().join("cdk.out");
        let runner = create_test_runner("echo 'Validation failed' >&2; exit 1", 30);

        let output = runner
            .run(project.path(), &output_dir, &CancellationToken::new(), Uuid::new_v4())
            .await
            .unwrap();

        assert!(!output.success);
        assert_eq!(output.exit_code, Some(1));
        assert!(output.stderr.contains("Validation failed"));
    }

    #[tokio::test]
    async fn test_run_clears_stale_output() {
        let project = create_test_project();
        let output_dir = project.path().join("cdk.out");
        fs::create_dir_all(&output_dir).unwrap();
        fs::write(output_dir.join(TREE_FILE), "{}").unwrap();

        let runner = create_test_runner("exit 0", 30);
        let output = runner
            .run(project.path(), &output_dir, &CancellationToken::new(), Uuid::new_v4())
            .await
            .unwrap();

        assert!(output.success);
        assert!(!output_dir.join(TREE_FILE).exists());
    }

    #[tokio::test]
    async fn test_run_times_out() {
        let project = create_test_project();
        let runner = create_test_runner("sleep 5", 1);

        let result = runner
            .run(
                project.path(),
                &project.path().join("cdk.out"),
                &CancellationToken::new(),
                Uuid::new_v4(),
            )
            .await;

        assert!(matches!(result, Err(SynthError::Timeout { timeout_secs: 1, .. })));
    }

    #[tokio::test]
    async fn test_run_cancelled() {
        let project = create_test_project();
        let runner = create_test_runner("sleep 5", 30);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let operation_id = Uuid::new_v4();
        let result = runner
            .run(project.path(), &project.path().join("cdk.out"), &cancel, operation_id)
            .await;

        match result {
            Err(SynthError::Cancelled { operation_id: id }) => assert_eq!(id, operation_id),
            other => panic!("Expected cancellation, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_failure() {
        let project = create_test_project();
        let runner = SynthRunner::new(SynthConfig {
            program: "definitely-not-a-cdk-binary".to_string(),
            ..SynthConfig::default()
        });

        let result = runner
            .run(
                project.path(),
                &project.path().join("cdk.out"),
                &CancellationToken::new(),
                Uuid::new_v4(),
            )
            .await;

        assert!(matches!(result, Err(SynthError::SpawnFailed { .. })));
    }

    /// A project whose synth command sleeps, then copies a minimal assembly into
    /// the output directory.
    fn create_test_manager_config(project: &TempDir, delay_seconds: u64) -> CdkLspConfig {
        let fixture = project.path().join("fixture");
        fs::create_dir_all(&fixture).unwrap();
        fs::write(
            fixture.join(TREE_FILE),
            json!({ "version": "tree-0.1", "tree": { "id": "App", "path": "" } }).to_string(),
        )
        .unwrap();
        fs::write(
            fixture.join(MANIFEST_FILE),
            json!({ "version": "36.0.0", "artifacts": {} }).to_string(),
        )
        .unwrap();

        // `--output <dir>` arrives as $0 and $1
        let script = format!(
            "sleep {} && mkdir -p \"$1\" && cp -R '{}'/. \"$1\"",
            delay_seconds,
            fixture.display()
        );
        let mut config = CdkLspConfig::default();
        config.synth.program = "sh".to_string();
        config.synth.args = vec!["-c".to_string(), script];
        config.synth.output_dir = Some(project.path().join("cdk.out"));
        config
    }

    fn create_test_manager(
        config: CdkLspConfig,
        store: &Arc<SynthesisStore>,
    ) -> (SynthManager, mpsc::Receiver<SynthEvent>) {
        let (event_tx, event_rx) = mpsc::channel();
        let manager = SynthManager::new(
            config,
            Arc::clone(store),
            Box::new(move |event| {
                let _ = event_tx.send(event);
            }),
        );
        (manager, event_rx)
    }

    fn recv_event(event_rx: &mpsc::Receiver<SynthEvent>) -> SynthEvent {
        event_rx.recv_timeout(Duration::from_secs(30)).unwrap()
    }

    #[test]
    fn test_manager_installs_synthesis() {
        let project = create_test_project();
        let store = Arc::new(SynthesisStore::new());
        let (manager, event_rx) =
            create_test_manager(create_test_manager_config(&project, 0), &store);
        let stats = manager.stats();

        let (request_tx, request_rx) = mpsc::channel();
        let handle = manager.handle(request_tx);
        let worker = std::thread::spawn(move || manager.run(request_rx));

        handle
            .synthesize(SynthTrigger::Command, Some(project.path().to_path_buf()))
            .unwrap();

        let started = recv_event(&event_rx);
        assert!(matches!(started, SynthEvent::Started { generation: 1, .. }));

        let installed = recv_event(&event_rx);
        assert_eq!(installed.operation_id(), started.operation_id());
        match installed {
            SynthEvent::Installed { synthesis, .. } => {
                assert_eq!(synthesis.generation, 1);
                assert_eq!(synthesis.tree.len(), 1);
            }
            other => panic!("Expected installed synthesis, got {:?}", other),
        }

        handle.shutdown();
        worker.join().unwrap();

        assert_eq!(store.installed_generation(), Some(1));
        assert_eq!(stats.snapshot().total_runs, 1);
        assert_eq!(stats.snapshot().failed_runs, 0);
    }

    #[test]
    fn test_newer_request_supersedes_run_in_flight() {
        let project = create_test_project();
        let store = Arc::new(SynthesisStore::new());
        let (manager, event_rx) =
            create_test_manager(create_test_manager_config(&project, 2), &store);
        let stats = manager.stats();

        let (request_tx, request_rx) = mpsc::channel();
        let handle = manager.handle(request_tx);
        let worker = std::thread::spawn(move || manager.run(request_rx));
        let document = Some(project.path().join("bin").join("app.ts"));

        handle
            .synthesize(SynthTrigger::Save, document.clone())
            .unwrap();
        assert!(matches!(
            recv_event(&event_rx),
            SynthEvent::Started { generation: 1, .. }
        ));

        handle.synthesize(SynthTrigger::Save, document).unwrap();

        assert!(matches!(
            recv_event(&event_rx),
            SynthEvent::Superseded { generation: 1, .. }
        ));
        assert!(matches!(
            recv_event(&event_rx),
            SynthEvent::Started { generation: 2, .. }
        ));
        match recv_event(&event_rx) {
            SynthEvent::Installed { synthesis, .. } => assert_eq!(synthesis.generation, 2),
            other => panic!("Expected generation 2 installed, got {:?}", other),
        }

        handle.shutdown();
        worker.join().unwrap();

        assert_eq!(store.installed_generation(), Some(2));
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.superseded_runs, 1);
        assert_eq!(snapshot.failed_runs, 0);
    }

    #[test]
    fn test_shutdown_cancels_run_in_flight() {
        let project = create_test_project();
        let store = Arc::new(SynthesisStore::new());
        let (manager, event_rx) =
            create_test_manager(create_test_manager_config(&project, 30), &store);

        let (request_tx, request_rx) = mpsc::channel();
        let handle = manager.handle(request_tx);
        let worker = std::thread::spawn(move || manager.run(request_rx));

        handle
            .synthesize(SynthTrigger::Command, Some(project.path().to_path_buf()))
            .unwrap();
        assert!(matches!(recv_event(&event_rx), SynthEvent::Started { .. }));

        handle.shutdown();
        match recv_event(&event_rx) {
            SynthEvent::Failed { error, .. } => assert!(error.contains("cancelled")),
            other => panic!("Expected cancelled run, got {:?}", other),
        }
        worker.join().unwrap();
        assert!(store.current().is_none());
    }

    #[test]
    fn test_manager_reports_missing_project() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SynthesisStore::new());
        let (manager, event_rx) = create_test_manager(CdkLspConfig::default(), &store);

        let (request_tx, request_rx) = mpsc::channel();
        let handle = manager.handle(request_tx);
        let worker = std::thread::spawn(move || manager.run(request_rx));

        handle
            .synthesize(
                SynthTrigger::Open,
                Some(dir.path().join("bin").join("app.ts")),
            )
            .unwrap();

        match recv_event(&event_rx) {
            SynthEvent::Failed { error, .. } => assert!(error.contains("cdk.json")),
            other => panic!("Expected failure, got {:?}", other),
        }

        drop(handle);
        worker.join().unwrap();
        assert!(store.current().is_none());
    }
}
