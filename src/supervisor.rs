//! Process supervisor
//!
//! Starts the processes of a manifest in order, forwards their output and
//! reports their exits. Each child is owned by one task; a `watch` channel
//! broadcasts the stop request and exits come back over an mpsc channel.
//!
//! Stopping sends SIGTERM to every child's process group, waits out the
//! grace period, then SIGKILLs whatever is left.

use crate::{
    error::{LaunchError, Result},
    manifest::{Manifest, OutputMode, ProcessSpec},
    substitution::{command::describe_status, RuntimeEnvironment},
};
use std::{
    fmt,
    future::Future,
    io::{self, Write},
    process::{ExitStatus, Stdio},
    time::Duration,
};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::{Child, Command},
    sync::{mpsc, watch},
};

pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Time between SIGTERM and SIGKILL when stopping
    pub grace_period: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }
}

/// A started child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningProcess {
    pub name: String,
    pub pid: u32,
    pub critical: bool,
}

/// How a child ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitEvent {
    pub name: String,
    pub pid: u32,
    pub code: Option<i32>,
    pub signal: Option<i32>,
    pub critical: bool,
    /// The exit followed a stop request
    pub requested: bool,
    /// The child outlived the grace period and was killed
    pub escalated: bool,
}

impl ExitEvent {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn status(&self) -> String {
        match (self.code, self.signal) {
            (Some(code), _) => format!("exit code {}", code),
            (None, Some(signal)) => format!("signal {}", signal),
            (None, None) => "unknown status".to_string(),
        }
    }
}

impl fmt::Display for ExitEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (pid {}) ended with {}", self.name, self.pid, self.status())?;
        if self.escalated {
            write!(f, " after SIGKILL")?;
        }
        Ok(())
    }
}

/// Exits of every child of a launch, in spawn order.
#[derive(Debug, Clone, Default)]
pub struct StopReport {
    pub exits: Vec<ExitEvent>,
}

impl StopReport {
    pub fn get(&self, name: &str) -> Option<&ExitEvent> {
        self.exits.iter().find(|e| e.name == name)
    }

    /// Children that had to be killed after the grace period.
    pub fn escalated(&self) -> impl Iterator<Item = &ExitEvent> {
        self.exits.iter().filter(|e| e.escalated)
    }
}

pub struct Supervisor {
    config: SupervisorConfig,
    env: RuntimeEnvironment,
}

impl Supervisor {
    /// Children get exactly the variables of `env`, plus their own.
    pub fn new(config: SupervisorConfig, env: RuntimeEnvironment) -> Self {
        Self { config, env }
    }

    /// Start every process of `manifest`, in manifest order, without
    /// waiting for any of them to become ready.
    ///
    /// If a process cannot be started the ones already running are stopped
    /// and the spawn error is returned.
    pub async fn launch(&self, manifest: &Manifest) -> Result<LaunchHandle> {
        let (stop_tx, _) = watch::channel(false);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut handle = LaunchHandle {
            processes: Vec::with_capacity(manifest.len()),
            events: events_rx,
            stop_tx,
            exited: Vec::new(),
        };

        for spec in manifest.iter() {
            let name = spec.display_name().to_string();
            let mut child = match self.spawn(spec) {
                Ok(child) => child,
                Err(source) => {
                    log::error!("Failed to start {}: {}", spec, source);
                    drop(events_tx);
                    handle.stop().await;
                    return Err(LaunchError::ProcessSpawn { name, source });
                }
            };
            let Some(pid) = child.id() else {
                log::warn!("{} has no pid, not supervising it", name);
                continue;
            };
            log::info!("Started {} (pid {})", spec, pid);

            if let Some(stdout) = child.stdout.take() {
                let route = Route::for_stream(spec.output, Stream::Stdout);
                tokio::spawn(forward_lines(stdout, name.clone(), route, route.terminal()));
            }
            if let Some(stderr) = child.stderr.take() {
                let route = Route::for_stream(spec.output, Stream::Stderr);
                tokio::spawn(forward_lines(stderr, name.clone(), route, route.terminal()));
            }

            let process = RunningProcess {
                name,
                pid,
                critical: spec.critical,
            };
            tokio::spawn(supervise(
                child,
                process.clone(),
                self.config.grace_period,
                handle.stop_tx.subscribe(),
                events_tx.clone(),
            ));
            handle.processes.push(process);
        }

        Ok(handle)
    }

    fn spawn(&self, spec: &ProcessSpec) -> std::io::Result<Child> {
        let argv = spec.command_line(&self.env);
        log::debug!("Spawning {}: {:?}", spec.display_name(), argv);

        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..])
            .env_clear()
            .envs(self.env.vars())
            .envs(spec.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // own process group, so a stop reaches grandchildren too
        #[cfg(unix)]
        cmd.process_group(0);
        cmd.spawn()
    }
}

/// The running launch.
pub struct LaunchHandle {
    processes: Vec<RunningProcess>,
    events: mpsc::UnboundedReceiver<ExitEvent>,
    stop_tx: watch::Sender<bool>,
    exited: Vec<ExitEvent>,
}

impl LaunchHandle {
    /// Started processes, in spawn order.
    pub fn processes(&self) -> &[RunningProcess] {
        &self.processes
    }

    /// Wait for the next child to exit. `None` once every child has exited.
    pub async fn next_exit(&mut self) -> Option<ExitEvent> {
        let event = self.events.recv().await?;
        self.exited.push(event.clone());
        Some(event)
    }

    /// Stop every child still running and wait for all of them.
    pub async fn stop(mut self) -> StopReport {
        let running = self.processes.len().saturating_sub(self.exited.len());
        if running > 0 {
            log::info!("Stopping {} process(es)", running);
        }
        // send fails only when no child task is left
        let _ = self.stop_tx.send(true);

        while let Some(event) = self.events.recv().await {
            self.exited.push(event);
        }

        let mut exits = std::mem::take(&mut self.exited);
        exits.sort_by_key(|event| {
            self.processes
                .iter()
                .position(|p| p.pid == event.pid)
                .unwrap_or(usize::MAX)
        });
        for event in exits.iter().filter(|e| e.escalated) {
            log::warn!("{}", event);
        }
        StopReport { exits }
    }

    /// Supervise until `shutdown` resolves, every child has exited, or a
    /// critical child exits. Everything still running is stopped before
    /// returning.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<StopReport>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            let next = tokio::select! {
                _ = &mut shutdown => None,
                event = self.next_exit() => Some(event),
            };

            match next {
                None => {
                    log::info!("Shutdown requested");
                    return Ok(self.stop().await);
                }
                Some(None) => {
                    log::info!("All processes exited");
                    return Ok(self.stop().await);
                }
                Some(Some(event)) if event.critical => {
                    log::error!("Critical process {}", event);
                    self.stop().await;
                    let status = event.status();
                    return Err(LaunchError::UnexpectedExit { name: event.name, status });
                }
                Some(Some(event)) if event.success() => log::info!("{}", event),
                Some(Some(event)) => log::warn!("{}", event),
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// Where a line read from a child pipe ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Stdout,
    Stderr,
    Debug,
}

impl Route {
    /// stderr always reaches the terminal; stdout only in screen mode
    fn for_stream(output: OutputMode, stream: Stream) -> Self {
        match (output, stream) {
            (OutputMode::Screen, Stream::Stdout) => Route::Stdout,
            (_, Stream::Stderr) => Route::Stderr,
            (OutputMode::Log, Stream::Stdout) => Route::Debug,
        }
    }

    fn terminal(self) -> Box<dyn Write + Send> {
        match self {
            Route::Stdout => Box::new(io::stdout()),
            Route::Stderr | Route::Debug => Box::new(io::stderr()),
        }
    }
}

async fn forward_lines<R, W>(pipe: R, name: String, route: Route, mut terminal: W)
where
    R: AsyncRead + Unpin,
    W: Write,
{
    let mut lines = BufReader::new(pipe).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        match route {
            Route::Debug => log::debug!("[{}] {}", name, line),
            Route::Stdout | Route::Stderr => {
                if let Err(err) = writeln!(terminal, "[{}] {}", name, line) {
                    log::debug!("Dropping output of {}: {}", name, err);
                }
            }
        }
    }
    log::trace!("{:?} output of {} closed", route, name);
}

/// Own one child until it exits, honoring a stop request.
async fn supervise(
    mut child: Child,
    process: RunningProcess,
    grace_period: Duration,
    mut stop: watch::Receiver<bool>,
    events: mpsc::UnboundedSender<ExitEvent>,
) {
    let mut requested = false;
    let mut escalated = false;

    let status = tokio::select! {
        status = child.wait() => status,
        // a dropped handle counts as a stop request
        _ = stop.changed() => {
            requested = true;
            terminate(&mut child, process.pid);
            match tokio::time::timeout(grace_period, child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    log::warn!(
                        "{} (pid {}) still running after {:?}, killing",
                        process.name,
                        process.pid,
                        grace_period
                    );
                    escalated = true;
                    kill(&mut child, process.pid).await
                }
            }
        }
    };

    let (code, signal) = match &status {
        Ok(status) => split_status(status),
        Err(err) => {
            log::error!("Failed to wait for {}: {}", process.name, err);
            (None, None)
        }
    };
    if let Ok(status) = &status {
        log::debug!("{} exited with {}", process.name, describe_status(status));
    }

    let _ = events.send(ExitEvent {
        name: process.name,
        pid: process.pid,
        code,
        signal,
        critical: process.critical,
        requested,
        escalated,
    });
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: nix::sys::signal::Signal) {
    use nix::{sys::signal::killpg, unistd::Pid};

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    if let Err(err) = killpg(Pid::from_raw(raw), signal) {
        log::debug!("Sending {:?} to process group {} failed: {}", signal, pid, err);
    }
}

#[cfg(unix)]
fn terminate(_child: &mut Child, pid: u32) {
    signal_group(pid, nix::sys::signal::Signal::SIGTERM);
}

#[cfg(not(unix))]
fn terminate(child: &mut Child, _pid: u32) {
    let _ = child.start_kill();
}

#[cfg(unix)]
async fn kill(child: &mut Child, pid: u32) -> std::io::Result<ExitStatus> {
    signal_group(pid, nix::sys::signal::Signal::SIGKILL);
    child.wait().await
}

#[cfg(not(unix))]
async fn kill(child: &mut Child, _pid: u32) -> std::io::Result<ExitStatus> {
    child.kill().await?;
    child.wait().await
}

#[cfg(unix)]
fn split_status(status: &ExitStatus) -> (Option<i32>, Option<i32>) {
    use std::os::unix::process::ExitStatusExt;
    (status.code(), status.signal())
}

#[cfg(not(unix))]
fn split_status(status: &ExitStatus) -> (Option<i32>, Option<i32>) {
    (status.code(), None)
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                log::warn!("Failed to register SIGTERM handler, using Ctrl-C only: {}", err);
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
