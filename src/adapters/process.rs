use crate::domain::model::Step;
use crate::domain::ports::ProcessRunner;
use crate::utils::error::{EntrypointError, Result};
use async_trait::async_trait;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::mpsc;

const CHUNK_SIZE: usize = 8 * 1024;

#[derive(Debug, Default)]
struct RunnerState {
    current: Option<u32>,
    stopping: Option<i32>,
}

/// Runs steps with stdout and stderr merged and copied to both the console
/// and the step's log file, as `cmd 2>&1 | tee log` would.
///
/// Clones share state, so a clone kept by the signal handler can forward a
/// signal to whichever step is running.
#[derive(Debug, Clone, Default)]
pub struct TeeRunner {
    state: Arc<Mutex<RunnerState>>,
}

impl TeeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pid of the step currently running, if any.
    pub fn current_pid(&self) -> Option<u32> {
        self.state.lock().ok().and_then(|state| state.current)
    }

    /// Sends `signal` to the running step and refuses to start any further
    /// steps. Returns whether a child was signalled.
    pub fn forward_signal(&self, signal: i32) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        state.stopping = Some(signal);
        match state.current {
            Some(pid) => send_signal(pid, signal),
            None => false,
        }
    }

    fn stopping(&self) -> Option<i32> {
        self.state.lock().ok().and_then(|state| state.stopping)
    }

    fn set_current(&self, pid: Option<u32>) {
        if let Ok(mut state) = self.state.lock() {
            state.current = pid;
        }
    }
}

#[async_trait]
impl ProcessRunner for TeeRunner {
    async fn run_teed(&self, step: &Step, env: &[(String, String)]) -> Result<i32> {
        if let Some(signal) = self.stopping() {
            tracing::info!("Shutting down, not starting {}", step.command_line());
            return Ok(128 + signal);
        }

        // Like tee, an unusable log file only loses the copy, never the step.
        let mut log = match open_log(&step.log_file).await {
            Ok(file) => Some(file),
            Err(e) => {
                tracing::warn!(
                    "Cannot open log file {}: {}; output goes to the console only",
                    step.log_file.display(),
                    e
                );
                None
            }
        };

        let mut child = {
            let mut state = self
                .state
                .lock()
                .map_err(|_| std::io::Error::other("runner state poisoned"))?;
            if let Some(signal) = state.stopping {
                tracing::info!("Shutting down, not starting {}", step.command_line());
                return Ok(128 + signal);
            }
            let child = Command::new(&step.program)
                .args(&step.args)
                .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
                .stdin(Stdio::inherit())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(|source| EntrypointError::SpawnError {
                    program: step.program.clone(),
                    source,
                })?;
            state.current = child.id();
            child
        };

        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(64);
        let mut pumps = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            pumps.push(tokio::spawn(pump(stdout, tx.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(tokio::spawn(pump(stderr, tx.clone())));
        }
        drop(tx);

        let mut console = tokio::io::stdout();
        while let Some(chunk) = rx.recv().await {
            if let Err(e) = write_chunk(&mut console, &chunk).await {
                tracing::debug!("console write failed: {}", e);
            }
            if let Some(file) = log.as_mut() {
                if let Err(e) = file.write_all(&chunk).await {
                    tracing::warn!("Writing {} failed: {}", step.log_file.display(), e);
                    log = None;
                }
            }
        }
        if let Some(file) = log.as_mut() {
            if let Err(e) = file.flush().await {
                tracing::warn!("Flushing {} failed: {}", step.log_file.display(), e);
            }
        }

        for pump in pumps {
            if let Ok(Err(e)) = pump.await {
                tracing::debug!("output pipe of {} closed with error: {}", step.program, e);
            }
        }

        let status = child.wait().await;
        self.set_current(None);
        Ok(exit_code(status?))
    }

    async fn exec(&self, argv: &[String], env: &[(String, String)]) -> Result<i32> {
        let (program, args) = argv.split_first().ok_or_else(|| EntrypointError::UsageError {
            message: "no command to execute".to_string(),
        })?;
        exec_command(program, args, env).await
    }
}

async fn open_log(path: &Path) -> std::io::Result<tokio::fs::File> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::File::create(path).await
}

async fn write_chunk(console: &mut tokio::io::Stdout, chunk: &[u8]) -> std::io::Result<()> {
    console.write_all(chunk).await?;
    console.flush().await
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: i32) -> bool {
    // SAFETY: kill(2) has no memory-safety preconditions.
    let result = unsafe { libc::kill(pid as libc::pid_t, signal) };
    if result != 0 {
        let err = std::io::Error::last_os_error();
        tracing::warn!("Failed to send signal {} to {}: {}", signal, pid, err);
        return false;
    }
    true
}

#[cfg(not(unix))]
fn send_signal(_pid: u32, _signal: i32) -> bool {
    false
}

async fn pump<R: AsyncRead + Unpin>(mut reader: R, tx: mpsc::Sender<Vec<u8>>) -> std::io::Result<()> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        if tx.send(buf[..n].to_vec()).await.is_err() {
            break;
        }
    }
    Ok(())
}

#[cfg(unix)]
async fn exec_command(program: &str, args: &[String], env: &[(String, String)]) -> Result<i32> {
    use std::os::unix::process::CommandExt;

    // Only returns if the exec itself failed.
    let source = std::process::Command::new(program)
        .args(args)
        .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .exec();
    Err(EntrypointError::SpawnError {
        program: program.to_string(),
        source,
    })
}

#[cfg(not(unix))]
async fn exec_command(program: &str, args: &[String], env: &[(String, String)]) -> Result<i32> {
    let status = Command::new(program)
        .args(args)
        .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .status()
        .await
        .map_err(|source| EntrypointError::SpawnError {
            program: program.to_string(),
            source,
        })?;
    Ok(exit_code(status))
}

/// Shell convention: `128 + n` for a child killed by signal `n`.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}
