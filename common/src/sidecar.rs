//! Spawn the engine binary and read its message stream.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{Context, Result, bail};
use scriptgrab_proto::{Message, Segment, StreamValidator, parse_line};
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Arguments for one engine run.
#[derive(Debug, Clone, Default)]
pub struct SidecarRequest {
    pub audio_path: PathBuf,
    /// Model size name (`tiny`, `base`, ...); engine default when `None`.
    pub model: Option<String>,
    /// `cpu` or `cuda`; auto-detected when `None`.
    pub device: Option<String>,
    pub vad: bool,
    pub config: Option<PathBuf>,
}

impl SidecarRequest {
    pub fn new(audio_path: impl Into<PathBuf>) -> Self {
        Self {
            audio_path: audio_path.into(),
            ..Default::default()
        }
    }

    /// Command-line arguments for the engine binary.
    pub fn to_args(&self) -> Vec<OsString> {
        let mut args = vec![self.audio_path.clone().into_os_string()];
        if let Some(model) = &self.model {
            args.push("--model".into());
            args.push(model.into());
        }
        if let Some(device) = &self.device {
            args.push("--device".into());
            args.push(device.into());
        }
        if self.vad {
            args.push("--vad".into());
        }
        if let Some(config) = &self.config {
            args.push("--config".into());
            args.push(config.clone().into_os_string());
        }
        args
    }
}

/// Something observed on the sidecar's stdout.
#[derive(Debug, Clone, PartialEq)]
pub enum SidecarEvent {
    Message(Message),
    /// A line that is not a protocol message.
    Malformed { line: String, error: String },
    /// Stdout closed and the process exited. `None` when killed by a signal.
    Exited(Option<i32>),
}

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub segments: Vec<Segment>,
    pub language: String,
    pub duration: f64,
}

/// A running engine process.
pub struct Sidecar {
    child: Child,
    stdout: Lines<BufReader<ChildStdout>>,
    stderr: Option<JoinHandle<()>>,
    validator: StreamValidator,
}

impl Sidecar {
    /// Start `binary` for `request`.
    pub fn spawn(binary: impl AsRef<Path>, request: &SidecarRequest) -> Result<Self> {
        let binary = binary.as_ref();
        let mut command = Command::new(binary);
        command.args(request.to_args());
        Self::from_command(command)
            .with_context(|| format!("Failed to start engine: {}", binary.display()))
    }

    /// Start an arbitrary command that speaks the engine protocol.
    pub fn from_command(mut command: Command) -> Result<Self> {
        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child.stdout.take().context("Child stdout not captured")?;
        let stderr = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "scriptgrab_common::engine", "{line}");
                }
            })
        });

        Ok(Self {
            child,
            stdout: BufReader::new(stdout).lines(),
            stderr,
            validator: StreamValidator::new(),
        })
    }

    /// Wait for the next event. After `Exited`, every call yields `Exited` again.
    pub async fn next_event(&mut self) -> Result<SidecarEvent> {
        loop {
            let Some(line) = self
                .stdout
                .next_line()
                .await
                .context("Failed to read engine output")?
            else {
                return self.wait().await;
            };

            match parse_line(&line) {
                Ok(None) => continue,
                Ok(Some(message)) => {
                    if let Err(violation) = self.validator.observe(&message) {
                        warn!(%violation, "Engine broke the message ordering");
                    }
                    return Ok(SidecarEvent::Message(message));
                }
                Err(e) => {
                    return Ok(SidecarEvent::Malformed {
                        line,
                        error: e.to_string(),
                    });
                }
            }
        }
    }

    async fn wait(&mut self) -> Result<SidecarEvent> {
        let status = self
            .child
            .wait()
            .await
            .context("Failed to wait for engine")?;
        if let Some(stderr) = self.stderr.take() {
            let _ = stderr.await;
        }
        if let Err(violation) = self.validator.finish() {
            debug!(%violation, "Engine stream incomplete");
        }
        Ok(SidecarEvent::Exited(status.code()))
    }

    /// Ask the engine to stop.
    ///
    /// On Unix this delivers SIGINT so the engine can report the cancellation
    /// and exit with code 130. Elsewhere the process is killed.
    pub fn cancel(&mut self) -> Result<()> {
        interrupt(&mut self.child)
    }

    /// Run to the end, discarding progress.
    pub async fn collect(self) -> Result<Transcript> {
        self.collect_with(|_, _| {}).await
    }

    /// Run to the end, passing every progress update to `on_progress`.
    pub async fn collect_with(
        mut self,
        mut on_progress: impl FnMut(u8, &str),
    ) -> Result<Transcript> {
        let mut segments = Vec::new();
        let mut terminal = None;

        let code = loop {
            match self.next_event().await? {
                SidecarEvent::Message(Message::Progress { percent, status }) => {
                    on_progress(percent, &status);
                }
                SidecarEvent::Message(Message::Segment { data }) => segments.push(data),
                SidecarEvent::Message(message) => {
                    if terminal.is_none() {
                        terminal = Some(message);
                    }
                }
                SidecarEvent::Malformed { line, error } => {
                    warn!(%line, %error, "Ignoring malformed engine output");
                }
                SidecarEvent::Exited(code) => break code,
            }
        };

        match terminal {
            Some(Message::Complete { language, duration }) => Ok(Transcript {
                segments,
                language,
                duration,
            }),
            Some(Message::Error { message }) => bail!("{message}"),
            _ => match code {
                Some(0) => bail!("Engine exited without a result"),
                Some(code) => bail!("Process exited with code: {code}"),
                None => bail!("Process terminated by signal"),
            },
        }
    }
}

#[cfg(unix)]
fn interrupt(child: &mut Child) -> Result<()> {
    let Some(pid) = child.id() else {
        return Ok(());
    };
    let pid = libc::pid_t::try_from(pid).context("Process id out of range")?;
    // SAFETY: plain syscall on a pid we spawned and have not reaped.
    if unsafe { libc::kill(pid, libc::SIGINT) } != 0 {
        return Err(std::io::Error::last_os_error()).context("Failed to signal engine");
    }
    Ok(())
}

#[cfg(not(unix))]
fn interrupt(child: &mut Child) -> Result<()> {
    child.start_kill().context("Failed to kill engine")
}
