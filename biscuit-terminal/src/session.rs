use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use biscuit_core::config::TerminalSettings;
use biscuit_core::shell::{build_shell_command, ShellCommand, ShellKind};
use crossbeam_channel::Receiver;
use serde::Serialize;

use crate::pty::{Launcher, ProcessHandle, PtyLauncher, SessionEvent, TermSize};

/// Lifecycle of a terminal tab.
///
/// `NotAvailable` means the shell could not be found or spawned; `start`
/// may be retried from it. `Terminated` is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    NotAvailable,
    Idle,
    Running,
    Terminated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The session has no live shell to talk to.
    NotRunning,
    /// No tab with this id.
    NotFound(String),
    Io(String),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::NotRunning => write!(f, "Terminal session is not running"),
            SessionError::NotFound(id) => write!(f, "Terminal session not found: {}", id),
            SessionError::Io(e) => write!(f, "Terminal I/O error: {}", e),
        }
    }
}

impl std::error::Error for SessionError {}

/// One shell hosted in one terminal tab.
pub struct Session {
    id: String,
    shell: ShellKind,
    cwd: Option<PathBuf>,
    size: TermSize,
    launcher: Arc<dyn Launcher>,
    state: SessionState,
    command: Option<ShellCommand>,
    process: Option<Box<dyn ProcessHandle>>,
    events: Option<Receiver<SessionEvent>>,
    unavailable_reason: Option<String>,
    exit_code: Option<u32>,
}

impl Session {
    /// A session backed by a native PTY, sized and placed per `settings`.
    pub fn new(shell: ShellKind, settings: &TerminalSettings) -> Self {
        Self::with_launcher(
            shell,
            settings.working_directory.as_deref().map(Path::new),
            TermSize::new(settings.cols, settings.rows),
            Arc::new(PtyLauncher),
        )
    }

    pub fn with_launcher(
        shell: ShellKind,
        cwd: Option<&Path>,
        size: TermSize,
        launcher: Arc<dyn Launcher>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            shell,
            cwd: cwd.map(Path::to_path_buf),
            size,
            launcher,
            state: SessionState::Idle,
            command: None,
            process: None,
            events: None,
            unavailable_reason: None,
            exit_code: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn shell(&self) -> &ShellKind {
        &self.shell
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn size(&self) -> TermSize {
        self.size
    }

    /// The resolved invocation of the running (or last run) shell.
    pub fn command(&self) -> Option<&ShellCommand> {
        self.command.as_ref()
    }

    pub fn exit_code(&self) -> Option<u32> {
        self.exit_code
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().and_then(|p| p.pid())
    }

    /// Tab title.
    pub fn name(&self) -> String {
        match self.state {
            SessionState::NotAvailable => "Not Available".to_string(),
            _ => self.shell.name(),
        }
    }

    pub fn icon(&self) -> &'static str {
        match self.state {
            SessionState::NotAvailable => "error",
            _ => self.shell.icon(),
        }
    }

    /// Text to show instead of a terminal while the shell is unavailable.
    pub fn placeholder_message(&self) -> Option<&str> {
        match self.state {
            SessionState::NotAvailable => self.unavailable_reason.as_deref(),
            _ => None,
        }
    }

    /// Resolve the shell and spawn it. Does nothing while running or after
    /// termination.
    pub fn start(&mut self) -> SessionState {
        match self.state {
            SessionState::Running | SessionState::Terminated => {
                log::debug!("Session {} already {:?}, not starting", self.id, self.state);
                return self.state;
            }
            SessionState::Idle | SessionState::NotAvailable => {}
        }

        let Some(command) = build_shell_command(&self.shell, self.cwd.as_deref()) else {
            let message = self.shell.unavailable_message();
            log::warn!("Session {}: {}", self.id, message);
            self.unavailable_reason = Some(message);
            self.state = SessionState::NotAvailable;
            return self.state;
        };

        let (tx, rx) = crossbeam_channel::unbounded();
        match self.launcher.launch(&command, self.size, Box::new(tx)) {
            Ok(process) => {
                log::info!(
                    "Session {} started {} (pid {:?})",
                    self.id,
                    command.program.display(),
                    process.pid()
                );
                self.process = Some(process);
                self.events = Some(rx);
                self.command = Some(command);
                self.unavailable_reason = None;
                self.exit_code = None;
                self.state = SessionState::Running;
            }
            Err(e) => {
                log::error!(
                    "Session {} failed to start {}: {}",
                    self.id,
                    command.program.display(),
                    e
                );
                self.unavailable_reason =
                    Some(format!("Failed to start {}: {}", self.shell.name(), e));
                self.state = SessionState::NotAvailable;
            }
        }
        self.state
    }

    /// Kill the shell if one is live. Safe in every state.
    pub fn stop(&mut self) {
        if let Some(mut process) = self.process.take() {
            if let Err(e) = process.kill() {
                log::debug!("Session {}: kill failed (probably exited): {}", self.id, e);
            }
            match process.wait() {
                Ok(code) => self.exit_code = Some(code),
                Err(e) => log::warn!("Session {}: failed to reap shell: {}", self.id, e),
            }
            log::info!("Session {} stopped", self.id);
        }
        if self.state != SessionState::NotAvailable {
            self.state = SessionState::Terminated;
        }
    }

    /// Send keystrokes or pasted text to the shell.
    pub fn write(&mut self, data: &[u8]) -> Result<(), SessionError> {
        if self.state != SessionState::Running {
            return Err(SessionError::NotRunning);
        }
        let process = self.process.as_mut().ok_or(SessionError::NotRunning)?;
        process
            .write_all(data)
            .map_err(|e| SessionError::Io(e.to_string()))
    }

    pub fn resize(&mut self, cols: u16, rows: u16) -> Result<(), SessionError> {
        self.size = TermSize::new(cols, rows);
        match self.process.as_mut() {
            Some(process) => process
                .resize(self.size)
                .map_err(|e| SessionError::Io(e.to_string())),
            None => Ok(()),
        }
    }

    /// Drain output produced since the last call and pick up shell exit.
    /// Never blocks.
    pub fn poll(&mut self) -> Vec<u8> {
        let mut output = Vec::new();
        if let Some(events) = &self.events {
            for event in events.try_iter() {
                match event {
                    SessionEvent::Output(data) => output.extend_from_slice(&data),
                    SessionEvent::Closed => {
                        log::debug!("Session {}: output stream closed", self.id)
                    }
                }
            }
        }
        self.refresh_state();
        output
    }

    /// Move a running session to `Terminated` once its shell has exited.
    pub fn refresh_state(&mut self) -> SessionState {
        if self.state != SessionState::Running {
            return self.state;
        }
        let Some(process) = self.process.as_mut() else {
            return self.state;
        };
        match process.try_wait() {
            Ok(Some(code)) => {
                log::info!("Session {}: shell exited with code {}", self.id, code);
                self.exit_code = Some(code);
                self.process = None;
                self.state = SessionState::Terminated;
            }
            Ok(None) => {}
            Err(e) => log::warn!("Session {}: failed to query shell status: {}", self.id, e),
        }
        self.state
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.process.is_some() {
            self.stop();
        }
    }
}
