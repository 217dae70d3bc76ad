use std::path::PathBuf;
use std::sync::Arc;

use biscuit_core::config::TerminalSettings;
use biscuit_core::shell::ShellKind;
use parking_lot::Mutex;
use serde::Serialize;

use crate::pty::{Launcher, PtyLauncher, TermSize};
use crate::session::{Session, SessionError, SessionState};

/// What the tab strip needs to draw one terminal tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TabInfo {
    pub id: String,
    pub name: String,
    pub icon: String,
    pub state: SessionState,
    /// Placeholder text while the shell is unavailable.
    pub message: Option<String>,
}

impl TabInfo {
    fn of(session: &Session) -> Self {
        Self {
            id: session.id().to_string(),
            name: session.name(),
            icon: session.icon().to_string(),
            state: session.state(),
            message: session.placeholder_message().map(str::to_string),
        }
    }
}

/// Owns every terminal tab, in tab order.
pub struct TerminalManager {
    sessions: Mutex<Vec<Session>>,
    launcher: Arc<dyn Launcher>,
    settings: TerminalSettings,
}

impl TerminalManager {
    pub fn new(settings: &TerminalSettings) -> Self {
        Self::with_launcher(settings, Arc::new(PtyLauncher))
    }

    pub fn with_launcher(settings: &TerminalSettings, launcher: Arc<dyn Launcher>) -> Self {
        Self {
            sessions: Mutex::new(Vec::new()),
            launcher,
            settings: settings.clone(),
        }
    }

    /// Open a tab running `shell` (the configured shell when `None`) and
    /// start it. A shell that cannot start still gets a tab, showing why.
    pub fn open_tab(&self, shell: Option<ShellKind>) -> TabInfo {
        let shell =
            shell.unwrap_or_else(|| ShellKind::from_setting(self.settings.shell.as_deref()));
        let cwd = self.settings.working_directory.as_ref().map(PathBuf::from);
        let mut session = Session::with_launcher(
            shell,
            cwd.as_deref(),
            TermSize::new(self.settings.cols, self.settings.rows),
            self.launcher.clone(),
        );
        session.start();

        let info = TabInfo::of(&session);
        log::info!("Opened terminal tab {} ({:?})", info.id, info.state);
        self.sessions.lock().push(session);
        info
    }

    /// Stop the tab's shell and remove the tab.
    pub fn close_tab(&self, id: &str) -> Result<(), SessionError> {
        let mut sessions = self.sessions.lock();
        let index = sessions
            .iter()
            .position(|s| s.id() == id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        let mut session = sessions.remove(index);
        drop(sessions);
        session.stop();
        log::info!("Closed terminal tab {}", id);
        Ok(())
    }

    pub fn write_to(&self, id: &str, data: &[u8]) -> Result<(), SessionError> {
        self.with_session(id, |s| s.write(data))
    }

    pub fn resize(&self, id: &str, cols: u16, rows: u16) -> Result<(), SessionError> {
        self.with_session(id, |s| s.resize(cols, rows))
    }

    /// Retry starting a tab whose shell was not available.
    pub fn restart(&self, id: &str) -> Result<SessionState, SessionError> {
        self.with_session(id, |s| Ok(s.start()))
    }

    /// Collect pending output from every tab and update their states.
    /// Tabs with nothing new are left out.
    pub fn poll_all(&self) -> Vec<(String, Vec<u8>)> {
        let mut sessions = self.sessions.lock();
        sessions
            .iter_mut()
            .filter_map(|s| {
                let output = s.poll();
                (!output.is_empty()).then(|| (s.id().to_string(), output))
            })
            .collect()
    }

    pub fn state(&self, id: &str) -> Option<SessionState> {
        self.sessions
            .lock()
            .iter()
            .find(|s| s.id() == id)
            .map(Session::state)
    }

    pub fn tabs(&self) -> Vec<TabInfo> {
        self.sessions.lock().iter().map(TabInfo::of).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Stop every shell. Tabs stay open showing their terminated state.
    pub fn shutdown_all(&self) {
        for session in self.sessions.lock().iter_mut() {
            session.stop();
        }
    }

    fn with_session<T>(
        &self,
        id: &str,
        f: impl FnOnce(&mut Session) -> Result<T, SessionError>,
    ) -> Result<T, SessionError> {
        let mut sessions = self.sessions.lock();
        let session = sessions
            .iter_mut()
            .find(|s| s.id() == id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        f(session)
    }
}

impl Drop for TerminalManager {
    fn drop(&mut self) {
        self.shutdown_all();
    }
}
