use std::io::{self, Read, Write};
use std::thread::JoinHandle;

use biscuit_core::shell::ShellCommand;
use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize};

/// Terminal grid size in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermSize {
    pub cols: u16,
    pub rows: u16,
}

impl TermSize {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self {
            cols: cols.max(1),
            rows: rows.max(1),
        }
    }

    fn to_pty(self) -> PtySize {
        PtySize {
            rows: self.rows,
            cols: self.cols,
            pixel_width: 0,
            pixel_height: 0,
        }
    }
}

impl Default for TermSize {
    fn default() -> Self {
        Self::new(120, 30)
    }
}

/// Messages sent from a session's reader thread to the UI thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Output(Vec<u8>),
    /// The output stream reached EOF or failed.
    Closed,
}

/// Receives reader-thread events. Implement this for your UI framework's
/// event channel.
pub trait OutputSink: Send + 'static {
    fn send(&self, event: SessionEvent);
}

impl OutputSink for crossbeam_channel::Sender<SessionEvent> {
    fn send(&self, event: SessionEvent) {
        let _ = crossbeam_channel::Sender::send(self, event);
    }
}

/// A live shell process as seen by its session.
pub trait ProcessHandle: Send {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;
    fn resize(&mut self, size: TermSize) -> io::Result<()>;
    /// Exit code if the process has exited, without blocking.
    fn try_wait(&mut self) -> io::Result<Option<u32>>;
    fn kill(&mut self) -> io::Result<()>;
    fn wait(&mut self) -> io::Result<u32>;
    fn pid(&self) -> Option<u32>;
}

/// Spawns shell processes whose output is streamed into `sink`.
pub trait Launcher: Send + Sync {
    fn launch(
        &self,
        command: &ShellCommand,
        size: TermSize,
        sink: Box<dyn OutputSink>,
    ) -> io::Result<Box<dyn ProcessHandle>>;
}

/// Launches shells on a native pseudo-terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct PtyLauncher;

struct PtyProcess {
    writer: Box<dyn Write + Send>,
    child: Box<dyn Child + Send + Sync>,
    master: Box<dyn MasterPty + Send>,
}

fn to_io(e: impl std::fmt::Display) -> io::Error {
    io::Error::other(e.to_string())
}

impl Launcher for PtyLauncher {
    fn launch(
        &self,
        command: &ShellCommand,
        size: TermSize,
        sink: Box<dyn OutputSink>,
    ) -> io::Result<Box<dyn ProcessHandle>> {
        let pair = native_pty_system()
            .openpty(size.to_pty())
            .map_err(|e| to_io(format!("Failed to open PTY: {}", e)))?;

        let mut cmd = CommandBuilder::new(&command.program);
        cmd.args(&command.args);
        for (key, value) in &command.env {
            cmd.env(key, value);
        }
        if let Some(cwd) = &command.cwd {
            cmd.cwd(cwd);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| to_io(format!("Failed to spawn shell: {}", e)))?;
        // The child holds its own copy of the slave side.
        drop(pair.slave);

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| to_io(format!("Failed to get PTY writer: {}", e)))?;
        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| to_io(format!("Failed to get PTY reader: {}", e)))?;

        let label = command.program.display().to_string();
        spawn_reader(reader, sink, label)?;

        Ok(Box::new(PtyProcess {
            writer,
            child,
            master: pair.master,
        }))
    }
}

impl ProcessHandle for PtyProcess {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.writer.write_all(data)?;
        self.writer.flush()
    }

    fn resize(&mut self, size: TermSize) -> io::Result<()> {
        self.master.resize(size.to_pty()).map_err(to_io)
    }

    fn try_wait(&mut self) -> io::Result<Option<u32>> {
        Ok(self.child.try_wait()?.map(|status| status.exit_code()))
    }

    fn kill(&mut self) -> io::Result<()> {
        ChildKiller::kill(&mut *self.child)
    }

    fn wait(&mut self) -> io::Result<u32> {
        Ok(self.child.wait()?.exit_code())
    }

    fn pid(&self) -> Option<u32> {
        self.child.process_id()
    }
}

/// Pump `reader` into `sink` on a background thread until EOF.
pub fn spawn_reader(
    mut reader: Box<dyn Read + Send>,
    sink: Box<dyn OutputSink>,
    label: String,
) -> io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name(format!("pty-reader {}", label))
        .spawn(move || {
            let mut buf = [0u8; 8192];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => sink.send(SessionEvent::Output(buf[..n].to_vec())),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        // EIO is how Linux reports a hung-up PTY.
                        log::debug!("PTY reader for {} stopped: {}", label, e);
                        break;
                    }
                }
            }
            sink.send(SessionEvent::Closed);
        })
}
