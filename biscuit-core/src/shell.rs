use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Location of the Windows command interpreter.
pub const COMMAND_PROMPT_PATH: &str = "C:\\windows\\system32\\cmd.exe";

const TERM_PROGRAM: &str = "Biscuit";

/// The shells a terminal tab can host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShellKind {
    /// The user's login shell.
    Login,
    Bash,
    Zsh,
    Fish,
    CommandPrompt,
    PowerShell,
    Custom(PathBuf),
}

impl ShellKind {
    pub fn platform_default() -> Self {
        if cfg!(windows) {
            ShellKind::CommandPrompt
        } else {
            ShellKind::Login
        }
    }

    /// Map the `terminal.shell` setting to a shell kind.
    pub fn from_setting(value: Option<&str>) -> Self {
        let value = match value.map(str::trim) {
            Some(v) if !v.is_empty() => v,
            _ => return Self::platform_default(),
        };
        match value.to_ascii_lowercase().as_str() {
            "default" | "login" => Self::platform_default(),
            "bash" => ShellKind::Bash,
            "zsh" => ShellKind::Zsh,
            "fish" => ShellKind::Fish,
            "cmd" | "cmd.exe" | "command prompt" => ShellKind::CommandPrompt,
            "powershell" | "pwsh" => ShellKind::PowerShell,
            _ => ShellKind::Custom(PathBuf::from(value)),
        }
    }

    pub fn name(&self) -> String {
        match self {
            ShellKind::Login => "Default".to_string(),
            ShellKind::Bash => "bash".to_string(),
            ShellKind::Zsh => "zsh".to_string(),
            ShellKind::Fish => "fish".to_string(),
            ShellKind::CommandPrompt if cfg!(windows) => "Default".to_string(),
            ShellKind::CommandPrompt => "Command Prompt".to_string(),
            ShellKind::PowerShell => "PowerShell".to_string(),
            ShellKind::Custom(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "shell".to_string()),
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            ShellKind::CommandPrompt => "cmd",
            ShellKind::PowerShell => "terminal-powershell",
            ShellKind::Bash => "terminal-bash",
            _ => "terminal",
        }
    }

    /// Text shown in place of the terminal when the shell cannot be found.
    pub fn unavailable_message(&self) -> String {
        match self {
            ShellKind::CommandPrompt => {
                "Command Prompt not available, report an issue otherwise.".to_string()
            }
            ShellKind::Custom(path) => format!("Shell '{}' not available.", path.display()),
            other => format!("{} shell not available.", other.name()),
        }
    }

    /// Find the executable for this shell on the current machine.
    pub fn resolve_executable(&self) -> Option<PathBuf> {
        match self {
            ShellKind::Login => {
                let path = PathBuf::from(get_default_shell_path());
                is_executable_file(&path).then_some(path)
            }
            ShellKind::Bash => find_command_in_path("bash"),
            ShellKind::Zsh => find_command_in_path("zsh"),
            ShellKind::Fish => find_command_in_path("fish"),
            ShellKind::CommandPrompt => {
                if !cfg!(windows) {
                    return None;
                }
                let path = PathBuf::from(COMMAND_PROMPT_PATH);
                path.is_file().then_some(path)
            }
            ShellKind::PowerShell => {
                find_command_in_path("pwsh").or_else(|| find_command_in_path("powershell"))
            }
            ShellKind::Custom(path) => find_command_in_path(&path.to_string_lossy()),
        }
    }

    fn args(&self, program: &Path) -> Vec<String> {
        let kind = match self {
            ShellKind::Login | ShellKind::Custom(_) => detect_shell_kind(&program.to_string_lossy()),
            other => other.clone(),
        };
        match kind {
            ShellKind::Zsh | ShellKind::Fish => vec!["--login".to_string()],
            ShellKind::PowerShell => vec!["-NoLogo".to_string()],
            _ => Vec::new(),
        }
    }
}

/// A fully resolved shell invocation, ready to hand to a PTY.
#[derive(Debug, Clone, PartialEq)]
pub struct ShellCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
}

/// Resolve `kind` and build its command line. `None` when the executable
/// cannot be found.
pub fn build_shell_command(kind: &ShellKind, cwd: Option<&Path>) -> Option<ShellCommand> {
    let program = kind.resolve_executable()?;
    let args = kind.args(&program);
    let cwd = cwd
        .filter(|p| p.is_dir())
        .map(Path::to_path_buf)
        .or_else(get_home_directory);

    Some(ShellCommand {
        program,
        args,
        env: vec![
            ("TERM".to_string(), "xterm-256color".to_string()),
            ("TERM_PROGRAM".to_string(), TERM_PROGRAM.to_string()),
            (
                "TERM_PROGRAM_VERSION".to_string(),
                env!("CARGO_PKG_VERSION").to_string(),
            ),
        ],
        cwd,
    })
}

/// Get the user's login shell from /etc/passwd.
pub fn get_user_login_shell() -> Option<String> {
    let username = std::env::var("USER").ok()?;
    let passwd = std::fs::read_to_string("/etc/passwd").ok()?;
    for line in passwd.lines() {
        let fields: Vec<&str> = line.split(':').collect();
        if fields.len() >= 7 && fields[0] == username {
            let shell = fields[6].to_string();
            if Path::new(&shell).exists() {
                return Some(shell);
            }
        }
    }
    None
}

/// Get the default shell path, preferring /etc/passwd over $SHELL.
pub fn get_default_shell_path() -> String {
    get_user_login_shell()
        .or_else(|| std::env::var("SHELL").ok().filter(|s| !s.is_empty()))
        .unwrap_or_else(|| "/bin/bash".to_string())
}

/// Detect the shell kind from an executable path.
pub fn detect_shell_kind(shell_path: &str) -> ShellKind {
    let shell_name = Path::new(shell_path)
        .file_stem()
        .and_then(|n| n.to_str())
        .unwrap_or("bash");

    match shell_name {
        "zsh" => ShellKind::Zsh,
        "fish" => ShellKind::Fish,
        "cmd" => ShellKind::CommandPrompt,
        "pwsh" | "powershell" => ShellKind::PowerShell,
        "bash" | "sh" => ShellKind::Bash,
        _ => ShellKind::Custom(PathBuf::from(shell_path)),
    }
}

pub fn get_home_directory() -> Option<PathBuf> {
    dirs::home_dir()
}

fn command_looks_like_path(command: &str) -> bool {
    command.contains(std::path::MAIN_SEPARATOR) || command.contains('/')
}

fn is_executable_file(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        match path.metadata() {
            Ok(meta) => meta.is_file() && (meta.permissions().mode() & 0o111 != 0),
            Err(_) => false,
        }
    }
    #[cfg(not(unix))]
    {
        path.is_file()
    }
}

/// Look a command up on `PATH`; paths are checked directly.
pub fn find_command_in_path(command: &str) -> Option<PathBuf> {
    if command_looks_like_path(command) {
        let path = PathBuf::from(command);
        return is_executable_file(&path).then_some(path);
    }

    let path_env: OsString = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_env) {
        let candidate = dir.join(command);
        if is_executable_file(&candidate) {
            return Some(candidate);
        }
        if cfg!(windows) {
            let candidate = dir.join(format!("{}.exe", command));
            if is_executable_file(&candidate) {
                return Some(candidate);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_setting_maps_known_names() {
        assert_eq!(ShellKind::from_setting(Some("zsh")), ShellKind::Zsh);
        assert_eq!(ShellKind::from_setting(Some("Fish")), ShellKind::Fish);
        assert_eq!(ShellKind::from_setting(Some("cmd")), ShellKind::CommandPrompt);
        assert_eq!(ShellKind::from_setting(Some("pwsh")), ShellKind::PowerShell);
        assert_eq!(
            ShellKind::from_setting(Some("/opt/bin/xonsh")),
            ShellKind::Custom(PathBuf::from("/opt/bin/xonsh"))
        );
    }

    #[test]
    fn from_setting_empty_is_platform_default() {
        assert_eq!(ShellKind::from_setting(None), ShellKind::platform_default());
        assert_eq!(ShellKind::from_setting(Some("  ")), ShellKind::platform_default());
    }

    #[test]
    fn detect_shell_kind_from_path() {
        assert_eq!(detect_shell_kind("/usr/bin/zsh"), ShellKind::Zsh);
        assert_eq!(detect_shell_kind("/usr/local/bin/fish"), ShellKind::Fish);
        assert_eq!(detect_shell_kind("/bin/bash"), ShellKind::Bash);
        assert_eq!(
            detect_shell_kind("/bin/nushell"),
            ShellKind::Custom(PathBuf::from("/bin/nushell"))
        );
    }

    #[test]
    fn missing_custom_shell_does_not_resolve() {
        let kind = ShellKind::Custom(PathBuf::from("/definitely/not/a/shell"));
        assert!(kind.resolve_executable().is_none());
        assert!(build_shell_command(&kind, None).is_none());
        assert!(kind.unavailable_message().contains("/definitely/not/a/shell"));
    }

    #[cfg(not(windows))]
    #[test]
    fn command_prompt_unavailable_off_windows() {
        assert!(ShellKind::CommandPrompt.resolve_executable().is_none());
        assert_eq!(
            ShellKind::CommandPrompt.unavailable_message(),
            "Command Prompt not available, report an issue otherwise."
        );
        assert_eq!(ShellKind::CommandPrompt.icon(), "cmd");
    }

    #[cfg(unix)]
    #[test]
    fn custom_path_shell_builds_command() {
        let dir = tempfile::tempdir().unwrap();
        let kind = ShellKind::Custom(PathBuf::from("/bin/sh"));
        let cmd = build_shell_command(&kind, Some(dir.path())).unwrap();

        assert_eq!(cmd.program, PathBuf::from("/bin/sh"));
        assert!(cmd.args.is_empty());
        assert_eq!(cmd.cwd.as_deref(), Some(dir.path()));
        assert!(cmd
            .env
            .iter()
            .any(|(k, v)| k == "TERM" && v == "xterm-256color"));
    }

    #[cfg(unix)]
    #[test]
    fn find_command_in_path_checks_executable_bit() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("not-exec");
        std::fs::write(&script, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o644)).unwrap();
        assert!(find_command_in_path(&script.to_string_lossy()).is_none());

        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert_eq!(
            find_command_in_path(&script.to_string_lossy()),
            Some(script.clone())
        );
    }
}
