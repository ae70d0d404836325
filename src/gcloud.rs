// Thin wrapper around the `gcloud` command-line tool. Everything here is a
// single process invocation: login, quota project and access tokens are all
// delegated to the Cloud SDK, which owns credential storage.

use std::cell::RefCell;
use std::io;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::api::TokenSource;
use crate::error::AuthError;

const TRACING_TARGET: &str = "gdrive_upload_helper::gcloud";

/// Scopes requested when logging in Application Default Credentials.
pub const LOGIN_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/cloud-platform",
    "https://www.googleapis.com/auth/drive",
];

/// Access tokens from the SDK live for an hour; refresh well before that.
const TOKEN_LIFETIME: Duration = Duration::from_secs(45 * 60);

#[cfg(windows)]
const DEFAULT_PROGRAM: &str = "gcloud.cmd";
#[cfg(not(windows))]
const DEFAULT_PROGRAM: &str = "gcloud";

/// Runs `gcloud` subcommands.
#[derive(Debug, Clone)]
pub struct Gcloud {
    program: String,
}

impl Gcloud {
    pub fn new() -> Self {
        Gcloud::with_program(DEFAULT_PROGRAM)
    }

    /// Use another executable, e.g. an absolute path to the SDK binary.
    pub fn with_program(program: impl Into<String>) -> Self {
        Gcloud {
            program: program.into(),
        }
    }

    /// The command line as it would be typed in a shell, for echoing.
    pub fn command_line(&self, args: &[&str]) -> String {
        std::iter::once(self.program.as_str())
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run `gcloud <args>`. With `capture` the standard output is returned,
    /// otherwise the child shares the terminal (needed for interactive login).
    pub fn run(&self, args: &[&str], capture: bool) -> Result<Option<String>, AuthError> {
        let command = self.command_line(args);
        debug!(target: TRACING_TARGET, %command, capture, "running command");

        let mut cmd = Command::new(&self.program);
        cmd.args(args);

        if capture {
            let output = cmd
                .stdin(Stdio::null())
                .output()
                .map_err(|e| self.spawn_error(e))?;
            if !output.status.success() {
                return Err(AuthError::CommandFailed {
                    command,
                    status: output.status.to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                });
            }
            Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()))
        } else {
            let status = cmd.status().map_err(|e| self.spawn_error(e))?;
            if !status.success() {
                return Err(AuthError::CommandFailed {
                    command,
                    status: status.to_string(),
                    stderr: String::new(),
                });
            }
            Ok(None)
        }
    }

    /// `gcloud --version`; fails if the SDK is not installed.
    pub fn version(&self) -> Result<String, AuthError> {
        Ok(self.run(&["--version"], true)?.unwrap_or_default())
    }

    /// Opens a browser for the user to authorize ADC with `scopes`.
    pub fn application_default_login(&self, scopes: &[&str]) -> Result<(), AuthError> {
        let scopes = format!("--scopes={}", scopes.join(","));
        self.run(&["auth", "application-default", "login", &scopes], false)?;
        info!(target: TRACING_TARGET, "application default credentials login finished");
        Ok(())
    }

    pub fn set_quota_project(&self, project: &str) -> Result<(), AuthError> {
        self.run(
            &["auth", "application-default", "set-quota-project", project],
            false,
        )?;
        info!(target: TRACING_TARGET, project, "quota project set");
        Ok(())
    }

    /// A fresh access token for the current Application Default Credentials.
    pub fn print_access_token(&self) -> Result<String, AuthError> {
        let out = self
            .run(&["auth", "application-default", "print-access-token"], true)?
            .unwrap_or_default();
        let token = out.trim();
        if token.is_empty() {
            return Err(AuthError::EmptyToken);
        }
        Ok(token.to_string())
    }

    fn spawn_error(&self, err: io::Error) -> AuthError {
        if err.kind() == io::ErrorKind::NotFound {
            AuthError::CommandNotFound(self.program.clone())
        } else {
            AuthError::Io(err)
        }
    }
}

/// Access tokens obtained from `gcloud`, cached until they get old.
#[derive(Debug)]
pub struct GcloudCredentials {
    gcloud: Gcloud,
    cached: RefCell<Option<(String, Instant)>>,
}

impl GcloudCredentials {
    pub fn new(gcloud: Gcloud) -> Self {
        GcloudCredentials {
            gcloud,
            cached: RefCell::new(None),
        }
    }
}

impl TokenSource for GcloudCredentials {
    fn access_token(&self) -> Result<String, AuthError> {
        if let Some((token, fetched)) = self.cached.borrow().as_ref() {
            if fetched.elapsed() < TOKEN_LIFETIME {
                return Ok(token.clone());
            }
        }

        let token = self.gcloud.print_access_token()?;
        debug!(target: TRACING_TARGET, "refreshed access token");
        *self.cached.borrow_mut() = Some((token.clone(), Instant::now()));
        Ok(token)
    }
}

/// Best-effort attempt at showing `url` in the user's browser.
pub fn open_browser(url: &str) -> io::Result<()> {
    let mut cmd = if cfg!(target_os = "windows") {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", "start", ""]);
        cmd
    } else if cfg!(target_os = "macos") {
        Command::new("open")
    } else {
        Command::new("xdg-open")
    };

    let status = cmd
        .arg(url)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()?;
    if status.success() {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::Other,
            format!("browser opener exited with {status}"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_joins_args() {
        let gcloud = Gcloud::with_program("gcloud");
        assert_eq!(
            gcloud.command_line(&["auth", "application-default", "login"]),
            "gcloud auth application-default login"
        );
    }

    #[test]
    fn missing_program_is_reported() {
        let gcloud = Gcloud::with_program("gdrive-upload-helper-no-such-binary");
        match gcloud.version() {
            Err(AuthError::CommandNotFound(program)) => {
                assert_eq!(program, "gdrive-upload-helper-no-such-binary")
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn failing_command_is_reported() {
        let gcloud = Gcloud::with_program("false");
        assert!(matches!(
            gcloud.run(&[], true),
            Err(AuthError::CommandFailed { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn captured_output_becomes_token() {
        // `echo` stands in for gcloud and prints its arguments back.
        let creds = GcloudCredentials::new(Gcloud::with_program("echo"));
        let token = creds.access_token().unwrap();
        assert_eq!(token, "auth application-default print-access-token");
        assert!(creds.cached.borrow().is_some());
        assert_eq!(creds.access_token().unwrap(), token);
    }
}
