// Error types shared by the library. The binary wraps these in
// `anyhow::Error` with extra context; the library keeps them typed so
// callers (and tests) can tell a filesystem failure from a remote one.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure of one `upload_tree` run. Any variant means the walk stopped at
/// that point and the remote tree may hold a partial copy.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The upload root does not exist or is not a directory.
    #[error("{} is not a directory", path.display())]
    NotADirectory { path: PathBuf },

    /// A directory could not be listed or an entry could not be inspected
    /// (permission denied, broken symlink, ...).
    #[error("cannot read {}: {source}", path.display())]
    Traversal {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A symlinked directory points back at one of its ancestors.
    #[error("directory loop detected at {}", path.display())]
    SymlinkLoop { path: PathBuf },

    /// Creating a folder or uploading a file failed on the remote side.
    #[error("remote operation failed for {}: {source}", path.display())]
    Remote {
        path: PathBuf,
        #[source]
        source: RemoteError,
    },
}

impl UploadError {
    /// True for filesystem enumeration failures.
    pub fn is_traversal(&self) -> bool {
        matches!(
            self,
            UploadError::NotADirectory { .. }
                | UploadError::Traversal { .. }
                | UploadError::SymlinkLoop { .. }
        )
    }

    /// True for failures reported by the remote store.
    pub fn is_remote(&self) -> bool {
        matches!(self, UploadError::Remote { .. })
    }
}

/// Errors produced by a `RemoteStore` implementation.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("{0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("api error {status}: {message}")]
    Api { status: u16, message: String },

    /// Reading the local file during a transfer failed.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// The response did not have the expected shape.
    #[error("unexpected response: {0}")]
    Protocol(String),
}

/// Errors raised while driving the `gcloud` tool.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("'{0}' command not found")]
    CommandNotFound(String),

    #[error("command '{command}' exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("failed to run command: {0}")]
    Io(#[from] io::Error),

    #[error("access token was empty")]
    EmptyToken,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_error_kinds() {
        let traversal = UploadError::Traversal {
            path: PathBuf::from("/tmp/x"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(traversal.is_traversal());
        assert!(!traversal.is_remote());

        let remote = UploadError::Remote {
            path: PathBuf::from("/tmp/x/a.txt"),
            source: RemoteError::Api {
                status: 403,
                message: "forbidden".into(),
            },
        };
        assert!(remote.is_remote());
        assert!(!remote.is_traversal());
    }

    #[test]
    fn remote_message_includes_status() {
        let err = RemoteError::Api {
            status: 404,
            message: "File not found".into(),
        };
        assert_eq!(err.to_string(), "api error 404: File not found");
    }
}
