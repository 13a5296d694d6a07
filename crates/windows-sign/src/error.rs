//! Error types for windows-sign operations.
//!
//! This module defines the [`enum@Error`] enum covering all failure cases
//! surfaced by [`crate::sign`]: configuration, file discovery, launching and
//! running the signing tool, and hook resolution.
//!
//! Failures raised *inside* a signing hook are not part of this enum. They are
//! reported as [`HookError`] values, logged, and never abort a batch.
//!
//! # See Also
//!
//! - [`crate::Result`] - Convenience type alias using this error

use std::path::PathBuf;
use thiserror::Error;

/// Error type returned by a signing hook.
///
/// Hooks are user code, so any error type can be boxed into this.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Error type for windows-sign operations.
///
/// # Examples
///
/// ```no_run
/// use windows_sign::{sign, Error, SignRequest};
///
/// # async fn run() {
/// let request = SignRequest::for_directory("out/MyApp-win32-x64");
/// match sign(&request).await {
///     Ok(()) => println!("Signed successfully"),
///     Err(Error::Config(msg)) => eprintln!("Bad configuration: {msg}"),
///     Err(Error::ToolExecution { code, stderr, .. }) => {
///         eprintln!("signtool exited with {code}: {stderr}")
///     }
///     Err(e) => eprintln!("Other error: {e}"),
/// }
/// # }
/// ```
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or incomplete configuration.
    ///
    /// Raised when signing credentials are missing after every fallback has
    /// been consulted, or when a request names both (or neither) of an app
    /// directory and a file list. No signing is attempted.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Walking the app directory failed.
    ///
    /// Typically the directory does not exist or an entry could not be read.
    #[error("Failed to discover files to sign: {0}")]
    Discovery(#[source] std::io::Error),

    /// The signing tool (or an executable hook) could not be started.
    #[error("Failed to spawn {}: {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The signing tool exited with a non-zero status.
    ///
    /// When the first (SHA-1) pass fails the SHA-256 pass is never run.
    #[error("Signtool exited with code {code}. Stderr: {stderr}. Stdout: {stdout}")]
    ToolExecution {
        code: i32,
        stderr: String,
        stdout: String,
    },

    /// No usable signing hook could be found.
    #[error("No hook function found. {0}")]
    HookResolution(String),

    /// I/O operation failed outside of discovery.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON request or hook payload could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
