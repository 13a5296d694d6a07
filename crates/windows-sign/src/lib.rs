//! Codesign Windows apps with `signtool.exe` or a custom hook.
//!
//! Point [`sign`] at an app directory (or a list of files) and every Windows
//! binary, installer, package, catalog and script in it is signed twice: once
//! with SHA-1 for older Windows versions and once with an appended SHA-256
//! signature. Unset options fall back to `WINDOWS_*` environment variables; see
//! [`config`] for the full table.
//!
//! # Examples
//!
//! ```no_run
//! use windows_sign::{sign, SignRequest};
//!
//! # async fn run() -> windows_sign::Result<()> {
//! let request = SignRequest::for_directory("out/MyApp-win32-x64")
//!     .certificate_file("codesign.pfx")
//!     .certificate_password("secret");
//! sign(&request).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod files;
pub mod hook;
pub mod logging;
pub mod request;
pub mod sign;
pub mod signtool;
pub mod spawn;

pub use config::{resolve, ResolvedConfig};
pub use error::{Error, HookError};
pub use files::files_to_sign;
pub use hook::{Hook, HookInput, SignHook};
pub use request::{CertificatePassword, SignRequest, SignWithParams};
pub use sign::{sign, Signer};
pub use signtool::{sign_with_signtool, HashAlgorithm, SigningPass};

pub type Result<T> = std::result::Result<T, Error>;
