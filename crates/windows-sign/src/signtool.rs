//! Signing with `signtool.exe`.
//!
//! Every file is signed twice: first with a SHA-1 digest, then with an
//! appended SHA-256 signature. SHA-1 has been deprecated on Windows since
//! 2016, but older Windows versions only validate SHA-1 signatures, so both
//! are shipped.
//!
//! See Microsoft's SignTool documentation for the meaning of each flag:
//! <https://learn.microsoft.com/en-us/dotnet/framework/tools/signtool-exe>

use crate::config::ResolvedConfig;
use crate::spawn::{Invocation, ProcessRunner};
use crate::{Error, Result};
use std::ffi::OsString;
use std::fmt;
use tracing::{debug, info};

/// File digest algorithm for one signing pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha1,
    Sha256,
}

impl HashAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha256 => "sha256",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One signtool invocation over the whole file list.
#[derive(Debug, Clone, Copy)]
pub struct SigningPass<'a> {
    config: &'a ResolvedConfig,
    hash: HashAlgorithm,
    append_signature: bool,
}

impl<'a> SigningPass<'a> {
    /// The SHA-1 primary signature.
    pub fn primary(config: &'a ResolvedConfig) -> Self {
        Self {
            config,
            hash: HashAlgorithm::Sha1,
            append_signature: false,
        }
    }

    /// The SHA-256 signature appended to the primary one.
    pub fn appended(config: &'a ResolvedConfig) -> Self {
        Self {
            config,
            hash: HashAlgorithm::Sha256,
            append_signature: true,
        }
    }

    /// Both passes, in the order they must run.
    pub fn dual_sign(config: &'a ResolvedConfig) -> [Self; 2] {
        [Self::primary(config), Self::appended(config)]
    }

    pub fn hash(&self) -> HashAlgorithm {
        self.hash
    }

    pub fn append_signature(&self) -> bool {
        self.append_signature
    }

    /// Signtool arguments for this pass, excluding the target files.
    ///
    /// # Errors
    ///
    /// Returns an error if the certificate path cannot be made absolute.
    pub fn args(&self) -> Result<Vec<OsString>> {
        let config = self.config;
        let mut args: Vec<OsString> = vec!["sign".into()];

        if config.automatically_select_certificate {
            args.push("/a".into());
        }

        if self.append_signature {
            args.push("/as".into());
        }

        // RFC 3161 timestamping takes a digest; legacy Authenticode timestamping does not.
        match self.hash {
            HashAlgorithm::Sha256 => {
                args.push("/tr".into());
                args.push(config.timestamp_server.clone().into());
                args.push("/td".into());
                args.push(self.hash.as_str().into());
            }
            HashAlgorithm::Sha1 => {
                args.push("/t".into());
                args.push(config.timestamp_server.clone().into());
            }
        }

        if let Some(certificate_file) = &config.certificate_file {
            args.push("/f".into());
            args.push(std::path::absolute(certificate_file)?.into_os_string());
        }

        if let Some(password) = &config.certificate_password {
            args.push("/p".into());
            args.push(password.expose().into());
        }

        args.push("/fd".into());
        args.push(self.hash.as_str().into());

        if let Some(description) = &config.description {
            args.push("/d".into());
            args.push(description.into());
        }

        if let Some(website) = &config.website {
            args.push("/du".into());
            args.push(website.into());
        }

        if config.debug {
            args.push("/debug".into());
        }

        if let Some(params) = &config.sign_with_params {
            args.extend(params.tokens().into_iter().map(OsString::from));
        }

        Ok(args)
    }

    /// The complete invocation: signtool path, arguments, then every file.
    pub fn invocation(&self) -> Result<Invocation> {
        Ok(Invocation::new(&self.config.sign_tool_path)
            .args(self.args()?)
            .args(&self.config.files))
    }

    /// Run this pass, failing on a non-zero exit code.
    pub async fn execute(&self, runner: &dyn ProcessRunner) -> Result<()> {
        let invocation = self.invocation()?;

        info!(
            hash = %self.hash,
            files = self.config.files.len(),
            "Signing with signtool"
        );
        // Arguments may carry the certificate password.
        debug!(
            program = %invocation.program().display(),
            files = ?self.config.files,
            "Executing signtool"
        );

        let result = runner.run(&invocation).await?;

        if !result.success() {
            return Err(Error::ToolExecution {
                code: result.code,
                stderr: result.stderr,
                stdout: result.stdout,
            });
        }

        Ok(())
    }
}

/// Dual-sign every file in `config` with signtool.
///
/// Credentials are validated before anything is spawned. The SHA-256 pass
/// only runs once the SHA-1 pass has succeeded.
///
/// # Errors
///
/// - [`Error::Config`] if credentials are missing
/// - [`Error::Spawn`] if signtool cannot be started
/// - [`Error::ToolExecution`] if either pass exits non-zero
pub async fn sign_with_signtool(config: &ResolvedConfig, runner: &dyn ProcessRunner) -> Result<()> {
    config.validate_for_signtool()?;

    for pass in SigningPass::dual_sign(config) {
        pass.execute(runner).await?;
    }

    Ok(())
}
