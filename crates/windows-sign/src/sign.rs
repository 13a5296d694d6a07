//! Signing entry point.
//!
//! [`Signer`] ties the pieces together: resolve the request, discover the
//! files, then hand them either to the hook or to signtool. The choice is made
//! once per call; a failing hook never falls back to signtool.

use crate::config::{resolve_with_env, Environment, ProcessEnv, ResolvedConfig};
use crate::files::files_to_sign;
use crate::hook::{sign_with_hook, DefaultHookResolver, HookResolver};
use crate::request::SignRequest;
use crate::signtool::sign_with_signtool;
use crate::spawn::{ProcessRunner, SystemRunner};
use crate::Result;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Windows code signer with builder pattern API.
///
/// The defaults spawn real processes, read the process environment and
/// resolve hook modules as executables. Each can be replaced.
///
/// # Example
///
/// ```no_run
/// use windows_sign::{SignRequest, Signer};
///
/// # async fn run() -> windows_sign::Result<()> {
/// let request = SignRequest::for_directory("out/MyApp-win32-x64")
///     .certificate_file("codesign.pfx")
///     .certificate_password("secret");
///
/// Signer::new().sign(&request).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Signer {
    runner: Arc<dyn ProcessRunner>,
    hook_resolver: Arc<dyn HookResolver>,
    env: Arc<dyn Environment>,
}

impl Signer {
    pub fn new() -> Self {
        let runner: Arc<dyn ProcessRunner> = Arc::new(SystemRunner);
        Self {
            hook_resolver: Arc::new(DefaultHookResolver::new(runner.clone())),
            runner,
            env: Arc::new(ProcessEnv),
        }
    }

    /// Run signtool through `runner`.
    ///
    /// Executable hook modules keep the runner of the hook resolver; pass a
    /// [`DefaultHookResolver`] built with the same runner to redirect both.
    pub fn runner(mut self, runner: Arc<dyn ProcessRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Resolve hook module paths with `resolver`.
    pub fn hook_resolver(mut self, resolver: Arc<dyn HookResolver>) -> Self {
        self.hook_resolver = resolver;
        self
    }

    /// Read `WINDOWS_*` fallbacks from `env` instead of the process environment.
    pub fn environment(mut self, env: Arc<dyn Environment>) -> Self {
        self.env = env;
        self
    }

    /// Resolve `request` and discover the files it covers.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] for a malformed request and
    /// [`crate::Error::Discovery`] if the app directory cannot be walked.
    pub fn prepare(&self, request: &SignRequest) -> Result<ResolvedConfig> {
        let config = resolve_with_env(request, self.env.as_ref())?;
        let files = files_to_sign(&config)?;
        Ok(config.with_files(files))
    }

    /// Sign everything `request` covers.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The request is malformed or signtool credentials are missing
    /// - The app directory cannot be walked
    /// - No hook can be resolved for a hook module path
    /// - signtool cannot be started or exits non-zero
    ///
    /// Individual hook failures are logged, not returned.
    pub async fn sign(&self, request: &SignRequest) -> Result<()> {
        debug!(?request, "windows-sign called with options");

        let config = self.prepare(request)?;

        if config.uses_hook() {
            info!(files = config.files.len(), "Signing with hook");
            sign_with_hook(&config, self.hook_resolver.as_ref()).await
        } else {
            sign_with_signtool(&config, self.runner.as_ref()).await
        }
    }
}

impl Default for Signer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer").finish_non_exhaustive()
    }
}

/// Sign everything `request` covers with the default [`Signer`].
pub async fn sign(request: &SignRequest) -> Result<()> {
    Signer::new().sign(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ENV_CERTIFICATE_FILE;
    use crate::hook::{Hook, HookInput};
    use crate::spawn::{Invocation, ProcessResult};
    use crate::Error;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tempfile::tempdir;

    #[derive(Default)]
    struct RecordingRunner {
        calls: Mutex<Vec<Invocation>>,
    }

    #[async_trait]
    impl ProcessRunner for RecordingRunner {
        async fn run(&self, invocation: &Invocation) -> Result<ProcessResult> {
            self.calls.lock().unwrap().push(invocation.clone());
            Ok(ProcessResult {
                code: 0,
                stdout: String::new(),
                stderr: String::new(),
            })
        }
    }

    fn empty_env() -> Arc<dyn Environment> {
        Arc::new(HashMap::<String, String>::new())
    }

    #[test]
    fn test_prepare_discovers_files() {
        let temp_dir = tempdir().unwrap();
        fs::write(temp_dir.path().join("app.exe"), b"").unwrap();
        fs::write(temp_dir.path().join("notes.txt"), b"").unwrap();

        let config = Signer::new()
            .environment(empty_env())
            .prepare(&SignRequest::for_directory(temp_dir.path()))
            .unwrap();

        assert_eq!(config.files, vec![temp_dir.path().join("app.exe")]);
    }

    #[tokio::test]
    async fn test_signtool_path_used_without_hook() {
        let runner = Arc::new(RecordingRunner::default());
        let env: Arc<dyn Environment> = Arc::new(HashMap::from([(
            ENV_CERTIFICATE_FILE.to_string(),
            "/tmp/cert.pfx".to_string(),
        )]));

        Signer::new()
            .runner(runner.clone())
            .environment(env)
            .sign(&SignRequest::for_files(["a.exe"]).certificate_password("pw"))
            .await
            .unwrap();

        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert!(calls[0]
            .get_args()
            .iter()
            .any(|a| a == "/tmp/cert.pfx" || PathBuf::from(a).ends_with("cert.pfx")));
    }

    #[tokio::test]
    async fn test_hook_path_skips_signtool() {
        let runner = Arc::new(RecordingRunner::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorded = seen.clone();
        let hook = Hook::from_fn(move |input| {
            if let HookInput::File(path) = input {
                recorded.lock().unwrap().push(path);
            }
            Ok(())
        });

        Signer::new()
            .runner(runner.clone())
            .environment(empty_env())
            .sign(&SignRequest::for_files(["a.exe", "b.dll"]).hook(hook))
            .await
            .unwrap();

        assert!(runner.calls.lock().unwrap().is_empty());
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_hook_does_not_require_credentials() {
        let hook = Hook::from_fn(|_| Err("always fails".into()));

        let result = Signer::new()
            .runner(Arc::new(RecordingRunner::default()))
            .environment(empty_env())
            .sign(&SignRequest::for_files(["a.exe"]).hook(hook))
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_before_spawn() {
        let runner = Arc::new(RecordingRunner::default());

        let result = Signer::new()
            .runner(runner.clone())
            .environment(empty_env())
            .sign(&SignRequest::for_files(["a.exe"]))
            .await;

        assert!(matches!(result, Err(Error::Config(_))));
        assert!(runner.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_directory_is_discovery_error() {
        let temp_dir = tempdir().unwrap();
        let request = SignRequest::for_directory(temp_dir.path().join("missing"))
            .certificate_file("c.pfx")
            .certificate_password("pw");

        let result = Signer::new()
            .runner(Arc::new(RecordingRunner::default()))
            .environment(empty_env())
            .sign(&request)
            .await;

        assert!(matches!(result, Err(Error::Discovery(_))));
    }
}
