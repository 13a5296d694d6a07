//! Signing with a custom hook.
//!
//! A hook replaces signtool entirely. It is either supplied inline through
//! [`SignRequest::hook`](crate::SignRequest::hook) or resolved from a hook
//! module path by a [`HookResolver`]. The default resolver knows two kinds of
//! module:
//!
//! - a name registered with [`DefaultHookResolver::register`]
//! - an executable program, run once per file with the file path as its only
//!   argument, or once per batch with a JSON payload on stdin
//!
//! Hook failures never abort signing. Each one is logged and the next file is
//! processed, so callers relying on hooks must watch the logs for failures.

use crate::config::ResolvedConfig;
use crate::error::HookError;
use crate::spawn::{Invocation, ProcessRunner, SystemRunner};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// What a hook is asked to sign.
#[derive(Debug, Clone)]
pub enum HookInput {
    /// A single file, as an absolute path in directory mode.
    File(PathBuf),
    /// The whole operation, when files are not iterated.
    Batch(Box<ResolvedConfig>),
}

/// Custom signing logic.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use windows_sign::hook::{HookInput, SignHook};
/// use windows_sign::HookError;
///
/// struct AzureTrustedSigning;
///
/// #[async_trait]
/// impl SignHook for AzureTrustedSigning {
///     async fn call(&self, input: HookInput) -> Result<(), HookError> {
///         if let HookInput::File(path) = input {
///             println!("would sign {}", path.display());
///         }
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait SignHook: Send + Sync {
    async fn call(&self, input: HookInput) -> std::result::Result<(), HookError>;
}

/// A shareable, resolved signing hook.
#[derive(Clone)]
pub struct Hook(Arc<dyn SignHook>);

impl Hook {
    pub fn new(hook: impl SignHook + 'static) -> Self {
        Self(Arc::new(hook))
    }

    /// Wrap a synchronous closure.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(HookInput) -> std::result::Result<(), HookError> + Send + Sync + 'static,
    {
        Self::new(SyncFnHook(f))
    }

    /// Wrap a closure returning a future.
    pub fn from_async_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(HookInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), HookError>> + Send + 'static,
    {
        Self::new(AsyncFnHook(f))
    }

    pub async fn call(&self, input: HookInput) -> std::result::Result<(), HookError> {
        self.0.call(input).await
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Hook(..)")
    }
}

impl PartialEq for Hook {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

struct SyncFnHook<F>(F);

#[async_trait]
impl<F> SignHook for SyncFnHook<F>
where
    F: Fn(HookInput) -> std::result::Result<(), HookError> + Send + Sync,
{
    async fn call(&self, input: HookInput) -> std::result::Result<(), HookError> {
        (self.0)(input)
    }
}

struct AsyncFnHook<F>(F);

#[async_trait]
impl<F, Fut> SignHook for AsyncFnHook<F>
where
    F: Fn(HookInput) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<(), HookError>> + Send,
{
    async fn call(&self, input: HookInput) -> std::result::Result<(), HookError> {
        (self.0)(input).await
    }
}

/// JSON document sent to an executable hook in batch mode.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookPayload<'a> {
    pub files: &'a [PathBuf],
    pub certificate_file: Option<&'a Path>,
    pub certificate_password: Option<&'a str>,
    pub sign_with_params: Option<Vec<String>>,
    pub timestamp_server: &'a str,
    pub sign_tool_path: &'a Path,
    pub description: Option<&'a str>,
    pub website: Option<&'a str>,
    pub debug: bool,
    pub automatically_select_certificate: bool,
    #[serde(rename = "signJavaScript")]
    pub sign_javascript: bool,
}

impl<'a> From<&'a ResolvedConfig> for HookPayload<'a> {
    fn from(config: &'a ResolvedConfig) -> Self {
        Self {
            files: &config.files,
            certificate_file: config.certificate_file.as_deref(),
            certificate_password: config.certificate_password.as_ref().map(|p| p.expose()),
            sign_with_params: config.sign_with_params.as_ref().map(|p| p.tokens()),
            timestamp_server: &config.timestamp_server,
            sign_tool_path: &config.sign_tool_path,
            description: config.description.as_deref(),
            website: config.website.as_deref(),
            debug: config.debug,
            automatically_select_certificate: config.automatically_select_certificate,
            sign_javascript: config.sign_javascript,
        }
    }
}

/// A hook backed by an external program.
pub struct CommandHook {
    program: PathBuf,
    runner: Arc<dyn ProcessRunner>,
}

impl CommandHook {
    pub fn new(program: impl AsRef<Path>, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            runner,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

#[async_trait]
impl SignHook for CommandHook {
    async fn call(&self, input: HookInput) -> std::result::Result<(), HookError> {
        let invocation = match &input {
            HookInput::File(path) => Invocation::new(&self.program).arg(path),
            HookInput::Batch(config) => Invocation::new(&self.program)
                .stdin(serde_json::to_vec(&HookPayload::from(&**config))?),
        };

        let result = self.runner.run(&invocation).await?;

        if !result.success() {
            return Err(format!(
                "Hook {} exited with code {}. Stderr: {}. Stdout: {}",
                self.program.display(),
                result.code,
                result.stderr,
                result.stdout
            )
            .into());
        }

        Ok(())
    }
}

/// Turns a hook module path or name into a callable [`Hook`].
pub trait HookResolver: Send + Sync {
    /// # Errors
    ///
    /// Returns [`Error::HookResolution`] if nothing usable lives at `module`.
    fn resolve(&self, module: &Path) -> Result<Hook>;
}

/// Resolves registered hook names first, then executable programs.
#[derive(Clone)]
pub struct DefaultHookResolver {
    named: HashMap<String, Hook>,
    runner: Arc<dyn ProcessRunner>,
}

impl DefaultHookResolver {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            named: HashMap::new(),
            runner,
        }
    }

    /// Make `hook` available under `name` as a hook module path.
    pub fn register(mut self, name: impl Into<String>, hook: Hook) -> Self {
        self.named.insert(name.into(), hook);
        self
    }
}

impl Default for DefaultHookResolver {
    fn default() -> Self {
        Self::new(Arc::new(SystemRunner))
    }
}

impl fmt::Debug for DefaultHookResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultHookResolver")
            .field("named", &self.named.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl HookResolver for DefaultHookResolver {
    fn resolve(&self, module: &Path) -> Result<Hook> {
        if let Some(hook) = module.to_str().and_then(|name| self.named.get(name)) {
            return Ok(hook.clone());
        }

        let program = std::path::absolute(module)?;
        let metadata = std::fs::metadata(&program).map_err(|e| {
            Error::HookResolution(format!("Cannot load hook module {}: {}", program.display(), e))
        })?;

        if !metadata.is_file() {
            return Err(Error::HookResolution(format!(
                "Hook module {} is not a file",
                program.display()
            )));
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if metadata.permissions().mode() & 0o111 == 0 {
                return Err(Error::HookResolution(format!(
                    "Hook module {} is not executable",
                    program.display()
                )));
            }
        }

        debug!(program = %program.display(), "Resolved hook module");
        Ok(Hook::new(CommandHook::new(program, self.runner.clone())))
    }
}

/// The hook for this operation: the inline hook if any, else the module.
pub fn resolve_hook(config: &ResolvedConfig, resolver: &dyn HookResolver) -> Result<Hook> {
    if let Some(hook) = &config.hook_function {
        return Ok(hook.clone());
    }

    if let Some(module) = &config.hook_module_path {
        return resolver.resolve(module);
    }

    Err(Error::HookResolution(
        "Signing will not be possible. Pass a hook function or a hook module path.".into(),
    ))
}

/// Sign every file in `config` with its hook.
///
/// The hook is resolved once, before any file is processed. Files are signed
/// one after another; a failing file is logged and skipped. With
/// `no_iterate_files` the hook is called exactly once with the whole
/// configuration, and a failure is logged the same way.
///
/// # Errors
///
/// Only [`Error::HookResolution`] and I/O errors from resolution; hook
/// failures are never returned.
pub async fn sign_with_hook(config: &ResolvedConfig, resolver: &dyn HookResolver) -> Result<()> {
    let hook = resolve_hook(config, resolver)?;

    if config.no_iterate_files {
        debug!(files = config.files.len(), "Calling hook once for all files");
        if let Err(error) = hook.call(HookInput::Batch(Box::new(config.clone()))).await {
            warn!(%error, "Sign with hook failed");
        }
        return Ok(());
    }

    for file in &config.files {
        debug!(file = %file.display(), "Signing with hook");
        if let Err(error) = hook.call(HookInput::File(file.clone())).await {
            warn!(file = %file.display(), %error, "Error signing file");
        }
    }

    Ok(())
}
