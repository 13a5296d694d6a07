//! Option resolution.
//!
//! Turns a [`SignRequest`] into a [`ResolvedConfig`] by filling every unset
//! field, in order of precedence, from:
//!
//! 1. the request itself,
//! 2. the matching `WINDOWS_*` environment variable,
//! 3. a built-in default.
//!
//! Empty strings are treated as unset at every level.
//!
//! | Field | Environment variable | Default |
//! |-------|----------------------|---------|
//! | certificate file | `WINDOWS_CERTIFICATE_FILE` | none |
//! | certificate password | `WINDOWS_CERTIFICATE_PASSWORD` | none |
//! | extra signtool parameters | `WINDOWS_SIGN_WITH_PARAMS` | none |
//! | timestamp server | `WINDOWS_TIMESTAMP_SERVER` | [`DEFAULT_TIMESTAMP_SERVER`] |
//! | signtool path | `WINDOWS_SIGNTOOL_PATH` | `vendor/signtool.exe` beside the executable |
//! | description | `WINDOWS_SIGN_DESCRIPTION` | none |
//! | website | `WINDOWS_SIGN_WEBSITE` | none |
//! | sign JavaScript | `WINDOWS_SIGN_JAVASCRIPT` | `false` |
//! | hook module path | `WINDOWS_SIGN_HOOK_MODULE_PATH` | none |
//! | auto-select certificate | - | `true` |

use crate::hook::Hook;
use crate::request::{CertificatePassword, SignRequest, SignWithParams};
use crate::{Error, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const ENV_CERTIFICATE_FILE: &str = "WINDOWS_CERTIFICATE_FILE";
pub const ENV_CERTIFICATE_PASSWORD: &str = "WINDOWS_CERTIFICATE_PASSWORD";
pub const ENV_SIGN_WITH_PARAMS: &str = "WINDOWS_SIGN_WITH_PARAMS";
pub const ENV_TIMESTAMP_SERVER: &str = "WINDOWS_TIMESTAMP_SERVER";
pub const ENV_SIGNTOOL_PATH: &str = "WINDOWS_SIGNTOOL_PATH";
pub const ENV_SIGN_DESCRIPTION: &str = "WINDOWS_SIGN_DESCRIPTION";
pub const ENV_SIGN_WEBSITE: &str = "WINDOWS_SIGN_WEBSITE";
pub const ENV_SIGN_JAVASCRIPT: &str = "WINDOWS_SIGN_JAVASCRIPT";
pub const ENV_SIGN_HOOK_MODULE_PATH: &str = "WINDOWS_SIGN_HOOK_MODULE_PATH";

/// Timestamp authority used when none is configured.
pub const DEFAULT_TIMESTAMP_SERVER: &str = "http://timestamp.digicert.com";

/// Source of environment variables.
///
/// [`ProcessEnv`] reads the real process environment. A `HashMap` can stand in
/// for it when the environment must be fixed, e.g. in tests.
pub trait Environment: Send + Sync {
    fn var(&self, name: &str) -> Option<String>;
}

/// The current process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnv;

impl Environment for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl Environment for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// What a resolved configuration signs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignTarget {
    /// Scan this directory recursively.
    Directory(PathBuf),
    /// Sign these files as given.
    Files(Vec<PathBuf>),
}

/// A [`SignRequest`] with every fallback applied.
///
/// `files` is empty until discovery has run; see
/// [`ResolvedConfig::with_files`].
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub target: SignTarget,
    pub files: Vec<PathBuf>,
    pub certificate_file: Option<PathBuf>,
    pub certificate_password: Option<CertificatePassword>,
    pub sign_with_params: Option<SignWithParams>,
    pub timestamp_server: String,
    pub sign_tool_path: PathBuf,
    pub description: Option<String>,
    pub website: Option<String>,
    pub debug: bool,
    pub automatically_select_certificate: bool,
    pub sign_javascript: bool,
    pub hook_function: Option<Hook>,
    pub hook_module_path: Option<PathBuf>,
    pub no_iterate_files: bool,
}

impl ResolvedConfig {
    /// Attach the discovered file list.
    pub fn with_files(self, files: Vec<PathBuf>) -> Self {
        Self { files, ..self }
    }

    /// Whether signing goes through a hook rather than signtool.
    pub fn uses_hook(&self) -> bool {
        self.hook_function.is_some() || self.hook_module_path.is_some()
    }

    /// Check that signtool has credentials to work with.
    ///
    /// A certificate file and a password are each required unless extra
    /// signtool parameters are given, which may select a certificate from the
    /// store or a hardware token instead.
    pub fn validate_for_signtool(&self) -> Result<()> {
        let has_params = self.sign_with_params.is_some();

        if self.certificate_file.is_none() && !has_params {
            return Err(Error::Config(
                "You must provide a certificateFile or signing parameters".into(),
            ));
        }

        if self.certificate_password.is_none() && !has_params {
            return Err(Error::Config(
                "You must provide a certificatePassword or signing parameters".into(),
            ));
        }

        Ok(())
    }
}

/// Resolve a request against the process environment.
pub fn resolve(request: &SignRequest) -> Result<ResolvedConfig> {
    resolve_with_env(request, &ProcessEnv)
}

/// Resolve a request against the given environment.
///
/// Fails only when the request names both or neither of an app directory and
/// a file list. Credentials are checked later, and only for signtool signing.
pub fn resolve_with_env(request: &SignRequest, env: &dyn Environment) -> Result<ResolvedConfig> {
    let target = match (&request.app_directory, &request.files) {
        (Some(dir), None) => SignTarget::Directory(dir.clone()),
        (None, Some(files)) => SignTarget::Files(files.clone()),
        (Some(_), Some(_)) => {
            return Err(Error::Config(
                "Specify either an appDirectory or a list of files, not both".into(),
            ))
        }
        (None, None) => {
            return Err(Error::Config(
                "You must provide an appDirectory or a list of files to sign".into(),
            ))
        }
    };

    let certificate_file = request
        .certificate_file
        .clone()
        .filter(|p| !p.as_os_str().is_empty())
        .or_else(|| env_var(env, ENV_CERTIFICATE_FILE).map(PathBuf::from));

    let certificate_password = request
        .certificate_password
        .clone()
        .filter(|p| !p.is_empty())
        .or_else(|| env_var(env, ENV_CERTIFICATE_PASSWORD).map(CertificatePassword::new));

    let sign_with_params = request
        .sign_with_params
        .clone()
        .filter(|p| !p.is_empty())
        .or_else(|| env_var(env, ENV_SIGN_WITH_PARAMS).map(SignWithParams::Raw))
        .filter(|p| !p.is_empty());

    let timestamp_server = non_empty(request.timestamp_server.clone())
        .or_else(|| env_var(env, ENV_TIMESTAMP_SERVER))
        .unwrap_or_else(|| DEFAULT_TIMESTAMP_SERVER.to_string());

    let sign_tool_path = request
        .sign_tool_path
        .clone()
        .filter(|p| !p.as_os_str().is_empty())
        .or_else(|| env_var(env, ENV_SIGNTOOL_PATH).map(PathBuf::from))
        .unwrap_or_else(default_sign_tool_path);

    let description =
        non_empty(request.description.clone()).or_else(|| env_var(env, ENV_SIGN_DESCRIPTION));
    let website = non_empty(request.website.clone()).or_else(|| env_var(env, ENV_SIGN_WEBSITE));

    let sign_javascript = request
        .sign_javascript
        .or_else(|| boolean_from_env(env, ENV_SIGN_JAVASCRIPT))
        .unwrap_or(false);

    let hook_module_path = request
        .hook_module_path
        .clone()
        .filter(|p| !p.as_os_str().is_empty())
        .or_else(|| env_var(env, ENV_SIGN_HOOK_MODULE_PATH).map(PathBuf::from));

    Ok(ResolvedConfig {
        target,
        files: Vec::new(),
        certificate_file,
        certificate_password,
        sign_with_params,
        timestamp_server,
        sign_tool_path,
        description,
        website,
        debug: request.debug,
        automatically_select_certificate: request.automatically_select_certificate.unwrap_or(true),
        sign_javascript,
        hook_function: request.hook_function.clone(),
        hook_module_path,
        no_iterate_files: request.no_iterate_files,
    })
}

/// Parse a boolean environment variable.
///
/// Unset yields `None`. `"false"` (any case) and `"0"` are false; any other
/// non-empty value is true.
pub fn boolean_from_env(env: &dyn Environment, name: &str) -> Option<bool> {
    let value = env.var(name)?;

    if value.eq_ignore_ascii_case("false") || value == "0" {
        return Some(false);
    }

    Some(!value.is_empty())
}

/// `vendor/signtool.exe` next to the running executable.
pub fn default_sign_tool_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_default()
        .join("vendor")
        .join("signtool.exe")
}

fn env_var(env: &dyn Environment, name: &str) -> Option<String> {
    non_empty(env.var(name))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(vars: &[(&str, &str)]) -> HashMap<String, String> {
        vars.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = resolve_with_env(&SignRequest::for_directory("/app"), &env(&[])).unwrap();

        assert_eq!(config.target, SignTarget::Directory(PathBuf::from("/app")));
        assert!(config.files.is_empty());
        assert_eq!(config.timestamp_server, DEFAULT_TIMESTAMP_SERVER);
        assert_eq!(config.sign_tool_path, default_sign_tool_path());
        assert!(config.sign_tool_path.ends_with("vendor/signtool.exe"));
        assert!(config.automatically_select_certificate);
        assert!(!config.sign_javascript);
        assert!(!config.debug);
        assert!(config.certificate_file.is_none());
        assert!(config.certificate_password.is_none());
        assert!(!config.uses_hook());
    }

    #[test]
    fn test_env_fallback_certificate_file() {
        let config = resolve_with_env(
            &SignRequest::for_directory("/app"),
            &env(&[(ENV_CERTIFICATE_FILE, "/tmp/cert.pfx")]),
        )
        .unwrap();

        assert_eq!(config.certificate_file, Some(PathBuf::from("/tmp/cert.pfx")));
    }

    #[test]
    fn test_explicit_beats_env() {
        let request = SignRequest::for_directory("/app")
            .certificate_file("/mine.pfx")
            .timestamp_server("http://mine")
            .description("Mine");
        let config = resolve_with_env(
            &request,
            &env(&[
                (ENV_CERTIFICATE_FILE, "/env.pfx"),
                (ENV_TIMESTAMP_SERVER, "http://env"),
                (ENV_SIGN_DESCRIPTION, "Env"),
                (ENV_SIGN_WEBSITE, "https://env.example"),
            ]),
        )
        .unwrap();

        assert_eq!(config.certificate_file, Some(PathBuf::from("/mine.pfx")));
        assert_eq!(config.timestamp_server, "http://mine");
        assert_eq!(config.description.as_deref(), Some("Mine"));
        assert_eq!(config.website.as_deref(), Some("https://env.example"));
    }

    #[test]
    fn test_env_fallbacks() {
        let config = resolve_with_env(
            &SignRequest::for_files(["a.exe"]),
            &env(&[
                (ENV_CERTIFICATE_PASSWORD, "pw"),
                (ENV_SIGN_WITH_PARAMS, "/sm /n Corp"),
                (ENV_SIGNTOOL_PATH, "C:/tools/signtool.exe"),
                (ENV_SIGN_HOOK_MODULE_PATH, "/hooks/sign.sh"),
            ]),
        )
        .unwrap();

        assert_eq!(config.certificate_password.as_ref().unwrap().expose(), "pw");
        assert_eq!(
            config.sign_with_params,
            Some(SignWithParams::Raw("/sm /n Corp".into()))
        );
        assert_eq!(config.sign_tool_path, PathBuf::from("C:/tools/signtool.exe"));
        assert_eq!(config.hook_module_path, Some(PathBuf::from("/hooks/sign.sh")));
        assert!(config.uses_hook());
    }

    #[test]
    fn test_empty_values_fall_through() {
        let request = SignRequest::for_directory("/app")
            .timestamp_server("")
            .certificate_password("");
        let config = resolve_with_env(
            &request,
            &env(&[(ENV_TIMESTAMP_SERVER, ""), (ENV_CERTIFICATE_PASSWORD, "pw")]),
        )
        .unwrap();

        assert_eq!(config.timestamp_server, DEFAULT_TIMESTAMP_SERVER);
        assert_eq!(config.certificate_password.as_ref().unwrap().expose(), "pw");
    }

    #[test]
    fn test_boolean_from_env() {
        let vars = env(&[
            ("UPPER", "FALSE"),
            ("ZERO", "0"),
            ("YES", "yes"),
            ("ONE", "1"),
            ("EMPTY", ""),
        ]);

        assert_eq!(boolean_from_env(&vars, "MISSING"), None);
        assert_eq!(boolean_from_env(&vars, "UPPER"), Some(false));
        assert_eq!(boolean_from_env(&vars, "ZERO"), Some(false));
        assert_eq!(boolean_from_env(&vars, "YES"), Some(true));
        assert_eq!(boolean_from_env(&vars, "ONE"), Some(true));
        assert_eq!(boolean_from_env(&vars, "EMPTY"), Some(false));
    }

    #[test]
    fn test_sign_javascript_precedence() {
        let vars = env(&[(ENV_SIGN_JAVASCRIPT, "true")]);

        let from_env = resolve_with_env(&SignRequest::for_directory("/app"), &vars).unwrap();
        assert!(from_env.sign_javascript);

        let explicit =
            resolve_with_env(&SignRequest::for_directory("/app").sign_javascript(false), &vars)
                .unwrap();
        assert!(!explicit.sign_javascript);
    }

    #[test]
    fn test_target_both_or_neither() {
        let mut both = SignRequest::for_directory("/app");
        both.files = Some(vec![PathBuf::from("a.exe")]);
        assert!(matches!(
            resolve_with_env(&both, &env(&[])),
            Err(Error::Config(msg)) if msg.contains("not both")
        ));

        let neither = SignRequest::default();
        assert!(matches!(
            resolve_with_env(&neither, &env(&[])),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let request = SignRequest::for_directory("/app")
            .certificate_password("pw")
            .sign_with_params("/d \"My App\"");
        let vars = env(&[(ENV_CERTIFICATE_FILE, "/tmp/cert.pfx")]);

        let first = resolve_with_env(&request, &vars).unwrap();
        let second = resolve_with_env(&request, &vars).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_validate_missing_certificate() {
        let config = resolve_with_env(&SignRequest::for_files(["a.exe"]), &env(&[])).unwrap();
        let err = config.validate_for_signtool().unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("certificateFile")));
    }

    #[test]
    fn test_validate_missing_password() {
        let request = SignRequest::for_files(["a.exe"]).certificate_file("/c.pfx");
        let config = resolve_with_env(&request, &env(&[])).unwrap();
        let err = config.validate_for_signtool().unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("certificatePassword")));
    }

    #[test]
    fn test_validate_params_replace_credentials() {
        let request = SignRequest::for_files(["a.exe"]).sign_with_params("/sm /n Corp");
        let config = resolve_with_env(&request, &env(&[])).unwrap();
        assert!(config.validate_for_signtool().is_ok());
    }

    #[test]
    fn test_with_files() {
        let config = resolve_with_env(&SignRequest::for_directory("/app"), &env(&[]))
            .unwrap()
            .with_files(vec![PathBuf::from("/app/a.exe")]);
        assert_eq!(config.files, vec![PathBuf::from("/app/a.exe")]);
    }
}
