//! Caller-facing sign request.
//!
//! A [`SignRequest`] describes *what* to sign (an app directory to scan, or an
//! explicit list of files) and carries every optional signing parameter. Unset
//! parameters are filled in later by [`crate::config::resolve`] from the
//! environment and built-in defaults.

use crate::hook::Hook;
use crate::spawn::redact_args;
use crate::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Password for the `.pfx` certificate.
///
/// Redacted in `Debug` output and zeroized on drop.
#[derive(Clone, Deserialize)]
#[serde(transparent)]
pub struct CertificatePassword(SecretString);

impl CertificatePassword {
    pub fn new(password: impl Into<String>) -> Self {
        Self(SecretString::new(password.into()))
    }

    /// Borrow the plain-text password.
    pub fn expose(&self) -> &str {
        self.0.expose_secret().as_str()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.expose().is_empty()
    }
}

impl fmt::Debug for CertificatePassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CertificatePassword([REDACTED])")
    }
}

impl PartialEq for CertificatePassword {
    fn eq(&self, other: &Self) -> bool {
        self.expose() == other.expose()
    }
}

impl Eq for CertificatePassword {}

/// Additional parameters passed through to `signtool.exe`.
///
/// Either a single command-line string, which is split into tokens before use,
/// or an already-split token list.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SignWithParams {
    Raw(String),
    Tokens(Vec<String>),
}

impl SignWithParams {
    /// Canonical token sequence for these parameters.
    ///
    /// # Examples
    ///
    /// ```
    /// use windows_sign::SignWithParams;
    ///
    /// let params = SignWithParams::from(r#"/d "My App" /tr http://x"#);
    /// assert_eq!(params.tokens(), vec!["/d", "My App", "/tr", "http://x"]);
    /// ```
    pub fn tokens(&self) -> Vec<String> {
        match self {
            SignWithParams::Raw(raw) => tokenize_params(raw),
            SignWithParams::Tokens(tokens) => tokens.clone(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        match self {
            SignWithParams::Raw(raw) => raw.trim().is_empty(),
            SignWithParams::Tokens(tokens) => tokens.is_empty(),
        }
    }
}

impl fmt::Debug for SignWithParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SignWithParams")
            .field(&redact_args(&self.tokens()))
            .finish()
    }
}

impl From<&str> for SignWithParams {
    fn from(raw: &str) -> Self {
        SignWithParams::Raw(raw.to_string())
    }
}

impl From<String> for SignWithParams {
    fn from(raw: String) -> Self {
        SignWithParams::Raw(raw)
    }
}

impl From<Vec<String>> for SignWithParams {
    fn from(tokens: Vec<String>) -> Self {
        SignWithParams::Tokens(tokens)
    }
}

/// Split a parameter string at whitespace, keeping double-quoted runs together.
///
/// Quotes are removed from the resulting tokens. Quoted and unquoted text
/// directly adjacent to each other form a single token (`/n"My Cert"` yields
/// `/nMy Cert`). An unterminated quote runs to the end of the input.
pub fn tokenize_params(raw: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut in_quotes = false;

    for c in raw.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                in_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if in_token {
        tokens.push(current);
    }

    tokens
}

/// Everything a caller can say about a signing operation.
///
/// Build one with [`SignRequest::for_directory`] or [`SignRequest::for_files`]
/// and chain the optional setters, or load one from JSON with
/// [`SignRequest::from_json_file`].
///
/// # Example
///
/// ```no_run
/// use windows_sign::SignRequest;
///
/// let request = SignRequest::for_directory("out/MyApp-win32-x64")
///     .certificate_file("certs/codesign.pfx")
///     .certificate_password("secret")
///     .description("My App")
///     .website("https://example.com");
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SignRequest {
    pub(crate) app_directory: Option<PathBuf>,
    pub(crate) files: Option<Vec<PathBuf>>,
    pub(crate) certificate_file: Option<PathBuf>,
    pub(crate) certificate_password: Option<CertificatePassword>,
    pub(crate) timestamp_server: Option<String>,
    pub(crate) sign_tool_path: Option<PathBuf>,
    pub(crate) sign_with_params: Option<SignWithParams>,
    pub(crate) description: Option<String>,
    pub(crate) website: Option<String>,
    pub(crate) debug: bool,
    pub(crate) automatically_select_certificate: Option<bool>,
    #[serde(rename = "signJavaScript")]
    pub(crate) sign_javascript: Option<bool>,
    #[serde(skip)]
    pub(crate) hook_function: Option<Hook>,
    pub(crate) hook_module_path: Option<PathBuf>,
    pub(crate) no_iterate_files: bool,
}

impl SignRequest {
    /// Sign every recognized file below `app_directory`.
    pub fn for_directory(app_directory: impl AsRef<Path>) -> Self {
        Self {
            app_directory: Some(app_directory.as_ref().to_path_buf()),
            ..Self::default()
        }
    }

    /// Sign exactly these files, without scanning or filtering.
    pub fn for_files<I, P>(files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        Self {
            files: Some(files.into_iter().map(|f| f.as_ref().to_path_buf()).collect()),
            ..Self::default()
        }
    }

    /// Parse a request from a JSON document with camelCase keys.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a JSON request file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read {}: {}", path.as_ref().display(), e),
            ))
        })?;
        Self::from_json_str(&contents)
    }

    /// Path to a `.pfx` code signing certificate.
    ///
    /// Falls back to `WINDOWS_CERTIFICATE_FILE` when unset.
    pub fn certificate_file(mut self, path: impl AsRef<Path>) -> Self {
        self.certificate_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Password for the certificate.
    ///
    /// Falls back to `WINDOWS_CERTIFICATE_PASSWORD` when unset. Not needed
    /// when [`SignRequest::sign_with_params`] supplies the credentials.
    pub fn certificate_password(mut self, password: impl Into<String>) -> Self {
        self.certificate_password = Some(CertificatePassword::new(password));
        self
    }

    /// Timestamp authority URL.
    pub fn timestamp_server(mut self, url: impl Into<String>) -> Self {
        self.timestamp_server = Some(url.into());
        self
    }

    /// Path to the `signtool.exe` to invoke.
    pub fn sign_tool_path(mut self, path: impl AsRef<Path>) -> Self {
        self.sign_tool_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Extra parameters appended to every signtool invocation.
    pub fn sign_with_params(mut self, params: impl Into<SignWithParams>) -> Self {
        self.sign_with_params = Some(params.into());
        self
    }

    /// Description of the signed content, passed as `/d`.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// URL for the expanded description, passed as `/du`.
    pub fn website(mut self, url: impl Into<String>) -> Self {
        self.website = Some(url.into());
        self
    }

    /// Pass `/debug` to signtool.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Let signtool pick the best certificate (`/a`). On by default.
    pub fn automatically_select_certificate(mut self, enabled: bool) -> Self {
        self.automatically_select_certificate = Some(enabled);
        self
    }

    /// Also sign `.js` files found while scanning a directory.
    pub fn sign_javascript(mut self, enabled: bool) -> Self {
        self.sign_javascript = Some(enabled);
        self
    }

    /// Sign with custom logic instead of signtool.
    pub fn hook(mut self, hook: Hook) -> Self {
        self.hook_function = Some(hook);
        self
    }

    /// Sign with a hook resolved from a path or registered name.
    ///
    /// See [`crate::hook::DefaultHookResolver`].
    pub fn hook_module_path(mut self, path: impl AsRef<Path>) -> Self {
        self.hook_module_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Call the hook once with the whole configuration instead of per file.
    pub fn no_iterate_files(mut self, enabled: bool) -> Self {
        self.no_iterate_files = enabled;
        self
    }

    /// Whether signtool (and logging) run in debug mode.
    pub fn is_debug(&self) -> bool {
        self.debug
    }

    /// Directory to scan, if this is a directory request.
    pub fn app_directory_path(&self) -> Option<&Path> {
        self.app_directory.as_deref()
    }

    /// Explicit file list, if this is a files request.
    pub fn file_list(&self) -> Option<&[PathBuf]> {
        self.files.as_deref()
    }
}
