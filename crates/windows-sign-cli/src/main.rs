//! Command-line interface for windows-sign.
//!
//! Signs every Windows binary in an app directory, or an explicit list of
//! files, with signtool.exe or a hook program.

use clap::{ArgAction, CommandFactory, Parser};
use std::path::PathBuf;
use std::process::ExitCode;
use windows_sign::logging::init_tracing;
use windows_sign::{sign, SignRequest};

#[derive(Parser)]
#[command(name = "windows-sign")]
#[command(about = "Codesign Windows binaries and installers")]
struct Cli {
    /// App directory to scan for files to sign
    app: Option<PathBuf>,

    /// Sign this file instead of scanning a directory (repeatable)
    #[arg(long = "file", value_name = "FILE", conflicts_with = "app")]
    files: Vec<PathBuf>,

    /// Load the sign request from a JSON file; other flags override it
    #[arg(long, value_name = "JSON", conflicts_with_all = ["app", "files"])]
    config: Option<PathBuf>,

    /// Path to a .pfx code signing certificate
    #[arg(long)]
    certificate_file: Option<PathBuf>,

    /// Password for the certificate
    #[arg(long)]
    certificate_password: Option<String>,

    /// Path to signtool.exe
    #[arg(long)]
    sign_tool_path: Option<PathBuf>,

    /// Timestamp server URL
    #[arg(long)]
    timestamp_server: Option<String>,

    /// Description of the signed content (/d)
    #[arg(long)]
    description: Option<String>,

    /// URL for the signed content (/du)
    #[arg(long)]
    website: Option<String>,

    /// Additional parameters passed to signtool.exe
    #[arg(long, allow_hyphen_values = true)]
    sign_with_params: Option<String>,

    /// Enable debug logging and pass /debug to signtool.exe
    #[arg(long)]
    debug: bool,

    /// Let signtool.exe select the best certificate (/a) [default: true]
    #[arg(long, action = ArgAction::Set, value_name = "BOOL")]
    automatically_select_certificate: Option<bool>,

    /// Also sign .js files; `--sign-javascript=false` overrides the environment
    #[arg(
        long,
        value_name = "BOOL",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        action = ArgAction::Set
    )]
    sign_javascript: Option<bool>,

    /// Executable called for each file instead of signtool.exe
    #[arg(long)]
    hook_module_path: Option<PathBuf>,

    /// Call the hook once with all files instead of once per file
    #[arg(long)]
    no_iterate_files: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let request = match build_request(&cli) {
        Ok(Some(request)) => request,
        Ok(None) => {
            let _ = Cli::command().print_help();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("Sign failed:");
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(debug_logging(&cli, &request));

    match sign(&request).await {
        Ok(()) => {
            println!("Application signed: {}", describe_target(&request));
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Sign failed:");
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// Build the request from the command line, or `None` if there is nothing to sign.
fn build_request(cli: &Cli) -> windows_sign::Result<Option<SignRequest>> {
    let mut request = if let Some(ref config) = cli.config {
        SignRequest::from_json_file(config)?
    } else if !cli.files.is_empty() {
        SignRequest::for_files(&cli.files)
    } else if let Some(ref app) = cli.app {
        SignRequest::for_directory(app)
    } else {
        return Ok(None);
    };

    if let Some(ref path) = cli.certificate_file {
        request = request.certificate_file(path);
    }
    if let Some(ref password) = cli.certificate_password {
        request = request.certificate_password(password.clone());
    }
    if let Some(ref path) = cli.sign_tool_path {
        request = request.sign_tool_path(path);
    }
    if let Some(ref url) = cli.timestamp_server {
        request = request.timestamp_server(url.clone());
    }
    if let Some(ref description) = cli.description {
        request = request.description(description.clone());
    }
    if let Some(ref website) = cli.website {
        request = request.website(website.clone());
    }
    if let Some(ref params) = cli.sign_with_params {
        request = request.sign_with_params(params.as_str());
    }
    if cli.debug {
        request = request.debug(true);
    }
    if let Some(enabled) = cli.automatically_select_certificate {
        request = request.automatically_select_certificate(enabled);
    }
    // Unset leaves room for WINDOWS_SIGN_JAVASCRIPT.
    if let Some(enabled) = cli.sign_javascript {
        request = request.sign_javascript(enabled);
    }
    if let Some(ref path) = cli.hook_module_path {
        request = request.hook_module_path(path);
    }
    if cli.no_iterate_files {
        request = request.no_iterate_files(true);
    }

    Ok(Some(request))
}

/// Debug logging follows `--debug` or a `"debug": true` request file.
fn debug_logging(cli: &Cli, request: &SignRequest) -> bool {
    cli.debug || request.is_debug()
}

fn describe_target(request: &SignRequest) -> String {
    match (request.app_directory_path(), request.file_list()) {
        (Some(dir), _) => dir.display().to_string(),
        (None, Some(files)) => files
            .iter()
            .map(|f| f.display().to_string())
            .collect::<Vec<_>>()
            .join(", "),
        (None, None) => String::new(),
    }
}
