use clap::{Args, Parser, Subcommand};
use drivelift::api::auth::{ClientSecrets, CredentialStore, DRIVE_FILE_SCOPE};
use drivelift::api::drive::DriveEndpoints;
use drivelift::config::UploadConfig;
use drivelift::db::Storage;
use drivelift::error::{AuthError, BatchError, ConfigError};
use drivelift::settings::{get_upload_concurrency, set_upload_concurrency};
use drivelift::upload_manager::{
    FileFilter, FolderTarget, HttpSessionFactory, ScanOptions, SessionProvider, UploadManager,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "drivelift", version, about = "Concurrent resumable uploads to Google Drive")]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload every matching file in a directory
    Upload(UploadArgs),
    /// Persist the default number of parallel uploads
    SetConcurrency {
        #[arg(value_parser = clap::value_parser!(u16).range(1..=16))]
        value: u16,
        #[arg(long, env = "DRIVELIFT_STATE_DB")]
        state_db: Option<PathBuf>,
    },
    /// Forget the stored OAuth tokens
    Logout {
        #[arg(long, env = "DRIVELIFT_STATE_DB")]
        state_db: Option<PathBuf>,
    },
}

#[derive(Args)]
struct UploadArgs {
    source: PathBuf,

    /// Destination folder id; skips name lookup
    #[arg(long, env = "DRIVELIFT_FOLDER_ID", conflicts_with = "folder_name")]
    folder_id: Option<String>,

    /// Destination folder name; defaults to the source directory name
    #[arg(long, env = "DRIVELIFT_FOLDER_NAME")]
    folder_name: Option<String>,

    #[arg(long)]
    concurrency: Option<usize>,

    #[arg(long, default_value_t = 8)]
    chunk_size_mib: usize,

    #[arg(long, default_value_t = 8)]
    max_retries: u32,

    /// File extension to include (repeatable)
    #[arg(long = "extension", default_value = "mp4")]
    extensions: Vec<String>,

    /// Upload every regular file regardless of extension
    #[arg(long, conflicts_with = "extensions")]
    all_files: bool,

    #[arg(long)]
    recursive: bool,

    #[arg(long, env = "GOOGLE_OAUTH_CLIENT_FILE", default_value = "credentials.json")]
    client_secrets: PathBuf,

    #[arg(long, env = "DRIVELIFT_STATE_DB")]
    state_db: Option<PathBuf>,

    /// Fail instead of opening a browser when no usable token is stored
    #[arg(long)]
    no_browser: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let outcome = match cli.command {
        Command::Upload(args) => upload(args),
        Command::SetConcurrency { value, state_db } => {
            set_concurrency(state_db.as_deref(), usize::from(value)).map(|_| ExitCode::SUCCESS)
        }
        Command::Logout { state_db } => logout(state_db.as_deref()).map(|_| ExitCode::SUCCESS),
    };

    match outcome {
        Ok(code) => code,
        Err(err) => {
            match err.kind() {
                Some(kind) => error!("[{kind}] {err}"),
                None => error!("{err}"),
            }
            ExitCode::from(2)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "drivelift=debug" } else { "drivelift=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_thread_names(true)
        .init();
}

fn open_storage(path: Option<&Path>) -> Result<Storage, BatchError> {
    let opened = match path {
        Some(path) => Storage::open(path),
        None => Storage::open_default(),
    };
    opened.map_err(|err| BatchError::Auth(AuthError::Storage(err)))
}

fn upload(args: UploadArgs) -> Result<ExitCode, BatchError> {
    let storage = open_storage(args.state_db.as_deref())?;

    let concurrency = match args.concurrency {
        Some(value) => value,
        None => get_upload_concurrency(&storage).unwrap_or_else(|err| {
            warn!("failed to read stored concurrency, using default: {err}");
            drivelift::settings::default_upload_concurrency()
        }),
    };
    let mut config = UploadConfig {
        concurrency,
        ..UploadConfig::default()
    }
    .with_chunk_size_mib(args.chunk_size_mib)?;
    config.retry.max_retries = args.max_retries;
    config.validate()?;

    let target = folder_target(&args)?;
    let options = ScanOptions {
        recursive: args.recursive,
        filter: if args.all_files {
            FileFilter::AllFiles
        } else {
            FileFilter::extensions(&args.extensions)
        },
    };

    let secrets = ClientSecrets::from_file(&args.client_secrets)?;
    let credentials = CredentialStore::new(storage, secrets, vec![DRIVE_FILE_SCOPE.to_string()])
        .allow_interactive(!args.no_browser)
        .load_or_refresh()?;
    info!(concurrency = config.concurrency, "credentials ready");

    let factory = HttpSessionFactory::new(DriveEndpoints::default(), config.request_timeout);
    let manager = UploadManager::new(
        SessionProvider::new(factory, credentials),
        config.engine(),
        config.concurrency,
    );
    let report = manager.run(&args.source, &options, &target)?;

    if report.is_empty() {
        println!("No matching files found in {}", args.source.display());
        return Ok(ExitCode::SUCCESS);
    }
    for line in report.outcome_lines() {
        println!("{line}");
    }
    println!("{}", report.summary_line());
    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn folder_target(args: &UploadArgs) -> Result<FolderTarget, ConfigError> {
    if let Some(id) = args.folder_id.as_deref().filter(|id| !id.trim().is_empty()) {
        return Ok(FolderTarget::Id(id.trim().to_string()));
    }
    if let Some(name) = args.folder_name.as_deref().filter(|name| !name.trim().is_empty()) {
        return Ok(FolderTarget::Name(name.trim().to_string()));
    }
    args.source
        .canonicalize()
        .ok()
        .and_then(|path| path.file_name().map(|name| name.to_string_lossy().into_owned()))
        .map(FolderTarget::Name)
        .ok_or_else(|| {
            ConfigError::Invalid(format!(
                "cannot derive a folder name from {}; pass --folder-name",
                args.source.display()
            ))
        })
}

fn set_concurrency(state_db: Option<&Path>, value: usize) -> Result<(), BatchError> {
    let storage = open_storage(state_db)?;
    let stored = set_upload_concurrency(&storage, value).map_err(ConfigError::Invalid)?;
    println!("Default upload concurrency set to {stored}");
    Ok(())
}

fn logout(state_db: Option<&Path>) -> Result<(), BatchError> {
    let storage = open_storage(state_db)?;
    storage
        .clear_auth_record()
        .map_err(|err| BatchError::Auth(AuthError::Storage(err)))?;
    println!("Stored credentials removed");
    Ok(())
}
