//! gworks CLI - Command line interface for the Google Workspace facades.
//!
//! Exercises the authorization gate and the Drive, Calendar and Apps Script
//! operations against a configured OAuth client.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use gworks_auth::{Connection, ConnectionConfig, CredentialStore, TokenStatus};
use gworks_calendar::{Calendar, EventDraft};
use gworks_common::FileId;
use gworks_drive::{Drive, ListOptions, PermissionRole, PostedFile, ShareRequest, UploadOptions};
use gworks_script::ScriptRunner;

#[derive(Parser)]
#[command(name = "gworks")]
#[command(about = "gworks - Google Workspace convenience operations")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Path to the OAuth client secrets file (client_secret.json).
    #[arg(short, long)]
    secrets: PathBuf,

    /// Path of the credential cache file (defaults to the user config dir).
    #[arg(short, long)]
    credentials: Option<PathBuf>,

    /// Application name sent to the provider.
    #[arg(long, default_value = "gworks")]
    app_name: String,

    /// Requested scopes; may be repeated. Defaults to the Drive scope.
    #[arg(long = "scope")]
    scopes: Vec<String>,

    /// Account to request delegated access for.
    #[arg(long)]
    subject: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the credential cache, printing the authorization URL if needed.
    Auth {
        /// Complete the flow with an authorization code.
        #[arg(long)]
        code: Option<String>,

        /// Open the authorization URL in the default browser.
        #[arg(long)]
        open: bool,
    },

    /// Upload one or more files into a Drive folder.
    Upload {
        /// Files to upload.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Destination folder ID.
        #[arg(short, long)]
        folder: FileId,

        /// Base filename; several files get a two-digit sequence prefix.
        #[arg(short, long)]
        name: Option<String>,

        /// Role granted on the uploaded files.
        #[arg(long, default_value = "reader")]
        role: PermissionRole,

        /// Grant to this account instead of anyone-with-the-link.
        #[arg(long)]
        account: Option<String>,
    },

    /// Copy a Drive file into a folder after validating both ends.
    Copy {
        /// Source file (or shortcut) ID.
        #[arg(short, long)]
        source: FileId,

        /// Name of the copy.
        #[arg(short, long)]
        name: String,

        /// Destination folder ID.
        #[arg(short, long)]
        folder: FileId,

        /// Convert the copy to this MIME type.
        #[arg(long)]
        mime: Option<String>,

        /// Role granted on the copy.
        #[arg(long, default_value = "reader")]
        role: PermissionRole,

        /// Grant to this account instead of anyone-with-the-link.
        #[arg(long)]
        account: Option<String>,
    },

    /// Delete a Drive file: trash it, or delete permanently if already trashed.
    Delete {
        /// File (or shortcut) ID.
        id: FileId,
    },

    /// Export a Workspace document as PDF into a folder.
    ExportPdf {
        /// Source document ID.
        #[arg(short, long)]
        source: FileId,

        /// Destination folder ID.
        #[arg(short, long)]
        folder: FileId,

        /// Role granted on the PDF.
        #[arg(long, default_value = "reader")]
        role: PermissionRole,

        /// Grant to this account instead of anyone-with-the-link.
        #[arg(long)]
        account: Option<String>,
    },

    /// List the files in a Drive folder.
    List {
        /// Folder ID.
        folder: FileId,

        /// Include folders and shortcuts in the listing.
        #[arg(long)]
        all: bool,
    },

    /// Insert an event into a calendar.
    Event {
        /// Target calendar address (e.g. primary).
        #[arg(long, default_value = "primary")]
        calendar: String,

        /// Event title.
        #[arg(long)]
        summary: String,

        /// Event body text.
        #[arg(long, default_value = "")]
        description: String,

        /// Start time, e.g. 2026-03-14T09:30:00.
        #[arg(long)]
        start: String,

        /// End time.
        #[arg(long)]
        end: String,

        /// Location name.
        #[arg(long)]
        location: Option<String>,

        /// IANA time zone of the start and end times.
        #[arg(long)]
        time_zone: Option<String>,
    },

    /// Run a function of an Apps Script project.
    RunScript {
        /// Script project ID.
        #[arg(long)]
        script_id: String,

        /// Function to run.
        function: String,

        /// Function parameters as JSON values; may be repeated.
        #[arg(long = "param")]
        params: Vec<String>,

        /// Run against the saved HEAD instead of the deployed version.
        #[arg(long)]
        dev_mode: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let conn = Arc::new(build_connection(&cli)?);

    match cli.command {
        Commands::Auth { code, open } => cmd_auth(&conn, code.as_deref(), open).await,

        command => {
            require_valid_token(&conn).await?;
            match command {
                Commands::Auth { .. } => unreachable!("handled above"),

                Commands::Upload {
                    files,
                    folder,
                    name,
                    role,
                    account,
                } => cmd_upload(&conn, &files, &folder, name, role, account).await,

                Commands::Copy {
                    source,
                    name,
                    folder,
                    mime,
                    role,
                    account,
                } => {
                    let drive = Drive::new(conn.clone());
                    let link = drive
                        .copy_validated(
                            &source,
                            &name,
                            &folder,
                            mime.as_deref(),
                            &ShareRequest::new(account, role),
                        )
                        .await?;
                    println!("{}", link);
                    Ok(())
                }

                Commands::Delete { id } => {
                    let drive = Drive::new(conn.clone());
                    let outcome = drive.delete(&id).await?;
                    println!("{:?}", outcome);
                    Ok(())
                }

                Commands::ExportPdf {
                    source,
                    folder,
                    role,
                    account,
                } => {
                    let drive = Drive::new(conn.clone());
                    let link = drive
                        .export_pdf(&source, &folder, &ShareRequest::new(account, role))
                        .await?;
                    println!("{}", link);
                    Ok(())
                }

                Commands::List { folder, all } => cmd_list(&conn, &folder, all).await,

                Commands::Event {
                    calendar,
                    summary,
                    description,
                    start,
                    end,
                    location,
                    time_zone,
                } => {
                    cmd_event(
                        &conn,
                        &calendar,
                        summary,
                        description,
                        &start,
                        &end,
                        location,
                        time_zone,
                    )
                    .await
                }

                Commands::RunScript {
                    script_id,
                    function,
                    params,
                    dev_mode,
                } => cmd_run_script(&conn, script_id, &function, &params, dev_mode).await,
            }
        }
    }
}

/// Build the shared connection from the global options.
fn build_connection(cli: &Cli) -> Result<Connection> {
    let mut config = ConnectionConfig::new(cli.app_name.clone());
    if !cli.scopes.is_empty() {
        config = config.with_scopes(cli.scopes.clone());
    }
    if let Some(subject) = &cli.subject {
        config = config.with_subject(subject.clone());
    }

    let credentials = cli
        .credentials
        .clone()
        .unwrap_or_else(|| CredentialStore::default_path("gworks"));

    Connection::from_secrets_file(config, &cli.secrets, CredentialStore::new(credentials))
        .context("Failed to configure the connection")
}

/// Run the token gate, bailing with the authorization URL when needed.
async fn require_valid_token(conn: &Arc<Connection>) -> Result<()> {
    match conn.ensure_valid_token().await? {
        TokenStatus::Valid => Ok(()),
        TokenStatus::AuthRequired { auth_url } => anyhow::bail!(
            "Authorization required. Visit the URL below, then run `gworks auth --code <code>`:\n{}",
            auth_url
        ),
    }
}

/// Check or complete the authorization flow.
async fn cmd_auth(conn: &Arc<Connection>, code: Option<&str>, open_url: bool) -> Result<()> {
    if let Some(code) = code {
        conn.exchange_code(code).await?;
        println!("Authorization complete, credentials stored at {}", conn.store().path().display());
        return Ok(());
    }

    match conn.ensure_valid_token().await? {
        TokenStatus::Valid => {
            println!("Token is valid");
        }
        TokenStatus::AuthRequired { auth_url } => {
            println!("Authorization required. Visit:\n{}", auth_url);
            if open_url {
                open::that(&auth_url).context("Failed to open the browser")?;
            }
        }
    }
    Ok(())
}

/// Upload local files as a posted batch.
async fn cmd_upload(
    conn: &Arc<Connection>,
    files: &[PathBuf],
    folder: &FileId,
    name: Option<String>,
    role: PermissionRole,
    account: Option<String>,
) -> Result<()> {
    let posted: Vec<PostedFile> = files
        .iter()
        .map(|path| {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .with_context(|| format!("{} has no file name", path.display()))?;
            Ok(PostedFile {
                field_name: "upload".to_string(),
                file_name,
                tmp_path: path.clone(),
            })
        })
        .collect::<Result<_>>()?;

    let drive = Drive::new(conn.clone());
    let options = UploadOptions {
        base_name: name,
        share: ShareRequest::new(account, role),
    };

    match drive.upload_posted(&posted, folder, &options).await? {
        Some(uploaded) => {
            for file in uploaded {
                println!("{}\t{}", file.file_name, file.web_link);
            }
        }
        None => println!("Nothing to upload"),
    }
    Ok(())
}

/// List a Drive folder.
async fn cmd_list(conn: &Arc<Connection>, folder: &FileId, all: bool) -> Result<()> {
    let drive = Drive::new(conn.clone());
    let options = ListOptions {
        include_folders: all,
        include_shortcuts: all,
    };

    let entries = drive.list_folder(folder, &options).await?;
    info!("{} entries", entries.len());
    for entry in entries {
        println!(
            "{}\t{}\t{}",
            entry.id,
            entry.name,
            entry.web_view_link.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

/// Insert a calendar event.
#[allow(clippy::too_many_arguments)]
async fn cmd_event(
    conn: &Arc<Connection>,
    calendar_id: &str,
    summary: String,
    description: String,
    start: &str,
    end: &str,
    location: Option<String>,
    time_zone: Option<String>,
) -> Result<()> {
    let mut draft = EventDraft::new(summary, description, parse_datetime(start)?, parse_datetime(end)?);
    if let Some(location) = location {
        draft = draft.with_location(location);
    }
    if let Some(time_zone) = time_zone {
        draft = draft.with_time_zone(time_zone);
    }

    let calendar = Calendar::new(conn.clone());
    let event = calendar.insert_event(calendar_id, &draft).await?;

    println!(
        "{}\t{}",
        event.id,
        event.html_link.as_deref().unwrap_or("-")
    );
    Ok(())
}

/// Run an Apps Script function.
async fn cmd_run_script(
    conn: &Arc<Connection>,
    script_id: String,
    function: &str,
    params: &[String],
    dev_mode: bool,
) -> Result<()> {
    let parameters = params
        .iter()
        .map(|raw| {
            serde_json::from_str(raw)
                .unwrap_or_else(|_| serde_json::Value::String(raw.clone()))
        })
        .collect();

    let runner = ScriptRunner::new(conn.clone(), script_id)
        .with_parameters(parameters)
        .with_dev_mode(dev_mode);

    let result = runner.run(function).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// Parse a CLI datetime in a few common layouts.
fn parse_datetime(raw: &str) -> Result<NaiveDateTime> {
    const LAYOUTS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ];

    for layout in LAYOUTS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, layout) {
            return Ok(parsed);
        }
    }
    anyhow::bail!("Unrecognized datetime: {} (expected e.g. 2026-03-14T09:30:00)", raw)
}
