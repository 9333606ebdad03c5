//! Upload subcommands.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local, NaiveDateTime};
use clap::{Args, Subcommand};
use colored::Colorize;
use futures_util::future::join_all;

use doccheck_http::api::{Page, SortOrder, Upload, UploadQuery};
use doccheck_http::{AuthClient, FilePart};

use crate::output;

#[derive(Subcommand, Debug)]
pub enum UploadsCommand {
    /// List your uploads
    List(ListArgs),

    /// Upload a document for analysis
    Upload {
        /// Path of the document
        path: PathBuf,

        /// MIME type (guessed from the extension when omitted)
        #[arg(long)]
        mime: Option<String>,
    },

    /// Show the full analysis of an upload
    Details {
        id: i64,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Print a download link for an upload
    DownloadUrl { id: i64 },

    /// Delete one or more uploads
    Delete {
        #[arg(required = true)]
        ids: Vec<i64>,

        /// Skip confirmation prompt
        #[arg(long, short = 'f')]
        force: bool,
    },
}

/// Listing filters shared by `uploads list` and `analyses list`.
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    #[arg(long)]
    pub page: Option<u32>,

    #[arg(long)]
    pub limit: Option<u32>,

    /// Match on file name
    #[arg(long)]
    pub search: Option<String>,

    #[arg(long)]
    pub min_score: Option<f64>,

    #[arg(long)]
    pub max_score: Option<f64>,

    /// Field to sort by (e.g. created_at, score)
    #[arg(long)]
    pub sort_by: Option<String>,

    /// asc or desc
    #[arg(long)]
    pub sort_order: Option<SortOrder>,
}

impl From<FilterArgs> for UploadQuery {
    fn from(args: FilterArgs) -> Self {
        UploadQuery {
            page: args.page,
            limit: args.limit,
            search: args.search,
            min_score: args.min_score,
            max_score: args.max_score,
            sort_by: args.sort_by,
            sort_order: args.sort_order,
        }
    }
}

/// How a listing is printed.
#[derive(Args, Debug, Clone, Copy, Default)]
pub struct ListFormat {
    /// One human-readable line per item instead of JSON
    #[arg(long, conflicts_with = "pretty")]
    pub table: bool,

    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub filter: FilterArgs,

    #[command(flatten)]
    pub format: ListFormat,
}

pub async fn handle(client: &AuthClient, cmd: UploadsCommand) -> Result<()> {
    match cmd {
        UploadsCommand::List(args) => {
            let page = client
                .my_uploads(&args.filter.into())
                .await
                .context("Failed to list uploads")?;
            print_page(&page, args.format)
        }
        UploadsCommand::Upload { path, mime } => upload(client, path, mime).await,
        UploadsCommand::Details { id, pretty } => {
            let details = client
                .upload_details(id)
                .await
                .with_context(|| format!("Failed to fetch upload {}", id))?;
            output::json(&details, pretty)
        }
        UploadsCommand::DownloadUrl { id } => {
            let link = client
                .download_url(id)
                .await
                .with_context(|| format!("Failed to fetch download link for upload {}", id))?;
            output::field("File", &link.filename);
            println!("{}", link.download_url);
            Ok(())
        }
        UploadsCommand::Delete { ids, force } => delete(client, ids, force).await,
    }
}

async fn upload(client: &AuthClient, path: PathBuf, mime: Option<String>) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("Not a file path: {}", path.display()))?
        .to_string();

    let bytes = tokio::fs::read(&path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let mut part = FilePart::new(&file_name, bytes);
    if let Some(mime) = mime.or_else(|| guess_mime(&file_name).map(str::to_string)) {
        part = part.with_mime(mime);
    }

    output::note(&format!("Uploading {} ({} bytes)...", file_name, part.len()));

    let receipt = client
        .upload_document(part)
        .await
        .context("Failed to upload document")?;

    output::success(receipt.message.as_deref().unwrap_or("Document uploaded"));
    if let Some(id) = receipt.id {
        output::field("ID", &id.to_string());
    }

    Ok(())
}

async fn delete(client: &AuthClient, ids: Vec<i64>, force: bool) -> Result<()> {
    if !force {
        let prompt = format!("Delete {} upload(s)?", ids.len());
        if !output::confirm(&prompt)? {
            eprintln!("Aborted.");
            return Ok(());
        }
    }

    let results = join_all(ids.iter().map(|&id| client.delete_upload(id))).await;

    let mut failed = 0;
    for (id, result) in ids.iter().zip(results) {
        match result {
            Ok(_) => output::success(&format!("Upload {} deleted", id)),
            Err(e) => {
                failed += 1;
                output::warning(&format!("Upload {}: {}", id, e));
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} deletions failed", failed, ids.len());
    }
    Ok(())
}

/// Print a listing as JSON lines, pretty JSON or a table.
pub fn print_page(page: &Page<Upload>, format: ListFormat) -> Result<()> {
    if page.is_empty() {
        output::note("No uploads found.");
        return Ok(());
    }

    for upload in &page.items {
        if format.table {
            print_row(upload);
        } else {
            output::json(upload, format.pretty)?;
        }
    }

    if let Some(total) = page.total {
        eprintln!();
        eprintln!("{}: {}", "Total".dimmed(), total);
    }

    Ok(())
}

fn print_row(upload: &Upload) {
    let score = match upload.score {
        Some(score) if score >= 80.0 => format!("{:>5.1}", score).green(),
        Some(score) if score >= 50.0 => format!("{:>5.1}", score).yellow(),
        Some(score) => format!("{:>5.1}", score).red(),
        None => format!("{:>5}", "-").dimmed(),
    };
    let created = upload
        .created_at
        .as_deref()
        .map(format_timestamp)
        .unwrap_or_default();

    let owner = upload
        .user_id
        .map(|id| format!("  user {}", id))
        .unwrap_or_default();

    println!(
        "{:>6}  {}  {:16}  {}{}",
        upload.id,
        score,
        created,
        upload.filename,
        owner.dimmed()
    );
}

/// Render a service timestamp in local time; unknown shapes pass through.
fn format_timestamp(raw: &str) -> String {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return ts.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string();
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return ts.format("%Y-%m-%d %H:%M").to_string();
    }
    raw.to_string()
}

fn guess_mime(file_name: &str) -> Option<&'static str> {
    let extension = file_name.rsplit_once('.')?.1.to_ascii_lowercase();
    Some(match extension.as_str() {
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "txt" => "text/plain",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => return None,
    })
}
