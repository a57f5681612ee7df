use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;

use notes_core::attachments::UploadedFile;
use notes_core::config::Profile;
use notes_core::filter::ListParams;
use notes_core::notes::{parse_id_list, NoteUpdate};

#[derive(Parser)]
#[command(name = "notes", about = "Personal notes with hashtags and attachments")]
struct Cli {
    /// Profile directory (default: $NOTES_PROFILE or the platform data dir)
    #[arg(long, global = true)]
    profile: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List notes, top of the manual order first
    List {
        /// Free-text search; `*` is a wildcard
        #[arg(long)]
        q: Option<String>,
        /// Comma-separated tags, all of which must be present
        #[arg(long)]
        tags: Option<String>,
        /// Show archived notes instead of active ones
        #[arg(long)]
        archived: bool,
        /// Cursor: only notes with a lower sort order
        #[arg(long)]
        last_order: Option<String>,
        /// Page size
        #[arg(long)]
        limit: Option<String>,
    },
    /// Show a single note
    Show { id: i64 },
    /// Create a note
    Add {
        content: String,
        /// Files to attach
        #[arg(long = "attach")]
        attach: Vec<PathBuf>,
    },
    /// Replace a note's content, optionally adding or removing attachments
    Edit {
        id: i64,
        content: String,
        #[arg(long = "attach")]
        attach: Vec<PathBuf>,
        /// Comma-separated attachment ids to delete
        #[arg(long, default_value = "")]
        delete_attachments: String,
    },
    /// Delete one or more notes with their attachments
    Delete { ids: Vec<i64> },
    /// Archive (or with --undo, restore) notes
    Archive {
        ids: Vec<i64>,
        #[arg(long)]
        undo: bool,
    },
    /// Put the given notes in this order, first on top
    Reorder { ids: Vec<i64> },
    /// List tags in use
    Tags,
    /// Remove upload files no attachment refers to
    Gc,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_uploads(paths: &[PathBuf]) -> anyhow::Result<Vec<UploadedFile>> {
    paths
        .iter()
        .map(|p| {
            UploadedFile::from_path(p).with_context(|| format!("failed to read {}", p.display()))
        })
        .collect()
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("notes=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let dir = Profile::resolve_dir(cli.profile.as_deref());
    let profile = Profile::load(&dir)
        .with_context(|| format!("failed to load profile at {}", dir.display()))?;
    tracing::debug!(profile = %profile.dir.display(), "profile loaded");

    let repo = profile.open_repository().with_context(|| {
        format!("failed to open database at {}", profile.database_path().display())
    })?;

    match cli.command {
        Command::List {
            q,
            tags,
            archived,
            last_order,
            limit,
        } => {
            let params = ListParams {
                last_order,
                id: None,
                q,
                tags,
                archived: archived.then(|| "1".to_string()),
                limit: limit.or_else(|| Some(profile.config.page_size.to_string())),
            };
            print_json(&repo.list_params(&params)?)?;
        }
        Command::Show { id } => print_json(&repo.get(id)?)?,
        Command::Add { content, attach } => {
            let files = read_uploads(&attach)?;
            print_json(&repo.create(&content, &files)?)?;
        }
        Command::Edit {
            id,
            content,
            attach,
            delete_attachments,
        } => {
            let update = NoteUpdate {
                id,
                content,
                remove_attachments: parse_id_list("delete_attachments", &delete_attachments)?,
                new_files: read_uploads(&attach)?,
            };
            print_json(&repo.update(&update)?)?;
        }
        Command::Delete { ids } => {
            if let [id] = ids.as_slice() {
                repo.delete(*id)?;
                print_json(&1)?;
            } else {
                print_json(&repo.delete_batch(&ids)?)?;
            }
        }
        Command::Archive { ids, undo } => {
            if let [id] = ids.as_slice() {
                repo.set_archived(*id, !undo)?;
                print_json(&1)?;
            } else {
                print_json(&repo.set_archived_batch(&ids, !undo)?)?;
            }
        }
        Command::Reorder { ids } => {
            repo.reorder(&ids)?;
            print_json(&"ok")?;
        }
        Command::Tags => print_json(&repo.list_tags()?)?,
        Command::Gc => {
            let removed = repo.sweep_orphan_files()?;
            tracing::info!(removed = removed.len(), "orphan sweep finished");
            print_json(&removed)?;
        }
    }

    Ok(())
}
