#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};

use tabula::cli::{parse_cell, parse_row, CliArgs, Command};
use tabula::session::{RowData, ViewerSession};
use tabula::util::{filename_for_display, CancelToken};
use tabula::{Viewer, ViewerConfig, ViewerError};

fn main() -> Result<()> {
    #[cfg(feature = "dhat-heap")]
    let _profiler = dhat::Profiler::new_heap();

    tabula::tracing::init();

    let args = CliArgs::parse();

    let mut config = ViewerConfig::load();
    args.format.apply(&mut config);
    // One-shot commands have nothing to react to
    config.watch_files = false;

    run(&Viewer::new(config), args.command)
}

fn open(viewer: &Viewer, path: &Path) -> Result<ViewerSession> {
    match viewer.open(path) {
        Ok(session) => Ok(session),
        Err(ViewerError::CannotOpen { path, reason }) => {
            Err(anyhow!(reason.user_message(&filename_for_display(&path))))
        }
        Err(e) => Err(e).with_context(|| format!("Failed to open {}", path.display())),
    }
}

fn run(viewer: &Viewer, command: Command) -> Result<()> {
    match command {
        Command::Info { path } => {
            let session = open(viewer, &path)?;
            println!("path:        {}", session.path().display());
            println!("format:      {}", session.format().name());
            println!("rows:        {}", session.row_count());
            println!("bytes:       {}", session.file_len());
            println!("line ending: {:?}", session.line_ending());
        }
        Command::Show {
            path,
            start,
            count,
            pretty,
        } => {
            let session = open(viewer, &path)?;
            let rows = session
                .rows(start..start.saturating_add(count))
                .context("Failed to read rows")?;
            for row in rows {
                if pretty {
                    println!("{}: {}", row.number, session.pretty_row(row.number)?);
                    continue;
                }
                match &row.data {
                    RowData::Value(value) => println!("{}: {}", row.number, value.texts().join(" | ")),
                    RowData::Malformed { raw, reason } => {
                        println!("{}! {}    ({})", row.number, raw, reason)
                    }
                }
            }
        }
        Command::Set {
            path,
            row,
            col,
            value,
            output,
        } => {
            let session = open(viewer, &path)?;
            session
                .edit_cell(row, col, parse_cell(&value, session.format()))
                .context("Edit rejected")?;
            finish(&session, output.output)?;
        }
        Command::Insert {
            path,
            at,
            value,
            output,
        } => {
            let session = open(viewer, &path)?;
            let row = parse_row(&value, &session.codec())?;
            session.insert_row(at, row).context("Insert rejected")?;
            finish(&session, output.output)?;
        }
        Command::Delete { path, row, output } => {
            let session = open(viewer, &path)?;
            session.delete_row(row).context("Delete rejected")?;
            finish(&session, output.output)?;
        }
    }
    Ok(())
}

fn finish(session: &ViewerSession, output: Option<PathBuf>) -> Result<()> {
    let bytes = match output {
        Some(target) => session.save_as(&target, &CancelToken::new()),
        None => session.save(),
    }
    .context("Failed to save")?;

    eprintln!("Wrote {} bytes to {}", bytes, session.path().display());
    Ok(())
}
