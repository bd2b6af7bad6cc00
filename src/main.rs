mod ai;
mod cli;
mod commands;
mod config;
mod editor;
mod model;
mod storage;
mod store;
mod ui;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::fs::{self, OpenOptions};
use std::path::Path;

fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let mut config = config::Config::load(args.config.as_deref())?;
    if let Some(dir) = args.data_dir {
        config.data_dir = Some(dir);
    }
    let command = args.command.unwrap_or(cli::Command::Tui);
    let verbose = args.verbose;

    match command {
        cli::Command::Init => commands::init(),
        cli::Command::List { search } => commands::list(&open_session(config, verbose)?, search),
        cli::Command::New { title, content } => {
            commands::new(&open_session(config, verbose)?, title, content)
        }
        cli::Command::Show { note_id } => commands::show(&open_session(config, verbose)?, note_id),
        cli::Command::Edit {
            note_id,
            title,
            content,
        } => commands::edit(&open_session(config, verbose)?, note_id, title, content),
        cli::Command::Delete { note_id, force } => {
            commands::delete(&open_session(config, verbose)?, note_id, force)
        }
        cli::Command::Ai {
            note_id,
            action,
            apply,
        } => commands::ai(&open_session(config, verbose)?, note_id, action, apply),
        cli::Command::Reset => commands::reset(&open_session(config, verbose)?),
        cli::Command::Tui => commands::tui(open_session(config, verbose)?),
    }
}

/// Resolves the note store and starts logging beside it.
fn open_session(config: config::Config, verbose: bool) -> Result<commands::Session> {
    let location = commands::resolve_location(&config)?;
    initialize_logger(&location.log_path(), verbose)?;
    info!("using note store {}", location.data_path().display());
    Ok(commands::Session { location, config })
}

/// Logs go to a file beside the notes; the TUI owns the terminal.
fn initialize_logger(path: &Path, verbose: bool) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {:?}", parent))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file {:?}", path))?;
    let env = env_logger::Env::default().filter_or("CYBERNOTES_LOG", "info");
    let mut builder = env_logger::Builder::from_env(env);
    if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder
        .format_timestamp_secs()
        .format_module_path(true)
        .target(env_logger::Target::Pipe(Box::new(file)))
        .init();
    Ok(())
}
