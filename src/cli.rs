use crate::ai::AiAction;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "cybernotes",
    version,
    about = "Cyberpunk terminal notes with an AI link"
)]
pub struct Cli {
    /// Directory holding the notes blob (overrides project/global lookup)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Path to the configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a project note store in the current directory
    Init,
    /// List notes, newest first
    List {
        /// Only notes whose title or content contains this (case-insensitive)
        #[arg(long, short)]
        search: Option<String>,
    },
    /// Create a new note
    New {
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        content: Option<String>,
    },
    /// Print a note
    Show { note_id: String },
    /// Change a note's title or content
    Edit {
        note_id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        content: Option<String>,
    },
    /// Delete a note
    Delete {
        note_id: String,
        /// Skip the confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
    /// Run an AI action over a note's content
    Ai {
        note_id: String,
        #[arg(value_enum)]
        action: AiAction,
        /// Merge the result into the note and save it
        #[arg(long)]
        apply: bool,
    },
    /// Move a corrupt notes blob aside and start empty
    Reset,
    /// Launch the interactive TUI
    Tui,
}
