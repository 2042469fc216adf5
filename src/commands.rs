//! This module defines the command-line interface for the application using `clap`.
//!
//! It provides a `Cli` struct that represents the parsed command-line arguments,
//! and a `Commands` enum that represents the available subcommands and their
//! options.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Represents the parsed command-line arguments.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, propagate_version = true, color = clap::ColorChoice::Always)]
pub struct Cli {
    /// Configuration file. Defaults to `config.yaml` in the platform config directory.
    #[arg(long, short = 'c', global = true, env = "DOCSEARCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// The parsed subcommand and its options.
    #[command(subcommand)]
    pub command: Commands,
}

/// Represents the available subcommands and their options.
#[derive(Subcommand, Debug)]
#[command(about, long_about = None, color = clap::ColorChoice::Always)]
pub enum Commands {
    /// Encode the given documents, replacing everything stored so far.
    #[clap(name = "encode", alias = "e")]
    Encode {
        /// One document per argument.
        #[arg(required = true)]
        documents: Vec<String>,
    },

    /// Encode every non-blank line of a text file as a document.
    #[clap(name = "load", alias = "l")]
    Load {
        /// Newline-delimited document file.
        path: PathBuf,
    },

    /// Search the stored documents.
    #[clap(name = "search", alias = "s")]
    Search {
        query: String,

        /// Number of results. Defaults to `default_top_k` from the config.
        #[arg(short = 'k', long = "top-k")]
        top_k: Option<usize>,

        /// Print results as JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Menu-driven session: encode a file or search, repeatedly.
    #[clap(name = "interactive", alias = "i")]
    Interactive,

    /// Write a default configuration file.
    Init,
}
