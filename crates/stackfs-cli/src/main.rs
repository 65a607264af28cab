//! stackfs: inspect and edit any configured backend stack.
//!
//! Usage:
//!   stackfs ls [PATH] [--json]        - List a directory
//!   stackfs stat PATH [--json]        - Show metadata
//!   stackfs cat PATH                  - Print a file
//!   stackfs write PATH                - Replace a file with stdin
//!   stackfs mkdir PATH [-p] [--mode]  - Create a directory
//!   stackfs rm PATH [-r]              - Remove a file or directory
//!   stackfs mv FROM TO                - Rename
//!   stackfs chmod MODE PATH           - Change permission bits
//!   stackfs tree [PATH]               - Print a directory tree
//!
//! The stack comes from `--config`, else `$XDG_CONFIG_HOME/stackfs/config.toml`,
//! else the current directory.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use directories::BaseDirs;
use stackfs::config::VfsConfig;
use stackfs::{Filesystem, Metadata, helpers, mode};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug, Parser)]
#[command(name = "stackfs", version, about = "Inspect and edit a stackfs backend stack")]
struct Cli {
    /// Stack configuration (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List a directory
    Ls {
        #[arg(default_value = "/")]
        path: PathBuf,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show metadata for one entry
    Stat {
        path: PathBuf,

        #[arg(long)]
        json: bool,
    },

    /// Print a file to stdout
    Cat { path: PathBuf },

    /// Replace a file with stdin
    Write {
        path: PathBuf,

        /// Permission bits if the file is created
        #[arg(long, value_parser = parse_octal, default_value = "644")]
        mode: u32,
    },

    /// Create a directory
    Mkdir {
        path: PathBuf,

        /// Create missing parents, succeed if it exists
        #[arg(short, long)]
        parents: bool,

        #[arg(long, value_parser = parse_octal, default_value = "755")]
        mode: u32,
    },

    /// Remove a file or an empty directory
    Rm {
        path: PathBuf,

        /// Remove directories and their contents
        #[arg(short, long)]
        recursive: bool,
    },

    /// Rename a file or directory
    Mv { from: PathBuf, to: PathBuf },

    /// Change permission bits
    Chmod {
        #[arg(value_parser = parse_octal)]
        mode: u32,
        path: PathBuf,
    },

    /// Print a directory tree
    Tree {
        #[arg(default_value = "/")]
        path: PathBuf,
    },
}

fn parse_octal(s: &str) -> Result<u32, String> {
    let digits = s.strip_prefix("0o").unwrap_or(s);
    u32::from_str_radix(digits, 8).map_err(|e| format!("invalid octal mode {s:?}: {e}"))
}

fn main() -> Result<()> {
    // Initialize tracing (respects RUST_LOG env var)
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let fs = open_stack(cli.config.as_deref())?;
    tracing::debug!(backend = fs.name(), "opened stack");

    let stdin = io::stdin();
    let stdout = io::stdout();
    run(&*fs, cli.command, &mut stdin.lock(), &mut stdout.lock())
}

/// Resolve and build the configured stack.
fn open_stack(explicit: Option<&Path>) -> Result<Arc<dyn Filesystem>> {
    let config = match explicit {
        Some(path) => VfsConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => match default_config_path().filter(|p| p.is_file()) {
            Some(path) => VfsConfig::load(&path).with_context(|| format!("loading {}", path.display()))?,
            None => VfsConfig::default(),
        },
    };
    config.build().context("building backend stack")
}

fn default_config_path() -> Option<PathBuf> {
    BaseDirs::new().map(|d| d.config_dir().join("stackfs").join("config.toml"))
}

fn run(fs: &dyn Filesystem, command: Command, input: &mut dyn Read, out: &mut dyn Write) -> Result<()> {
    match command {
        Command::Ls { path, json } => {
            let entries = helpers::read_dir_all(fs, &path).with_context(|| format!("ls {}", path.display()))?;
            if json {
                serde_json::to_writer_pretty(&mut *out, &entries)?;
                writeln!(out)?;
            } else {
                for entry in &entries {
                    writeln!(out, "{}", format_entry(entry))?;
                }
            }
        }
        Command::Stat { path, json } => {
            let meta = fs.stat(&path)?;
            if json {
                serde_json::to_writer_pretty(&mut *out, &meta)?;
                writeln!(out)?;
            } else {
                writeln!(out, "{}", format_entry(&meta))?;
            }
        }
        Command::Cat { path } => {
            let data = helpers::read_file(fs, &path)?;
            out.write_all(&data)?;
        }
        Command::Write { path, mode } => {
            let mut data = Vec::new();
            input.read_to_end(&mut data).context("reading stdin")?;
            helpers::write_file(fs, &path, &data, mode)?;
        }
        Command::Mkdir { path, parents, mode } => {
            if parents {
                fs.mkdir_all(&path, mode)?;
            } else {
                fs.mkdir(&path, mode)?;
            }
        }
        Command::Rm { path, recursive } => {
            if recursive {
                fs.remove_all(&path)?;
            } else {
                fs.remove(&path)?;
            }
        }
        Command::Mv { from, to } => fs.rename(&from, &to)?,
        Command::Chmod { mode, path } => fs.chmod(&path, mode)?,
        Command::Tree { path } => {
            let depth_of = |p: &str| if p == "/" { 0 } else { p.matches('/').count() };
            let base = depth_of(&stackfs::path::normalize(&path));
            helpers::walk(fs, &path, |p, meta| {
                let depth = depth_of(p).saturating_sub(base);
                let suffix = if meta.is_dir() && p != "/" { "/" } else { "" };
                let label = if depth == 0 { p } else { meta.name.as_str() };
                writeln!(out, "{}{}{}", "  ".repeat(depth), label, suffix)
                    .map_err(|e| stackfs::FsError::from_io("tree", p, e))
            })?;
        }
    }
    Ok(())
}

/// One `ls -l`-style line: type, permissions, size, name.
fn format_entry(meta: &Metadata) -> String {
    let kind = if meta.is_dir() { 'd' } else { '-' };
    let perm = meta.permissions();
    let mut bits = String::with_capacity(9);
    for shift in [6, 3, 0] {
        let triple = (perm >> shift) & 0o7;
        bits.push(if triple & 0o4 != 0 { 'r' } else { '-' });
        bits.push(if triple & 0o2 != 0 { 'w' } else { '-' });
        bits.push(if triple & 0o1 != 0 { 'x' } else { '-' });
    }
    let sticky = if perm & mode::S_ISVTX != 0 { "t" } else { "" };
    format!("{kind}{bits}{sticky} {:>10} {}", meta.size, meta.name)
}
