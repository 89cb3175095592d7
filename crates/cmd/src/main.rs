// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! `mill` - command-line front end for a millpond filesystem.
//!
//! Runs in embedded mode: the coordination namespace lives in-process and
//! is snapshotted to disk between invocations (see `snapshot`). Paths on
//! the command line are written `domain:relative/path`; the domain prefix
//! may be omitted when the settings define a default container.

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod config;
mod snapshot;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use coordns::MemoryCoord;
use millpond::{FileState, FileSystem, FileSystemRegistry, Inode};

use crate::config::CmdConfig;

const UPLOAD_WAIT: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "mill")]
#[command(author, version, about = "Virtual distributed filesystem tool", long_about = None)]
struct Cli {
    /// Settings file
    #[arg(short, long, default_value = "millpond.yaml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register the filesystem and persist its settings
    Init,
    /// Create a directory (intermediate directories included)
    Mkdir {
        path: String,
    },
    /// Upload a local file
    Put {
        local: PathBuf,
        path: String,
        /// Refuse to replace synced content
        #[arg(long)]
        no_overwrite: bool,
    },
    /// Download a file to a local path
    Get {
        path: String,
        local: PathBuf,
    },
    /// List a directory
    Ls {
        #[arg(default_value = "")]
        path: String,
        #[arg(short, long)]
        recursive: bool,
    },
    /// Find files by name pattern (regular expression)
    Find {
        path: String,
        pattern: String,
        /// Also filter by parent directory pattern
        #[arg(long)]
        dir_pattern: Option<String>,
    },
    /// Remove a file or directory
    Rm {
        path: String,
        #[arg(short, long)]
        recursive: bool,
    },
    /// Move a file
    Mv {
        source: String,
        target: String,
    },
    /// Copy a file
    Cp {
        source: String,
        target: String,
    },
    /// Show inode details
    Stat {
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    diagnostics::init_diagnostics();
    let cli = Cli::parse();

    let config = CmdConfig::load(&cli.config)?;
    let namespace_file = config.namespace_file();
    let settings = config.into_settings()?;
    let base_path = settings.base_path.clone();

    let coord = Arc::new(MemoryCoord::new());
    snapshot::load_namespace(coord.as_ref(), &namespace_file).await?;

    let registry = FileSystemRegistry::new(coord.clone(), &base_path);
    let fs = registry.register(settings).await?;

    let outcome = run(&cli.command, &fs).await;
    registry.shutdown().await;
    snapshot::save_namespace(coord.as_ref(), &namespace_file).await?;
    outcome
}

async fn run(command: &Commands, fs: &Arc<FileSystem>) -> Result<()> {
    match command {
        Commands::Init => {
            println!("Registered filesystem '{}'", fs.name());
            for domain in fs.domains().domains() {
                let container = fs.domains().container(domain)?;
                println!("  domain {} -> {}", domain, container.backend_root);
            }
            Ok(())
        }
        Commands::Mkdir { path } => {
            let (domain, rel) = target(fs, path)?;
            let dir = fs.create_directory(&domain, &rel).await?;
            println!("Created directory {}:{}", domain, dir.common.path);
            Ok(())
        }
        Commands::Put {
            local,
            path,
            no_overwrite,
        } => {
            let (domain, rel) = target(fs, path)?;
            let mut source = tokio::fs::File::open(local)
                .await
                .with_context(|| format!("cannot open {}", local.display()))?;
            let mut writer = fs.writer(&domain, &rel, !no_overwrite).await?;
            let copied = tokio::io::copy(&mut source, &mut writer).await?;
            let mut inode = writer.complete().await?;
            if inode.state == FileState::Updating {
                inode = fs.check_inode_available(&inode, UPLOAD_WAIT).await?;
            }
            println!(
                "Wrote {} ({}) -> {}:{} [{}]",
                local.display(),
                format_size(copied),
                domain,
                inode.common.path,
                state_name(inode.state),
            );
            Ok(())
        }
        Commands::Get { path, local } => {
            let (domain, rel) = target(fs, path)?;
            let mut reader = fs.reader(&domain, &rel).await?;
            let mut dest = tokio::fs::File::create(local)
                .await
                .with_context(|| format!("cannot create {}", local.display()))?;
            let copied = tokio::io::copy(&mut reader, &mut dest).await?;
            println!(
                "Fetched {}:{} -> {} ({})",
                domain,
                rel,
                local.display(),
                format_size(copied),
            );
            Ok(())
        }
        Commands::Ls { path, recursive } => {
            let (domain, rel) = target(fs, path)?;
            let listing = fs.list(&domain, &rel, *recursive).await?;
            if listing.is_empty() {
                println!("(empty)");
            }
            for node in listing {
                print_entry(&domain, &node);
            }
            Ok(())
        }
        Commands::Find {
            path,
            pattern,
            dir_pattern,
        } => {
            let (domain, rel) = target(fs, path)?;
            let matches = fs
                .find(&domain, &rel, dir_pattern.as_deref(), pattern)
                .await?;
            if matches.is_empty() {
                println!("(no matches)");
            }
            for node in matches {
                print_entry(&domain, &node);
            }
            Ok(())
        }
        Commands::Rm { path, recursive } => {
            let (domain, rel) = target(fs, path)?;
            fs.delete(&domain, &rel, *recursive).await?;
            println!("Removed {domain}:{rel}");
            Ok(())
        }
        Commands::Mv { source, target: to } => {
            let (domain, src) = target(fs, source)?;
            let (to_domain, dst) = target(fs, to)?;
            if domain != to_domain {
                bail!("mv does not cross domains ({domain} -> {to_domain})");
            }
            let moved = fs.move_to(&domain, &src, &dst).await?;
            println!("Moved {}:{} -> {}:{}", domain, src, domain, moved.common.path);
            Ok(())
        }
        Commands::Cp { source, target: to } => {
            let (domain, src) = target(fs, source)?;
            let (to_domain, dst) = target(fs, to)?;
            if domain != to_domain {
                bail!("cp does not cross domains ({domain} -> {to_domain})");
            }
            let copied = fs.copy(&domain, &src, &dst).await?;
            println!("Copied {}:{} -> {}:{}", domain, src, domain, copied.common.path);
            Ok(())
        }
        Commands::Stat { path } => {
            let (domain, rel) = target(fs, path)?;
            let Some(node) = fs.get_inode(&domain, &rel).await? else {
                bail!("not found: {domain}:{rel}");
            };
            let common = node.common();
            println!("uuid:     {}", common.uuid);
            println!("domain:   {}", common.domain);
            println!("path:     {}", common.path);
            println!("node:     {}", common.coord_path);
            println!("version:  {}", common.version);
            println!("created:  {}", common.create_ts.format("%Y-%m-%d %H:%M:%S UTC"));
            println!("updated:  {}", common.update_ts.format("%Y-%m-%d %H:%M:%S UTC"));
            if let Some(backend_path) = common.backend_path() {
                println!("backend:  {backend_path}");
            }
            if let Inode::File(file) = &node {
                println!("state:    {}", state_name(file.state));
                if let Some(size) = file.synced_size {
                    println!("size:     {}", format_size(size));
                }
                match &file.lock {
                    Some(lock) => println!("lock:     {}", lock.client_id),
                    None => println!("lock:     (none)"),
                }
            }
            Ok(())
        }
    }
}

/// Split `domain:relative/path`, falling back to the default domain.
fn target(fs: &FileSystem, spec: &str) -> Result<(String, String)> {
    if let Some((domain, rel)) = spec.split_once(':') {
        return Ok((domain.to_string(), rel.to_string()));
    }
    match fs.domains().default_domain() {
        Some(domain) => Ok((domain.to_string(), spec.to_string())),
        None => bail!("no default domain configured; use domain:path"),
    }
}

fn print_entry(domain: &str, node: &Inode) {
    match node {
        Inode::Directory(dir) => {
            println!("d -        -        {}:{}", domain, dir.common.path);
        }
        Inode::File(file) => {
            let size = file
                .synced_size
                .map(format_size)
                .unwrap_or_else(|| "-".to_string());
            println!(
                "f {:8} {:8} {}:{}",
                state_name(file.state),
                size,
                domain,
                file.common.path,
            );
        }
    }
}

fn state_name(state: FileState) -> &'static str {
    match state {
        FileState::New => "new",
        FileState::Updating => "updating",
        FileState::Synced => "synced",
        FileState::Error => "error",
    }
}

/// Human-readable byte count.
fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[unit])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}
