// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! `regscript`: apply `.reg` files to a persistent key store, export it as
//! an `.rgs` script, load scripts back, and report identifier conflicts
//! between sources.
//!
//! Logs go to stderr (`RUST_LOG`, default `info`; `-v` for debug); reports
//! go to stdout.

mod config;

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use regscript_core::{
    export_file, import_reg_file, load_rgs_file, mark_exported, ConflictScope, ExportOptions,
    Exporter, StoreResolver, Substitutions,
};
use regscript_store::{MemoryStore, RegistryStore, RootKey};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::config::{store_location, Config};

#[derive(Parser, Debug)]
#[command(author, version, about = "Registration script import/export")]
struct Args {
    /// Store snapshot file (defaults to the platform data directory)
    #[arg(long, env = "REGSCRIPT_STORE", global = true)]
    store: Option<PathBuf>,
    /// JSON config file with `import` / `export` sections
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import `.reg` files into the store
    Import {
        /// Files to import, in order
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Import nothing if two files claim the same identifier
        #[arg(long)]
        deny_conflicts: bool,
    },
    /// Write one hive of the store as an `.rgs` script
    Export {
        /// Output file
        #[arg(long)]
        out: PathBuf,
        /// Directory rewritten to %ROOT% in string values
        #[arg(long)]
        root: Option<String>,
        /// Spaces per indent level (0 = tabs, max 8)
        #[arg(long)]
        tab_width: Option<usize>,
        /// Hive to export
        #[arg(long, default_value = "HKCR", value_parser = parse_hive)]
        hive: RootKey,
        /// Tag each exported top-level key with the export marker
        #[arg(long)]
        mark: bool,
    },
    /// Apply an `.rgs` script to the store
    Load {
        /// Script to apply
        file: PathBuf,
        /// Value substituted for %ROOT%
        #[arg(long)]
        root: Option<String>,
    },
    /// Report identifiers claimed by more than one `.reg` file
    Conflicts {
        /// Files to compare
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Print the store as an `.rgs` script
    Show {
        /// Only this hive
        #[arg(long, value_parser = parse_hive)]
        hive: Option<RootKey>,
    },
}

fn parse_hive(text: &str) -> Result<RootKey, String> {
    RootKey::from_alias(text)
        .ok_or_else(|| format!("unknown hive {text:?} (expected HKCR or HKLM)"))
}

fn init_tracing(verbose: u8) -> Result<()> {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?,
        1 => EnvFilter::try_new("debug")?,
        _ => EnvFilter::try_new("trace")?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose)?;
    let config = Config::load(args.config.as_deref())?;
    let fs_store = store_location(args.store)?;
    debug!(store = %fs_store.path().display(), "using store");

    match args.command {
        Command::Import { files, deny_conflicts } => {
            let deny = deny_conflicts || config.import.deny_conflicts;
            let conflicts = report_conflicts(&files)?;
            if deny && conflicts > 0 {
                bail!("{conflicts} conflicting identifier(s); nothing imported");
            }
            let mut store = fs_store.load().context("loading store")?;
            let mut out = io::stdout().lock();
            for file in &files {
                let stats = import_reg_file(file, &mut store)
                    .with_context(|| format!("importing {}", file.display()))?;
                writeln!(
                    out,
                    "{}: {} keys, {} values, {} skipped",
                    file.display(),
                    stats.keys_opened,
                    stats.values_set,
                    stats.skipped
                )?;
            }
            fs_store.save(&store).context("saving store")?;
        }
        Command::Export {
            out,
            root,
            tab_width,
            hive,
            mark,
        } => {
            let options = export_options(config.export, root, tab_width);
            let mut store = fs_store.load().context("loading store")?;
            let stats = {
                let resolver = StoreResolver::new(&store);
                export_file(&store, &resolver, &options, hive, &out)
                    .with_context(|| format!("exporting to {}", out.display()))?
            };
            info!(keys = stats.keys, values = stats.values, out = %out.display(), "exported");
            if mark {
                let top = store.subkeys(&store.root(hive)).context("listing keys")?;
                for (_, key) in &top {
                    mark_exported(&mut store, key, 1).context("marking exported key")?;
                }
                fs_store.save(&store).context("saving store")?;
            }
        }
        Command::Load { file, root } => {
            let mut subs = Substitutions::new();
            if let Some(root) = root.or(config.export.relocation_root) {
                subs.insert("ROOT", root);
            }
            let mut store = fs_store.load().context("loading store")?;
            let stats = load_rgs_file(&file, &mut store, &subs)
                .with_context(|| format!("loading {}", file.display()))?;
            fs_store.save(&store).context("saving store")?;
            writeln!(
                io::stdout().lock(),
                "{}: {} keys, {} values",
                file.display(),
                stats.keys,
                stats.values
            )?;
        }
        Command::Conflicts { files } => {
            let conflicts = report_conflicts(&files)?;
            info!(conflicts, "conflict check complete");
        }
        Command::Show { hive } => {
            let store = fs_store.load().context("loading store")?;
            let hives = hive.map_or_else(|| RootKey::ALL.to_vec(), |hive| vec![hive]);
            show(&store, &config.export, &hives)?;
        }
    }
    Ok(())
}

fn export_options(
    mut options: ExportOptions,
    root: Option<String>,
    tab_width: Option<usize>,
) -> ExportOptions {
    if root.is_some() {
        options.relocation_root = root;
    }
    if let Some(width) = tab_width {
        options.tab_width = width;
    }
    options
}

/// Print every conflict between `files`; returns the count.
fn report_conflicts(files: &[PathBuf]) -> Result<usize> {
    let mut scope = ConflictScope::new();
    for file in files {
        let mut scratch = MemoryStore::new();
        import_reg_file(file, &mut scratch).with_context(|| format!("reading {}", file.display()))?;
        scope.collect(&scratch, &source_name(file)).context("collecting identifiers")?;
    }
    let mut out = io::stdout().lock();
    let mut result = Ok(());
    let count = scope.for_each_conflict(|kind, identifier, contributors| {
        if result.is_ok() {
            result = writeln!(
                out,
                "conflict: {} {identifier}: {}",
                kind.label(),
                contributors.join(":")
            );
        }
    });
    result?;
    Ok(count)
}

fn source_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned())
}

fn show(store: &MemoryStore, options: &ExportOptions, hives: &[RootKey]) -> Result<()> {
    let resolver = StoreResolver::new(store);
    let mut options = options.clone();
    if hives.len() > 1 {
        // one display name cannot label several hives
        options.root_name = None;
    }
    let mut out = io::stdout().lock();
    for &hive in hives {
        Exporter::new(store, &resolver, &options)
            .export_root(hive, &mut out)
            .context("writing script")?;
    }
    Ok(())
}
