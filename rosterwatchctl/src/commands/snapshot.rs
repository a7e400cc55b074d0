use std::path::PathBuf;

use clap::{Args, Subcommand};
use rosterwatch_core::roster::{diff, EntitySnapshot, NotificationFormatter, SnapshotStore};
use rosterwatch_core::EntityRecord;
use serde::Serialize;

use crate::{DisplayFallback, Result};

#[derive(Subcommand, Debug)]
pub enum SnapshotCommands {
    /// Print the stored entity snapshot
    Show,
}

#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Older snapshot file
    #[arg(long)]
    pub prior: PathBuf,
    /// Newer snapshot file
    #[arg(long)]
    pub current: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct SnapshotView {
    pub path: PathBuf,
    pub entities: EntitySnapshot,
}

impl SnapshotView {
    pub fn load(path: PathBuf) -> Result<Self> {
        let entities = SnapshotStore::new(&path).load()?;
        Ok(Self { path, entities })
    }
}

impl DisplayFallback for SnapshotView {
    fn display(&self) -> String {
        if self.entities.is_empty() {
            return format!("{}: empty", self.path.display());
        }
        let mut lines = vec![format!(
            "{}: {} entities",
            self.path.display(),
            self.entities.len()
        )];
        for (id, label) in self.entities.iter() {
            lines.push(format!("  {id}: {label}"));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct DiffView {
    pub added: Vec<EntityRecord>,
    pub removed: Vec<EntityRecord>,
    pub message: Option<String>,
}

impl DiffView {
    pub fn compute(args: &DiffArgs, formatter: &NotificationFormatter) -> Result<Self> {
        let prior = SnapshotStore::new(&args.prior).load()?;
        let current = SnapshotStore::new(&args.current).load()?;
        let drift = diff(&prior, &current);
        let message = formatter.format(&drift, &prior, &current);
        let pick = |ids: &std::collections::BTreeSet<String>, from: &EntitySnapshot| {
            ids.iter()
                .map(|id| EntityRecord::new(id.clone(), from.get(id).unwrap_or_default()))
                .collect::<Vec<_>>()
        };
        Ok(Self {
            added: pick(&drift.added, &current),
            removed: pick(&drift.removed, &prior),
            message,
        })
    }
}

impl DisplayFallback for DiffView {
    fn display(&self) -> String {
        self.message
            .clone()
            .unwrap_or_else(|| "no changes".to_string())
    }
}
