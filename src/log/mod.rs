use fs_err as fs;
use serde::Serialize;
use serde_json::to_string_pretty;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::wire::{ModelReply, PromptDocument};

/// Where one transaction's artifacts went.
#[derive(Debug, Clone)]
pub struct SavedPaths {
    pub dir: PathBuf,
    pub prompt: PathBuf,
    pub reply: PathBuf,
    pub outcome: Option<PathBuf>,
}

pub fn tx_dir(root: &Path, tx: Uuid) -> PathBuf {
    root.join("tx").join(tx.to_string())
}

/// Write the prompt text, its stats, and the raw reply under
/// `<root>/tx/<tx>/`.
pub fn save_exchange(root: &Path, tx: Uuid, prompt: &PromptDocument, reply: &ModelReply) -> anyhow::Result<SavedPaths> {
    let dir = tx_dir(root, tx);
    fs::create_dir_all(&dir)?;

    let prompt_path = dir.join("prompt.txt");
    fs::write(&prompt_path, &prompt.text)?;
    fs::write(dir.join("prompt.stats.json"), to_string_pretty(&prompt.stats)?)?;

    let reply_path = dir.join("reply.json");
    fs::write(&reply_path, to_string_pretty(reply)?)?;

    tracing::debug!("artifacts saved to {}", dir.display());
    Ok(SavedPaths { dir, prompt: prompt_path, reply: reply_path, outcome: None })
}

/// Add `outcome.json` to an existing transaction directory.
pub fn save_outcome<T: Serialize>(saved: &mut SavedPaths, outcome: &T) -> anyhow::Result<()> {
    let p = saved.dir.join("outcome.json");
    fs::write(&p, to_string_pretty(outcome)?)?;
    saved.outcome = Some(p);
    Ok(())
}
