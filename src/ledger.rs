//! JSON-backed progress ledger: one `download_status.json` per story.
//!
//! Loading never fails: an absent, corrupt, or structurally wrong file falls
//! back to an empty ledger so a crawl can always start. Saving is atomic
//! (temp file in the target directory, then rename) so an interrupted write
//! never leaves a truncated ledger behind.

use std::io::Write;
use std::path::Path;

use thiserror::Error;

use crate::model::ProgressLedger;

/// Ledger file name within the per-story metadata folder.
pub const LEDGER_FILE_NAME: &str = "download_status.json";

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Cannot create metadata folder {path}: {source}")]
    CreateDir {
        path: String,
        source: std::io::Error,
    },

    #[error("Cannot write ledger {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },

    #[error("Cannot serialize ledger {path}: {source}")]
    Serialize {
        path: String,
        source: serde_json::Error,
    },
}

/// Load the ledger at `path`. Missing file yields an empty ledger; corrupt
/// JSON or a shape without the required `chapters` key logs a warning and
/// also yields an empty ledger. Never errors.
pub fn load(path: &Path) -> ProgressLedger {
    if !path.exists() {
        return ProgressLedger::default();
    }
    let raw = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            log::error!(
                "Cannot read ledger {}: {}. Starting with an empty ledger.",
                path.display(),
                e
            );
            return ProgressLedger::default();
        }
    };
    match serde_json::from_str::<ProgressLedger>(&raw) {
        Ok(ledger) => ledger,
        Err(e) => {
            log::warn!(
                "Ledger {} is corrupt or has an unexpected structure ({}). Resetting.",
                path.display(),
                e
            );
            ProgressLedger::default()
        }
    }
}

/// Save the ledger to `path`, creating parent directories as needed.
/// Pretty-printed UTF-8 JSON with stable field order, written atomically.
pub fn save(path: &Path, ledger: &ProgressLedger) -> Result<(), LedgerError> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(dir) = parent {
        std::fs::create_dir_all(dir).map_err(|e| LedgerError::CreateDir {
            path: dir.display().to_string(),
            source: e,
        })?;
    }
    let json = serde_json::to_string_pretty(ledger).map_err(|e| LedgerError::Serialize {
        path: path.display().to_string(),
        source: e,
    })?;

    let dir = parent.unwrap_or_else(|| Path::new("."));
    let write_err = |e: std::io::Error| LedgerError::Write {
        path: path.display().to_string(),
        source: e,
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(json.as_bytes()).map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    log::debug!("Download status saved to: {}", path.display());
    Ok(())
}

/// Save, logging instead of propagating a failure. A ledger write problem
/// must not abort the crawl mid-chapter; the next checkpoint retries.
pub fn save_or_log(path: &Path, ledger: &ProgressLedger) {
    if let Err(e) = save(path, ledger) {
        log::error!("{}", e);
    }
}
