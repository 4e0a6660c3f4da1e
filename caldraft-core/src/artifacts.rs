//! Write-only audit trail: source text, raw reply and final draft per item.
//!
//! Nothing here is ever read back by the pipeline. Failures are logged and
//! otherwise ignored.

use std::path::PathBuf;

use tracing::{debug, warn};

use crate::draft::EventDraft;

pub trait ArtifactSink {
    fn source(&self, item_id: &str, text: &str);
    fn reply(&self, item_id: &str, text: &str);
    fn draft(&self, item_id: &str, draft: &EventDraft);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoArtifacts;

impl ArtifactSink for NoArtifacts {
    fn source(&self, _item_id: &str, _text: &str) {}
    fn reply(&self, _item_id: &str, _text: &str) {}
    fn draft(&self, _item_id: &str, _draft: &EventDraft) {}
}

/// Writes `<item>.txt`, `<item>.reply` and `<item>.json` into a directory.
#[derive(Debug, Clone)]
pub struct FsArtifacts {
    dir: PathBuf,
}

impl FsArtifacts {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FsArtifacts { dir: dir.into() }
    }

    pub fn path_for(&self, item_id: &str, extension: &str) -> PathBuf {
        let stem = match slug::slugify(item_id) {
            s if s.is_empty() => "item".to_string(),
            s => s,
        };
        self.dir.join(format!("{}.{}", stem, extension))
    }

    fn write(&self, item_id: &str, extension: &str, contents: &str) {
        let path = self.path_for(item_id, extension);
        let result = std::fs::create_dir_all(&self.dir).and_then(|_| std::fs::write(&path, contents));
        match result {
            Ok(()) => debug!("Wrote {}", path.display()),
            Err(e) => warn!("Could not write {}: {}", path.display(), e),
        }
    }
}

impl ArtifactSink for FsArtifacts {
    fn source(&self, item_id: &str, text: &str) {
        self.write(item_id, "txt", text);
    }

    fn reply(&self, item_id: &str, text: &str) {
        self.write(item_id, "reply", text);
    }

    fn draft(&self, item_id: &str, draft: &EventDraft) {
        match serde_json::to_string_pretty(draft) {
            Ok(json) => self.write(item_id, "json", &json),
            Err(e) => warn!("Could not serialize draft for {}: {}", item_id, e),
        }
    }
}
