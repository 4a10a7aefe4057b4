use std::path::{Path, PathBuf};

use serde::Serialize;

/// Optional dump directory for the inputs and outputs of one run. Writing is
/// best effort: failures are logged and never interrupt the pipeline.
#[derive(Debug, Clone, Default)]
pub struct ArtifactSink {
    dir: Option<PathBuf>,
}

impl ArtifactSink {
    pub fn new(dir: Option<&Path>) -> Self {
        let dir = dir.and_then(|dir| match std::fs::create_dir_all(dir) {
            Ok(()) => Some(dir.to_path_buf()),
            Err(e) => {
                tracing::warn!(path = %dir.display(), error = %e, "Artifact directory unavailable; dumps disabled");
                None
            }
        });
        Self { dir }
    }

    pub fn write_text(&self, name: &str, contents: &str) {
        let Some(dir) = &self.dir else {
            return;
        };
        let path = dir.join(name);
        match std::fs::write(&path, contents) {
            Ok(()) => tracing::debug!(path = %path.display(), "Wrote artifact"),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to write artifact"),
        }
    }

    pub fn write_json<T: Serialize>(&self, name: &str, value: &T) {
        if self.dir.is_none() {
            return;
        }
        match serde_json::to_string_pretty(value) {
            Ok(json) => self.write_text(name, &json),
            Err(e) => tracing::warn!(name = name, error = %e, "Failed to serialize artifact"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_into_created_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested/out");
        let sink = ArtifactSink::new(Some(&dir));

        sink.write_text("llm-prompt.txt", "prompt");
        sink.write_json("payload.json", &serde_json::json!({"id": 1}));

        assert_eq!(std::fs::read_to_string(dir.join("llm-prompt.txt")).unwrap(), "prompt");
        let payload: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.join("payload.json")).unwrap())
                .unwrap();
        assert_eq!(payload["id"], 1);
    }

    #[test]
    fn test_unusable_dir_disables_sink() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("occupied");
        std::fs::write(&file, "x").unwrap();

        let sink = ArtifactSink::new(Some(&file));
        sink.write_text("llm-prompt.txt", "prompt");
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "x");
    }
}
