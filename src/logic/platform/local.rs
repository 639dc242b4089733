//! Local Dry-Run Platform
//!
//! Writes bundles to rotating JSONL files and keeps the cursor in
//! `state.json`. Accepts every object it is given.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use super::types::{PlatformClient, StateError, SubmitError};
use crate::logic::emitter::{BatchAck, Bundle};
use crate::logic::scheduler::Cursor;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Maximum bundle file size before rotation (50 MB)
const MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

const BUNDLE_DIR: &str = "bundles";
const STATE_FILE: &str = "state.json";

/// Default data directory
pub fn default_state_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(crate::constants::APP_NAME)
}

// ============================================================================
// BUNDLE WRITER
// ============================================================================

struct BundleWriter {
    writer: BufWriter<File>,
    current_file: PathBuf,
    current_size: u64,
    dir: PathBuf,
    sequence: u32,
}

impl BundleWriter {
    fn new(dir: PathBuf) -> std::io::Result<Self> {
        std::fs::create_dir_all(&dir)?;
        let (current_file, file) = Self::open_new_file(&dir, 0)?;

        Ok(Self {
            writer: BufWriter::new(file),
            current_file,
            current_size: 0,
            dir,
            sequence: 0,
        })
    }

    fn open_new_file(dir: &Path, sequence: u32) -> std::io::Result<(PathBuf, File)> {
        let filename = format!(
            "bundles_{}_{:03}.jsonl",
            Utc::now().format("%Y_%m_%d_%H%M%S"),
            sequence
        );
        let path = dir.join(filename);

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        tracing::info!("Opened bundle file: {:?}", path);
        Ok((path, file))
    }

    fn append(&mut self, line: &str) -> std::io::Result<()> {
        let bytes = line.as_bytes();

        if self.current_size > 0 && self.current_size + bytes.len() as u64 > MAX_FILE_SIZE {
            self.rotate()?;
        }

        self.writer.write_all(bytes)?;
        self.writer.write_all(b"\n")?;
        self.current_size += bytes.len() as u64 + 1;
        self.writer.flush()
    }

    fn rotate(&mut self) -> std::io::Result<()> {
        self.writer.flush()?;
        self.sequence += 1;

        let (path, file) = Self::open_new_file(&self.dir, self.sequence)?;
        tracing::info!("Rotated from {:?} to {:?}", self.current_file, path);

        self.writer = BufWriter::new(file);
        self.current_file = path;
        self.current_size = 0;
        Ok(())
    }
}

// ============================================================================
// PLATFORM
// ============================================================================

pub struct LocalPlatform {
    base_dir: PathBuf,
    writer: Mutex<Option<BundleWriter>>,
}

impl LocalPlatform {
    pub fn new(base_dir: PathBuf) -> std::io::Result<Self> {
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self {
            base_dir,
            writer: Mutex::new(None),
        })
    }

    fn state_path(&self) -> PathBuf {
        self.base_dir.join(STATE_FILE)
    }

    /// Bundle file currently being appended to
    pub fn current_bundle_file(&self) -> Option<PathBuf> {
        self.writer.lock().as_ref().map(|w| w.current_file.clone())
    }

    fn append_bundle(&self, line: &str) -> std::io::Result<()> {
        let mut guard = self.writer.lock();
        if guard.is_none() {
            *guard = Some(BundleWriter::new(self.base_dir.join(BUNDLE_DIR))?);
        }
        match guard.as_mut() {
            Some(writer) => writer.append(line),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PlatformClient for LocalPlatform {
    async fn submit(&self, bundle: &Bundle, _work_id: Option<&str>) -> Result<BatchAck, SubmitError> {
        let line = serde_json::to_string(bundle).map_err(|e| SubmitError::Parse(e.to_string()))?;
        self.append_bundle(&line)
            .map_err(|e| SubmitError::Io(e.to_string()))?;

        tracing::debug!("Wrote bundle {} ({} objects)", bundle.id, bundle.len());
        Ok(BatchAck {
            accepted: bundle.len(),
            rejected: Vec::new(),
        })
    }

    async fn read_cursor(&self) -> Result<Option<Cursor>, StateError> {
        let path = self.state_path();
        if !path.exists() {
            return Ok(None);
        }

        let data = std::fs::read(&path)?;
        Ok(Some(serde_json::from_slice(&data)?))
    }

    /// Write to a temp file then rename, so a crash never leaves a torn cursor
    async fn write_cursor(&self, cursor: &Cursor) -> Result<(), StateError> {
        let path = self.state_path();
        let tmp = path.with_extension("json.tmp");

        let json = serde_json::to_vec_pretty(cursor)?;
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;

        tracing::debug!("Cursor saved to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_cursor_roundtrip() {
        let dir = tempdir().unwrap();
        let platform = LocalPlatform::new(dir.path().to_path_buf()).unwrap();

        assert_eq!(platform.read_cursor().await.unwrap(), None);

        let mut tokens = BTreeMap::new();
        tokens.insert("feed".to_string(), Some("page-2".to_string()));
        let cursor = Cursor::default().advance(1_700_000_000, tokens);

        platform.write_cursor(&cursor).await.unwrap();
        assert_eq!(platform.read_cursor().await.unwrap(), Some(cursor));
        assert!(!dir.path().join("state.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupt_state_is_parse_error() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(STATE_FILE), b"{not json").unwrap();
        let platform = LocalPlatform::new(dir.path().to_path_buf()).unwrap();

        let err = platform.read_cursor().await.unwrap_err();
        assert!(matches!(err, StateError::Parse(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_submit_appends_lines() {
        let dir = tempdir().unwrap();
        let platform = LocalPlatform::new(dir.path().to_path_buf()).unwrap();

        let first = Bundle::new(vec![json!({"id": "a--1"}), json!({"id": "b--2"})]);
        let second = Bundle::new(vec![json!({"id": "c--3"})]);

        let ack = platform.submit(&first, None).await.unwrap();
        assert_eq!(ack.accepted, 2);
        platform.submit(&second, Some("work-1")).await.unwrap();

        let file = platform.current_bundle_file().unwrap();
        let content = std::fs::read_to_string(file).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["type"], "bundle");
        assert_eq!(parsed["objects"].as_array().unwrap().len(), 2);
    }
}
