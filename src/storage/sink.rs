use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{GitLiteError, GitLiteResult};
use crate::storage::record::NodeRecord;
use crate::utils::util::record_file_name;

pub static RECORD_FILE_GLOB_FORMAT: &str = "*.txt";

/// Destination for materialized index nodes, addressed by record id.
pub trait RecordSink {
    fn write(&mut self, id: &str, record: &NodeRecord) -> GitLiteResult<()>;

    /// Removing an id that was never written is not an error.
    fn remove(&mut self, id: &str) -> GitLiteResult<()>;
}

/// One text file per record inside `dir`.
#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(record_file_name(id))
    }

    pub fn read(&self, id: &str) -> GitLiteResult<Option<NodeRecord>> {
        match fs::read_to_string(self.record_path(id)) {
            Ok(text) => Ok(Some(text.parse()?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn record_files(&self) -> GitLiteResult<Vec<PathBuf>> {
        if !self.dir.exists() {
            return Ok(vec![]);
        }
        let dir = self
            .dir
            .to_str()
            .ok_or_else(|| GitLiteError::Internal("Invalid record directory".to_string()))?;
        let pattern = Path::new(&glob::Pattern::escape(dir)).join(RECORD_FILE_GLOB_FORMAT);
        let pattern = pattern
            .to_str()
            .ok_or_else(|| GitLiteError::Internal("Invalid record directory".to_string()))?;
        let mut paths = glob::glob(pattern)
            .map_err(|e| GitLiteError::Internal(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| GitLiteError::Io(e.into()))?;
        paths.retain(|path| path.is_file());
        paths.sort();
        Ok(paths)
    }

    /// Every record currently in the directory, ordered by file name.
    pub fn load_all(&self) -> GitLiteResult<Vec<NodeRecord>> {
        self.record_files()?
            .iter()
            .map(|path| fs::read_to_string(path)?.parse())
            .collect()
    }

    /// Deletes every record file, leaving unrelated files and sub-directories alone.
    pub fn clear(&self) -> GitLiteResult<()> {
        for path in self.record_files()? {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

impl RecordSink for FileSink {
    fn write(&mut self, id: &str, record: &NodeRecord) -> GitLiteResult<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.record_path(id);
        fs::write(&path, record.to_string())?;
        debug!("Node saved to file: {}", path.display());
        Ok(())
    }

    fn remove(&mut self, id: &str) -> GitLiteResult<()> {
        let path = self.record_path(id);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("Node file removed: {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Captures records in memory; used where no filesystem is wanted.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    records: BTreeMap<String, NodeRecord>,
    writes: usize,
    removals: usize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&NodeRecord> {
        self.records.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.records.keys()
    }

    pub fn records(&self) -> impl Iterator<Item = &NodeRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn writes(&self) -> usize {
        self.writes
    }

    pub fn removals(&self) -> usize {
        self.removals
    }
}

impl RecordSink for MemorySink {
    fn write(&mut self, id: &str, record: &NodeRecord) -> GitLiteResult<()> {
        self.writes += 1;
        self.records.insert(id.to_string(), record.clone());
        Ok(())
    }

    fn remove(&mut self, id: &str) -> GitLiteResult<()> {
        self.removals += 1;
        self.records.remove(id);
        Ok(())
    }
}
