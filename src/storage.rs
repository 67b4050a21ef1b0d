use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Persisted set of dedup keys for items that have already been handled.
///
/// Backed by a plain text file with one key per line, appended in the order
/// keys were added. The whole file is loaded at open; `add` is durable
/// before it returns so a crash cannot cause a link to be handed off twice.
pub struct SeenFile {
    path: PathBuf,
    file: File,
    entries: HashSet<String>,
}

impl SeenFile {
    /// Opens the seen file, creating it if absent.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();

        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
            Err(error) if error.kind() == ErrorKind::NotFound => HashSet::new(),
            Err(error) => return Err(error),
        };

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self { path, file, entries })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains(key)
    }

    /// Records a key, appending it to the backing file. Adding a key that is
    /// already present is a no-op.
    pub fn add(&mut self, key: &str) -> io::Result<()> {
        if !self.entries.insert(key.to_string()) {
            return Ok(());
        }

        writeln!(self.file, "{key}")?;
        self.file.sync_data()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forgets every key and truncates the backing file.
    pub fn clear(&mut self) -> io::Result<()> {
        self.entries.clear();
        self.file.set_len(0)?;
        self.file.sync_data()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
