// Local sync index
//
// Records the metadata of every file as of the end of the last pass, so the
// next pass can tell local edits (hash list changed) from untouched files.
// Stored as a text file inside the synced directory, one line per file:
//
//   <filename>,<version>,<hash1> <hash2> ... <hashN> <space>
//
// The trailing hash delimiter is mandatory. Any line that does not parse is
// a hard error: a corrupt baseline would turn into spurious uploads or lost
// edits, so it is never skipped.

use crate::chunker::is_block_hash;
use crate::error::{Result, SyncError};
use crate::meta::{FileInfoMap, FileMetaData};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Reserved filename of the index inside the synced directory
pub const INDEX_FILENAME: &str = "index.txt";

/// Written next to the index and renamed over it on save
pub const INDEX_TEMP_FILENAME: &str = "index.txt.tmp";

/// Separates filename, version and hash list
pub const CONFIG_DELIMITER: char = ',';

/// Terminates every hash in the hash list
pub const HASH_DELIMITER: char = ' ';

/// The client's last-synchronized view of its directory.
#[derive(Debug, Clone)]
pub struct LocalIndex {
    path: PathBuf,
    entries: BTreeMap<String, FileMetaData>,
}

impl LocalIndex {
    /// Path of the index file for `base_dir`
    pub fn path_for(base_dir: &Path) -> PathBuf {
        base_dir.join(INDEX_FILENAME)
    }

    /// An empty index that will be saved under `base_dir`.
    pub fn empty(base_dir: &Path) -> Self {
        Self {
            path: Self::path_for(base_dir),
            entries: BTreeMap::new(),
        }
    }

    /// Load the index for `base_dir`. A missing file is an empty index.
    pub fn load(base_dir: &Path) -> Result<Self> {
        let path = Self::path_for(base_dir);
        if !path.is_file() {
            return Ok(Self {
                path,
                entries: BTreeMap::new(),
            });
        }

        let file = fs::File::open(&path)?;
        let entries = Self::parse(BufReader::new(file))?;
        tracing::debug!(path = %path.display(), files = entries.len(), "Loaded local index");

        Ok(Self { path, entries })
    }

    fn parse(reader: impl BufRead) -> Result<BTreeMap<String, FileMetaData>> {
        let mut entries = BTreeMap::new();

        for (i, line) in reader.lines().enumerate() {
            let line_no = i + 1;
            let line = match line {
                Ok(line) => line,
                Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                    return Err(SyncError::CorruptIndex {
                        line: line_no,
                        reason: "not valid UTF-8".to_string(),
                    })
                }
                Err(e) => return Err(e.into()),
            };

            if line.is_empty() {
                continue;
            }

            let meta = parse_line(&line).map_err(|reason| SyncError::CorruptIndex {
                line: line_no,
                reason,
            })?;

            if entries.contains_key(&meta.filename) {
                return Err(SyncError::CorruptIndex {
                    line: line_no,
                    reason: format!("duplicate entry for {}", meta.filename),
                });
            }
            entries.insert(meta.filename.clone(), meta);
        }

        Ok(entries)
    }

    /// Rewrite the index file (atomic replace via temp file + rename).
    pub fn save(&self) -> Result<()> {
        let temp_file = self.path.with_file_name(INDEX_TEMP_FILENAME);

        {
            let mut out = BufWriter::new(fs::File::create(&temp_file)?);
            for meta in self.entries.values() {
                writeln!(out, "{}", format_line(meta))?;
            }
            out.flush()?;
        }

        fs::rename(&temp_file, &self.path)?;
        tracing::debug!(path = %self.path.display(), files = self.entries.len(), "Saved local index");

        Ok(())
    }

    pub fn get(&self, filename: &str) -> Option<&FileMetaData> {
        self.entries.get(filename)
    }

    pub fn insert(&mut self, meta: FileMetaData) {
        self.entries.insert(meta.filename.clone(), meta);
    }

    /// Replace every entry with `entries`.
    pub fn replace_all(&mut self, entries: FileInfoMap) {
        self.entries = entries;
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileMetaData> {
        self.entries.values()
    }

    pub fn entries(&self) -> &BTreeMap<String, FileMetaData> {
        &self.entries
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Whether `name` fits in the filename field of an index line.
pub fn is_indexable_name(name: &str) -> bool {
    !name.is_empty() && !name.contains([CONFIG_DELIMITER, '\n', '\r'])
}

/// Whether `meta` can be written to the index and read back unchanged.
pub fn is_indexable(meta: &FileMetaData) -> bool {
    is_indexable_name(&meta.filename)
        && meta.version >= 1
        && meta.block_hash_list.iter().all(|h| is_block_hash(h))
}

/// Encode one index line (without the newline).
pub fn format_line(meta: &FileMetaData) -> String {
    let mut line = format!(
        "{}{CONFIG_DELIMITER}{}{CONFIG_DELIMITER}",
        meta.filename, meta.version
    );
    for hash in &meta.block_hash_list {
        line.push_str(hash);
        line.push(HASH_DELIMITER);
    }
    line
}

/// Decode one index line; the error is a human-readable reason.
pub fn parse_line(line: &str) -> std::result::Result<FileMetaData, String> {
    let fields: Vec<&str> = line.split(CONFIG_DELIMITER).collect();
    if fields.len() != 3 {
        return Err(format!("expected 3 fields, found {}", fields.len()));
    }

    let filename = fields[0];
    if filename.is_empty() {
        return Err("empty filename".to_string());
    }

    let version: i32 = fields[1]
        .parse()
        .map_err(|_| format!("invalid version {:?}", fields[1]))?;
    if version < 1 {
        return Err(format!("version {version} is below 1"));
    }

    // "h1 h2 " splits into ["h1", "h2", ""]; the empty tail is the mandatory
    // trailing delimiter. An empty list is the empty string.
    let mut hashes: Vec<&str> = fields[2].split(HASH_DELIMITER).collect();
    match hashes.pop() {
        Some("") => {}
        _ => return Err("hash list is missing its trailing delimiter".to_string()),
    }
    if let Some(bad) = hashes.iter().find(|h| !is_block_hash(h)) {
        return Err(format!("invalid block hash {bad:?}"));
    }

    Ok(FileMetaData {
        filename: filename.to_string(),
        version,
        block_hash_list: hashes.into_iter().map(str::to_string).collect(),
    })
}
