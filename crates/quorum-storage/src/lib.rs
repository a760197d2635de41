//! # quorum-storage
//!
//! why: persistent state must be durable before any reply referencing it is sent
//! relations: implements the Storage contract consumed by quorum-core
//! what: FileStorage writing term/vote and the command log as json files

use quorum_core::{LogEntry, LogIndex, ServerId, Storage, Term};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::PathBuf;

/// file-based storage using std::fs
///
/// stores state in a directory with:
/// - meta.json: current term and voted_for
/// - log.json: array of log entries
pub struct FileStorage {
    dir: PathBuf,
}

/// metadata structure for term and vote
#[derive(serde::Serialize, serde::Deserialize, Default)]
struct MetaData {
    term: Term,
    voted_for: Option<ServerId>,
}

impl FileStorage {
    /// create a filestorage at the given directory, creating it if needed
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn meta_path(&self) -> PathBuf {
        self.dir.join("meta.json")
    }

    fn log_path(&self) -> PathBuf {
        self.dir.join("log.json")
    }

    /// atomic durable write: temp file, fsync, rename over the target
    fn write_file(&self, temp_name: &str, target: PathBuf, json: &str) -> io::Result<()> {
        let temp_path = self.dir.join(temp_name);
        let mut file = File::create(&temp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        fs::rename(&temp_path, target)
    }

    fn write_log(&self, log: &[LogEntry]) -> io::Result<()> {
        let json = serde_json::to_string(log)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.write_file("log.tmp", self.log_path(), &json)
    }

    /// remove all persisted state
    pub fn clear(&mut self) -> io::Result<()> {
        let _ = fs::remove_file(self.meta_path());
        let _ = fs::remove_file(self.log_path());
        Ok(())
    }
}

impl Storage for FileStorage {
    fn save_term_and_vote(&mut self, term: Term, voted_for: Option<ServerId>) -> io::Result<()> {
        let meta = MetaData { term, voted_for };
        let json = serde_json::to_string(&meta)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.write_file("meta.tmp", self.meta_path(), &json)
    }

    fn load_term_and_vote(&self) -> io::Result<(Term, Option<ServerId>)> {
        let path = self.meta_path();
        if !path.exists() {
            return Ok((0, None)); // defaults for a new node
        }

        let mut contents = String::new();
        File::open(&path)?.read_to_string(&mut contents)?;
        let meta: MetaData = serde_json::from_str(&contents)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok((meta.term, meta.voted_for))
    }

    fn append_entries(&mut self, entries: &[LogEntry]) -> io::Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        // rewrite the whole log; a segmented append-only file could
        // replace this without touching the contract
        let mut log = self.load_log()?;
        log.extend(entries.iter().cloned());
        self.write_log(&log)
    }

    fn load_log(&self) -> io::Result<Vec<LogEntry>> {
        let path = self.log_path();
        if !path.exists() {
            return Ok(Vec::new());
        }

        let mut contents = String::new();
        File::open(&path)?.read_to_string(&mut contents)?;
        serde_json::from_str(&contents)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    fn truncate_log_from(&mut self, from_index: LogIndex) -> io::Result<()> {
        let mut log = self.load_log()?;
        log.retain(|e| e.key.index < from_index);
        self.write_log(&log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quorum_core::{Command, LogKey};
    use tempfile::tempdir;

    fn entry(term: Term, index: LogIndex, payload: &[u8]) -> LogEntry {
        LogEntry::new(
            LogKey::new(term, index),
            Command::new(index, 9, payload.to_vec()),
        )
    }

    #[test]
    fn file_storage_persists_term_and_vote() {
        let dir = tempdir().unwrap();
        let mut storage = FileStorage::new(dir.path()).unwrap();

        storage.save_term_and_vote(7, Some(3)).unwrap();
        let (term, voted_for) = storage.load_term_and_vote().unwrap();

        assert_eq!(term, 7);
        assert_eq!(voted_for, Some(3));
    }

    #[test]
    fn file_storage_appends_and_loads_log() {
        let dir = tempdir().unwrap();
        let mut storage = FileStorage::new(dir.path()).unwrap();

        storage
            .append_entries(&[entry(1, 1, b"set key1 value1"), entry(1, 2, b"set key2 value2")])
            .unwrap();

        let log = storage.load_log().unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].command.payload, b"set key1 value1".to_vec());
        assert_eq!(log[1].key, LogKey::new(1, 2));
    }

    #[test]
    fn file_storage_survives_restart() {
        let dir = tempdir().unwrap();

        // first "session"
        {
            let mut storage = FileStorage::new(dir.path()).unwrap();
            storage.save_term_and_vote(10, Some(1)).unwrap();
            storage.append_entries(&[entry(10, 1, b"command")]).unwrap();
        }

        // "restart" - new storage instance
        {
            let storage = FileStorage::new(dir.path()).unwrap();
            let (term, voted_for) = storage.load_term_and_vote().unwrap();
            let log = storage.load_log().unwrap();

            assert_eq!(term, 10);
            assert_eq!(voted_for, Some(1));
            assert_eq!(log.len(), 1);
        }
    }

    #[test]
    fn file_storage_truncates_log() {
        let dir = tempdir().unwrap();
        let mut storage = FileStorage::new(dir.path()).unwrap();

        storage
            .append_entries(&[entry(1, 1, b"a"), entry(2, 2, b"b"), entry(3, 3, b"c")])
            .unwrap();

        storage.truncate_log_from(2).unwrap();

        let log = storage.load_log().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].key.index, 1);
    }

    #[test]
    fn clear_removes_all_state() {
        let dir = tempdir().unwrap();
        let mut storage = FileStorage::new(dir.path()).unwrap();

        storage.save_term_and_vote(3, None).unwrap();
        storage.append_entries(&[entry(3, 1, b"x")]).unwrap();
        storage.clear().unwrap();

        assert_eq!(storage.load_term_and_vote().unwrap(), (0, None));
        assert!(storage.load_log().unwrap().is_empty());
    }

    #[test]
    fn persistent_state_recovers_through_file_storage() {
        let dir = tempdir().unwrap();

        {
            let mut storage = FileStorage::new(dir.path()).unwrap();
            storage.save_term_and_vote(4, Some(2)).unwrap();
            storage
                .append_entries(&[entry(4, 1, b"first"), entry(4, 2, b"second")])
                .unwrap();
        }

        let storage = FileStorage::new(dir.path()).unwrap();
        let state = quorum_core::PersistentState::recover(Box::new(storage)).unwrap();
        assert_eq!(state.current_term(), 4);
        assert_eq!(state.voted_for(), Some(2));
        assert_eq!(state.log().size(), 2);
        assert_eq!(state.log().last_key(), LogKey::new(4, 2));
    }
}
