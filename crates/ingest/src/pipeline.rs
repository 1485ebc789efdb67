//! One archival run: discover log files, parse, archive, publish, record progress.

use std::collections::BTreeSet;
use std::path::Path;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};

use licarch_core::config::ArchiverConfig;
use licarch_core::ParsedEvent;
use licarch_queue::{PublishSummary, QueuePublisher};

use crate::error::IngestError;
use crate::parser::LineParser;
use crate::progress::ProgressTracker;
use crate::store::EventStore;

/// Totals for one [`Archiver::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub files_discovered: u64,
    /// Already in the progress record and not forced.
    pub files_skipped: u64,
    pub files_completed: u64,
    /// Read fine but no line matched; left pending for the next run.
    pub files_empty: u64,
    pub files_failed: u64,
    pub events_parsed: u64,
    /// New rows; duplicates of archived fingerprints are not counted.
    pub events_inserted: u64,
    pub events_published: u64,
    pub publish_failed: u64,
}

enum FileOutcome {
    Completed {
        parsed: u64,
        inserted: u64,
        published: PublishSummary,
    },
    Empty {
        lines: u64,
    },
}

/// Drives the parse → store → publish flow over a log directory.
///
/// Files are handled strictly one at a time in name order. Without a
/// publisher the run is archive-only.
pub struct Archiver {
    config: ArchiverConfig,
    parser: Box<dyn LineParser>,
    store: Box<dyn EventStore>,
    tracker: ProgressTracker,
    publisher: Option<QueuePublisher>,
}

impl Archiver {
    pub fn new(
        config: ArchiverConfig,
        parser: Box<dyn LineParser>,
        store: Box<dyn EventStore>,
    ) -> Self {
        let tracker = ProgressTracker::new(config.tracker_path.clone());
        Self {
            config,
            parser,
            store,
            tracker,
            publisher: None,
        }
    }

    pub fn with_publisher(mut self, publisher: QueuePublisher) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn is_archive_only(&self) -> bool {
        self.publisher.is_none()
    }

    pub fn store(&self) -> &dyn EventStore {
        self.store.as_ref()
    }

    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    /// Process every pending file. With `force`, the progress record is
    /// ignored and rewritten with only what completes in this run.
    pub async fn run(&self, force: bool) -> Result<RunSummary, IngestError> {
        if force && !self.store.deduplicates() {
            error!("Refusing force reprocess against a non-deduplicating store");
            return Err(IngestError::UnsafeForceReprocess);
        }

        let mut completed = if force {
            info!("Force reprocess requested, ignoring previous progress");
            BTreeSet::new()
        } else {
            self.tracker.load()
        };

        let files = self.discover_files().await?;
        let mut summary = RunSummary {
            files_discovered: files.len() as u64,
            ..Default::default()
        };
        info!(
            dir = %self.config.log_dir.display(),
            files = files.len(),
            already_done = completed.len(),
            archive_only = self.is_archive_only(),
            "Starting log archival"
        );

        for name in files {
            if completed.contains(&name) {
                debug!(file = %name, "Already archived, skipping");
                summary.files_skipped += 1;
                continue;
            }

            let path = self.config.log_dir.join(&name);
            match self.process_file(&path).await {
                Ok(FileOutcome::Completed {
                    parsed,
                    inserted,
                    published,
                }) => {
                    info!(file = %name, parsed, inserted, "Parsed entries");
                    summary.files_completed += 1;
                    summary.events_parsed += parsed;
                    summary.events_inserted += inserted;
                    summary.events_published += published.pushed;
                    summary.publish_failed += published.failed;
                    completed.insert(name);
                }
                Ok(FileOutcome::Empty { lines }) => {
                    warn!(file = %name, lines, "No valid entries found, will retry next run");
                    summary.files_empty += 1;
                }
                Err(e) => {
                    error!(file = %name, error = %e, "Failed to process file");
                    summary.files_failed += 1;
                }
            }
        }

        self.tracker.save(&completed)?;

        info!(
            total_parsed = summary.events_parsed,
            inserted = summary.events_inserted,
            published = summary.events_published,
            completed = summary.files_completed,
            skipped = summary.files_skipped,
            empty = summary.files_empty,
            failed = summary.files_failed,
            "Log archival complete"
        );
        Ok(summary)
    }

    /// Names of non-directory entries in the log directory carrying the
    /// configured extension, sorted.
    ///
    /// An entry whose type cannot be read is still listed so it fails on its
    /// own when opened. A listing error stops the scan with what was found.
    pub async fn discover_files(&self) -> Result<Vec<String>, IngestError> {
        let dir = &self.config.log_dir;
        match tokio::fs::metadata(dir).await {
            Ok(meta) if meta.is_dir() => {}
            _ => {
                error!(dir = %dir.display(), "Log directory not found");
                return Err(IngestError::SourceDirMissing(dir.clone()));
            }
        }

        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    error!(dir = %dir.display(), error = %e, "Log directory listing interrupted");
                    break;
                }
            };
            let path = entry.path();
            if !self.has_log_extension(&path) || !is_listable(&path, entry.file_type().await) {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(raw) => debug!(name = ?raw, "Skipping non UTF-8 file name"),
            }
        }
        names.sort();
        Ok(names)
    }

    fn has_log_extension(&self, path: &Path) -> bool {
        path.extension().and_then(|e| e.to_str()) == Some(self.config.log_extension.as_str())
    }

    async fn process_file(&self, path: &Path) -> Result<FileOutcome, IngestError> {
        let (events, lines) = self.parse_file(path).await?;
        if events.is_empty() {
            return Ok(FileOutcome::Empty { lines });
        }

        let inserted = self.store.insert_batch(&events).await?;
        let published = match &self.publisher {
            Some(publisher) => publisher.publish_all(&events).await,
            None => PublishSummary::default(),
        };

        Ok(FileOutcome::Completed {
            parsed: events.len() as u64,
            inserted,
            published,
        })
    }

    /// Matched events plus the number of non-blank lines seen. Bytes that
    /// are not valid UTF-8 are replaced rather than rejected.
    async fn parse_file(&self, path: &Path) -> Result<(Vec<ParsedEvent>, u64), IngestError> {
        let file = tokio::fs::File::open(path).await?;
        let mut reader = BufReader::new(file);
        let mut buf = Vec::new();
        let mut events = Vec::new();
        let mut lines = 0u64;

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            let line = String::from_utf8_lossy(&buf);
            if line.trim().is_empty() {
                continue;
            }
            lines += 1;
            if let Some(event) = self.parser.parse(&line) {
                events.push(event);
            }
        }

        debug!(path = %path.display(), lines, matched = events.len(), "Read log file");
        Ok((events, lines))
    }
}

fn is_listable(path: &Path, file_type: std::io::Result<std::fs::FileType>) -> bool {
    match file_type {
        Ok(file_type) => !file_type.is_dir(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cannot read entry type, listing anyway");
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::VendorLogParser;
    use crate::store::SqliteEventStore;

    const GRANT: &str =
        "2024/01/15 09:30:00:123 E LICENSE_SVC user1@workstation1 192.168.1.10 !MATLAB!Vendor Grant";
    const DETACH: &str =
        "2024/01/15 09:31:00:456 I LMGRD |jdoe| 10.0.0.7 !SIMULINK!MLM Detachment";

    async fn archiver(root: &Path) -> Archiver {
        let config = ArchiverConfig {
            log_dir: root.join("logs"),
            log_extension: "log".to_string(),
            db_path: root.join("data").join("license_logs.db"),
            tracker_path: root.join("data").join("parsed_files.json"),
        };
        let store = SqliteEventStore::open(&config.db_path).await.unwrap();
        Archiver::new(
            config,
            Box::new(VendorLogParser::new().unwrap()),
            Box::new(store),
        )
    }

    fn write_log(root: &Path, name: &str, contents: &str) {
        let dir = root.join("logs");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(name), contents).unwrap();
    }

    #[tokio::test]
    async fn test_discover_filters_and_sorts() {
        let tmp = tempfile::tempdir().unwrap();
        write_log(tmp.path(), "b.log", "");
        write_log(tmp.path(), "a.log", "");
        write_log(tmp.path(), "notes.txt", "");
        write_log(tmp.path(), "c.log.bak", "");
        std::fs::create_dir_all(tmp.path().join("logs").join("nested.log")).unwrap();

        let archiver = archiver(tmp.path()).await;
        assert_eq!(archiver.discover_files().await.unwrap(), vec!["a.log", "b.log"]);
    }

    #[test]
    fn test_unreadable_entry_type_is_listed() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("a.log");
        std::fs::write(&file, "").unwrap();

        let dir_type = std::fs::metadata(tmp.path()).map(|m| m.file_type());
        let file_type = std::fs::metadata(&file).map(|m| m.file_type());
        let broken = Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"));

        assert!(!is_listable(tmp.path(), dir_type));
        assert!(is_listable(&file, file_type));
        assert!(is_listable(&file, broken));
    }

    #[tokio::test]
    async fn test_blank_and_unmatched_lines_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let contents = format!("\n{GRANT}\n   \nserver started\r\n{DETACH}\r\n");
        write_log(tmp.path(), "a.log", &contents);

        let archiver = archiver(tmp.path()).await;
        let summary = archiver.run(false).await.unwrap();

        assert_eq!(summary.events_parsed, 2);
        assert_eq!(summary.events_inserted, 2);
        assert_eq!(summary.files_completed, 1);
        assert!(archiver.is_archive_only());
        assert_eq!(summary.events_published, 0);
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_decoded_lossily() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("logs");
        std::fs::create_dir_all(&dir).unwrap();
        let mut bytes = b"2024/01/15 09:30:00:123 E LICENSE_SVC caf\xe9 Grant\n".to_vec();
        bytes.extend_from_slice(GRANT.as_bytes());
        std::fs::write(dir.join("a.log"), bytes).unwrap();

        let archiver = archiver(tmp.path()).await;
        let summary = archiver.run(false).await.unwrap();
        assert_eq!(summary.events_parsed, 2);
    }

    #[tokio::test]
    async fn test_progress_saved_once_with_completed_files() {
        let tmp = tempfile::tempdir().unwrap();
        write_log(tmp.path(), "a.log", GRANT);
        write_log(tmp.path(), "b.log", "nothing to see here\n");

        let archiver = archiver(tmp.path()).await;
        let summary = archiver.run(false).await.unwrap();

        assert_eq!(summary.files_completed, 1);
        assert_eq!(summary.files_empty, 1);
        let done = archiver.tracker().load();
        assert!(done.contains("a.log"));
        assert!(!done.contains("b.log"));
    }
}
