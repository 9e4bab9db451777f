use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::probe::ProbeResult;

const MAX_JOURNAL_ENTRIES: usize = 10_000;

/// One line of the journal: what was tried and how it went.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JournalEntry {
    pub timestamp: DateTime<Utc>,
    pub label: String,
    pub method: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// `success`, `tool-calls`, or the failure kind.
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub elapsed_ms: u64,
}

impl JournalEntry {
    pub fn from_result(result: &ProbeResult) -> Self {
        let (outcome, detail) = match result.outcome {
            Ok(_) => ("success".to_string(), None),
            Err(ref failure) if result.answered_with_tools() => {
                ("tool-calls".to_string(), Some(failure.to_string()))
            }
            Err(ref failure) => (failure.kind().to_string(), Some(failure.to_string())),
        };
        Self {
            timestamp: Utc::now(),
            label: result.label.clone(),
            method: result.method.to_string(),
            url: result.url.clone(),
            status: result.status,
            outcome,
            detail,
            elapsed_ms: u64::try_from(result.elapsed.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Append-only JSONL journal of attempts, with the most recent entries kept in memory.
pub struct Journal {
    entries: VecDeque<JournalEntry>,
    writer: BufWriter<File>,
}

impl Journal {
    /// Open (creating if needed) and load whatever the file already holds.
    /// Lines that do not parse are skipped.
    pub fn open(file_path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file_path = file_path.as_ref();

        if let Some(parent) = file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let entries = load_entries(file_path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)?;

        Ok(Self {
            entries,
            writer: BufWriter::new(file),
        })
    }

    pub fn record(&mut self, entry: JournalEntry) -> std::io::Result<()> {
        let json = serde_json::to_string(&entry)?;
        writeln!(self.writer, "{json}")?;
        self.writer.flush()?;

        if self.entries.len() >= MAX_JOURNAL_ENTRIES {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
        Ok(())
    }

    pub fn record_results<'a>(
        &mut self,
        results: impl IntoIterator<Item = &'a ProbeResult>,
    ) -> std::io::Result<()> {
        for result in results {
            self.record(JournalEntry::from_result(result))?;
        }
        Ok(())
    }

    /// Newest first.
    pub fn recent(&self, limit: usize) -> Vec<JournalEntry> {
        self.entries.iter().rev().take(limit).cloned().collect()
    }

    /// Newest `limit` entries of the file at `file_path`, newest first, without
    /// opening it for writing. A missing file reads as empty.
    pub fn read_recent(file_path: impl AsRef<Path>, limit: usize) -> std::io::Result<Vec<JournalEntry>> {
        let entries = load_entries(file_path.as_ref())?;
        Ok(entries.into_iter().rev().take(limit).collect())
    }
}

/// Parseable lines of the file, oldest first, capped at `MAX_JOURNAL_ENTRIES`.
fn load_entries(file_path: &Path) -> std::io::Result<VecDeque<JournalEntry>> {
    let mut entries = VecDeque::new();
    if !file_path.exists() {
        return Ok(entries);
    }
    let reader = BufReader::new(File::open(file_path)?);
    for line in reader.lines().map_while(std::result::Result::ok) {
        if let Ok(entry) = serde_json::from_str::<JournalEntry>(&line) {
            if entries.len() >= MAX_JOURNAL_ENTRIES {
                entries.pop_front();
            }
            entries.push_back(entry);
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoints::{HttpMethod, SchemaKind};
    use crate::error::AttemptFailure;
    use crate::probe::ResponseBody;
    use std::time::Duration;
    use tempfile::tempdir;

    fn failed(label: &str) -> ProbeResult {
        ProbeResult {
            label: label.to_string(),
            method: HttpMethod::Post,
            url: "http://relay/v1/messages".to_string(),
            schema: SchemaKind::Messages,
            status: Some(500),
            body: ResponseBody::Empty,
            outcome: Err(AttemptFailure::Status {
                status: 500,
                preview: "internal".to_string(),
            }),
            elapsed: Duration::from_millis(42),
        }
    }

    #[test]
    fn test_entries_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs").join("journal.jsonl");

        {
            let mut journal = Journal::open(&path).unwrap();
            journal.record_results([&failed("a"), &failed("b")]).unwrap();
        }

        let journal = Journal::open(&path).unwrap();
        let recent = journal.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].label, "b");
        assert_eq!(recent[1].outcome, "status");
        assert_eq!(recent[1].status, Some(500));
        assert_eq!(recent[1].elapsed_ms, 42);
        assert_eq!(recent[1].detail.as_deref(), Some("status 500: internal"));
    }

    #[test]
    fn test_garbage_lines_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.jsonl");
        std::fs::write(&path, "not json\n").unwrap();

        let mut journal = Journal::open(&path).unwrap();
        assert!(journal.recent(5).is_empty());
        journal.record(JournalEntry::from_result(&failed("x"))).unwrap();
        assert_eq!(journal.recent(5).len(), 1);
    }

    #[test]
    fn test_read_recent_is_read_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.jsonl");

        assert!(Journal::read_recent(&path, 5).unwrap().is_empty());
        assert!(!path.exists());

        let mut journal = Journal::open(&path).unwrap();
        journal
            .record_results([&failed("a"), &failed("b"), &failed("c")])
            .unwrap();
        drop(journal);

        let recent = Journal::read_recent(&path, 2).unwrap();
        let labels: Vec<&str> = recent.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["c", "b"]);
    }
}
