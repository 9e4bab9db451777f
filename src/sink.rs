//! Files written for a human to look at after a run.
//!
//! Nothing in the crate reads these back except `read_text`, which exists so the
//! text file format stays lossless.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde_json::Value;

use crate::error::Result;

const RULE_WIDTH: usize = 80;

pub struct OutputSink {
    dir: PathBuf,
}

impl OutputSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Write `news_<label>_<stamp>.txt`: a title line, a rule, a blank line, then `text`
    /// verbatim. When `sources` is non-empty, a numbered `(title, url)` list follows.
    pub fn save_text_with_sources(
        &self,
        label: &str,
        text: &str,
        sources: &[(&str, &str)],
    ) -> Result<PathBuf> {
        self.save_text_with_sources_at(label, text, sources, Local::now())
    }

    pub fn save_text_with_sources_at(
        &self,
        label: &str,
        text: &str,
        sources: &[(&str, &str)],
        now: DateTime<Local>,
    ) -> Result<PathBuf> {
        let path = self.dir.join(format!("{}.txt", stem(label, now)));
        let mut content = format!(
            "International news ({}) - {}\n{}\n\n{}",
            label,
            now.format("%Y-%m-%d %H:%M:%S"),
            "=".repeat(RULE_WIDTH),
            text
        );
        if !sources.is_empty() {
            content.push_str(&sources_marker());
            for (i, (title, url)) in sources.iter().enumerate() {
                content.push_str(&format!("{}. {}\n   {}\n", i + 1, title, url));
            }
        }
        self.write(&path, &content)?;
        tracing::info!(path = %path.display(), "Saved text");
        Ok(path)
    }

    /// Write the raw response next to the text file as `news_<label>_<stamp>.json`.
    pub fn save_response(&self, label: &str, body: &Value) -> Result<PathBuf> {
        self.save_response_at(label, body, Local::now())
    }

    pub fn save_response_at(&self, label: &str, body: &Value, now: DateTime<Local>) -> Result<PathBuf> {
        self.save_json(&format!("{}.json", stem(label, now)), body)
    }

    /// Pretty-print `body` into `file_name` inside the output directory.
    pub fn save_json(&self, file_name: &str, body: &Value) -> Result<PathBuf> {
        let path = self.dir.join(file_name);
        self.write(&path, &serde_json::to_string_pretty(body)?)?;
        tracing::info!(path = %path.display(), "Saved JSON");
        Ok(path)
    }

    /// Dump a body that answered 2xx but yielded no text.
    pub fn save_debug(&self, label: &str, body: &Value) -> Result<PathBuf> {
        self.save_json(&format!("debug_response_{}.json", sanitize(label)), body)
    }

    pub fn save_survey(&self, label: &str, body: &Value) -> Result<PathBuf> {
        self.save_json(&format!("survey_{}.json", sanitize(label)), body)
    }

    /// The text body of a file written by `save_text_with_sources`, without its header or sources.
    pub fn read_text(path: &Path) -> Result<String> {
        let content = fs::read_to_string(path)?;
        let mut parts = content.splitn(3, '\n');
        let _title = parts.next();
        let rule = parts.next().unwrap_or_default();
        let rest = parts.next().unwrap_or_default();

        if rule.len() != RULE_WIDTH || !rule.chars().all(|c| c == '=') {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("{} was not written by the output sink", path.display()),
            )
            .into());
        }
        let body = rest.strip_prefix('\n').unwrap_or(rest);
        let body = match body.rfind(&sources_marker()) {
            Some(idx) => &body[..idx],
            None => body,
        };
        Ok(body.to_string())
    }

    fn write(&self, path: &Path, content: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(path, content)?;
        Ok(())
    }
}

fn sources_marker() -> String {
    format!("\n\n{}\nSearch result sources:\n", "-".repeat(RULE_WIDTH))
}

fn stem(label: &str, now: DateTime<Local>) -> String {
    format!("news_{}_{}", sanitize(label), now.format("%Y%m%d_%H%M%S"))
}

fn sanitize(label: &str) -> String {
    label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use tempfile::tempdir;

    fn fixed_now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 10, 1, 9, 30, 5).unwrap()
    }

    #[test]
    fn test_text_round_trip() {
        let dir = tempdir().unwrap();
        let sink = OutputSink::new(dir.path());
        let text = "1. 标题\n\n2. Second line\n";

        let path = sink.save_text_with_sources_at("messages", text, &[], fixed_now()).unwrap();
        assert_eq!(path.file_name().unwrap(), "news_messages_20251001_093005.txt");
        assert_eq!(OutputSink::read_text(&path).unwrap(), text);

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.starts_with("International news (messages) - 2025-10-01 09:30:05\n"));
    }

    #[test]
    fn test_response_json_keeps_unicode() {
        let dir = tempdir().unwrap();
        let sink = OutputSink::new(dir.path().join("nested"));

        let path = sink
            .save_response_at("web search", &json!({"text": "国际新闻"}), fixed_now())
            .unwrap();
        assert_eq!(path.file_name().unwrap(), "news_web_search_20251001_093005.json");
        assert!(fs::read_to_string(&path).unwrap().contains("国际新闻"));
    }

    #[test]
    fn test_sources_section_round_trip() {
        let dir = tempdir().unwrap();
        let sink = OutputSink::new(dir.path());
        let text = "1. Headline A\n2. Headline B";
        let sources = [("A", "https://a.example"), ("B", "https://b.example")];

        let path = sink
            .save_text_with_sources_at("web-search", text, &sources, fixed_now())
            .unwrap();
        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("Search result sources:\n1. A\n   https://a.example\n2. B\n"));
        assert_eq!(OutputSink::read_text(&path).unwrap(), text);
    }

    #[test]
    fn test_read_text_rejects_foreign_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("other.txt");
        fs::write(&path, "just some notes\n").unwrap();
        assert!(OutputSink::read_text(&path).is_err());
    }
}
