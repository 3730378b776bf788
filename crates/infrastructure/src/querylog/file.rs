use aegis_dns_domain::{CoreError, QueryLogRecord};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Rotating NDJSON file pair: `querylog.json` plus one rotated
/// `querylog.json.1`. Appends go to the live file; rotation is a rename, so
/// a reader never sees a torn file.
pub struct LogFiles {
    path: PathBuf,
    rotated_path: PathBuf,
    max_bytes: u64,
}

impl LogFiles {
    pub fn new(data_dir: &Path, max_bytes: u64) -> Self {
        Self {
            path: data_dir.join("querylog.json"),
            rotated_path: data_dir.join("querylog.json.1"),
            max_bytes,
        }
    }

    /// Append a batch of records, rotating first when the live file is over
    /// budget.
    pub fn append(&self, records: &[QueryLogRecord]) -> Result<(), CoreError> {
        if records.is_empty() {
            return Ok(());
        }

        if let Ok(meta) = std::fs::metadata(&self.path) {
            if meta.len() >= self.max_bytes {
                std::fs::rename(&self.path, &self.rotated_path)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let mut buffer = String::new();
        for record in records {
            match serde_json::to_string(record) {
                Ok(line) => {
                    buffer.push_str(&line);
                    buffer.push('\n');
                }
                Err(e) => warn!(error = %e, "Skipping unserializable query log record"),
            }
        }
        file.write_all(buffer.as_bytes())?;
        Ok(())
    }

    /// Read flushed records newest-file-first. Damaged lines are skipped.
    pub fn read_all(&self) -> Vec<QueryLogRecord> {
        let mut records = Vec::new();
        for path in [&self.path, &self.rotated_path] {
            let Ok(file) = File::open(path) else {
                continue;
            };
            for line in BufReader::new(file).lines().map_while(Result::ok) {
                match serde_json::from_str::<QueryLogRecord>(&line) {
                    Ok(record) => records.push(record),
                    Err(e) => warn!(error = %e, "Skipping damaged query log line"),
                }
            }
        }
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_dns_domain::{RCode, RecordType, ResultReason};
    use std::sync::Arc;

    fn record(name: &str) -> QueryLogRecord {
        QueryLogRecord {
            started_at: chrono::Utc::now(),
            name: Arc::from(name),
            qtype: RecordType::A,
            qclass: 1,
            proto: "udp".into(),
            result: ResultReason::Ok,
            rcode: RCode::NoError,
            rules: vec![],
            upstream: Some("udp://9.9.9.9:53".into()),
            elapsed_us: 1200,
            upstream_us: Some(900),
            response_size: 64,
            client_ip: None,
            client_name: None,
            cached: false,
        }
    }

    #[test]
    fn append_and_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let files = LogFiles::new(dir.path(), 1024 * 1024);
        files.append(&[record("a.example"), record("b.example")]).unwrap();

        let read = files.read_all();
        assert_eq!(read.len(), 2);
        assert_eq!(read[0].name.as_ref(), "a.example");
    }

    #[test]
    fn ndjson_reencode_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let files = LogFiles::new(dir.path(), 1024 * 1024);
        files.append(&[record("a.example")]).unwrap();

        let read = files.read_all();
        let reencoded = serde_json::to_value(&read[0]).unwrap();
        let original = serde_json::to_value(record("a.example")).unwrap();
        // Everything except the timestamp (taken at construction) matches.
        assert_eq!(reencoded["name"], original["name"]);
        assert_eq!(reencoded["result"], original["result"]);
        assert_eq!(reencoded["upstream"], original["upstream"]);
    }

    #[test]
    fn rotation_keeps_old_records_readable() {
        let dir = tempfile::tempdir().unwrap();
        let files = LogFiles::new(dir.path(), 1); // every append rotates
        files.append(&[record("old.example")]).unwrap();
        files.append(&[record("new.example")]).unwrap();

        let read = files.read_all();
        assert_eq!(read.len(), 2);
    }
}
