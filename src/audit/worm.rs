//! Append-only side log for audit payloads

use std::collections::{HashMap, HashSet};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use super::{digest_line, AuditEntry, WormPayload};
use crate::types::*;

/// Write-once audit log: one JSON payload per line, opened in append mode
#[derive(Debug)]
pub struct WormLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl WormLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a payload and return its digest
    pub fn append(&self, payload: &WormPayload) -> LedgerResult<String> {
        let line = payload.to_line()?;
        let digest = digest_line(&line);

        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| LedgerError::Audit("WORM log lock poisoned".to_string()))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| io_error(&self.path, e))?;
        writeln!(file, "{line}").map_err(|e| io_error(&self.path, e))?;
        file.sync_data().map_err(|e| io_error(&self.path, e))?;

        Ok(digest)
    }

    /// Raw lines in write order; a missing file reads as empty
    pub fn read_lines(&self) -> LedgerResult<Vec<String>> {
        let file = match std::fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&self.path, e)),
        };

        BufReader::new(file)
            .lines()
            .map(|line| line.map_err(|e| io_error(&self.path, e)))
            .collect()
    }

    /// Compare the log against the relational rows
    ///
    /// Lines are matched to rows by digest first. A leftover line that names
    /// the trace of an unmatched row is that row's edited line.
    pub fn verify(&self, rows: &[AuditEntry]) -> LedgerResult<WormVerification> {
        let by_hash: HashMap<&str, usize> = rows
            .iter()
            .enumerate()
            .map(|(index, row)| (row.worm_hash.as_str(), index))
            .collect();
        let mut matched = HashSet::new();
        let mut leftovers = Vec::new();
        let mut report = WormVerification::default();

        let lines = self.read_lines()?;
        for (index, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            report.lines += 1;

            let digest = digest_line(line);
            let fresh = by_hash
                .get(digest.as_str())
                .is_some_and(|&slot| matched.insert(slot));
            if fresh {
                report.verified += 1;
            } else {
                leftovers.push((index + 1, line));
            }
        }

        for (line_no, line) in leftovers {
            let payload: WormPayload = match serde_json::from_str(line) {
                Ok(payload) => payload,
                Err(_) => {
                    report.unparsable.push(line_no);
                    continue;
                }
            };

            let edited = rows
                .iter()
                .enumerate()
                .find(|(index, row)| row.trace_id == payload.trace && !matched.contains(index))
                .map(|(index, _)| index);
            match edited {
                Some(index) => {
                    matched.insert(index);
                    report.tampered.push(payload.trace);
                }
                None => report.orphaned.push(payload.trace),
            }
        }

        for (index, row) in rows.iter().enumerate() {
            if !row.verify()? && !report.tampered.contains(&row.trace_id) {
                report.tampered.push(row.trace_id.clone());
            }
            if !matched.contains(&index) {
                report.missing.push(row.trace_id.clone());
            }
        }

        Ok(report)
    }
}

fn io_error(path: &Path, e: std::io::Error) -> LedgerError {
    LedgerError::Audit(format!("WORM log {}: {e}", path.display()))
}

/// Outcome of checking the side log against stored audit rows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WormVerification {
    pub lines: usize,
    pub verified: usize,
    /// Trace ids whose line or row no longer matches the stored digest
    pub tampered: Vec<String>,
    /// Trace ids present in the log without a row
    pub orphaned: Vec<String>,
    /// Trace ids with a row but no log line
    pub missing: Vec<String>,
    /// 1-based line numbers that are not valid payloads
    pub unparsable: Vec<usize>,
}

impl WormVerification {
    pub fn is_intact(&self) -> bool {
        self.tampered.is_empty() && self.missing.is_empty() && self.unparsable.is_empty()
    }
}
