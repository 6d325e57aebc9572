//! Fine-tuning dataset assembly.
//!
//! Source files are "JSONL-ish": usually one object per line, but some
//! generators emit several objects on one line or pretty-print across lines.
//! [`scan_objects`] finds top-level objects by brace depth, ignoring braces
//! inside string literals.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Source files in the order they are concatenated.
pub const DEFAULT_FILES: &[&str] = &[
    "question_answer_data.jsonl",
    "multi_turn_data.jsonl",
    "emotional_data.jsonl",
    "everyday_topics_data.jsonl",
    "guardrails_data.jsonl",
    "environmental_grounding_data.jsonl",
];

pub const DEFAULT_OUTPUT: &str = "master_dataset.jsonl";

/// One training example; every other field of the source object is dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub instruction: Value,
    pub response: Value,
}

impl DatasetRecord {
    /// Keep `instruction` and `response`; `None` if either is missing.
    pub fn extract(object: &Value) -> Option<Self> {
        let instruction = object.get("instruction")?;
        let response = object.get("response")?;
        Some(Self {
            instruction: instruction.clone(),
            response: response.clone(),
        })
    }
}

#[derive(Debug, Error)]
pub enum DatasetWarning {
    #[error("file not found: {0}")]
    MissingFile(PathBuf),

    #[error("failed to parse JSON in {file} at offset {offset}: {reason}")]
    Unparseable {
        file: String,
        offset: usize,
        reason: String,
    },
}

/// Top-level `{...}` spans in `content`, as `(byte offset, text)`.
///
/// Text outside objects is ignored. An object left open at end of input is
/// dropped.
pub fn scan_objects(content: &str) -> Vec<(usize, &str)> {
    let mut objects = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in content.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    objects.push((start, &content[start..=i]));
                }
            }
            _ => {}
        }
    }

    objects
}

/// Records and warnings from one source file.
#[derive(Debug, Default)]
pub struct FileOutcome {
    pub records: Vec<DatasetRecord>,
    /// Objects that parsed but lacked `instruction` or `response`
    pub incomplete: usize,
    pub warnings: Vec<DatasetWarning>,
}

/// Extract every usable record from `content`; `label` names it in warnings.
pub fn parse_records(label: &str, content: &str) -> FileOutcome {
    let mut outcome = FileOutcome::default();

    for (offset, text) in scan_objects(content) {
        match serde_json::from_str::<Value>(text) {
            Ok(object) => match DatasetRecord::extract(&object) {
                Some(record) => outcome.records.push(record),
                None => outcome.incomplete += 1,
            },
            Err(e) => outcome.warnings.push(DatasetWarning::Unparseable {
                file: label.to_string(),
                offset,
                reason: e.to_string(),
            }),
        }
    }

    outcome
}

/// Read one source file. A missing file is a warning, not an error.
pub fn read_file(path: &Path) -> anyhow::Result<FileOutcome> {
    if !path.exists() {
        return Ok(FileOutcome {
            warnings: vec![DatasetWarning::MissingFile(path.to_path_buf())],
            ..FileOutcome::default()
        });
    }

    let content = std::fs::read_to_string(path)?;
    let label = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(parse_records(&label, &content))
}

#[derive(Debug, Default)]
pub struct CombineReport {
    /// `(file name, records written)` in processing order
    pub file_counts: Vec<(String, usize)>,
    pub total: usize,
    pub warnings: Vec<DatasetWarning>,
    pub output: PathBuf,
}

/// Concatenate `files` (relative to `data_dir`) into `output`, one record per line.
pub fn combine(data_dir: &Path, files: &[String], output: &Path) -> anyhow::Result<CombineReport> {
    let mut writer = BufWriter::new(File::create(output)?);
    let mut report = CombineReport {
        output: output.to_path_buf(),
        ..CombineReport::default()
    };

    for name in files {
        let outcome = read_file(&data_dir.join(name))?;
        for record in &outcome.records {
            serde_json::to_writer(&mut writer, record)?;
            writer.write_all(b"\n")?;
        }

        report.total += outcome.records.len();
        report.file_counts.push((name.clone(), outcome.records.len()));
        report.warnings.extend(outcome.warnings);
    }

    writer.flush()?;
    Ok(report)
}
