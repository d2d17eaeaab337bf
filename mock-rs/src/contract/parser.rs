//! Example parsers
//!
//! Two on-disk formats are understood:
//! - file based: one YAML/JSON document per example anywhere below the directory
//! - markdown: `# /pattern`, `## METHOD`, `### case name` sections with a fenced body
//!
//! [`select_parser`] picks one by looking at the top level of the directory.

use super::{ContractData, ExampleResponse};
use crate::errors::{MockError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extension that switches a directory to the markdown parser
pub const MARKDOWN_EXTENSION: &str = "md";

static STATUS_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Status:\s*(\d{3})\s*$").expect("static regex"));
static HEADER_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Header:\s*([^:\s]+)\s*:\s*(.*)$").expect("static regex"));

/// Turns a directory of examples into [`ContractData`]
pub trait ContractParser: Send + Sync {
    fn parse(&self) -> Result<ContractData>;

    /// Short name used in logs
    fn kind(&self) -> &'static str;
}

/// Pick the parser for `dir`: markdown if any top-level entry ends in `.md`
///
/// Re-evaluated on every load so an upload in a different format switches
/// the strategy.
pub fn select_parser(dir: &Path) -> Result<Box<dyn ContractParser>> {
    let entries = fs::read_dir(dir).map_err(|e| missing_dir_error(dir, e))?;

    let mut is_markdown = false;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some(MARKDOWN_EXTENSION) {
            is_markdown = true;
            break;
        }
    }

    if is_markdown {
        Ok(Box::new(MarkdownParser::new(dir)))
    } else {
        Ok(Box::new(FileParser::new(dir)))
    }
}

fn missing_dir_error(dir: &Path, err: std::io::Error) -> MockError {
    if err.kind() == std::io::ErrorKind::NotFound {
        MockError::NotFound(format!(
            "Failed to open examples in '{}', is this a Mockpit project?",
            dir.display()
        ))
    } else {
        MockError::Io(err)
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

/// One example document of the file-based format
#[derive(Debug, Deserialize)]
struct ExampleFile {
    resource: String,
    method: String,
    case: String,
    #[serde(default)]
    response: ExampleResponse,
}

/// Parser for YAML/JSON example files
#[derive(Debug, Clone)]
pub struct FileParser {
    dir: PathBuf,
}

impl FileParser {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn parse_file(path: &Path) -> Result<ExampleFile> {
        let content = fs::read_to_string(path)?;
        let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");

        if is_json {
            serde_json::from_str(&content)
                .map_err(|e| MockError::Parse(format!("{}: {}", path.display(), e)))
        } else {
            serde_yaml::from_str(&content)
                .map_err(|e| MockError::Parse(format!("{}: {}", path.display(), e)))
        }
    }
}

impl ContractParser for FileParser {
    fn parse(&self) -> Result<ContractData> {
        if !self.dir.is_dir() {
            return Err(missing_dir_error(
                &self.dir,
                std::io::Error::from(std::io::ErrorKind::NotFound),
            ));
        }

        let mut data = ContractData::default();
        let walker = WalkDir::new(&self.dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e.path()));

        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let ext = entry.path().extension().and_then(|e| e.to_str());
            if !matches!(ext, Some("yaml") | Some("yml") | Some("json")) {
                continue;
            }

            let example = Self::parse_file(entry.path())?;
            data.add_example(&example.resource, &example.method, &example.case, example.response);
        }

        Ok(data)
    }

    fn kind(&self) -> &'static str {
        "file"
    }
}

/// Parser for markdown example documents
#[derive(Debug, Clone)]
pub struct MarkdownParser {
    dir: PathBuf,
}

/// Case being assembled while scanning a markdown file
struct PendingCase {
    name: String,
    line: usize,
    response: ExampleResponse,
    body: Option<Vec<String>>,
    /// Inside the case's first fenced block
    capturing: bool,
}

impl PendingCase {
    fn new(name: &str, line: usize) -> Self {
        Self {
            name: name.to_string(),
            line,
            response: ExampleResponse {
                headers: BTreeMap::new(),
                ..Default::default()
            },
            body: None,
            capturing: false,
        }
    }
}

impl MarkdownParser {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Parse one markdown document into `data`
    pub fn parse_document(source: &str, origin: &str, data: &mut ContractData) -> Result<()> {
        let mut resource: Option<String> = None;
        let mut method: Option<String> = None;
        let mut pending: Option<PendingCase> = None;
        let mut fence_start: Option<usize> = None;

        for (idx, raw) in source.lines().enumerate() {
            let line_no = idx + 1;
            let is_fence = raw.trim_start().starts_with("```");

            // Fenced lines are never structure; only a case's first block is its body
            if fence_start.is_some() {
                if is_fence {
                    fence_start = None;
                    if let Some(case) = pending.as_mut() {
                        case.capturing = false;
                    }
                } else if let Some(case) = pending.as_mut().filter(|c| c.capturing) {
                    if let Some(body) = case.body.as_mut() {
                        body.push(raw.to_string());
                    }
                }
                continue;
            }

            if is_fence {
                fence_start = Some(line_no);
                if let Some(case) = pending.as_mut() {
                    if case.body.is_none() {
                        case.body = Some(Vec::new());
                        case.capturing = true;
                    }
                }
                continue;
            }

            let line = raw.trim();

            if let Some(name) = line.strip_prefix("### ") {
                Self::finish(pending.take(), &resource, &method, origin, data)?;
                pending = Some(PendingCase::new(name.trim(), line_no));
            } else if let Some(verb) = line.strip_prefix("## ") {
                Self::finish(pending.take(), &resource, &method, origin, data)?;
                method = Some(verb.trim().to_uppercase());
            } else if let Some(pattern) = line.strip_prefix("# ") {
                Self::finish(pending.take(), &resource, &method, origin, data)?;
                resource = Some(pattern.trim().to_string());
                method = None;
            } else if let Some(case) = pending.as_mut() {
                if let Some(caps) = STATUS_LINE.captures(line) {
                    case.response.status = caps[1].parse().map_err(|_| {
                        MockError::Parse(format!("{}:{}: invalid status", origin, line_no))
                    })?;
                } else if let Some(caps) = HEADER_LINE.captures(line) {
                    case.response
                        .headers
                        .insert(caps[1].to_string(), caps[2].trim().to_string());
                }
            }
        }

        if let Some(line) = fence_start {
            let case = pending.as_ref().map(|c| c.name.as_str()).unwrap_or("");
            return Err(MockError::Parse(format!(
                "{}:{}: unterminated code block (case '{}')",
                origin, line, case
            )));
        }

        Self::finish(pending, &resource, &method, origin, data)
    }

    fn finish(
        pending: Option<PendingCase>,
        resource: &Option<String>,
        method: &Option<String>,
        origin: &str,
        data: &mut ContractData,
    ) -> Result<()> {
        let Some(mut case) = pending else {
            return Ok(());
        };

        let (Some(resource), Some(method)) = (resource, method) else {
            return Err(MockError::Parse(format!(
                "{}:{}: case '{}' is not inside a '# pattern' / '## METHOD' section",
                origin, case.line, case.name
            )));
        };

        if let Some(lines) = case.body.take() {
            case.response.body = lines.join("\n");
        }

        data.add_example(resource, method, &case.name, case.response);
        Ok(())
    }
}

impl ContractParser for MarkdownParser {
    fn parse(&self) -> Result<ContractData> {
        let entries = fs::read_dir(&self.dir).map_err(|e| missing_dir_error(&self.dir, e))?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_file()
                && !is_hidden(&path)
                && path.extension().and_then(|e| e.to_str()) == Some(MARKDOWN_EXTENSION)
            {
                files.push(path);
            }
        }
        files.sort();

        let mut data = ContractData::default();
        for path in files {
            let source = fs::read_to_string(&path)?;
            Self::parse_document(&source, &path.display().to_string(), &mut data)?;
        }

        Ok(data)
    }

    fn kind(&self) -> &'static str {
        "markdown"
    }
}
