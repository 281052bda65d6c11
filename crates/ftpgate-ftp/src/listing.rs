//! MLSD listing parser (RFC 3659 §7)
//!
//! Each line is `fact=value;fact=value; name`. The name starts after the
//! first `"; "`, so it may itself contain spaces or semicolons.

use std::collections::HashMap;
use tracing::debug;

/// What an MLSD `type` fact says about an entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    /// `cdir`: the listed directory itself
    CurrentDirectory,
    /// `pdir`: the parent of the listed directory
    ParentDirectory,
    /// Anything else, e.g. `OS.unix=symlink`
    Other(String),
}

impl EntryKind {
    fn from_fact(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "file" => Self::File,
            "dir" => Self::Directory,
            "cdir" => Self::CurrentDirectory,
            "pdir" => Self::ParentDirectory,
            _ => Self::Other(value.to_string()),
        }
    }
}

/// One entry of a directory listing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
    pub size: Option<u64>,
    /// Raw facts, keys lowercased
    pub facts: HashMap<String, String>,
}

impl DirEntry {
    /// Create an entry with no extra facts
    pub fn new(name: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            name: name.into(),
            kind,
            size: None,
            facts: HashMap::new(),
        }
    }

    /// Convenience constructor for a plain file
    pub fn file(name: impl Into<String>) -> Self {
        Self::new(name, EntryKind::File)
    }

    /// Convenience constructor for a subdirectory
    pub fn dir(name: impl Into<String>) -> Self {
        Self::new(name, EntryKind::Directory)
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// `cdir`/`pdir` entries refer to the listed directory or its parent
    pub fn is_self_or_parent(&self) -> bool {
        matches!(
            self.kind,
            EntryKind::CurrentDirectory | EntryKind::ParentDirectory
        )
    }
}

/// Parse a whole MLSD response body, keeping server order
pub fn parse_mlsd(raw: &str) -> Vec<DirEntry> {
    parse_mlsd_lines(raw.lines())
}

/// Parse MLSD lines as the client hands them over, keeping server order
pub fn parse_mlsd_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> Vec<DirEntry> {
    lines
        .into_iter()
        .map(|l| l.trim_end_matches(['\r', '\n']))
        .filter(|l| !l.trim().is_empty())
        .filter_map(|line| {
            let entry = parse_mlsd_line(line);
            if entry.is_none() {
                debug!(line, "skipping malformed MLSD line");
            }
            entry
        })
        .collect()
}

/// Parse a single MLSD fact line
pub fn parse_mlsd_line(line: &str) -> Option<DirEntry> {
    let (facts_str, name) = match line.find("; ") {
        Some(pos) => (&line[..pos], &line[pos + 2..]),
        // Some servers send a bare " name" when no facts are enabled
        None => line.strip_prefix(' ').map(|name| ("", name))?,
    };
    if name.is_empty() {
        return None;
    }

    let facts: HashMap<String, String> = facts_str
        .split(';')
        .filter_map(|segment| segment.split_once('='))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.to_string()))
        .collect();

    let kind = EntryKind::from_fact(facts.get("type").map(String::as_str).unwrap_or(""));
    let size = facts.get("size").and_then(|v| v.parse().ok());

    Some(DirEntry {
        name: name.to_string(),
        kind,
        size,
        facts,
    })
}
