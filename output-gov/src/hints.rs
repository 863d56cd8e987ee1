//! Naming hints for multi-output results.
//!
//! These only describe how a set of outputs is named. They never decide
//! whether a job is multi-output and never override a caller's task type.

use std::path::Path;

use serde::Serialize;

use crate::manifest::TaskType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HintKind {
    Sequence,
    Frames,
    Pages,
    Split,
    Tiles,
}

impl HintKind {
    /// Task type a caller could record for outputs named this way.
    pub fn task_type(&self) -> TaskType {
        match self {
            HintKind::Sequence | HintKind::Frames => TaskType::Sequence,
            HintKind::Pages => TaskType::Pages,
            HintKind::Split => TaskType::Split,
            HintKind::Tiles => TaskType::Batch,
        }
    }

    fn word(&self) -> &'static str {
        match self {
            HintKind::Sequence => "item",
            HintKind::Frames => "frame",
            HintKind::Pages => "page",
            HintKind::Split => "part",
            HintKind::Tiles => "tile",
        }
    }

    fn from_prefix(prefix: &str) -> Self {
        let prefix = prefix.to_ascii_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| prefix.contains(w));
        if has(&["page", "pg"]) {
            HintKind::Pages
        } else if has(&["frame", "frm"]) {
            HintKind::Frames
        } else if has(&["part", "split", "chunk", "segment", "shard"]) {
            HintKind::Split
        } else if has(&["tile"]) {
            HintKind::Tiles
        } else {
            HintKind::Sequence
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamingHint {
    pub kind: HintKind,
    /// Text shared by every name before the counter.
    pub prefix: String,
    /// Lowercase extension shared by every name, without the dot.
    pub extension: String,
    /// printf-style pattern reproducing the names, e.g. `frame_%04d.png`.
    pub pattern: String,
    /// Lowest and highest counter seen.
    pub range: (u64, u64),
}

struct Numbered<'a> {
    prefix: &'a str,
    digits: &'a str,
    extension: String,
}

fn split_numbered(name: &str) -> Option<Numbered<'_>> {
    let path = Path::new(name);
    let stem = path.file_stem()?.to_str()?;
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    let start = stem
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)?;
    Some(Numbered {
        prefix: &stem[..start],
        digits: &stem[start..],
        extension,
    })
}

/// Looks for a shared `<prefix><counter>.<ext>` scheme across `names`.
///
/// Needs at least two names, all with the same prefix and extension and a
/// trailing counter.
pub fn detect_naming<S: AsRef<str>>(names: &[S]) -> Option<NamingHint> {
    if names.len() < 2 {
        return None;
    }
    let parsed = names
        .iter()
        .map(|n| split_numbered(n.as_ref()))
        .collect::<Option<Vec<_>>>()?;
    let first = &parsed[0];
    if parsed
        .iter()
        .any(|p| p.prefix != first.prefix || p.extension != first.extension)
    {
        return None;
    }

    // zero padded only when every counter has the same width
    let width = first.digits.len();
    let padded = parsed.iter().all(|p| p.digits.len() == width)
        && parsed.iter().any(|p| p.digits.starts_with('0'));
    let counter = if padded {
        format!("%0{}d", width)
    } else {
        "%d".to_string()
    };

    let values: Vec<u64> = parsed.iter().filter_map(|p| p.digits.parse().ok()).collect();
    let range = (
        values.iter().copied().min().unwrap_or(0),
        values.iter().copied().max().unwrap_or(0),
    );

    Some(NamingHint {
        kind: HintKind::from_prefix(first.prefix),
        prefix: first.prefix.to_string(),
        extension: first.extension.clone(),
        pattern: join_pattern(first.prefix, &counter, &first.extension),
        range,
    })
}

/// Output pattern to request when a job is expected to yield many files of
/// `extension`, e.g. `suggest_pattern(HintKind::Frames, "png")` gives
/// `frame_%04d.png`.
pub fn suggest_pattern(kind: HintKind, extension: &str) -> String {
    let extension = extension.trim_start_matches('.').to_ascii_lowercase();
    join_pattern(&format!("{}_", kind.word()), "%04d", &extension)
}

fn join_pattern(prefix: &str, counter: &str, extension: &str) -> String {
    if extension.is_empty() {
        format!("{}{}", prefix, counter)
    } else {
        format!("{}{}.{}", prefix, counter, extension)
    }
}
