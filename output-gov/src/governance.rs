//! Pixel/frame governance for arguments handed to an external encoder.
//!
//! Nothing here fails: arguments are classified and rewritten, and the caller
//! decides what to do with the resulting errors and warnings.

use std::path::Path;

use serde::Serialize;

use crate::config::GovernanceConfig;

/// Full-range (JPEG) pixel formats that ffmpeg deprecates, with their
/// replacement. The replacement must be paired with an explicit color range.
const DEPRECATED_PIXEL_FORMATS: &[(&str, &str)] = &[
    ("yuvj420p", "yuv420p"),
    ("yuvj422p", "yuv422p"),
    ("yuvj444p", "yuv444p"),
    ("yuvj440p", "yuv440p"),
    ("yuvj411p", "yuv411p"),
];

const PIXEL_FORMAT_OPTS: &[&str] = &["-pix_fmt", "-pixel_format"];
const FILTER_OPTS: &[&str] = &["-vf", "-filter:v", "-filter_complex"];
const FRAME_LIMIT_OPTS: &[&str] = &["-frames:v", "-vframes"];
const FRAME_LIMIT: [&str; 2] = ["-frames:v", "1"];

/// True iff the path contains a printf-style numeric placeholder such as
/// `%d`, `%4d` or `%04d`. `%%` is a literal percent sign.
pub fn is_sequence_output(path: &str) -> bool {
    let bytes = path.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'%' {
            i += 1;
            continue;
        }
        if bytes.get(i + 1) == Some(&b'%') {
            i += 2;
            continue;
        }
        let mut j = i + 1;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if bytes.get(j) == Some(&b'd') {
            return true;
        }
        i = j.max(i + 1);
    }
    false
}

fn deprecated_replacement(token: &str) -> Option<&'static str> {
    DEPRECATED_PIXEL_FORMATS
        .iter()
        .find(|(old, _)| old.eq_ignore_ascii_case(token))
        .map(|(_, new)| *new)
}

/// Pixel format an image target should be encoded with.
fn target_pixel_format(format: &str) -> Option<&'static str> {
    match format.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" | "webp" | "avif" => Some("yuv420p"),
        "png" | "tif" | "tiff" | "ppm" | "tga" | "ico" | "jxl" => Some("rgb24"),
        "bmp" => Some("bgr24"),
        "pgm" => Some("gray"),
        _ => None,
    }
}

fn is_yuv(pixel_format: &str) -> bool {
    pixel_format.starts_with("yuv")
}

fn extension_of(path: &str) -> Option<String> {
    Path::new(path)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
}

/// Index of the output path: the trailing non-option argument, unless it is
/// the value of `-i`.
fn output_index(args: &[String]) -> Option<usize> {
    let last = args.len().checked_sub(1)?;
    if args[last].starts_with('-') {
        return None;
    }
    if last > 0 && args[last - 1] == "-i" {
        return None;
    }
    Some(last)
}

/// Matches `arg` against option names, allowing a stream specifier suffix
/// (`-pix_fmt:v`, `-filter:v:0`).
fn is_option(arg: &str, names: &[&str]) -> bool {
    names.iter().any(|name| {
        arg.strip_prefix(name)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(':'))
    })
}

fn is_frame_limit_opt(arg: &str) -> bool {
    // bare -frames applies to every stream; -frames:a is not a video limit
    arg == "-frames" || is_option(arg, FRAME_LIMIT_OPTS)
}

/// Index of the value of the last video frame limit; the encoder honors the
/// last one given.
fn frame_limit_value(args: &[String]) -> Option<usize> {
    args.windows(2)
        .enumerate()
        .filter(|(_, w)| is_frame_limit_opt(&w[0]) && !w[1].starts_with('-'))
        .map(|(i, _)| i + 1)
        .last()
}

fn has_single_frame_limit(args: &[String]) -> bool {
    frame_limit_value(args).is_some_and(|i| args[i].trim().parse::<u64>() == Ok(1))
}

fn has_color_range(args: &[String]) -> bool {
    args.iter().any(|a| a.starts_with("-color_range"))
}

/// A filter graph split into filter bodies and the separators between them.
struct FilterGraph<'a> {
    parts: Vec<&'a str>,
    separators: Vec<char>,
}

impl<'a> FilterGraph<'a> {
    fn parse(graph: &'a str) -> Self {
        let mut parts = Vec::new();
        let mut separators = Vec::new();
        let mut start = 0;
        for (i, c) in graph.char_indices() {
            if c == ',' || c == ';' {
                parts.push(&graph[start..i]);
                separators.push(c);
                start = i + 1;
            }
        }
        parts.push(&graph[start..]);
        Self { parts, separators }
    }

    fn join(parts: &[String], separators: &[char]) -> String {
        let mut out = String::new();
        for (i, part) in parts.iter().enumerate() {
            out.push_str(part);
            if let Some(sep) = separators.get(i) {
                out.push(*sep);
            }
        }
        out
    }

    fn has_scale(&self) -> bool {
        self.parts.iter().any(|p| is_scale(filter_body(p).1))
    }

    fn has_range(&self) -> bool {
        self.parts.iter().any(|p| p.contains("out_range="))
    }
}

/// Splits a filter segment into (leading labels, body, trailing labels).
fn filter_body(segment: &str) -> (&str, &str, &str) {
    let mut start = 0;
    let bytes = segment.as_bytes();
    while start < bytes.len() && (bytes[start] == b'[' || bytes[start].is_ascii_whitespace()) {
        if bytes[start] == b'[' {
            match segment[start..].find(']') {
                Some(end) => start += end + 1,
                None => break,
            }
        } else {
            start += 1;
        }
    }
    let mut end = segment.len();
    while end > start && segment[..end].ends_with(']') {
        match segment[start..end].rfind('[') {
            Some(open) => end = start + open,
            None => break,
        }
    }
    (&segment[..start], &segment[start..end], &segment[end..])
}

fn is_scale(body: &str) -> bool {
    body.split('=').next().map(str::trim) == Some("scale")
}

fn flush_token(token: &mut String, out: &mut String, notes: &mut Vec<String>) {
    match deprecated_replacement(token) {
        Some(new) => {
            notes.push(format!("replaced deprecated pixel format {} with {}", token, new));
            out.push_str(new);
        }
        None => out.push_str(token),
    }
    token.clear();
}

/// Replaces deprecated pixel formats inside a filter graph token by token.
fn replace_deprecated_in_filter(graph: &str, notes: &mut Vec<String>) -> String {
    let mut out = String::with_capacity(graph.len());
    let mut token = String::new();
    for c in graph.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            token.push(c);
        } else {
            flush_token(&mut token, &mut out, notes);
            out.push(c);
        }
    }
    flush_token(&mut token, &mut out, notes);
    out
}

fn deprecated_in_filter(graph: &str) -> Vec<&str> {
    graph
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|t| deprecated_replacement(t).is_some())
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

/// What must be injected before a producing tool runs, derived from the
/// requested output alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GovernanceDecision {
    pub frame_limit: bool,
    pub pixel_format_args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FixedArgs {
    pub args: Vec<String>,
    /// Human readable list of the rewrites that were applied.
    pub applied: Vec<String>,
    /// Validation of `args`, after fixing.
    pub report: ValidationReport,
}

pub struct ArgGovernor {
    config: GovernanceConfig,
}

impl ArgGovernor {
    pub fn new(config: GovernanceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GovernanceConfig {
        &self.config
    }

    pub fn is_image_output(&self, path: &str) -> bool {
        extension_of(path).is_some_and(|ext| self.config.is_image_format(&ext))
    }

    /// An image that is not a numbered sequence: the tool must stop after one frame.
    pub fn needs_single_frame_limit(&self, path: &str) -> bool {
        self.is_image_output(path) && !is_sequence_output(path)
    }

    /// Arguments forcing a non-deprecated, full-range pixel encoding for image
    /// targets. An existing scale chain keeps its stages; the range stage is
    /// appended after them.
    pub fn pixel_format_args(
        &self,
        output_format: &str,
        has_scale: bool,
        existing_filter: Option<&str>,
    ) -> Vec<String> {
        if !self.config.is_image_format(output_format) {
            return Vec::new();
        }
        let range_stage = format!("scale={}", self.config.range_options);
        let mut out = Vec::new();
        match existing_filter.filter(|f| !f.trim().is_empty()) {
            Some(filter) if has_scale && !FilterGraph::parse(filter).has_range() => {
                out.push("-vf".to_string());
                out.push(format!("{},{}", filter, range_stage));
            }
            Some(filter) => {
                out.push("-vf".to_string());
                out.push(filter.to_string());
            }
            None if has_scale => {
                out.push("-vf".to_string());
                out.push(range_stage);
            }
            None => {}
        }
        if let Some(pix_fmt) = target_pixel_format(output_format) {
            out.push("-pix_fmt".to_string());
            out.push(pix_fmt.to_string());
            if is_yuv(pix_fmt) {
                out.push("-color_range".to_string());
                out.push(self.config.color_range.clone());
            }
        }
        out
    }

    pub fn decide(
        &self,
        output_path: &str,
        output_format: &str,
        existing_filter: Option<&str>,
    ) -> GovernanceDecision {
        let has_scale = existing_filter.is_some_and(|f| FilterGraph::parse(f).has_scale());
        GovernanceDecision {
            frame_limit: self.needs_single_frame_limit(output_path),
            pixel_format_args: self.pixel_format_args(output_format, has_scale, existing_filter),
        }
    }

    pub fn validate_args(&self, args: &[String]) -> ValidationReport {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        for (i, arg) in args.iter().enumerate() {
            let Some(value) = args.get(i + 1) else {
                continue;
            };
            if is_option(arg, PIXEL_FORMAT_OPTS) {
                if let Some(new) = deprecated_replacement(value) {
                    errors.push(format!(
                        "deprecated pixel format '{}' in {} (use '{}' with -color_range {})",
                        value, arg, new, self.config.color_range
                    ));
                }
            } else if is_option(arg, FILTER_OPTS) {
                for token in deprecated_in_filter(value) {
                    errors.push(format!(
                        "deprecated pixel format '{}' in {} (use '{}')",
                        token,
                        arg,
                        deprecated_replacement(token).unwrap_or_default()
                    ));
                }
                let graph = FilterGraph::parse(value);
                if graph.has_scale() && !graph.has_range() {
                    warnings.push(format!(
                        "scale filter without range handling in {} '{}'",
                        arg, value
                    ));
                }
            }
        }

        if let Some(idx) = output_index(args) {
            let output = &args[idx];
            if self.needs_single_frame_limit(output) && !has_single_frame_limit(args) {
                match frame_limit_value(args) {
                    Some(v) => warnings.push(format!(
                        "image output '{}' is limited to {} frames, not a single frame (-frames:v 1)",
                        output, args[v]
                    )),
                    None => warnings.push(format!(
                        "image output '{}' has no single-frame limit (-frames:v 1)",
                        output
                    )),
                }
            }
        }

        ValidationReport {
            valid: errors.is_empty(),
            warnings,
            errors,
        }
    }

    /// Deterministic auto-correction. Idempotent.
    pub fn fix_args(&self, args: &[String]) -> Vec<String> {
        self.fix_args_with_notes(args).0
    }

    fn fix_args_with_notes(&self, args: &[String]) -> (Vec<String>, Vec<String>) {
        let mut notes = Vec::new();
        let mut out: Vec<String> = Vec::with_capacity(args.len() + 4);
        let mut replaced = false;
        // position right after the first fixed -pix_fmt pair
        let mut range_at = None;

        let mut i = 0;
        while i < args.len() {
            let arg = &args[i];
            out.push(arg.clone());
            let Some(value) = args.get(i + 1) else {
                i += 1;
                continue;
            };
            if is_option(arg, PIXEL_FORMAT_OPTS) {
                match deprecated_replacement(value) {
                    Some(new) => {
                        notes.push(format!(
                            "replaced deprecated pixel format {} with {}",
                            value, new
                        ));
                        out.push(new.to_string());
                        replaced = true;
                        range_at.get_or_insert(out.len());
                    }
                    None => out.push(value.clone()),
                }
                i += 2;
            } else if is_option(arg, FILTER_OPTS) {
                let before = notes.len();
                let graph = replace_deprecated_in_filter(value, &mut notes);
                replaced |= notes.len() > before;
                out.push(self.add_scale_range(&graph, &mut notes));
                i += 2;
            } else {
                i += 1;
            }
        }

        if replaced && !has_color_range(&out) {
            let at = range_at
                .or_else(|| output_index(&out))
                .unwrap_or(out.len());
            out.insert(at, self.config.color_range.clone());
            out.insert(at, "-color_range".to_string());
            notes.push(format!("added -color_range {}", self.config.color_range));
        }

        if let Some(idx) = output_index(&out) {
            if self.needs_single_frame_limit(&out[idx]) && !has_single_frame_limit(&out) {
                match frame_limit_value(&out) {
                    Some(v) if v < idx => {
                        notes.push(format!("changed frame limit {} to 1", out[v]));
                        out[v] = FRAME_LIMIT[1].to_string();
                    }
                    _ => {
                        out.insert(idx, FRAME_LIMIT[1].to_string());
                        out.insert(idx, FRAME_LIMIT[0].to_string());
                        notes.push("added single-frame limit -frames:v 1".to_string());
                    }
                }
            }
        }

        (out, notes)
    }

    fn add_scale_range(&self, graph: &str, notes: &mut Vec<String>) -> String {
        let parsed = FilterGraph::parse(graph);
        if !parsed.has_scale() || parsed.has_range() {
            return graph.to_string();
        }
        let parts: Vec<String> = parsed
            .parts
            .iter()
            .map(|segment| {
                let (lead, body, trail) = filter_body(segment);
                if !is_scale(body) {
                    return segment.to_string();
                }
                let body = match body.split_once('=') {
                    Some((name, opts)) if !opts.is_empty() => {
                        format!("{}={}:{}", name, opts, self.config.range_options)
                    }
                    _ => format!("scale={}", self.config.range_options),
                };
                format!("{}{}{}", lead, body, trail)
            })
            .collect();
        notes.push("added explicit range to scale filter".to_string());
        FilterGraph::join(&parts, &parsed.separators)
    }

    /// Governs a converter invocation: `base_args` are everything before the
    /// output path, which is appended here (once).
    pub fn validate_and_fix_args(
        &self,
        intended_output_path: &str,
        output_format: &str,
        base_args: &[String],
    ) -> FixedArgs {
        let mut args = base_args.to_vec();
        if args.last().map(String::as_str) == Some(intended_output_path) {
            args.pop();
        }

        let mut applied = Vec::new();
        let has_pix_fmt = args
            .iter()
            .any(|a| is_option(a, PIXEL_FORMAT_OPTS));
        let filter_idx = args
            .iter()
            .position(|a| is_option(a, &FILTER_OPTS[..2]))
            .filter(|i| *i + 1 < args.len());
        let existing_filter = filter_idx.map(|i| args[i + 1].clone());
        let decision = self.decide(intended_output_path, output_format, existing_filter.as_deref());

        if !has_pix_fmt && !decision.pixel_format_args.is_empty() {
            let rest = match decision.pixel_format_args.as_slice() {
                [flag, chain, rest @ ..] if flag == "-vf" => {
                    match filter_idx {
                        Some(i) => args[i + 1] = chain.clone(),
                        None => args.extend([flag.clone(), chain.clone()]),
                    }
                    rest
                }
                all => all,
            };
            args.extend(rest.iter().cloned());
            applied.push(format!(
                "pixel format for {}: {}",
                output_format,
                decision.pixel_format_args.join(" ")
            ));
        }
        args.push(intended_output_path.to_string());

        let (args, notes) = self.fix_args_with_notes(&args);
        applied.extend(notes);
        let report = self.validate_args(&args);
        if !report.warnings.is_empty() {
            log::debug!("Governance: {} warnings after fix", report.warnings.len());
        }
        FixedArgs {
            args,
            applied,
            report,
        }
    }
}

impl Default for ArgGovernor {
    fn default() -> Self {
        Self::new(GovernanceConfig::default())
    }
}

#[cfg(test)]
#[path = "governance_test.rs"]
mod governance_test;
