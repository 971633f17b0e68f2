//! Finds `### record <type>` headings in a script body and extracts the
//! block that belongs to each one.

use crate::errors::PrimingError;
use crate::record::RecordType;

const HEADING_PREFIX: &str = "###";
const HEADING_KEYWORD: &str = "record";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlock {
    pub record_type: RecordType,
    /// 1-based line of the heading within the scanned body.
    pub line: usize,
    /// Info string of the opening fence, `None` for implicit blocks.
    pub fence_info: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Fence {
    marker: String,
    info: String,
}

pub fn scan_blocks(body: &str) -> Result<Vec<RawBlock>, PrimingError> {
    let lines: Vec<&str> = body.split('\n').collect();
    let mut blocks = Vec::new();
    let mut idx = 0;

    while idx < lines.len() {
        let Some(record_type) = parse_heading(lines[idx], idx + 1)? else {
            idx += 1;
            continue;
        };
        let heading_line = idx + 1;
        idx += 1;

        let mut first = idx;
        while first < lines.len() && lines[first].trim().is_empty() {
            first += 1;
        }

        if let Some(fence) = lines.get(first).and_then(|line| parse_fence_open(line)) {
            let start = first + 1;
            let mut end = start;
            while end < lines.len() && lines[end].trim() != fence.marker {
                end += 1;
            }
            if end >= lines.len() {
                return Err(PrimingError::Parse(format!(
                    "record({record_type}) at line {heading_line}: unterminated {} fence",
                    fence.marker
                )));
            }
            blocks.push(RawBlock {
                record_type,
                line: heading_line,
                fence_info: Some(fence.info),
                text: lines[start..end].join("\n"),
            });
            // Prose after the closing fence is skipped like text before the first heading.
            idx = end + 1;
        } else {
            let start = idx;
            let mut end = idx;
            while end < lines.len() && parse_heading(lines[end], end + 1)?.is_none() {
                end += 1;
            }
            blocks.push(RawBlock {
                record_type,
                line: heading_line,
                fence_info: None,
                text: trim_blank_lines(&lines[start..end]),
            });
            idx = end;
        }
    }

    if blocks.is_empty() {
        return Err(PrimingError::Parse(
            "script must contain at least one record block".to_string(),
        ));
    }
    Ok(blocks)
}

/// `Ok(None)` for ordinary lines; an error for a record heading naming a
/// type outside the allow-list.
fn parse_heading(line: &str, line_no: usize) -> Result<Option<RecordType>, PrimingError> {
    let trimmed = line.trim();
    let Some(rest) = trimmed.strip_prefix(HEADING_PREFIX) else {
        return Ok(None);
    };
    if !rest.starts_with(char::is_whitespace) {
        return Ok(None);
    }
    let mut words = rest.split_whitespace();
    match words.next() {
        Some(word) if word.eq_ignore_ascii_case(HEADING_KEYWORD) => {}
        _ => return Ok(None),
    }
    let token = words.next().unwrap_or_default();
    if words.next().is_some() {
        return Err(PrimingError::Parse(format!(
            "line {line_no}: record heading must name exactly one type: {trimmed}"
        )));
    }
    RecordType::parse(token).map(Some).ok_or_else(|| {
        PrimingError::Parse(format!("line {line_no}: unknown record type `{token}`"))
    })
}

fn parse_fence_open(line: &str) -> Option<Fence> {
    let trimmed = line.trim_start();
    let fence_char = trimmed.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let count = trimmed.chars().take_while(|c| *c == fence_char).count();
    if count < 3 {
        return None;
    }
    let marker = fence_char.to_string().repeat(count);
    let info = trimmed[marker.len()..].trim().to_string();
    Some(Fence { marker, info })
}

fn trim_blank_lines(lines: &[&str]) -> String {
    let start = lines
        .iter()
        .position(|line| !line.trim().is_empty())
        .unwrap_or(lines.len());
    let end = lines
        .iter()
        .rposition(|line| !line.trim().is_empty())
        .map_or(start, |pos| pos + 1);
    lines[start..end].join("\n")
}

/// Shortest backtick fence that no line of `text` can close early.
pub fn fence_for(text: &str) -> String {
    let longest = text
        .split('\n')
        .map(|line| line.trim_start().chars().take_while(|c| *c == '`').count())
        .max()
        .unwrap_or(0);
    "`".repeat(longest.max(2) + 1)
}
