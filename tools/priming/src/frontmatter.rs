//! Splits an optional `---` delimited YAML mapping off the top of a text.

use crate::errors::PrimingError;
use serde_json::{Map, Value};

pub const DELIMITER: &str = "---";

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frontmatter {
    pub meta: Map<String, Value>,
    pub body: String,
}

/// Strips a BOM and converts CRLF/CR line endings to LF.
pub fn normalize_text(raw: &str) -> String {
    let text = raw.strip_prefix('\u{feff}').unwrap_or(raw);
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Splits `raw` into its frontmatter mapping and body.
///
/// The closing delimiter is the first later line consisting solely of `---`.
/// The body starts on the line after it, or is empty when the delimiter ends
/// the text.
pub fn split_frontmatter(raw: &str) -> Result<Frontmatter, PrimingError> {
    let text = normalize_text(raw);
    let Some(rest) = opening_rest(&text) else {
        return Ok(Frontmatter {
            meta: Map::new(),
            body: text,
        });
    };

    let mut offset = 0;
    loop {
        let line_end = rest[offset..].find('\n').map(|i| offset + i);
        let line = match line_end {
            Some(end) => &rest[offset..end],
            None => &rest[offset..],
        };
        if line.trim_end() == DELIMITER {
            let yaml = &rest[..offset];
            let body = match line_end {
                Some(end) => rest[end + 1..].to_string(),
                None => String::new(),
            };
            return Ok(Frontmatter {
                meta: parse_mapping(yaml)?,
                body,
            });
        }
        match line_end {
            Some(end) => offset = end + 1,
            None => {
                return Err(PrimingError::Parse(
                    "frontmatter is missing its closing --- line".to_string(),
                ))
            }
        }
    }
}

fn opening_rest(text: &str) -> Option<&str> {
    let (first, rest) = match text.find('\n') {
        Some(end) => (&text[..end], &text[end + 1..]),
        None => (text, ""),
    };
    if first.trim_end() == DELIMITER {
        Some(rest)
    } else {
        None
    }
}

fn parse_mapping(yaml: &str) -> Result<Map<String, Value>, PrimingError> {
    if yaml.trim().is_empty() {
        return Ok(Map::new());
    }
    let value: Value = serde_yaml::from_str(yaml)
        .map_err(|e| PrimingError::Parse(format!("malformed frontmatter: {e}")))?;
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(PrimingError::Parse(format!(
            "frontmatter must be a key/value mapping, got {}",
            json_kind(&other)
        ))),
    }
}

/// Renders `meta` as a delimited frontmatter block ending in a newline.
pub fn render_frontmatter(meta: &Map<String, Value>) -> Result<String, PrimingError> {
    let mut out = String::new();
    out.push_str(DELIMITER);
    out.push('\n');
    if !meta.is_empty() {
        let yaml = serde_yaml::to_string(meta)
            .map_err(|e| PrimingError::Parse(format!("cannot render frontmatter: {e}")))?;
        out.push_str(&yaml);
        if !yaml.ends_with('\n') {
            out.push('\n');
        }
    }
    out.push_str(DELIMITER);
    out.push('\n');
    Ok(out)
}

pub fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::{render_frontmatter, split_frontmatter};
    use serde_json::json;

    #[test]
    fn text_without_frontmatter_is_all_body() {
        let fm = split_frontmatter("hello\n---\nworld").expect("split");
        assert!(fm.meta.is_empty());
        assert_eq!(fm.body, "hello\n---\nworld");
    }

    #[test]
    fn strips_bom_and_crlf_before_splitting() {
        let fm = split_frontmatter("\u{feff}---\r\ntitle: Demo\r\n---\r\nbody\r\n").expect("split");
        assert_eq!(fm.meta.get("title"), Some(&json!("Demo")));
        assert_eq!(fm.body, "body\n");
    }

    #[test]
    fn closing_delimiter_at_end_of_file_yields_empty_body() {
        let fm = split_frontmatter("---\ngenseq: 3\n---").expect("split");
        assert_eq!(fm.meta.get("genseq"), Some(&json!(3)));
        assert_eq!(fm.body, "");
    }

    #[test]
    fn empty_frontmatter_is_an_empty_mapping() {
        let fm = split_frontmatter("---\n---\nbody").expect("split");
        assert!(fm.meta.is_empty());
        assert_eq!(fm.body, "body");
    }

    #[test]
    fn malformed_mapping_is_fatal() {
        let err = split_frontmatter("---\ntitle: [unclosed\n---\nbody").expect_err("must fail");
        assert!(err.to_string().contains("malformed frontmatter"));

        let err = split_frontmatter("---\n- a\n- b\n---\n").expect_err("must fail");
        assert!(err.to_string().contains("key/value mapping"));
    }

    #[test]
    fn unterminated_frontmatter_is_fatal() {
        let err = split_frontmatter("---\ntitle: Demo\nbody").expect_err("must fail");
        assert!(err.to_string().contains("closing"));
    }

    #[test]
    fn rendered_frontmatter_splits_back() {
        let mut meta = serde_json::Map::new();
        meta.insert("msgId".to_string(), json!("m1"));
        meta.insert("mentionList".to_string(), json!(["@alice", "@bob"]));
        meta.insert("note".to_string(), json!("line one\nline two"));
        let text = format!("{}Body", render_frontmatter(&meta).expect("render"));
        let fm = split_frontmatter(&text).expect("split");
        assert_eq!(fm.meta, meta);
        assert_eq!(fm.body, "Body");
    }
}
