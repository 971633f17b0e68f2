//! Renders typed records back into script text.
//!
//! Output always uses fenced blocks so that `parse_script_document` reads
//! back exactly the records that were written (timestamps and provenance
//! are not part of the script format).

use crate::document::ScriptDocument;
use crate::errors::PrimingError;
use crate::frontmatter::render_frontmatter;
use crate::record::{RecordBody, RecordType};
use crate::scanner::fence_for;
use serde_json::Value;

pub fn serialize_record(body: &RecordBody) -> Result<String, PrimingError> {
    let record_type = body.record_type();
    let (info, block) = match record_type {
        RecordType::FuncCall => ("json", func_call_block(body)?),
        _ => ("markdown", text_block(body)?),
    };
    let fence = fence_for(&block);
    Ok(format!(
        "### record {record_type}\n\n{fence}{info}\n{block}\n{fence}\n"
    ))
}

fn func_call_block(body: &RecordBody) -> Result<String, PrimingError> {
    serde_json::to_string(body)
        .map_err(|e| PrimingError::Parse(format!("cannot encode func_call_record: {e}")))
}

fn text_block(body: &RecordBody) -> Result<String, PrimingError> {
    let record_type = body.record_type();
    let value = serde_json::to_value(body)
        .map_err(|e| PrimingError::Parse(format!("cannot encode {record_type}: {e}")))?;
    let Value::Object(mut meta) = value else {
        return Err(PrimingError::Parse(format!(
            "{record_type} did not encode to an object"
        )));
    };
    meta.remove("type");
    if let Some(field) = record_type.canonical_field() {
        meta.remove(field);
    }
    let mut block = render_frontmatter(&meta)?;
    if let Some(text) = body.canonical_text() {
        block.push_str(text);
    }
    Ok(block)
}

/// Renders document frontmatter followed by every record in order.
pub fn serialize_document(doc: &ScriptDocument) -> Result<String, PrimingError> {
    if doc.records.is_empty() {
        return Err(PrimingError::Validation(
            "script must contain at least one record".to_string(),
        ));
    }
    let mut out = render_frontmatter(&doc.header_map())?;
    for record in &doc.records {
        out.push('\n');
        out.push_str(&serialize_record(&record.body)?);
    }
    Ok(out)
}
