use priming::document::{parse_script_document, ScriptDocument};
use priming::record::*;
use priming::serialize::{serialize_document, serialize_record};
use serde_json::{json, Map};

fn every_record_type() -> Vec<ReplayRecord> {
    let mut arguments = Map::new();
    arguments.insert("path".to_string(), json!("notes/todo.md"));
    arguments.insert("lines".to_string(), json!([1, 2, 3]));

    let bodies = vec![
        RecordBody::GenStart(GenStartRecord { genseq: 1 }),
        RecordBody::HumanText(HumanTextRecord {
            genseq: 1,
            msg_id: "m-001".to_string(),
            content: "Please review:\n\n```rust\nfn main() {}\n```\n".to_string(),
            grammar: TextGrammar::Markdown,
            user_language_code: Some("en".to_string()),
        }),
        RecordBody::AgentThought(AgentThoughtRecord {
            genseq: 2,
            content: "Reading the file first.".to_string(),
            reasoning: Some(json!({"summary": ["step one", "step two"]})),
            provider_data: Some(json!({"id": "rs_1", "encrypted": false})),
        }),
        RecordBody::FuncCall(FuncCallRecord {
            genseq: 2,
            id: "call-1".to_string(),
            name: "read_file".to_string(),
            arguments,
        }),
        RecordBody::FuncResult(FuncResultRecord {
            genseq: 2,
            id: "call-1".to_string(),
            name: "read_file".to_string(),
            content: "---\nnot frontmatter\n---".to_string(),
            content_items: Some(vec![json!({"type": "text", "text": "ok"})]),
        }),
        RecordBody::WebSearchCall(WebSearchCallRecord {
            genseq: 3,
            phase: WebSearchPhase::Done,
            item_id: Some("ws_9".to_string()),
            action: Some(json!({"query": "rust yaml"})),
        }),
        RecordBody::QuestForSup(QuestForSupRecord {
            genseq: 3,
            mention_list: vec!["@sup".to_string()],
            tellask_content: "Is this in scope?".to_string(),
            sub_dialog_id: "sub-1".to_string(),
        }),
        RecordBody::TeammateCallAnchor(TeammateCallAnchorRecord {
            genseq: 4,
            anchor_role: AnchorRole::Assignment,
            call_id: "tc-1".to_string(),
        }),
        RecordBody::TeammateCallResult(TeammateCallResultRecord {
            calling_genseq: Some(4),
            call_id: "tc-1".to_string(),
            status: "completed".to_string(),
            call_name: "tellask".to_string(),
            responder_id: Some("bob".to_string()),
            result: "Yes".to_string(),
        }),
        RecordBody::TeammateResponse(TeammateResponseRecord {
            calling_genseq: Some(4),
            call_id: "tc-1".to_string(),
            call_name: TeammateCallName::Tellask,
            responder_id: "bob".to_string(),
            mention_list: Some(vec!["@bob".to_string()]),
            session_slug: Some("review".to_string()),
            response: "123".to_string(),
        }),
        RecordBody::TeammateResponse(TeammateResponseRecord {
            calling_genseq: None,
            call_id: "tc-2".to_string(),
            call_name: TeammateCallName::FreshBootsReasoning,
            responder_id: "carol".to_string(),
            mention_list: None,
            session_slug: None,
            response: String::new(),
        }),
        RecordBody::AgentWords(AgentWordsRecord {
            genseq: 5,
            content: "  leading spaces and a trailing newline\n".to_string(),
        }),
        RecordBody::UiOnlyMarkdown(UiOnlyMarkdownRecord {
            genseq: 5,
            content: "### not a record heading".to_string(),
        }),
        RecordBody::GenFinish(GenFinishRecord {
            genseq: 5,
            context_health: Some(json!({"usedTokens": 1200, "ratio": 0.25})),
            llm_gen_model: Some("yes".to_string()),
        }),
    ];
    bodies.into_iter().map(ReplayRecord::parsed).collect()
}

#[test]
fn every_record_type_survives_serialize_then_parse() {
    let records = every_record_type();
    let covered: std::collections::BTreeSet<_> =
        records.iter().map(|record| record.record_type()).collect();
    assert_eq!(covered.len(), RecordType::ALL.len());

    let mut doc = ScriptDocument::new(records);
    doc.title = Some("Round trip".to_string());
    let text = serialize_document(&doc).expect("serialize");
    let parsed = parse_script_document(&text).expect("parse");
    assert_eq!(parsed.records, doc.records);
    assert_eq!(parsed, doc);
}

#[test]
fn timestamps_and_provenance_are_not_part_of_the_script() {
    let mut record = ReplayRecord::parsed(RecordBody::GenStart(GenStartRecord { genseq: 8 }));
    record.ts = "2026-10-17T08:00:00.000Z".to_string();
    record.source_tag = Some(PRIMING_SOURCE_TAG.to_string());
    let text = serialize_record(&record.body).expect("serialize");
    assert!(!text.contains("2026"));

    let parsed = parse_script_document(&text).expect("parse");
    assert_eq!(parsed.records[0].ts, "");
    assert_eq!(parsed.records[0].body, record.body);
}

#[test]
fn hand_written_scripts_tolerate_bom_crlf_and_implicit_blocks() {
    let raw = "\u{feff}---\r\ntitle: Demo\r\n---\r\n\r\n### Record HUMAN_TEXT_RECORD\r\n---\r\ngenseq: 1\r\nmsgId: m1\r\ngrammar: markdown\r\n---\r\nHello\r\n\r\n### record gen_start_record\r\n~~~\r\n---\r\ngenseq: 2\r\n---\r\n~~~\r\n";
    let doc = parse_script_document(raw).expect("parse");
    assert_eq!(doc.title.as_deref(), Some("Demo"));
    assert_eq!(doc.records.len(), 2);
    assert_eq!(doc.records[0].body.canonical_text(), Some("Hello"));
    assert_eq!(doc.records[1].body.sequence_number(), Some(2));
}

#[test]
fn malformed_scripts_report_the_offending_field() {
    let cases = [
        (
            "### record teammate_response_record\n---\ncallId: c1\ncallName: tellask\nresponderId: bob\nsessionSlug: s\n---\nok\n",
            "record(teammate_response_record).mentionList is required for tellask teammate response",
        ),
        ("### record chat_record\nhi\n", "unknown record type"),
        ("### record gen_start_record\n```\n---\ngenseq: 1\n---\n", "unterminated"),
        ("just prose\n", "script must contain at least one record block"),
        ("---\ntitle: [unclosed\n---\n### record gen_start_record\n---\ngenseq: 1\n---\n", "malformed frontmatter"),
    ];
    for (raw, needle) in cases {
        let err = parse_script_document(raw).expect_err(raw);
        assert!(err.to_string().contains(needle), "{err} should mention {needle}");
    }
}
