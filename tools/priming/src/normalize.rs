//! Turns a scanned block into one validated [`ReplayRecord`].
//!
//! `func_call_record` blocks hold a compact JSON object. Every other type
//! holds frontmatter metadata followed by body text, and the body becomes
//! the type's canonical text field. Validation failures name the record type
//! and field, e.g. `record(human_text_record).msgId is required`.

use crate::errors::PrimingError;
use crate::frontmatter::{json_kind, split_frontmatter};
use crate::record::*;
use crate::scanner::RawBlock;
use serde_json::{Map, Value};

pub fn normalize_block(block: &RawBlock) -> Result<ReplayRecord, PrimingError> {
    let body = match block.record_type {
        RecordType::FuncCall => normalize_func_call(&block.text)?,
        record_type => {
            let split = split_frontmatter(&block.text).map_err(|e| match e {
                PrimingError::Parse(message) => {
                    PrimingError::Parse(format!("record({record_type}): {message}"))
                }
                other => other,
            })?;
            normalize_fields(record_type, &split.meta, split.body)?
        }
    };
    Ok(ReplayRecord::parsed(body))
}

fn normalize_func_call(text: &str) -> Result<RecordBody, PrimingError> {
    let value: Value = serde_json::from_str(text.trim()).map_err(|e| {
        PrimingError::Parse(format!("record(func_call_record) block is not valid JSON: {e}"))
    })?;
    let Value::Object(map) = value else {
        return Err(PrimingError::Validation(format!(
            "record(func_call_record) block must be a JSON object, got {}",
            json_kind(&value)
        )));
    };
    let fields = Fields::new(RecordType::FuncCall, &map);
    fields.check_type_tag()?;
    Ok(RecordBody::FuncCall(FuncCallRecord {
        genseq: fields.genseq("genseq")?,
        id: fields.non_empty_string("id")?,
        name: fields.non_empty_string("name")?,
        arguments: fields.object("arguments")?,
    }))
}

/// Builds a text-style record from its metadata map and body text.
pub fn normalize_fields(
    record_type: RecordType,
    meta: &Map<String, Value>,
    body: String,
) -> Result<RecordBody, PrimingError> {
    let fields = Fields::new(record_type, meta);
    fields.check_type_tag()?;
    match record_type.canonical_field() {
        Some(canonical) => {
            if meta.contains_key(canonical) {
                return Err(fields.error(canonical, "must be given as block body text"));
            }
        }
        None => {
            if !body.trim().is_empty() {
                return Err(PrimingError::Validation(format!(
                    "record({record_type}) does not accept body text"
                )));
            }
        }
    }

    let record = match record_type {
        RecordType::AgentThought => RecordBody::AgentThought(AgentThoughtRecord {
            genseq: fields.genseq("genseq")?,
            content: body,
            reasoning: fields.optional_value("reasoning"),
            provider_data: fields.optional_value("providerData"),
        }),
        RecordType::AgentWords => RecordBody::AgentWords(AgentWordsRecord {
            genseq: fields.genseq("genseq")?,
            content: body,
        }),
        RecordType::UiOnlyMarkdown => RecordBody::UiOnlyMarkdown(UiOnlyMarkdownRecord {
            genseq: fields.genseq("genseq")?,
            content: body,
        }),
        RecordType::HumanText => RecordBody::HumanText(HumanTextRecord {
            genseq: fields.genseq("genseq")?,
            msg_id: fields.non_empty_string("msgId")?,
            content: body,
            grammar: fields.grammar("grammar")?,
            user_language_code: fields.optional_string("userLanguageCode")?,
        }),
        RecordType::FuncResult => RecordBody::FuncResult(FuncResultRecord {
            genseq: fields.genseq("genseq")?,
            id: fields.non_empty_string("id")?,
            name: fields.non_empty_string("name")?,
            content: body,
            content_items: fields.optional_array("contentItems")?,
        }),
        RecordType::QuestForSup => RecordBody::QuestForSup(QuestForSupRecord {
            genseq: fields.genseq("genseq")?,
            mention_list: fields.mention_list("mentionList", "")?,
            tellask_content: body,
            sub_dialog_id: fields.non_empty_string("subDialogId")?,
        }),
        RecordType::TeammateCallResult => RecordBody::TeammateCallResult(TeammateCallResultRecord {
            calling_genseq: fields.optional_genseq("calling_genseq")?,
            call_id: fields.non_empty_string("callId")?,
            status: fields.non_empty_string("status")?,
            call_name: fields.non_empty_string("callName")?,
            responder_id: fields.optional_string("responderId")?,
            result: body,
        }),
        RecordType::TeammateResponse => normalize_teammate_response(&fields, body)?,
        RecordType::FuncCall => {
            return Err(PrimingError::Validation(
                "record(func_call_record) must be encoded as a JSON object".to_string(),
            ))
        }
        RecordType::WebSearchCall => RecordBody::WebSearchCall(WebSearchCallRecord {
            genseq: fields.genseq("genseq")?,
            phase: fields.web_search_phase("phase")?,
            item_id: fields.optional_string("itemId")?,
            action: fields.optional_value("action"),
        }),
        RecordType::TeammateCallAnchor => RecordBody::TeammateCallAnchor(TeammateCallAnchorRecord {
            genseq: fields.genseq("genseq")?,
            anchor_role: fields.anchor_role("anchorRole")?,
            call_id: fields.non_empty_string("callId")?,
        }),
        RecordType::GenStart => RecordBody::GenStart(GenStartRecord {
            genseq: fields.genseq("genseq")?,
        }),
        RecordType::GenFinish => RecordBody::GenFinish(GenFinishRecord {
            genseq: fields.genseq("genseq")?,
            context_health: fields.optional_value("contextHealth"),
            llm_gen_model: fields.optional_string("llmGenModel")?,
        }),
    };
    Ok(record)
}

fn normalize_teammate_response(fields: &Fields<'_>, body: String) -> Result<RecordBody, PrimingError> {
    let call_name = fields.call_name("callName")?;
    let (mention_list, session_slug) = match call_name {
        TeammateCallName::Tellask => (
            Some(fields.mention_list("mentionList", " for tellask teammate response")?),
            Some(fields.session_slug(" for tellask teammate response")?),
        ),
        TeammateCallName::TellaskSessionless => {
            fields.forbid("sessionSlug", call_name)?;
            (
                Some(fields.mention_list(
                    "mentionList",
                    " for tellaskSessionless teammate response",
                )?),
                None,
            )
        }
        TeammateCallName::TellaskBack | TeammateCallName::FreshBootsReasoning => {
            fields.forbid("mentionList", call_name)?;
            fields.forbid("sessionSlug", call_name)?;
            (None, None)
        }
    };
    Ok(RecordBody::TeammateResponse(TeammateResponseRecord {
        calling_genseq: fields.optional_genseq("calling_genseq")?,
        call_id: fields.non_empty_string("callId")?,
        call_name,
        responder_id: fields.non_empty_string("responderId")?,
        mention_list,
        session_slug,
        response: body,
    }))
}

struct Fields<'a> {
    record_type: RecordType,
    map: &'a Map<String, Value>,
}

impl<'a> Fields<'a> {
    fn new(record_type: RecordType, map: &'a Map<String, Value>) -> Self {
        Self { record_type, map }
    }

    fn error(&self, field: &str, message: &str) -> PrimingError {
        PrimingError::Validation(format!("record({}).{field} {message}", self.record_type))
    }

    /// Explicit nulls count as absent.
    fn get(&self, key: &str) -> Option<&'a Value> {
        self.map.get(key).filter(|value| !value.is_null())
    }

    fn check_type_tag(&self) -> Result<(), PrimingError> {
        match self.get("type") {
            None => Ok(()),
            Some(Value::String(tag)) if tag == self.record_type.as_str() => Ok(()),
            Some(_) => Err(self.error(
                "type",
                &format!("must equal {} when present", self.record_type),
            )),
        }
    }

    fn genseq(&self, key: &str) -> Result<u64, PrimingError> {
        self.optional_genseq(key)?
            .ok_or_else(|| self.error(key, "is required"))
    }

    fn optional_genseq(&self, key: &str) -> Result<Option<u64>, PrimingError> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => value
                .as_u64()
                .map(Some)
                .ok_or_else(|| self.error(key, "must be a non-negative integer")),
        }
    }

    fn non_empty_string(&self, key: &str) -> Result<String, PrimingError> {
        match self.optional_string(key)? {
            Some(value) if !value.trim().is_empty() => Ok(value),
            Some(_) => Err(self.error(key, "must not be empty")),
            None => Err(self.error(key, "is required")),
        }
    }

    fn optional_string(&self, key: &str) -> Result<Option<String>, PrimingError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(value)) => Ok(Some(value.clone())),
            Some(_) => Err(self.error(key, "must be a string")),
        }
    }

    fn optional_value(&self, key: &str) -> Option<Value> {
        self.get(key).cloned()
    }

    fn optional_array(&self, key: &str) -> Result<Option<Vec<Value>>, PrimingError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Array(items)) => Ok(Some(items.clone())),
            Some(_) => Err(self.error(key, "must be an array")),
        }
    }

    fn object(&self, key: &str) -> Result<Map<String, Value>, PrimingError> {
        match self.get(key) {
            None => Err(self.error(key, "is required")),
            Some(Value::Object(map)) => Ok(map.clone()),
            Some(_) => Err(self.error(key, "must be an object")),
        }
    }

    /// Required non-empty list of strings; `context` qualifies the
    /// "is required" message.
    fn mention_list(&self, key: &str, context: &str) -> Result<Vec<String>, PrimingError> {
        let Some(value) = self.get(key) else {
            return Err(self.error(key, &format!("is required{context}")));
        };
        let Value::Array(items) = value else {
            return Err(self.error(key, "must be an array of strings"));
        };
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Value::String(s) if !s.trim().is_empty() => out.push(s.clone()),
                _ => return Err(self.error(key, "must be an array of non-empty strings")),
            }
        }
        if out.is_empty() {
            return Err(self.error(key, &format!("is required{context}")));
        }
        Ok(out)
    }

    fn session_slug(&self, context: &str) -> Result<String, PrimingError> {
        match self.optional_string("sessionSlug")? {
            Some(slug) if !slug.trim().is_empty() => Ok(slug),
            _ => Err(self.error("sessionSlug", &format!("is required{context}"))),
        }
    }

    fn forbid(&self, key: &str, call_name: TeammateCallName) -> Result<(), PrimingError> {
        if self.get(key).is_some() {
            return Err(self.error(
                key,
                &format!(
                    "is not allowed for {} teammate response",
                    call_name.as_str()
                ),
            ));
        }
        Ok(())
    }

    fn grammar(&self, key: &str) -> Result<TextGrammar, PrimingError> {
        match self.get(key) {
            None => Err(self.error(key, "is required")),
            Some(Value::String(value)) if value == "markdown" => Ok(TextGrammar::Markdown),
            Some(_) => Err(self.error(key, "must be \"markdown\"")),
        }
    }

    fn call_name(&self, key: &str) -> Result<TeammateCallName, PrimingError> {
        let value = self.non_empty_string(key)?;
        TeammateCallName::parse(&value).ok_or_else(|| {
            self.error(
                key,
                "must be one of: tellask, tellaskSessionless, tellaskBack, freshBootsReasoning",
            )
        })
    }

    fn web_search_phase(&self, key: &str) -> Result<WebSearchPhase, PrimingError> {
        match self.non_empty_string(key)?.as_str() {
            "added" => Ok(WebSearchPhase::Added),
            "done" => Ok(WebSearchPhase::Done),
            _ => Err(self.error(key, "must be one of: added, done")),
        }
    }

    fn anchor_role(&self, key: &str) -> Result<AnchorRole, PrimingError> {
        match self.non_empty_string(key)?.as_str() {
            "assignment" => Ok(AnchorRole::Assignment),
            "response" => Ok(AnchorRole::Response),
            _ => Err(self.error(key, "must be one of: assignment, response")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::normalize_block;
    use crate::record::*;
    use crate::scanner::RawBlock;

    fn block(record_type: RecordType, text: &str) -> RawBlock {
        RawBlock {
            record_type,
            line: 1,
            fence_info: None,
            text: text.to_string(),
        }
    }

    fn validation_message(record_type: RecordType, text: &str) -> String {
        normalize_block(&block(record_type, text))
            .expect_err("must fail")
            .to_string()
    }

    #[test]
    fn human_text_record_takes_body_as_content() {
        let record = normalize_block(&block(
            RecordType::HumanText,
            "---\ngenseq: 1\nmsgId: m1\ngrammar: markdown\n---\nHello",
        ))
        .expect("normalize");
        assert_eq!(record.ts, "");
        assert_eq!(
            record.body,
            RecordBody::HumanText(HumanTextRecord {
                genseq: 1,
                msg_id: "m1".to_string(),
                content: "Hello".to_string(),
                grammar: TextGrammar::Markdown,
                user_language_code: None,
            })
        );
    }

    #[test]
    fn human_text_record_requires_markdown_grammar() {
        let message = validation_message(
            RecordType::HumanText,
            "---\ngenseq: 1\nmsgId: m1\ngrammar: plain\n---\nHello",
        );
        assert!(message.contains("record(human_text_record).grammar must be \"markdown\""));
    }

    #[test]
    fn missing_and_mistyped_fields_are_field_qualified() {
        assert!(validation_message(RecordType::AgentWords, "---\n---\nhi")
            .contains("record(agent_words_record).genseq is required"));
        assert!(validation_message(RecordType::AgentWords, "---\ngenseq: -2\n---\nhi")
            .contains("record(agent_words_record).genseq must be a non-negative integer"));
        assert!(validation_message(
            RecordType::QuestForSup,
            "---\ngenseq: 2\nsubDialogId: sub-1\n---\nask"
        )
        .contains("record(quest_for_sup_record).mentionList is required"));
    }

    #[test]
    fn func_call_record_parses_compact_json() {
        let record = normalize_block(&block(
            RecordType::FuncCall,
            r#"{"type":"func_call_record","genseq":4,"id":"c1","name":"read_file","arguments":{"path":"a.md"}}"#,
        ))
        .expect("normalize");
        let RecordBody::FuncCall(call) = record.body else {
            panic!("expected func call");
        };
        assert_eq!(call.genseq, 4);
        assert_eq!(call.arguments["path"], "a.md");
    }

    #[test]
    fn func_call_record_rejects_mismatched_type_and_non_object_arguments() {
        assert!(validation_message(
            RecordType::FuncCall,
            r#"{"type":"gen_start_record","genseq":4,"id":"c1","name":"f","arguments":{}}"#
        )
        .contains("record(func_call_record).type must equal func_call_record"));
        assert!(validation_message(
            RecordType::FuncCall,
            r#"{"genseq":4,"id":"c1","name":"f","arguments":"x"}"#
        )
        .contains("record(func_call_record).arguments must be an object"));
        assert!(validation_message(RecordType::FuncCall, "not json").contains("not valid JSON"));
    }

    #[test]
    fn fieldless_types_reject_body_text() {
        assert!(validation_message(RecordType::GenStart, "---\ngenseq: 1\n---\nstray")
            .contains("record(gen_start_record) does not accept body text"));
    }

    #[test]
    fn web_search_phase_and_anchor_role_are_closed_sets() {
        assert!(validation_message(
            RecordType::WebSearchCall,
            "---\ngenseq: 1\nphase: started\n---\n"
        )
        .contains("record(web_search_call_record).phase must be one of: added, done"));
        assert!(validation_message(
            RecordType::TeammateCallAnchor,
            "---\ngenseq: 1\ncallId: c1\n---\n"
        )
        .contains("record(teammate_call_anchor_record).anchorRole is required"));
    }

    #[test]
    fn tellask_response_requires_mentions_and_session_slug() {
        assert!(validation_message(
            RecordType::TeammateResponse,
            "---\ncallId: c1\ncallName: tellask\nresponderId: bob\nsessionSlug: s1\n---\nok"
        )
        .contains(
            "record(teammate_response_record).mentionList is required for tellask teammate response"
        ));
        assert!(validation_message(
            RecordType::TeammateResponse,
            "---\ncallId: c1\ncallName: tellask\nresponderId: bob\nmentionList: ['@bob']\n---\nok"
        )
        .contains(
            "record(teammate_response_record).sessionSlug is required for tellask teammate response"
        ));
    }

    #[test]
    fn sessionless_and_back_responses_forbid_fields() {
        assert!(validation_message(
            RecordType::TeammateResponse,
            "---\ncallId: c1\ncallName: tellaskSessionless\nresponderId: bob\nmentionList: ['@bob']\nsessionSlug: s1\n---\nok"
        )
        .contains("sessionSlug is not allowed for tellaskSessionless teammate response"));
        assert!(validation_message(
            RecordType::TeammateResponse,
            "---\ncallId: c1\ncallName: tellaskBack\nresponderId: bob\nmentionList: ['@bob']\n---\nok"
        )
        .contains("mentionList is not allowed for tellaskBack teammate response"));
        assert!(validation_message(
            RecordType::TeammateResponse,
            "---\ncallId: c1\ncallName: freshBootsReasoning\nresponderId: bob\nsessionSlug: s\n---\nok"
        )
        .contains("sessionSlug is not allowed for freshBootsReasoning teammate response"));
    }

    #[test]
    fn valid_tellask_response_keeps_calling_genseq() {
        let record = normalize_block(&block(
            RecordType::TeammateResponse,
            "---\ncalling_genseq: 7\ncallId: c1\ncallName: tellask\nresponderId: bob\nmentionList: ['@bob']\nsessionSlug: review\n---\nLooks good",
        ))
        .expect("normalize");
        let RecordBody::TeammateResponse(response) = record.body else {
            panic!("expected teammate response");
        };
        assert_eq!(response.calling_genseq, Some(7));
        assert_eq!(response.session_slug.as_deref(), Some("review"));
        assert_eq!(response.response, "Looks good");
    }

    #[test]
    fn canonical_field_in_metadata_is_rejected() {
        assert!(validation_message(
            RecordType::TeammateCallResult,
            "---\ncallId: c1\nstatus: completed\ncallName: tellask\nresult: inline\n---\n"
        )
        .contains("record(teammate_call_result_record).result must be given as block body text"));
    }
}
