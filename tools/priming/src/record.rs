//! Typed replay records.
//!
//! A [`ReplayRecord`] is one prior dialog turn or lifecycle marker. The
//! payload is the closed union [`RecordBody`]; every consumer matches on it
//! exhaustively so adding a record type is a compile-time change everywhere
//! it matters.
//!
//! The serde representation is the persisted event shape: an object tagged
//! by `type` with camelCase keys (`genseq` and `calling_genseq` keep their
//! historical snake_case spelling).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Marker stamped into `sourceTag` of every record written by a replay.
pub const PRIMING_SOURCE_TAG: &str = "priming_script";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordType {
    AgentThought,
    AgentWords,
    UiOnlyMarkdown,
    HumanText,
    FuncResult,
    QuestForSup,
    TeammateCallResult,
    TeammateResponse,
    FuncCall,
    WebSearchCall,
    TeammateCallAnchor,
    GenStart,
    GenFinish,
}

impl RecordType {
    pub const ALL: [RecordType; 13] = [
        Self::AgentThought,
        Self::AgentWords,
        Self::UiOnlyMarkdown,
        Self::HumanText,
        Self::FuncResult,
        Self::QuestForSup,
        Self::TeammateCallResult,
        Self::TeammateResponse,
        Self::FuncCall,
        Self::WebSearchCall,
        Self::TeammateCallAnchor,
        Self::GenStart,
        Self::GenFinish,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AgentThought => "agent_thought_record",
            Self::AgentWords => "agent_words_record",
            Self::UiOnlyMarkdown => "ui_only_markdown_record",
            Self::HumanText => "human_text_record",
            Self::FuncResult => "func_result_record",
            Self::QuestForSup => "quest_for_sup_record",
            Self::TeammateCallResult => "teammate_call_result_record",
            Self::TeammateResponse => "teammate_response_record",
            Self::FuncCall => "func_call_record",
            Self::WebSearchCall => "web_search_call_record",
            Self::TeammateCallAnchor => "teammate_call_anchor_record",
            Self::GenStart => "gen_start_record",
            Self::GenFinish => "gen_finish_record",
        }
    }

    /// Case-insensitive lookup against the allow-list.
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(token))
    }

    /// The field whose value is carried as block body text.
    pub fn canonical_field(self) -> Option<&'static str> {
        match self {
            Self::AgentThought
            | Self::AgentWords
            | Self::UiOnlyMarkdown
            | Self::HumanText
            | Self::FuncResult => Some("content"),
            Self::QuestForSup => Some("tellaskContent"),
            Self::TeammateCallResult => Some("result"),
            Self::TeammateResponse => Some("response"),
            Self::FuncCall
            | Self::WebSearchCall
            | Self::TeammateCallAnchor
            | Self::GenStart
            | Self::GenFinish => None,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextGrammar {
    Markdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TeammateCallName {
    Tellask,
    TellaskSessionless,
    TellaskBack,
    FreshBootsReasoning,
}

impl TeammateCallName {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "tellask" => Some(Self::Tellask),
            "tellaskSessionless" => Some(Self::TellaskSessionless),
            "tellaskBack" => Some(Self::TellaskBack),
            "freshBootsReasoning" => Some(Self::FreshBootsReasoning),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tellask => "tellask",
            Self::TellaskSessionless => "tellaskSessionless",
            Self::TellaskBack => "tellaskBack",
            Self::FreshBootsReasoning => "freshBootsReasoning",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebSearchPhase {
    Added,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnchorRole {
    Assignment,
    Response,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentThoughtRecord {
    pub genseq: u64,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentWordsRecord {
    pub genseq: u64,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiOnlyMarkdownRecord {
    pub genseq: u64,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HumanTextRecord {
    pub genseq: u64,
    pub msg_id: String,
    pub content: String,
    pub grammar: TextGrammar,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_language_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FuncResultRecord {
    pub genseq: u64,
    pub id: String,
    pub name: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_items: Option<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestForSupRecord {
    pub genseq: u64,
    pub mention_list: Vec<String>,
    pub tellask_content: String,
    pub sub_dialog_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeammateCallResultRecord {
    #[serde(
        rename = "calling_genseq",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub calling_genseq: Option<u64>,
    pub call_id: String,
    pub status: String,
    pub call_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responder_id: Option<String>,
    pub result: String,
}

/// `mentionList`/`sessionSlug` presence depends on `callName`; the
/// normalizer enforces the combinations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeammateResponseRecord {
    #[serde(
        rename = "calling_genseq",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub calling_genseq: Option<u64>,
    pub call_id: String,
    pub call_name: TeammateCallName,
    pub responder_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mention_list: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_slug: Option<String>,
    pub response: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncCallRecord {
    pub genseq: u64,
    pub id: String,
    pub name: String,
    pub arguments: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSearchCallRecord {
    pub genseq: u64,
    pub phase: WebSearchPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeammateCallAnchorRecord {
    pub genseq: u64,
    pub anchor_role: AnchorRole,
    pub call_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenStartRecord {
    pub genseq: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenFinishRecord {
    pub genseq: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_health: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_gen_model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RecordBody {
    #[serde(rename = "agent_thought_record")]
    AgentThought(AgentThoughtRecord),
    #[serde(rename = "agent_words_record")]
    AgentWords(AgentWordsRecord),
    #[serde(rename = "ui_only_markdown_record")]
    UiOnlyMarkdown(UiOnlyMarkdownRecord),
    #[serde(rename = "human_text_record")]
    HumanText(HumanTextRecord),
    #[serde(rename = "func_result_record")]
    FuncResult(FuncResultRecord),
    #[serde(rename = "quest_for_sup_record")]
    QuestForSup(QuestForSupRecord),
    #[serde(rename = "teammate_call_result_record")]
    TeammateCallResult(TeammateCallResultRecord),
    #[serde(rename = "teammate_response_record")]
    TeammateResponse(TeammateResponseRecord),
    #[serde(rename = "func_call_record")]
    FuncCall(FuncCallRecord),
    #[serde(rename = "web_search_call_record")]
    WebSearchCall(WebSearchCallRecord),
    #[serde(rename = "teammate_call_anchor_record")]
    TeammateCallAnchor(TeammateCallAnchorRecord),
    #[serde(rename = "gen_start_record")]
    GenStart(GenStartRecord),
    #[serde(rename = "gen_finish_record")]
    GenFinish(GenFinishRecord),
}

impl RecordBody {
    pub fn record_type(&self) -> RecordType {
        match self {
            Self::AgentThought(_) => RecordType::AgentThought,
            Self::AgentWords(_) => RecordType::AgentWords,
            Self::UiOnlyMarkdown(_) => RecordType::UiOnlyMarkdown,
            Self::HumanText(_) => RecordType::HumanText,
            Self::FuncResult(_) => RecordType::FuncResult,
            Self::QuestForSup(_) => RecordType::QuestForSup,
            Self::TeammateCallResult(_) => RecordType::TeammateCallResult,
            Self::TeammateResponse(_) => RecordType::TeammateResponse,
            Self::FuncCall(_) => RecordType::FuncCall,
            Self::WebSearchCall(_) => RecordType::WebSearchCall,
            Self::TeammateCallAnchor(_) => RecordType::TeammateCallAnchor,
            Self::GenStart(_) => RecordType::GenStart,
            Self::GenFinish(_) => RecordType::GenFinish,
        }
    }

    /// Value of the type's canonical text field, if it has one.
    pub fn canonical_text(&self) -> Option<&str> {
        match self {
            Self::AgentThought(r) => Some(&r.content),
            Self::AgentWords(r) => Some(&r.content),
            Self::UiOnlyMarkdown(r) => Some(&r.content),
            Self::HumanText(r) => Some(&r.content),
            Self::FuncResult(r) => Some(&r.content),
            Self::QuestForSup(r) => Some(&r.tellask_content),
            Self::TeammateCallResult(r) => Some(&r.result),
            Self::TeammateResponse(r) => Some(&r.response),
            Self::FuncCall(_)
            | Self::WebSearchCall(_)
            | Self::TeammateCallAnchor(_)
            | Self::GenStart(_)
            | Self::GenFinish(_) => None,
        }
    }

    /// The record's sequence-number slot: its own `genseq`, or the
    /// `calling_genseq` back-reference for the two teammate reply types.
    pub fn sequence_number(&self) -> Option<u64> {
        match self {
            Self::AgentThought(r) => Some(r.genseq),
            Self::AgentWords(r) => Some(r.genseq),
            Self::UiOnlyMarkdown(r) => Some(r.genseq),
            Self::HumanText(r) => Some(r.genseq),
            Self::FuncResult(r) => Some(r.genseq),
            Self::QuestForSup(r) => Some(r.genseq),
            Self::TeammateCallResult(r) => r.calling_genseq,
            Self::TeammateResponse(r) => r.calling_genseq,
            Self::FuncCall(r) => Some(r.genseq),
            Self::WebSearchCall(r) => Some(r.genseq),
            Self::TeammateCallAnchor(r) => Some(r.genseq),
            Self::GenStart(r) => Some(r.genseq),
            Self::GenFinish(r) => Some(r.genseq),
        }
    }

    pub fn sequence_number_mut(&mut self) -> Option<&mut u64> {
        match self {
            Self::AgentThought(r) => Some(&mut r.genseq),
            Self::AgentWords(r) => Some(&mut r.genseq),
            Self::UiOnlyMarkdown(r) => Some(&mut r.genseq),
            Self::HumanText(r) => Some(&mut r.genseq),
            Self::FuncResult(r) => Some(&mut r.genseq),
            Self::QuestForSup(r) => Some(&mut r.genseq),
            Self::TeammateCallResult(r) => r.calling_genseq.as_mut(),
            Self::TeammateResponse(r) => r.calling_genseq.as_mut(),
            Self::FuncCall(r) => Some(&mut r.genseq),
            Self::WebSearchCall(r) => Some(&mut r.genseq),
            Self::TeammateCallAnchor(r) => Some(&mut r.genseq),
            Self::GenStart(r) => Some(&mut r.genseq),
            Self::GenFinish(r) => Some(&mut r.genseq),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayRecord {
    /// RFC 3339 timestamp, empty until the record is replayed.
    #[serde(default)]
    pub ts: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_tag: Option<String>,
    #[serde(flatten)]
    pub body: RecordBody,
}

impl ReplayRecord {
    /// A freshly parsed record: no timestamp, no provenance.
    pub fn parsed(body: RecordBody) -> Self {
        Self {
            ts: String::new(),
            source_tag: None,
            body,
        }
    }

    pub fn record_type(&self) -> RecordType {
        self.body.record_type()
    }
}
