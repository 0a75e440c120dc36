//! Turns raw assistant text into a [`ToolDecision`].
//!
//! The assistant is asked to answer with a delimited block:
//!
//! ```text
//! [DECISION]
//! ACTION: list_files
//! INPUT: {"pattern": "*.R"}
//! REASONING: I need to see which scripts exist.
//! STATUS: continue
//! [/DECISION]
//! ```
//!
//! Parsing is a strict-then-lenient chain of [`DecisionStage`]s. The first
//! stage that recognises anything decides; when none does the reply is
//! [`ToolDecision::Unparseable`]. Stages hold no state, so the same text
//! always yields the same decision.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use steward_core::tool::ToolInput;

/// The pseudo-action that ends a task.
pub const FINAL_ANSWER_ACTION: &str = "final_answer";

pub const BLOCK_START: &str = "[DECISION]";
pub const BLOCK_END: &str = "[/DECISION]";

const LABELS: [&str; 4] = ["ACTION", "INPUT", "REASONING", "STATUS"];

/// Where a tool call was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    /// A well-formed `[DECISION]` block
    Block,
    /// A JSON object found by the lenient scan
    Inferred,
}

/// What the assistant wants to do next.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolDecision {
    ToolCall {
        action: String,
        input: ToolInput,
        reasoning: String,
        source: DecisionSource,
    },
    FinalAnswer {
        text: String,
    },
    Unparseable {
        raw: String,
        reason: String,
    },
}

impl ToolDecision {
    /// Short label for logs and events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ToolCall { .. } => "tool_call",
            Self::FinalAnswer { .. } => "final_answer",
            Self::Unparseable { .. } => "unparseable",
        }
    }
}

/// One step of the fallback chain.
///
/// `None` means "not recognised here, try the next stage".
pub trait DecisionStage: Send + Sync {
    fn name(&self) -> &'static str;
    fn parse(&self, text: &str) -> Option<ToolDecision>;
}

/// Runs the stages in order.
pub struct DecisionParser {
    stages: Vec<Box<dyn DecisionStage>>,
}

impl Default for DecisionParser {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DecisionParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.stages.iter().map(|s| s.name()).collect();
        f.debug_struct("DecisionParser").field("stages", &names).finish()
    }
}

impl DecisionParser {
    /// Delimited block first, then the JSON scan.
    pub fn new() -> Self {
        Self::with_stages(vec![Box::new(DelimitedBlockStage), Box::new(JsonScanStage)])
    }

    pub fn with_stages(stages: Vec<Box<dyn DecisionStage>>) -> Self {
        Self { stages }
    }

    pub fn parse(&self, text: &str) -> ToolDecision {
        for stage in &self.stages {
            if let Some(decision) = stage.parse(text) {
                tracing::trace!(stage = stage.name(), kind = decision.kind(), "Stage decided");
                return decision;
            }
        }
        ToolDecision::Unparseable {
            raw: text.to_string(),
            reason: format!("no {BLOCK_START} block or JSON tool call found in the reply"),
        }
    }
}

// ── Delimited block ─────────────────────────────────────────────────────

/// Strict stage: the first `[DECISION]…[/DECISION]` block.
#[derive(Debug, Default, Clone, Copy)]
pub struct DelimitedBlockStage;

#[derive(Debug, Default)]
struct BlockFields {
    action: Option<String>,
    input: Option<String>,
    reasoning: Option<String>,
    status: Option<String>,
}

impl DecisionStage for DelimitedBlockStage {
    fn name(&self) -> &'static str {
        "delimited_block"
    }

    fn parse(&self, text: &str) -> Option<ToolDecision> {
        // ASCII uppercasing keeps byte offsets intact.
        let upper = text.to_ascii_uppercase();
        let start = upper.find(BLOCK_START)?;
        let body_start = start + BLOCK_START.len();
        let (body_end, block_end) = match upper[body_start..].find(BLOCK_END) {
            Some(offset) => (body_start + offset, body_start + offset + BLOCK_END.len()),
            None => (text.len(), text.len()),
        };
        let body = &text[body_start..body_end];
        let fields = parse_fields(body);

        let status = fields
            .status
            .as_deref()
            .map(|s| s.trim().to_ascii_lowercase())
            .unwrap_or_default();
        let action = fields.action.as_deref().map(str::trim).unwrap_or_default();
        let reasoning = fields.reasoning.as_deref().map(str::trim).unwrap_or_default();

        if status == "done" || action.eq_ignore_ascii_case(FINAL_ANSWER_ACTION) {
            let outside = outside_text(text, start, block_end);
            let answer = if !outside.is_empty() {
                outside
            } else if !reasoning.is_empty() {
                reasoning.to_string()
            } else {
                body.trim().to_string()
            };
            return Some(ToolDecision::FinalAnswer { text: answer });
        }

        if action.is_empty() {
            return Some(ToolDecision::Unparseable {
                raw: text.to_string(),
                reason: "the decision block has no ACTION".into(),
            });
        }

        let input = match parse_input(fields.input.as_deref().unwrap_or_default()) {
            Ok(input) => input,
            Err(reason) => {
                return Some(ToolDecision::Unparseable {
                    raw: text.to_string(),
                    reason,
                });
            }
        };

        Some(ToolDecision::ToolCall {
            action: action.to_string(),
            input,
            reasoning: reasoning.to_string(),
            source: DecisionSource::Block,
        })
    }
}

/// Split a block body into labelled fields. A label's value runs until the
/// next label line; text before the first label is ignored.
fn parse_fields(body: &str) -> BlockFields {
    let mut fields = BlockFields::default();
    let mut current: Option<(&'static str, String)> = None;

    for line in body.lines() {
        if let Some((label, rest)) = split_label(line) {
            if let Some((done, value)) = current.take() {
                store(&mut fields, done, value);
            }
            current = Some((label, rest.to_string()));
        } else if let Some((_, value)) = current.as_mut() {
            value.push('\n');
            value.push_str(line);
        }
    }
    if let Some((label, value)) = current {
        store(&mut fields, label, value);
    }
    fields
}

fn split_label(line: &str) -> Option<(&'static str, &str)> {
    let trimmed = line.trim_start();
    let (head, rest) = trimmed.split_once(':')?;
    let head = head.trim();
    LABELS
        .iter()
        .find(|label| head.eq_ignore_ascii_case(label))
        .map(|label| (*label, rest))
}

fn store(fields: &mut BlockFields, label: &str, value: String) {
    let slot = match label {
        "ACTION" => &mut fields.action,
        "INPUT" => &mut fields.input,
        "REASONING" => &mut fields.reasoning,
        _ => &mut fields.status,
    };
    // First occurrence wins.
    if slot.is_none() {
        *slot = Some(value);
    }
}

/// Parse INPUT: empty means `{}`, a ```json fence is allowed, anything else
/// must be a JSON object.
fn parse_input(raw: &str) -> Result<ToolInput, String> {
    let trimmed = strip_fence(raw.trim());
    if trimmed.is_empty() {
        return Ok(ToolInput::new());
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(format!(
            "INPUT must be a JSON object, got {}",
            json_type_name(&other)
        )),
        Err(e) => Err(format!("INPUT is not valid JSON: {e}")),
    }
}

fn strip_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string (e.g. `json`) on the opening line.
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

fn outside_text(text: &str, start: usize, end: usize) -> String {
    let before = text[..start].trim();
    let after = text[end..].trim();
    match (before.is_empty(), after.is_empty()) {
        (true, true) => String::new(),
        (false, true) => before.to_string(),
        (true, false) => after.to_string(),
        (false, false) => format!("{before}\n\n{after}"),
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ── Lenient JSON scan ───────────────────────────────────────────────────

/// Lenient stage: the first top-level JSON object with an explicit action.
///
/// Objects without a string `action`/`tool` key are skipped, so stray JSON
/// in prose does not turn into a tool call.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonScanStage;

impl DecisionStage for JsonScanStage {
    fn name(&self) -> &'static str {
        "json_scan"
    }

    fn parse(&self, text: &str) -> Option<ToolDecision> {
        let mut cursor = 0;
        while let Some(offset) = text[cursor..].find('{') {
            let start = cursor + offset;
            let Some(end) = balanced_object_end(text, start) else {
                cursor = start + 1;
                continue;
            };
            let candidate = &text[start..end];
            match serde_json::from_str::<Value>(candidate) {
                Ok(Value::Object(map)) => {
                    if let Some(decision) = decide_from_object(&map, text, start, end) {
                        return Some(decision);
                    }
                    cursor = end;
                }
                _ => cursor = start + 1,
            }
        }
        None
    }
}

fn decide_from_object(
    map: &serde_json::Map<String, Value>,
    text: &str,
    start: usize,
    end: usize,
) -> Option<ToolDecision> {
    let action = map
        .get("action")
        .or_else(|| map.get("tool"))
        .and_then(Value::as_str)
        .map(str::trim);
    let done = map
        .get("status")
        .and_then(Value::as_str)
        .is_some_and(|s| s.trim().eq_ignore_ascii_case("done"));

    if done || action.is_some_and(|a| a.eq_ignore_ascii_case(FINAL_ANSWER_ACTION)) {
        let answer = ["answer", "response", "text"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| outside_text(text, start, end));
        return Some(ToolDecision::FinalAnswer { text: answer });
    }

    let action = action.filter(|a| !a.is_empty())?;
    let input = match map.get("input").or_else(|| map.get("arguments")) {
        None => ToolInput::new(),
        Some(Value::Object(input)) => input.clone(),
        Some(_) => return None,
    };
    let reasoning = map
        .get("reasoning")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Some(ToolDecision::ToolCall {
        action: action.to_string(),
        input,
        reasoning,
        source: DecisionSource::Inferred,
    })
}

/// Byte offset just past the `}` matching the `{` at `start`, skipping
/// braces inside strings.
fn balanced_object_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, byte) in text.as_bytes()[start..].iter().enumerate() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(start + i + 1);
                }
            }
            _ => {}
        }
    }
    None
}
