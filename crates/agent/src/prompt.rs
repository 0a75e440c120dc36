//! Prompt text: the protocol system prompt and the host-authored messages
//! the loop appends to the transcript.

use std::fmt::Write;

use steward_core::tool::{ToolDefinition, ToolInput, describe_call};

use crate::parser::{BLOCK_END, BLOCK_START, FINAL_ANSWER_ACTION};

/// Build the fixed system prompt that teaches the assistant the decision
/// protocol and lists the tools it may call.
pub fn build_system_prompt(tools: &[ToolDefinition]) -> String {
    let mut prompt = String::from(
        "You are a task-execution assistant working inside the user's project. \
         You cannot act directly; instead you ask the host to run one tool at a time \
         and you will see each result before deciding the next step.\n\n",
    );

    prompt.push_str("## Response format\n\n");
    prompt.push_str("Every reply must contain exactly one decision block:\n\n");
    let _ = writeln!(prompt, "{BLOCK_START}");
    prompt.push_str("ACTION: <tool name, or final_answer>\n");
    prompt.push_str("INPUT: <JSON object with the tool's parameters, {} if none>\n");
    prompt.push_str("REASONING: <why this step>\n");
    prompt.push_str("STATUS: continue | done\n");
    let _ = writeln!(prompt, "{BLOCK_END}");
    prompt.push('\n');
    let _ = writeln!(
        prompt,
        "When the task is complete, write your answer to the user outside the block and \
         use ACTION: {FINAL_ANSWER_ACTION} with STATUS: done. Request only one tool per reply. \
         INPUT must be valid JSON."
    );
    prompt.push('\n');

    prompt.push_str("## Available tools\n\n");
    if tools.is_empty() {
        prompt.push_str("(none; answer from the provided context)\n");
    }
    for tool in tools {
        let _ = writeln!(prompt, "### {} ({})", tool.name, tool.capability);
        let _ = writeln!(prompt, "{}", tool.description);
        let params = describe_parameters(&tool.parameters);
        if params.is_empty() {
            prompt.push_str("Parameters: none\n");
        } else {
            prompt.push_str("Parameters:\n");
            prompt.push_str(&params);
        }
        prompt.push('\n');
    }

    prompt
}

fn describe_parameters(schema: &serde_json::Value) -> String {
    let mut out = String::new();
    let Some(properties) = schema.get("properties").and_then(|p| p.as_object()) else {
        return out;
    };
    let required: Vec<&str> = schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|r| r.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();

    for (name, spec) in properties {
        let ty = spec.get("type").and_then(|t| t.as_str()).unwrap_or("any");
        let desc = spec.get("description").and_then(|d| d.as_str()).unwrap_or("");
        let flag = if required.contains(&name.as_str()) {
            "required"
        } else {
            "optional"
        };
        let _ = writeln!(out, "- `{name}` ({ty}, {flag}): {desc}");
    }
    out
}

/// The first message of a run: the task plus the host-supplied context.
pub fn task_message(task: &str, context: &str) -> String {
    if context.trim().is_empty() {
        return format!("## Task\n\n{task}");
    }
    format!("## Task\n\n{task}\n\n## Project context\n\n{}", context.trim())
}

/// Sent back when a reply could not be parsed.
pub fn reformat_request(reason: &str) -> String {
    format!(
        "Your last reply could not be understood ({reason}). Reply again with exactly one \
         {BLOCK_START} block containing ACTION, INPUT (a JSON object), REASONING and STATUS, \
         closed by {BLOCK_END}."
    )
}

/// Sent back when the assistant names a tool it may not use.
pub fn tool_not_allowed(action: &str, input: &ToolInput, allowed: &[&str]) -> String {
    let list = if allowed.is_empty() {
        "none".to_string()
    } else {
        allowed.join(", ")
    };
    format!(
        "Tool {} is not available for this task. Allowed tools: {list}.",
        describe_call(action, input)
    )
}

/// Sent back when the approval gate blocks a call.
pub fn rejection(action: &str, input: &ToolInput, reason: &str) -> String {
    format!("Tool call {} was not executed: {reason}", describe_call(action, input))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use steward_core::tool::Capability;

    fn list_files() -> ToolDefinition {
        ToolDefinition {
            name: "list_files".into(),
            description: "List files".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "pattern": {"type": "string", "description": "glob"},
                    "path": {"type": "string", "description": "dir"}
                },
                "required": ["pattern"]
            }),
            capability: Capability::ReadOnly,
        }
    }

    #[test]
    fn system_prompt_describes_protocol_and_tools() {
        let prompt = build_system_prompt(&[list_files()]);
        assert!(prompt.contains("[DECISION]"));
        assert!(prompt.contains("[/DECISION]"));
        assert!(prompt.contains("final_answer"));
        assert!(prompt.contains("### list_files (read-only)"));
        assert!(prompt.contains("- `pattern` (string, required): glob"));
        assert!(prompt.contains("- `path` (string, optional): dir"));
    }

    #[test]
    fn empty_tool_list_is_stated() {
        assert!(build_system_prompt(&[]).contains("(none;"));
    }

    #[test]
    fn task_message_includes_context_when_present() {
        assert_eq!(task_message("list R files", "  "), "## Task\n\nlist R files");
        let msg = task_message("list R files", "3 scripts\n");
        assert!(msg.ends_with("## Project context\n\n3 scripts"));
    }

    #[test]
    fn host_messages_carry_details() {
        assert!(reformat_request("INPUT is not valid JSON").contains("INPUT is not valid JSON"));
        assert_eq!(
            tool_not_allowed("write_file", &ToolInput::new(), &["list_files", "read_file"]),
            "Tool `write_file` is not available for this task. Allowed tools: list_files, read_file."
        );
        let mut input = ToolInput::new();
        input.insert("path".into(), "out.txt".into());
        assert_eq!(
            rejection("write_file", &input, "requires approval"),
            "Tool call `write_file` {\"path\":\"out.txt\"} was not executed: requires approval"
        );
    }
}
