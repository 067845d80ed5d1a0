use serde_json::Value;

use crate::models::*;

const MAX_RESULT_CHARS: usize = 200_000;
const MAX_LOGGED_ARGS_CHARS: usize = 500;

/// Records one tool invocation and emits it as a tracing event.
pub fn log_tool_call(
    run_id: &str,
    name: &str,
    args: &Value,
    result: &Value,
    is_error: bool,
) -> ToolCallRow {
    let args_json = args.to_string();
    let (args_preview, _) = truncate_string(&args_json, MAX_LOGGED_ARGS_CHARS);
    tracing::info!(run_id, tool = name, args = %args_preview, is_error, "tool call");

    ToolCallRow {
        id: new_id(),
        run_id: run_id.to_string(),
        name: name.to_string(),
        args_json,
        result_json: bounded_result(result),
        is_error,
        created_at: now_iso(),
    }
}

fn bounded_result(result: &Value) -> String {
    let result_str = result.to_string();
    if result_str.len() <= MAX_RESULT_CHARS {
        return result_str;
    }

    let (truncated_content, _) = truncate_string(&result_str, MAX_RESULT_CHARS);
    serde_json::json!({
        "_truncated": true,
        "_original_size": result_str.len(),
        "_content": truncated_content
    })
    .to_string()
}

/// Truncate string to at most `max_chars` characters.
pub fn truncate_string(s: &str, max_chars: usize) -> (String, bool) {
    match s.char_indices().nth(max_chars) {
        None => (s.to_string(), false),
        Some((idx, _)) => (s[..idx].to_string(), true),
    }
}
