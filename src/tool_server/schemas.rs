use serde_json::{json, Value};

use crate::tool_server::protocol::ToolDescriptor;

/// Function-calling schemas for every tool the session advertises.
pub fn tool_schemas(tools: &[ToolDescriptor]) -> Vec<Value> {
    tools.iter().map(tool_schema).collect()
}

fn tool_schema(tool: &ToolDescriptor) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description.clone().unwrap_or_default(),
            "parameters": parameters(&tool.input_schema),
        }
    })
}

// Chat APIs reject parameter schemas that are not objects.
fn parameters(input_schema: &Value) -> Value {
    match input_schema.as_object() {
        Some(obj) if obj.get("type").and_then(Value::as_str) == Some("object") => {
            input_schema.clone()
        }
        Some(obj) if !obj.contains_key("type") => {
            let mut schema = obj.clone();
            schema.insert("type".to_string(), json!("object"));
            Value::Object(schema)
        }
        _ => json!({ "type": "object", "properties": {} }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_shape() {
        let tools = vec![ToolDescriptor {
            name: "list_issues".into(),
            description: Some("List issues in a repository".into()),
            input_schema: json!({
                "type": "object",
                "properties": { "owner": { "type": "string" }, "repo": { "type": "string" } },
                "required": ["owner", "repo"]
            }),
        }];

        let schemas = tool_schemas(&tools);
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0]["type"], "function");
        assert_eq!(schemas[0]["function"]["name"], "list_issues");
        assert_eq!(schemas[0]["function"]["parameters"]["required"], json!(["owner", "repo"]));
    }

    #[test]
    fn test_parameters_normalized() {
        assert_eq!(
            parameters(&json!({"properties": {"q": {"type": "string"}}})),
            json!({"type": "object", "properties": {"q": {"type": "string"}}})
        );
        assert_eq!(
            parameters(&json!("nonsense")),
            json!({"type": "object", "properties": {}})
        );
        assert_eq!(
            parameters(&json!({"type": "array"})),
            json!({"type": "object", "properties": {}})
        );
    }

    #[test]
    fn test_missing_description_is_empty() {
        let tools = vec![ToolDescriptor {
            name: "get_me".into(),
            description: None,
            input_schema: json!({"type": "object"}),
        }];
        assert_eq!(tool_schemas(&tools)[0]["function"]["description"], "");
    }
}
