//! Normalized call options → OpenAI chat completion request.

use serde_json::{Map, Value, json};

use crate::types::{
    AssistantContent, CallOptions, CallWarning, FileData, FilePart, Message, Prompt,
    ProviderOptions, ResponseFormat, Tool, ToolChoice, UserContent,
};
use crate::{HuginnError, Result};

/// Tool definitions ready for the request body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreparedTools {
    pub tools: Option<Vec<Value>>,
    pub tool_choice: Option<Value>,
    pub warnings: Vec<CallWarning>,
}

/// Convert a prompt into chat `messages`.
///
/// Provider options stored under `provider_name` are merged into the wire
/// object they belong to: message options into the message, part options
/// into the content part.
pub fn convert_to_chat_messages(prompt: &Prompt, provider_name: &str) -> Result<Vec<Value>> {
    let mut messages = Vec::with_capacity(prompt.len());

    for message in prompt {
        let extra = own_options(message.provider_options(), provider_name);

        match message {
            Message::System { content, .. } => {
                messages.push(with_extra(
                    json!({ "role": "system", "content": content }),
                    &extra,
                ));
            }
            Message::User { content, .. } => {
                if let [UserContent::Text(part)] = content.as_slice()
                    && own_options(part.provider_options.as_ref(), provider_name).is_empty()
                {
                    messages.push(with_extra(
                        json!({ "role": "user", "content": part.text }),
                        &extra,
                    ));
                    continue;
                }
                let parts = content
                    .iter()
                    .map(|part| match part {
                        UserContent::Text(t) => Ok(with_extra(
                            json!({ "type": "text", "text": t.text }),
                            &own_options(t.provider_options.as_ref(), provider_name),
                        )),
                        UserContent::File(f) => image_part(f).map(|value| {
                            with_extra(
                                value,
                                &own_options(f.provider_options.as_ref(), provider_name),
                            )
                        }),
                    })
                    .collect::<Result<Vec<_>>>()?;
                messages.push(with_extra(
                    json!({ "role": "user", "content": parts }),
                    &extra,
                ));
            }
            Message::Assistant { content, .. } => {
                let mut text = String::new();
                let mut tool_calls = Vec::new();
                for part in content {
                    match part {
                        AssistantContent::Text(t) => text.push_str(&t.text),
                        AssistantContent::ToolCall(call) => tool_calls.push(json!({
                            "id": call.tool_call_id,
                            "type": "function",
                            "function": {
                                "name": call.tool_name,
                                "arguments": call.input.to_string(),
                            },
                        })),
                        // Not representable in the chat format.
                        AssistantContent::Reasoning(_) | AssistantContent::File(_) => {}
                    }
                }
                let mut msg = json!({ "role": "assistant", "content": text });
                if !tool_calls.is_empty() {
                    msg["tool_calls"] = Value::Array(tool_calls);
                }
                messages.push(with_extra(msg, &extra));
            }
            Message::Tool { content, .. } => {
                for result in content {
                    messages.push(with_extra(
                        json!({
                            "role": "tool",
                            "tool_call_id": result.tool_call_id,
                            "content": result.output.to_text(),
                        }),
                        &extra,
                    ));
                }
            }
        }
    }

    Ok(messages)
}

fn image_part(file: &FilePart) -> Result<Value> {
    let media_type = file.media_type.to_lowercase();
    if !media_type.starts_with("image/") {
        return Err(HuginnError::UnsupportedFunctionality(format!(
            "file part media type {}",
            file.media_type
        )));
    }
    let media_type = if media_type == "image/*" {
        "image/jpeg"
    } else {
        media_type.as_str()
    };
    let url = match &file.data {
        FileData::Url(url) => url.clone(),
        data => format!(
            "data:{media_type};base64,{}",
            data.to_base64().unwrap_or_default()
        ),
    };
    Ok(json!({ "type": "image_url", "image_url": { "url": url } }))
}

fn own_options(options: Option<&ProviderOptions>, provider_name: &str) -> Map<String, Value> {
    options
        .and_then(|o| o.get(provider_name))
        .cloned()
        .unwrap_or_default()
}

fn with_extra(mut message: Value, extra: &Map<String, Value>) -> Value {
    if let Some(obj) = message.as_object_mut() {
        for (k, v) in extra {
            obj.insert(k.clone(), v.clone());
        }
    }
    message
}

/// Map tool definitions and the tool choice.
///
/// Provider-defined tools are not supported by the chat format and only
/// produce a warning.
pub fn prepare_tools(tools: &[Tool], tool_choice: Option<&ToolChoice>) -> PreparedTools {
    if tools.is_empty() {
        return PreparedTools::default();
    }

    let mut warnings = Vec::new();
    let mut definitions = Vec::new();
    for tool in tools {
        match tool {
            Tool::Function(f) => {
                let mut function = json!({ "name": f.name, "parameters": f.input_schema });
                if let Some(description) = &f.description {
                    function["description"] = json!(description);
                }
                definitions.push(json!({ "type": "function", "function": function }));
            }
            Tool::ProviderDefined(p) => warnings.push(CallWarning::unsupported_tool(&p.id)),
        }
    }

    let tool_choice = tool_choice.map(|choice| match choice {
        ToolChoice::Auto => json!("auto"),
        ToolChoice::None => json!("none"),
        ToolChoice::Required => json!("required"),
        ToolChoice::Tool { tool_name } => {
            json!({ "type": "function", "function": { "name": tool_name } })
        }
    });

    PreparedTools {
        tools: (!definitions.is_empty()).then_some(definitions),
        tool_choice,
        warnings,
    }
}

/// Build the `/chat/completions` body and the warnings for this call.
pub fn build_request_body(
    model_id: &str,
    options: &CallOptions,
    provider_name: &str,
    supports_structured_outputs: bool,
) -> Result<(Value, Vec<CallWarning>)> {
    let mut warnings = Vec::new();

    if options.top_k.is_some() {
        warnings.push(CallWarning::unsupported_setting("top_k"));
    }

    let mut body = Map::new();
    body.insert("model".into(), json!(model_id));
    body.insert(
        "messages".into(),
        Value::Array(convert_to_chat_messages(&options.prompt, provider_name)?),
    );

    let mut set = |key: &str, value: Option<Value>| {
        if let Some(value) = value {
            body.insert(key.to_string(), value);
        }
    };
    set("max_tokens", options.max_output_tokens.map(|v| json!(v)));
    set("temperature", options.temperature.map(|v| json!(v)));
    set("top_p", options.top_p.map(|v| json!(v)));
    set("frequency_penalty", options.frequency_penalty.map(|v| json!(v)));
    set("presence_penalty", options.presence_penalty.map(|v| json!(v)));
    set("seed", options.seed.map(|v| json!(v)));
    set(
        "stop",
        (!options.stop_sequences.is_empty()).then(|| json!(options.stop_sequences)),
    );

    if let Some(ResponseFormat::Json {
        schema,
        name,
        description,
    }) = &options.response_format
    {
        let format = match schema {
            Some(schema) if supports_structured_outputs => {
                let mut json_schema = json!({
                    "schema": schema,
                    "name": name.as_deref().unwrap_or("response"),
                });
                if let Some(description) = description {
                    json_schema["description"] = json!(description);
                }
                json!({ "type": "json_schema", "json_schema": json_schema })
            }
            Some(_) => {
                warnings.push(CallWarning::unsupported_setting_with(
                    "response_format",
                    "JSON response format schema is only supported with structured outputs",
                ));
                json!({ "type": "json_object" })
            }
            None => json!({ "type": "json_object" }),
        };
        set("response_format", Some(format));
    }

    let prepared = prepare_tools(&options.tools, options.tool_choice.as_ref());
    warnings.extend(prepared.warnings);
    set("tools", prepared.tools.map(Value::Array));
    set("tool_choice", prepared.tool_choice);

    // Vendor-specific fields (user, reasoning_effort, ...) pass straight through.
    if let Some(extra) = options.options_for(provider_name) {
        for (k, v) in extra {
            body.insert(k.clone(), v.clone());
        }
    }

    Ok((Value::Object(body), warnings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FilePart, ToolCallPart, ToolResultOutput};

    #[test]
    fn single_text_user_message_is_a_string() {
        let messages = convert_to_chat_messages(&vec![Message::user("hi")], "acme").unwrap();
        assert_eq!(messages, vec![json!({ "role": "user", "content": "hi" })]);
    }

    #[test]
    fn wildcard_image_becomes_jpeg_data_url() {
        let prompt = vec![Message::user_parts(vec![
            UserContent::Text(crate::types::TextPart::new("look")),
            UserContent::File(FilePart::bytes("image/*", b"hi".to_vec())),
        ])];
        let messages = convert_to_chat_messages(&prompt, "acme").unwrap();
        assert_eq!(
            messages[0]["content"][1]["image_url"]["url"],
            "data:image/jpeg;base64,aGk="
        );
    }

    #[test]
    fn pdf_file_is_unsupported() {
        let prompt = vec![Message::user_parts(vec![UserContent::File(FilePart::url(
            "application/pdf",
            "https://example.com/a.pdf",
        ))])];
        assert!(matches!(
            convert_to_chat_messages(&prompt, "acme"),
            Err(HuginnError::UnsupportedFunctionality(_))
        ));
    }

    #[test]
    fn assistant_tool_calls_serialize_arguments() {
        let prompt = vec![
            Message::assistant_parts(vec![AssistantContent::ToolCall(ToolCallPart::new(
                "c1",
                "weather",
                json!({"city": "Oslo"}),
            ))]),
            Message::tool_result("c1", "weather", ToolResultOutput::Json(json!({"temp": 3}))),
        ];
        let messages = convert_to_chat_messages(&prompt, "acme").unwrap();
        assert_eq!(
            messages[0]["tool_calls"][0]["function"]["arguments"],
            r#"{"city":"Oslo"}"#
        );
        assert_eq!(messages[1]["role"], "tool");
        assert_eq!(messages[1]["content"], r#"{"temp":3}"#);
    }

    #[test]
    fn provider_defined_tools_warn() {
        let tools = vec![Tool::ProviderDefined(crate::types::ProviderDefinedTool {
            id: "acme.web_search".into(),
            name: "web_search".into(),
            args: Map::new(),
        })];
        let prepared = prepare_tools(&tools, Some(&ToolChoice::Auto));
        assert!(prepared.tools.is_none());
        assert_eq!(
            prepared.warnings,
            vec![CallWarning::unsupported_tool("acme.web_search")]
        );
    }
}
