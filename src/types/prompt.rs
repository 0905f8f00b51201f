//! Prompt and message types.
//!
//! Each role has its own part enum, so a message can only hold the part
//! kinds its role accepts:
//!
//! | role      | parts                                  |
//! |-----------|----------------------------------------|
//! | system    | text                                   |
//! | user      | text, file                             |
//! | assistant | text, file, reasoning, tool-call       |
//! | tool      | tool-result                            |

use serde::{Deserialize, Serialize};

use super::ProviderOptions;
use super::content::{
    ContentPart, FilePart, PartKind, ReasoningPart, TextPart, ToolCallPart, ToolResultOutput,
    ToolResultPart,
};
use crate::{HuginnError, Result};

/// An ordered sequence of messages.
pub type Prompt = Vec<Message>;

/// Role of a message participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    /// Part kinds this role accepts.
    pub fn allowed_parts(self) -> &'static [PartKind] {
        match self {
            Role::System => &[PartKind::Text],
            Role::User => &[PartKind::Text, PartKind::File],
            Role::Assistant => &[
                PartKind::Text,
                PartKind::File,
                PartKind::Reasoning,
                PartKind::ToolCall,
            ],
            Role::Tool => &[PartKind::ToolResult],
        }
    }

    pub fn accepts(self, kind: PartKind) -> bool {
        self.allowed_parts().contains(&kind)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        })
    }
}

/// Content allowed in a user message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum UserContent {
    Text(TextPart),
    File(FilePart),
}

/// Content allowed in an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AssistantContent {
    Text(TextPart),
    File(FilePart),
    Reasoning(ReasoningPart),
    ToolCall(ToolCallPart),
}

/// A prompt message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    System {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider_options: Option<ProviderOptions>,
    },
    User {
        content: Vec<UserContent>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider_options: Option<ProviderOptions>,
    },
    Assistant {
        content: Vec<AssistantContent>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider_options: Option<ProviderOptions>,
    },
    Tool {
        content: Vec<ToolResultPart>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider_options: Option<ProviderOptions>,
    },
}

impl Message {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Message::System {
            content: content.into(),
            provider_options: None,
        }
    }

    /// Create a user message with a single text part
    pub fn user(content: impl Into<String>) -> Self {
        Self::user_parts(vec![UserContent::Text(TextPart::new(content))])
    }

    pub fn user_parts(content: Vec<UserContent>) -> Self {
        Message::User {
            content,
            provider_options: None,
        }
    }

    /// Create an assistant message with a single text part
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::assistant_parts(vec![AssistantContent::Text(TextPart::new(content))])
    }

    pub fn assistant_parts(content: Vec<AssistantContent>) -> Self {
        Message::Assistant {
            content,
            provider_options: None,
        }
    }

    /// Create a tool message carrying one result
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        output: ToolResultOutput,
    ) -> Self {
        Message::Tool {
            content: vec![ToolResultPart::new(tool_call_id, tool_name, output)],
            provider_options: None,
        }
    }

    /// Build a message from loosely typed parts, checking the role/part pairing.
    ///
    /// System messages join their text parts with a newline.
    pub fn from_parts(role: Role, parts: Vec<ContentPart>) -> Result<Self> {
        if let Some(bad) = parts.iter().find(|p| !role.accepts(p.kind())) {
            return Err(HuginnError::InvalidPrompt(format!(
                "{} messages cannot contain {} parts",
                role,
                bad.kind()
            )));
        }

        let message = match role {
            Role::System => {
                let texts: Vec<String> = parts
                    .into_iter()
                    .filter_map(|p| match p {
                        ContentPart::Text(t) => Some(t.text),
                        _ => None,
                    })
                    .collect();
                Message::system(texts.join("\n"))
            }
            Role::User => Message::user_parts(
                parts
                    .into_iter()
                    .filter_map(|p| match p {
                        ContentPart::Text(t) => Some(UserContent::Text(t)),
                        ContentPart::File(f) => Some(UserContent::File(f)),
                        _ => None,
                    })
                    .collect(),
            ),
            Role::Assistant => Message::assistant_parts(
                parts
                    .into_iter()
                    .filter_map(|p| match p {
                        ContentPart::Text(t) => Some(AssistantContent::Text(t)),
                        ContentPart::File(f) => Some(AssistantContent::File(f)),
                        ContentPart::Reasoning(r) => Some(AssistantContent::Reasoning(r)),
                        ContentPart::ToolCall(c) => Some(AssistantContent::ToolCall(c)),
                        _ => None,
                    })
                    .collect(),
            ),
            Role::Tool => Message::Tool {
                content: parts
                    .into_iter()
                    .filter_map(|p| match p {
                        ContentPart::ToolResult(r) => Some(r),
                        _ => None,
                    })
                    .collect(),
                provider_options: None,
            },
        };
        Ok(message)
    }

    pub fn role(&self) -> Role {
        match self {
            Message::System { .. } => Role::System,
            Message::User { .. } => Role::User,
            Message::Assistant { .. } => Role::Assistant,
            Message::Tool { .. } => Role::Tool,
        }
    }

    /// Flatten back into the loose part union.
    pub fn into_parts(self) -> Vec<ContentPart> {
        match self {
            Message::System { content, .. } => vec![ContentPart::text(content)],
            Message::User { content, .. } => content
                .into_iter()
                .map(|c| match c {
                    UserContent::Text(t) => ContentPart::Text(t),
                    UserContent::File(f) => ContentPart::File(f),
                })
                .collect(),
            Message::Assistant { content, .. } => content
                .into_iter()
                .map(|c| match c {
                    AssistantContent::Text(t) => ContentPart::Text(t),
                    AssistantContent::File(f) => ContentPart::File(f),
                    AssistantContent::Reasoning(r) => ContentPart::Reasoning(r),
                    AssistantContent::ToolCall(c) => ContentPart::ToolCall(c),
                })
                .collect(),
            Message::Tool { content, .. } => {
                content.into_iter().map(ContentPart::ToolResult).collect()
            }
        }
    }

    pub fn provider_options(&self) -> Option<&ProviderOptions> {
        match self {
            Message::System {
                provider_options, ..
            }
            | Message::User {
                provider_options, ..
            }
            | Message::Assistant {
                provider_options, ..
            }
            | Message::Tool {
                provider_options, ..
            } => provider_options.as_ref(),
        }
    }

    /// Attach provider-specific options to the message.
    #[must_use]
    pub fn with_provider_options(mut self, options: ProviderOptions) -> Self {
        match &mut self {
            Message::System {
                provider_options, ..
            }
            | Message::User {
                provider_options, ..
            }
            | Message::Assistant {
                provider_options, ..
            }
            | Message::Tool {
                provider_options, ..
            } => *provider_options = Some(options),
        }
        self
    }
}
