use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Speaker of a [`Message`] in the rolling conversation sent to the model.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One turn of the conversation handed to an [`crate::llm::LlmChatClient`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Message {
    #[serde(default = "new_id", skip_serializing)]
    pub id: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn new(role: Role, content: String, tool_call_id: Option<String>) -> Self {
        Self {
            id: new_id(),
            role,
            content: Some(content),
            tool_call_id,
        }
    }

    pub fn system<T: Into<String>>(content: T) -> Self {
        Self::new(Role::System, content.into(), None)
    }

    pub fn user<T: Into<String>>(content: T) -> Self {
        Self::new(Role::User, content.into(), None)
    }

    pub fn assistant<T: Into<String>>(content: T) -> Self {
        Self::new(Role::Assistant, content.into(), None)
    }

    pub fn tool<T, S>(content: T, tool_call_id: S) -> Self
    where
        T: Into<String>,
        S: Into<String>,
    {
        Self::new(Role::Tool, content.into(), Some(tool_call_id.into()))
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}
