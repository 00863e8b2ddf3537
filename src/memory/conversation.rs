//! 对话记录：消息、工具调用请求与只追加的 MessageLog
//!
//! MessageLog 是线程状态中唯一的对话转录，插入顺序即推理后端的输入顺序；
//! 只支持追加、读取全部、读取最后一条，不提供修改或删除。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 消息角色
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    Human,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::Human => "human",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// 推理后端在 assistant 消息中发出的工具调用请求；id 原样回写到对应的 tool 消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// 仅 assistant 消息可携带
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    /// 仅 tool 消息携带：所回应的调用 id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn human(content: impl Into<String>) -> Self {
        Self::plain(Role::Human, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    pub fn assistant_with_tool_calls(
        content: impl Into<String>,
        tool_calls: Vec<ToolCallRequest>,
    ) -> Self {
        Self {
            tool_calls,
            ..Self::plain(Role::Assistant, content)
        }
    }

    pub fn tool(content: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::plain(Role::Tool, content)
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        self.role == Role::Assistant && !self.tool_calls.is_empty()
    }
}

/// 只追加的消息序列
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageLog {
    messages: Vec<Message>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, msg: Message) {
        self.messages.push(msg);
    }

    pub fn extend(&mut self, msgs: impl IntoIterator<Item = Message>) {
        self.messages.extend(msgs);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_appends_in_order() {
        let mut log = MessageLog::new();
        log.push(Message::human("2+2?"));
        log.extend([Message::assistant("4"), Message::human("thanks")]);

        let roles: Vec<Role> = log.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::Human, Role::Assistant, Role::Human]);
        assert_eq!(log.last().map(|m| m.content.as_str()), Some("thanks"));
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_has_tool_calls_only_for_assistant() {
        let call = ToolCallRequest::new("call_1", "calc", serde_json::json!({"expr": "2+2"}));
        let msg = Message::assistant_with_tool_calls("", vec![call.clone()]);
        assert!(msg.has_tool_calls());
        assert!(!Message::assistant("done").has_tool_calls());

        let mut bogus = Message::human("hi");
        bogus.tool_calls.push(call);
        assert!(!bogus.has_tool_calls());
    }

    #[test]
    fn test_log_serializes_as_plain_array() {
        let mut log = MessageLog::new();
        log.push(Message::tool("4", "call_1"));
        let json = serde_json::to_value(&log).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{"role": "tool", "content": "4", "tool_call_id": "call_1"}])
        );
    }
}
