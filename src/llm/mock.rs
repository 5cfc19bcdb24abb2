//! Mock LLM 客户端（用于测试与无 API Key 运行）
//!
//! 按顺序返回预置回复；队列耗尽后回显最后一条 User 消息的首行。所有请求都会被记录，便于断言 prompt 内容。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, Message, Role};

/// 脚本化 Mock 客户端
#[derive(Debug, Default)]
pub struct MockLlmClient {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以一组成功回复初始化
    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mock = Self::new();
        for reply in replies {
            mock.push_reply(reply);
        }
        mock
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Ok(reply.into()));
    }

    /// 下一次调用返回错误
    pub fn push_error(&self, err: LlmError) {
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Err(err));
    }

    /// 已收到的请求数
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// 第 n 次请求的全部消息内容拼接（便于断言 prompt）
    pub fn request_text(&self, n: usize) -> Option<String> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(n)
            .map(|msgs| {
                msgs.iter()
                    .map(|m| m.content.as_str())
                    .collect::<Vec<_>>()
                    .join("\n")
            })
    }

    pub fn remaining_replies(&self) -> usize {
        self.replies.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(messages.to_vec());

        if let Some(reply) = self
            .replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
        {
            return reply;
        }

        let last_user = messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, Role::User))
            .and_then(|m| m.content.lines().find(|l| !l.trim().is_empty()))
            .unwrap_or("(no input)");
        Ok(format!("Echo from Mock: {}", last_user.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_replies_then_echo() {
        let mock = MockLlmClient::with_replies(["first"]);
        mock.push_error(LlmError::Timeout(1));

        let msgs = vec![Message::user("hello\nworld")];
        assert_eq!(mock.complete(&msgs).await.unwrap(), "first");
        assert!(matches!(mock.complete(&msgs).await, Err(LlmError::Timeout(1))));
        assert_eq!(mock.complete(&msgs).await.unwrap(), "Echo from Mock: hello");
        assert_eq!(mock.request_count(), 3);
        assert!(mock.request_text(0).unwrap().contains("world"));
    }
}
