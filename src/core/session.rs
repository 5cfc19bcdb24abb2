//! 会话作用域：房间 + 用户 + 智能体身份
//!
//! 三类实体（任务 / 触发器 / 笔记）以及对话记录都写在 room_id 作用域下；id 由名称经 UUID v5 派生，进程重启后不变。

use serde_json::Value;
use uuid::Uuid;

use crate::store::Record;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionScope {
    pub room_id: String,
    pub user_id: String,
    pub agent_id: String,
    pub user_name: String,
}

/// 由名称派生稳定 UUID
pub fn stable_id(name: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
}

impl SessionScope {
    /// room 为空时使用 `default-room-<agent_id>`
    pub fn new(agent_id: &str, user_name: &str, room: Option<&str>) -> Self {
        let room_name = room
            .filter(|r| !r.trim().is_empty())
            .map(String::from)
            .unwrap_or_else(|| format!("default-room-{agent_id}"));
        Self {
            room_id: stable_id(&room_name),
            user_id: stable_id(user_name),
            agent_id: agent_id.to_string(),
            user_name: user_name.to_string(),
        }
    }

    /// 以智能体身份在本作用域下新建一条记录
    pub fn record(&self, content: Value) -> Record {
        Record::new(self.room_id.clone(), self.agent_id.clone(), content)
    }
}
