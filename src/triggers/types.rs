//! 触发器数据模型

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// polling 触发器默认 / 最小间隔（毫秒）
pub const DEFAULT_INTERVAL_MS: i64 = 5000;
pub const MIN_POLLING_INTERVAL_MS: i64 = 1000;

/// 触发器种类；未知字符串保留原文，评估时给出「未知类型」结果
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TriggerKind {
    Polling,
    Dynamic,
    Price,
    Unknown(String),
}

impl TriggerKind {
    pub fn as_str(&self) -> &str {
        match self {
            TriggerKind::Polling => "polling",
            TriggerKind::Dynamic => "dynamic",
            TriggerKind::Price => "price",
            TriggerKind::Unknown(s) => s,
        }
    }
}

impl From<String> for TriggerKind {
    fn from(s: String) -> Self {
        match s.trim().to_lowercase().as_str() {
            "polling" => TriggerKind::Polling,
            "dynamic" => TriggerKind::Dynamic,
            "price" => TriggerKind::Price,
            _ => TriggerKind::Unknown(s),
        }
    }
}

impl From<&str> for TriggerKind {
    fn from(s: &str) -> Self {
        TriggerKind::from(s.to_string())
    }
}

impl From<TriggerKind> for String {
    fn from(kind: TriggerKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一次触发器评估的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TriggerEvaluation {
    pub is_triggered: bool,
    pub reason: String,
    /// 毫秒时间戳
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
}

impl TriggerEvaluation {
    pub fn triggered(reason: impl Into<String>, timestamp: i64) -> Self {
        Self {
            is_triggered: true,
            reason: reason.into(),
            timestamp,
            response: None,
        }
    }

    pub fn not_triggered(reason: impl Into<String>, timestamp: i64) -> Self {
        Self {
            is_triggered: false,
            reason: reason.into(),
            timestamp,
            response: None,
        }
    }
}

/// 触发器：门控当前任务本轮是否被处理
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TriggerKind,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_check: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_evaluation: Option<TriggerEvaluation>,
}

impl Trigger {
    pub fn new(id: impl Into<String>, kind: TriggerKind, params: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            kind,
            params,
            last_check: None,
            last_evaluation: None,
        }
    }

    /// polling 触发器，interval 单位毫秒
    pub fn polling(id: impl Into<String>, interval_ms: i64) -> Self {
        let mut params = Map::new();
        params.insert("interval".into(), Value::from(interval_ms));
        Self::new(id, TriggerKind::Polling, params)
    }

    /// dynamic 触发器：自然语言条件 + 防抖间隔
    pub fn dynamic(id: impl Into<String>, condition: impl Into<String>, interval_ms: i64) -> Self {
        let mut params = Map::new();
        params.insert("condition".into(), Value::from(condition.into()));
        params.insert("interval".into(), Value::from(interval_ms));
        Self::new(id, TriggerKind::Dynamic, params)
    }

    /// params.interval 的数值（接受整数或浮点）
    pub fn interval_param(&self) -> Option<i64> {
        let v = self.params.get("interval")?;
        v.as_i64().or_else(|| v.as_f64().map(|f| f as i64))
    }

    /// 生效的间隔：缺失或非正数时为默认值
    pub fn interval_ms(&self) -> i64 {
        self.interval_param()
            .filter(|i| *i > 0)
            .unwrap_or(DEFAULT_INTERVAL_MS)
    }

    /// dynamic 触发器的条件文本（空白视为缺失）
    pub fn condition(&self) -> Option<&str> {
        self.params
            .get("condition")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    /// 距上次检查是否已超过间隔（从未检查视为已超过）
    pub fn interval_elapsed(&self, now: i64) -> bool {
        match self.last_check {
            None => true,
            Some(last) => now - last >= self.interval_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serde_roundtrip_keeps_unknown() {
        let kind: TriggerKind = serde_json::from_str("\"volume\"").unwrap();
        assert_eq!(kind, TriggerKind::Unknown("volume".into()));
        assert_eq!(serde_json::to_string(&kind).unwrap(), "\"volume\"");
        assert_eq!(TriggerKind::from("Polling"), TriggerKind::Polling);
    }

    #[test]
    fn test_trigger_serializes_type_field() {
        let t = Trigger::polling("p1", 3000);
        let v = serde_json::to_value(&t).unwrap();
        assert_eq!(v["type"], "polling");
        assert_eq!(v["params"]["interval"], 3000);
        assert!(v.get("lastCheck").is_none());
    }

    #[test]
    fn test_interval_elapsed_boundary() {
        let mut t = Trigger::polling("p1", 5000);
        assert!(t.interval_elapsed(0));
        t.last_check = Some(10_000);
        assert!(!t.interval_elapsed(14_999));
        assert!(t.interval_elapsed(15_000));
    }

    #[test]
    fn test_condition_blank_is_missing() {
        let t = Trigger::dynamic("d1", "   ", 3000);
        assert!(t.condition().is_none());
        assert_eq!(Trigger::dynamic("d2", "BTC up", 3000).condition(), Some("BTC up"));
    }
}
