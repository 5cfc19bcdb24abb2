//! 初始任务列表（队列为空时由 bootstrap 写入）

use serde_json::{json, Map, Value};

use crate::config::SeedTask;
use crate::tasks::NewTask;
use crate::triggers::TriggerKind;

fn data(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// 内置的三步任务序列
pub fn default_seed_tasks() -> Vec<NewTask> {
    vec![
        NewTask::new(
            "analyze-market",
            "Analyze market and find the most profitable option call to sell",
            "Identified the most profitable option call based on market analysis, \
             including strike price, expiration, and expected profit potential",
        )
        .with_order(0)
        .with_trigger_types([TriggerKind::Polling])
        .with_data(data(json!({
            "type": "market_analysis",
            "parameters": { "optionType": "call", "position": "sell" }
        }))),
        NewTask::new(
            "open-position",
            "Open position",
            "Successfully opened the identified option position with confirmation of execution",
        )
        .with_order(1)
        .with_trigger_types([TriggerKind::Price])
        .with_data(data(json!({ "type": "trade_execution", "action": "open" }))),
        NewTask::new(
            "close-position",
            "Close position and take profit",
            "Successfully closed the position with profit target achieved",
        )
        .with_order(2)
        .with_trigger_types([TriggerKind::Price])
        .with_data(data(json!({ "type": "trade_execution", "action": "close" }))),
    ]
}

impl From<&SeedTask> for NewTask {
    fn from(seed: &SeedTask) -> Self {
        let task = NewTask::new(&seed.id, &seed.description, &seed.definition_of_done)
            .with_trigger_types(seed.trigger_types.iter().map(|k| TriggerKind::from(k.as_str())))
            .with_data(seed.data.clone());
        match seed.order {
            Some(order) => task.with_order(order),
            None => task,
        }
    }
}

/// 配置中的种子任务；为空时使用内置列表
pub fn seed_tasks_from_config(seeds: &[SeedTask]) -> Vec<NewTask> {
    if seeds.is_empty() {
        default_seed_tasks()
    } else {
        seeds.iter().map(NewTask::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_seed_is_ordered() {
        let seeds = default_seed_tasks();
        let orders: Vec<Option<i64>> = seeds.iter().map(|t| t.order).collect();
        assert_eq!(orders, vec![Some(0), Some(1), Some(2)]);
        assert_eq!(seeds[0].id, "analyze-market");
        assert!(seeds[1].trigger_types.contains(&TriggerKind::Price));
    }

    #[test]
    fn test_config_seed_overrides_default() {
        let seed = SeedTask {
            id: "watch".into(),
            description: "Watch the book".into(),
            definition_of_done: "Summary noted".into(),
            order: None,
            trigger_types: vec!["dynamic".into()],
            data: Map::new(),
        };
        let tasks = seed_tasks_from_config(std::slice::from_ref(&seed));
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].order, None);
        assert!(tasks[0].trigger_types.contains(&TriggerKind::Dynamic));
        assert_eq!(seed_tasks_from_config(&[]).len(), 3);
    }
}
