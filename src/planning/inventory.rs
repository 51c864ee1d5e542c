//! 预计背包：只有「获取 N 个 X」形状的原语调用会增加计数，其余调用保持不变

use std::collections::BTreeMap;

use crate::actions::PrimitiveCall;

/// 在父节点预计背包的副本上叠加 call 的产出
pub fn project(parent: &BTreeMap<String, u32>, call: &PrimitiveCall) -> BTreeMap<String, u32> {
    let mut next = parent.clone();
    if let Some((item, count)) = call.yields() {
        let entry = next.entry(item.to_string()).or_insert(0);
        *entry = entry.saturating_add(count);
    }
    next
}

/// "item:count, ..." 形式，供提示使用
pub fn render(inventory: &BTreeMap<String, u32>) -> String {
    if inventory.is_empty() {
        return "(nothing yet)".to_string();
    }
    inventory
        .iter()
        .map(|(item, n)| format!("{item}:{n}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_only_counts_acquisitions() {
        let mut base = BTreeMap::new();
        base.insert("wood".to_string(), 5);

        let mined = project(&base, &PrimitiveCall::Mine { block: "wood".into(), count: 3 });
        assert_eq!(mined.get("wood"), Some(&8));

        let crafted = project(&mined, &PrimitiveCall::Craft { item: "sticks".into(), amount: 2 });
        assert_eq!(crafted.get("sticks"), Some(&2));
        assert_eq!(crafted.get("wood"), Some(&8));

        let placed = project(&crafted, &PrimitiveCall::Place { block_type: "wood".into() });
        assert_eq!(placed, crafted);

        let stored = project(&crafted, &PrimitiveCall::StoreItemInChest { item: "wood".into(), count: 8 });
        assert_eq!(stored, crafted);
        assert_eq!(base.get("wood"), Some(&5));
    }

    #[test]
    fn test_render() {
        assert_eq!(render(&BTreeMap::new()), "(nothing yet)");
        let inv: BTreeMap<String, u32> = [("a".to_string(), 1), ("b".to_string(), 2)].into();
        assert_eq!(render(&inv), "a:1, b:2");
    }
}
