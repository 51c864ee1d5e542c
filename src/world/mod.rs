//! 外部世界协作者：感知（Perception）与行动（Actions）接口
//!
//! 核心只通过这两个 trait 接触世界；具体扫描、寻路、挖掘、合成等由实现方负责。
//! 本模块还提供感知刷新函数、独立扫描 worker 与内存模拟世界 SimWorld。

pub mod refresh;
pub mod scanner;
pub mod sim;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::ActionError;

pub use refresh::{refresh_all, refresh_hostiles, refresh_status};
pub use scanner::ScanWorker;
pub use sim::SimWorld;

/// 感知 / 行动调用的结果类型
pub type WorldResult<T> = Result<T, ActionError>;

/// 方块坐标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Coord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Coord {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn distance(&self, other: &Coord) -> f32 {
        let dx = (self.x - other.x) as f32;
        let dy = (self.y - other.y) as f32;
        let dz = (self.z - other.z) as f32;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// 附近的生物
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MobSighting {
    pub name: String,
    pub distance: f32,
}

/// 威胁检查结果（调度循环的中断谓词）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreatReport {
    pub under_attack: bool,
    pub attacker: Option<String>,
    pub message: String,
}

impl ThreatReport {
    pub fn calm() -> Self {
        Self::default()
    }

    pub fn attacked_by(attacker: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            under_attack: true,
            attacker: Some(attacker.into()),
            message: message.into(),
        }
    }
}

/// 生命体征快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vitals {
    pub health: f32,
    pub hunger: f32,
    pub position: Coord,
    /// 槽位 → 物品
    pub equipment: BTreeMap<String, String>,
}

impl Default for Vitals {
    fn default() -> Self {
        Self {
            health: 20.0,
            hunger: 20.0,
            position: Coord::default(),
            equipment: BTreeMap::new(),
        }
    }
}

/// 常见敌对生物名
pub const HOSTILE_MOBS: &[&str] = &[
    "zombie",
    "skeleton",
    "creeper",
    "spider",
    "cave_spider",
    "enderman",
    "witch",
    "slime",
    "drowned",
    "husk",
    "phantom",
    "pillager",
];

pub fn is_hostile(mob: &str) -> bool {
    HOSTILE_MOBS.contains(&mob)
}

/// 解析 "item:count" 形式的背包行；没有数量时按 1 计
pub fn parse_inventory_line(line: &str) -> Option<(String, u32)> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match line.rsplit_once(':') {
        Some((name, count)) => {
            let count = count.trim().parse().ok()?;
            Some((name.trim().to_string(), count))
        }
        None => Some((line.to_string(), 1)),
    }
}

/// 背包行列表 → 物品计数（同名累加）
pub fn inventory_counts<S: AsRef<str>>(lines: &[S]) -> BTreeMap<String, u32> {
    let mut counts = BTreeMap::new();
    for (name, count) in lines.iter().filter_map(|l| parse_inventory_line(l.as_ref())) {
        *counts.entry(name).or_insert(0) += count;
    }
    counts
}

/// 感知协作者：定期刷新共享状态的「现在能看到什么」
#[async_trait]
pub trait Perception: Send + Sync {
    /// 方块类型 → 最近坐标
    async fn scan_blocks(&self) -> WorldResult<BTreeMap<String, Coord>>;

    async fn scan_mobs(&self) -> WorldResult<Vec<MobSighting>>;

    /// 背包，每行 "item:count"
    async fn scan_inventory(&self) -> WorldResult<Vec<String>>;

    async fn check_threat(&self) -> WorldResult<ThreatReport>;

    async fn scan_players(&self) -> WorldResult<Vec<String>> {
        Ok(Vec::new())
    }

    async fn scan_vitals(&self) -> WorldResult<Vitals> {
        Ok(Vitals::default())
    }
}

/// 行动协作者：封闭的原语菜单，每个原语要么整体成功，要么整体失败
#[async_trait]
pub trait Actions: Send + Sync {
    async fn mine(&self, block: &str, count: u32) -> WorldResult<String>;
    async fn craft(&self, item: &str, amount: u32) -> WorldResult<String>;
    async fn place(&self, block_type: &str) -> WorldResult<String>;
    async fn attack(&self, mob_type: &str) -> WorldResult<String>;
    async fn smelt(&self, input_item: &str, output_item: &str, quantity: u32) -> WorldResult<String>;
    async fn plant_crop(&self, name: &str) -> WorldResult<String>;
    /// count 为 None 表示全部收获
    async fn harvest_crop(&self, name: &str, count: Option<u32>) -> WorldResult<String>;
    async fn sort_inventory(&self) -> WorldResult<String>;
    async fn place_chest(&self) -> WorldResult<String>;
    async fn store_item_in_chest(&self, item: &str, count: u32) -> WorldResult<String>;
    async fn retrieve_item_from_chest(&self, item: &str, count: u32) -> WorldResult<String>;
    async fn chat(&self, text: &str) -> WorldResult<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_inventory_line() {
        assert_eq!(parse_inventory_line("oak_log:5"), Some(("oak_log".into(), 5)));
        assert_eq!(parse_inventory_line(" torch "), Some(("torch".into(), 1)));
        assert_eq!(parse_inventory_line("bad:x"), None);
        assert_eq!(parse_inventory_line(""), None);
    }

    #[test]
    fn test_inventory_counts_merges_stacks() {
        let counts = inventory_counts(&["cobblestone:64", "cobblestone:12", "stick:2"]);
        assert_eq!(counts.get("cobblestone"), Some(&76));
        assert_eq!(counts.get("stick"), Some(&2));
    }

    #[test]
    fn test_coord_distance_and_display() {
        let a = Coord::new(0, 0, 0);
        let b = Coord::new(3, 4, 0);
        assert!((a.distance(&b) - 5.0).abs() < f32::EPSILON);
        assert_eq!(b.to_string(), "(3, 4, 0)");
    }
}
