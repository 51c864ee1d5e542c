//! 内存模拟世界：同时实现感知与行动两个协作者
//!
//! 用于离线运行（没有游戏服务器时）与测试：背包、附近方块、生物、威胁、箱子、作物都在内存里；
//! 合成 / 冶炼按配方书检查原料，挖掘按配方书检查工具；可注入寻路超时与动作延迟。

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::actions::knowledge::{CRAFTING_TABLE, FURNACE};
use crate::actions::RecipeBook;
use crate::core::ActionError;
use crate::world::{
    Actions, Coord, MobSighting, Perception, ThreatReport, Vitals, WorldResult,
};

#[derive(Debug, Default)]
struct SimInner {
    inventory: BTreeMap<String, u32>,
    blocks: BTreeMap<String, Coord>,
    mobs: Vec<MobSighting>,
    players: Vec<String>,
    threat: ThreatReport,
    vitals: Vitals,
    chest: Option<BTreeMap<String, u32>>,
    crops: BTreeMap<String, u32>,
    chat_log: Vec<String>,
    pathfind_failures: u32,
}

impl SimInner {
    fn count(&self, item: &str) -> u32 {
        self.inventory.get(item).copied().unwrap_or(0)
    }

    fn add(&mut self, item: &str, n: u32) {
        let slot = self.inventory.entry(item.to_string()).or_insert(0);
        *slot = slot.saturating_add(n);
    }

    fn take(&mut self, item: &str, n: u32) -> bool {
        let have = self.count(item);
        if have < n {
            return false;
        }
        if have == n {
            self.inventory.remove(item);
        } else {
            self.inventory.insert(item.to_string(), have - n);
        }
        true
    }

    /// 工作站：背包里有或附近有
    fn has_station(&self, station: &str) -> bool {
        self.count(station) > 0 || self.blocks.contains_key(station)
    }

    fn pathfind(&mut self, target: &str) -> WorldResult<()> {
        if self.pathfind_failures > 0 {
            self.pathfind_failures -= 1;
            return Err(ActionError::PathfindTimeout(format!("could not reach {target}")));
        }
        Ok(())
    }

    /// 缺少的原料描述；全部满足时返回 None
    fn shortfall(&self, needs: &BTreeMap<String, u32>) -> Option<String> {
        let missing: Vec<String> = needs
            .iter()
            .filter(|(item, n)| self.count(item) < **n)
            .map(|(item, n)| format!("{n} {item} (have {})", self.count(item)))
            .collect();
        (!missing.is_empty()).then(|| format!("need {}", missing.join(", ")))
    }
}

/// 内存模拟世界
#[derive(Debug)]
pub struct SimWorld {
    inner: Mutex<SimInner>,
    book: RecipeBook,
    action_delay: Option<Duration>,
}

impl SimWorld {
    pub fn new(book: RecipeBook) -> Self {
        Self {
            inner: Mutex::new(SimInner::default()),
            book,
            action_delay: None,
        }
    }

    /// 标准配方书 + 附近有原木、石头、煤矿、铁矿、泥土
    pub fn standard() -> Self {
        let world = Self::new(RecipeBook::standard());
        {
            let mut inner = world.lock();
            for (name, at) in [
                ("oak_log", Coord::new(4, 64, 2)),
                ("stone", Coord::new(-3, 62, 7)),
                ("coal_ore", Coord::new(-6, 58, 9)),
                ("iron_ore", Coord::new(10, 40, -4)),
                ("dirt", Coord::new(1, 63, 0)),
            ] {
                inner.blocks.insert(name.to_string(), at);
            }
            inner.vitals.position = Coord::new(0, 64, 0);
        }
        world
    }

    /// 每个动作执行前等待（模拟慢动作）
    pub fn with_action_delay(mut self, delay: Duration) -> Self {
        self.action_delay = Some(delay);
        self
    }

    fn lock(&self) -> MutexGuard<'_, SimInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn pause(&self) {
        if let Some(delay) = self.action_delay {
            tokio::time::sleep(delay).await;
        }
    }

    pub fn recipes(&self) -> &RecipeBook {
        &self.book
    }

    pub fn give(&self, item: &str, n: u32) {
        self.lock().add(item, n);
    }

    pub fn count(&self, item: &str) -> u32 {
        self.lock().count(item)
    }

    pub fn add_block(&self, name: &str, at: Coord) {
        self.lock().blocks.insert(name.to_string(), at);
    }

    pub fn set_mobs(&self, mobs: Vec<MobSighting>) {
        self.lock().mobs = mobs;
    }

    pub fn set_players(&self, players: Vec<String>) {
        self.lock().players = players;
    }

    pub fn set_threat(&self, threat: ThreatReport) {
        self.lock().threat = threat;
    }

    /// 接下来 n 次移动类动作报告寻路超时
    pub fn fail_pathfinding(&self, n: u32) {
        self.lock().pathfind_failures = n;
    }

    pub fn chat_log(&self) -> Vec<String> {
        self.lock().chat_log.clone()
    }

    pub fn crops(&self, name: &str) -> u32 {
        self.lock().crops.get(name).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Perception for SimWorld {
    async fn scan_blocks(&self) -> WorldResult<BTreeMap<String, Coord>> {
        Ok(self.lock().blocks.clone())
    }

    async fn scan_mobs(&self) -> WorldResult<Vec<MobSighting>> {
        Ok(self.lock().mobs.clone())
    }

    async fn scan_inventory(&self) -> WorldResult<Vec<String>> {
        Ok(self
            .lock()
            .inventory
            .iter()
            .map(|(item, n)| format!("{item}:{n}"))
            .collect())
    }

    async fn check_threat(&self) -> WorldResult<ThreatReport> {
        Ok(self.lock().threat.clone())
    }

    async fn scan_players(&self) -> WorldResult<Vec<String>> {
        Ok(self.lock().players.clone())
    }

    async fn scan_vitals(&self) -> WorldResult<Vitals> {
        Ok(self.lock().vitals.clone())
    }
}

#[async_trait]
impl Actions for SimWorld {
    async fn mine(&self, block: &str, count: u32) -> WorldResult<String> {
        self.pause().await;
        let mut w = self.lock();
        w.pathfind(block)?;
        if !w.blocks.contains_key(block) {
            return Err(ActionError::failed(format!("no {block} nearby")));
        }
        let (drop, tool) = match self.book.mining_source(block) {
            Some(source) => (source.drop.clone(), source.tool.clone()),
            None => (block.to_string(), None),
        };
        if let Some(tool) = tool {
            if w.count(&tool) == 0 {
                return Err(ActionError::failed(format!("need a {tool} to mine {block}")));
            }
        }
        w.add(&drop, count);
        Ok(format!("mined {count} {block}, got {count} {drop}"))
    }

    async fn craft(&self, item: &str, amount: u32) -> WorldResult<String> {
        self.pause().await;
        let recipe = self
            .book
            .recipe_for(item)
            .ok_or_else(|| ActionError::failed(format!("no recipe for {item}")))?;
        let mut w = self.lock();
        if recipe.requires_table() && !w.has_station(CRAFTING_TABLE) {
            return Err(ActionError::failed(format!(
                "crafting {item} needs a {CRAFTING_TABLE} nearby"
            )));
        }
        let batches = amount.max(1).div_ceil(recipe.count());
        let needs: BTreeMap<String, u32> = recipe
            .ingredients()
            .into_iter()
            .map(|(ing, n)| (ing, n.saturating_mul(batches)))
            .collect();
        if let Some(detail) = w.shortfall(&needs) {
            return Err(ActionError::MissingIngredients {
                item: item.to_string(),
                detail,
            });
        }
        for (ing, n) in &needs {
            w.take(ing, *n);
        }
        let produced = batches.saturating_mul(recipe.count());
        w.add(item, produced);
        Ok(format!("crafted {produced} {item}"))
    }

    async fn place(&self, block_type: &str) -> WorldResult<String> {
        self.pause().await;
        let mut w = self.lock();
        if !w.take(block_type, 1) {
            return Err(ActionError::failed(format!("no {block_type} in inventory")));
        }
        let at = w.vitals.position;
        let placed = Coord::new(at.x + 1, at.y, at.z);
        w.blocks.insert(block_type.to_string(), placed);
        Ok(format!("placed {block_type} at {placed}"))
    }

    async fn attack(&self, mob_type: &str) -> WorldResult<String> {
        self.pause().await;
        let mut w = self.lock();
        w.pathfind(mob_type)?;
        let Some(pos) = w.mobs.iter().position(|m| m.name == mob_type) else {
            return Err(ActionError::failed(format!("no {mob_type} nearby")));
        };
        w.mobs.remove(pos);
        if w.threat.attacker.as_deref() == Some(mob_type) {
            w.threat = ThreatReport::calm();
        }
        Ok(format!("killed {mob_type}"))
    }

    async fn smelt(&self, input_item: &str, output_item: &str, quantity: u32) -> WorldResult<String> {
        self.pause().await;
        let recipe = self
            .book
            .smelting_for(output_item)
            .filter(|s| s.input == input_item)
            .ok_or_else(|| {
                ActionError::failed(format!("{input_item} does not smelt into {output_item}"))
            })?;
        let mut w = self.lock();
        if !w.has_station(FURNACE) {
            return Err(ActionError::MissingIngredients {
                item: FURNACE.to_string(),
                detail: format!("smelting needs a {FURNACE}"),
            });
        }
        let mut needs = BTreeMap::new();
        needs.insert(input_item.to_string(), quantity);
        *needs.entry(recipe.fuel.clone()).or_insert(0) += quantity.div_ceil(8);
        if let Some(detail) = w.shortfall(&needs) {
            return Err(ActionError::MissingIngredients {
                item: output_item.to_string(),
                detail,
            });
        }
        for (item, n) in &needs {
            w.take(item, *n);
        }
        w.add(output_item, quantity);
        Ok(format!("smelted {quantity} {input_item} into {output_item}"))
    }

    async fn plant_crop(&self, name: &str) -> WorldResult<String> {
        self.pause().await;
        let mut w = self.lock();
        w.pathfind("farmland")?;
        let seeds = format!("{name}_seeds");
        if !w.take(&seeds, 1) && !w.take(name, 1) {
            return Err(ActionError::MissingIngredients {
                item: seeds,
                detail: format!("nothing to plant for {name}"),
            });
        }
        *w.crops.entry(name.to_string()).or_insert(0) += 1;
        Ok(format!("planted {name}"))
    }

    async fn harvest_crop(&self, name: &str, count: Option<u32>) -> WorldResult<String> {
        self.pause().await;
        let mut w = self.lock();
        w.pathfind(name)?;
        let grown = w.crops.get(name).copied().unwrap_or(0);
        let n = count.unwrap_or(grown);
        if grown == 0 || n > grown {
            return Err(ActionError::failed(format!(
                "only {grown} {name} ready to harvest"
            )));
        }
        w.crops.insert(name.to_string(), grown - n);
        w.add(name, n);
        Ok(format!("harvested {n} {name}"))
    }

    async fn sort_inventory(&self) -> WorldResult<String> {
        let w = self.lock();
        Ok(format!("inventory sorted ({} stacks)", w.inventory.len()))
    }

    async fn place_chest(&self) -> WorldResult<String> {
        self.pause().await;
        let mut w = self.lock();
        if w.chest.is_some() {
            return Ok("a chest is already placed".to_string());
        }
        if !w.take("chest", 1) {
            return Err(ActionError::MissingIngredients {
                item: "chest".to_string(),
                detail: "no chest in inventory".to_string(),
            });
        }
        w.chest = Some(BTreeMap::new());
        Ok("placed chest".to_string())
    }

    async fn store_item_in_chest(&self, item: &str, count: u32) -> WorldResult<String> {
        self.pause().await;
        let mut w = self.lock();
        w.pathfind("chest")?;
        if w.chest.is_none() {
            return Err(ActionError::failed("no chest placed"));
        }
        if !w.take(item, count) {
            return Err(ActionError::failed(format!("not enough {item} to store")));
        }
        if let Some(chest) = w.chest.as_mut() {
            *chest.entry(item.to_string()).or_insert(0) += count;
        }
        Ok(format!("stored {count} {item}"))
    }

    async fn retrieve_item_from_chest(&self, item: &str, count: u32) -> WorldResult<String> {
        self.pause().await;
        let mut w = self.lock();
        w.pathfind("chest")?;
        let Some(chest) = w.chest.as_mut() else {
            return Err(ActionError::failed("no chest placed"));
        };
        let have = chest.get(item).copied().unwrap_or(0);
        if have < count {
            return Err(ActionError::failed(format!(
                "chest has only {have} {item}"
            )));
        }
        chest.insert(item.to_string(), have - count);
        w.add(item, count);
        Ok(format!("retrieved {count} {item}"))
    }

    async fn chat(&self, text: &str) -> WorldResult<String> {
        self.lock().chat_log.push(text.to_string());
        Ok(format!("said: {text}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mining_requires_tool() {
        let world = SimWorld::standard();
        let err = world.mine("stone", 3).await.unwrap_err();
        assert!(err.to_string().contains("wooden_pickaxe"));
        world.give("wooden_pickaxe", 1);
        world.mine("stone", 3).await.unwrap();
        assert_eq!(world.count("cobblestone"), 3);
    }

    #[tokio::test]
    async fn test_wooden_pickaxe_chain() {
        let world = SimWorld::standard();
        world.mine("oak_log", 3).await.unwrap();
        world.craft("oak_planks", 12).await.unwrap();
        world.craft("stick", 4).await.unwrap();
        let err = world.craft("wooden_pickaxe", 1).await.unwrap_err();
        assert!(err.to_string().contains(CRAFTING_TABLE));
        world.craft(CRAFTING_TABLE, 1).await.unwrap();
        world.craft("wooden_pickaxe", 1).await.unwrap();
        assert_eq!(world.count("wooden_pickaxe"), 1);
        assert_eq!(world.count("oak_planks"), 3);
    }

    #[tokio::test]
    async fn test_missing_ingredients_is_typed() {
        let world = SimWorld::standard();
        world.give("oak_planks", 1);
        let err = world.craft("stick", 4).await.unwrap_err();
        assert_eq!(err.missing_item(), Some("stick"));
        assert_eq!(world.count("oak_planks"), 1);
    }

    #[tokio::test]
    async fn test_huge_craft_amount_reports_shortfall() {
        let world = SimWorld::standard();
        world.give(CRAFTING_TABLE, 1);
        world.give("oak_planks", 8);
        let err = world.craft("chest", u32::MAX).await.unwrap_err();
        assert_eq!(err.missing_item(), Some("chest"));
        assert_eq!(world.count("oak_planks"), 8);
        world.give("oak_planks", u32::MAX);
        assert_eq!(world.count("oak_planks"), u32::MAX);
    }

    #[tokio::test]
    async fn test_chest_round_trip() {
        let world = SimWorld::standard();
        world.give("chest", 1);
        world.give("torch", 8);
        world.place_chest().await.unwrap();
        world.store_item_in_chest("torch", 5).await.unwrap();
        assert_eq!(world.count("torch"), 3);
        assert!(world.retrieve_item_from_chest("torch", 6).await.is_err());
        world.retrieve_item_from_chest("torch", 5).await.unwrap();
        assert_eq!(world.count("torch"), 8);
    }

    #[tokio::test]
    async fn test_attack_clears_threat() {
        let world = SimWorld::standard();
        world.set_mobs(vec![MobSighting { name: "zombie".into(), distance: 2.0 }]);
        world.set_threat(ThreatReport::attacked_by("zombie", "a zombie is hitting you"));
        world.attack("zombie").await.unwrap();
        assert!(!world.check_threat().await.unwrap().under_attack);
    }

    #[tokio::test]
    async fn test_crops() {
        let world = SimWorld::standard();
        world.give("wheat_seeds", 2);
        world.plant_crop("wheat").await.unwrap();
        world.plant_crop("wheat").await.unwrap();
        assert!(world.harvest_crop("wheat", Some(3)).await.is_err());
        world.harvest_crop("wheat", None).await.unwrap();
        assert_eq!(world.count("wheat"), 2);
        assert_eq!(world.crops("wheat"), 0);
    }
}
