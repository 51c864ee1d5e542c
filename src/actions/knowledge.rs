//! 静态知识：配方书
//!
//! 外部游戏数据的配方记录形状不一，只在边界处转成带标签的 `Recipe`（有序 / 无序）；
//! 核心逻辑只看到类型化数据。`feasibility` 在配方依赖图上做带记忆的深度优先搜索，
//! 用 visiting 集合检测环，返回结构化结果，从不修改调用方的背包。

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// 需要工作台的合成、需要熔炉的冶炼
pub const CRAFTING_TABLE: &str = "crafting_table";
pub const FURNACE: &str = "furnace";

/// 每份燃料可冶炼的物品数
const ITEMS_PER_FUEL: u32 = 8;
const MAX_WALK_DEPTH: usize = 32;

/// 合成配方
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum Recipe {
    /// 有序：pattern 每行一个字符串，key 把符号映射到物品，空格为空位
    Shaped {
        result: String,
        count: u32,
        pattern: Vec<String>,
        key: BTreeMap<String, String>,
    },
    /// 无序：原料列表（重复即多份）
    Shapeless {
        result: String,
        count: u32,
        ingredients: Vec<String>,
    },
}

impl Recipe {
    pub fn result(&self) -> &str {
        match self {
            Self::Shaped { result, .. } | Self::Shapeless { result, .. } => result,
        }
    }

    /// 每次合成的产量
    pub fn count(&self) -> u32 {
        match self {
            Self::Shaped { count, .. } | Self::Shapeless { count, .. } => (*count).max(1),
        }
    }

    /// 每次合成消耗的原料
    pub fn ingredients(&self) -> BTreeMap<String, u32> {
        let mut out = BTreeMap::new();
        match self {
            Self::Shaped { pattern, key, .. } => {
                for symbol in pattern.iter().flat_map(|row| row.chars()).filter(|c| *c != ' ') {
                    if let Some(item) = key.get(&symbol.to_string()) {
                        *out.entry(item.clone()).or_insert(0) += 1;
                    }
                }
            }
            Self::Shapeless { ingredients, .. } => {
                for item in ingredients {
                    *out.entry(item.clone()).or_insert(0) += 1;
                }
            }
        }
        out
    }

    /// 超过 2x2 背包格的有序配方需要工作台
    pub fn requires_table(&self) -> bool {
        match self {
            Self::Shaped { pattern, .. } => {
                pattern.len() > 2 || pattern.iter().any(|row| row.chars().count() > 2)
            }
            Self::Shapeless { ingredients, .. } => ingredients.len() > 4,
        }
    }
}

/// 冶炼：input → output，消耗 fuel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmeltingRecipe {
    pub input: String,
    pub output: String,
    pub fuel: String,
}

/// 挖掘来源：挖 block 掉落 drop，可能需要工具
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiningSource {
    pub block: String,
    pub drop: String,
    pub tool: Option<String>,
}

/// 可行性分析结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Feasibility {
    pub item: String,
    pub count: u32,
    pub satisfied: bool,
    /// 无法获得的物品及数量
    pub missing: BTreeMap<String, u32>,
    /// 按执行顺序排列的原语签名
    pub steps: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Mine(usize),
    Smelt(usize),
    Craft(usize),
}

/// 一次分析的工作区：本地背包副本、路线记忆、环检测集合
struct Walk<'a> {
    initial: &'a BTreeMap<String, u32>,
    inventory: BTreeMap<String, u32>,
    memo: HashMap<String, Option<Route>>,
    visiting: HashSet<String>,
    missing: BTreeMap<String, u32>,
    steps: Vec<String>,
}

/// 配方书
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecipeBook {
    recipes: Vec<Recipe>,
    smelting: Vec<SmeltingRecipe>,
    mining: Vec<MiningSource>,
}

impl RecipeBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_recipe(&mut self, recipe: Recipe) -> &mut Self {
        self.recipes.push(recipe);
        self
    }

    pub fn add_smelting(&mut self, input: &str, output: &str, fuel: &str) -> &mut Self {
        self.smelting.push(SmeltingRecipe {
            input: input.to_string(),
            output: output.to_string(),
            fuel: fuel.to_string(),
        });
        self
    }

    pub fn add_mining(&mut self, block: &str, drop: &str, tool: Option<&str>) -> &mut Self {
        self.mining.push(MiningSource {
            block: block.to_string(),
            drop: drop.to_string(),
            tool: tool.map(String::from),
        });
        self
    }

    /// 从外部 JSON 记录构建（形状不符的记录在这里就报错）
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn recipe_for(&self, item: &str) -> Option<&Recipe> {
        self.recipes.iter().find(|r| r.result() == item)
    }

    pub fn smelting_for(&self, output: &str) -> Option<&SmeltingRecipe> {
        self.smelting.iter().find(|s| s.output == output)
    }

    /// 挖 block 的掉落规则
    pub fn mining_source(&self, block: &str) -> Option<&MiningSource> {
        self.mining.iter().find(|m| m.block == block)
    }

    pub fn knows(&self, item: &str) -> bool {
        self.recipe_for(item).is_some()
            || self.smelting_for(item).is_some()
            || self.mining.iter().any(|m| m.drop == item)
    }

    /// 获取 count 个 item 的可行性（不修改 inventory）
    pub fn feasibility(&self, item: &str, count: u32, inventory: &BTreeMap<String, u32>) -> Feasibility {
        let mut walk = Walk {
            initial: inventory,
            inventory: inventory.clone(),
            memo: HashMap::new(),
            visiting: HashSet::new(),
            missing: BTreeMap::new(),
            steps: Vec::new(),
        };
        self.acquire(item, count, &mut walk, 0);
        Feasibility {
            item: item.to_string(),
            count,
            satisfied: walk.missing.is_empty(),
            missing: walk.missing,
            steps: walk.steps,
        }
    }

    /// 缺材料诊断后附加的获取提示；配方书完全不认识该物品时返回 None
    pub fn hint_for(&self, item: &str, inventory: &BTreeMap<String, u32>) -> Option<String> {
        if !self.knows(item) {
            return None;
        }
        let mut hint = format!("Hint: {}.", self.describe_source(item));
        let plan = self.feasibility(item, 1, inventory);
        if !plan.steps.is_empty() {
            hint.push_str(&format!(
                " Plan from current inventory: {}.",
                plan.steps.join(" -> ")
            ));
        }
        if !plan.satisfied {
            let missing: Vec<String> = plan
                .missing
                .iter()
                .map(|(k, v)| format!("{k}:{v}"))
                .collect();
            hint.push_str(&format!(" Cannot obtain: {}.", missing.join(", ")));
        }
        Some(hint)
    }

    fn describe_source(&self, item: &str) -> String {
        if let Some(recipe) = self.recipe_for(item) {
            let parts: Vec<String> = recipe
                .ingredients()
                .iter()
                .map(|(k, v)| format!("{v} {k}"))
                .collect();
            let table = if recipe.requires_table() {
                ", needs a crafting_table"
            } else {
                ""
            };
            return format!(
                "{item} is crafted from {} (makes {}{table})",
                parts.join(" + "),
                recipe.count()
            );
        }
        if let Some(s) = self.smelting_for(item) {
            return format!("{item} is smelted from {} in a furnace, fuel {}", s.input, s.fuel);
        }
        match self.mining.iter().find(|m| m.drop == item) {
            Some(m) => match &m.tool {
                Some(tool) => format!("{item} is mined from {} with a {tool}", m.block),
                None => format!("{item} is mined from {}", m.block),
            },
            None => format!("{item} has no known source"),
        }
    }

    /// 候选路线，按偏好：挖掘 → 冶炼 → 合成
    fn candidates(&self, item: &str) -> Vec<Route> {
        let mine = self
            .mining
            .iter()
            .enumerate()
            .filter(|(_, m)| m.drop == item)
            .map(|(i, _)| Route::Mine(i));
        let smelt = self
            .smelting
            .iter()
            .enumerate()
            .filter(|(_, s)| s.output == item)
            .map(|(i, _)| Route::Smelt(i));
        let craft = self
            .recipes
            .iter()
            .enumerate()
            .filter(|(_, r)| r.result() == item)
            .map(|(i, _)| Route::Craft(i));
        mine.chain(smelt).chain(craft).collect()
    }

    fn dependencies(&self, route: Route) -> Vec<String> {
        match route {
            Route::Mine(i) => self.mining[i].tool.iter().cloned().collect(),
            Route::Smelt(i) => {
                let s = &self.smelting[i];
                vec![s.input.clone(), s.fuel.clone(), FURNACE.to_string()]
            }
            Route::Craft(i) => {
                let recipe = &self.recipes[i];
                let mut deps: Vec<String> = recipe.ingredients().into_keys().collect();
                if recipe.requires_table() {
                    deps.push(CRAFTING_TABLE.to_string());
                }
                deps
            }
        }
    }

    /// 选出 item 的获取路线；第二个返回值表示结论受到了环截断的影响（此时不记忆否定结论）
    fn route_of(&self, item: &str, walk: &mut Walk<'_>) -> (Option<Route>, bool) {
        if let Some(route) = walk.memo.get(item) {
            return (*route, false);
        }
        if walk.visiting.contains(item) {
            return (None, true);
        }
        walk.visiting.insert(item.to_string());
        let mut cut = false;
        let mut found = None;
        for candidate in self.candidates(item) {
            let mut ok = true;
            for dep in self.dependencies(candidate) {
                if walk.initial.get(&dep).copied().unwrap_or(0) > 0 {
                    continue;
                }
                let (route, dep_cut) = self.route_of(&dep, walk);
                cut |= dep_cut;
                if route.is_none() {
                    ok = false;
                    break;
                }
            }
            if ok {
                found = Some(candidate);
                break;
            }
        }
        walk.visiting.remove(item);
        if found.is_some() || !cut {
            walk.memo.insert(item.to_string(), found);
        }
        (found, cut && found.is_none())
    }

    /// 获取并消耗 need 个 item：先用本地背包，不足部分按路线补齐，记录步骤
    fn acquire(&self, item: &str, need: u32, walk: &mut Walk<'_>, depth: usize) {
        if need == 0 {
            return;
        }
        let have = walk.inventory.get(item).copied().unwrap_or(0);
        let take = have.min(need);
        if take > 0 {
            walk.inventory.insert(item.to_string(), have - take);
        }
        let remaining = need - take;
        if remaining == 0 {
            return;
        }
        let route = if depth > MAX_WALK_DEPTH {
            None
        } else {
            self.route_of(item, walk).0
        };

        match route {
            None => {
                let missing = walk.missing.entry(item.to_string()).or_insert(0);
                *missing = missing.saturating_add(remaining);
            }
            Some(Route::Mine(i)) => {
                let source = &self.mining[i];
                if let Some(tool) = &source.tool {
                    self.ensure_present(tool, walk, depth + 1);
                }
                walk.steps.push(format!("mine({}, {})", source.block, remaining));
            }
            Some(Route::Smelt(i)) => {
                let s = &self.smelting[i];
                self.acquire(&s.input, remaining, walk, depth + 1);
                self.acquire(&s.fuel, remaining.div_ceil(ITEMS_PER_FUEL), walk, depth + 1);
                self.ensure_present(FURNACE, walk, depth + 1);
                walk.steps
                    .push(format!("smelt({}, {}, {})", s.input, s.output, remaining));
            }
            Some(Route::Craft(i)) => {
                let recipe = &self.recipes[i];
                let batches = remaining.div_ceil(recipe.count());
                for (ingredient, n) in recipe.ingredients() {
                    self.acquire(&ingredient, n.saturating_mul(batches), walk, depth + 1);
                }
                if recipe.requires_table() {
                    self.ensure_present(CRAFTING_TABLE, walk, depth + 1);
                }
                let produced = batches.saturating_mul(recipe.count());
                walk.steps.push(format!("craft({}, {})", item, produced));
                let leftover = walk.inventory.entry(item.to_string()).or_insert(0);
                *leftover = leftover.saturating_add(produced.saturating_sub(remaining));
            }
        }
    }

    /// 工具 / 工作站：需要有一个，但不消耗
    fn ensure_present(&self, item: &str, walk: &mut Walk<'_>, depth: usize) {
        if walk.inventory.get(item).copied().unwrap_or(0) > 0 {
            return;
        }
        self.acquire(item, 1, walk, depth);
        let slot = walk.inventory.entry(item.to_string()).or_insert(0);
        *slot = slot.saturating_add(1);
    }

    /// 木制 / 石制工具链、工作台、熔炉、火把、铁锭
    pub fn standard() -> Self {
        let mut book = Self::new();
        book.add_mining("oak_log", "oak_log", None)
            .add_mining("dirt", "dirt", None)
            .add_mining("stone", "cobblestone", Some("wooden_pickaxe"))
            .add_mining("cobblestone", "cobblestone", Some("wooden_pickaxe"))
            .add_mining("coal_ore", "coal", Some("wooden_pickaxe"))
            .add_mining("iron_ore", "raw_iron", Some("stone_pickaxe"))
            .add_smelting("raw_iron", "iron_ingot", "coal");

        let shaped = |result: &str, count: u32, pattern: &[&str], key: &[(&str, &str)]| Recipe::Shaped {
            result: result.to_string(),
            count,
            pattern: pattern.iter().map(|r| r.to_string()).collect(),
            key: key.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        };
        let shapeless = |result: &str, count: u32, ingredients: &[&str]| Recipe::Shapeless {
            result: result.to_string(),
            count,
            ingredients: ingredients.iter().map(|i| i.to_string()).collect(),
        };

        book.add_recipe(shapeless("oak_planks", 4, &["oak_log"]))
            .add_recipe(shaped("stick", 4, &["P", "P"], &[("P", "oak_planks")]))
            .add_recipe(shaped(CRAFTING_TABLE, 1, &["PP", "PP"], &[("P", "oak_planks")]))
            .add_recipe(shaped(
                "wooden_pickaxe",
                1,
                &["PPP", " S ", " S "],
                &[("P", "oak_planks"), ("S", "stick")],
            ))
            .add_recipe(shaped(
                "wooden_sword",
                1,
                &["P", "P", "S"],
                &[("P", "oak_planks"), ("S", "stick")],
            ))
            .add_recipe(shaped(
                "stone_pickaxe",
                1,
                &["CCC", " S ", " S "],
                &[("C", "cobblestone"), ("S", "stick")],
            ))
            .add_recipe(shaped(
                "iron_pickaxe",
                1,
                &["III", " S ", " S "],
                &[("I", "iron_ingot"), ("S", "stick")],
            ))
            .add_recipe(shaped(FURNACE, 1, &["CCC", "C C", "CCC"], &[("C", "cobblestone")]))
            .add_recipe(shaped("chest", 1, &["PPP", "P P", "PPP"], &[("P", "oak_planks")]))
            .add_recipe(shaped("torch", 4, &["C", "S"], &[("C", "coal"), ("S", "stick")]))
            .add_recipe(shapeless("iron_block", 1, &["iron_ingot"; 9]))
            .add_recipe(shapeless("iron_ingot", 9, &["iron_block"]));
        book
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inv(items: &[(&str, u32)]) -> BTreeMap<String, u32> {
        items.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_shaped_ingredients_and_table() {
        let book = RecipeBook::standard();
        let pickaxe = book.recipe_for("wooden_pickaxe").unwrap();
        assert_eq!(pickaxe.ingredients(), inv(&[("oak_planks", 3), ("stick", 2)]));
        assert!(pickaxe.requires_table());
        assert!(!book.recipe_for("stick").unwrap().requires_table());
    }

    #[test]
    fn test_wooden_pickaxe_from_scratch() {
        let book = RecipeBook::standard();
        let empty = BTreeMap::new();
        let plan = book.feasibility("wooden_pickaxe", 1, &empty);
        assert!(plan.satisfied, "{plan:?}");
        assert_eq!(plan.steps.last().map(String::as_str), Some("craft(wooden_pickaxe, 1)"));
        assert!(plan.steps.iter().any(|s| s == "craft(crafting_table, 1)"));
        assert!(plan.steps.iter().any(|s| s.starts_with("mine(oak_log")));
        assert!(empty.is_empty());
    }

    #[test]
    fn test_inventory_shortcuts_steps() {
        let book = RecipeBook::standard();
        let have = inv(&[("oak_planks", 8), (CRAFTING_TABLE, 1)]);
        let plan = book.feasibility("wooden_pickaxe", 1, &have);
        assert!(plan.satisfied);
        assert_eq!(plan.steps, vec!["craft(stick, 4)", "craft(wooden_pickaxe, 1)"]);
        assert_eq!(have.get("oak_planks"), Some(&8));
    }

    #[test]
    fn test_huge_count_saturates() {
        let book = RecipeBook::standard();
        let plan = book.feasibility("chest", u32::MAX, &BTreeMap::new());
        assert!(plan.satisfied, "{plan:?}");
        assert_eq!(plan.steps.last().map(String::as_str), Some("craft(chest, 4294967295)"));
        assert!(plan.steps.iter().any(|s| s == "craft(oak_planks, 4294967295)"));
        assert!(book.hint_for("chest", &BTreeMap::new()).is_some());
    }

    #[test]
    fn test_iron_ingot_prefers_smelting() {
        let book = RecipeBook::standard();
        let have = inv(&[("stone_pickaxe", 1), (FURNACE, 1), ("coal", 1)]);
        let plan = book.feasibility("iron_ingot", 2, &have);
        assert!(plan.satisfied);
        assert_eq!(plan.steps, vec!["mine(iron_ore, 2)", "smelt(raw_iron, iron_ingot, 2)"]);
    }

    #[test]
    fn test_unknown_item_is_missing() {
        let book = RecipeBook::standard();
        let plan = book.feasibility("diamond", 3, &BTreeMap::new());
        assert!(!plan.satisfied);
        assert_eq!(plan.missing.get("diamond"), Some(&3));
        assert!(book.hint_for("diamond", &BTreeMap::new()).is_none());
    }

    #[test]
    fn test_cycle_terminates() {
        let mut book = RecipeBook::new();
        book.add_recipe(Recipe::Shapeless {
            result: "a".into(),
            count: 1,
            ingredients: vec!["b".into()],
        })
        .add_recipe(Recipe::Shapeless {
            result: "b".into(),
            count: 1,
            ingredients: vec!["a".into()],
        });
        let plan = book.feasibility("a", 1, &BTreeMap::new());
        assert!(!plan.satisfied);
        assert_eq!(plan.missing.get("a"), Some(&1));
    }

    #[test]
    fn test_hint_mentions_recipe_and_plan() {
        let book = RecipeBook::standard();
        let hint = book.hint_for("stick", &inv(&[("oak_planks", 2)])).unwrap();
        assert!(hint.contains("2 oak_planks"));
        assert!(hint.contains("craft(stick, 4)"));
        assert!(!hint.contains("Cannot obtain"));
    }

    #[test]
    fn test_from_json_tagged_shapes() {
        let raw = r#"{
            "recipes": [{"shape": "shapeless", "result": "oak_planks", "count": 4, "ingredients": ["oak_log"]}],
            "smelting": [],
            "mining": [{"block": "oak_log", "drop": "oak_log", "tool": null}]
        }"#;
        let book = RecipeBook::from_json(raw).unwrap();
        assert!(book.feasibility("oak_planks", 4, &BTreeMap::new()).satisfied);
        assert!(RecipeBook::from_json(r#"{"recipes": [{"shape": "round"}], "smelting": [], "mining": []}"#).is_err());
    }
}
