//! 原语菜单：封闭的行动集合
//!
//! - `Primitive`：12 个原语名（线上名为 camelCase）、描述与参数 JSON Schema（schemars 生成）
//! - `PrimitiveCall`：已解析、类型化的一次调用；来源有两种：
//!   调度循环中的 JSON 参数（`parse`），以及目标分解中推理器给出的紧凑签名（`parse_signature`，如 `mine(oak_log, 5)`）

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::core::AgentError;
use crate::llm::ToolSpec;
use crate::world::{Actions, WorldResult};

/// 原语名
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Mine,
    Craft,
    Place,
    Attack,
    Smelt,
    PlantCrop,
    HarvestCrop,
    SortInventory,
    PlaceChest,
    StoreItemInChest,
    RetrieveItemFromChest,
    Chat,
}

impl Primitive {
    pub const ALL: [Primitive; 12] = [
        Primitive::Mine,
        Primitive::Craft,
        Primitive::Place,
        Primitive::Attack,
        Primitive::Smelt,
        Primitive::PlantCrop,
        Primitive::HarvestCrop,
        Primitive::SortInventory,
        Primitive::PlaceChest,
        Primitive::StoreItemInChest,
        Primitive::RetrieveItemFromChest,
        Primitive::Chat,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Mine => "mine",
            Self::Craft => "craft",
            Self::Place => "place",
            Self::Attack => "attack",
            Self::Smelt => "smelt",
            Self::PlantCrop => "plantCrop",
            Self::HarvestCrop => "harvestCrop",
            Self::SortInventory => "sortInventory",
            Self::PlaceChest => "placeChest",
            Self::StoreItemInChest => "storeItemInChest",
            Self::RetrieveItemFromChest => "retrieveItemFromChest",
            Self::Chat => "chat",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name.trim())
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Mine => "Walk to the nearest block of the given type and mine it `count` times.",
            Self::Craft => "Craft `amount` of an item, using a nearby crafting table when the recipe needs one.",
            Self::Place => "Place one block of the given type next to the agent.",
            Self::Attack => "Attack the nearest mob of the given type until it dies.",
            Self::Smelt => "Smelt `quantity` of an input item into the output item in a nearby furnace.",
            Self::PlantCrop => "Plant a crop on the nearest free farmland.",
            Self::HarvestCrop => "Harvest grown crops of the given type; count is a number or \"all\".",
            Self::SortInventory => "Tidy the inventory, merging partial stacks.",
            Self::PlaceChest => "Place a chest next to the agent.",
            Self::StoreItemInChest => "Put `count` of an item into the nearest chest.",
            Self::RetrieveItemFromChest => "Take `count` of an item out of the nearest chest.",
            Self::Chat => "Say something in the public chat.",
        }
    }

    /// 参数 JSON Schema
    pub fn parameters(self) -> serde_json::Value {
        let schema = match self {
            Self::Mine => schema_for!(MineArgs),
            Self::Craft => schema_for!(CraftArgs),
            Self::Place => schema_for!(PlaceArgs),
            Self::Attack => schema_for!(AttackArgs),
            Self::Smelt => schema_for!(SmeltArgs),
            Self::PlantCrop => schema_for!(PlantCropArgs),
            Self::HarvestCrop => schema_for!(HarvestCropArgs),
            Self::SortInventory | Self::PlaceChest => schema_for!(NoArgs),
            Self::StoreItemInChest | Self::RetrieveItemFromChest => schema_for!(ChestItemArgs),
            Self::Chat => schema_for!(ChatArgs),
        };
        serde_json::to_value(schema).unwrap_or_else(|_| serde_json::json!({"type": "object"}))
    }

    /// 紧凑签名中的位置参数个数上限；chat 的整段文本算一个参数（可含逗号）
    pub fn arity(self) -> usize {
        match self {
            Self::SortInventory | Self::PlaceChest => 0,
            Self::Place | Self::Attack | Self::PlantCrop | Self::Chat => 1,
            Self::Mine | Self::Craft | Self::HarvestCrop | Self::StoreItemInChest | Self::RetrieveItemFromChest => 2,
            Self::Smelt => 3,
        }
    }

    /// 需要寻路 / 移动的原语：执行超时按寻路超时处理
    pub fn is_movement(self) -> bool {
        matches!(
            self,
            Self::Mine
                | Self::Attack
                | Self::PlantCrop
                | Self::HarvestCrop
                | Self::StoreItemInChest
                | Self::RetrieveItemFromChest
        )
    }

    pub fn spec(self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 完整原语菜单（向推理器声明）
pub fn tool_specs() -> Vec<ToolSpec> {
    Primitive::ALL.into_iter().map(Primitive::spec).collect()
}

/// 紧凑签名菜单，供目标分解的匹配提示使用
pub fn signature_menu() -> String {
    [
        "mine(block, count)",
        "craft(item, amount)",
        "place(blockType)",
        "attack(mobType)",
        "smelt(inputItem, outputItem, quantity)",
        "plantCrop(name)",
        "harvestCrop(name, count|all)",
        "sortInventory()",
        "placeChest()",
        "storeItemInChest(item, count)",
        "retrieveItemFromChest(item, count)",
        "chat(text)",
    ]
    .join("\n")
}

fn one() -> u32 {
    1
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct MineArgs {
    /// 方块类型，如 oak_log
    block: String,
    #[serde(default = "one")]
    count: u32,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct CraftArgs {
    item: String,
    #[serde(default = "one")]
    amount: u32,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct PlaceArgs {
    block_type: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct AttackArgs {
    mob_type: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct SmeltArgs {
    input_item: String,
    output_item: String,
    #[serde(default = "one")]
    quantity: u32,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct PlantCropArgs {
    name: String,
}

/// 数量或 "all"
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(untagged)]
enum CountOrAll {
    Count(u32),
    Keyword(String),
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct HarvestCropArgs {
    name: String,
    #[serde(default)]
    count: Option<CountOrAll>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct NoArgs {}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct ChestItemArgs {
    item: String,
    #[serde(default = "one")]
    count: u32,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct ChatArgs {
    text: String,
}

/// 一次类型化的原语调用
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tool", rename_all = "camelCase")]
pub enum PrimitiveCall {
    Mine { block: String, count: u32 },
    Craft { item: String, amount: u32 },
    Place { block_type: String },
    Attack { mob_type: String },
    Smelt { input_item: String, output_item: String, quantity: u32 },
    PlantCrop { name: String },
    /// count 为 None 表示全部收获
    HarvestCrop { name: String, count: Option<u32> },
    SortInventory,
    PlaceChest,
    StoreItemInChest { item: String, count: u32 },
    RetrieveItemFromChest { item: String, count: u32 },
    Chat { text: String },
}

fn decode<T: DeserializeOwned>(tool: &str, raw: &str) -> Result<T, AgentError> {
    let raw = raw.trim();
    let raw = if raw.is_empty() { "{}" } else { raw };
    serde_json::from_str(raw).map_err(|e| AgentError::ParseError {
        tool: tool.to_string(),
        detail: e.to_string(),
    })
}

fn count_or_all(tool: &str, value: Option<CountOrAll>) -> Result<Option<u32>, AgentError> {
    match value {
        None => Ok(None),
        Some(CountOrAll::Count(n)) => Ok(Some(n)),
        Some(CountOrAll::Keyword(k)) if k.trim().eq_ignore_ascii_case("all") => Ok(None),
        Some(CountOrAll::Keyword(k)) => match k.trim().parse() {
            Ok(n) => Ok(Some(n)),
            Err(_) => Err(AgentError::ParseError {
                tool: tool.to_string(),
                detail: format!("count must be a number or \"all\", got {k:?}"),
            }),
        },
    }
}

fn signature_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*`?([A-Za-z_]+)\s*\((.*)\)`?\s*$").expect("valid signature pattern")
    })
}

/// 签名参数：去掉引号与 `key=` 前缀
fn clean_arg(arg: &str) -> String {
    let arg = arg.trim();
    let arg = match arg.split_once('=') {
        Some((key, value)) if key.trim().chars().all(|c| c.is_ascii_alphanumeric() || c == '_') => {
            value.trim()
        }
        _ => arg,
    };
    arg.trim_matches(|c| c == '"' || c == '\'').trim().to_string()
}

impl PrimitiveCall {
    /// 按原语名解析 JSON 参数；未知原语 → UnknownCapability，参数不合法 → ParseError
    pub fn parse(name: &str, raw_args: &str) -> Result<Self, AgentError> {
        let primitive = Primitive::from_name(name)
            .ok_or_else(|| AgentError::UnknownCapability(name.trim().to_string()))?;
        let tool = primitive.name();
        Ok(match primitive {
            Primitive::Mine => {
                let a: MineArgs = decode(tool, raw_args)?;
                Self::Mine { block: a.block, count: a.count }
            }
            Primitive::Craft => {
                let a: CraftArgs = decode(tool, raw_args)?;
                Self::Craft { item: a.item, amount: a.amount }
            }
            Primitive::Place => {
                let a: PlaceArgs = decode(tool, raw_args)?;
                Self::Place { block_type: a.block_type }
            }
            Primitive::Attack => {
                let a: AttackArgs = decode(tool, raw_args)?;
                Self::Attack { mob_type: a.mob_type }
            }
            Primitive::Smelt => {
                let a: SmeltArgs = decode(tool, raw_args)?;
                Self::Smelt {
                    input_item: a.input_item,
                    output_item: a.output_item,
                    quantity: a.quantity,
                }
            }
            Primitive::PlantCrop => {
                let a: PlantCropArgs = decode(tool, raw_args)?;
                Self::PlantCrop { name: a.name }
            }
            Primitive::HarvestCrop => {
                let a: HarvestCropArgs = decode(tool, raw_args)?;
                Self::HarvestCrop {
                    name: a.name,
                    count: count_or_all(tool, a.count)?,
                }
            }
            Primitive::SortInventory => {
                let _: NoArgs = decode(tool, raw_args)?;
                Self::SortInventory
            }
            Primitive::PlaceChest => {
                let _: NoArgs = decode(tool, raw_args)?;
                Self::PlaceChest
            }
            Primitive::StoreItemInChest => {
                let a: ChestItemArgs = decode(tool, raw_args)?;
                Self::StoreItemInChest { item: a.item, count: a.count }
            }
            Primitive::RetrieveItemFromChest => {
                let a: ChestItemArgs = decode(tool, raw_args)?;
                Self::RetrieveItemFromChest { item: a.item, count: a.count }
            }
            Primitive::Chat => {
                let a: ChatArgs = decode(tool, raw_args)?;
                Self::Chat { text: a.text }
            }
        })
    }

    /// 解析紧凑签名（如 `craft(stick, 4)`）；无法识别时返回 None
    pub fn parse_signature(text: &str) -> Option<Self> {
        let line = text.lines().map(str::trim).find(|l| !l.is_empty())?;
        let caps = signature_pattern().captures(line)?;
        let primitive = Primitive::from_name(&caps[1])?;
        let inner = caps[2].trim();
        let args: Vec<String> = if inner.is_empty() {
            Vec::new()
        } else {
            inner.split(',').map(clean_arg).collect()
        };
        if primitive != Primitive::Chat && args.len() > primitive.arity() {
            return None;
        }
        let text_arg = |i: usize| args.get(i).filter(|a| !a.is_empty()).cloned();
        let num_arg = |i: usize| -> Option<u32> {
            match args.get(i) {
                None => Some(1),
                Some(a) => a.parse().ok(),
            }
        };

        Some(match primitive {
            Primitive::Mine => Self::Mine { block: text_arg(0)?, count: num_arg(1)? },
            Primitive::Craft => Self::Craft { item: text_arg(0)?, amount: num_arg(1)? },
            Primitive::Place => Self::Place { block_type: text_arg(0)? },
            Primitive::Attack => Self::Attack { mob_type: text_arg(0)? },
            Primitive::Smelt => Self::Smelt {
                input_item: text_arg(0)?,
                output_item: text_arg(1)?,
                quantity: num_arg(2)?,
            },
            Primitive::PlantCrop => Self::PlantCrop { name: text_arg(0)? },
            Primitive::HarvestCrop => {
                let count = match args.get(1).map(String::as_str) {
                    None | Some("all") | Some("") => None,
                    Some(n) => Some(n.parse().ok()?),
                };
                Self::HarvestCrop { name: text_arg(0)?, count }
            }
            Primitive::SortInventory => Self::SortInventory,
            Primitive::PlaceChest => Self::PlaceChest,
            Primitive::StoreItemInChest => Self::StoreItemInChest { item: text_arg(0)?, count: num_arg(1)? },
            Primitive::RetrieveItemFromChest => {
                Self::RetrieveItemFromChest { item: text_arg(0)?, count: num_arg(1)? }
            }
            Primitive::Chat => {
                let text = clean_arg(inner);
                if text.is_empty() {
                    return None;
                }
                Self::Chat { text }
            }
        })
    }

    pub fn primitive(&self) -> Primitive {
        match self {
            Self::Mine { .. } => Primitive::Mine,
            Self::Craft { .. } => Primitive::Craft,
            Self::Place { .. } => Primitive::Place,
            Self::Attack { .. } => Primitive::Attack,
            Self::Smelt { .. } => Primitive::Smelt,
            Self::PlantCrop { .. } => Primitive::PlantCrop,
            Self::HarvestCrop { .. } => Primitive::HarvestCrop,
            Self::SortInventory => Primitive::SortInventory,
            Self::PlaceChest => Primitive::PlaceChest,
            Self::StoreItemInChest { .. } => Primitive::StoreItemInChest,
            Self::RetrieveItemFromChest { .. } => Primitive::RetrieveItemFromChest,
            Self::Chat { .. } => Primitive::Chat,
        }
    }

    /// 紧凑签名，如 `mine(oak_log, 5)`
    pub fn signature(&self) -> String {
        let name = self.primitive().name();
        match self {
            Self::Mine { block, count } => format!("{name}({block}, {count})"),
            Self::Craft { item, amount } => format!("{name}({item}, {amount})"),
            Self::Place { block_type } => format!("{name}({block_type})"),
            Self::Attack { mob_type } => format!("{name}({mob_type})"),
            Self::Smelt { input_item, output_item, quantity } => {
                format!("{name}({input_item}, {output_item}, {quantity})")
            }
            Self::PlantCrop { name: crop } => format!("{name}({crop})"),
            Self::HarvestCrop { name: crop, count } => match count {
                Some(n) => format!("{name}({crop}, {n})"),
                None => format!("{name}({crop}, all)"),
            },
            Self::SortInventory | Self::PlaceChest => format!("{name}()"),
            Self::StoreItemInChest { item, count } | Self::RetrieveItemFromChest { item, count } => {
                format!("{name}({item}, {count})")
            }
            Self::Chat { text } => format!("{name}(\"{text}\")"),
        }
    }

    /// 调用行动协作者上对应的原语
    pub async fn invoke(&self, actions: &dyn Actions) -> WorldResult<String> {
        match self {
            Self::Mine { block, count } => actions.mine(block, *count).await,
            Self::Craft { item, amount } => actions.craft(item, *amount).await,
            Self::Place { block_type } => actions.place(block_type).await,
            Self::Attack { mob_type } => actions.attack(mob_type).await,
            Self::Smelt { input_item, output_item, quantity } => {
                actions.smelt(input_item, output_item, *quantity).await
            }
            Self::PlantCrop { name } => actions.plant_crop(name).await,
            Self::HarvestCrop { name, count } => actions.harvest_crop(name, *count).await,
            Self::SortInventory => actions.sort_inventory().await,
            Self::PlaceChest => actions.place_chest().await,
            Self::StoreItemInChest { item, count } => actions.store_item_in_chest(item, *count).await,
            Self::RetrieveItemFromChest { item, count } => {
                actions.retrieve_item_from_chest(item, *count).await
            }
            Self::Chat { text } => actions.chat(text).await,
        }
    }

    /// 本调用成功后会获得的物品与数量（只有「获取 N 个 X」形状的调用才有）
    pub fn yields(&self) -> Option<(&str, u32)> {
        match self {
            Self::Mine { block, count } => Some((block, *count)),
            Self::Craft { item, amount } => Some((item, *amount)),
            Self::Smelt { output_item, quantity, .. } => Some((output_item, *quantity)),
            Self::HarvestCrop { name, count: Some(n) } => Some((name, *n)),
            Self::RetrieveItemFromChest { item, count } => Some((item, *count)),
            _ => None,
        }
    }
}

impl fmt::Display for PrimitiveCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.signature())
    }
}
