//! 原语层：封闭的原语菜单、执行器与静态知识（配方书）

pub mod catalog;
pub mod executor;
pub mod knowledge;

pub use catalog::{signature_menu, tool_specs, Primitive, PrimitiveCall};
pub use executor::{ActionExecutor, ExecutorConfig};
pub use knowledge::{Feasibility, MiningSource, Recipe, RecipeBook, SmeltingRecipe};
