//! 记忆层：短期（LRU 索引）、长期（无淘汰）、位置索引，以及调度 transcript 的消息类型

pub mod conversation;
pub mod long_term;
pub mod short_term;
pub mod store;

pub use conversation::{last_user_content, Message, Role};
pub use long_term::{LocationIndex, LongTermMemory};
pub use short_term::{AlwaysPromote, Eviction, PromotionPolicy, ShortTermMemory};
pub use store::{MemoryStore, DEFAULT_SHORT_TERM_CAPACITY};
