//! 感知刷新：把感知协作者的结果整体写入共享状态
//!
//! 快循环只刷新附近生物（廉价、紧急）；慢循环刷新状态类字段，没有独立扫描 worker 时连方块一起刷新。

use crate::core::AgentState;
use crate::world::{is_hostile, MobSighting, Perception, WorldResult};

/// 快路径：只刷新生物列表，返回其中的敌对生物（按距离升序）
pub async fn refresh_hostiles(
    state: &AgentState,
    perception: &dyn Perception,
) -> WorldResult<Vec<MobSighting>> {
    let mobs = perception.scan_mobs().await?;
    let mut hostiles: Vec<MobSighting> = mobs.iter().filter(|m| is_hostile(&m.name)).cloned().collect();
    hostiles.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    state.set_mobs(mobs);
    Ok(hostiles)
}

/// 生物、背包、附近玩家、体征（不含方块扫描）
pub async fn refresh_status(state: &AgentState, perception: &dyn Perception) -> WorldResult<()> {
    let mobs = perception.scan_mobs().await?;
    let inventory = perception.scan_inventory().await?;
    let players = perception.scan_players().await?;
    let vitals = perception.scan_vitals().await?;
    state.set_mobs(mobs);
    state.set_inventory(inventory);
    state.set_players(players);
    state.set_vitals(vitals);
    Ok(())
}

/// 全量刷新：方块 + 状态
pub async fn refresh_all(state: &AgentState, perception: &dyn Perception) -> WorldResult<()> {
    let blocks = perception.scan_blocks().await?;
    state.set_blocks(blocks);
    refresh_status(state, perception).await?;
    tracing::debug!(agent = %state.name(), "perception refreshed");
    Ok(())
}
