use serde::{Deserialize, Serialize};

use crate::models::chart::ChartId;

/// 通关类型，数值与客户端上传的 clear_type 一致
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClearType {
    TrackLost = 0,
    NormalClear = 1,
    FullRecall = 2,
    PureMemory = 3,
    EasyClear = 4,
    HardClear = 5,
}

impl ClearType {
    pub fn is_hard_clear(self) -> bool {
        self == ClearType::HardClear
    }

    pub fn name(self) -> &'static str {
        match self {
            ClearType::TrackLost => "track-lost",
            ClearType::NormalClear => "normal-clear",
            ClearType::FullRecall => "full-recall",
            ClearType::PureMemory => "pure-memory",
            ClearType::EasyClear => "easy-clear",
            ClearType::HardClear => "hard-clear",
        }
    }
}

impl TryFrom<i64> for ClearType {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ClearType::TrackLost),
            1 => Ok(ClearType::NormalClear),
            2 => Ok(ClearType::FullRecall),
            3 => Ok(ClearType::PureMemory),
            4 => Ok(ClearType::EasyClear),
            5 => Ok(ClearType::HardClear),
            other => Err(format!("未知的通关类型: {other}")),
        }
    }
}

/// 判定数统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Judgements {
    pub shiny_pure: u32,
    pub pure: u32,
    pub far: u32,
    pub lost: u32,
}

/// 一次待提交的游玩结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreSubmission {
    pub chart: ChartId,
    pub score: i64,
    pub judgements: Judgements,
    pub health: i32,
    pub clear_type: ClearType,
}

/// 已入库的游玩记录，只追加不修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayRecord {
    pub play_id: i64,
    pub player_id: i64,
    pub chart: ChartId,
    /// 毫秒时间戳
    pub played_at: i64,
    pub score: i64,
    pub judgements: Judgements,
    pub health: i32,
    pub clear_type: ClearType,
    pub rating: f64,
}

impl PlayRecord {
    /// 新旧顺序键：先比较时间戳，同一毫秒内按入库顺序
    pub fn age_key(&self) -> (i64, i64) {
        (self.played_at, self.play_id)
    }
}
