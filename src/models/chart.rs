use serde::{Deserialize, Serialize};
use std::fmt;

/// 谱面难度 (PST, PRS, FTR, BYD)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Difficulty {
    Past = 0,
    Present = 1,
    Future = 2,
    Beyond = 3,
}

impl Difficulty {
    pub fn short_name(self) -> &'static str {
        match self {
            Difficulty::Past => "PST",
            Difficulty::Present => "PRS",
            Difficulty::Future => "FTR",
            Difficulty::Beyond => "BYD",
        }
    }
}

impl TryFrom<u8> for Difficulty {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Difficulty::Past),
            1 => Ok(Difficulty::Present),
            2 => Ok(Difficulty::Future),
            3 => Ok(Difficulty::Beyond),
            other => Err(format!("未知的难度: {other}")),
        }
    }
}

impl TryFrom<i64> for Difficulty {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .map_err(|_| format!("未知的难度: {value}"))
            .and_then(Difficulty::try_from)
    }
}

impl From<Difficulty> for u8 {
    fn from(value: Difficulty) -> Self {
        value as u8
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// 谱面标识：歌曲ID + 难度
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChartId {
    pub song_id: String,
    pub difficulty: Difficulty,
}

impl ChartId {
    pub fn new(song_id: impl Into<String>, difficulty: Difficulty) -> Self {
        Self {
            song_id: song_id.into(),
            difficulty,
        }
    }
}

impl fmt::Display for ChartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.song_id, self.difficulty)
    }
}

/// 谱面定数信息，对应 chart_info 表及导入用的 CSV 行
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartInfo {
    pub song_id: String,
    pub difficulty: Difficulty,
    /// 谱面定数，0 表示尚未定级
    pub rating: f64,
}

impl ChartInfo {
    pub fn chart_id(&self) -> ChartId {
        ChartId::new(self.song_id.clone(), self.difficulty)
    }
}
