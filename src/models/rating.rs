use serde::{Deserialize, Serialize};

use crate::models::play::{ClearType, PlayRecord};
use crate::utils::error::AppResult;

/// 玩家评分的计算明细
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RatingBreakdown {
    /// Best 30 评分总和
    pub best_sum: f64,
    pub best_count: usize,
    /// Recent 10 评分总和
    pub recent_sum: f64,
    pub recent_count: usize,
    /// 最终评分（×100 取整）
    pub rating: i64,
}

impl RatingBreakdown {
    pub fn best_average(&self) -> f64 {
        if self.best_count == 0 {
            0.0
        } else {
            self.best_sum / self.best_count as f64
        }
    }

    pub fn recent_average(&self) -> f64 {
        if self.recent_count == 0 {
            0.0
        } else {
            self.recent_sum / self.recent_count as f64
        }
    }
}

/// 玩家成绩查询结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreLookup {
    pub player_id: i64,
    pub rating: i64,
    pub best_average: f64,
    pub recent_average: f64,
    /// 按评分降序排列的 Best 30
    pub best: Vec<PlayRecord>,
    /// 按评分降序排列的 Recent 10
    pub recent_10: Vec<PlayRecord>,
}

/// 最近一次游玩，附带该谱面最佳成绩的通关类型
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MostRecentPlay {
    pub play: PlayRecord,
    pub best_clear_type: Option<ClearType>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadValue {
    pub user_rating: i64,
}

/// 成绩上传的返回信封 `{ success, value: { user_rating } }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreUploadResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<UploadValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScoreUploadResult {
    pub fn from_result(result: &AppResult<i64>) -> Self {
        match result {
            Ok(rating) => Self {
                success: true,
                value: Some(UploadValue {
                    user_rating: *rating,
                }),
                error: None,
            },
            Err(e) => Self {
                success: false,
                value: None,
                error: Some(e.error_type().to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::AppError;

    #[test]
    fn upload_envelope_shape() {
        let ok = ScoreUploadResult::from_result(&Ok(1150));
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "success": true, "value": { "user_rating": 1150 } })
        );

        let failed = ScoreUploadResult::from_result(&Err(AppError::UnratedChart {
            song_id: "tempestissimo".to_string(),
            difficulty: 3,
        }));
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "success": false, "error": "unrated_chart" })
        );
    }

    #[test]
    fn averages_of_empty_breakdown_are_zero() {
        let breakdown = RatingBreakdown::default();
        assert_eq!(breakdown.best_average(), 0.0);
        assert_eq!(breakdown.recent_average(), 0.0);
    }
}
