use crate::models::chart::ChartId;
use crate::utils::error::{AppError, AppResult};

/// 理论值分数线
pub const PM_SCORE: i64 = 10_000_000;
/// EX 分数线，同时用于 Recent 10 的替换判定
pub const EX_SCORE: i64 = 9_800_000;
const BASE_SCORE: i64 = 9_500_000;

/// 计算单次游玩的评分。
///
/// 定数为 0 视为未定级，直接拒绝，调用方不得产生任何状态修改。
pub fn calculate_play_rating(chart: &ChartId, base_rating: f64, score: i64) -> AppResult<f64> {
    if !base_rating.is_finite() || base_rating <= 0.0 {
        log::warn!("谱面 {chart} 定数为 {base_rating}，拒绝计算评分");
        return Err(AppError::UnratedChart {
            song_id: chart.song_id.clone(),
            difficulty: chart.difficulty.into(),
        });
    }
    let rating = play_rating(base_rating, score);
    log::debug!("谱面 {chart} 定数={base_rating:.1} 分数={score} -> 评分={rating:.4}");
    Ok(rating)
}

/// 分段线性评分公式，分界点直接比较整数分数
pub fn play_rating(base_rating: f64, score: i64) -> f64 {
    if score >= PM_SCORE {
        base_rating + 2.0
    } else if score >= EX_SCORE {
        base_rating + 1.0 + (score - EX_SCORE) as f64 / 200_000.0
    } else {
        (base_rating + (score - BASE_SCORE) as f64 / 300_000.0).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chart::Difficulty;
    use approx::assert_abs_diff_eq;

    #[test]
    fn breakpoints_are_continuous() {
        for base in [1.5, 8.0, 9.7, 10.0, 11.3] {
            assert_abs_diff_eq!(play_rating(base, EX_SCORE), base + 1.0, epsilon = 1e-12);
            assert_abs_diff_eq!(play_rating(base, EX_SCORE - 1), base + 1.0, epsilon = 1e-5);
            assert_abs_diff_eq!(play_rating(base, PM_SCORE), base + 2.0, epsilon = 1e-12);
            assert_abs_diff_eq!(play_rating(base, PM_SCORE - 1), base + 2.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn scores_above_pm_are_capped() {
        assert_eq!(play_rating(10.0, 10_001_234), 12.0);
    }

    #[test]
    fn ex_range_interpolates() {
        assert_abs_diff_eq!(play_rating(10.0, 9_900_000), 11.5, epsilon = 1e-12);
    }

    #[test]
    fn low_scores_floor_at_zero() {
        assert_eq!(play_rating(2.0, 0), 0.0);
        assert_abs_diff_eq!(play_rating(10.0, 9_500_000), 10.0, epsilon = 1e-12);
        assert_abs_diff_eq!(play_rating(10.0, 9_200_000), 9.0, epsilon = 1e-12);
    }

    #[test]
    fn monotonic_in_score() {
        let mut previous = play_rating(9.0, 0);
        for score in (0..=10_010_000).step_by(5_000) {
            let current = play_rating(9.0, score);
            assert!(current >= previous, "score {score}: {current} < {previous}");
            previous = current;
        }
    }

    #[test]
    fn unrated_chart_is_rejected() {
        let chart = ChartId::new("fractureray", Difficulty::Beyond);
        let err = calculate_play_rating(&chart, 0.0, 9_900_000).unwrap_err();
        assert!(matches!(err, AppError::UnratedChart { difficulty: 3, .. }));
    }

    #[test]
    fn non_finite_base_is_rejected() {
        let chart = ChartId::new("testify", Difficulty::Beyond);
        for base in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN, -1.0] {
            assert!(matches!(
                calculate_play_rating(&chart, base, 9_900_000),
                Err(AppError::UnratedChart { .. })
            ));
        }
    }
}
