use crate::models::rating::RatingBreakdown;
use crate::services::best_chart::BestChartSet;
use crate::services::recent_window::RecentWindow;

/// 由 Best 集合与 Recent 10 计算玩家评分。
///
/// `rating = round((B + R) / (cB + cR) * 100)`，没有任何成绩时为 0。
/// 求和前先排序，结果只取决于集合内容而与槽位顺序无关。
pub fn compute_rating(best: &BestChartSet, window: &RecentWindow, best_count: usize) -> RatingBreakdown {
    let best_ratings: Vec<f64> = best.top(best_count).iter().map(|p| p.rating).collect();
    let best_sum: f64 = best_ratings.iter().sum();

    let mut recent_ratings: Vec<f64> = window.recent_10().map(|p| p.rating).collect();
    recent_ratings.sort_by(|a, b| b.total_cmp(a));
    let recent_sum: f64 = recent_ratings.iter().sum();

    let total = best_ratings.len() + recent_ratings.len();
    let rating = if total == 0 {
        0
    } else {
        ((best_sum + recent_sum) / total as f64 * 100.0).round() as i64
    };

    log::debug!(
        "[评分] Best {} 条 总和={best_sum:.4}，Recent 10 {} 条 总和={recent_sum:.4} -> {rating}",
        best_ratings.len(),
        recent_ratings.len()
    );

    RatingBreakdown {
        best_sum,
        best_count: best_ratings.len(),
        recent_sum,
        recent_count: recent_ratings.len(),
        rating,
    }
}
