use std::collections::HashMap;

use crate::models::chart::ChartId;
use crate::models::play::PlayRecord;

/// 一次更新对 Best 集合造成的变化，用于落库
#[derive(Debug, Clone, PartialEq)]
pub enum BestUpdate {
    Created,
    Replaced { previous_play_id: i64 },
    Unchanged,
}

/// 玩家每个谱面的最高分成绩。
///
/// 每个谱面至多一条，只会被更高的原始分数替换，从不删除。
/// Best 30 的截取在读取时完成。
#[derive(Debug, Clone, Default)]
pub struct BestChartSet {
    entries: HashMap<ChartId, PlayRecord>,
}

impl BestChartSet {
    pub fn from_records(records: Vec<PlayRecord>) -> Self {
        let mut entries = HashMap::with_capacity(records.len());
        for record in records {
            entries.insert(record.chart.clone(), record);
        }
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, chart: &ChartId) -> Option<&PlayRecord> {
        self.entries.get(chart)
    }

    pub fn update(&mut self, play: &PlayRecord) -> BestUpdate {
        match self.entries.get_mut(&play.chart) {
            None => {
                self.entries.insert(play.chart.clone(), play.clone());
                BestUpdate::Created
            }
            Some(existing) if play.score > existing.score => {
                let previous_play_id = existing.play_id;
                *existing = play.clone();
                BestUpdate::Replaced { previous_play_id }
            }
            Some(_) => BestUpdate::Unchanged,
        }
    }

    /// 按评分降序取前 n 条，评分相同时按谱面标识排序以保证结果稳定
    pub fn top(&self, n: usize) -> Vec<&PlayRecord> {
        let mut sorted: Vec<&PlayRecord> = self.entries.values().collect();
        sorted.sort_by(|a, b| {
            b.rating
                .total_cmp(&a.rating)
                .then_with(|| a.chart.cmp(&b.chart))
        });
        sorted.truncate(n);
        sorted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chart::Difficulty;
    use crate::models::play::{ClearType, Judgements};

    fn play(play_id: i64, song: &str, score: i64, rating: f64) -> PlayRecord {
        PlayRecord {
            play_id,
            player_id: 1,
            chart: ChartId::new(song, Difficulty::Future),
            played_at: play_id * 1000,
            score,
            judgements: Judgements::default(),
            health: 100,
            clear_type: ClearType::NormalClear,
            rating,
        }
    }

    #[test]
    fn first_play_creates_entry() {
        let mut best = BestChartSet::default();
        assert_eq!(best.update(&play(1, "axiumcrisis", 9_500_000, 10.0)), BestUpdate::Created);
        assert_eq!(best.len(), 1);
    }

    #[test]
    fn only_strictly_higher_score_replaces() {
        let mut best = BestChartSet::default();
        best.update(&play(1, "axiumcrisis", 9_700_000, 10.5));

        assert_eq!(best.update(&play(2, "axiumcrisis", 9_700_000, 10.5)), BestUpdate::Unchanged);
        assert_eq!(best.update(&play(3, "axiumcrisis", 9_600_000, 10.2)), BestUpdate::Unchanged);
        let chart = ChartId::new("axiumcrisis", Difficulty::Future);
        assert_eq!(best.get(&chart).map(|p| p.play_id), Some(1));

        assert_eq!(
            best.update(&play(4, "axiumcrisis", 9_800_001, 11.0)),
            BestUpdate::Replaced { previous_play_id: 1 }
        );
        assert_eq!(best.get(&chart).map(|p| p.score), Some(9_800_001));
        assert_eq!(best.len(), 1);
    }

    #[test]
    fn different_difficulties_are_different_charts() {
        let mut best = BestChartSet::default();
        best.update(&play(1, "ifi", 9_000_000, 9.0));
        let mut beyond = play(2, "ifi", 8_000_000, 8.0);
        beyond.chart.difficulty = Difficulty::Beyond;
        assert_eq!(best.update(&beyond), BestUpdate::Created);
        assert_eq!(best.len(), 2);
    }

    #[test]
    fn top_is_sorted_and_truncated() {
        let mut best = BestChartSet::default();
        for i in 0..40 {
            best.update(&play(i, &format!("song{i:02}"), 9_000_000, i as f64 * 0.25));
        }
        let top = best.top(30);
        assert_eq!(top.len(), 30);
        assert_eq!(top[0].rating, 39.0 * 0.25);
        assert!(top.windows(2).all(|w| w[0].rating >= w[1].rating));
        assert_eq!(top[29].rating, 10.0 * 0.25);
    }
}
