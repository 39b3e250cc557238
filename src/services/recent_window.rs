use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::config::{OverflowPolicy, RatingConfig};
use crate::models::chart::ChartId;
use crate::models::play::PlayRecord;
use crate::utils::error::{AppError, AppResult};
use crate::utils::rating_utils::EX_SCORE;

/// 最近游玩窗口中的一个槽位
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentSlot {
    pub play: PlayRecord,
    pub is_recent_10: bool,
}

/// 一次插入在窗口上走过的分支
#[derive(Debug, Clone, PartialEq)]
pub enum RecentInsert {
    /// Recent 10 未满且窗口未满，直接新增
    Recent10Added { slot: usize },
    /// Recent 10 中已有同谱面且新成绩不低于旧成绩，原地覆盖
    Recent10Overwritten { slot: usize },
    /// Recent 10 中已有同谱面但新成绩更低，旧成绩降级进溢出池
    Demoted { slot: usize },
    /// 窗口已满而 Recent 10 有空位，插入溢出池后提拔溢出池最高评分
    Promoted { promoted_play_id: Option<i64> },
    /// 顶替了一条 Recent 10，被顶替者进入溢出池
    Recent10Replaced { slot: usize, displaced_play_id: i64 },
    /// 只进入溢出池
    OverflowOnly,
}

/// 玩家的最近游玩窗口。
///
/// 最多 `recent_capacity` 个槽位，其中最多 `recent_top_count` 个标记为 Recent 10，
/// Recent 10 内谱面两两不同。窗口满后只覆盖槽位，不再新增。
/// 载入时记录快照，落库时只写发生变化的槽位。
#[derive(Debug, Clone)]
pub struct RecentWindow {
    slots: Vec<RecentSlot>,
    baseline: Vec<(i64, bool)>,
    capacity: usize,
    top_count: usize,
    policy: OverflowPolicy,
}

impl RecentWindow {
    pub fn new(config: &RatingConfig) -> Self {
        Self {
            slots: Vec::with_capacity(config.recent_capacity),
            baseline: Vec::new(),
            capacity: config.recent_capacity,
            top_count: config.recent_top_count,
            policy: config.overflow_policy,
        }
    }

    /// 从数据库快照恢复窗口，槽位顺序即槽位编号
    pub fn from_slots(slots: Vec<RecentSlot>, config: &RatingConfig) -> AppResult<Self> {
        let baseline = slots
            .iter()
            .map(|s| (s.play.play_id, s.is_recent_10))
            .collect();
        let window = Self {
            slots,
            baseline,
            capacity: config.recent_capacity,
            top_count: config.recent_top_count,
            policy: config.overflow_policy,
        };
        window.check_invariants()?;
        Ok(window)
    }

    pub fn slots(&self) -> &[RecentSlot] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn recent_10(&self) -> impl Iterator<Item = &PlayRecord> {
        self.slots
            .iter()
            .filter(|s| s.is_recent_10)
            .map(|s| &s.play)
    }

    pub fn recent_10_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_recent_10).count()
    }

    /// 与载入快照相比发生变化（或新增）的槽位
    pub fn changed_slots(&self) -> Vec<(usize, &RecentSlot)> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(i, s)| {
                self.baseline
                    .get(*i)
                    .map_or(true, |&(play_id, flag)| {
                        play_id != s.play.play_id || flag != s.is_recent_10
                    })
            })
            .collect()
    }

    pub fn insert(&mut self, play: PlayRecord) -> AppResult<RecentInsert> {
        let outcome = self.place(play)?;
        self.check_invariants()?;
        Ok(outcome)
    }

    fn place(&mut self, play: PlayRecord) -> AppResult<RecentInsert> {
        // 1. Recent 10 中的同谱面
        if let Some(slot) = self
            .slots
            .iter()
            .position(|s| s.is_recent_10 && s.play.chart == play.chart)
        {
            if play.rating >= self.slots[slot].play.rating {
                log::debug!("Recent 10 同谱面 {} 覆盖槽位 {slot}", play.chart);
                self.slots[slot].play = play;
                return Ok(RecentInsert::Recent10Overwritten { slot });
            }
            log::debug!(
                "Recent 10 同谱面 {} 新评分 {:.4} 低于旧评分 {:.4}，旧成绩降级",
                play.chart,
                play.rating,
                self.slots[slot].play.rating
            );
            self.slots[slot].is_recent_10 = false;
            // 降级的旧成绩保留为普通槽位，不参与本次淘汰
            self.place_in_overflow(play, Some(slot))?;
            return Ok(RecentInsert::Demoted { slot });
        }

        // 2. Recent 10 未满
        if self.recent_10_count() < self.top_count {
            if self.slots.len() < self.capacity {
                self.slots.push(RecentSlot {
                    play,
                    is_recent_10: true,
                });
                return Ok(RecentInsert::Recent10Added {
                    slot: self.slots.len() - 1,
                });
            }
            self.place_in_overflow(play, None)?;
            let promoted_play_id = self.promote_best_overflow();
            return Ok(RecentInsert::Promoted { promoted_play_id });
        }

        // 3. Recent 10 已满，EX 或 Hard Clear 可无视评分顶替
        let exceptional = play.score >= EX_SCORE || play.clear_type.is_hard_clear();
        let target = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_recent_10 && (exceptional || s.play.rating <= play.rating))
            .min_by_key(|(_, s)| s.play.age_key())
            .map(|(i, _)| i);

        match target {
            Some(slot) => {
                let displaced = std::mem::replace(&mut self.slots[slot].play, play);
                let displaced_play_id = displaced.play_id;
                log::debug!("顶替 Recent 10 槽位 {slot} (原成绩 #{displaced_play_id})");
                self.place_in_overflow(displaced, None)?;
                Ok(RecentInsert::Recent10Replaced {
                    slot,
                    displaced_play_id,
                })
            }
            None => {
                self.place_in_overflow(play, None)?;
                Ok(RecentInsert::OverflowOnly)
            }
        }
    }

    /// 4. 放入溢出池，窗口已满时覆盖最旧的溢出槽位，`keep` 指定的槽位不会被覆盖
    fn place_in_overflow(&mut self, play: PlayRecord, keep: Option<usize>) -> AppResult<()> {
        if self.policy == OverflowPolicy::Deduplicate {
            let same_chart = self
                .slots
                .iter()
                .enumerate()
                .filter(|(i, s)| Some(*i) != keep && !s.is_recent_10 && s.play.chart == play.chart)
                .min_by_key(|(_, s)| s.play.age_key())
                .map(|(i, _)| i);
            if let Some(slot) = same_chart {
                if self.slots[slot].play.age_key() < play.age_key() {
                    self.slots[slot].play = play;
                } else {
                    log::debug!("溢出池已有更新的 {} 成绩，丢弃 #{}", play.chart, play.play_id);
                }
                return Ok(());
            }
        }

        if self.slots.len() < self.capacity {
            self.slots.push(RecentSlot {
                play,
                is_recent_10: false,
            });
            return Ok(());
        }

        let oldest = self
            .slots
            .iter()
            .enumerate()
            .filter(|(i, s)| Some(*i) != keep && !s.is_recent_10)
            .min_by_key(|(_, s)| s.play.age_key())
            .map(|(i, _)| i)
            .ok_or_else(|| {
                AppError::InvariantViolation("窗口已满但溢出池为空".to_string())
            })?;
        log::debug!(
            "溢出池已满，淘汰槽位 {oldest} 的成绩 #{}",
            self.slots[oldest].play.play_id
        );
        self.slots[oldest] = RecentSlot {
            play,
            is_recent_10: false,
        };
        Ok(())
    }

    /// 将溢出池中评分最高、且谱面不在 Recent 10 中的成绩提拔进 Recent 10
    fn promote_best_overflow(&mut self) -> Option<i64> {
        let candidate = {
            let taken: HashSet<&ChartId> = self.recent_10().map(|p| &p.chart).collect();
            self.slots
                .iter()
                .enumerate()
                .filter(|(_, s)| !s.is_recent_10 && !taken.contains(&s.play.chart))
                .max_by(|(_, a), (_, b)| {
                    a.play
                        .rating
                        .total_cmp(&b.play.rating)
                        .then_with(|| a.play.age_key().cmp(&b.play.age_key()))
                })
                .map(|(i, _)| i)
        };

        let slot = candidate?;
        self.slots[slot].is_recent_10 = true;
        log::debug!("提拔槽位 {slot} 的成绩 #{} 进入 Recent 10", self.slots[slot].play.play_id);
        Some(self.slots[slot].play.play_id)
    }

    pub fn check_invariants(&self) -> AppResult<()> {
        if self.slots.len() > self.capacity {
            return Err(AppError::InvariantViolation(format!(
                "最近游玩槽位数 {} 超过上限 {}",
                self.slots.len(),
                self.capacity
            )));
        }

        let mut charts = HashSet::new();
        for slot in self.slots.iter().filter(|s| s.is_recent_10) {
            if !charts.insert(&slot.play.chart) {
                return Err(AppError::InvariantViolation(format!(
                    "Recent 10 中谱面 {} 重复",
                    slot.play.chart
                )));
            }
        }
        if charts.len() > self.top_count {
            return Err(AppError::InvariantViolation(format!(
                "Recent 10 数量 {} 超过上限 {}",
                charts.len(),
                self.top_count
            )));
        }
        Ok(())
    }
}
