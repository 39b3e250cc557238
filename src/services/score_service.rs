use chrono::Utc;
use moka::future::Cache;
use sqlx::SqlitePool;
use std::time::Duration;

use crate::config::RatingConfig;
use crate::models::chart::ChartId;
use crate::models::play::{PlayRecord, ScoreSubmission};
use crate::models::rating::{MostRecentPlay, RatingBreakdown, ScoreLookup};
use crate::services::aggregator::compute_rating;
use crate::services::chart_service::ChartService;
use crate::services::player_lock::PlayerLocks;
use crate::services::recent_window::RecentSlot;
use crate::services::score_store;
use crate::utils::error::{AppError, AppResult};
use crate::utils::rating_utils::calculate_play_rating;

/// 成绩提交与评分查询服务。
///
/// 一次提交在同一个事务内依次完成：
/// 写入成绩 -> 更新 Best -> 更新最近游玩窗口 -> 重算评分。
/// 任一步失败整个事务回滚。同一玩家的提交通过玩家锁串行化。
#[derive(Clone)]
pub struct ScoreService {
    pool: SqlitePool,
    config: RatingConfig,
    charts: ChartService,
    locks: PlayerLocks,
    // 玩家评分缓存，提交或重算成功后刷新
    rating_cache: Cache<i64, i64>,
}

impl ScoreService {
    pub fn new(pool: SqlitePool, config: RatingConfig, cache_ttl: Duration) -> Self {
        Self {
            charts: ChartService::new(pool.clone()),
            pool,
            config,
            locks: PlayerLocks::new(),
            rating_cache: Cache::builder()
                .max_capacity(10_000)
                .time_to_live(cache_ttl)
                .build(),
        }
    }

    pub fn config(&self) -> &RatingConfig {
        &self.config
    }

    /// 提交一次游玩成绩，返回玩家的新评分
    pub async fn submit(&self, player_id: i64, submission: ScoreSubmission) -> AppResult<i64> {
        self.submit_at(player_id, submission, Utc::now().timestamp_millis())
            .await
    }

    pub async fn submit_at(
        &self,
        player_id: i64,
        submission: ScoreSubmission,
        played_at: i64,
    ) -> AppResult<i64> {
        validate_submission(&submission)?;

        let _guard = self.locks.acquire(player_id).await;

        // 谱面定数是静态数据，在事务外读取
        let base_rating = self.charts.base_rating(&submission.chart).await?;
        let play_rating = match calculate_play_rating(&submission.chart, base_rating, submission.score) {
            Ok(rating) => rating,
            Err(e) => {
                log::warn!("玩家[{player_id}]提交被拒绝: {e}");
                return Err(e);
            }
        };

        match self
            .run_pipeline(player_id, &submission, played_at, play_rating)
            .await
        {
            Ok(rating) => {
                self.rating_cache.insert(player_id, rating).await;
                log::info!(
                    "玩家[{player_id}]提交 {} 分数 {} 单曲评分 {play_rating:.4}，新评分 {rating}",
                    submission.chart,
                    submission.score
                );
                Ok(rating)
            }
            Err(e) => {
                log::error!("玩家[{player_id}]提交 {} 失败，事务已回滚: {e}", submission.chart);
                Err(e)
            }
        }
    }

    async fn run_pipeline(
        &self,
        player_id: i64,
        submission: &ScoreSubmission,
        played_at: i64,
        play_rating: f64,
    ) -> AppResult<i64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(format!("开始事务失败: {e}")))?;

        // 第一条语句即为写操作，之后的窗口读取都在写锁之内
        let play = score_store::insert_play(&mut tx, player_id, submission, played_at, play_rating).await?;
        score_store::ensure_player(&mut tx, player_id).await?;

        let mut best = score_store::load_best_set(&mut tx, player_id).await?;
        let best_update = best.update(&play);
        score_store::save_best(&mut tx, player_id, &play, &best_update).await?;

        let mut window = score_store::load_recent_window(&mut tx, player_id, &self.config).await?;
        let outcome = window.insert(play.clone())?;
        let written = score_store::save_recent_window(&mut tx, player_id, &window).await?;
        log::debug!(
            "玩家[{player_id}]成绩 #{} Best: {best_update:?}，最近窗口: {outcome:?}，写入 {written} 个槽位",
            play.play_id
        );

        let breakdown = compute_rating(&best, &window, self.config.best_count);
        score_store::update_player_rating(&mut tx, player_id, breakdown.rating).await?;

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(format!("提交事务失败: {e}")))?;

        Ok(breakdown.rating)
    }

    /// 读取玩家当前评分，优先命中缓存
    pub async fn current_rating(&self, player_id: i64) -> AppResult<i64> {
        if let Some(rating) = self.rating_cache.get(&player_id).await {
            log::debug!("从缓存获取玩家[{player_id}]评分");
            return Ok(rating);
        }

        // 未命中时在玩家锁内回源，避免旧值覆盖并发提交写入的新评分
        let _guard = self.locks.acquire(player_id).await;
        if let Some(rating) = self.rating_cache.get(&player_id).await {
            return Ok(rating);
        }

        let mut conn = self.acquire().await?;
        let rating = score_store::fetch_player_rating(&mut conn, player_id)
            .await?
            .ok_or(AppError::PlayerNotFound(player_id))?;
        self.rating_cache.insert(player_id, rating).await;
        Ok(rating)
    }

    /// 根据当前 Best 与 Recent 10 重新计算并写回评分
    pub async fn recompute_rating(&self, player_id: i64) -> AppResult<RatingBreakdown> {
        let _guard = self.locks.acquire(player_id).await;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(format!("开始事务失败: {e}")))?;

        let stored = score_store::fetch_player_rating(&mut tx, player_id)
            .await?
            .ok_or(AppError::PlayerNotFound(player_id))?;
        let best = score_store::load_best_set(&mut tx, player_id).await?;
        let window = score_store::load_recent_window(&mut tx, player_id, &self.config).await?;
        let breakdown = compute_rating(&best, &window, self.config.best_count);

        if breakdown.rating != stored {
            log::warn!(
                "玩家[{player_id}]存储评分 {stored} 与重算结果 {} 不一致，已更新",
                breakdown.rating
            );
        }
        score_store::update_player_rating(&mut tx, player_id, breakdown.rating).await?;

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(format!("提交事务失败: {e}")))?;

        self.rating_cache.insert(player_id, breakdown.rating).await;
        Ok(breakdown)
    }

    /// 玩家成绩总览：Best 30、Recent 10 及两者均值
    pub async fn lookup_scores(&self, player_id: i64) -> AppResult<ScoreLookup> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(format!("开始事务失败: {e}")))?;

        let rating = score_store::fetch_player_rating(&mut tx, player_id)
            .await?
            .ok_or(AppError::PlayerNotFound(player_id))?;
        let best = score_store::load_best_set(&mut tx, player_id).await?;
        let window = score_store::load_recent_window(&mut tx, player_id, &self.config).await?;
        drop(tx);

        let breakdown = compute_rating(&best, &window, self.config.best_count);
        let mut recent_10: Vec<PlayRecord> = window.recent_10().cloned().collect();
        recent_10.sort_by(|a, b| b.rating.total_cmp(&a.rating));

        Ok(ScoreLookup {
            player_id,
            rating,
            best_average: breakdown.best_average(),
            recent_average: breakdown.recent_average(),
            best: best
                .top(self.config.best_count)
                .into_iter()
                .cloned()
                .collect(),
            recent_10,
        })
    }

    /// 最近一次游玩，附带该谱面 Best 的通关类型；没有任何游玩时返回 None
    pub async fn most_recent_play(&self, player_id: i64) -> AppResult<Option<MostRecentPlay>> {
        let mut conn = self.acquire().await?;
        let Some(play) = score_store::fetch_latest_play(&mut conn, player_id).await? else {
            return Ok(None);
        };
        let best_clear_type = score_store::fetch_best_clear_type(&mut conn, player_id, &play.chart).await?;
        Ok(Some(MostRecentPlay {
            play,
            best_clear_type,
        }))
    }

    pub async fn recent_window(&self, player_id: i64) -> AppResult<Vec<RecentSlot>> {
        let mut conn = self.acquire().await?;
        let window = score_store::load_recent_window(&mut conn, player_id, &self.config).await?;
        Ok(window.slots().to_vec())
    }

    pub async fn play_history(&self, player_id: i64, chart: Option<&ChartId>) -> AppResult<Vec<PlayRecord>> {
        let mut conn = self.acquire().await?;
        score_store::fetch_plays(&mut conn, player_id, chart).await
    }

    async fn acquire(&self) -> AppResult<sqlx::pool::PoolConnection<sqlx::Sqlite>> {
        self.pool
            .acquire()
            .await
            .map_err(|e| AppError::DatabaseError(format!("获取数据库连接失败: {e}")))
    }
}

fn validate_submission(submission: &ScoreSubmission) -> AppResult<()> {
    if submission.chart.song_id.trim().is_empty() {
        return Err(AppError::InvalidSubmission("song_id 不能为空".to_string()));
    }
    if submission.score < 0 {
        return Err(AppError::InvalidSubmission(format!(
            "分数不能为负: {}",
            submission.score
        )));
    }
    Ok(())
}
