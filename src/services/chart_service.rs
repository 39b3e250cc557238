use sqlx::{SqliteConnection, SqlitePool};
use std::path::Path;

use crate::models::chart::{ChartId, ChartInfo};
use crate::utils::data_loader::load_chart_info;
use crate::utils::error::{AppError, AppResult};

// 谱面定数服务
#[derive(Clone)]
pub struct ChartService {
    pool: SqlitePool,
}

impl ChartService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 查询谱面定数，未收录的谱面按未定级处理返回 0
    pub async fn base_rating(&self, chart: &ChartId) -> AppResult<f64> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| AppError::DatabaseError(format!("获取数据库连接失败: {e}")))?;
        fetch_base_rating(&mut conn, chart).await
    }

    /// 批量写入谱面定数，已存在的谱面覆盖定数
    pub async fn import_charts(&self, charts: &[ChartInfo]) -> AppResult<usize> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(format!("开始事务失败: {e}")))?;

        for chart in charts {
            sqlx::query(
                "INSERT INTO chart_info (song_id, difficulty, rating) VALUES (?, ?, ?)
                 ON CONFLICT(song_id, difficulty) DO UPDATE SET rating = excluded.rating",
            )
            .bind(&chart.song_id)
            .bind(u8::from(chart.difficulty) as i64)
            .bind(chart.rating)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("写入谱面定数失败 for {}: {e}", chart.chart_id()))
            })?;
        }

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(format!("提交事务失败: {e}")))?;

        log::info!("已导入 {} 条谱面定数", charts.len());
        Ok(charts.len())
    }

    pub async fn import_from_file<P: AsRef<Path>>(&self, path: P) -> AppResult<usize> {
        let charts = load_chart_info(path.as_ref())?;
        self.import_charts(&charts).await
    }
}

pub async fn fetch_base_rating(conn: &mut SqliteConnection, chart: &ChartId) -> AppResult<f64> {
    let row: Option<(f64,)> =
        sqlx::query_as("SELECT rating FROM chart_info WHERE song_id = ? AND difficulty = ?")
            .bind(&chart.song_id)
            .bind(u8::from(chart.difficulty) as i64)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| AppError::DatabaseError(format!("查询谱面 {chart} 定数失败: {e}")))?;

    match row {
        Some((rating,)) => Ok(rating),
        None => {
            log::debug!("谱面 {chart} 未收录");
            Ok(0.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chart::Difficulty;
    use crate::services::score_store::init_tables;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to connect to in-memory database");
        init_tables(&pool).await.expect("Failed to initialize tables");
        pool
    }

    #[tokio::test]
    async fn import_then_lookup() {
        let service = ChartService::new(memory_pool().await);
        let charts = vec![
            ChartInfo {
                song_id: "grievouslady".to_string(),
                difficulty: Difficulty::Future,
                rating: 11.0,
            },
            ChartInfo {
                song_id: "grievouslady".to_string(),
                difficulty: Difficulty::Present,
                rating: 7.5,
            },
        ];
        assert_eq!(service.import_charts(&charts).await.unwrap(), 2);

        let ftr = ChartId::new("grievouslady", Difficulty::Future);
        assert_eq!(service.base_rating(&ftr).await.unwrap(), 11.0);

        // 重新导入覆盖定数
        let updated = vec![ChartInfo {
            song_id: "grievouslady".to_string(),
            difficulty: Difficulty::Future,
            rating: 11.3,
        }];
        service.import_charts(&updated).await.unwrap();
        assert_eq!(service.base_rating(&ftr).await.unwrap(), 11.3);
    }

    #[tokio::test]
    async fn unknown_chart_reads_as_unrated() {
        let service = ChartService::new(memory_pool().await);
        let chart = ChartId::new("nonexistent", Difficulty::Beyond);
        assert_eq!(service.base_rating(&chart).await.unwrap(), 0.0);
    }
}
