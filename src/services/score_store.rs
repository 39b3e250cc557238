use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};

use crate::config::RatingConfig;
use crate::models::chart::{ChartId, Difficulty};
use crate::models::play::{ClearType, Judgements, PlayRecord, ScoreSubmission};
use crate::services::best_chart::{BestChartSet, BestUpdate};
use crate::services::recent_window::{RecentSlot, RecentWindow};
use crate::utils::error::{AppError, AppResult};

const PLAY_COLUMNS: &str = "s.play_id, s.player_id, s.song_id, s.difficulty, s.played_at, s.score, \
     s.shiny_pure, s.pure, s.far, s.lost, s.health, s.clear_type, s.rating";

// 初始化数据库表
pub async fn init_tables(pool: &SqlitePool) -> AppResult<()> {
    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS chart_info (
            song_id TEXT NOT NULL,
            difficulty INTEGER NOT NULL,
            rating REAL NOT NULL DEFAULT 0,
            PRIMARY KEY (song_id, difficulty)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS player (
            player_id INTEGER PRIMARY KEY NOT NULL,
            rating INTEGER NOT NULL DEFAULT 0,
            update_time TEXT NOT NULL
        )
        "#,
        // 成绩流水，只追加
        r#"
        CREATE TABLE IF NOT EXISTS score (
            play_id INTEGER PRIMARY KEY AUTOINCREMENT,
            player_id INTEGER NOT NULL,
            played_at INTEGER NOT NULL,
            song_id TEXT NOT NULL,
            difficulty INTEGER NOT NULL,
            score INTEGER NOT NULL,
            shiny_pure INTEGER NOT NULL,
            pure INTEGER NOT NULL,
            far INTEGER NOT NULL,
            lost INTEGER NOT NULL,
            health INTEGER NOT NULL,
            clear_type INTEGER NOT NULL,
            rating REAL NOT NULL
        )
        "#,
        "CREATE INDEX IF NOT EXISTS idx_score_player_time ON score (player_id, played_at)",
        "CREATE INDEX IF NOT EXISTS idx_score_player_chart ON score (player_id, song_id, difficulty)",
        r#"
        CREATE TABLE IF NOT EXISTS best_score (
            player_id INTEGER NOT NULL,
            song_id TEXT NOT NULL,
            difficulty INTEGER NOT NULL,
            play_id INTEGER NOT NULL REFERENCES score (play_id),
            PRIMARY KEY (player_id, song_id, difficulty)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS recent_score (
            player_id INTEGER NOT NULL,
            slot INTEGER NOT NULL,
            play_id INTEGER NOT NULL REFERENCES score (play_id),
            is_recent_10 INTEGER NOT NULL,
            PRIMARY KEY (player_id, slot)
        )
        "#,
    ];

    for statement in statements {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("初始化数据表失败: {e}")))?;
    }

    log::info!("数据库表初始化检查完成");
    Ok(())
}

pub async fn ensure_player(conn: &mut SqliteConnection, player_id: i64) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO player (player_id, rating, update_time) VALUES (?, 0, ?)
         ON CONFLICT(player_id) DO NOTHING",
    )
    .bind(player_id)
    .bind(Utc::now().to_rfc3339())
    .execute(&mut *conn)
    .await
    .map_err(|e| AppError::DatabaseError(format!("创建玩家[{player_id}]失败: {e}")))?;
    Ok(())
}

pub async fn insert_play(
    conn: &mut SqliteConnection,
    player_id: i64,
    submission: &ScoreSubmission,
    played_at: i64,
    rating: f64,
) -> AppResult<PlayRecord> {
    let judgements = submission.judgements;
    let result = sqlx::query(
        "INSERT INTO score (
            player_id, played_at, song_id, difficulty, score,
            shiny_pure, pure, far, lost, health, clear_type, rating
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(player_id)
    .bind(played_at)
    .bind(&submission.chart.song_id)
    .bind(u8::from(submission.chart.difficulty) as i64)
    .bind(submission.score)
    .bind(judgements.shiny_pure as i64)
    .bind(judgements.pure as i64)
    .bind(judgements.far as i64)
    .bind(judgements.lost as i64)
    .bind(submission.health as i64)
    .bind(submission.clear_type as i64)
    .bind(rating)
    .execute(&mut *conn)
    .await
    .map_err(|e| AppError::DatabaseError(format!("插入成绩失败: {e}")))?;

    Ok(PlayRecord {
        play_id: result.last_insert_rowid(),
        player_id,
        chart: submission.chart.clone(),
        played_at,
        score: submission.score,
        judgements,
        health: submission.health,
        clear_type: submission.clear_type,
        rating,
    })
}

pub async fn load_best_set(conn: &mut SqliteConnection, player_id: i64) -> AppResult<BestChartSet> {
    let sql = format!(
        "SELECT {PLAY_COLUMNS} FROM best_score b JOIN score s ON s.play_id = b.play_id
         WHERE b.player_id = ?"
    );
    let rows = sqlx::query_as::<_, DbPlayRecord>(&sql)
        .bind(player_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(format!("查询最佳成绩失败: {e}")))?;

    let records = rows
        .into_iter()
        .map(PlayRecord::try_from)
        .collect::<AppResult<Vec<_>>>()?;
    Ok(BestChartSet::from_records(records))
}

pub async fn save_best(
    conn: &mut SqliteConnection,
    player_id: i64,
    play: &PlayRecord,
    update: &BestUpdate,
) -> AppResult<()> {
    let difficulty = u8::from(play.chart.difficulty) as i64;
    match update {
        BestUpdate::Created => {
            sqlx::query(
                "INSERT INTO best_score (player_id, song_id, difficulty, play_id) VALUES (?, ?, ?, ?)",
            )
            .bind(player_id)
            .bind(&play.chart.song_id)
            .bind(difficulty)
            .bind(play.play_id)
            .execute(&mut *conn)
            .await
            .map_err(|e| AppError::DatabaseError(format!("插入最佳成绩失败: {e}")))?;
        }
        BestUpdate::Replaced { previous_play_id } => {
            let result = sqlx::query(
                "UPDATE best_score SET play_id = ?
                 WHERE player_id = ? AND song_id = ? AND difficulty = ? AND play_id = ?",
            )
            .bind(play.play_id)
            .bind(player_id)
            .bind(&play.chart.song_id)
            .bind(difficulty)
            .bind(*previous_play_id)
            .execute(&mut *conn)
            .await
            .map_err(|e| AppError::DatabaseError(format!("更新最佳成绩失败: {e}")))?;
            if result.rows_affected() != 1 {
                return Err(AppError::InvariantViolation(format!(
                    "最佳成绩 {} 的旧记录 #{previous_play_id} 已不存在",
                    play.chart
                )));
            }
        }
        BestUpdate::Unchanged => {}
    }
    Ok(())
}

pub async fn load_recent_window(
    conn: &mut SqliteConnection,
    player_id: i64,
    config: &RatingConfig,
) -> AppResult<RecentWindow> {
    let sql = format!(
        "SELECT r.slot, r.is_recent_10, {PLAY_COLUMNS}
         FROM recent_score r JOIN score s ON s.play_id = r.play_id
         WHERE r.player_id = ?
         ORDER BY r.slot"
    );
    let rows = sqlx::query_as::<_, DbRecentSlot>(&sql)
        .bind(player_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(format!("查询最近成绩失败: {e}")))?;

    let mut slots = Vec::with_capacity(rows.len());
    for (index, row) in rows.into_iter().enumerate() {
        if row.slot != index as i64 {
            return Err(AppError::InvariantViolation(format!(
                "玩家[{player_id}]最近成绩槽位不连续: 期望 {index}, 实际 {}",
                row.slot
            )));
        }
        slots.push(RecentSlot {
            play: PlayRecord::try_from(row.play)?,
            is_recent_10: row.is_recent_10,
        });
    }
    RecentWindow::from_slots(slots, config)
}

/// 只写入发生变化的槽位，返回写入条数
pub async fn save_recent_window(
    conn: &mut SqliteConnection,
    player_id: i64,
    window: &RecentWindow,
) -> AppResult<usize> {
    let changed = window.changed_slots();
    for (slot, entry) in &changed {
        sqlx::query(
            "INSERT INTO recent_score (player_id, slot, play_id, is_recent_10) VALUES (?, ?, ?, ?)
             ON CONFLICT(player_id, slot) DO UPDATE SET
                play_id = excluded.play_id, is_recent_10 = excluded.is_recent_10",
        )
        .bind(player_id)
        .bind(*slot as i64)
        .bind(entry.play.play_id)
        .bind(entry.is_recent_10)
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(format!("写入最近成绩槽位 {slot} 失败: {e}")))?;
    }
    Ok(changed.len())
}

pub async fn update_player_rating(conn: &mut SqliteConnection, player_id: i64, rating: i64) -> AppResult<()> {
    sqlx::query("UPDATE player SET rating = ?, update_time = ? WHERE player_id = ?")
        .bind(rating)
        .bind(Utc::now().to_rfc3339())
        .bind(player_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(format!("更新玩家[{player_id}]评分失败: {e}")))?;
    Ok(())
}

pub async fn fetch_player_rating(conn: &mut SqliteConnection, player_id: i64) -> AppResult<Option<i64>> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT rating FROM player WHERE player_id = ?")
        .bind(player_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(format!("查询玩家[{player_id}]评分失败: {e}")))?;
    Ok(row.map(|(rating,)| rating))
}

pub async fn fetch_latest_play(conn: &mut SqliteConnection, player_id: i64) -> AppResult<Option<PlayRecord>> {
    let sql = format!(
        "SELECT {PLAY_COLUMNS} FROM score s WHERE s.player_id = ?
         ORDER BY s.played_at DESC, s.play_id DESC LIMIT 1"
    );
    sqlx::query_as::<_, DbPlayRecord>(&sql)
        .bind(player_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(format!("查询最近一次游玩失败: {e}")))?
        .map(PlayRecord::try_from)
        .transpose()
}

/// 玩家的游玩流水，按时间先后排序；指定谱面时只返回该谱面
pub async fn fetch_plays(
    conn: &mut SqliteConnection,
    player_id: i64,
    chart: Option<&ChartId>,
) -> AppResult<Vec<PlayRecord>> {
    let rows = match chart {
        Some(chart) => {
            let sql = format!(
                "SELECT {PLAY_COLUMNS} FROM score s
                 WHERE s.player_id = ? AND s.song_id = ? AND s.difficulty = ?
                 ORDER BY s.played_at, s.play_id"
            );
            sqlx::query_as::<_, DbPlayRecord>(&sql)
                .bind(player_id)
                .bind(&chart.song_id)
                .bind(u8::from(chart.difficulty) as i64)
                .fetch_all(&mut *conn)
                .await
        }
        None => {
            let sql = format!(
                "SELECT {PLAY_COLUMNS} FROM score s WHERE s.player_id = ?
                 ORDER BY s.played_at, s.play_id"
            );
            sqlx::query_as::<_, DbPlayRecord>(&sql)
                .bind(player_id)
                .fetch_all(&mut *conn)
                .await
        }
    }
    .map_err(|e| AppError::DatabaseError(format!("查询玩家[{player_id}]游玩记录失败: {e}")))?;

    rows.into_iter().map(PlayRecord::try_from).collect()
}

pub async fn fetch_best_clear_type(
    conn: &mut SqliteConnection,
    player_id: i64,
    chart: &ChartId,
) -> AppResult<Option<ClearType>> {
    let row: Option<(i64,)> = sqlx::query_as(
        "SELECT s.clear_type FROM best_score b JOIN score s ON s.play_id = b.play_id
         WHERE b.player_id = ? AND b.song_id = ? AND b.difficulty = ?",
    )
    .bind(player_id)
    .bind(&chart.song_id)
    .bind(u8::from(chart.difficulty) as i64)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| AppError::DatabaseError(format!("查询最佳成绩通关类型失败: {e}")))?;

    row.map(|(clear_type,)| ClearType::try_from(clear_type).map_err(AppError::DatabaseError))
        .transpose()
}

// 数据库模型，用于从数据库查询结果映射
#[derive(sqlx::FromRow)]
struct DbPlayRecord {
    play_id: i64,
    player_id: i64,
    song_id: String,
    difficulty: i64,
    played_at: i64,
    score: i64,
    shiny_pure: i64,
    pure: i64,
    far: i64,
    lost: i64,
    health: i64,
    clear_type: i64,
    rating: f64,
}

#[derive(sqlx::FromRow)]
struct DbRecentSlot {
    slot: i64,
    is_recent_10: bool,
    #[sqlx(flatten)]
    play: DbPlayRecord,
}

fn judgement_count(value: i64, name: &str, play_id: i64) -> AppResult<u32> {
    u32::try_from(value)
        .map_err(|_| AppError::DatabaseError(format!("成绩 #{play_id} 的 {name} 无效: {value}")))
}

impl TryFrom<DbPlayRecord> for PlayRecord {
    type Error = AppError;

    fn try_from(row: DbPlayRecord) -> Result<Self, Self::Error> {
        let difficulty = Difficulty::try_from(row.difficulty).map_err(AppError::DatabaseError)?;
        let clear_type = ClearType::try_from(row.clear_type).map_err(AppError::DatabaseError)?;
        let health = i32::try_from(row.health)
            .map_err(|_| AppError::DatabaseError(format!("成绩 #{} 的体力值无效", row.play_id)))?;

        Ok(PlayRecord {
            play_id: row.play_id,
            player_id: row.player_id,
            chart: ChartId::new(row.song_id, difficulty),
            played_at: row.played_at,
            score: row.score,
            judgements: Judgements {
                shiny_pure: judgement_count(row.shiny_pure, "shiny_pure", row.play_id)?,
                pure: judgement_count(row.pure, "pure", row.play_id)?,
                far: judgement_count(row.far, "far", row.play_id)?,
                lost: judgement_count(row.lost, "lost", row.play_id)?,
            },
            health,
            clear_type,
            rating: row.rating,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::play::ClearType;
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

    fn submission(song: &str, score: i64) -> ScoreSubmission {
        ScoreSubmission {
            chart: ChartId::new(song, Difficulty::Present),
            score,
            judgements: Judgements {
                shiny_pure: 500,
                pure: 600,
                far: 2,
                lost: 0,
            },
            health: 100,
            clear_type: ClearType::FullRecall,
        }
    }

    #[tokio::test]
    async fn play_round_trips_through_storage() {
        let pool = memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let inserted = insert_play(&mut conn, 1, &submission("blossoms", 9_650_000), 1_700_000_000_000, 7.25)
            .await
            .unwrap();
        let loaded = fetch_latest_play(&mut conn, 1).await.unwrap().unwrap();
        assert_eq!(loaded, inserted);
        assert!(fetch_latest_play(&mut conn, 2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn only_changed_slots_are_written() {
        let pool = memory_pool().await;
        let config = RatingConfig::default();
        let mut conn = pool.acquire().await.unwrap();
        ensure_player(&mut conn, 1).await.unwrap();

        let mut window = load_recent_window(&mut conn, 1, &config).await.unwrap();
        assert!(window.is_empty());
        for (i, song) in ["a", "b", "c"].iter().enumerate() {
            let play = insert_play(&mut conn, 1, &submission(song, 9_500_000), i as i64, 5.0)
                .await
                .unwrap();
            window.insert(play).unwrap();
        }
        assert_eq!(save_recent_window(&mut conn, 1, &window).await.unwrap(), 3);

        let mut reloaded = load_recent_window(&mut conn, 1, &config).await.unwrap();
        assert_eq!(reloaded.slots(), window.slots());
        assert_eq!(save_recent_window(&mut conn, 1, &reloaded).await.unwrap(), 0);

        let play = insert_play(&mut conn, 1, &submission("d", 9_500_000), 10, 5.0)
            .await
            .unwrap();
        reloaded.insert(play).unwrap();
        assert_eq!(save_recent_window(&mut conn, 1, &reloaded).await.unwrap(), 1);
        assert_eq!(load_recent_window(&mut conn, 1, &config).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn stale_best_replacement_is_an_invariant_violation() {
        let pool = memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let first = insert_play(&mut conn, 1, &submission("e", 9_000_000), 1, 3.0).await.unwrap();
        save_best(&mut conn, 1, &first, &BestUpdate::Created).await.unwrap();
        let second = insert_play(&mut conn, 1, &submission("e", 9_100_000), 2, 3.3).await.unwrap();

        let stale = BestUpdate::Replaced {
            previous_play_id: first.play_id + 100,
        };
        assert!(matches!(
            save_best(&mut conn, 1, &second, &stale).await,
            Err(AppError::InvariantViolation(_))
        ));

        let fresh = BestUpdate::Replaced {
            previous_play_id: first.play_id,
        };
        save_best(&mut conn, 1, &second, &fresh).await.unwrap();
        let best = load_best_set(&mut conn, 1).await.unwrap();
        assert_eq!(best.get(&second.chart).map(|p| p.play_id), Some(second.play_id));
        assert_eq!(
            fetch_best_clear_type(&mut conn, 1, &second.chart).await.unwrap(),
            Some(ClearType::FullRecall)
        );
    }
}
