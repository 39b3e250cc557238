use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

use rating_engine::config::AppConfig;
use rating_engine::models::chart::ChartId;
use rating_engine::models::play::{Judgements, ScoreSubmission};
use rating_engine::models::rating::ScoreUploadResult;
use rating_engine::services::score_store::init_tables;
use rating_engine::services::{ChartService, ScoreService};

mod args;

use args::{Args, Command};

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn connect(config: &AppConfig) -> anyhow::Result<SqlitePool> {
    log::info!("Connecting to database: {}", config.database_url);

    // 使用 SqliteConnectOptions 配置连接，并设置 create_if_missing
    let connect_options = SqliteConnectOptions::from_str(&config.database_url)
        .with_context(|| format!("无效的数据库地址: {}", config.database_url))?
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(connect_options)
        .await
        .context("Failed to create database connection pool")?;

    init_tables(&pool).await?;
    Ok(pool)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载.env文件
    dotenv::dotenv().ok();
    let args = Args::parse();

    env_logger::init_from_env(Env::default().default_filter_or(args.log_level.as_str()));

    let config = match &args.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::from_env()?,
    };
    log::debug!("当前配置: {config:?}");

    let pool = connect(&config).await?;
    let scores = ScoreService::new(
        pool.clone(),
        config.rating.clone(),
        Duration::from_secs(config.rating_cache_ttl_secs),
    );

    match args.command {
        Command::Init => {
            log::info!("Database initialized successfully");
        }
        Command::ImportCharts { file } => {
            let path = file.unwrap_or_else(|| config.chart_info_file.clone().into());
            let imported = ChartService::new(pool.clone())
                .import_from_file(&path)
                .await
                .with_context(|| format!("导入谱面定数失败: {}", path.display()))?;
            print_json(&serde_json::json!({ "imported": imported }))?;
        }
        Command::Submit {
            player,
            song,
            difficulty,
            score,
            shiny_pure,
            pure,
            far,
            lost,
            health,
            clear_type,
        } => {
            let submission = ScoreSubmission {
                chart: ChartId::new(song, difficulty),
                score,
                judgements: Judgements {
                    shiny_pure,
                    pure,
                    far,
                    lost,
                },
                health,
                clear_type,
            };
            let result = scores.submit(player, submission).await;
            print_json(&ScoreUploadResult::from_result(&result))?;
        }
        Command::Rating { player } => {
            let rating = scores.current_rating(player).await?;
            print_json(&serde_json::json!({ "player_id": player, "rating": rating }))?;
        }
        Command::Recompute { player } => {
            print_json(&scores.recompute_rating(player).await?)?;
        }
        Command::Lookup { player } => {
            print_json(&scores.lookup_scores(player).await?)?;
        }
        Command::Recent { player } => {
            print_json(&scores.recent_window(player).await?)?;
        }
        Command::Latest { player } => {
            print_json(&scores.most_recent_play(player).await?)?;
        }
        Command::History {
            player,
            song,
            difficulty,
        } => {
            let chart = song.zip(difficulty).map(|(song, difficulty)| ChartId::new(song, difficulty));
            print_json(&scores.play_history(player, chart.as_ref()).await?)?;
        }
    }

    pool.close().await;
    Ok(())
}
