use serde::{Deserialize, Serialize};
use std::env;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use crate::utils::error::{AppError, AppResult};

/// 非 Recent 10 槽位的重复谱面策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// 允许同一谱面在溢出池中出现多次
    #[default]
    AllowDuplicates,
    /// 溢出池中每个谱面只保留最新的一条
    Deduplicate,
}

/// 评分聚合相关参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingConfig {
    /// 参与计算的 Best 数量
    pub best_count: usize,
    /// 最近游玩窗口容量
    pub recent_capacity: usize,
    /// Recent 10 数量
    pub recent_top_count: usize,
    #[serde(default)]
    pub overflow_policy: OverflowPolicy,
}

impl Default for RatingConfig {
    fn default() -> Self {
        Self {
            best_count: 30,
            recent_capacity: 30,
            recent_top_count: 10,
            overflow_policy: OverflowPolicy::AllowDuplicates,
        }
    }
}

impl RatingConfig {
    pub fn validate(&self) -> AppResult<()> {
        if self.best_count == 0 {
            return Err(AppError::ConfigError("BEST_COUNT 必须大于0".to_string()));
        }
        // 至少留一个溢出槽位，窗口满后才有可淘汰的位置
        if self.recent_top_count == 0 || self.recent_top_count >= self.recent_capacity {
            return Err(AppError::ConfigError(format!(
                "RECENT_TOP_COUNT ({}) 必须大于0且小于 RECENT_CAPACITY ({})",
                self.recent_top_count, self.recent_capacity
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub chart_info_file: String,
    pub rating_cache_ttl_secs: u64,
    #[serde(default)]
    pub rating: RatingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:rating_engine.db".to_string(),
            max_connections: 5,
            chart_info_file: "chart_info.csv".to_string(),
            rating_cache_ttl_secs: 300,
            rating: RatingConfig::default(),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> AppResult<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::ConfigError(format!("环境变量 {key}={raw} 解析失败: {e}"))),
        Err(_) => Ok(default),
    }
}

impl AppConfig {
    pub fn from_env() -> AppResult<Self> {
        dotenv::dotenv().ok();

        let defaults = Self::default();
        let dedup: bool = env_or("RECENT_OVERFLOW_DEDUP", false)?;

        let config = Self {
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            max_connections: env_or("DB_MAX_CONNECTIONS", defaults.max_connections)?,
            chart_info_file: env::var("CHART_INFO_FILE").unwrap_or(defaults.chart_info_file),
            rating_cache_ttl_secs: env_or("RATING_CACHE_TTL_SECS", defaults.rating_cache_ttl_secs)?,
            rating: RatingConfig {
                best_count: env_or("BEST_COUNT", defaults.rating.best_count)?,
                recent_capacity: env_or("RECENT_CAPACITY", defaults.rating.recent_capacity)?,
                recent_top_count: env_or("RECENT_TOP_COUNT", defaults.rating.recent_top_count)?,
                overflow_policy: if dedup {
                    OverflowPolicy::Deduplicate
                } else {
                    OverflowPolicy::AllowDuplicates
                },
            },
        };
        config.rating.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let mut file = File::open(path)
            .map_err(|e| AppError::ConfigError(format!("无法打开配置文件: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| AppError::ConfigError(format!("读取配置文件失败: {e}")))?;

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| AppError::ConfigError(format!("解析配置文件失败: {e}")))?;
        config.rating.validate()?;
        Ok(config)
    }
}
