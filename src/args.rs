use clap::{Parser, Subcommand};
use std::path::PathBuf;

use rating_engine::models::chart::Difficulty;
use rating_engine::models::play::ClearType;

#[derive(Parser, Clone)]
#[command(
    display_name = "Rating Engine",
    long_about = "Score submission and player rating aggregation"
)]
pub struct Args {
    /// JSON 配置文件，未指定时从环境变量 (.env) 读取
    #[arg(short, long, env = "RATING_ENGINE_CONFIG")]
    pub config: Option<PathBuf>,

    /// 日志级别，RUST_LOG 优先
    #[arg(
        short,
        long,
        default_value = "info",
        value_parser = ["trace", "debug", "info", "warn", "error"],
        help = "Sets the logging verbosity"
    )]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Clone)]
pub enum Command {
    /// 创建数据表
    Init,
    /// 从 CSV 导入谱面定数
    ImportCharts {
        /// 默认使用配置中的 chart_info_file
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// 提交一次游玩成绩
    Submit {
        #[arg(short, long)]
        player: i64,
        #[arg(short, long)]
        song: String,
        /// 0-3 或 PST/PRS/FTR/BYD
        #[arg(short, long, value_parser = parse_difficulty)]
        difficulty: Difficulty,
        #[arg(long)]
        score: i64,
        #[arg(long, default_value_t = 0)]
        shiny_pure: u32,
        #[arg(long, default_value_t = 0)]
        pure: u32,
        #[arg(long, default_value_t = 0)]
        far: u32,
        #[arg(long, default_value_t = 0)]
        lost: u32,
        #[arg(long, default_value_t = 100)]
        health: i32,
        /// 0-5 (track-lost, normal-clear, full-recall, pure-memory, easy-clear, hard-clear)
        #[arg(long, value_parser = parse_clear_type, default_value = "1")]
        clear_type: ClearType,
    },
    /// 查询玩家当前评分
    Rating {
        #[arg(short, long)]
        player: i64,
    },
    /// 重新计算玩家评分
    Recompute {
        #[arg(short, long)]
        player: i64,
    },
    /// Best 30 与 Recent 10 总览
    Lookup {
        #[arg(short, long)]
        player: i64,
    },
    /// 最近游玩窗口的全部槽位
    Recent {
        #[arg(short, long)]
        player: i64,
    },
    /// 最近一次游玩
    Latest {
        #[arg(short, long)]
        player: i64,
    },
    /// 游玩流水，可按谱面过滤
    History {
        #[arg(short, long)]
        player: i64,
        #[arg(short, long, requires = "difficulty")]
        song: Option<String>,
        #[arg(short, long, value_parser = parse_difficulty, requires = "song")]
        difficulty: Option<Difficulty>,
    },
}

fn parse_difficulty(raw: &str) -> Result<Difficulty, String> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "PST" => Ok(Difficulty::Past),
        "PRS" => Ok(Difficulty::Present),
        "FTR" => Ok(Difficulty::Future),
        "BYD" => Ok(Difficulty::Beyond),
        other => other
            .parse::<u8>()
            .map_err(|_| format!("无法识别的难度: {raw}"))
            .and_then(Difficulty::try_from),
    }
}

fn parse_clear_type(raw: &str) -> Result<ClearType, String> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| format!("无法识别的通关类型: {raw}"))
        .and_then(ClearType::try_from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difficulty_accepts_names_and_numbers() {
        assert_eq!(parse_difficulty("ftr"), Ok(Difficulty::Future));
        assert_eq!(parse_difficulty("3"), Ok(Difficulty::Beyond));
        assert!(parse_difficulty("4").is_err());
        assert!(parse_difficulty("EX").is_err());
    }

    #[test]
    fn parses_submit_command() {
        let args = Args::try_parse_from([
            "rating-engine", "submit", "--player", "1", "--song", "fairytale",
            "--difficulty", "PRS", "--score", "9900000", "--clear-type", "5",
        ])
        .unwrap();
        match args.command {
            Command::Submit {
                difficulty,
                clear_type,
                health,
                ..
            } => {
                assert_eq!(difficulty, Difficulty::Present);
                assert_eq!(clear_type, ClearType::HardClear);
                assert_eq!(health, 100);
            }
            _ => panic!("expected submit"),
        }
    }
}
