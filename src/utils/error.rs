use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("谱面尚未定级: {song_id} (难度 {difficulty})")]
    UnratedChart { song_id: String, difficulty: u8 },

    #[error("无效的成绩提交: {0}")]
    InvalidSubmission(String),

    #[error("未找到玩家: {0}")]
    PlayerNotFound(i64),

    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("成绩窗口状态异常: {0}")]
    InvariantViolation(String),

    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("IO错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serde JSON错误: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    #[error("CSV错误: {0}")]
    CsvError(#[from] csv::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// 稳定的错误类型标识，供外部接口层组装响应
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::UnratedChart { .. } => "unrated_chart",
            AppError::InvalidSubmission(_) => "invalid_submission",
            AppError::PlayerNotFound(_) => "player_not_found",
            AppError::DatabaseError(_) => "database_error",
            AppError::InvariantViolation(_) => "invariant_violation",
            AppError::ConfigError(_) => "configuration_error",
            AppError::IoError(_) => "io_error",
            AppError::SerdeJsonError(_) => "serialization_error",
            AppError::CsvError(_) => "csv_error",
        }
    }

    /// 是否属于服务端内部错误（而非调用方输入问题）
    pub fn is_internal(&self) -> bool {
        !matches!(
            self,
            AppError::UnratedChart { .. }
                | AppError::InvalidSubmission(_)
                | AppError::PlayerNotFound(_)
        )
    }
}
