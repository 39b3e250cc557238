pub mod aggregator;
pub mod best_chart;
pub mod chart_service;
pub mod player_lock;
pub mod recent_window;
pub mod score_service;
pub mod score_store;

// 重新导出主要的服务结构体，以便可以直接从 services 模块导入
pub use chart_service::ChartService;
pub use score_service::ScoreService;
