pub mod chart;
pub mod play;
pub mod rating;

pub use chart::*;
pub use play::*;
pub use rating::*;
