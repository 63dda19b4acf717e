pub mod cli;
pub mod core;
pub mod encode;
pub mod ffmpeg;
pub mod model;
pub mod queue;
pub mod scheduler;
pub mod types;
pub mod utils;

// Re-export for easier access
pub use cli::*;
pub use self::core::*;
pub use encode::*;
pub use ffmpeg::*;
pub use model::*;
pub use queue::*;
pub use scheduler::*;
pub use types::*;
pub use utils::*;
