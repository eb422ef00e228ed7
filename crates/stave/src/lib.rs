pub mod config;
pub mod converter;
pub mod error;
pub mod git;
pub mod highlight;
pub mod item;
pub mod metadata;
pub mod outline;
pub mod pipeline;
pub mod plugins;
pub mod render;
pub mod sandbox;

pub use config::*;
pub use error::*;
pub use item::*;
pub use pipeline::*;
