pub mod assets;
pub mod cli;
pub mod config;
pub mod media;
pub mod pipeline;
pub mod player;
