pub mod api;
pub mod backend;
pub mod bridge;
pub mod config;
pub mod directory;
pub mod exec;
pub mod files;
pub mod render;
pub mod session;
pub mod source;
pub mod task;
pub mod tmux;
