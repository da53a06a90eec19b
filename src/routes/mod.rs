//! Route modules for the PlantUML server

pub mod health;
pub mod mcp;
pub mod render;
