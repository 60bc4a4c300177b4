//! Skillrunner: the Skill Execution Engine and its direct collaborators.
//! The CLI binary (`main.rs`) is a thin demonstration
//! harness around [`engine::SkillExecutionEngine::run`]; workspace,
//! session, rule, context-item, MCP-server, sync-backend and terminal-
//! multiplexer subsystems are out of scope and live nowhere in this
//! crate.

pub mod config;
pub mod engine;
pub mod errors;
