//! Command implementations

pub mod down;
pub mod exec;
pub mod run_user_commands;
pub mod shared;
pub mod shell;
pub mod up;
