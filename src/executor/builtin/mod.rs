mod commands;
mod manager;

pub use manager::{BuiltinCommand, BuiltinManager};
