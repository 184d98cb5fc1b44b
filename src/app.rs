//! CLI definition, logging setup and the one-shot status commands.

pub mod cli;
pub mod logging;
pub mod status;
