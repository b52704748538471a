pub mod chat;
pub mod command_log;
pub mod status;
