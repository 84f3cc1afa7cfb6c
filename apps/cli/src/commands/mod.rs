//! 命令定义和实现

pub mod config;
pub mod profiles;
pub mod run;

pub use config::ConfigCommand;
pub use profiles::ProfilesCommand;
pub use run::RunCommand;
