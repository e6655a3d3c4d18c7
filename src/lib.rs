pub mod broadcaster;
pub mod config;
pub mod ipc;
pub mod scripts;
pub mod supervisor;
