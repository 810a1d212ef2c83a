pub mod agent;
pub mod analysis;
pub mod archive;
pub mod banner;
pub mod config;
pub mod consts;
pub mod crew;
pub mod document;
pub mod error;
pub mod events;
pub mod llm;
pub mod prompts;
pub mod spinner;
pub mod task;
pub mod tools;
