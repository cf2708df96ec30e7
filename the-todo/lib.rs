use smartstring::{LazyCompact, SmartString};

pub mod anchor;
pub mod cache;
pub mod config;
pub mod discovery;
pub mod document;
pub mod edit;
pub mod engine;
pub mod history;
pub mod hunk;
pub mod item;
pub mod markdown;
pub mod messages;
pub mod metadata;
pub mod position;
pub mod registry;
pub mod transaction;
pub mod tree;

pub use engine::TodoEngine;

pub type Tendril = SmartString<LazyCompact>;
