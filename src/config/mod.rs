//! Configuration Registry (C1): an immutable, typed view over the daemon's
//! configuration, loaded once at startup and shared by reference.

mod settings;

pub use settings::{LanguageConfig, LanguageOverride, Settings};
