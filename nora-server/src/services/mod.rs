//! Domain logic behind the HTTP handlers.

pub mod company;
pub mod context;
pub mod envfile;
pub mod extract;
pub mod files;
pub mod language;
pub mod prompt;
pub mod transcribe;
pub mod transcript;
