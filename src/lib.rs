// Library interface for comic_sync
// This allows tests and external crates to use the sync components

pub mod comicvine;
pub mod config;
pub mod discovery;
pub mod error;
pub mod filter;
pub mod mylar;
pub mod pipeline;
pub mod state;
