//! Reading and writing the live-coding scripts tracks are generated as.

mod emit;
mod lexer;
mod lower;
mod parser;

pub use emit::render;

use crate::pattern::track::Track;

/// Parses a generated script. `fallback_name` names the track, usually the
/// file stem; when empty the loop's own name is used.
pub fn read_track(src: &str, fallback_name: &str) -> anyhow::Result<Track> {
    let stmts = parser::parse(src)?;
    lower::lower(&stmts, fallback_name)
}
