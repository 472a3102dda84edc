//! Recording and replay of click routines.
//!
//! `recorder` turns live press/release notifications into a `Routine`,
//! `player` replays one on a background thread under `PlayerControl`, and
//! `routine_file` persists routines as JSON.

pub mod player;
pub mod recorder;
pub mod routine_file;
