//! Historical mode: rewind the player by a fixed offset and screenshot it.

pub mod controller;

pub use controller::HistoricalController;
