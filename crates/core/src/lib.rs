//! Core library for Daggerwalk.
//!
//! Two independent components live here. The track scheduler decides which
//! song plays next (category-filtered shuffle, per-track repeats, periodic
//! silence) and hands its decisions to an external player. The debounced
//! writer persists the latest telemetry snapshot to a single slot with at
//! most one write in flight. Everything else in the crate exists to feed or
//! drive those two.

pub mod catalog;
pub mod clock;
pub mod command;
pub mod config;
pub mod error;
pub mod player;
pub mod scheduler;
pub mod telemetry;
pub mod writer;

pub use catalog::{Catalog, Category, CategoryFilter, TrackId};
pub use clock::{Clock, ManualClock, SystemClock};
pub use command::{execute, CommandOutcome, SongCommand};
pub use config::{AppConfig, SchedulerConfig, TelemetryConfig, WriterConfig};
pub use error::{DaggerwalkError, Result};
pub use player::{Player, SimulatedPlayer};
pub use scheduler::{Directive, SchedulerStatus, TrackScheduler};
pub use telemetry::{
    season_for_month, GameDate, LocationType, PlayerSample, Season, TelemetryLogger,
    TelemetrySnapshot, WeatherConditions,
};
pub use writer::{DebouncedWriter, FileStorage, Storage, WriterStats};
