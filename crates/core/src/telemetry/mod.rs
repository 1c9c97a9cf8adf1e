use std::{fmt, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{DebouncedWriter, Result, Storage, TelemetryConfig, TrackId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Autumn,
    Unknown,
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Season::Winter => "Winter",
            Season::Spring => "Spring",
            Season::Summer => "Summer",
            Season::Autumn => "Autumn",
            Season::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// Maps a Tamrielic month name to its season. Curly apostrophes are accepted.
pub fn season_for_month(month: &str) -> Season {
    match month.replace('\u{2019}', "'").as_str() {
        "Morning Star" | "Sun's Dawn" | "First Seed" => Season::Winter,
        "Rain's Hand" | "Second Seed" | "Mid Year" => Season::Spring,
        "Sun's Height" | "Last Seed" | "Hearthfire" => Season::Summer,
        "Frostfall" | "Sun's Dusk" | "Evening Star" => Season::Autumn,
        other => {
            warn!(month = other, "unexpected month name, season unknown");
            Season::Unknown
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocationType {
    Interior,
    Dungeon,
    Town,
    Wilderness,
}

/// Raw weather flags as reported by the game.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherConditions {
    pub raining: bool,
    pub snowing: bool,
    pub storming: bool,
    pub overcast: bool,
    pub fog_density: f32,
    pub daytime: bool,
}

impl WeatherConditions {
    pub fn describe(&self) -> &'static str {
        match self {
            Self { raining: true, storming: true, .. } => "Thunderstorm",
            Self { snowing: true, storming: true, .. } => "Blizzard",
            Self { raining: true, .. } => "Rainy",
            Self { snowing: true, .. } => "Snowy",
            Self { overcast: true, fog_density, .. } if *fog_density > 0.02 => "Foggy",
            Self { overcast: true, .. } => "Cloudy",
            Self { daytime: true, .. } => "Sunny",
            _ => "Clear",
        }
    }
}

/// In-game calendar position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameDate {
    pub day_name: String,
    pub day_of_month: u32,
    pub month_name: String,
    pub year: u32,
    /// Short clock string, e.g. `"13:05"`.
    pub time: String,
}

impl fmt::Display for GameDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {} {}, 3E {}, {}",
            self.day_name, self.day_of_month, self.month_name, self.year, self.time
        )
    }
}

/// Everything the host reports about the player at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSample {
    pub name: Option<String>,
    pub race: Option<String>,
    pub class: Option<String>,
    pub world_x: i32,
    pub world_z: i32,
    pub map_pixel: (i32, i32),
    pub region: String,
    /// Name of the loaded location, `None` in the wilderness.
    pub location: Option<String>,
    pub location_type: LocationType,
    pub position: [f32; 3],
    pub date: GameDate,
    pub weather: WeatherConditions,
    pub health: i32,
    pub max_health: i32,
    pub fatigue: i32,
    pub magicka: i32,
    pub gold: i32,
    pub level: i32,
}

/// One persisted telemetry record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySnapshot {
    pub player_name: String,
    pub player_race: String,
    pub player_class: String,
    pub world_x: i32,
    pub world_z: i32,
    pub map_pixel_x: i32,
    pub map_pixel_y: i32,
    pub region: String,
    pub location: String,
    pub location_type: LocationType,
    pub player_x: f32,
    pub player_y: f32,
    pub player_z: f32,
    pub day_of_week: String,
    pub date: String,
    pub real_time_utc: String,
    pub season: Season,
    pub weather: String,
    pub health: i32,
    pub max_health: i32,
    pub fatigue: i32,
    pub magicka: i32,
    pub gold: i32,
    pub level: i32,
    pub current_song: String,
}

impl TelemetrySnapshot {
    pub fn capture(sample: &PlayerSample, current_song: Option<TrackId>, now: DateTime<Utc>) -> Self {
        let [player_x, player_y, player_z] = sample.position;
        Self {
            player_name: sample.name.clone().unwrap_or_else(|| "Unknown".to_string()),
            player_race: sample.race.clone().unwrap_or_else(|| "Unknown Race".to_string()),
            player_class: sample.class.clone().unwrap_or_else(|| "Unknown Class".to_string()),
            world_x: sample.world_x,
            world_z: sample.world_z,
            map_pixel_x: sample.map_pixel.0,
            map_pixel_y: sample.map_pixel.1,
            region: sample.region.clone(),
            location: sample.location.clone().unwrap_or_else(|| "Wilderness".to_string()),
            location_type: sample.location_type,
            player_x,
            player_y,
            player_z,
            day_of_week: sample.date.day_name.clone(),
            date: sample.date.to_string(),
            real_time_utc: now.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            season: season_for_month(&sample.date.month_name),
            weather: sample.weather.describe().to_string(),
            health: sample.health,
            max_health: sample.max_health,
            fatigue: sample.fatigue,
            magicka: sample.magicka,
            gold: sample.gold,
            level: sample.level,
            current_song: match current_song {
                Some(track) if !track.is_silence() => track.to_string(),
                _ => "None".to_string(),
            },
        }
    }

    /// Same as [`capture`](Self::capture), stamped with the current time.
    pub fn capture_now(sample: &PlayerSample, current_song: Option<TrackId>) -> Self {
        Self::capture(sample, current_song, Utc::now())
    }
}

/// Periodic snapshot logger.
///
/// Nothing is recorded until the world has been initialized and a save has
/// been loaded, in either order. Once both have happened the first
/// [`poll`](Self::poll) records immediately and later ones every interval.
#[derive(Debug)]
pub struct TelemetryLogger<S: Storage> {
    writer: DebouncedWriter<S>,
    interval: Duration,
    world_ready: bool,
    save_loaded: bool,
    last_logged: Option<Duration>,
}

impl<S: Storage> TelemetryLogger<S> {
    pub fn new(writer: DebouncedWriter<S>, config: &TelemetryConfig) -> Self {
        Self {
            writer,
            interval: config.interval(),
            world_ready: false,
            save_loaded: false,
            last_logged: None,
        }
    }

    pub fn writer(&self) -> &DebouncedWriter<S> {
        &self.writer
    }

    pub fn is_ready(&self) -> bool {
        self.world_ready && self.save_loaded
    }

    /// Returns `false` if the world was already initialized.
    pub fn on_world_initialized(&mut self) -> bool {
        if self.world_ready {
            warn!("telemetry logger already initialized, skipping");
            return false;
        }
        self.world_ready = true;
        info!(save_loaded = self.save_loaded, "telemetry logger initialized");
        true
    }

    pub fn on_save_loaded(&mut self) {
        self.save_loaded = true;
        self.last_logged = None;
        info!("save loaded, telemetry logging enabled");
    }

    /// Submits `snapshot` if logging is enabled. Returns whether it was
    /// submitted.
    pub fn record(&self, snapshot: &TelemetrySnapshot) -> Result<bool> {
        if !self.is_ready() {
            warn!("telemetry logger not ready, skipping snapshot");
            return Ok(false);
        }
        self.writer.submit_json(snapshot)?;
        Ok(true)
    }

    pub fn is_due(&self, now: Duration) -> bool {
        self.is_ready()
            && self
                .last_logged
                .map_or(true, |last| now.saturating_sub(last) >= self.interval)
    }

    /// Records a snapshot built by `capture` when one is due at `now`.
    pub fn poll<F>(&mut self, now: Duration, capture: F) -> Result<bool>
    where
        F: FnOnce() -> TelemetrySnapshot,
    {
        if !self.is_due(now) {
            return Ok(false);
        }
        let recorded = self.record(&capture())?;
        self.last_logged = Some(now);
        debug!(at_secs = now.as_secs_f32(), "telemetry snapshot submitted");
        Ok(recorded)
    }

    /// Writes out any pending snapshot before teardown.
    pub fn shutdown(&self) {
        info!("telemetry logger shutting down");
        self.writer.flush();
    }
}
