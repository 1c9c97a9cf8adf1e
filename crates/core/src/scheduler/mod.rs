use std::time::Duration;

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    Catalog, Category, CategoryFilter, Clock, DaggerwalkError, Player, Result, SchedulerConfig,
    SystemClock, TrackId,
};

/// Instruction for the external player produced by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Directive {
    /// Nothing to do this step.
    Idle,
    /// Start this track now. [`TrackId::SILENCE`] means stop and mute.
    Play(TrackId),
    /// Restart the current track from the beginning.
    Replay(TrackId),
    /// Hand playback back to the host's own music director.
    ResumeDefault,
}

/// Serializable view of the scheduler, used for status replies and telemetry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    pub current: Option<TrackId>,
    pub category: Option<Category>,
    pub shuffle: bool,
    pub filter: CategoryFilter,
    pub play_count: u32,
    pub tracks_since_silence: u32,
    pub elapsed_secs: f32,
}

#[derive(Debug, Clone, Default)]
struct SchedulerState {
    current: Option<TrackId>,
    shuffle: bool,
    filter: CategoryFilter,
    play_count: u32,
    since_silence: u32,
    silence_elapsed: Duration,
    started_at: Duration,
}

/// Decides which track plays next.
///
/// The scheduler never touches audio itself. Each call returns a [`Directive`]
/// and the only input it takes from the player is whether the current track
/// is still audible. All methods take `&mut self`; one scheduler serves one
/// timeline.
#[derive(Debug)]
pub struct TrackScheduler<C: Clock = SystemClock> {
    catalog: Catalog,
    clock: C,
    config: SchedulerConfig,
    rng: StdRng,
    state: SchedulerState,
}

impl<C: Clock> TrackScheduler<C> {
    pub fn new(catalog: Catalog, clock: C, config: SchedulerConfig) -> Self {
        Self::with_rng(catalog, clock, config, StdRng::from_entropy())
    }

    /// Creates a scheduler whose random choices are reproducible.
    pub fn with_seed(catalog: Catalog, clock: C, config: SchedulerConfig, seed: u64) -> Self {
        Self::with_rng(catalog, clock, config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(catalog: Catalog, clock: C, config: SchedulerConfig, rng: StdRng) -> Self {
        Self {
            catalog,
            clock,
            config,
            rng,
            state: SchedulerState::default(),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn current(&self) -> Option<TrackId> {
        self.state.current
    }

    pub fn is_shuffling(&self) -> bool {
        self.state.shuffle
    }

    pub fn filter(&self) -> &CategoryFilter {
        &self.state.filter
    }

    pub fn play_count(&self) -> u32 {
        self.state.play_count
    }

    pub fn tracks_since_silence(&self) -> u32 {
        self.state.since_silence
    }

    pub fn status(&self) -> SchedulerStatus {
        let current = self.state.current;
        SchedulerStatus {
            current,
            category: current.and_then(|track| self.catalog.category_of(track)),
            shuffle: self.state.shuffle,
            filter: self.state.filter.clone(),
            play_count: self.state.play_count,
            tracks_since_silence: self.state.since_silence,
            elapsed_secs: current
                .map(|_| self.clock.now().saturating_sub(self.state.started_at).as_secs_f32())
                .unwrap_or(0.0),
        }
    }

    /// Replaces the active category filter and resets the repeat and silence
    /// counters. Leaves the scheduler untouched on error.
    pub fn configure<I, S>(&mut self, names: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let filter = CategoryFilter::parse(names)?;
        self.apply_filter(filter)?;
        Ok(())
    }

    /// Configures the filter, turns shuffle on and immediately picks a track.
    pub fn enable_shuffle<I, S>(&mut self, names: I) -> Result<Directive>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let filter = CategoryFilter::parse(names)?;
        let pool = self.apply_filter(filter)?;
        self.state.shuffle = true;

        let track = self.pick(&pool).ok_or(DaggerwalkError::EmptyPool)?;
        info!(filter = %self.state.filter, %track, "shuffle enabled");
        Ok(self.start_track(track))
    }

    /// Makes `track` current regardless of category. The shuffle flag is kept.
    pub fn select_explicit(&mut self, track: TrackId) -> Result<Directive> {
        if !self.catalog.contains(track) {
            return Err(DaggerwalkError::UnknownTrack(track));
        }
        Ok(self.start_track(track))
    }

    /// Picks any categorized track without touching the shuffle settings.
    pub fn select_random(&mut self) -> Result<Directive> {
        let pool = self.catalog.pool(&CategoryFilter::All);
        let track = self.pick(&pool).ok_or(DaggerwalkError::EmptyPool)?;
        Ok(self.start_track(track))
    }

    /// Picks a random track from one category without touching the shuffle
    /// settings.
    pub fn select_from_category(&mut self, category: Category) -> Result<Directive> {
        let pool = self.catalog.pool(&CategoryFilter::only(category));
        let track = self.pick(&pool).ok_or(DaggerwalkError::EmptyPool)?;
        Ok(self.start_track(track))
    }

    /// Drops every override and tells the caller to resume default playback.
    pub fn disable(&mut self) -> Directive {
        if self.state.current.is_some() {
            info!("resuming default music");
        }
        self.state = SchedulerState::default();
        Directive::ResumeDefault
    }

    /// The host took the music back on its own; forget the override without
    /// asking it to resume anything.
    pub fn yield_to_host(&mut self) {
        if self.state.current.is_some() {
            info!("host music director reclaimed playback, clearing override");
        }
        self.state.current = None;
        self.state.shuffle = false;
    }

    /// Advances the scheduler by one step.
    pub fn tick(&mut self, still_playing: bool) -> Directive {
        let delta = self.clock.delta();
        let Some(current) = self.state.current else {
            return Directive::Idle;
        };

        let finished = if current.is_silence() {
            self.state.silence_elapsed = self.state.silence_elapsed.saturating_add(delta);
            self.state.silence_elapsed >= self.config.silence_duration()
        } else {
            !still_playing
        };

        if !finished {
            return Directive::Idle;
        }

        debug!(
            %current,
            played_secs = self.clock.now().saturating_sub(self.state.started_at).as_secs_f32(),
            "track finished"
        );

        if self.state.shuffle {
            self.complete(current)
        } else {
            self.replay(current)
        }
    }

    /// Runs one [`tick`](Self::tick) against `player` and forwards any
    /// resulting directive to it. If the host's own director has taken
    /// playback back, the override is dropped instead.
    pub fn tick_with<P: Player + ?Sized>(&mut self, player: &mut P) -> Directive {
        if self.state.current.is_some() && player.host_reclaimed() {
            self.yield_to_host();
            return Directive::Idle;
        }
        let directive = self.tick(player.is_playing());
        if directive != Directive::Idle {
            player.apply(directive);
        }
        directive
    }

    fn complete(&mut self, current: TrackId) -> Directive {
        self.state.play_count += 1;
        if self.state.play_count < self.config.repeats_per_track {
            debug!(
                %current,
                play = self.state.play_count + 1,
                of = self.config.repeats_per_track,
                "replaying current track"
            );
            return self.replay(current);
        }

        if !current.is_silence() && self.state.since_silence >= self.config.tracks_before_silence
        {
            info!(tracks = self.state.since_silence, "inserting silence");
            self.state.since_silence = 0;
            return self.start_track(TrackId::SILENCE);
        }

        let pool = self.catalog.pool(&self.state.filter);
        let next = match self.pick(&pool) {
            Some(track) => track,
            None => {
                warn!(filter = %self.state.filter, "shuffle pool is empty, falling back to silence");
                TrackId::SILENCE
            }
        };

        if next.is_silence() {
            self.state.since_silence = 0;
        } else {
            self.state.since_silence += 1;
        }
        self.start_track(next)
    }

    fn apply_filter(&mut self, filter: CategoryFilter) -> Result<Vec<TrackId>> {
        let pool = self.catalog.pool(&filter);
        if pool.is_empty() {
            return Err(DaggerwalkError::EmptyPool);
        }
        debug!(%filter, tracks = pool.len(), "category filter applied");
        self.state.filter = filter;
        self.state.play_count = 0;
        self.state.since_silence = 0;
        Ok(pool)
    }

    /// Uniform choice over `pool`, leaving out the current track whenever
    /// something else is available.
    fn pick(&mut self, pool: &[TrackId]) -> Option<TrackId> {
        match self.state.current {
            Some(current) if pool.len() > 1 => {
                let others: Vec<TrackId> =
                    pool.iter().copied().filter(|track| *track != current).collect();
                others.choose(&mut self.rng).copied()
            }
            _ => pool.choose(&mut self.rng).copied(),
        }
    }

    fn start_track(&mut self, track: TrackId) -> Directive {
        let category = self.catalog.category_of(track).unwrap_or(Category::Unknown);
        info!(%track, %category, "now playing");
        self.state.current = Some(track);
        self.state.play_count = 0;
        self.state.silence_elapsed = Duration::ZERO;
        self.state.started_at = self.clock.now();
        Directive::Play(track)
    }

    fn replay(&mut self, track: TrackId) -> Directive {
        self.state.silence_elapsed = Duration::ZERO;
        self.state.started_at = self.clock.now();
        Directive::Replay(track)
    }
}
