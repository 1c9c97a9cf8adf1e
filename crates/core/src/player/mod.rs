use std::{collections::VecDeque, time::Duration};

use crate::{Clock, Directive, TrackId};

/// Playback side of the scheduler. Implementations own the audio; the
/// scheduler only asks whether something is still audible and hands out
/// directives.
pub trait Player {
    fn is_playing(&self) -> bool;

    fn apply(&mut self, directive: Directive);

    /// Whether the host's own music director took playback back since the
    /// last directive.
    fn host_reclaimed(&self) -> bool {
        false
    }
}

/// Directives kept by [`SimulatedPlayer::history`].
pub const HISTORY_LIMIT: usize = 256;

/// Stand-in player where every track lasts a fixed length of time on a
/// shared clock.
#[derive(Debug)]
pub struct SimulatedPlayer<C: Clock> {
    clock: C,
    track_length: Duration,
    track: Option<TrackId>,
    started_at: Duration,
    muted: bool,
    host_director: bool,
    history: VecDeque<Directive>,
}

impl<C: Clock> SimulatedPlayer<C> {
    pub fn new(clock: C, track_length: Duration) -> Self {
        Self {
            clock,
            track_length,
            track: None,
            started_at: Duration::ZERO,
            muted: false,
            host_director: true,
            history: VecDeque::with_capacity(HISTORY_LIMIT),
        }
    }

    /// Track the player was last told to play, if any.
    pub fn track(&self) -> Option<TrackId> {
        self.track
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Whether the host's own music director currently has control.
    pub fn host_director_active(&self) -> bool {
        self.host_director
    }

    /// The most recent directives applied, oldest first, capped at
    /// [`HISTORY_LIMIT`].
    pub fn history(&self) -> &VecDeque<Directive> {
        &self.history
    }

    /// Simulates the host director taking over, e.g. after a scene load.
    pub fn host_takes_over(&mut self) {
        self.track = None;
        self.muted = false;
        self.host_director = true;
    }

    fn start(&mut self, track: TrackId) {
        self.host_director = false;
        self.track = Some(track);
        self.started_at = self.clock.now();
        self.muted = track.is_silence();
    }
}

impl<C: Clock> Player for SimulatedPlayer<C> {
    fn is_playing(&self) -> bool {
        match self.track {
            Some(track) if !track.is_silence() => {
                self.clock.now().saturating_sub(self.started_at) < self.track_length
            }
            _ => false,
        }
    }

    fn apply(&mut self, directive: Directive) {
        match directive {
            Directive::Idle => return,
            Directive::Play(track) | Directive::Replay(track) => self.start(track),
            Directive::ResumeDefault => self.host_takes_over(),
        }
        if self.history.len() == HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.history.push_back(directive);
    }

    fn host_reclaimed(&self) -> bool {
        self.host_director
    }
}
