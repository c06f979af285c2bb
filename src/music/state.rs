//! Per-guild playback state: what is playing, what is waiting, and where to announce it.
//!
//! The state is generic over the handle of the playing track so the queue rules can
//! be exercised without a voice driver.

use crate::music::reference::PendingTrack;
use poise::serenity_prelude as serenity;
use songbird::tracks::TrackHandle;
use std::collections::VecDeque;

/// Identity of a playing track, used to ignore end events from tracks that were replaced.
pub trait TrackIdentity: Clone {
    fn same_track(&self, other: &Self) -> bool;
}

impl TrackIdentity for TrackHandle {
    fn same_track(&self, other: &Self) -> bool {
        self.uuid() == other.uuid()
    }
}

#[derive(Debug, Clone)]
pub struct NowPlaying<H> {
    pub title: String,
    pub handle: H,
    pub paused: bool,
}

/// Reservation of the player for one start attempt. A stop or a newer start
/// invalidates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartTicket(u64);

#[derive(Debug, Clone)]
pub enum PlaybackStatus<H> {
    Idle,
    /// A track is being resolved and will start shortly.
    Starting(StartTicket),
    Playing(NowPlaying<H>),
}

/// What happened to a track handed to [`GuildPlayback::admit`].
#[derive(Debug, PartialEq, Eq)]
pub enum Admission {
    /// The player was idle; the caller must start the track with `ticket`.
    Start { track: PendingTrack, ticket: StartTicket },
    /// The track was appended; `position` is 1-based.
    Queued { position: usize },
}

#[derive(Debug, PartialEq, Eq)]
pub enum NextTrack {
    Track(PendingTrack),
    /// The queue was empty; the player is idle now.
    Empty,
    /// The ticket no longer holds the player.
    Superseded,
}

#[derive(Debug, PartialEq, Eq)]
pub enum PauseToggle<H> {
    Pause(H),
    Resume(H),
    NothingPlaying,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub now_playing: Option<String>,
    pub pending: Vec<String>,
}

#[derive(Debug)]
pub struct GuildPlayback<H = TrackHandle> {
    pub status: PlaybackStatus<H>,
    pub pending: VecDeque<PendingTrack>,
    pub announce_channel: Option<serenity::ChannelId>,
    /// Whether the voice call already carries our global event handlers.
    pub hooks_registered: bool,
    issued: u64,
}

impl<H> Default for GuildPlayback<H> {
    fn default() -> Self {
        Self {
            status: PlaybackStatus::Idle,
            pending: VecDeque::new(),
            announce_channel: None,
            hooks_registered: false,
            issued: 0,
        }
    }
}

impl<H: TrackIdentity> GuildPlayback<H> {
    pub fn is_idle(&self) -> bool {
        matches!(self.status, PlaybackStatus::Idle)
    }

    /// Whether `ticket` is still the pending start.
    pub fn holds(&self, ticket: StartTicket) -> bool {
        matches!(self.status, PlaybackStatus::Starting(current) if current == ticket)
    }

    fn reserve(&mut self) -> StartTicket {
        self.issued += 1;
        let ticket = StartTicket(self.issued);
        self.status = PlaybackStatus::Starting(ticket);
        ticket
    }

    pub fn current(&self) -> Option<&NowPlaying<H>> {
        match &self.status {
            PlaybackStatus::Playing(now) => Some(now),
            _ => None,
        }
    }

    /// Starts the track when nothing is playing, otherwise puts it at the back of the queue.
    pub fn admit(&mut self, track: PendingTrack) -> Admission {
        if self.is_idle() {
            let ticket = self.reserve();
            Admission::Start { track, ticket }
        } else {
            self.pending.push_back(track);
            Admission::Queued {
                position: self.pending.len(),
            }
        }
    }

    pub fn begin_playing(&mut self, title: String, handle: H) {
        self.status = PlaybackStatus::Playing(NowPlaying {
            title,
            handle,
            paused: false,
        });
    }

    /// Called when a track ends. When it was the current track the player is
    /// reserved for the queue advance and the reservation is returned.
    pub fn finish_if_current(&mut self, ended: &H) -> Option<StartTicket> {
        let is_current = self
            .current()
            .map(|now| now.handle.same_track(ended))
            .unwrap_or(false);
        is_current.then(|| self.reserve())
    }

    /// Pops the next pending track for the advance holding `ticket`, going idle
    /// when the queue is empty.
    pub fn take_next(&mut self, ticket: StartTicket) -> NextTrack {
        if !self.holds(ticket) {
            return NextTrack::Superseded;
        }
        match self.pending.pop_front() {
            Some(track) => NextTrack::Track(track),
            None => {
                self.status = PlaybackStatus::Idle;
                NextTrack::Empty
            }
        }
    }

    /// Clears the queue. Returns the handle to stop when a track is playing; a track
    /// still being resolved is abandoned.
    pub fn stop(&mut self) -> Option<H> {
        self.pending.clear();
        match &self.status {
            PlaybackStatus::Playing(now) => Some(now.handle.clone()),
            PlaybackStatus::Starting(_) => {
                self.status = PlaybackStatus::Idle;
                None
            }
            PlaybackStatus::Idle => None,
        }
    }

    pub fn toggle_pause(&mut self) -> PauseToggle<H> {
        match &mut self.status {
            PlaybackStatus::Playing(now) => {
                now.paused = !now.paused;
                if now.paused {
                    PauseToggle::Pause(now.handle.clone())
                } else {
                    PauseToggle::Resume(now.handle.clone())
                }
            }
            _ => PauseToggle::NothingPlaying,
        }
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            now_playing: self.current().map(|now| now.title.clone()),
            pending: self.pending.iter().map(|t| t.title.clone()).collect(),
        }
    }

    /// Forgets everything, as after leaving the voice channel.
    pub fn reset(&mut self) {
        self.status = PlaybackStatus::Idle;
        self.pending.clear();
        self.announce_channel = None;
        self.hooks_registered = false;
    }
}
