//! Phase timeline: the six-state reveal machine.
//!
//! [`PhaseState::advanced`] is the whole contract: a pure `(state, now) -> state`
//! transition. Character reveals and the Title..Signature transitions only move
//! on typewriter ticks (more than `typewriter_speed` ms since the last tick);
//! Flash and FadeOut are driven by elapsed time alone.

use serde::Serialize;

use crate::noise::ease_out_quad;
use crate::schema::Script;

/// The loop stops scheduling frames once the fade reaches this progress.
pub const FADE_COMPLETE_THRESHOLD: f32 = 0.99;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Phase {
    Title,
    Greeting,
    Poem,
    Signature,
    Flash,
    FadeOut,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::Title,
        Phase::Greeting,
        Phase::Poem,
        Phase::Signature,
        Phase::Flash,
        Phase::FadeOut,
    ];

    pub fn next(self) -> Option<Phase> {
        match self {
            Phase::Title => Some(Phase::Greeting),
            Phase::Greeting => Some(Phase::Poem),
            Phase::Poem => Some(Phase::Signature),
            Phase::Signature => Some(Phase::Flash),
            Phase::Flash => Some(Phase::FadeOut),
            Phase::FadeOut => None,
        }
    }

    /// Text is only painted before the flash.
    pub fn paints_text(self) -> bool {
        self < Phase::Flash
    }

    /// The signature overlay is processed and composited in these phases.
    pub fn shows_signature_overlay(self) -> bool {
        matches!(self, Phase::Signature | Phase::Flash)
    }

    pub fn label(self) -> &'static str {
        match self {
            Phase::Title => "title",
            Phase::Greeting => "greeting",
            Phase::Poem => "poem",
            Phase::Signature => "signature",
            Phase::Flash => "flash",
            Phase::FadeOut => "fade_out",
        }
    }
}

/// Snapshot of the reveal. Timestamps are host milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PhaseState {
    pub phase: Phase,
    pub char_index: usize,
    pub poem_line_index: usize,
    pub poem_char_index: usize,
    pub signature_char_index: usize,
    pub signature_complete_at: Option<u64>,
    pub flash_started_at: Option<u64>,
    pub phase_started_at: u64,
    pub fade_progress: f32,
    pub last_typed_at: u64,
}

impl PhaseState {
    pub fn new(start_ms: u64) -> Self {
        Self {
            phase: Phase::Title,
            char_index: 0,
            poem_line_index: 0,
            poem_char_index: 0,
            signature_char_index: 0,
            signature_complete_at: None,
            flash_started_at: None,
            phase_started_at: start_ms,
            fade_progress: 0.0,
            last_typed_at: start_ms,
        }
    }

    /// Pure transition function. `now` earlier than a recorded timestamp is
    /// treated as zero elapsed time, never as a rewind.
    pub fn advanced(self, script: &Script, now: u64) -> Self {
        let timing = &script.timing;
        let mut next = self;

        match self.phase {
            Phase::Flash => {
                let started = self.flash_started_at.unwrap_or(self.phase_started_at);
                if now.saturating_sub(started) > timing.flash_duration {
                    next.enter(Phase::FadeOut, now);
                }
                return next;
            }
            Phase::FadeOut => {
                let elapsed = now.saturating_sub(self.phase_started_at) as f32;
                let progress = (elapsed / timing.fade_duration as f32).clamp(0.0, 1.0);
                next.fade_progress = progress.max(self.fade_progress);
                return next;
            }
            _ => {}
        }

        if now.saturating_sub(self.last_typed_at) <= timing.typewriter_speed {
            return next;
        }
        next.last_typed_at = now;

        let speed = timing.typewriter_speed;
        let delay = timing.inter_section_delay;
        let elapsed = now.saturating_sub(self.phase_started_at);

        match self.phase {
            Phase::Title => {
                let len = script.title_len();
                if self.char_index < len {
                    next.char_index += 1;
                } else if elapsed > typing_time(len, speed) + delay {
                    next.enter(Phase::Greeting, now);
                }
            }
            Phase::Greeting => {
                let len = script.greeting_len();
                if self.char_index < len {
                    next.char_index += 1;
                } else if elapsed > typing_time(len, speed) + delay {
                    next.enter(Phase::Poem, now);
                }
            }
            Phase::Poem => {
                if self.poem_line_index < script.poem.len() {
                    let len = script.poem_line_len(self.poem_line_index);
                    if self.poem_char_index < len {
                        next.poem_char_index += 1;
                    } else if elapsed > typing_time(len, speed) + delay / 2 {
                        next.poem_line_index += 1;
                        next.poem_char_index = 0;
                        next.phase_started_at = now;
                    }
                } else if elapsed > delay {
                    next.enter(Phase::Signature, now);
                }
            }
            Phase::Signature => {
                if self.signature_char_index < script.signature_len() {
                    next.signature_char_index += 1;
                } else {
                    match self.signature_complete_at {
                        None => next.signature_complete_at = Some(now),
                        Some(done) if now.saturating_sub(done) > timing.signature_hold => {
                            next.enter(Phase::Flash, now);
                            next.flash_started_at = Some(now);
                        }
                        Some(_) => {}
                    }
                }
            }
            Phase::Flash | Phase::FadeOut => unreachable!("time-gated phases return early"),
        }

        next
    }

    fn enter(&mut self, phase: Phase, now: u64) {
        self.phase = phase;
        self.phase_started_at = now;
        self.char_index = 0;
        match phase {
            Phase::Poem => {
                self.poem_line_index = 0;
                self.poem_char_index = 0;
            }
            Phase::Signature => self.signature_char_index = 0,
            _ => {}
        }
    }

    pub fn eased_fade(&self) -> f32 {
        ease_out_quad(self.fade_progress)
    }

    pub fn is_complete(&self) -> bool {
        self.phase == Phase::FadeOut && self.fade_progress >= FADE_COMPLETE_THRESHOLD
    }
}

fn typing_time(len: usize, speed: u64) -> u64 {
    (len as u64).saturating_mul(speed)
}

/// Owner of the one live [`PhaseState`].
#[derive(Debug, Clone)]
pub struct Timeline {
    state: PhaseState,
}

impl Timeline {
    pub fn new(start_ms: u64) -> Self {
        Self {
            state: PhaseState::new(start_ms),
        }
    }

    pub fn state(&self) -> &PhaseState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    /// Advance to `now`. Returns `(from, to)` when the phase changed.
    pub fn advance(&mut self, script: &Script, now: u64) -> Option<(Phase, Phase)> {
        let before = self.state.phase;
        self.state = self.state.advanced(script, now);
        let after = self.state.phase;
        (before != after).then_some((before, after))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PhaseMark {
    pub phase: Phase,
    pub starts_at_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseSchedule {
    pub step_ms: u64,
    pub marks: Vec<PhaseMark>,
    pub completes_at_ms: Option<u64>,
}

/// Replays the timeline on a fixed-step clock and records when each phase
/// begins. `max_ms` bounds the replay for absurd scripts.
pub fn schedule(script: &Script, step_ms: u64, max_ms: u64) -> PhaseSchedule {
    let step_ms = step_ms.max(1);
    let mut state = PhaseState::new(0);
    let mut marks = vec![PhaseMark {
        phase: Phase::Title,
        starts_at_ms: 0,
    }];
    let mut now = 0;

    while now < max_ms {
        now += step_ms;
        let before = state.phase;
        state = state.advanced(script, now);
        if state.phase != before {
            marks.push(PhaseMark {
                phase: state.phase,
                starts_at_ms: now,
            });
        }
        if state.is_complete() {
            return PhaseSchedule {
                step_ms,
                marks,
                completes_at_ms: Some(now),
            };
        }
    }

    PhaseSchedule {
        step_ms,
        marks,
        completes_at_ms: None,
    }
}
