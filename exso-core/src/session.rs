//! Playback Session Controller
//!
//! Owns the elapsed-time clock for one artifact on one page load. The host
//! drives it with timestamps (`on_frame` per animation frame, `tick` from
//! its timers) and pointer events; the session decides phase changes, media
//! side effects and progress checkpoints.
//!
//! Phases move through a transition table (`transition`) so that late
//! timers and repeated host callbacks cannot push the session into an
//! invalid state:
//!
//! ```text
//! NotStarted -> Running <-> Paused(cause) ; Running -> FinalLine
//! FinalLine -> FinishedOnce -> ReplyEnabled ; any -> TornDown
//! ```

use tracing::{debug, warn};

use crate::gesture::{GestureSignal, HoldGesture, PointerKind, HOLD_DEBOUNCE_MS};
use crate::storage::{LocalStore, PlaybackProgress, ProgressSlot};
use crate::timeline::{LineFrame, Timeline};
use crate::types::Artifact;

/// Route of the reply composer, parameterised with the artifact id
pub const REPLY_ROUTE_PREFIX: &str = "/xso/quiet?replyTo=";

// ============================================================================
// Media boundary
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MediaError {
    /// Browser autoplay policy refused playback
    #[error("playback blocked by autoplay policy")]
    Blocked,

    #[error("media unavailable: {0}")]
    Unavailable(String),
}

/// Audio/video elements the session controls
pub trait MediaSink {
    /// Start or resume both tracks
    fn play(&mut self, muted: bool) -> Result<(), MediaError>;
    fn pause(&mut self);
    fn set_muted(&mut self, muted: bool) -> Result<(), MediaError>;
}

// ============================================================================
// Phases and transitions
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PauseCause {
    Hold,
    ExitConfirm,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    NotStarted,
    Running,
    Paused(PauseCause),
    /// Clock frozen at the completion instant
    FinalLine,
    /// Completion latched at least once
    FinishedOnce,
    ReplyEnabled,
    TornDown,
}

impl Phase {
    /// Clock has stopped for good
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            Phase::FinalLine | Phase::FinishedOnce | Phase::ReplyEnabled
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    Start,
    Pause(PauseCause),
    Resume(PauseCause),
    FinalReached,
    Latch,
    ReplyUnlocked,
    Teardown,
}

/// The transition table; `None` means the event is ignored in this phase
pub fn transition(phase: Phase, event: SessionEvent) -> Option<Phase> {
    use SessionEvent as E;

    match (phase, event) {
        (Phase::TornDown, _) => None,
        (_, E::Teardown) => Some(Phase::TornDown),
        (Phase::NotStarted, E::Start) => Some(Phase::Running),
        (Phase::Running, E::Pause(cause)) => Some(Phase::Paused(cause)),
        // The confirm overlay takes over a held pause; only closing it resumes
        (Phase::Paused(PauseCause::Hold), E::Pause(PauseCause::ExitConfirm)) => {
            Some(Phase::Paused(PauseCause::ExitConfirm))
        }
        (Phase::Paused(held), E::Resume(cause)) if held == cause => Some(Phase::Running),
        (Phase::Running, E::FinalReached) => Some(Phase::FinalLine),
        (Phase::FinalLine, E::Latch) => Some(Phase::FinishedOnce),
        (Phase::FinishedOnce, E::ReplyUnlocked) => Some(Phase::ReplyEnabled),
        _ => None,
    }
}

// ============================================================================
// Session
// ============================================================================

#[derive(Clone, Copy, Debug)]
pub struct SessionConfig {
    /// Render cadence; frames inside the same bucket are skipped
    pub render_bucket_ms: f64,
    /// Minimum elapsed-time distance between progress writes
    pub checkpoint_interval_ms: f64,
    /// Delay between first reaching the final line and reply unlock
    pub reply_delay_ms: f64,
    pub hold_debounce_ms: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            render_bucket_ms: 50.0,
            checkpoint_interval_ms: 1000.0,
            reply_delay_ms: 6000.0,
            hold_debounce_ms: HOLD_DEBOUNCE_MS,
        }
    }
}

/// What the host should draw
#[derive(Clone, Debug, PartialEq)]
pub struct RenderFrame {
    pub elapsed_ms: f64,
    pub lines: Vec<LineFrame>,
    /// Multiplier for the text layer (1.0 unless hold-paused)
    pub dim: f64,
    pub is_final: bool,
}

/// Exit confirmation overlay state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExitConfirm {
    /// Remaining opens of the share link, when known
    pub uses_remaining: Option<u32>,
}

pub struct PlaybackSession<M: MediaSink, S: LocalStore> {
    exso_id: String,
    timeline: Timeline,
    media: M,
    store: S,
    config: SessionConfig,
    phase: Phase,
    gesture: HoldGesture,
    /// `now - elapsed` while running
    anchor_ms: f64,
    elapsed_ms: f64,
    last_bucket: Option<i64>,
    last_saved_ms: f64,
    restored: bool,
    reply_at: Option<f64>,
    sound_blocked: bool,
    exit_confirm: Option<ExitConfirm>,
}

impl<M: MediaSink, S: LocalStore> PlaybackSession<M, S> {
    pub fn new(artifact: &Artifact, media: M, store: S) -> Self {
        Self::with_config(artifact, media, store, SessionConfig::default())
    }

    pub fn with_config(artifact: &Artifact, media: M, store: S, config: SessionConfig) -> Self {
        Self {
            exso_id: artifact.id.clone(),
            timeline: Timeline::new(&artifact.text, artifact.weight),
            media,
            store,
            config,
            phase: Phase::NotStarted,
            gesture: HoldGesture::new(config.hold_debounce_ms),
            anchor_ms: 0.0,
            elapsed_ms: 0.0,
            last_bucket: None,
            last_saved_ms: 0.0,
            restored: false,
            reply_at: None,
            sound_blocked: false,
            exit_confirm: None,
        }
    }

    pub fn exso_id(&self) -> &str {
        &self.exso_id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed_ms
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn media(&self) -> &M {
        &self.media
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn sound_blocked(&self) -> bool {
        self.sound_blocked
    }

    pub fn exit_confirm(&self) -> Option<ExitConfirm> {
        self.exit_confirm
    }

    pub fn can_reply(&self) -> bool {
        self.phase == Phase::ReplyEnabled
    }

    /// Earliest instant at which `tick` has work to do
    pub fn next_deadline(&self) -> Option<f64> {
        match (self.gesture.deadline(), self.reply_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn apply(&mut self, event: SessionEvent) -> bool {
        match transition(self.phase, event) {
            Some(next) => {
                debug!(exso_id = %self.exso_id, from = ?self.phase, to = ?next, "Session transition");
                self.phase = next;
                true
            }
            None => false,
        }
    }

    /// Begin playback once access has been granted
    ///
    /// Restores checkpointed progress first. A second call is a no-op.
    pub fn start(&mut self, now_ms: f64) -> bool {
        if self.phase != Phase::NotStarted {
            return false;
        }

        let reached_final = self.restore();
        self.anchor_ms = now_ms - self.elapsed_ms;
        self.last_saved_ms = self.elapsed_ms;
        self.apply(SessionEvent::Start);
        self.start_media();

        if reached_final || self.timeline.is_final(self.elapsed_ms) {
            self.reach_final(now_ms);
        }
        true
    }

    /// Read the checkpoint once per page load; returns whether it was final
    fn restore(&mut self) -> bool {
        if std::mem::replace(&mut self.restored, true) {
            return false;
        }
        let Some(progress) = ProgressSlot::load(&self.store, &self.exso_id) else {
            return false;
        };

        let final_at = self.timeline.final_line_at();
        let clamped = progress.elapsed_ms.max(0.0).min(final_at);
        if clamped < progress.elapsed_ms {
            debug!(
                exso_id = %self.exso_id,
                stored = progress.elapsed_ms,
                final_at,
                "Clamped restored progress to final line"
            );
        }
        self.elapsed_ms = clamped;
        progress.is_final_line || clamped >= final_at
    }

    fn start_media(&mut self) {
        match self.media.play(true) {
            Ok(()) => {
                if let Err(e) = self.media.set_muted(false) {
                    debug!(exso_id = %self.exso_id, error = %e, "Unmute refused");
                    self.sound_blocked = true;
                }
            }
            Err(e) => {
                debug!(exso_id = %self.exso_id, error = %e, "Muted autoplay refused");
                self.sound_blocked = true;
            }
        }
    }

    /// Retry unmuted playback from a user interaction
    pub fn enable_sound(&mut self) -> bool {
        if self.phase == Phase::TornDown {
            return false;
        }
        match self.media.play(false) {
            Ok(()) => {
                self.sound_blocked = false;
                true
            }
            Err(e) => {
                warn!(exso_id = %self.exso_id, error = %e, "Sound still blocked");
                false
            }
        }
    }

    /// Per-frame clock callback
    ///
    /// Returns a frame when the render bucket changed or a phase change
    /// requires a redraw.
    pub fn on_frame(&mut self, now_ms: f64) -> Option<RenderFrame> {
        self.tick(now_ms);
        if self.phase != Phase::Running {
            return None;
        }

        self.elapsed_ms = (now_ms - self.anchor_ms).max(0.0);
        if self.timeline.is_final(self.elapsed_ms) {
            self.reach_final(now_ms);
            return Some(self.render());
        }

        if self.elapsed_ms - self.last_saved_ms >= self.config.checkpoint_interval_ms {
            self.checkpoint(false);
        }

        let bucket = (self.elapsed_ms / self.config.render_bucket_ms).floor() as i64;
        if self.last_bucket == Some(bucket) {
            return None;
        }
        self.last_bucket = Some(bucket);
        Some(self.render())
    }

    /// Current frame, unthrottled
    pub fn render(&self) -> RenderFrame {
        let dim = match self.phase {
            Phase::Paused(PauseCause::Hold) => self.timeline.paused_dim(),
            _ => 1.0,
        };
        RenderFrame {
            elapsed_ms: self.elapsed_ms,
            lines: self.timeline.frame(self.elapsed_ms),
            dim,
            is_final: self.phase.is_final(),
        }
    }

    /// Fire due deadlines: the debounced hold and the reply unlock
    pub fn tick(&mut self, now_ms: f64) {
        if let Some(GestureSignal::HoldStarted) = self.gesture.poll(now_ms) {
            self.pause(PauseCause::Hold, now_ms);
        }

        if let Some(at) = self.reply_at {
            if now_ms >= at {
                self.reply_at = None;
                self.apply(SessionEvent::ReplyUnlocked);
            }
        }
    }

    fn reach_final(&mut self, now_ms: f64) {
        self.elapsed_ms = self.timeline.final_line_at();
        if !self.apply(SessionEvent::FinalReached) {
            return;
        }
        self.checkpoint(true);
        if self.apply(SessionEvent::Latch) {
            self.reply_at = Some(now_ms + self.config.reply_delay_ms);
        }
    }

    fn checkpoint(&mut self, is_final_line: bool) {
        let progress = PlaybackProgress {
            elapsed_ms: self.elapsed_ms,
            is_final_line,
        };
        if let Err(e) = ProgressSlot::save(&self.store, &self.exso_id, &progress) {
            warn!(exso_id = %self.exso_id, error = %e, "Failed to checkpoint progress");
        }
        self.last_saved_ms = self.elapsed_ms;
    }

    fn pause(&mut self, cause: PauseCause, now_ms: f64) -> bool {
        if self.phase == Phase::Running {
            self.elapsed_ms = (now_ms - self.anchor_ms).max(0.0);
        }
        if !self.apply(SessionEvent::Pause(cause)) {
            return false;
        }
        self.media.pause();
        true
    }

    fn resume(&mut self, cause: PauseCause, now_ms: f64) -> bool {
        if transition(self.phase, SessionEvent::Resume(cause)).is_none() {
            return false;
        }
        if let Err(e) = self.media.play(false) {
            debug!(exso_id = %self.exso_id, error = %e, "Resume refused by media");
            self.sound_blocked = true;
        }
        self.apply(SessionEvent::Resume(cause));
        self.anchor_ms = now_ms - self.elapsed_ms;
        true
    }

    /// Pointer down; becomes a pause once the debounce elapses
    pub fn press(&mut self, kind: PointerKind, now_ms: f64) {
        if self.phase != Phase::Running {
            return;
        }
        self.gesture.press(kind, now_ms);
    }

    /// Pointer up; resumes if the press had become a hold
    pub fn release(&mut self, kind: PointerKind, now_ms: f64) -> bool {
        match self.gesture.release(kind) {
            Some(GestureSignal::HoldEnded) => self.resume(PauseCause::Hold, now_ms),
            _ => false,
        }
    }

    /// Pointer left the surface
    pub fn leave(&mut self, now_ms: f64) -> bool {
        match self.gesture.leave() {
            Some(GestureSignal::HoldEnded) => self.resume(PauseCause::Hold, now_ms),
            _ => false,
        }
    }

    /// Show the exit confirmation; pauses a running session or takes over a hold
    pub fn open_exit_confirm(&mut self, now_ms: f64, uses_remaining: Option<u32>) {
        if self.exit_confirm.is_some() || self.phase == Phase::TornDown {
            return;
        }
        self.exit_confirm = Some(ExitConfirm { uses_remaining });
        if !self.pause(PauseCause::ExitConfirm, now_ms) && self.phase.is_final() {
            self.media.pause();
        }
    }

    /// Close the exit confirmation, resuming exactly like a hold release
    pub fn close_exit_confirm(&mut self, now_ms: f64) {
        if self.exit_confirm.take().is_none() {
            return;
        }
        if !self.resume(PauseCause::ExitConfirm, now_ms) && self.phase.is_final() {
            if let Err(e) = self.media.play(false) {
                debug!(exso_id = %self.exso_id, error = %e, "Resume refused by media");
                self.sound_blocked = true;
            }
        }
    }

    /// Stop everything; pending deadlines never fire afterwards
    pub fn teardown(&mut self) {
        if !self.apply(SessionEvent::Teardown) {
            return;
        }
        self.reply_at = None;
        self.exit_confirm = None;
        self.gesture.cancel();
        self.media.pause();
    }

    /// Where the reply affordance leads, once enabled
    pub fn reply_route(&self) -> Option<String> {
        self.can_reply()
            .then(|| format!("{}{}", REPLY_ROUTE_PREFIX, self.exso_id))
    }
}
