//! Timeline Scheduler
//!
//! Places every text line on a fixed envelope (start → fade-in → hold →
//! fade-out) and answers "how visible is line i at elapsed time t". The
//! envelopes are computed once per artifact; evaluating a frame is a pure
//! function of elapsed time.
//!
//! Gaps between consecutive lines:
//! - after line 0: negative (the second line starts while the first is held)
//! - after line 1: a fixed pause
//! - after the second-to-last line: a fixed pause before the final line
//!
//! The completion instant is the final line's `fade_in_end`, not its fade-out.

use serde::{Deserialize, Serialize};

use crate::types::Weight;

/// Lines at or below this opacity are not rendered
pub const VISIBLE_THRESHOLD: f64 = 0.01;

/// Envelope and gap durations in milliseconds
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct TimelineConfig {
    pub start_offset_ms: f64,
    pub fade_in_ms: f64,
    pub hold_ms: f64,
    pub fade_out_ms: f64,
    pub first_line_overlap_ms: f64,
    pub pause_after_second_ms: f64,
    pub pause_before_final_ms: f64,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            start_offset_ms: 800.0,
            fade_in_ms: 1500.0,
            hold_ms: 9000.0,
            fade_out_ms: 1200.0,
            first_line_overlap_ms: 900.0,
            pause_after_second_ms: 3000.0,
            pause_before_final_ms: 3000.0,
        }
    }
}

impl TimelineConfig {
    fn line_duration_ms(&self) -> f64 {
        self.fade_in_ms + self.hold_ms + self.fade_out_ms
    }

    /// Gap inserted after line `index` of `count`
    fn gap_after(&self, index: usize, count: usize) -> f64 {
        if index == 0 {
            -self.first_line_overlap_ms
        } else if index == 1 {
            self.pause_after_second_ms
        } else if count >= 2 && index == count - 2 {
            self.pause_before_final_ms
        } else {
            0.0
        }
    }
}

/// One line's placement on the timeline
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct LineEnvelope {
    pub start_ms: f64,
    pub fade_in_end: f64,
    pub hold_end: f64,
    pub fade_out_end: f64,
}

impl LineEnvelope {
    /// Opacity at elapsed time `t` under the given ceiling
    pub fn opacity_at(&self, t: f64, ceiling: f64) -> f64 {
        if t < self.start_ms || t > self.fade_out_end {
            return 0.0;
        }
        if t <= self.fade_in_end {
            let progress = (t - self.start_ms) / (self.fade_in_end - self.start_ms);
            return ease_out_cubic(progress.clamp(0.0, 1.0)) * ceiling;
        }
        if t <= self.hold_end {
            return ceiling;
        }
        let progress = (t - self.hold_end) / (self.fade_out_end - self.hold_end);
        ceiling * (1.0 - ease_in_cubic(progress.clamp(0.0, 1.0)))
    }
}

/// `1 - (1 - x)^3`
pub fn ease_out_cubic(x: f64) -> f64 {
    1.0 - (1.0 - x).powi(3)
}

/// `x^3`
pub fn ease_in_cubic(x: f64) -> f64 {
    x.powi(3)
}

/// A rendered line for one frame
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct LineFrame {
    pub index: usize,
    pub text: String,
    pub opacity: f64,
}

/// Scheduled text lines for one artifact
#[derive(Clone, Debug)]
pub struct Timeline {
    lines: Vec<String>,
    envelopes: Vec<LineEnvelope>,
    ceiling: f64,
}

impl Timeline {
    pub fn new(text: &[String], weight: Weight) -> Self {
        Self::with_config(text, weight.opacity_ceiling(), TimelineConfig::default())
    }

    pub fn with_config(text: &[String], ceiling: f64, config: TimelineConfig) -> Self {
        let count = text.len();
        let mut start_ms = config.start_offset_ms;
        let mut envelopes = Vec::with_capacity(count);

        for index in 0..count {
            let fade_in_end = start_ms + config.fade_in_ms;
            let hold_end = fade_in_end + config.hold_ms;
            let fade_out_end = hold_end + config.fade_out_ms;
            envelopes.push(LineEnvelope {
                start_ms,
                fade_in_end,
                hold_end,
                fade_out_end,
            });
            start_ms += config.line_duration_ms() + config.gap_after(index, count);
        }

        Self {
            lines: text.to_vec(),
            envelopes,
            ceiling,
        }
    }

    pub fn envelopes(&self) -> &[LineEnvelope] {
        &self.envelopes
    }

    pub fn ceiling(&self) -> f64 {
        self.ceiling
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The completion instant: the last line's `fade_in_end`
    ///
    /// An empty timeline completes immediately (0).
    pub fn final_line_at(&self) -> f64 {
        self.envelopes.last().map(|e| e.fade_in_end).unwrap_or(0.0)
    }

    pub fn is_final(&self, elapsed_ms: f64) -> bool {
        elapsed_ms >= self.final_line_at()
    }

    /// Opacity of line `index` at elapsed time `t` (0 for out-of-range lines)
    pub fn opacity_at(&self, index: usize, t: f64) -> f64 {
        self.envelopes
            .get(index)
            .map(|e| e.opacity_at(t, self.ceiling))
            .unwrap_or(0.0)
    }

    /// Opacities of every line at `t`, in order
    pub fn opacities(&self, t: f64) -> Vec<f64> {
        self.envelopes
            .iter()
            .map(|e| e.opacity_at(t, self.ceiling))
            .collect()
    }

    /// Lines that should be on screen at `t`
    pub fn frame(&self, t: f64) -> Vec<LineFrame> {
        self.envelopes
            .iter()
            .enumerate()
            .filter_map(|(index, envelope)| {
                let opacity = envelope.opacity_at(t, self.ceiling);
                (opacity > VISIBLE_THRESHOLD).then(|| LineFrame {
                    index,
                    text: self.lines[index].clone(),
                    opacity,
                })
            })
            .collect()
    }

    /// Text-layer multiplier while held-paused before the final line
    pub fn paused_dim(&self) -> f64 {
        ((self.ceiling - 0.05) / self.ceiling.max(0.05)).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("line {}", i)).collect()
    }

    #[test]
    fn test_envelopes_are_ordered() {
        let timeline = Timeline::new(&lines(6), Weight::Held);
        let overlap = TimelineConfig::default().first_line_overlap_ms;

        for (i, e) in timeline.envelopes().iter().enumerate() {
            assert!(e.start_ms < e.fade_in_end);
            assert!(e.fade_in_end < e.hold_end);
            assert!(e.hold_end < e.fade_out_end);
            if let Some(next) = timeline.envelopes().get(i + 1) {
                assert!(next.start_ms >= e.fade_in_end - overlap);
                assert!(next.start_ms > e.start_ms);
            }
        }
    }

    #[test]
    fn test_gap_placement() {
        let timeline = Timeline::new(&lines(5), Weight::Held);
        let e = timeline.envelopes();
        // 800, then +11700-900, then +11700+3000, then +11700, then +11700+3000
        assert_eq!(e[0].start_ms, 800.0);
        assert_eq!(e[1].start_ms, 800.0 + 10_800.0);
        assert_eq!(e[2].start_ms, e[1].start_ms + 14_700.0);
        assert_eq!(e[3].start_ms, e[2].start_ms + 11_700.0);
        assert_eq!(e[4].start_ms, e[3].start_ms + 14_700.0);
    }

    #[test]
    fn test_final_line_at_is_last_fade_in_end() {
        let timeline = Timeline::new(&lines(3), Weight::Quiet);
        let last = timeline.envelopes()[2];
        assert_eq!(timeline.final_line_at(), last.fade_in_end);
        assert!(!timeline.is_final(last.fade_in_end - 1.0));
        assert!(timeline.is_final(last.fade_in_end));
    }

    #[test]
    fn test_empty_timeline_completes_immediately() {
        let timeline = Timeline::new(&[], Weight::Quiet);
        assert_eq!(timeline.final_line_at(), 0.0);
        assert!(timeline.is_final(0.0));
        assert!(timeline.frame(100.0).is_empty());
    }

    #[test]
    fn test_quiet_three_line_scenario() {
        let timeline = Timeline::new(&lines(3), Weight::Quiet);
        assert_eq!(timeline.ceiling(), 0.85);
        assert!(timeline.opacities(0.0).iter().all(|o| *o == 0.0));

        let start = timeline.envelopes()[0].start_ms;
        let mid = start + TimelineConfig::default().fade_in_ms / 2.0;
        let opacity = timeline.opacity_at(0, mid);
        assert!((opacity - 0.85 * 0.875).abs() < 1e-9);
        assert!((opacity - 0.744).abs() < 0.001);
    }

    #[test]
    fn test_opacity_is_continuous_and_bounded() {
        let timeline = Timeline::new(&lines(4), Weight::Present);
        let ceiling = timeline.ceiling();
        let eps = 1e-6;

        for (i, e) in timeline.envelopes().iter().enumerate() {
            for boundary in [e.start_ms, e.fade_in_end, e.hold_end, e.fade_out_end] {
                let before = timeline.opacity_at(i, boundary - eps);
                let at = timeline.opacity_at(i, boundary);
                let after = timeline.opacity_at(i, boundary + eps);
                assert!((before - at).abs() < 1e-3, "jump before {} on line {}", boundary, i);
                assert!((after - at).abs() < 1e-3, "jump after {} on line {}", boundary, i);
            }
        }

        let end = timeline.envelopes().last().unwrap().fade_out_end + 1000.0;
        let mut t = 0.0;
        while t < end {
            for o in timeline.opacities(t) {
                assert!((0.0..=ceiling).contains(&o));
            }
            t += 37.0;
        }
    }

    #[test]
    fn test_hold_and_fade_out() {
        let timeline = Timeline::new(&lines(2), Weight::Held);
        let e = timeline.envelopes()[0];
        assert_eq!(timeline.opacity_at(0, (e.fade_in_end + e.hold_end) / 2.0), 1.0);

        let mid_fade = (e.hold_end + e.fade_out_end) / 2.0;
        assert!((timeline.opacity_at(0, mid_fade) - (1.0 - 0.125)).abs() < 1e-9);
        assert_eq!(timeline.opacity_at(0, e.fade_out_end + 1.0), 0.0);
    }

    #[test]
    fn test_frame_hides_near_invisible_lines() {
        let timeline = Timeline::new(&lines(2), Weight::Held);
        let start = timeline.envelopes()[0].start_ms;
        assert!(timeline.frame(start).is_empty());

        let frame = timeline.frame(start + 1000.0);
        assert_eq!(frame.len(), 1);
        assert_eq!(frame[0].index, 0);
        assert_eq!(frame[0].text, "line 0");
    }

    #[test]
    fn test_paused_dim() {
        let held = Timeline::new(&lines(1), Weight::Held);
        assert!((held.paused_dim() - 0.95).abs() < 1e-9);
        let quiet = Timeline::new(&lines(1), Weight::Quiet);
        assert!((quiet.paused_dim() - 0.8 / 0.85).abs() < 1e-9);
    }
}
