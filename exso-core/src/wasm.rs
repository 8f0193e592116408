//! WebAssembly exports for browser hosts

use wasm_bindgen::prelude::*;

use crate::gesture::{GestureSignal, HoldGesture, PointerKind};
use crate::timeline::Timeline;
use crate::types::Weight;

/// Timeline over an artifact's lines
#[wasm_bindgen]
pub struct TimelineHandle {
    inner: Timeline,
}

#[wasm_bindgen]
impl TimelineHandle {
    /// `text_json` is the artifact's `text` array; unknown weights use ceiling 1.0
    #[wasm_bindgen(constructor)]
    pub fn new(text_json: &str, weight: &str) -> Result<TimelineHandle, JsValue> {
        let lines: Vec<String> = serde_json::from_str(text_json)
            .map_err(|e| JsValue::from_str(&format!("Invalid text lines: {}", e)))?;
        Ok(TimelineHandle {
            inner: Timeline::new(&lines, Weight::parse(weight)),
        })
    }

    #[wasm_bindgen]
    pub fn final_line_at(&self) -> f64 {
        self.inner.final_line_at()
    }

    #[wasm_bindgen]
    pub fn is_final(&self, elapsed_ms: f64) -> bool {
        self.inner.is_final(elapsed_ms)
    }

    /// Opacity of every line, in order
    #[wasm_bindgen]
    pub fn opacities_at(&self, elapsed_ms: f64) -> Vec<f64> {
        self.inner.opacities(elapsed_ms)
    }

    #[wasm_bindgen]
    pub fn paused_dim(&self) -> f64 {
        self.inner.paused_dim()
    }

    #[wasm_bindgen]
    pub fn line_count(&self) -> usize {
        self.inner.len()
    }
}

/// Debounced hold detection
#[wasm_bindgen]
pub struct HoldGestureHandle {
    inner: HoldGesture,
}

impl Default for HoldGestureHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[wasm_bindgen]
impl HoldGestureHandle {
    #[wasm_bindgen(constructor)]
    pub fn new() -> HoldGestureHandle {
        HoldGestureHandle {
            inner: HoldGesture::default(),
        }
    }

    #[wasm_bindgen]
    pub fn press(&mut self, is_touch: bool, now_ms: f64) {
        self.inner.press(pointer(is_touch), now_ms);
    }

    /// True when the press just became a hold
    #[wasm_bindgen]
    pub fn poll(&mut self, now_ms: f64) -> bool {
        self.inner.poll(now_ms) == Some(GestureSignal::HoldStarted)
    }

    /// True when a hold just ended
    #[wasm_bindgen]
    pub fn release(&mut self, is_touch: bool) -> bool {
        self.inner.release(pointer(is_touch)) == Some(GestureSignal::HoldEnded)
    }

    #[wasm_bindgen]
    pub fn leave(&mut self) -> bool {
        self.inner.leave() == Some(GestureSignal::HoldEnded)
    }

    #[wasm_bindgen]
    pub fn is_holding(&self) -> bool {
        self.inner.is_holding()
    }
}

fn pointer(is_touch: bool) -> PointerKind {
    if is_touch {
        PointerKind::Touch
    } else {
        PointerKind::Mouse
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeline_handle_matches_timeline() {
        let handle = TimelineHandle::new(r#"["one","two","three"]"#, "present").unwrap();
        let lines: Vec<String> = vec!["one".into(), "two".into(), "three".into()];
        let timeline = Timeline::new(&lines, Weight::Present);

        assert_eq!(handle.line_count(), 3);
        assert_eq!(handle.final_line_at(), timeline.final_line_at());
        assert_eq!(handle.opacities_at(2_000.0), timeline.opacities(2_000.0));
    }

    #[test]
    fn test_hold_gesture_handle() {
        let mut handle = HoldGestureHandle::new();
        handle.press(true, 0.0);
        assert!(!handle.release(false));
        assert!(handle.poll(150.0));
        assert!(handle.is_holding());
        assert!(handle.release(true));
    }
}
