//! Press-and-hold detection
//!
//! A press only becomes a hold once it has lasted `debounce_ms`; a tap that
//! releases earlier produces nothing. The host reports pointer events and
//! polls with its clock. Mouse events are ignored while a touch is down so
//! that the synthetic mouse events browsers emit after touches do not start
//! a second gesture.

/// Delay before a press counts as a hold
pub const HOLD_DEBOUNCE_MS: f64 = 150.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerKind {
    Mouse,
    Touch,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GestureSignal {
    HoldStarted,
    HoldEnded,
}

#[derive(Clone, Debug)]
pub struct HoldGesture {
    debounce_ms: f64,
    pressed_at: Option<f64>,
    holding: bool,
    touch_active: bool,
}

impl Default for HoldGesture {
    fn default() -> Self {
        Self::new(HOLD_DEBOUNCE_MS)
    }
}

impl HoldGesture {
    pub fn new(debounce_ms: f64) -> Self {
        Self {
            debounce_ms,
            pressed_at: None,
            holding: false,
            touch_active: false,
        }
    }

    pub fn is_holding(&self) -> bool {
        self.holding
    }

    /// When the pending press turns into a hold, if one is pending
    pub fn deadline(&self) -> Option<f64> {
        match self.pressed_at {
            Some(at) if !self.holding => Some(at + self.debounce_ms),
            _ => None,
        }
    }

    pub fn press(&mut self, kind: PointerKind, now_ms: f64) {
        if kind == PointerKind::Mouse && self.touch_active {
            return;
        }
        if kind == PointerKind::Touch {
            self.touch_active = true;
        }
        if self.pressed_at.is_none() {
            self.pressed_at = Some(now_ms);
        }
    }

    /// Fire the debounced hold if its deadline has passed
    pub fn poll(&mut self, now_ms: f64) -> Option<GestureSignal> {
        let deadline = self.deadline()?;
        if now_ms >= deadline {
            self.holding = true;
            return Some(GestureSignal::HoldStarted);
        }
        None
    }

    /// Releases before the hold was polled are taps
    pub fn release(&mut self, kind: PointerKind) -> Option<GestureSignal> {
        match kind {
            PointerKind::Mouse if self.touch_active => return None,
            PointerKind::Touch => self.touch_active = false,
            PointerKind::Mouse => {}
        }
        self.pressed_at = None;
        std::mem::take(&mut self.holding).then_some(GestureSignal::HoldEnded)
    }

    /// Pointer left the surface; ends a mouse hold like mouse-up
    pub fn leave(&mut self) -> Option<GestureSignal> {
        self.release(PointerKind::Mouse)
    }

    /// Drop any pending or active gesture without signalling
    pub fn cancel(&mut self) {
        self.pressed_at = None;
        self.holding = false;
        self.touch_active = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tap_does_not_hold() {
        let mut gesture = HoldGesture::default();
        gesture.press(PointerKind::Mouse, 0.0);
        assert_eq!(gesture.poll(100.0), None);
        assert_eq!(gesture.release(PointerKind::Mouse), None);
        assert!(!gesture.is_holding());
        assert_eq!(gesture.deadline(), None);
    }

    #[test]
    fn test_hold_after_debounce() {
        let mut gesture = HoldGesture::default();
        gesture.press(PointerKind::Touch, 1_000.0);
        assert_eq!(gesture.deadline(), Some(1_150.0));
        assert_eq!(gesture.poll(1_149.0), None);
        assert_eq!(gesture.poll(1_150.0), Some(GestureSignal::HoldStarted));
        assert_eq!(gesture.poll(1_200.0), None);
        assert_eq!(
            gesture.release(PointerKind::Touch),
            Some(GestureSignal::HoldEnded)
        );
    }

    #[test]
    fn test_mouse_ignored_during_touch() {
        let mut gesture = HoldGesture::default();
        gesture.press(PointerKind::Touch, 0.0);
        gesture.poll(200.0);
        assert_eq!(gesture.release(PointerKind::Mouse), None);
        assert!(gesture.is_holding());
        assert_eq!(
            gesture.release(PointerKind::Touch),
            Some(GestureSignal::HoldEnded)
        );
    }

    #[test]
    fn test_mouse_leave_ends_hold() {
        let mut gesture = HoldGesture::default();
        gesture.press(PointerKind::Mouse, 0.0);
        gesture.poll(150.0);
        assert_eq!(gesture.leave(), Some(GestureSignal::HoldEnded));
        assert_eq!(gesture.leave(), None);
    }

    #[test]
    fn test_cancel_clears_pending_press() {
        let mut gesture = HoldGesture::default();
        gesture.press(PointerKind::Mouse, 0.0);
        gesture.cancel();
        assert_eq!(gesture.poll(1_000.0), None);
    }
}
