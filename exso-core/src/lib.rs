/// Exso Core - Playback and Access Core for Exso Experiences
///
/// Everything here is sans-IO: the host (a browser through the wasm exports,
/// or the gateway service natively) supplies timestamps, storage and media
/// handles, and this crate decides what happens.
///
/// - `timeline`: elapsed time → per-line opacity envelopes
/// - `session`: playback state machine (hold-to-pause, freeze, reply unlock,
///   crash-resilient progress)
/// - `gesture`: debounced press/hold detection
/// - `gate`: per-page-load access decision (share token or paid session)
/// - `tokens`: limited-use share tokens with compare-and-swap consumption
/// - `store` / `factory` / `content` / `draft`: artifact lifecycle
/// - `storage`: typed slots over web-storage style key/value stores
/// - `payload`: artifacts embedded in links

pub mod content;
pub mod draft;
pub mod error;
pub mod factory;
pub mod gate;
pub mod gesture;
pub mod payload;
pub mod session;
pub mod storage;
pub mod store;
pub mod timeline;
pub mod tokens;
pub mod types;
pub mod wasm;

pub use content::{ContentRegistry, EnvironmentTable, MediaEnvironment};
pub use draft::{DraftSession, DraftSlot, ExsoDraft};
pub use error::{CoreError, Result};
pub use factory::ArtifactFactory;
pub use gate::{AccessDecision, DenialNotice, GateCheck, GrantedVia, PageGate, PAYWALL_PATH};
pub use gesture::{GestureSignal, HoldGesture, PointerKind};
pub use session::{
    ExitConfirm, MediaError, MediaSink, PauseCause, Phase, PlaybackSession, RenderFrame,
    SessionConfig, SessionEvent,
};
pub use storage::{LocalStore, MemoryStore, PaymentSlots, PlaybackProgress, ProgressSlot};
pub use store::{check_reply_reference, ArtifactStore};
pub use timeline::{LineEnvelope, LineFrame, Timeline, TimelineConfig, VISIBLE_THRESHOLD};
pub use tokens::{
    ConsumeOutcome, ConsumeRejection, IssuePolicy, LocalTokenTable, MemoryTokenTable,
    ShareTokenRecord, ShareTokenRegistry, TokenTable, DEFAULT_SHARE_QUOTA, token_fingerprint,
};
pub use types::{Artifact, ExsoType, Identity, Weight};

/// Get current wall-clock time in milliseconds since the Unix epoch
pub fn current_time_ms() -> u64 {
    #[cfg(target_arch = "wasm32")]
    {
        use js_sys::Date;
        Date::now() as u64
    }

    #[cfg(not(target_arch = "wasm32"))]
    {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default()
    }
}
