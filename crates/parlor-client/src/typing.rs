//! Typing indicator debouncing.
//!
//! The first keystroke after an idle period emits `typing`; every keystroke
//! re-arms an idle timer, and when it expires `stopTyping` is emitted. Any
//! number of keystrokes inside one window produce exactly one pair.

use parking_lot::Mutex;
use parlor_protocol::ClientEvent;
use parlor_transport::EventSink;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::trace;

/// Idle time after the last keystroke before `stopTyping` is sent.
pub const DEFAULT_TYPING_IDLE: Duration = Duration::from_secs(1);

#[derive(Default)]
struct TypingState {
    active: bool,
    /// Bumped on every keystroke; a timer only fires for its own generation.
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

/// Debounces keystrokes into `typing` / `stopTyping` events.
pub struct TypingNotifier {
    sink: Arc<dyn EventSink>,
    idle: Duration,
    state: Arc<Mutex<TypingState>>,
}

impl TypingNotifier {
    /// Create a notifier emitting through `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn EventSink>, idle: Duration) -> Self {
        Self {
            sink,
            idle,
            state: Arc::new(Mutex::new(TypingState::default())),
        }
    }

    /// Record a keystroke.
    ///
    /// Must be called from within a tokio runtime.
    pub fn keystroke(&self) {
        let mut state = self.state.lock();

        if !state.active && self.sink.emit(ClientEvent::Typing).is_ok() {
            trace!("Typing started");
            state.active = true;
        }

        state.generation = state.generation.wrapping_add(1);
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }

        let generation = state.generation;
        let shared = Arc::clone(&self.state);
        let sink = Arc::clone(&self.sink);
        let idle = self.idle;
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(idle).await;
            let mut state = shared.lock();
            if state.generation == generation {
                state.timer = None;
                finish(&mut state, sink.as_ref());
            }
        }));
    }

    /// End the current typing cycle now, if one is running.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        finish(&mut state, self.sink.as_ref());
    }

    /// Whether a `typing` event is outstanding.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state.lock().active
    }
}

impl Drop for TypingNotifier {
    fn drop(&mut self) {
        if let Some(timer) = self.state.lock().timer.take() {
            timer.abort();
        }
    }
}

fn finish(state: &mut TypingState, sink: &dyn EventSink) {
    if state.active {
        state.active = false;
        let _ = sink.emit(ClientEvent::StopTyping);
        trace!("Typing stopped");
    }
}
