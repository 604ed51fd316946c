use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Lifecycle of one panel's request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationState<T> {
    Idle,
    Loading,
    Success(T),
    Error(String),
}

impl<T> Default for GenerationState<T> {
    fn default() -> Self {
        Self::Idle
    }
}

impl<T> GenerationState<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    pub fn result(&self) -> Option<&T> {
        match self {
            Self::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Error(message) => Some(message),
            _ => None,
        }
    }
}

/// Generation state plus the sequence token of the latest request.
///
/// Every `begin` issues a new token; async completions carry the token they
/// were started with and are dropped once it is no longer current.
#[derive(Debug)]
pub struct RequestSlot<T> {
    state: GenerationState<T>,
    request_generation: u64,
}

impl<T> Default for RequestSlot<T> {
    fn default() -> Self {
        Self {
            state: GenerationState::Idle,
            request_generation: 0,
        }
    }
}

impl<T> RequestSlot<T> {
    pub fn state(&self) -> &GenerationState<T> {
        &self.state
    }

    pub fn generation(&self) -> u64 {
        self.request_generation
    }

    /// Start a request. None while one is already loading.
    pub fn begin(&mut self) -> Option<u64> {
        if self.state.is_loading() {
            return None;
        }
        self.request_generation += 1;
        self.state = GenerationState::Loading;
        Some(self.request_generation)
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.request_generation == generation
    }

    /// Apply a completion. Returns false (and changes nothing) for a stale token.
    pub fn finish(&mut self, generation: u64, result: Result<T, String>) -> bool {
        if !self.is_current(generation) {
            debug!(
                "Discarding stale completion #{generation} (current #{})",
                self.request_generation
            );
            return false;
        }
        self.state = match result {
            Ok(value) => GenerationState::Success(value),
            Err(message) => GenerationState::Error(message),
        };
        true
    }

    /// Orphan whatever is in flight and return to Idle.
    pub fn invalidate(&mut self) {
        self.request_generation += 1;
        self.state = GenerationState::Idle;
    }
}

/// Ordered text fragments of one streaming request.
#[derive(Debug, Default, Clone)]
pub struct StreamAccumulator {
    chunks: Vec<String>,
}

impl StreamAccumulator {
    pub fn push(&mut self, chunk: impl Into<String>) {
        self.chunks.push(chunk.into());
    }

    pub fn reset(&mut self) {
        self.chunks.clear();
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Concatenation in arrival order.
    pub fn text(&self) -> String {
        self.chunks.concat()
    }
}

/// What a `submit` call did.
#[derive(Debug)]
pub enum SubmitOutcome {
    /// A request is in flight on the runtime.
    Started(JoinHandle<()>),
    /// The panel was already loading; nothing happened.
    Busy,
    /// Local validation failed; the panel keeps the message beside its
    /// unchanged state.
    Rejected(String),
}

impl SubmitOutcome {
    pub fn is_started(&self) -> bool {
        matches!(self, Self::Started(_))
    }

    /// Wait for a started request to settle into the panel state.
    pub async fn wait(self) {
        if let Self::Started(handle) = self {
            if let Err(e) = handle.await {
                warn!("Panel task ended abnormally: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_is_refused_while_loading() {
        let mut slot: RequestSlot<String> = RequestSlot::default();
        let first = slot.begin().unwrap();
        assert!(slot.begin().is_none());
        assert_eq!(slot.generation(), first);
        assert!(slot.state().is_loading());
    }

    #[test]
    fn stale_completion_is_ignored() {
        let mut slot: RequestSlot<String> = RequestSlot::default();
        let old = slot.begin().unwrap();
        slot.invalidate();
        let new = slot.begin().unwrap();
        assert!(new > old);

        assert!(!slot.finish(old, Ok("old".into())));
        assert!(slot.state().is_loading());
        assert!(slot.finish(new, Ok("new".into())));
        assert_eq!(slot.state().result().map(String::as_str), Some("new"));
        assert!(!slot.finish(old, Err("late failure".into())));
        assert_eq!(slot.state().result().map(String::as_str), Some("new"));
    }

    #[test]
    fn error_and_success_allow_resubmit() {
        let mut slot: RequestSlot<u8> = RequestSlot::default();
        let a = slot.begin().unwrap();
        slot.finish(a, Err("boom".into()));
        assert_eq!(slot.state().error(), Some("boom"));
        let b = slot.begin().unwrap();
        slot.finish(b, Ok(7));
        assert!(slot.begin().is_some());
    }

    #[test]
    fn accumulator_concatenates_in_order() {
        let mut acc = StreamAccumulator::default();
        assert_eq!(acc.text(), "");
        for chunk in ["Once", " upon", " a time."] {
            acc.push(chunk);
        }
        assert_eq!(acc.len(), 3);
        assert_eq!(acc.text(), "Once upon a time.");
        acc.reset();
        assert!(acc.is_empty());
    }
}
