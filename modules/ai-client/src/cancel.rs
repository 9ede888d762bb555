use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cooperative cancellation signal threaded through every outbound call.
///
/// Cheap to clone and share across tasks (one per pipeline run or dialogue
/// turn). Callers poll [`Cancellation::is_cancelled`] at suspension points;
/// nothing here forcibly aborts a future.
#[derive(Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_uncancelled() {
        assert!(!Cancellation::new().is_cancelled());
    }

    #[test]
    fn cancel_is_visible_to_clones() {
        let token = Cancellation::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
