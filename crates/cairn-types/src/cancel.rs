//! Cooperative cancellation for long-running copy, import and GC operations.

use tokio::sync::watch;

/// Receiving side of a cancellation flag. `true` means "stop".
pub type CancelSignal = watch::Receiver<bool>;

/// Sending side returned by [`cancel_pair`].
pub type CancelHandle = watch::Sender<bool>;

/// Create a linked handle/signal pair, initially not cancelled.
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    watch::channel(false)
}

/// A signal that can never fire, for callers that do not cancel.
pub fn never_cancel() -> CancelSignal {
    let (tx, rx) = watch::channel(false);
    // A dropped sender leaves the last value (`false`) readable forever.
    drop(tx);
    rx
}

/// Whether cancellation has been requested on `signal`.
pub fn is_cancelled(signal: &CancelSignal) -> bool {
    *signal.borrow()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_propagates_cancellation() {
        let (handle, signal) = cancel_pair();
        assert!(!is_cancelled(&signal));
        handle.send(true).unwrap();
        assert!(is_cancelled(&signal));
    }

    #[test]
    fn never_cancel_stays_false() {
        let signal = never_cancel();
        assert!(!is_cancelled(&signal));
    }
}
