//! Change notification primitives.
//!
//! Route metadata sources are mutable; the router caches the endpoint set it
//! derives from them. A [`ChangeToken`] is the staleness signal between the
//! two: it fires exactly once, and a [`ChangeNotifier`] hands out a fresh
//! token after every fire so consumers can re-arm. [`ChangeToken::composite`]
//! folds the tokens of several sources into one token that fires when any of
//! them does.

use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

type ChangeCallback = Box<dyn Fn() + Send + Sync>;

struct TokenState {
    changed: AtomicBool,
    callbacks: Mutex<Vec<ChangeCallback>>,
}

/// One-shot change signal.
///
/// `has_changed` is monotonic: once a token has fired it stays fired. A token
/// never resets; producers hand out a replacement via [`ChangeNotifier`].
#[derive(Clone)]
pub struct ChangeToken {
    state: Arc<TokenState>,
}

impl ChangeToken {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(TokenState {
                changed: AtomicBool::new(false),
                callbacks: Mutex::new(Vec::new()),
            }),
        }
    }

    #[must_use]
    pub fn has_changed(&self) -> bool {
        self.state.changed.load(Ordering::Acquire)
    }

    /// Register a callback invoked when the token fires.
    ///
    /// If the token has already fired the callback runs immediately, so a
    /// consumer that races with the producer never misses the signal.
    pub fn register<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        if self.has_changed() {
            callback();
            return;
        }
        {
            let mut callbacks = match self.state.callbacks.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            callbacks.push(Box::new(callback));
        }
        // The producer may have fired between the check and the push; the
        // trigger path drains callbacks, so fire again to cover the window.
        if self.has_changed() {
            self.invoke_callbacks();
        }
    }

    /// Fire the token. Idempotent: only the first call transitions and runs
    /// the registered callbacks.
    pub fn trigger(&self) {
        if self.state.changed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.invoke_callbacks();
    }

    fn invoke_callbacks(&self) {
        let callbacks = {
            let mut guard = match self.state.callbacks.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            std::mem::take(&mut *guard)
        };
        for callback in &callbacks {
            callback();
        }
    }

    /// Compose several tokens into one that fires when any child fires.
    ///
    /// An already-fired child fires the composite immediately.
    #[must_use]
    pub fn composite<I>(children: I) -> ChangeToken
    where
        I: IntoIterator<Item = ChangeToken>,
    {
        let composed = ChangeToken::new();
        for child in children {
            let target = composed.clone();
            child.register(move || target.trigger());
        }
        composed
    }
}

impl Default for ChangeToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ChangeToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeToken")
            .field("changed", &self.has_changed())
            .finish()
    }
}

/// Re-arming token producer.
///
/// Each [`notify`](ChangeNotifier::notify) swaps in a fresh token and fires
/// the previous one, so every consumer that captured the old token sees
/// exactly one signal and can fetch the replacement on its next read.
pub struct ChangeNotifier {
    current: ArcSwap<ChangeToken>,
}

impl ChangeNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(ChangeToken::new()),
        }
    }

    /// The token that will fire on the next mutation.
    #[must_use]
    pub fn token(&self) -> ChangeToken {
        let current = self.current.load_full();
        (*current).clone()
    }

    /// Signal a mutation: fire the outstanding token and re-arm.
    pub fn notify(&self) {
        let previous = self.current.swap(Arc::new(ChangeToken::new()));
        previous.trigger();
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn token_fires_once() {
        let token = ChangeToken::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        token.register(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!token.has_changed());
        token.trigger();
        token.trigger();
        assert!(token.has_changed());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn late_registration_fires_immediately() {
        let token = ChangeToken::new();
        token.trigger();

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        token.register(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn composite_fires_on_any_child() {
        let a = ChangeToken::new();
        let b = ChangeToken::new();
        let composed = ChangeToken::composite([a.clone(), b.clone()]);

        assert!(!composed.has_changed());
        b.trigger();
        assert!(composed.has_changed());
        // the other child firing later is a no-op
        a.trigger();
        assert!(composed.has_changed());
    }

    #[test]
    fn notifier_rearms_after_every_fire() {
        let notifier = ChangeNotifier::new();
        let first = notifier.token();
        notifier.notify();
        assert!(first.has_changed());

        let second = notifier.token();
        assert!(!second.has_changed());
        notifier.notify();
        assert!(second.has_changed());
    }
}
