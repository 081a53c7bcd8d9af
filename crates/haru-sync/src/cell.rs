//! Current-value container with change notification.

use std::sync::Arc;

use tokio::sync::watch;

/// Holds one immutable snapshot at a time. Writers swap in a whole new
/// value, so a reader holding an `Arc` never sees a half-applied update.
pub struct ObservableCell<T> {
    tx: watch::Sender<Arc<T>>,
}

impl<T> ObservableCell<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(initial));
        Self { tx }
    }

    pub fn get(&self) -> Arc<T> {
        self.tx.borrow().clone()
    }

    pub fn replace(&self, value: T) {
        self.tx.send_replace(Arc::new(value));
    }

    /// Derive the next value from the current one. `f` returns `None` to
    /// leave the cell untouched. Concurrent `update`s are serialised.
    /// Returns whether the value changed.
    pub fn update(&self, f: impl FnOnce(&T) -> Option<T>) -> bool {
        self.tx.send_if_modified(|current| match f(current) {
            Some(next) => {
                *current = Arc::new(next);
                true
            }
            None => false,
        })
    }

    /// Receiver starts marked as seen; `changed()` resolves on the next write.
    pub fn subscribe(&self) -> watch::Receiver<Arc<T>> {
        self.tx.subscribe()
    }
}

impl<T: Default> Default for ObservableCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replace_notifies_subscribers() {
        let cell = ObservableCell::new(1);
        let mut rx = cell.subscribe();

        cell.replace(2);
        rx.changed().await.unwrap();
        assert_eq!(**rx.borrow(), 2);
        assert_eq!(*cell.get(), 2);
    }

    #[test]
    fn old_snapshot_is_unaffected_by_replace() {
        let cell = ObservableCell::new(vec![1, 2]);
        let before = cell.get();
        cell.replace(vec![3]);
        assert_eq!(*before, vec![1, 2]);
        assert_eq!(*cell.get(), vec![3]);
    }

    #[test]
    fn update_can_decline() {
        let cell = ObservableCell::new(Some(5));
        assert!(!cell.update(|_| None));
        assert!(cell.update(|v| v.map(|n| Some(n + 1))));
        assert_eq!(*cell.get(), Some(6));
    }
}
