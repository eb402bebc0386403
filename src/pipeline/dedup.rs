use crate::sync::lock;
use std::collections::HashSet;
use std::sync::Mutex;

/// Run-scoped set of correlation ids that have already been routed.
///
/// One instance is created per run and shared by every processing unit of
/// that run through an `Arc`. Empty ids are never recorded.
#[derive(Debug, Default)]
pub struct Deduplicator {
    seen: Mutex<HashSet<String>>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` the first time `id` is offered and `false` afterwards.
    /// The check and the insert happen under one lock, so two concurrent
    /// callers with the same id can never both get `true`.
    pub fn check_and_mark(&self, id: &str) -> bool {
        if id.is_empty() {
            return true;
        }
        lock(&self.seen).insert(id.to_string())
    }

    pub fn contains(&self, id: &str) -> bool {
        lock(&self.seen).contains(id)
    }

    pub fn len(&self) -> usize {
        lock(&self.seen).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn first_sighting_wins() {
        let dedup = Deduplicator::new();
        assert!(dedup.check_and_mark("C1"));
        assert!(!dedup.check_and_mark("C1"));
        assert!(dedup.check_and_mark("C2"));
        assert_eq!(dedup.len(), 2);
    }

    #[test]
    fn empty_ids_are_never_marked() {
        let dedup = Deduplicator::new();
        assert!(dedup.check_and_mark(""));
        assert!(dedup.check_and_mark(""));
        assert!(dedup.is_empty());
        assert!(!dedup.contains(""));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_see_exactly_one_winner() {
        let dedup = Arc::new(Deduplicator::new());
        let mut handles = Vec::new();
        for _ in 0..32 {
            let dedup = dedup.clone();
            handles.push(tokio::spawn(async move { dedup.check_and_mark("C9") }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
