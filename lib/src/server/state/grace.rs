//! Grace period bookkeeping. Active on a fresh boot when previously
//! confirmed clients were persisted; only reclaim-class mutations are
//! allowed until every expected client reports in or the window closes.

use std::collections::HashSet;

use tokio::time::Instant;
use tracing::info;

#[derive(Debug)]
pub struct GraceState {
    active: bool,
    deadline: Option<Instant>,
    expected: HashSet<Vec<u8>>,
    reclaimed: HashSet<Vec<u8>>,
}

impl GraceState {
    pub fn inactive() -> Self {
        GraceState {
            active: false,
            deadline: None,
            expected: HashSet::new(),
            reclaimed: HashSet::new(),
        }
    }

    pub fn begin(expected: Vec<Vec<u8>>, deadline: Instant) -> Self {
        GraceState {
            active: true,
            deadline: Some(deadline),
            expected: expected.into_iter().collect(),
            reclaimed: HashSet::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Active check that also retires the grace period once the deadline
    /// has passed.
    pub fn check_active(&mut self) -> bool {
        if !self.active {
            return false;
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                info!("grace period timed out");
                self.end();
                return false;
            }
        }
        true
    }

    /// Whether `owner_id` is one of the clients the server waited for.
    pub fn is_expected(&self, owner_id: &[u8]) -> bool {
        self.expected.contains(owner_id)
    }

    pub fn mark_reclaimed(&mut self, owner_id: &[u8]) {
        if self.expected.contains(owner_id) {
            self.reclaimed.insert(owner_id.to_vec());
        }
    }

    pub fn all_reclaimed(&self) -> bool {
        self.reclaimed.len() >= self.expected.len()
    }

    pub fn end(&mut self) {
        self.active = false;
        self.deadline = None;
        self.expected.clear();
        self.reclaimed.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn grace_ends_when_all_expected_reclaim() {
        let mut grace = GraceState::begin(
            vec![b"c1".to_vec(), b"c2".to_vec()],
            Instant::now() + Duration::from_secs(90),
        );
        assert!(grace.check_active());
        grace.mark_reclaimed(b"c1");
        assert!(!grace.all_reclaimed());
        grace.mark_reclaimed(b"c2");
        assert!(grace.all_reclaimed());
        grace.end();
        assert!(!grace.is_active());
    }

    #[tokio::test]
    async fn unexpected_client_does_not_count() {
        let mut grace = GraceState::begin(
            vec![b"c1".to_vec()],
            Instant::now() + Duration::from_secs(90),
        );
        grace.mark_reclaimed(b"stranger");
        assert!(!grace.all_reclaimed());
        assert!(grace.is_expected(b"c1"));
        assert!(!grace.is_expected(b"stranger"));
    }

    #[tokio::test(start_paused = true)]
    async fn grace_times_out() {
        let mut grace = GraceState::begin(
            vec![b"c1".to_vec()],
            Instant::now() + Duration::from_secs(90),
        );
        assert!(grace.check_active());
        tokio::time::advance(Duration::from_secs(91)).await;
        assert!(!grace.check_active());
        assert!(!grace.is_active());
    }
}
