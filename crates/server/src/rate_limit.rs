use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use uuid::Uuid;

/// Per-user sliding window over the ask endpoints. Bounded key count so a
/// churn of users cannot grow the map without limit.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<HashMap<Uuid, VecDeque<Instant>>>>,
    window: Duration,
    max_keys: usize,
}

impl RateLimiter {
    pub fn new(window: Duration, max_keys: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            window,
            max_keys,
        }
    }

    pub fn allow(&self, user_id: Uuid, limit: u32) -> bool {
        if limit == 0 {
            return true;
        }

        let now = Instant::now();
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let queue = inner.entry(user_id).or_default();
        expire(queue, now, self.window);
        if queue.len() >= limit as usize {
            return false;
        }
        queue.push_back(now);

        inner.retain(|_, events| {
            expire(events, now, self.window);
            !events.is_empty()
        });

        if inner.len() > self.max_keys {
            let mut overflow = inner.len() - self.max_keys;
            let keys = inner.keys().copied().collect::<Vec<_>>();
            for key in keys {
                if overflow == 0 {
                    break;
                }
                if inner.remove(&key).is_some() {
                    overflow -= 1;
                }
            }
        }

        true
    }
}

fn expire(queue: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(front) = queue.front() {
        if now.duration_since(*front) > window {
            queue.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn rejects_once_the_window_is_full() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 16);
        let user = Uuid::new_v4();
        assert!(limiter.allow(user, 2));
        assert!(limiter.allow(user, 2));
        assert!(!limiter.allow(user, 2));
    }

    #[test]
    fn users_do_not_share_windows() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 16);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert!(limiter.allow(a, 1));
        assert!(!limiter.allow(a, 1));
        assert!(limiter.allow(b, 1));
    }

    #[test]
    fn allows_again_after_the_window_elapses() {
        let limiter = RateLimiter::new(Duration::from_millis(5), 16);
        let user = Uuid::new_v4();
        assert!(limiter.allow(user, 1));
        assert!(!limiter.allow(user, 1));
        thread::sleep(Duration::from_millis(10));
        assert!(limiter.allow(user, 1));
    }

    #[test]
    fn zero_limit_disables_the_limiter() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 16);
        let user = Uuid::new_v4();
        for _ in 0..100 {
            assert!(limiter.allow(user, 0));
        }
    }
}
