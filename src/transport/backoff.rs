//! Rate-limits new connection attempts (spec.md §4.4: "5 new connections
//! per 100 ms by default"). Grounded on the forward-declared
//! `Client::Backoff` collaborator in `LeaderRPC.h`/`ClientImpl.h` — its
//! body isn't in the retrieval pack, so this is a token bucket built from
//! the one-line contract those headers give it.

use std::time::{Duration, Instant};

use tokio::sync::Mutex;

struct State {
    tokens: u32,
    last_refill: Instant,
}

/// A token bucket: `max_tokens` are available per `period`, refilled
/// continuously (proportional to elapsed time) rather than in discrete
/// bursts.
pub struct Backoff {
    max_tokens: u32,
    period: Duration,
    state: Mutex<State>,
}

impl Backoff {
    pub fn new(max_tokens: u32, period: Duration) -> Backoff {
        Backoff {
            max_tokens,
            period,
            state: Mutex::new(State { tokens: max_tokens, last_refill: Instant::now() }),
        }
    }

    /// Default policy: 5 connections per 100ms.
    pub fn default_policy() -> Backoff {
        Backoff::new(5, Duration::from_millis(100))
    }

    fn refill(&self, state: &mut State) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill);
        if elapsed >= self.period {
            state.tokens = self.max_tokens;
            state.last_refill = now;
        }
    }

    /// Blocks (async) until a connection attempt is permitted, then
    /// consumes one token.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                self.refill(&mut state);
                if state.tokens > 0 {
                    state.tokens -= 1;
                    None
                } else {
                    Some(self.period.saturating_sub(Instant::now().duration_since(state.last_refill)))
                }
            };
            match wait {
                None => return,
                Some(d) => tokio::time::sleep(d).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_burst_up_to_max_tokens() {
        let b = Backoff::new(3, Duration::from_millis(50));
        let start = Instant::now();
        b.acquire().await;
        b.acquire().await;
        b.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(40));
    }

    #[tokio::test]
    async fn blocks_once_exhausted() {
        let b = Backoff::new(1, Duration::from_millis(30));
        b.acquire().await;
        let start = Instant::now();
        b.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(15));
    }
}
