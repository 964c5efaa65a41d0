use std::time::{Duration, Instant};

/// Rate limits something, usually progress logs, to at most once per `every`.
pub struct Every {
    every: Duration,
    last: Instant,
}

impl Every {
    pub fn new(every: Duration) -> Self {
        Self {
            every,
            last: Instant::now(),
        }
    }

    pub fn perform(&mut self, f: impl FnOnce()) {
        let now = Instant::now();
        if now - self.last >= self.every {
            self.last = now;
            f()
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn zero_always_performs() {
        let mut every = Every::new(Duration::ZERO);
        let mut count = 0;
        for _ in 0..3 {
            every.perform(|| count += 1);
        }
        assert_eq!(3, count);
    }

    #[test]
    fn long_never_performs() {
        let mut every = Every::new(Duration::from_secs(3600));
        let mut count = 0;
        every.perform(|| count += 1);
        assert_eq!(0, count);
    }
}
