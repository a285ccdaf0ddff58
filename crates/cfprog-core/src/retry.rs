//! Bounded polling helpers
//!
//! Every wait on the device side is bounded; exhaustion is reported to the
//! caller, which maps it to a failure status.

/// Result of a bounded poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll {
    /// The condition held after the given number of attempts
    Done(u32),
    /// The condition never held
    Exhausted,
}

/// Check `condition` up to `attempts` times, calling `pause` between
/// attempts
///
/// `state` is threaded through both closures so they can share a mutable
/// borrow (typically the bus).
pub fn poll_until<S: ?Sized>(
    state: &mut S,
    attempts: u32,
    mut condition: impl FnMut(&mut S, u32) -> bool,
    mut pause: impl FnMut(&mut S),
) -> Poll {
    for attempt in 0..attempts {
        if attempt != 0 {
            pause(state);
        }
        if condition(state, attempt) {
            return Poll::Done(attempt + 1);
        }
    }
    Poll::Exhausted
}

/// Spin on `condition` without pausing
pub fn spin_until<S: ?Sized>(
    state: &mut S,
    attempts: u32,
    condition: impl FnMut(&mut S, u32) -> bool,
) -> Poll {
    poll_until(state, attempts, condition, |_| {})
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_done_on_first_attempt() {
        let mut pauses = 0u32;
        let res = poll_until(&mut pauses, 5, |_, _| true, |p| *p += 1);
        assert_eq!(res, Poll::Done(1));
        assert_eq!(pauses, 0);
    }

    #[test]
    fn test_success_on_last_attempt_counts() {
        let mut pauses = 0u32;
        let res = poll_until(&mut pauses, 5, |_, n| n == 4, |p| *p += 1);
        assert_eq!(res, Poll::Done(5));
        assert_eq!(pauses, 4);
    }

    #[test]
    fn test_exhausted() {
        let mut checks = 0u32;
        let res = spin_until(&mut checks, 255, |c, _| {
            *c += 1;
            false
        });
        assert_eq!(res, Poll::Exhausted);
        assert_eq!(checks, 255);
    }
}
