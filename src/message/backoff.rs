use std::{iter::Take, time::Duration};

/// Provides a mechanism for managing attempting to complete an operation
/// and retrying the operation, which a backoff, if it fails.
///
/// This iterator provides an infinite stream of back off durations, where
/// the duration increases an exponential factor up to some maximum delay.
/// Upon reaching the maximum delay, that value will be returned from then
/// on. Use [Iterator::take] to bound the number of attempts.
///
/// The retry helper uses [std::thread::sleep] for the delay; so, in its
/// current design, do NOT use this with asynchronous code.
pub struct ExponentialBackoff {
    curr: Duration,
    max: Duration,
    factor: u32,
}

impl ExponentialBackoff {
    pub fn new(start: Duration, max: Duration, factor: u32) -> ExponentialBackoff {
        ExponentialBackoff {
            curr: start,
            max,
            factor,
        }
    }
}

impl Iterator for ExponentialBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        let this = self.curr;
        let new_next = self.curr * self.factor;

        self.curr = if new_next > self.max {
            self.max
        } else {
            new_next
        };

        Some(this)
    }
}

/// The Retry trait provides a protocol for handling retrying a function with a
/// [Result] type until either it succeeds or the [Iterator] completes.  This is
/// defined to be used on Iterators over [Duration] values, those values specfying
/// the amount of time to wait between each retry.
pub trait Retry: Iterator<Item = Duration> + Sized {
    /// Retry the given function until it returns [Ok]. On an error, execute
    /// the `on_err` closure with the error and the delay about to be slept;
    /// this allows you to provide additional logic, like logging, on the
    /// error event which would otherwise be hidden by this function. If the
    /// [Iterator] finishes without a successful execution of `f` then the
    /// last [Err] is returned to the user. `None` means no attempt was made.
    fn retry<F, S, T, E>(self, mut f: F, on_err: S) -> Option<Result<T, E>>
    where
        F: FnMut() -> Result<T, E>,
        S: Fn(&E, Duration),
    {
        let mut last_err = None;
        let mut iter = self.peekable();

        while let Some(delay) = iter.next() {
            match f() {
                Ok(v) => return Some(Ok(v)),
                Err(e) => {
                    if iter.peek().is_some() {
                        on_err(&e, delay);
                        std::thread::sleep(delay);
                    }
                    last_err = Some(Err(e));
                }
            }
        }
        last_err
    }
}

impl Retry for ExponentialBackoff {}

impl Retry for Take<ExponentialBackoff> {}
