//! Fire-time sources.
//!
//! A [`Nexter`] answers one question: starting strictly after a given
//! instant, when does this source fire next? Everything above it (the
//! crontab, the retry layer, the tick driver) is built by composing
//! answers to that question.

use chrono::{DateTime, Duration};
use chrono_tz::Tz;

/// A source of fire times.
pub trait Nexter: Send + Sync {
    /// The next fire time strictly after `after`, or `None` when this
    /// source knows no further fires from there.
    fn next(&self, after: DateTime<Tz>) -> Option<DateTime<Tz>>;
}

/// The smallest representable step between two instants.
pub(crate) fn one_tick() -> Duration {
    Duration::nanoseconds(1)
}

/// Earliest non-`None` fire across `nexters`.
///
/// Stops scanning as soon as a candidate lands on `after + 1ns`: nothing
/// can fire earlier and still be strictly after `after`.
pub(crate) fn earliest<'a, N, I>(nexters: I, after: DateTime<Tz>) -> Option<DateTime<Tz>>
where
    N: Nexter + ?Sized + 'a,
    I: IntoIterator<Item = &'a N>,
{
    let horizon = after + one_tick();
    let mut earliest: Option<DateTime<Tz>> = None;

    for nexter in nexters {
        let Some(next) = nexter.next(after) else {
            continue;
        };

        if earliest.map_or(true, |current| next < current) {
            earliest = Some(next);
            if next == horizon {
                break;
            }
        }
    }

    earliest
}

/// A single fixed fire time.
#[derive(Debug, Clone, Copy)]
pub struct NextTime(pub DateTime<Tz>);

impl Nexter for NextTime {
    fn next(&self, after: DateTime<Tz>) -> Option<DateTime<Tz>> {
        (self.0 > after).then_some(self.0)
    }
}

/// Wraps a closure as a [`Nexter`].
pub struct NextFn<F>(pub F);

impl<F> Nexter for NextFn<F>
where
    F: Fn(DateTime<Tz>) -> Option<DateTime<Tz>> + Send + Sync,
{
    fn next(&self, after: DateTime<Tz>) -> Option<DateTime<Tz>> {
        (self.0)(after)
    }
}

impl<N: Nexter + ?Sized> Nexter for Box<N> {
    fn next(&self, after: DateTime<Tz>) -> Option<DateTime<Tz>> {
        (**self).next(after)
    }
}

/// The external cron evaluator is a fire-time source as-is.
impl Nexter for cron::Schedule {
    fn next(&self, after: DateTime<Tz>) -> Option<DateTime<Tz>> {
        self.after(&after).next()
    }
}

/// An ordered collection of sources; the earliest pending fire wins.
///
/// No deduplication: adding the same source twice is harmless since both
/// copies answer identically.
#[derive(Default)]
pub struct NextList {
    nexters: Vec<Box<dyn Nexter>>,
}

impl NextList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, nexter: impl Nexter + 'static) {
        self.nexters.push(Box::new(nexter));
    }

    pub fn clear(&mut self) {
        self.nexters.clear();
    }
}

impl Nexter for NextList {
    fn next(&self, after: DateTime<Tz>) -> Option<DateTime<Tz>> {
        earliest(self.nexters.iter().map(|nexter| nexter.as_ref()), after)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use chrono::TimeZone;
    use chrono_tz::UTC;

    use super::*;

    fn utc(h: u32, m: u32, s: u32) -> DateTime<Tz> {
        UTC.with_ymd_and_hms(2006, 1, 2, h, m, s).unwrap()
    }

    #[test]
    fn next_time_returns_its_instant_when_still_ahead() {
        let fire = utc(15, 4, 5);
        assert_eq!(NextTime(fire).next(fire - one_tick()), Some(fire));
    }

    #[test]
    fn next_time_is_exhausted_once_passed() {
        let fire = utc(15, 4, 5);
        assert_eq!(NextTime(fire).next(fire), None);
        assert_eq!(NextTime(fire).next(fire + one_tick()), None);
    }

    #[test]
    fn next_fn_passes_through() {
        let input = utc(15, 4, 5);
        let output = utc(16, 0, 0);

        let nexter = NextFn(move |after: DateTime<Tz>| {
            assert_eq!(after, input);
            Some(output)
        });

        assert_eq!(nexter.next(input), Some(output));
    }

    #[test]
    fn list_returns_its_only_member() {
        let mut list = NextList::new();
        list.add(NextTime(utc(16, 0, 0)));

        assert_eq!(list.next(utc(15, 0, 0)), Some(utc(16, 0, 0)));
    }

    #[test]
    fn list_returns_the_earliest_pending_member() {
        let mut list = NextList::new();
        list.add(NextTime(utc(14, 0, 0))); // already passed
        list.add(NextTime(utc(15, 0, 2)));
        list.add(NextTime(utc(15, 0, 1)));
        list.add(NextTime(utc(15, 0, 3)));

        assert_eq!(list.next(utc(15, 0, 0)), Some(utc(15, 0, 1)));
        assert_eq!(list.next(utc(15, 0, 1)), Some(utc(15, 0, 2)));
    }

    #[test]
    fn clearing_forgets_previous_members() {
        let mut list = NextList::new();
        list.add(NextTime(utc(15, 0, 1)));
        list.add(NextTime(utc(15, 0, 2)));
        list.clear();
        list.add(NextTime(utc(15, 0, 3)));
        list.add(NextTime(utc(15, 0, 4)));

        assert_eq!(list.next(utc(15, 0, 2)), Some(utc(15, 0, 3)));
    }

    #[test]
    fn earliest_possible_candidate_stops_the_scan() {
        let fire = utc(15, 0, 0);
        let scanned_past = Arc::new(AtomicBool::new(false));

        let mut list = NextList::new();
        list.add(NextTime(fire));
        let probe = scanned_past.clone();
        list.add(NextFn(move |_: DateTime<Tz>| {
            probe.store(true, Ordering::SeqCst);
            Some(utc(15, 0, 1))
        }));

        assert_eq!(list.next(fire - one_tick()), Some(fire));
        assert!(!scanned_past.load(Ordering::SeqCst));
    }
}
