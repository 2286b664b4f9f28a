use tinyrand::{Rand, RandRange, Seeded, StdRand};
use tinyrand_std::ClockSeed;

/// Clock-seeded index in `0..max`. `max` must be non-zero.
pub fn idx(max: usize) -> usize {
    let seed = ClockSeed::default().next_u64();
    let mut rng = StdRand::seed(seed);

    rng.next_range(0..max)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyReason {
    Failure,
    NoQuotes,
    NotFound,
    NoLastQuote,
}

impl ReplyReason {
    pub fn get_reply(&self) -> &'static str {
        let replies: &[&'static str] = match self {
            ReplyReason::Failure => &Self::FAILURE,
            ReplyReason::NoQuotes => &Self::NO_QUOTES,
            ReplyReason::NotFound => &Self::NOT_FOUND,
            ReplyReason::NoLastQuote => &Self::NO_LAST_QUOTE,
        };

        replies[idx(replies.len())]
    }

    pub(crate) const FAILURE: [&'static str; 3] = [
        "oops, something went wrong. try again in a bit",
        "something went wrong on my end, sorry",
        "that didn't work, something went wrong",
    ];

    pub(crate) const NO_QUOTES: [&'static str; 2] = [
        "nobody has quoted anything here yet",
        "no quotes on this server yet, be the first",
    ];

    pub(crate) const NOT_FOUND: [&'static str; 2] = [
        "no quote with that id here",
        "couldn't find that quote on this server",
    ];

    pub(crate) const NO_LAST_QUOTE: [&'static str; 1] = ["no quote has been shown here yet"];
}
