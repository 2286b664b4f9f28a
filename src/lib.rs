//! Quote archive bot for chat communities, centred on per-server usage indicators.
//!
//! ```text
//! chat front-end (bot, irc) -> Indicator -> CounterStore (redis | memory)
//!                           -> QuoteStore (postgres | memory)
//! ```

pub mod bot;
pub mod daemon;
pub mod indicator;
pub mod irc;
pub mod quotes;
pub mod store;
pub mod util;

pub mod prelude {
    pub use crate::bot::{Bot, MessageCtx};
    pub use crate::indicator::rank::top_n;
    pub use crate::indicator::{Indicator, IndicatorErr, Kind, Scope, Subject};
    pub use crate::quotes::{Quote, QuoteId, QuoteStore};
    pub use crate::store::{CounterMap, CounterStore, MemoryStore, RedisStore, StoreErr};
}
