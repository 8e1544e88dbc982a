//! Stream combinators

mod throttle;

pub use throttle::{KeyedThrottle, ThrottleExt};
