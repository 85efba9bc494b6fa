//! Raid detection.
//!
//! Joins are scored into a sliding admission window; when the live score
//! crosses the trip threshold the breaker opens, the windowed members become
//! victims, and every further join is punished until the cooldown elapses.

mod circuit;
mod window;

pub use circuit::{Admission, CircuitBreaker, TickOutcome, Trip};
