//! Random number generation, used by the momentum resolution smearing
//!
//! Every shard of the event loop owns its own stream. Streams are derived from
//! the configured seed so that a run is reproducible whatever the number of
//! threads it uses.

mod standard;

pub use self::standard::RandomGenerator;
