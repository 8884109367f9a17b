//! Test module for notify-stream
//!
//! Behavioural tests for the credential dispatcher, the stream client actor
//! and the endpoint session, run on paused tokio time, plus property-based
//! tests using proptest.

#[cfg(test)]
pub mod support;




#[cfg(test)]
pub mod property_tests;
