//! Candlestick reversal recognizers
//!
//! Every recognizer is a pure predicate evaluated at one bar index, looking
//! back at most two bars plus a trailing downtrend window.
//!
//! # Pattern Categories
//!
//! - **Single-bar**: Hammer
//! - **Two-bar**: Bullish Engulfing, Piercing, Harami, Flat Bottom
//! - **Three-bar**: Morning Star

pub mod helpers;

/// Generate `with_defaults()` -> `Self::default()` for multiple detector types.
macro_rules! impl_with_defaults {
  ($($detector:ty),* $(,)?) => {
    $(impl $detector {
      pub fn with_defaults() -> Self { Self::default() }
    })*
  };
}

pub mod single_bar;
pub mod three_bar;
pub mod two_bar;

// Re-export all detectors for convenience
pub use helpers::*;
pub use single_bar::*;
pub use three_bar::*;
pub use two_bar::*;
