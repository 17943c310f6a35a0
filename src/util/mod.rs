//! Utility modules for rpgtop.

mod cancel;

pub use cancel::CancelToken;
