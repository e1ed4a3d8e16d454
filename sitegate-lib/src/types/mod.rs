#![allow(unreachable_pub)]

mod error;

pub use error::ErrorKind;

/// The sitegate `Result` type
pub type Result<T> = std::result::Result<T, crate::ErrorKind>;
