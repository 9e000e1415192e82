//! Compiles cursor-based pagination over an ordered row query into one
//! composed query returning the page, its page info and an optional total.

#[macro_use]
extern crate cfg_if;
#[macro_use]
extern crate derive_more;
#[macro_use]
extern crate serde;

#[macro_use]
pub mod sql;

mod builder;
mod comparator;
mod cursor;
mod env;
mod error;
mod offset;
mod order;
mod page_info;
mod plan;
mod value;

pub use crate::builder::*;
pub use crate::comparator::*;
pub use crate::cursor::*;
pub use crate::env::pagination_max_count;
pub use crate::error::*;
pub use crate::offset::*;
pub use crate::order::*;
pub use crate::page_info::*;
pub use crate::plan::*;
pub use crate::value::*;

cfg_if! { if #[cfg(feature = "diesel")] {
    mod diesel;
    pub use crate::diesel::*;
} }
