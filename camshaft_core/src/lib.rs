//! Core types shared between the camshaft scheduler and its hosts: logical
//! time ([`Tag`], [`Timestamp`]) and the packed reaction priority key
//! ([`ReactionIndex`]).

#![deny(clippy::all)]

mod index;
mod time;

pub use index::ReactionIndex;
pub use time::{Tag, Timestamp};
