#![cfg_attr(feature = "cargo-clippy", allow(match_same_arms))]

#[macro_use]
extern crate log;

mod error;
mod identifier;
mod messages;
pub mod router;
mod utils;

pub use self::error::*;

pub use messages::{ArgDict, ArgList, CallError, Dict, List, Reason, Value, URI};
use messages::{ErrorType, Message};
pub use router::Router;

pub type CallResult<T> = Result<T, CallError>;
pub type WampResult<T> = Result<T, Error>;
pub type ID = u64;
