//! A thenable promise for rust.
//!
//! A [`Promise`] settles exactly once, either fulfilled with a `T` or
//! rejected with an `E`. Continuations attached with [`Promise::then`] run in
//! registration order when it settles, or right away when it already has.
//! Resolving with another [`Chainable`] value adopts that value's outcome
//! instead of settling on the wrapper.
//!
//! # Examples
//!
//! ```
//! use promise_then::{Promise, Resolution, State};
//!
//! let doubled = Promise::<i32, String>::new(|resolver| {
//!     resolver.resolve(21);
//!     Ok(())
//! })
//! .then_ok(|value| Ok(Resolution::Value(value * 2)));
//!
//! assert_eq!(doubled.state(), State::Fulfilled);
//! assert_eq!(doubled.settled(), Some(Ok(42)));
//! ```
mod chain;
mod macros;
mod promise;

pub use chain::{Callback, Chainable, Resolution};
pub use promise::{deferred, Outcome, Promise, Resolver};

/// Errors raised by the crate itself, as opposed to the rejection reasons
/// carried by a promise.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("the initializer of a promise must be callable")]
    InvalidInitializer,
}

/// Where a promise is in its lifecycle. Once it leaves `Pending` it never
/// changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Pending,
    Fulfilled,
    Rejected,
}

impl State {
    pub fn is_pending(self) -> bool {
        self == State::Pending
    }
}
