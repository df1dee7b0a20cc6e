//! The adoption protocol: anything that can report an eventual outcome
//! through a pair of callbacks can be handed to a resolver in place of a
//! plain value.
use std::fmt;

/// A one-shot continuation. Settlement hands it the value or the reason.
pub type Callback<A> = Box<dyn FnOnce(A) + Send>;

/// A value exposing a two-callback chaining operation.
///
/// Implementors promise to call at most one of the two callbacks, at most
/// once. The fulfilled callback takes a [`Resolution`], so a chainable may
/// itself settle on yet another chainable and adoption keeps unwrapping.
///
/// # Examples
///
/// ```
/// use promise_then::{Callback, Chainable, Promise, Resolution};
///
/// /// Hands back a fixed value as soon as someone chains on it.
/// struct Ready(u8);
///
/// impl Chainable<u8, ()> for Ready {
///     fn chain(self: Box<Self>, on_fulfilled: Callback<Resolution<u8, ()>>, _: Callback<()>) {
///         on_fulfilled(Resolution::Value(self.0))
///     }
/// }
///
/// let promise = Promise::<u8, ()>::new(|resolver| {
///     resolver.adopt(Ready(7));
///     Ok(())
/// });
/// assert_eq!(promise.settled(), Some(Ok(7)));
/// ```
pub trait Chainable<T, E>: Send {
    fn chain(self: Box<Self>, on_fulfilled: Callback<Resolution<T, E>>, on_rejected: Callback<E>);
}

/// What a resolver is asked to settle on: a plain value, or a chainable whose
/// outcome is adopted.
pub enum Resolution<T, E> {
    Value(T),
    Chain(Box<dyn Chainable<T, E>>),
}

impl<T, E> Resolution<T, E> {
    pub fn adopt<C>(chainable: C) -> Self
    where
        C: Chainable<T, E> + 'static,
    {
        Resolution::Chain(Box::new(chainable))
    }

    pub fn is_chain(&self) -> bool {
        matches!(self, Resolution::Chain(_))
    }
}

impl<T, E> From<T> for Resolution<T, E> {
    fn from(value: T) -> Self {
        Resolution::Value(value)
    }
}

impl<T: fmt::Debug, E> fmt::Debug for Resolution<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Resolution::Chain(_) => f.write_str("Chain(..)"),
        }
    }
}
