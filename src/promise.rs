use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

use crate::chain::{Callback, Chainable, Resolution};
use crate::macros::{debug, trace};
use crate::{Error, State};

/// What a continuation hands back: `Ok` resolves the next promise (adopting
/// it if it is a chain), `Err` rejects it.
pub type Outcome<T, E> = Result<Resolution<T, E>, E>;

/// A value that will be available later, either as a `T` or as an `E`.
///
/// Clones share the same state. A promise can also be awaited, which yields
/// the settled `Result<T, E>`.
///
/// # Examples
///
/// ```
/// use promise_then::{deferred, Resolution};
/// use futures::executor::block_on;
/// use std::thread;
///
/// let (resolver, promise) = deferred::<String, String>();
/// let greeting = promise.then_ok(|name| Ok(Resolution::Value(format!("hi {}", name))));
///
/// let task1 = thread::spawn(move || block_on(async { greeting.await }));
/// resolver.resolve("🍓".into());
/// assert_eq!(task1.join().expect("The task1 thread has panicked"), Ok("hi 🍓".to_string()));
/// ```
pub struct Promise<T, E> {
    promise: Arc<Mutex<Inner<T, E>>>,
}

/// The settlement capabilities of one promise.
///
/// Only the first `resolve`/`reject` counts; everything after it is ignored.
/// Clones settle the same promise.
pub struct Resolver<T, E> {
    promise: Arc<Mutex<Inner<T, E>>>,
}

struct Waiter<T, E> {
    on_fulfilled: Callback<T>,
    on_rejected: Callback<E>,
}

struct Inner<T, E> {
    value: Option<Result<T, E>>,
    waiters: Vec<Waiter<T, E>>,
    wakers: Vec<Waker>,
}

// Callbacks never run under the lock, so a poisoned lock still holds a
// consistent state.
fn lock<T, E>(promise: &Mutex<Inner<T, E>>) -> MutexGuard<'_, Inner<T, E>> {
    promise.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A pending promise together with the resolver that settles it.
///
/// # Examples
///
/// ```
/// use promise_then::{deferred, State};
///
/// let (resolver, promise) = deferred::<i32, ()>();
/// assert_eq!(promise.state(), State::Pending);
/// resolver.resolve(1);
/// assert_eq!(promise.settled(), Some(Ok(1)));
/// ```
pub fn deferred<T, E>() -> (Resolver<T, E>, Promise<T, E>)
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    let promise = Arc::new(Mutex::new(Inner {
        value: None,
        waiters: vec![],
        wakers: vec![],
    }));
    (
        Resolver {
            promise: promise.clone(),
        },
        Promise { promise },
    )
}

impl<T, E> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Runs `init` right away with the resolver of the new promise.
    ///
    /// An `Err` from `init` rejects the promise, unless `init` already
    /// settled it, in which case the error is dropped.
    pub fn new<I>(init: I) -> Self
    where
        I: FnOnce(Resolver<T, E>) -> Result<(), E>,
    {
        let (resolver, promise) = deferred();
        if let Err(reason) = init(resolver.clone()) {
            resolver.reject(reason);
        }
        promise
    }

    /// Like [`Promise::new`], but for an initializer that may be missing.
    ///
    /// ```
    /// use promise_then::{Error, Promise};
    ///
    /// type Init = fn(promise_then::Resolver<(), ()>) -> Result<(), ()>;
    /// assert_eq!(Promise::<(), ()>::try_new(None::<Init>).err(), Some(Error::InvalidInitializer));
    /// ```
    pub fn try_new<I>(init: Option<I>) -> Result<Self, Error>
    where
        I: FnOnce(Resolver<T, E>) -> Result<(), E>,
    {
        init.map(Self::new).ok_or(Error::InvalidInitializer)
    }

    pub fn resolved(value: T) -> Self {
        let (resolver, promise) = deferred();
        resolver.resolve(value);
        promise
    }

    pub fn rejected(reason: E) -> Self {
        let (resolver, promise) = deferred();
        resolver.reject(reason);
        promise
    }

    pub fn state(&self) -> State {
        match lock(&self.promise).value {
            None => State::Pending,
            Some(Ok(_)) => State::Fulfilled,
            Some(Err(_)) => State::Rejected,
        }
    }

    /// The settled value or reason, `None` while pending.
    pub fn settled(&self) -> Option<Result<T, E>> {
        lock(&self.promise).value.clone()
    }

    /// Chains continuations and returns the promise of their outcome.
    ///
    /// A missing `on_fulfilled` passes the value through unchanged and a
    /// missing `on_rejected` passes the reason through unchanged. A handler
    /// that returns `Err` rejects the returned promise with that error.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_then::{Outcome, Promise, Resolution};
    ///
    /// let recovered = Promise::<String, String>::rejected("err".into()).then(
    ///     None::<fn(String) -> Outcome<String, String>>,
    ///     Some(|_reason: String| Ok(Resolution::Value("recovered".to_string()))),
    /// );
    /// assert_eq!(recovered.settled(), Some(Ok("recovered".to_string())));
    /// ```
    pub fn then<F, R>(&self, on_fulfilled: Option<F>, on_rejected: Option<R>) -> Promise<T, E>
    where
        F: FnOnce(T) -> Outcome<T, E> + Send + 'static,
        R: FnOnce(E) -> Outcome<T, E> + Send + 'static,
    {
        Promise::new(|next| {
            let fulfill = next.clone();
            let on_fulfilled: Callback<T> = Box::new(move |value| match on_fulfilled {
                Some(handler) => fulfill.settle_with(handler(value)),
                None => fulfill.resolve(value),
            });
            let reject = next;
            let on_rejected: Callback<E> = Box::new(move |reason| match on_rejected {
                Some(handler) => reject.settle_with(handler(reason)),
                None => reject.reject(reason),
            });
            self.subscribe(on_fulfilled, on_rejected);
            Ok(())
        })
    }

    /// `then` with only a fulfillment handler.
    pub fn then_ok<F>(&self, on_fulfilled: F) -> Promise<T, E>
    where
        F: FnOnce(T) -> Outcome<T, E> + Send + 'static,
    {
        self.then(Some(on_fulfilled), None::<fn(E) -> Outcome<T, E>>)
    }

    /// `then` with only a rejection handler.
    pub fn catch<R>(&self, on_rejected: R) -> Promise<T, E>
    where
        R: FnOnce(E) -> Outcome<T, E> + Send + 'static,
    {
        self.then(None::<fn(T) -> Outcome<T, E>>, Some(on_rejected))
    }

    /// `then` without handlers: a new promise mirroring this one.
    pub fn forward(&self) -> Promise<T, E> {
        self.then(
            None::<fn(T) -> Outcome<T, E>>,
            None::<fn(E) -> Outcome<T, E>>,
        )
    }

    fn subscribe(&self, on_fulfilled: Callback<T>, on_rejected: Callback<E>) {
        let mut promise = lock(&self.promise);
        let Some(settled) = promise.value.clone() else {
            promise.waiters.push(Waiter {
                on_fulfilled,
                on_rejected,
            });
            return;
        };
        drop(promise);
        trace!("promise already settled, running continuation now");
        match settled {
            Ok(value) => on_fulfilled(value),
            Err(reason) => on_rejected(reason),
        }
    }
}

impl<T, E> Resolver<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    pub fn resolve(&self, value: T) {
        self.settle(Ok(value))
    }

    pub fn reject(&self, reason: E) {
        self.settle(Err(reason))
    }

    /// Resolves with a plain value, or adopts a chain.
    pub fn resolve_with(&self, resolution: Resolution<T, E>) {
        match resolution {
            Resolution::Value(value) => self.resolve(value),
            Resolution::Chain(chainable) => self.adopt_boxed(chainable),
        }
    }

    /// Settles the same way `chainable` eventually does.
    ///
    /// The promise stays pending meanwhile, and a direct `resolve` or
    /// `reject` arriving first still wins.
    pub fn adopt<C>(&self, chainable: C)
    where
        C: Chainable<T, E> + 'static,
    {
        self.adopt_boxed(Box::new(chainable))
    }

    pub fn is_settled(&self) -> bool {
        lock(&self.promise).value.is_some()
    }

    fn adopt_boxed(&self, chainable: Box<dyn Chainable<T, E>>) {
        if self.is_settled() {
            debug!("promise already settled, chainable ignored");
            return;
        }
        trace!("adopting the outcome of a chainable");
        let fulfill = self.clone();
        let reject = self.clone();
        chainable.chain(
            Box::new(move |resolution| fulfill.resolve_with(resolution)),
            Box::new(move |reason| reject.reject(reason)),
        );
    }

    fn settle_with(&self, outcome: Outcome<T, E>) {
        match outcome {
            Ok(resolution) => self.resolve_with(resolution),
            Err(reason) => self.reject(reason),
        }
    }

    fn settle(&self, result: Result<T, E>) {
        let (waiters, wakers) = {
            let mut promise = lock(&self.promise);
            if promise.value.is_some() {
                debug!("promise already settled, settlement ignored");
                return;
            }
            promise.value = Some(result.clone());
            (
                std::mem::take(&mut promise.waiters),
                std::mem::take(&mut promise.wakers),
            )
        };
        trace!(
            "promise {}, running {} waiter(s)",
            if result.is_ok() { "fulfilled" } else { "rejected" },
            waiters.len()
        );
        match result {
            Ok(value) => {
                for waiter in waiters {
                    (waiter.on_fulfilled)(value.clone());
                }
            }
            Err(reason) => {
                for waiter in waiters {
                    (waiter.on_rejected)(reason.clone());
                }
            }
        }
        for waker in wakers {
            waker.wake()
        }
    }
}

impl<T, E> Chainable<T, E> for Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn chain(self: Box<Self>, on_fulfilled: Callback<Resolution<T, E>>, on_rejected: Callback<E>) {
        self.subscribe(
            Box::new(move |value| on_fulfilled(Resolution::Value(value))),
            on_rejected,
        );
    }
}

impl<T: Clone, E: Clone> Future for Promise<T, E> {
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut promise = lock(&self.promise);
        if let Some(value) = promise.value.clone() {
            return Poll::Ready(value);
        }
        if !promise.wakers.iter().any(|waker| waker.will_wake(cx.waker())) {
            promise.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Self {
            promise: self.promise.clone(),
        }
    }
}

impl<T, E> Clone for Resolver<T, E> {
    fn clone(&self) -> Self {
        Self {
            promise: self.promise.clone(),
        }
    }
}

impl<T: fmt::Debug, E: fmt::Debug> fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let promise = lock(&self.promise);
        f.debug_struct("Promise")
            .field("value", &promise.value)
            .field("waiters", &promise.waiters.len())
            .finish()
    }
}

impl<T, E> fmt::Debug for Resolver<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use std::sync::mpsc::channel;
    use std::thread;

    fn fulfill_with<T, E>(value: T) -> Outcome<T, E> {
        Ok(Resolution::Value(value))
    }

    #[test]
    fn test_promise_resolve() {
        let promise = Promise::<String, ()>::new(|resolver| {
            resolver.resolve(String::from("🍓"));
            Ok(())
        });
        assert_eq!(promise.state(), State::Fulfilled);
        assert_eq!(promise.settled(), Some(Ok(String::from("🍓"))));
    }

    #[test]
    fn test_promise_reject() {
        let promise = Promise::<(), String>::new(|resolver| {
            resolver.reject(String::from("💥"));
            Ok(())
        });
        assert_eq!(promise.state(), State::Rejected);
        assert_eq!(promise.settled(), Some(Err(String::from("💥"))));
    }

    #[test]
    fn test_promise_resolve_twice() {
        let (resolver, promise) = deferred::<i32, String>();
        resolver.resolve(1);
        resolver.reject(String::from("late"));
        resolver.resolve(2);
        assert_eq!(promise.settled(), Some(Ok(1)));
        assert!(resolver.is_settled());
    }

    #[test]
    fn test_initializer_error_rejects() {
        let promise = Promise::<i32, String>::new(|_| Err(String::from("thrown")));
        assert_eq!(promise.settled(), Some(Err(String::from("thrown"))));
    }

    #[test]
    fn test_initializer_error_after_settlement_is_absorbed() {
        let promise = Promise::<i32, String>::new(|resolver| {
            resolver.resolve(3);
            Err(String::from("thrown"))
        });
        assert_eq!(promise.settled(), Some(Ok(3)));
    }

    #[test]
    fn test_initializer_keeps_resolver() {
        let (tx, rx) = channel();
        let promise = Promise::<i32, ()>::new(move |resolver| {
            tx.send(resolver).unwrap();
            Ok(())
        });
        assert_eq!(promise.state(), State::Pending);
        rx.recv().unwrap().resolve(8);
        assert_eq!(promise.settled(), Some(Ok(8)));
    }

    #[test]
    fn test_try_new() {
        type Init = fn(Resolver<i32, ()>) -> Result<(), ()>;
        assert_eq!(
            Promise::<i32, ()>::try_new(None::<Init>).err(),
            Some(Error::InvalidInitializer)
        );
        let promise = Promise::try_new(Some(|resolver: Resolver<i32, ()>| {
            resolver.resolve(4);
            Ok(())
        }))
        .unwrap();
        assert_eq!(promise.settled(), Some(Ok(4)));
    }

    #[test]
    fn test_waiters_run_in_registration_order() {
        let (resolver, promise) = deferred::<&'static str, ()>();
        let order = Arc::new(Mutex::new(vec![]));
        for index in 0..3 {
            let order = order.clone();
            promise.then_ok(move |value| {
                order.lock().unwrap().push(index);
                fulfill_with(value)
            });
        }
        assert!(order.lock().unwrap().is_empty());
        resolver.resolve("x");
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
        assert!(lock(&promise.promise).waiters.is_empty());
    }

    #[test]
    fn test_rejection_waiters_run_in_registration_order() {
        let (resolver, promise) = deferred::<(), i32>();
        let order = Arc::new(Mutex::new(vec![]));
        for index in 0..3 {
            let order = order.clone();
            promise.catch(move |reason| {
                order.lock().unwrap().push((index, reason));
                fulfill_with(())
            });
        }
        resolver.reject(7);
        assert_eq!(*order.lock().unwrap(), vec![(0, 7), (1, 7), (2, 7)]);
    }

    #[test]
    fn test_late_registration_runs_immediately() {
        let promise = Promise::<i32, ()>::resolved(5);
        let seen = Arc::new(Mutex::new(None));
        let slot = seen.clone();
        promise.then_ok(move |value| {
            *slot.lock().unwrap() = Some(value);
            fulfill_with(value)
        });
        assert_eq!(*seen.lock().unwrap(), Some(5));
    }

    #[test]
    fn test_continuation_may_chain_on_its_own_promise() {
        let (resolver, promise) = deferred::<i32, ()>();
        let inner = promise.clone();
        let nested = Arc::new(Mutex::new(None));
        let slot = nested.clone();
        promise.then_ok(move |value| {
            *slot.lock().unwrap() = Some(inner.then_ok(|v| fulfill_with(v + 1)));
            fulfill_with(value)
        });
        resolver.resolve(1);
        let nested = nested.lock().unwrap().take().unwrap();
        assert_eq!(nested.settled(), Some(Ok(2)));
    }

    #[test]
    fn test_adopt_pending_promise() {
        let (inner_resolver, inner) = deferred::<i32, String>();
        let (resolver, outer) = deferred::<i32, String>();
        resolver.adopt(inner);
        assert_eq!(outer.state(), State::Pending);
        inner_resolver.resolve(7);
        assert_eq!(outer.settled(), Some(Ok(7)));
    }

    #[test]
    fn test_adopt_mirrors_rejection() {
        let (resolver, outer) = deferred::<i32, String>();
        resolver.adopt(Promise::<i32, String>::rejected(String::from("nope")));
        assert_eq!(outer.settled(), Some(Err(String::from("nope"))));
    }

    #[test]
    fn test_direct_settlement_wins_over_pending_adoption() {
        let (inner_resolver, inner) = deferred::<i32, String>();
        let (resolver, outer) = deferred::<i32, String>();
        resolver.adopt(inner);
        resolver.reject(String::from("first"));
        inner_resolver.resolve(1);
        assert_eq!(outer.settled(), Some(Err(String::from("first"))));
    }

    #[test]
    fn test_adopt_after_settlement_is_ignored() {
        let (resolver, outer) = deferred::<i32, String>();
        resolver.resolve(1);
        resolver.adopt(Promise::<i32, String>::resolved(2));
        assert_eq!(outer.settled(), Some(Ok(1)));
    }

    #[test]
    fn test_await_across_threads() {
        let (resolver, promise) = deferred::<String, String>();
        let other = promise.clone();
        let task1 = thread::spawn(move || block_on(async { promise.await }));
        let task2 = thread::spawn(move || block_on(async { other.await }));
        let task3 = thread::spawn(move || resolver.resolve(String::from("🍓")));
        task3.join().expect("The task3 thread has panicked");
        assert_eq!(
            task1.join().expect("The task1 thread has panicked"),
            Ok(String::from("🍓"))
        );
        assert_eq!(
            task2.join().expect("The task2 thread has panicked"),
            Ok(String::from("🍓"))
        );
    }

    #[test]
    fn test_debug_shows_value() {
        let promise = Promise::<i32, ()>::resolved(1);
        assert_eq!(
            format!("{:?}", promise),
            "Promise { value: Some(Ok(1)), waiters: 0 }"
        );
    }
}
