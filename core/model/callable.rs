use futures::future::{FutureExt, LocalBoxFuture};
use std::future::Future;

pub type AsyncFn<T> = Box<dyn FnOnce() -> LocalBoxFuture<'static, anyhow::Result<T>> + Send>;
pub type BlockingFn<T> = Box<dyn FnOnce() -> anyhow::Result<T> + Send>;

/// A unit of work that can be submitted to a pool.
///
/// The closure itself must be `Send` so it can travel to a worker thread, but the future it
/// produces never leaves that worker and so it does not need to be.
///
/// Arguments are bound up-front with [Callable::with_args]: use a tuple for positional
/// arguments or a struct for named ones.
///
pub enum Callable<T> {
    Async(AsyncFn<T>),
    Blocking(BlockingFn<T>),
}

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum CallableKind {
    Async,
    Blocking,
}

impl std::fmt::Display for CallableKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallableKind::Async => f.write_str("async"),
            CallableKind::Blocking => f.write_str("blocking"),
        }
    }
}

impl<T: 'static> Callable<T> {
    pub fn future<F, Fut>(f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + 'static,
    {
        Callable::Async(Box::new(move || f().boxed_local()))
    }

    pub fn blocking<F>(f: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        Callable::Blocking(Box::new(f))
    }

    pub fn with_args<A, F, Fut>(f: F, args: A) -> Self
    where
        A: Send + 'static,
        F: FnOnce(A) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + 'static,
    {
        Self::future(move || f(args))
    }

    pub fn blocking_with_args<A, F>(f: F, args: A) -> Self
    where
        A: Send + 'static,
        F: FnOnce(A) -> anyhow::Result<T> + Send + 'static,
    {
        Self::blocking(move || f(args))
    }

    pub fn kind(&self) -> CallableKind {
        match self {
            Callable::Async(_) => CallableKind::Async,
            Callable::Blocking(_) => CallableKind::Blocking,
        }
    }
}

impl<T> std::fmt::Debug for Callable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Callable::Async(_) => f.write_str("Callable::Async(..)"),
            Callable::Blocking(_) => f.write_str("Callable::Blocking(..)"),
        }
    }
}
