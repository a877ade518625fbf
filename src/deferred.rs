//! Deferred reads: block a render pass on a resource without polling.
//!
//! A [`DeferredCell`] wraps one asynchronous operation, started eagerly when
//! the cell is created. Reading it never blocks:
//!
//! - pending: [`DeferredCell::try_read`] returns
//!   [`ReadInterrupt::NotReady`] carrying a [`Pending`] future that completes
//!   once the cell settles. A hosting scheduler awaits it and reads again.
//! - fulfilled: the value is returned, every time, without re-running the
//!   operation.
//! - rejected: [`ReadInterrupt::Rejected`] carries the error, so an error
//!   boundary can tell a failure apart from "not ready".
//!
//! Settlement is one-way: a cell goes from pending to fulfilled or rejected
//! exactly once. A cell whose operation panics or whose task is torn down
//! settles as rejected with [`Aborted`] instead of staying pending forever.
//!
//! ```
//! use snap_query::deferred::{DeferredCell, ReadInterrupt};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let cell = DeferredCell::<u32, snap_query::error::FetchError>::wrap(async { Ok(7) });
//!
//! let value = loop {
//!     match cell.try_read() {
//!         Ok(value) => break value,
//!         Err(ReadInterrupt::NotReady(pending)) => pending.await,
//!         Err(ReadInterrupt::Rejected(err)) => panic!("{err}"),
//!     }
//! };
//! assert_eq!(value, 7);
//! # }
//! ```

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::watch;

/// The operation behind a cell panicked or was torn down before settling.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Deferred operation aborted before settling")]
pub struct Aborted;

/// Settlement state of a [`DeferredCell`].
#[derive(Debug, Clone, PartialEq)]
pub enum CellState<T, E> {
    Pending,
    Fulfilled(T),
    Rejected(E),
}

impl<T, E> CellState<T, E> {
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// Why [`DeferredCell::try_read`] could not return a value.
pub enum ReadInterrupt<E> {
    /// The operation is still running; await the future, then read again.
    NotReady(Pending),
    /// The operation failed.
    Rejected(E),
}

impl<E: fmt::Debug> fmt::Debug for ReadInterrupt<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReady(_) => f.write_str("NotReady"),
            Self::Rejected(err) => f.debug_tuple("Rejected").field(err).finish(),
        }
    }
}

/// Completes when the cell it came from settles.
#[must_use = "futures do nothing unless polled"]
pub struct Pending {
    inner: BoxFuture<'static, ()>,
}

impl Future for Pending {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        self.inner.poll_unpin(cx)
    }
}

/// The eventual outcome of one asynchronous operation.
///
/// Cloning is cheap; clones observe the same settlement.
#[derive(Clone)]
pub struct DeferredCell<T, E> {
    rx: watch::Receiver<CellState<T, E>>,
}

impl<T, E> fmt::Debug for DeferredCell<T, E>
where
    T: fmt::Debug,
    E: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredCell")
            .field("state", &*self.rx.borrow())
            .finish()
    }
}

impl<T, E> DeferredCell<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + From<Aborted> + 'static,
{
    /// Starts `operation` on the Tokio runtime and returns its cell.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn wrap<F>(operation: F) -> Self
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
    {
        let (tx, rx) = watch::channel(CellState::Pending);
        tokio::spawn(async move {
            let settled = match AssertUnwindSafe(operation).catch_unwind().await {
                Ok(Ok(value)) => CellState::Fulfilled(value),
                Ok(Err(err)) => CellState::Rejected(err),
                Err(_) => CellState::Rejected(E::from(Aborted)),
            };
            tx.send_replace(settled);
        });
        Self { rx }
    }

    /// Returns a cell that is already fulfilled with `value`.
    pub fn ready(value: T) -> Self {
        let (_, rx) = watch::channel(CellState::Fulfilled(value));
        Self { rx }
    }

    /// Reads the cell without blocking.
    ///
    /// # Errors
    ///
    /// [`ReadInterrupt::NotReady`] while pending, [`ReadInterrupt::Rejected`]
    /// once the operation failed.
    pub fn try_read(&self) -> Result<T, ReadInterrupt<E>> {
        // Checked before borrowing: the writer settles before it goes away.
        let writer_gone = self.rx.has_changed().is_err();
        match &*self.rx.borrow() {
            CellState::Fulfilled(value) => return Ok(value.clone()),
            CellState::Rejected(err) => return Err(ReadInterrupt::Rejected(err.clone())),
            CellState::Pending if writer_gone => {
                return Err(ReadInterrupt::Rejected(E::from(Aborted)));
            }
            CellState::Pending => {}
        }
        Err(ReadInterrupt::NotReady(self.pending()))
    }

    /// Waits for the cell to settle and returns its outcome.
    ///
    /// # Errors
    ///
    /// Returns the operation's error if it was rejected.
    pub async fn settled(&self) -> Result<T, E> {
        loop {
            match self.try_read() {
                Ok(value) => return Ok(value),
                Err(ReadInterrupt::Rejected(err)) => return Err(err),
                Err(ReadInterrupt::NotReady(pending)) => pending.await,
            }
        }
    }

    /// Returns a snapshot of the settlement state.
    #[must_use]
    pub fn state(&self) -> CellState<T, E> {
        self.rx.borrow().clone()
    }

    #[must_use]
    pub fn is_settled(&self) -> bool {
        !self.rx.borrow().is_pending()
    }

    fn pending(&self) -> Pending {
        let mut rx = self.rx.clone();
        Pending {
            inner: async move {
                while rx.borrow_and_update().is_pending() {
                    if rx.changed().await.is_err() {
                        break;
                    }
                }
            }
            .boxed(),
        }
    }
}
