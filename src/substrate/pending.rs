//! Pending Results
//!
//! Handle to the eventual reply of a routed call. Await it, block on it,
//! or drop it for fire-and-forget.

use std::future::{Future, IntoFuture};
use std::marker::PhantomData;
use std::pin::Pin;
use std::time::Duration;

use tokio::sync::oneshot;

use super::Reply;
use crate::error::{Error, Result};
use crate::store::Committed;
use crate::types::{NodeId, Object, ObjectKey, WriteReceipt};

/// Path a call took
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Not tagged by the routing engine
    Direct,
    /// Ordered, durable call across the caller's own shard
    Ordered,
    /// Point-to-point call to one node
    PointToPoint(NodeId),
}

/// Conversion from a raw reply into a typed result
pub trait FromReply: Sized {
    fn from_reply(reply: Reply) -> Result<Self>;
}

impl FromReply for Reply {
    fn from_reply(reply: Reply) -> Result<Self> {
        Ok(reply)
    }
}

impl FromReply for WriteReceipt {
    fn from_reply(reply: Reply) -> Result<Self> {
        match reply {
            Reply::Written(receipt) => Ok(receipt),
            other => Err(unexpected("Written", &other)),
        }
    }
}

impl FromReply for Option<Object> {
    fn from_reply(reply: Reply) -> Result<Self> {
        match reply {
            Reply::Object(object) => Ok(object),
            other => Err(unexpected("Object", &other)),
        }
    }
}

impl FromReply for Option<Committed> {
    fn from_reply(reply: Reply) -> Result<Self> {
        match reply {
            Reply::Record(record) => Ok(record),
            other => Err(unexpected("Record", &other)),
        }
    }
}

impl FromReply for u64 {
    fn from_reply(reply: Reply) -> Result<Self> {
        match reply {
            Reply::Size(size) => Ok(size),
            other => Err(unexpected("Size", &other)),
        }
    }
}

impl FromReply for Vec<ObjectKey> {
    fn from_reply(reply: Reply) -> Result<Self> {
        match reply {
            Reply::Keys(keys) => Ok(keys),
            other => Err(unexpected("Keys", &other)),
        }
    }
}

fn unexpected(expected: &'static str, actual: &Reply) -> Error {
    Error::UnexpectedReply {
        expected,
        actual: actual.name(),
    }
}

/// Completion side of a pending result, held by the transport
pub struct ReplySender {
    tx: oneshot::Sender<Result<Reply>>,
}

impl ReplySender {
    /// Deliver the reply; a caller that already dropped its handle is ignored
    pub fn send(self, result: Result<Reply>) {
        let _ = self.tx.send(result);
    }
}

/// Eventual reply of a routed call
#[must_use = "a pending result does nothing unless awaited; drop it explicitly for fire-and-forget"]
pub struct PendingResult<T = Reply> {
    rx: oneshot::Receiver<Result<Reply>>,
    route: Route,
    _marker: PhantomData<fn() -> T>,
}

impl PendingResult<Reply> {
    /// Create a pending result and its completion handle
    pub fn channel() -> (ReplySender, Self) {
        let (tx, rx) = oneshot::channel();
        (
            ReplySender { tx },
            Self {
                rx,
                route: Route::Direct,
                _marker: PhantomData,
            },
        )
    }

    /// An already completed result
    pub fn ready(result: Result<Reply>) -> Self {
        let (tx, pending) = Self::channel();
        tx.send(result);
        pending
    }
}

impl<T: FromReply> PendingResult<T> {
    /// Path the call took
    pub fn route(&self) -> Route {
        self.route
    }

    pub(crate) fn routed(mut self, route: Route) -> Self {
        self.route = route;
        self
    }

    /// Reinterpret the reply as another type
    pub fn typed<U: FromReply>(self) -> PendingResult<U> {
        PendingResult {
            rx: self.rx,
            route: self.route,
            _marker: PhantomData,
        }
    }

    /// Await the reply
    pub async fn get(self) -> Result<T> {
        let reply = self.rx.await.map_err(|_| Error::ResultDropped)??;
        T::from_reply(reply)
    }

    /// Await the reply for at most `timeout`
    pub async fn get_timeout(self, timeout: Duration) -> Result<T> {
        match tokio::time::timeout(timeout, self.get()).await {
            Ok(result) => result,
            Err(_) => Err(Error::CallTimeout(timeout)),
        }
    }

    /// Block the current thread until the reply arrives
    ///
    /// # Panics
    ///
    /// Panics when called from inside an async runtime; use `get` there.
    pub fn wait(self) -> Result<T> {
        let reply = self.rx.blocking_recv().map_err(|_| Error::ResultDropped)??;
        T::from_reply(reply)
    }
}

impl<T: FromReply + Send + 'static> IntoFuture for PendingResult<T> {
    type Output = Result<T>;
    type IntoFuture = Pin<Box<dyn Future<Output = Result<T>> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.get())
    }
}

impl<T> std::fmt::Debug for PendingResult<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingResult")
            .field("route", &self.route)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_and_wait() {
        let receipt = WriteReceipt {
            version: 3,
            timestamp_us: 10,
        };
        let pending = PendingResult::ready(Ok(Reply::Written(receipt)));
        assert_eq!(pending.route(), Route::Direct);

        let typed: PendingResult<WriteReceipt> = pending.typed();
        assert_eq!(typed.wait().unwrap(), receipt);
    }

    #[test]
    fn test_completed_from_another_thread() {
        let (tx, pending) = PendingResult::channel();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            tx.send(Ok(Reply::Size(42)));
        });

        assert_eq!(pending.typed::<u64>().wait().unwrap(), 42);
        handle.join().unwrap();
    }

    #[test]
    fn test_dropped_sender() {
        let (tx, pending) = PendingResult::channel();
        drop(tx);
        assert!(matches!(pending.wait(), Err(Error::ResultDropped)));
    }

    #[test]
    fn test_reply_type_mismatch() {
        let pending = PendingResult::ready(Ok(Reply::Size(1)));
        let err = pending.typed::<Vec<ObjectKey>>().wait().unwrap_err();
        assert!(matches!(
            err,
            Error::UnexpectedReply {
                expected: "Keys",
                actual: "Size"
            }
        ));
    }

    #[test]
    fn test_error_passes_through() {
        let pending = PendingResult::ready(Err(Error::NodeUnreachable(4)));
        assert!(matches!(pending.wait(), Err(Error::NodeUnreachable(4))));
    }

    #[tokio::test]
    async fn test_await_and_timeout() {
        let pending = PendingResult::ready(Ok(Reply::Keys(vec!["a".into()])));
        let keys: Vec<ObjectKey> = pending.typed().await.unwrap();
        assert_eq!(keys, vec!["a".to_string()]);

        let (_tx, pending) = PendingResult::channel();
        let err = pending
            .get_timeout(Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CallTimeout(_)));
    }
}
