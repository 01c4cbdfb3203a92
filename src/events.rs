use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::AppError;

const BUS_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteOp {
    Create,
    Update,
    Delete,
}

impl fmt::Display for WriteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WriteOp::Create => "create",
            WriteOp::Update => "update",
            WriteOp::Delete => "delete",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureCause {
    AccessDenied,
    Other { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriteFailure {
    pub path: String,
    pub operation: WriteOp,
    pub payload: Option<serde_json::Value>,
    pub cause: FailureCause,
}

impl WriteFailure {
    pub fn is_access_denied(&self) -> bool {
        self.cause == FailureCause::AccessDenied
    }
}

impl fmt::Display for WriteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            FailureCause::AccessDenied => {
                write!(f, "missing or insufficient permissions: {} {}", self.operation, self.path)
            }
            FailureCause::Other { message } => {
                write!(f, "{} {} failed: {message}", self.operation, self.path)
            }
        }
    }
}

#[derive(Clone)]
pub struct ErrorBus {
    sender: broadcast::Sender<WriteFailure>,
}

impl Default for ErrorBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BUS_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> ErrorSubscription {
        ErrorSubscription {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn publish(&self, failure: WriteFailure) {
        debug!(path = %failure.path, operation = %failure.operation, "{failure}");
        if self.sender.send(failure).is_err() {
            debug!("write failure published with no subscribers");
        }
    }

    /// Publishes `err` against `path` and hands it back so awaited callers can still propagate it.
    pub fn report<P: Serialize>(
        &self,
        err: AppError,
        path: impl Into<String>,
        operation: WriteOp,
        payload: Option<&P>,
    ) -> AppError {
        let cause = if err.is_permission_denied() {
            FailureCause::AccessDenied
        } else {
            FailureCause::Other {
                message: err.to_string(),
            }
        };
        self.publish(WriteFailure {
            path: path.into(),
            operation,
            payload: payload.and_then(|p| serde_json::to_value(p).ok()),
            cause,
        });
        err
    }

    /// Runs a write in the background. Its only failure path is this bus.
    pub fn spawn_write<F>(
        &self,
        path: impl Into<String>,
        operation: WriteOp,
        payload: Option<serde_json::Value>,
        write: F,
    ) -> tokio::task::JoinHandle<()>
    where
        F: Future<Output = Result<(), AppError>> + Send + 'static,
    {
        let bus = self.clone();
        let path = path.into();
        tokio::spawn(async move {
            if let Err(err) = write.await {
                bus.report(err, path, operation, payload.as_ref());
            }
        })
    }
}

pub struct ErrorSubscription {
    receiver: broadcast::Receiver<WriteFailure>,
}

impl ErrorSubscription {
    pub async fn recv(&mut self) -> Option<WriteFailure> {
        loop {
            match self.receiver.recv().await {
                Ok(failure) => return Some(failure),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "error subscriber fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<WriteFailure> {
        loop {
            match self.receiver.try_recv() {
                Ok(failure) => return Some(failure),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}
