//! Task supervision.
//!
//! Every role of a node runs as its own tokio task sharing one register
//! store. A task that panics is logged and the others keep running; all
//! tasks are aborted on shutdown.

use std::future::Future;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::signal;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info, warn};

use meterlink_core::SharedStore;

use crate::config::NodeConfig;
use crate::link::{LinkError, LinkReceiver, LinkSender, PeerId};
use crate::poller::{PollTiming, Poller};
use crate::relay::{RelayReceiver, RelaySender, RelayTiming};
use crate::responder::Responder;
use crate::serial::RtuPort;

/// Errors assembling the task set.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Role {0} is configured but its transport was not provided")]
    MissingTransport(&'static str),
    #[error(transparent)]
    Link(#[from] LinkError),
}

/// Transports handed to the node's tasks.
pub struct NodeIo<U, D, S, R> {
    pub upstream: Option<RtuPort<U>>,
    pub downstream: Option<RtuPort<D>>,
    pub link_sender: Option<S>,
    pub link_receiver: Option<R>,
}

struct Task {
    name: &'static str,
    abort: AbortHandle,
    watcher: JoinHandle<()>,
}

/// Supervisor for the node's long-lived tasks.
#[derive(Default)]
pub struct Scheduler {
    tasks: Vec<Task>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a named task.
    pub fn spawn<F>(&mut self, name: &'static str, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        let abort = handle.abort_handle();

        let watcher = tokio::spawn(async move {
            match handle.await {
                Ok(()) => info!(task = name, "Task finished"),
                Err(e) if e.is_panic() => error!(task = name, "Task panicked"),
                Err(_) => debug!(task = name, "Task cancelled"),
            }
        });

        debug!(task = name, "Spawned task");
        self.tasks.push(Task {
            name,
            abort,
            watcher,
        });
    }

    /// Spawn one task per role configured in `config`.
    pub fn spawn_node<U, D, S, R>(
        &mut self,
        config: &NodeConfig,
        store: &SharedStore,
        io: NodeIo<U, D, S, R>,
    ) -> Result<(), SchedulerError>
    where
        U: AsyncRead + AsyncWrite + Unpin + Send + 'static,
        D: AsyncRead + AsyncWrite + Unpin + Send + 'static,
        S: LinkSender + 'static,
        R: LinkReceiver + 'static,
    {
        let NodeIo {
            upstream,
            downstream,
            link_sender,
            link_receiver,
        } = io;

        if let Some(upstream_config) = &config.upstream {
            let port = upstream.ok_or(SchedulerError::MissingTransport("poller"))?;
            let poller = Poller::new(
                port,
                upstream_config.sources(),
                store.clone(),
                PollTiming::from(upstream_config),
            );
            self.spawn("poller", poller.run());
        }

        if let Some(downstream_config) = &config.downstream {
            let port = downstream.ok_or(SchedulerError::MissingTransport("responder"))?;
            let responder = Responder::new(port, downstream_config, store.clone());
            self.spawn("responder", responder.run());
        }

        if let Some(relay) = &config.relay {
            let peer = PeerId::new(relay.peer.clone())?;

            if relay.send {
                let link = link_sender.ok_or(SchedulerError::MissingTransport("relay-send"))?;
                let sender =
                    RelaySender::new(link, peer.clone(), store.clone(), RelayTiming::from(relay));
                self.spawn("relay-send", sender.run());
            }

            if relay.receive {
                let link =
                    link_receiver.ok_or(SchedulerError::MissingTransport("relay-receive"))?;
                let receiver = RelayReceiver::new(link, peer, store.clone());
                self.spawn("relay-receive", receiver.run());
            }
        }

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn task_names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|t| t.name).collect()
    }

    /// Run until `shutdown` resolves, then abort every task.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        info!(tasks = self.tasks.len(), "Node running");

        shutdown.await;

        info!("Stopping tasks");
        for task in &self.tasks {
            task.abort.abort();
        }

        for task in self.tasks {
            if let Err(e) = task.watcher.await {
                warn!(task = task.name, error = %e, "Task watcher failed");
            }
        }
    }

    /// Run until Ctrl+C is received.
    pub async fn run_until_ctrl_c(self) {
        self.run_until(async {
            if let Err(e) = signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl+C");
            }
            info!("Received shutdown signal");
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_panic_does_not_stop_other_tasks() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new();

        scheduler.spawn("crasher", async {
            panic!("boom");
        });

        let counter = ticks.clone();
        scheduler.spawn("ticker", async move {
            loop {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });

        assert_eq!(scheduler.task_names(), vec!["crasher", "ticker"]);

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let observed = ticks.clone();
        tokio::spawn(async move {
            while observed.load(Ordering::SeqCst) < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            let _ = stop_tx.send(());
        });

        scheduler
            .run_until(async {
                let _ = stop_rx.await;
            })
            .await;

        let after_stop = ticks.load(Ordering::SeqCst);
        assert!(after_stop >= 3);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn test_empty_scheduler() {
        let scheduler = Scheduler::new();
        assert!(scheduler.is_empty());
        assert_eq!(scheduler.len(), 0);
    }
}
