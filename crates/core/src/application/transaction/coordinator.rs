// Transaction Coordinator
//
// One task owns the FIFO of registered transactions. The head of the FIFO
// is the only transaction holding a grant, and only the head is timed.
// Channel traffic, channel closure and timer expiry all arrive as events on
// that task, so the state below is never shared.

use super::channel::{ClientPort, Connector, CoordinatorPort, IncomingConnection};
use super::constants::{FAILURE_CHANNEL_CAPACITY, TRANSACTION_CHANNEL_NAME};
use super::protocol::{Request, Response, TerminationReason, TransactionId};
use super::TransactionError;
use crate::application::shutdown::ShutdownToken;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

type PortKey = u64;

/// Events processed by the coordinator task
#[derive(Debug)]
pub(crate) enum CoordinatorEvent {
    Request { port: PortKey, request: Request },
    Closed { port: PortKey },
    Expired { transaction_id: TransactionId },
}

struct Transaction {
    id: TransactionId,
    responses: mpsc::UnboundedSender<Response>,
}

/// FIFO of registered transactions
pub(crate) struct TransactionCoordinator {
    awaiting: VecDeque<Transaction>,
    busy: bool,
    next_id: TransactionId,
    timeout: Duration,
    timer: Option<JoinHandle<()>>,
    events: mpsc::UnboundedSender<CoordinatorEvent>,
}

impl TransactionCoordinator {
    pub(crate) fn new(timeout: Duration, events: mpsc::UnboundedSender<CoordinatorEvent>) -> Self {
        Self {
            awaiting: VecDeque::new(),
            busy: false,
            next_id: 1,
            timeout,
            timer: None,
            events,
        }
    }

    /// Queue a transaction that answers on `responses`
    pub(crate) fn register(&mut self, responses: mpsc::UnboundedSender<Response>) -> TransactionId {
        let id = self.next_id;
        self.next_id += 1;
        self.awaiting.push_back(Transaction { id, responses });
        debug!(transaction_id = id, queued = self.awaiting.len(), "Transaction registered");
        self.advance();
        id
    }

    /// Remove a transaction, wherever it sits in the FIFO.
    ///
    /// Unknown ids are ignored. Removing the head releases the grant.
    /// A timeout is reported back as an error for the failure stream.
    pub(crate) fn terminate(
        &mut self,
        id: TransactionId,
        reason: TerminationReason,
    ) -> Result<(), TransactionError> {
        let Some(position) = self.awaiting.iter().position(|t| t.id == id) else {
            debug!(transaction_id = id, %reason, "Termination of unknown transaction ignored");
            return Ok(());
        };
        let Some(transaction) = self.awaiting.remove(position) else {
            return Ok(());
        };

        if reason != TerminationReason::PortClosed {
            // The client may already be gone
            let _ = transaction.responses.send(Response::TerminationAcknowledged);
        }
        debug!(transaction_id = id, %reason, "Transaction terminated");

        if position == 0 {
            self.release();
            self.advance();
        }

        if reason == TerminationReason::Timeout {
            return Err(TransactionError::TimedOut(id));
        }
        Ok(())
    }

    /// Grant the head if nothing is currently granted
    fn advance(&mut self) {
        if self.busy {
            return;
        }
        while let Some(head) = self.awaiting.front() {
            let id = head.id;
            if head.responses.send(Response::Granted { transaction_id: id }).is_err() {
                self.awaiting.pop_front();
                let reason =
                    TerminationReason::Malformed("response channel closed before grant".into());
                warn!(transaction_id = id, %reason, "Transaction terminated");
                continue;
            }

            self.busy = true;
            self.arm_timer(id);
            debug!(transaction_id = id, "Transaction granted");
            return;
        }
    }

    fn arm_timer(&mut self, transaction_id: TransactionId) {
        let events = self.events.clone();
        let timeout = self.timeout;
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = events.send(CoordinatorEvent::Expired { transaction_id });
        }));
    }

    fn release(&mut self) {
        self.busy = false;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    #[cfg(test)]
    fn awaiting_ids(&self) -> Vec<TransactionId> {
        self.awaiting.iter().map(|t| t.id).collect()
    }
}

impl Drop for TransactionCoordinator {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

// ============================================================================
// Coordinator task
// ============================================================================

struct PortEntry {
    responses: mpsc::UnboundedSender<Response>,
    transaction: Option<TransactionId>,
}

struct CoordinatorTask {
    state: TransactionCoordinator,
    ports: HashMap<PortKey, PortEntry>,
    next_port: PortKey,
    events: mpsc::UnboundedSender<CoordinatorEvent>,
    failures: broadcast::Sender<TransactionError>,
}

impl CoordinatorTask {
    async fn run(
        mut self,
        mut connections: mpsc::UnboundedReceiver<IncomingConnection>,
        mut events: mpsc::UnboundedReceiver<CoordinatorEvent>,
        mut shutdown: ShutdownToken,
    ) {
        info!(timeout_ms = self.state.timeout.as_millis() as u64, "Transaction coordinator started");
        let mut accepting = true;

        loop {
            tokio::select! {
                _ = shutdown.wait() => {
                    info!("Transaction coordinator shutting down");
                    break;
                }
                connection = connections.recv(), if accepting => match connection {
                    Some(connection) => self.accept(connection),
                    None => accepting = false,
                },
                Some(event) = events.recv() => self.handle(event),
            }

            if !accepting && self.ports.is_empty() {
                info!("Transaction coordinator stopped: no connectors left");
                break;
            }
        }
    }

    fn accept(&mut self, connection: IncomingConnection) {
        if connection.name != TRANSACTION_CHANNEL_NAME {
            warn!(channel = %connection.name, "Ignoring connection on unknown channel");
            return;
        }

        let port = self.next_port;
        self.next_port += 1;

        let CoordinatorPort {
            mut requests,
            responses,
        } = connection.port;
        let events = self.events.clone();
        tokio::spawn(async move {
            while let Some(request) = requests.recv().await {
                if events.send(CoordinatorEvent::Request { port, request }).is_err() {
                    return;
                }
            }
            let _ = events.send(CoordinatorEvent::Closed { port });
        });

        self.ports.insert(
            port,
            PortEntry {
                responses,
                transaction: None,
            },
        );
    }

    fn handle(&mut self, event: CoordinatorEvent) {
        match event {
            CoordinatorEvent::Request { port, request } => self.handle_request(port, request),
            CoordinatorEvent::Closed { port } => {
                if let Some(PortEntry {
                    transaction: Some(id),
                    ..
                }) = self.ports.remove(&port)
                {
                    let result = self.state.terminate(id, TerminationReason::PortClosed);
                    self.report(result);
                }
            }
            CoordinatorEvent::Expired { transaction_id } => {
                let result = self
                    .state
                    .terminate(transaction_id, TerminationReason::Timeout);
                self.report(result);
            }
        }
    }

    fn handle_request(&mut self, port: PortKey, request: Request) {
        let Some(entry) = self.ports.get_mut(&port) else {
            return;
        };

        match request {
            Request::Register => {
                if let Some(existing) = entry.transaction {
                    warn!(transaction_id = existing, "Ignoring repeated registration on one channel");
                    return;
                }
                entry.transaction = Some(self.state.register(entry.responses.clone()));
            }
            Request::Terminate { transaction_id } => {
                if entry.transaction != Some(transaction_id) {
                    warn!(
                        transaction_id,
                        owned = ?entry.transaction,
                        "Ignoring termination of a transaction owned by another channel"
                    );
                    return;
                }
                entry.transaction = None;
                let result = self
                    .state
                    .terminate(transaction_id, TerminationReason::TerminationRequest);
                self.report(result);
            }
        }
    }

    fn report(&self, result: Result<(), TransactionError>) {
        if let Err(err) = result {
            error!(error = %err, "Transaction evicted");
            // Nobody listening is fine
            let _ = self.failures.send(err);
        }
    }
}

/// Cloneable access to a running coordinator
#[derive(Clone)]
pub struct CoordinatorHandle {
    connector: Connector,
    failures: broadcast::Sender<TransactionError>,
    timeout: Duration,
}

impl CoordinatorHandle {
    /// Open a channel to the coordinator
    pub fn connect(&self, name: &str) -> ClientPort {
        self.connector.connect(name)
    }

    /// Stream of coordinator failures (timeouts)
    pub fn subscribe_failures(&self) -> broadcast::Receiver<TransactionError> {
        self.failures.subscribe()
    }

    /// Execution timeout applied to every grant
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(test)]
impl CoordinatorHandle {
    /// Handle whose channels are served by the caller instead of a task
    pub(crate) fn detached(
        timeout: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<IncomingConnection>) {
        let (connections_tx, connections_rx) = mpsc::unbounded_channel();
        let (failures, _) = broadcast::channel(FAILURE_CHANNEL_CAPACITY);
        (
            Self {
                connector: Connector::new(connections_tx),
                failures,
                timeout,
            },
            connections_rx,
        )
    }
}

/// Start the coordinator task; it runs until `shutdown` fires
pub fn spawn_coordinator(
    timeout: Duration,
    shutdown: ShutdownToken,
) -> (CoordinatorHandle, JoinHandle<()>) {
    let (connections_tx, connections_rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (failures, _) = broadcast::channel(FAILURE_CHANNEL_CAPACITY);

    let task = CoordinatorTask {
        state: TransactionCoordinator::new(timeout, events_tx.clone()),
        ports: HashMap::new(),
        next_port: 1,
        events: events_tx,
        failures: failures.clone(),
    };
    let join = tokio::spawn(task.run(connections_rx, events_rx, shutdown));

    (
        CoordinatorHandle {
            connector: Connector::new(connections_tx),
            failures,
            timeout,
        },
        join,
    )
}
