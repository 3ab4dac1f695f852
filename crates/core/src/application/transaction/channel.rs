// Named, connection-oriented message channels
//
// One channel carries one transaction. Dropping either end closes it and
// the other end observes the closure on its next receive.

use super::protocol::{Request, Response};
use tokio::sync::mpsc;

/// Coordinator end of a channel
pub struct CoordinatorPort {
    pub(crate) requests: mpsc::UnboundedReceiver<Request>,
    pub(crate) responses: mpsc::UnboundedSender<Response>,
}

/// A channel opened by a client, as seen by the coordinator
pub struct IncomingConnection {
    pub name: String,
    pub port: CoordinatorPort,
}

/// Client end of a channel
pub struct ClientPort {
    requests: mpsc::UnboundedSender<Request>,
    responses: mpsc::UnboundedReceiver<Response>,
}

impl ClientPort {
    /// Send a request; false if the coordinator end is gone
    pub fn send(&self, request: Request) -> bool {
        self.requests.send(request).is_ok()
    }

    /// Next response, or None once the coordinator closed the channel
    pub async fn recv(&mut self) -> Option<Response> {
        self.responses.recv().await
    }

    /// Disconnect
    pub fn close(self) {}
}

/// Create both ends of a channel
pub fn open_channel(name: impl Into<String>) -> (ClientPort, IncomingConnection) {
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let (response_tx, response_rx) = mpsc::unbounded_channel();
    (
        ClientPort {
            requests: request_tx,
            responses: response_rx,
        },
        IncomingConnection {
            name: name.into(),
            port: CoordinatorPort {
                requests: request_rx,
                responses: response_tx,
            },
        },
    )
}

/// Opens channels towards the coordinator
#[derive(Clone)]
pub struct Connector {
    connections: mpsc::UnboundedSender<IncomingConnection>,
}

impl Connector {
    pub(crate) fn new(connections: mpsc::UnboundedSender<IncomingConnection>) -> Self {
        Self { connections }
    }

    /// Open a channel under `name`.
    ///
    /// If the coordinator is gone the returned port is already closed.
    pub fn connect(&self, name: &str) -> ClientPort {
        let (client, incoming) = open_channel(name);
        // On failure the coordinator end is dropped with the error
        let _ = self.connections.send(incoming);
        client
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dropping_coordinator_end_closes_client() {
        let (mut client, incoming) = open_channel("test");
        drop(incoming);

        assert!(!client.send(Request::Register));
        assert!(client.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_connect_without_coordinator_yields_closed_port() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let connector = Connector::new(tx);

        let mut port = connector.connect("test");
        assert!(port.recv().await.is_none());
    }
}
