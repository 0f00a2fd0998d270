//! A scripted simulation server for tests.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::protocol::{self, ClientMessage, ServerMessage};
use crate::record::ResultRecord;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum Kind {
    Submit,
    Cancel,
}

impl Kind {
    fn matches(&self, message: &ClientMessage) -> bool {
        matches!(
            (self, message),
            (Kind::Submit, ClientMessage::Submit { .. }) | (Kind::Cancel, ClientMessage::Cancel)
        )
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Step {
    /// Waits for the client to send a message of the given kind.
    Expect(Kind),
    Accept(u64),
    Reject {
        message: String,
        line: Option<usize>,
        reference: Option<String>,
    },
    /// Sends a record, numbered from 1.
    Record(ResultRecord),
    Sleep(Duration),
    AckCancel,
    /// Closes the connection.
    Close,
    /// Stops responding without closing the connection.
    Hang,
}

pub(crate) struct TestServer {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<ClientMessage>>>,
    _handle: JoinHandle<()>,
}

impl TestServer {
    /// Serves one connection according to `script`.
    ///
    /// Once the script ends the connection stays open until the client
    /// closes it.
    pub(crate) async fn start(script: Vec<Step>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let log = received.clone();

        let handle = tokio::spawn(async move {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let (mut sink, mut stream) = protocol::framed(stream).split();
            let (tx, mut rx) = mpsc::unbounded_channel();
            let reader = tokio::spawn(async move {
                while let Ok(Some(message)) =
                    protocol::recv::<_, ClientMessage>(&mut stream).await
                {
                    log.lock().unwrap().push(message.clone());
                    let _ = tx.send(message);
                }
            });

            let mut seq = 0;
            for step in script {
                let sent = match step {
                    Step::Expect(kind) => loop {
                        match rx.recv().await {
                            Some(message) if kind.matches(&message) => break Ok(()),
                            Some(_) => continue,
                            None => return,
                        }
                    },
                    Step::Accept(session) => {
                        protocol::send(&mut sink, &ServerMessage::Accepted { session }).await
                    }
                    Step::Reject {
                        message,
                        line,
                        reference,
                    } => {
                        protocol::send(
                            &mut sink,
                            &ServerMessage::Rejected {
                                message,
                                line,
                                reference,
                            },
                        )
                        .await
                    }
                    Step::Record(record) => {
                        seq += 1;
                        protocol::send(&mut sink, &ServerMessage::Record { seq, record }).await
                    }
                    Step::Sleep(duration) => {
                        tokio::time::sleep(duration).await;
                        Ok(())
                    }
                    Step::AckCancel => protocol::send(&mut sink, &ServerMessage::CancelAck).await,
                    Step::Close => {
                        reader.abort();
                        return;
                    }
                    Step::Hang => std::future::pending().await,
                };
                if sent.is_err() {
                    return;
                }
            }
            let _ = reader.await;
        });

        Self {
            addr,
            received,
            _handle: handle,
        }
    }

    pub(crate) fn addr(&self) -> String {
        self.addr.to_string()
    }

    /// Messages received so far.
    pub(crate) fn received(&self) -> Vec<ClientMessage> {
        self.received.lock().unwrap().clone()
    }

    /// Waits up to a second for the received messages to satisfy `done`.
    pub(crate) async fn received_until(
        &self,
        done: impl Fn(&[ClientMessage]) -> bool,
    ) -> Vec<ClientMessage> {
        for _ in 0..100 {
            let received = self.received();
            if done(&received) {
                return received;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.received()
    }
}

/// An address with nothing listening on it.
pub(crate) async fn closed_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr.to_string()
}
