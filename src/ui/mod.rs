//! UI boundary
//!
//! The terminal front-end is an external collaborator; the core hands
//! it one merged stream of typed messages. Dropped updates are safe
//! because every subsystem also exposes a snapshot accessor the
//! consumer can resync from.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::chain::ChainUpdate;
use crate::logs::StreamUpdate;
use crate::watch::RunUpdate;

/// One message for the UI event loop
#[derive(Debug, Clone)]
pub enum UiMessage {
    /// A watched run changed
    Run(RunUpdate),
    /// New log lines arrived for a streamed run
    Stream(StreamUpdate),
    /// A chain execution changed state
    Chain(ChainUpdate),
}

/// Merges subsystem update channels into one UI message stream
pub struct UiBridge {
    tx: mpsc::Sender<UiMessage>,
    token: CancellationToken,
}

impl UiBridge {
    /// Create a bridge and the consumer's end of the merged stream.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<UiMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                tx,
                token: CancellationToken::new(),
            },
            rx,
        )
    }

    /// Forward watcher updates into the merged stream.
    pub fn attach_watcher(&self, rx: mpsc::Receiver<RunUpdate>) {
        self.forward(rx, UiMessage::Run);
    }

    /// Forward streamer updates into the merged stream.
    pub fn attach_streamer(&self, rx: mpsc::Receiver<StreamUpdate>) {
        self.forward(rx, UiMessage::Stream);
    }

    /// Forward chain executor updates into the merged stream.
    pub fn attach_chain(&self, rx: mpsc::Receiver<ChainUpdate>) {
        self.forward(rx, UiMessage::Chain);
    }

    fn forward<T: Send + 'static>(
        &self,
        mut rx: mpsc::Receiver<T>,
        wrap: impl Fn(T) -> UiMessage + Send + 'static,
    ) {
        let tx = self.tx.clone();
        let token = self.token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    update = rx.recv() => {
                        let Some(update) = update else { break };
                        match tx.try_send(wrap(update)) {
                            Ok(()) => {}
                            Err(mpsc::error::TrySendError::Full(_)) => {
                                tracing::warn!("ui message channel full; dropping message");
                            }
                            Err(mpsc::error::TrySendError::Closed(_)) => break,
                        }
                    }
                }
            }
        });
    }

    /// Stop all forwarding tasks. Safe to call more than once.
    pub fn stop(&self) {
        self.token.cancel();
    }
}
