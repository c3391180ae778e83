//! In-process window host.
//!
//! Each opened "window" is a [`ViewerEndpoint`] handed to whoever plays the
//! viewer, typically a spawned task. Dropping the endpoint is how the window
//! closes; the bridge notices through its liveness checks.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use crate::message::{decode, encode, AppOrigin, WireMessage};
use crate::viewer::ViewerParams;
use crate::{BridgeError, ExternalWindow, MessageChannel, WindowHost};

pub struct LocalWindowHost {
    origin: AppOrigin,
    endpoints: UnboundedSender<ViewerEndpoint>,
    popups_blocked: bool,
}

impl LocalWindowHost {
    /// Returns the host and the stream of endpoints for windows it opens.
    pub fn new(origin: AppOrigin) -> (Self, UnboundedReceiver<ViewerEndpoint>) {
        let (endpoints, rx) = mpsc::unbounded_channel();
        (
            Self {
                origin,
                endpoints,
                popups_blocked: false,
            },
            rx,
        )
    }

    /// Makes every subsequent `open` fail as a blocked popup would.
    pub fn block_popups(&mut self, blocked: bool) {
        self.popups_blocked = blocked;
    }
}

impl WindowHost for LocalWindowHost {
    fn open(&mut self, url: &Url, name: &str) -> Result<Box<dyn ExternalWindow>, BridgeError> {
        if self.popups_blocked || self.endpoints.is_closed() {
            return Err(BridgeError::PopupBlocked {
                fallback: url.clone(),
            });
        }
        let params = ViewerParams::from_url(url)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let focus = Arc::new(AtomicUsize::new(0));
        let endpoint = ViewerEndpoint {
            origin: self.origin.clone(),
            name: name.to_string(),
            params,
            rx,
            focus: Arc::clone(&focus),
        };
        self.endpoints
            .send(endpoint)
            .map_err(|_| BridgeError::PopupBlocked {
                fallback: url.clone(),
            })?;
        debug!(name, %url, "opened local viewer window");
        Ok(Box::new(LocalWindow {
            channel: LocalChannel {
                origin: self.origin.clone(),
                tx,
            },
            focus,
        }))
    }
}

struct LocalChannel {
    origin: AppOrigin,
    tx: UnboundedSender<String>,
}

impl MessageChannel for LocalChannel {
    fn send(&self, message: &WireMessage) -> Result<(), BridgeError> {
        let raw = encode(&self.origin, message)?;
        self.tx.send(raw).map_err(|_| BridgeError::WindowClosed)
    }
}

struct LocalWindow {
    channel: LocalChannel,
    focus: Arc<AtomicUsize>,
}

impl ExternalWindow for LocalWindow {
    fn is_closed(&self) -> bool {
        self.channel.tx.is_closed()
    }

    fn focus(&self) -> Result<(), BridgeError> {
        if self.is_closed() {
            return Err(BridgeError::WindowClosed);
        }
        self.focus.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn channel(&self) -> &dyn MessageChannel {
        &self.channel
    }
}

/// The viewer side of a local window.
pub struct ViewerEndpoint {
    origin: AppOrigin,
    name: String,
    params: ViewerParams,
    rx: UnboundedReceiver<String>,
    focus: Arc<AtomicUsize>,
}

impl ViewerEndpoint {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parameters from the URL the window was opened with.
    pub fn params(&self) -> &ViewerParams {
        &self.params
    }

    pub fn focus_requests(&self) -> usize {
        self.focus.load(Ordering::Relaxed)
    }

    /// Next accepted message; messages from other origins are dropped.
    pub async fn recv(&mut self) -> Option<WireMessage> {
        loop {
            let raw = self.rx.recv().await?;
            if let Some(message) = self.accept(&raw) {
                return Some(message);
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<WireMessage> {
        loop {
            match self.rx.try_recv() {
                Ok(raw) => {
                    if let Some(message) = self.accept(&raw) {
                        return Some(message);
                    }
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return None,
            }
        }
    }

    /// Hands every accepted message to `handler` on a spawned task. Aborting
    /// the task closes the window.
    pub fn on_receive<F>(mut self, mut handler: F) -> JoinHandle<()>
    where
        F: FnMut(&ViewerParams, WireMessage) + Send + 'static,
    {
        tokio::spawn(async move {
            while let Some(message) = self.recv().await {
                handler(&self.params, message);
            }
        })
    }

    fn accept(&self, raw: &str) -> Option<WireMessage> {
        match decode(&self.origin, raw) {
            Ok(message) => Some(message),
            Err(err) => {
                warn!(%err, window = %self.name, "dropping cross-window message");
                None
            }
        }
    }
}
