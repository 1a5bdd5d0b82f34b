use crate::error::{AnthemError, Result};
use crate::types::{InputSlot, ZoneNumber};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

/// A message from the receiver that changed known state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateUpdate {
    /// A device-global attribute changed
    Device(String),

    /// An attribute of one zone changed
    Zone { zone: ZoneNumber, message: String },

    /// An input slot was named, or its per-input setting changed
    Input { slot: InputSlot, message: String },
}

/// What a [`StateUpdate`] is about, for receivers that only want some
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Device,
    Zone(ZoneNumber),
    Inputs,
}

impl StateUpdate {
    /// The raw message text that caused the update
    pub fn message(&self) -> &str {
        match self {
            StateUpdate::Device(message) => message,
            StateUpdate::Zone { message, .. } => message,
            StateUpdate::Input { message, .. } => message,
        }
    }

    /// The part of the device this update belongs to
    pub fn topic(&self) -> Topic {
        match self {
            StateUpdate::Device(_) => Topic::Device,
            StateUpdate::Zone { zone, .. } => Topic::Zone(*zone),
            StateUpdate::Input { .. } => Topic::Inputs,
        }
    }
}

/// Stream of state updates, optionally narrowed to one [`Topic`]
///
/// Updates outside the topic are skipped. Falling more than the channel's
/// capacity behind is reported once as [`AnthemError::ChannelError`], after
/// which the receiver resumes with the oldest update still buffered.
pub struct StateReceiver {
    updates: broadcast::Receiver<StateUpdate>,
    topic: Option<Topic>,
}

impl StateReceiver {
    pub(crate) fn new(updates: broadcast::Receiver<StateUpdate>, topic: Option<Topic>) -> Self {
        Self { updates, topic }
    }

    /// Topic this receiver is narrowed to, `None` for everything
    pub fn topic(&self) -> Option<Topic> {
        self.topic
    }

    fn wants(&self, update: &StateUpdate) -> bool {
        self.topic.map_or(true, |topic| update.topic() == topic)
    }

    /// Wait for the next matching update
    ///
    /// Fails with `ConnectionClosed` once the engine is dropped.
    pub async fn recv(&mut self) -> Result<StateUpdate> {
        loop {
            match self.updates.recv().await {
                Ok(update) if self.wants(&update) => return Ok(update),
                Ok(_) => {}
                Err(RecvError::Closed) => return Err(AnthemError::ConnectionClosed),
                Err(RecvError::Lagged(missed)) => return Err(lagged(missed)),
            }
        }
    }

    /// Next matching update if one is already buffered
    pub fn try_recv(&mut self) -> Result<Option<StateUpdate>> {
        loop {
            match self.updates.try_recv() {
                Ok(update) if self.wants(&update) => return Ok(Some(update)),
                Ok(_) => {}
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Closed) => return Err(AnthemError::ConnectionClosed),
                Err(TryRecvError::Lagged(missed)) => return Err(lagged(missed)),
            }
        }
    }
}

fn lagged(missed: u64) -> AnthemError {
    AnthemError::ChannelError(format!("Subscriber missed {} updates", missed))
}
