//! In-process platform.
//!
//! Inbound events are injected through methods instead of arriving from a
//! gateway, and everything the workflow sends out is recorded and broadcast.
//! Backs the console binary and the integration tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::{broadcast, watch};
use tracing::debug;

use super::{ControlPress, Form, FormSubmission, InboundEvent, MessageView, Platform, PostedMessage};
use crate::error::{Error, Result};
use crate::model::{ChannelId, MessageId, User, UserId};

const CHANNEL_CAPACITY: usize = 256;

/// Something the workflow asked the platform to do.
#[derive(Debug, Clone)]
pub enum Outbound {
    FormShown {
        user: UserId,
        form: Form,
    },
    MessageSent {
        id: MessageId,
        channel: ChannelId,
        view: MessageView,
    },
    MessageEdited {
        id: MessageId,
        view: MessageView,
    },
    MessageDeleted {
        id: MessageId,
    },
    Notice {
        user: UserId,
        channel: ChannelId,
        text: String,
    },
}

pub struct LocalPlatform {
    self_id: String,
    ready: watch::Sender<bool>,
    inbound: broadcast::Sender<InboundEvent>,
    outbound: broadcast::Sender<Outbound>,
    messages: Mutex<HashMap<MessageId, (ChannelId, MessageView)>>,
    history: Mutex<Vec<Outbound>>,
    next_message: AtomicU64,
}

impl LocalPlatform {
    /// A platform that is ready immediately.
    pub fn new(self_id: impl Into<String>) -> Self {
        let platform = Self::pending(self_id);
        platform.mark_ready();
        platform
    }

    /// A platform that holds `ready()` until [`mark_ready`](Self::mark_ready).
    pub fn pending(self_id: impl Into<String>) -> Self {
        let (ready, _) = watch::channel(false);
        let (inbound, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (outbound, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            self_id: self_id.into(),
            ready,
            inbound,
            outbound,
            messages: Mutex::new(HashMap::new()),
            history: Mutex::new(Vec::new()),
            next_message: AtomicU64::new(1),
        }
    }

    pub fn mark_ready(&self) {
        self.ready.send_replace(true);
    }

    /// Receiver of everything sent out from this point on.
    pub fn outbound(&self) -> broadcast::Receiver<Outbound> {
        self.outbound.subscribe()
    }

    pub fn history(&self) -> Vec<Outbound> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Current view of a live message.
    pub fn message(&self, id: &MessageId) -> Option<MessageView> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .map(|(_, view)| view.clone())
    }

    pub fn submit_form(&self, user: User, form_id: impl Into<String>, values: HashMap<String, String>) {
        self.inject(InboundEvent::FormSubmitted(FormSubmission {
            user,
            form_id: form_id.into(),
            values,
        }));
    }

    pub fn press(&self, user: User, channel: ChannelId, control_id: impl Into<String>) {
        self.inject(InboundEvent::ControlPressed(ControlPress {
            user,
            channel,
            control_id: control_id.into(),
        }));
    }

    /// Post a user message, optionally as a reply. Returns its id.
    pub fn post_message(
        &self,
        author: UserId,
        channel: ChannelId,
        reply_to: Option<MessageId>,
        attachments: Vec<String>,
    ) -> MessageId {
        let id = self.allocate_id();
        self.inject(InboundEvent::MessagePosted(PostedMessage {
            id: id.clone(),
            author,
            channel,
            reply_to,
            attachments,
        }));
        id
    }

    fn inject(&self, event: InboundEvent) {
        // No receivers just means nobody is waiting for this event.
        let _ = self.inbound.send(event);
    }

    fn record(&self, out: Outbound) {
        debug!(?out, "outbound");
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(out.clone());
        let _ = self.outbound.send(out);
    }

    fn allocate_id(&self) -> MessageId {
        MessageId(format!(
            "m{}",
            self.next_message.fetch_add(1, Ordering::Relaxed)
        ))
    }
}

#[async_trait]
impl Platform for LocalPlatform {
    fn self_id(&self) -> &str {
        &self.self_id
    }

    async fn ready(&self) {
        let mut rx = self.ready.subscribe();
        // The sender lives as long as self, so this only returns once ready.
        let _ = rx.wait_for(|ready| *ready).await;
    }

    fn events(&self) -> broadcast::Receiver<InboundEvent> {
        self.inbound.subscribe()
    }

    async fn show_form(&self, user: &UserId, form: Form) -> Result<()> {
        self.record(Outbound::FormShown {
            user: user.clone(),
            form,
        });
        Ok(())
    }

    async fn send_message(&self, channel: &ChannelId, view: MessageView) -> Result<MessageId> {
        let id = self.allocate_id();
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), (channel.clone(), view.clone()));
        self.record(Outbound::MessageSent {
            id: id.clone(),
            channel: channel.clone(),
            view,
        });
        Ok(id)
    }

    async fn edit_message(&self, message: &MessageId, view: MessageView) -> Result<()> {
        {
            let mut messages = self.messages.lock().unwrap_or_else(PoisonError::into_inner);
            let slot = messages
                .get_mut(message)
                .ok_or_else(|| Error::Platform(format!("unknown message {message}")))?;
            slot.1 = view.clone();
        }
        self.record(Outbound::MessageEdited {
            id: message.clone(),
            view,
        });
        Ok(())
    }

    async fn delete_message(&self, message: &MessageId) -> Result<()> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(message);
        self.record(Outbound::MessageDeleted {
            id: message.clone(),
        });
        Ok(())
    }

    async fn notify(&self, user: &UserId, channel: &ChannelId, text: &str) -> Result<()> {
        self.record(Outbound::Notice {
            user: user.clone(),
            channel: channel.clone(),
            text: text.to_string(),
        });
        Ok(())
    }
}
