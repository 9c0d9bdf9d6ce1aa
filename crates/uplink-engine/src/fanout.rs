//! Best-effort replication of delivered messages to secondary destinations.
//!
//! # Design
//! - Destinations are isolated: a failure is logged with the destination
//!   label, counted, and never stops the remaining copies.
//! - The destination set is fixed when the job starts; only the per-log
//!   reply anchors move as copies land.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, warn};
use uplink_core::{
    CancelFlag, ChatRef, CopyRequest, DestinationDirectory, MessageRef, MessageTransport,
    SentMessage, TransportError, TransportResult,
};
use uplink_telemetry::{FanoutTarget, Metrics};

/// Log destination beyond the first, anchored under its job-start placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogDestination {
    /// Resolved chat.
    pub chat: ChatRef,
    /// Placeholder posted when the job started.
    pub placeholder: MessageRef,
}

/// Owner's private chat receiving a copy of every delivered file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BotPmTarget {
    /// Private chat with the owner.
    pub chat: ChatRef,
    /// Message the copies reply to, when the owner has a PM placeholder.
    pub anchor: Option<i64>,
}

/// Resolved replication targets of one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationSet {
    /// Message the first upload replies to.
    pub primary: MessageRef,
    /// Log destinations after the first one.
    pub secondary: Vec<LogDestination>,
    /// Bot PM target, when replication to the owner applies.
    pub bot_pm: Option<BotPmTarget>,
    /// Unresolved dump destination identifiers.
    pub dumps: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
struct SecondaryAnchor {
    chat: ChatRef,
    anchor: MessageRef,
    placeholder: bool,
}

/// Copies finalized messages into every replication target.
pub struct Replicator {
    transport: Arc<dyn MessageTransport>,
    directory: Arc<dyn DestinationDirectory>,
    bot_pm: Option<BotPmTarget>,
    secondary: Vec<SecondaryAnchor>,
    dumps: Vec<String>,
    resolved_dumps: HashMap<String, ChatRef>,
    has_buttons: bool,
    metrics: Metrics,
    cancel: CancelFlag,
}

impl Replicator {
    /// Build a replicator over `destinations`.
    #[must_use]
    pub fn new(
        transport: Arc<dyn MessageTransport>,
        directory: Arc<dyn DestinationDirectory>,
        destinations: &DestinationSet,
        has_buttons: bool,
        metrics: Metrics,
        cancel: CancelFlag,
    ) -> Self {
        let secondary = destinations
            .secondary
            .iter()
            .map(|log| SecondaryAnchor {
                chat: log.chat,
                anchor: log.placeholder,
                placeholder: true,
            })
            .collect();
        Self {
            transport,
            directory,
            bot_pm: destinations.bot_pm,
            secondary,
            dumps: destinations.dumps.clone(),
            resolved_dumps: HashMap::new(),
            has_buttons,
            metrics,
            cancel,
        }
    }

    /// Copy one finalized message everywhere; returns the number of copies made.
    pub async fn replicate(&mut self, message: &SentMessage) -> usize {
        let mut delivered = 0;
        let source = message.message_ref();

        if let Some(pm) = self.bot_pm {
            let copied = self.copy_one(pm.chat, source, pm.anchor).await;
            if self.settle(FanoutTarget::BotPm, "bot pm", copied, message).await {
                delivered += 1;
            }
        }

        for index in 0..self.secondary.len() {
            let target = self.secondary[index];
            let label = format!("log {}", target.chat.id);
            let copied = self.copy_one(target.chat, source, Some(target.anchor.id)).await;
            if let Some(copy) = self.finish_copy(FanoutTarget::Log, &label, copied, message).await
            {
                self.advance_anchor(index, copy.message_ref()).await;
                delivered += 1;
            }
        }

        for id in self.dumps.clone() {
            let Some(chat) = self.resolve_dump(&id).await else {
                continue;
            };
            let label = format!("dump {id}");
            let copied = self.copy_one(chat, source, None).await;
            if self.settle(FanoutTarget::Dump, &label, copied, message).await {
                delivered += 1;
            }
        }
        delivered
    }

    /// Copy a grouped post everywhere; `last` is any message of the group.
    pub async fn replicate_group(&mut self, last: &SentMessage) -> usize {
        let mut delivered = 0;
        let source = last.message_ref();

        if let Some(pm) = self.bot_pm {
            let copied = self
                .transport
                .copy_media_group(pm.chat, source, pm.anchor)
                .await;
            if self.record_group(FanoutTarget::BotPm, "bot pm", copied).is_some() {
                delivered += 1;
            }
        }

        for index in 0..self.secondary.len() {
            let target = self.secondary[index];
            let label = format!("log {}", target.chat.id);
            let copied = self
                .transport
                .copy_media_group(target.chat, source, Some(target.anchor.id))
                .await;
            if let Some(copies) = self.record_group(FanoutTarget::Log, &label, copied) {
                if let Some(newest) = copies.last() {
                    self.advance_anchor(index, newest.message_ref()).await;
                }
                delivered += 1;
            }
        }

        for id in self.dumps.clone() {
            let Some(chat) = self.resolve_dump(&id).await else {
                continue;
            };
            let label = format!("dump {id}");
            let copied = self.transport.copy_media_group(chat, source, None).await;
            if self.record_group(FanoutTarget::Dump, &label, copied).is_some() {
                delivered += 1;
            }
        }
        delivered
    }

    async fn copy_one(
        &self,
        to: ChatRef,
        from: MessageRef,
        reply_to: Option<i64>,
    ) -> TransportResult<SentMessage> {
        self.transport
            .copy_message(CopyRequest {
                to,
                from,
                reply_to,
                markup: None,
            })
            .await
    }

    async fn settle(
        &self,
        target: FanoutTarget,
        label: &str,
        copied: TransportResult<SentMessage>,
        original: &SentMessage,
    ) -> bool {
        self.finish_copy(target, label, copied, original)
            .await
            .is_some()
    }

    /// Attach markup to a successful copy, or log the failure.
    async fn finish_copy(
        &self,
        target: FanoutTarget,
        label: &str,
        copied: TransportResult<SentMessage>,
        original: &SentMessage,
    ) -> Option<SentMessage> {
        let copy = match copied {
            Ok(copy) => copy,
            Err(err) => {
                self.report_failure(target, label, &err);
                return None;
            }
        };
        if self.has_buttons
            && let Some(markup) = original.markup.clone()
        {
            match self
                .transport
                .edit_reply_markup(copy.message_ref(), markup)
                .await
            {
                Ok(_) | Err(TransportError::MessageNotModified) => {}
                Err(err) => warn!(destination = %label, error = %err, "markup not replicated"),
            }
        }
        debug!(destination = %label, message = copy.id, "message replicated");
        Some(copy)
    }

    fn record_group(
        &self,
        target: FanoutTarget,
        label: &str,
        copied: TransportResult<Vec<SentMessage>>,
    ) -> Option<Vec<SentMessage>> {
        match copied {
            Ok(copies) => {
                debug!(destination = %label, items = copies.len(), "group replicated");
                Some(copies)
            }
            Err(err) => {
                self.report_failure(target, label, &err);
                None
            }
        }
    }

    async fn advance_anchor(&mut self, index: usize, anchor: MessageRef) {
        let chat = self.secondary[index].chat;
        let previous = std::mem::replace(
            &mut self.secondary[index],
            SecondaryAnchor {
                chat,
                anchor,
                placeholder: false,
            },
        );
        if previous.placeholder
            && let Err(err) = self.transport.delete_message(previous.anchor).await
        {
            warn!(chat = previous.chat.id, error = %err, "placeholder not deleted");
        }
    }

    async fn resolve_dump(&mut self, id: &str) -> Option<ChatRef> {
        if let Some(chat) = self.resolved_dumps.get(id) {
            return Some(*chat);
        }
        match self.directory.resolve(id).await {
            Ok(chat) => {
                self.resolved_dumps.insert(id.to_string(), chat);
                Some(chat)
            }
            Err(err) => {
                if err.is_unreachable_destination() {
                    error!(destination = %id, error = %err, "dump destination unreachable");
                } else {
                    error!(destination = %id, error = %err, "dump destination not resolved");
                }
                self.metrics.inc_fanout_failure(FanoutTarget::Dump);
                None
            }
        }
    }

    fn report_failure(&self, target: FanoutTarget, label: &str, err: &TransportError) {
        self.metrics.inc_fanout_failure(target);
        if self.cancel.is_cancelled() {
            return;
        }
        if err.is_unreachable_destination() {
            error!(destination = %label, error = %err, "destination unreachable; skipped");
        } else {
            error!(destination = %label, error = %err, "failed to replicate message");
        }
    }
}
