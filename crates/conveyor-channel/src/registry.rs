// SPDX-FileCopyrightText: 2026 Conveyor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel registry: the process-wide map from channel-type string to
//! channel implementation.

use std::collections::HashMap;
use std::sync::Arc;

use conveyor_core::{Channel, ConveyorError};
use tracing::info;

/// Registry of ingress channels, keyed by channel type.
///
/// Built once at startup and shared read-only afterwards. The duplex channel
/// is always registered; platform webhook channels are optional extensions.
#[derive(Default)]
pub struct ChannelRegistry {
    channels: HashMap<String, Arc<dyn Channel>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel under its declared type. Later registrations of
    /// the same type replace earlier ones.
    pub fn register(&mut self, channel: Arc<dyn Channel>) {
        let channel_type = channel.channel_type().to_string();
        info!(channel_type, "channel registered");
        self.channels.insert(channel_type, channel);
    }

    pub fn get(&self, channel_type: &str) -> Option<Arc<dyn Channel>> {
        self.channels.get(channel_type).cloned()
    }

    /// Like [`get`](Self::get), but maps a miss to [`ConveyorError::UnknownChannel`].
    pub fn require(&self, channel_type: &str) -> Result<Arc<dyn Channel>, ConveyorError> {
        self.get(channel_type)
            .ok_or_else(|| ConveyorError::UnknownChannel(channel_type.to_string()))
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duplex::DuplexChannel;

    #[test]
    fn register_and_lookup() {
        let mut registry = ChannelRegistry::new();
        assert!(registry.is_empty());

        registry.register(Arc::new(DuplexChannel::new()));
        assert_eq!(registry.len(), 1);
        assert!(registry.get("duplex").is_some());
        assert!(registry.get("slack").is_none());
    }

    #[test]
    fn require_names_the_missing_channel() {
        let registry = ChannelRegistry::new();
        let err = match registry.require("forge") {
            Err(err) => err,
            Ok(_) => panic!("expected an error"),
        };
        assert!(err.to_string().contains("forge"));
    }
}
