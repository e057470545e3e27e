//! Routing table: source table -> channels

use std::collections::HashMap;
use std::sync::Arc;

use contracts::Channel;

/// Strip the default `public.` schema so both spellings route identically
pub fn normalize_table_name(table: &str) -> &str {
    table.strip_prefix("public.").unwrap_or(table)
}

/// Immutable routing table built once at startup
///
/// Channels for a table keep their configuration order.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    routes: HashMap<String, Vec<Arc<Channel>>>,
    channel_count: usize,
}

impl RoutingTable {
    pub fn from_channels(channels: &[Channel]) -> Self {
        let mut routes: HashMap<String, Vec<Arc<Channel>>> = HashMap::new();
        for channel in channels {
            routes
                .entry(normalize_table_name(&channel.table).to_string())
                .or_default()
                .push(Arc::new(channel.clone()));
        }
        Self {
            routes,
            channel_count: channels.len(),
        }
    }

    /// Channels bound to `table`, empty when none match
    pub fn channels_for(&self, table: &str) -> &[Arc<Channel>] {
        self.routes
            .get(normalize_table_name(table))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Routed tables, sorted
    pub fn tables(&self) -> Vec<&str> {
        let mut tables: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        tables.sort_unstable();
        tables
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    pub fn is_empty(&self) -> bool {
        self.channel_count == 0
    }
}
