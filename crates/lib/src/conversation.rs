//! Conversation log: insertion-ordered, append-only store of normalized messages.
//!
//! Entries are never mutated; they are only filtered for display or removed by an explicit
//! clear. Control frames (heartbeats) are hidden from [`ConversationLog::visible`] and swept
//! automatically once more than `sweep_threshold` of them accumulate.

use crate::message::NormalizedMessage;
use tokio::sync::watch;

/// Default number of control entries tolerated before an implicit sweep.
pub const DEFAULT_CONTROL_SWEEP_THRESHOLD: usize = 3;

/// What a clear removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearScope {
    All,
    ControlOnly,
}

/// The session's message history. Owned by a single consumer (a view or the CLI loop);
/// observers follow changes through [`ConversationLog::subscribe`].
#[derive(Debug)]
pub struct ConversationLog {
    entries: Vec<NormalizedMessage>,
    control_count: usize,
    sweep_threshold: usize,
    revision: watch::Sender<u64>,
}

impl Default for ConversationLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::with_sweep_threshold(DEFAULT_CONTROL_SWEEP_THRESHOLD)
    }

    pub fn with_sweep_threshold(sweep_threshold: usize) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            entries: Vec::new(),
            control_count: 0,
            sweep_threshold,
            revision,
        }
    }

    /// Append a message to the end of the log and notify subscribers.
    pub fn append(&mut self, message: NormalizedMessage) {
        if message.is_control() {
            self.control_count += 1;
        }
        self.entries.push(message);
        if self.control_count > self.sweep_threshold {
            log::debug!(
                "sweeping {} control entries from conversation log",
                self.control_count
            );
            self.remove_control();
        }
        self.bump();
    }

    /// Remove every entry.
    pub fn clear_all(&mut self) {
        self.entries.clear();
        self.control_count = 0;
        self.bump();
    }

    /// Remove control entries only, preserving the relative order of the rest.
    pub fn clear_control_only(&mut self) {
        self.remove_control();
        self.bump();
    }

    pub fn clear(&mut self, scope: ClearScope) {
        match scope {
            ClearScope::All => self.clear_all(),
            ClearScope::ControlOnly => self.clear_control_only(),
        }
    }

    /// Entries for display: everything except control frames. The iterator is lazy and can be
    /// cloned to restart from the current position.
    pub fn visible(&self) -> impl Iterator<Item = &NormalizedMessage> + Clone + '_ {
        self.entries.iter().filter(|m| !m.is_control())
    }

    /// Every entry, control frames included.
    pub fn entries(&self) -> &[NormalizedMessage] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of control entries currently held (not displayed).
    pub fn control_count(&self) -> usize {
        self.control_count
    }

    /// Monotonic change counter; bumps on every append or clear.
    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    /// Receiver that observes [`revision`](Self::revision) changes.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    fn remove_control(&mut self) {
        self.entries.retain(|m| !m.is_control());
        self.control_count = 0;
    }

    fn bump(&self) {
        self.revision.send_modify(|r| *r += 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MessageBody, MessageKind, Role};

    fn text(s: &str) -> NormalizedMessage {
        NormalizedMessage::new("Planner", Role::Agent, MessageBody::Text(s.into()), "10:00:00")
    }

    fn heartbeat() -> NormalizedMessage {
        NormalizedMessage::new("Agent", Role::Agent, MessageBody::Control("heartbeat".into()), "10:00:00")
    }

    fn texts<'a>(it: impl Iterator<Item = &'a NormalizedMessage>) -> Vec<&'a str> {
        it.filter_map(|m| m.text()).collect()
    }

    #[test]
    fn visible_hides_control_and_restarts() {
        let mut log = ConversationLog::new();
        log.append(text("a"));
        log.append(heartbeat());
        log.append(text("b"));
        let visible = log.visible();
        assert_eq!(texts(visible.clone()), vec!["a", "b"]);
        assert_eq!(texts(visible), vec!["a", "b"]);
        assert_eq!(log.len(), 3);
        assert_eq!(log.control_count(), 1);
    }

    #[test]
    fn visible_yields_csv_tables_whole() {
        let raw = "Product,Price,Stock,Rating\nA,10,5,4.5\nB,12,\"1,200\",4.1";
        let table = crate::classify::csv::parse_table(raw).unwrap();
        let mut log = ConversationLog::new();
        log.append(text("before"));
        log.append(heartbeat());
        log.append(NormalizedMessage::new("Analyst", Role::Agent, MessageBody::Csv(table), "10:00:01"));

        let visible: Vec<_> = log.visible().collect();
        assert_eq!(visible.len(), 2);
        assert_eq!(visible[1].kind(), MessageKind::Csv);
        let MessageBody::Csv(table) = &visible[1].body else {
            panic!("expected a csv body");
        };
        assert_eq!(table.header, vec!["Product", "Price", "Stock", "Rating"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1], vec!["B", "12", "1,200", "4.1"]);
        assert_eq!(table.raw, raw);
    }

    #[test]
    fn clear_control_only_preserves_order() {
        let mut log = ConversationLog::with_sweep_threshold(10);
        for (i, s) in ["a", "b", "c", "d"].iter().enumerate() {
            log.append(text(s));
            if i % 2 == 0 {
                log.append(heartbeat());
            }
        }
        log.clear_control_only();
        assert_eq!(texts(log.entries().iter()), vec!["a", "b", "c", "d"]);
        assert!(log.entries().iter().all(|m| m.kind() != MessageKind::Control));
    }

    #[test]
    fn sweep_runs_when_threshold_exceeded() {
        let mut log = ConversationLog::new();
        log.append(text("a"));
        for _ in 0..3 {
            log.append(heartbeat());
        }
        assert_eq!(log.control_count(), 3);
        assert_eq!(log.len(), 4);
        log.append(heartbeat());
        assert_eq!(log.control_count(), 0);
        assert_eq!(log.len(), 1);
        assert_eq!(texts(log.visible()), vec!["a"]);
    }

    #[test]
    fn clear_all_empties() {
        let mut log = ConversationLog::new();
        log.append(text("a"));
        log.append(heartbeat());
        log.clear(ClearScope::All);
        assert!(log.is_empty());
        assert_eq!(log.control_count(), 0);
    }

    #[test]
    fn revision_notifies_subscribers() {
        let mut log = ConversationLog::new();
        let mut rx = log.subscribe();
        assert_eq!(log.revision(), 0);
        log.append(text("a"));
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), 1);
        log.clear_all();
        assert_eq!(log.revision(), 2);
    }
}
