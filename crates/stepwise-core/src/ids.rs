use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

/// Generates ids that are unique within one generator.
///
/// Ids are `<prefix>-<seq>` with a strictly increasing sequence, so two calls
/// never collide. The generator also carries a random session id used to
/// correlate log lines for one conversation.
#[derive(Debug)]
pub struct IdGenerator {
    session_id: Uuid,
    next: AtomicU64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            next: AtomicU64::new(1),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn next_id(&self, prefix: &str) -> String {
        let seq = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", prefix, seq)
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
