use log::{info, warn};

/// Notes kept per pipeline; older ones are dropped first.
pub const MAX_NOTES: usize = 256;

/// Keeps the notes a pipeline emits so callers can inspect them, and forwards
/// each one to the `log` facade.
#[derive(Debug, Clone, Default)]
pub struct LogManager {
    notes: Vec<String>,
}

impl LogManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, message: &str) {
        info!("{}", message);
        self.push(message);
    }

    pub fn warn(&mut self, message: &str) {
        warn!("{}", message);
        self.push(message);
    }

    fn push(&mut self, message: &str) {
        if self.notes.len() == MAX_NOTES {
            self.notes.remove(0);
        }
        self.notes.push(message.to_string());
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    pub fn clear(&mut self) {
        self.notes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notes_accumulate_until_cleared() {
        let mut log = LogManager::new();
        log.record("loaded");
        log.warn("truncated");
        assert_eq!(log.notes(), ["loaded", "truncated"]);
        log.clear();
        assert!(log.notes().is_empty());
    }

    #[test]
    fn oldest_notes_are_dropped_past_the_cap() {
        let mut log = LogManager::new();
        for idx in 0..MAX_NOTES + 10 {
            log.record(&format!("note {idx}"));
        }
        assert_eq!(log.notes().len(), MAX_NOTES);
        assert_eq!(log.notes()[0], "note 10");
        assert_eq!(log.notes()[MAX_NOTES - 1], format!("note {}", MAX_NOTES + 9));
    }
}
