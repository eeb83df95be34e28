/// A message the user has to acknowledge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub id: u64,
    pub message: String,
}

/// Blocking alerts waiting for acknowledgement, oldest first, with
/// monotonic id assignment.
#[derive(Debug, Clone, Default)]
pub struct AlertQueue {
    alerts: Vec<Alert>,
    next_id: u64,
}

impl AlertQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an alert and returns its id.
    pub fn push(&mut self, message: impl Into<String>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.alerts.push(Alert {
            id,
            message: message.into(),
        });
        id
    }

    /// The alert that should be shown now.
    pub fn current(&self) -> Option<&Alert> {
        self.alerts.first()
    }

    /// Acknowledges the current alert and returns it.
    pub fn acknowledge(&mut self) -> Option<Alert> {
        if self.alerts.is_empty() {
            None
        } else {
            Some(self.alerts.remove(0))
        }
    }

    /// Removes an alert by ID. Returns `true` if found and removed.
    pub fn remove(&mut self, id: u64) -> bool {
        let len_before = self.alerts.len();
        self.alerts.retain(|a| a.id != id);
        self.alerts.len() != len_before
    }

    pub fn iter(&self) -> impl Iterator<Item = &Alert> {
        self.alerts.iter()
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    pub fn clear(&mut self) {
        self.alerts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic_and_order_kept() {
        let mut q = AlertQueue::new();
        assert_eq!(q.push("first"), 0);
        assert_eq!(q.push("second"), 1);

        let messages: Vec<&str> = q.iter().map(|a| a.message.as_str()).collect();
        assert_eq!(messages, vec!["first", "second"]);
    }

    #[test]
    fn acknowledge_pops_oldest() {
        let mut q = AlertQueue::new();
        q.push("Name taken");
        q.push("Upload failed");

        assert_eq!(q.current().unwrap().message, "Name taken");
        assert_eq!(q.acknowledge().unwrap().message, "Name taken");
        assert_eq!(q.current().unwrap().message, "Upload failed");
        q.acknowledge();
        assert!(q.acknowledge().is_none());
        assert!(q.is_empty());
    }

    #[test]
    fn ids_not_reused_after_clear() {
        let mut q = AlertQueue::new();
        q.push("a");
        q.clear();
        assert_eq!(q.push("b"), 1);
    }

    #[test]
    fn remove_by_id() {
        let mut q = AlertQueue::new();
        let keep = q.push("keep");
        let drop = q.push("drop");

        assert!(q.remove(drop));
        assert!(!q.remove(drop));
        assert_eq!(q.len(), 1);
        assert_eq!(q.current().unwrap().id, keep);
    }
}
