//! Per-session behavioural baselines

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Reference profile of a user's normal spending behaviour.
///
/// Read-only while transactions are scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Baseline {
    pub avg_transaction_amount: f64,
    pub max_transaction_amount: f64,
    pub typical_categories: BTreeSet<String>,
    pub typical_merchants: BTreeSet<String>,
    /// Hours of day (0-23) the user is normally active
    pub typical_hours: BTreeSet<u32>,
    /// Transactions per day
    pub transaction_velocity: f64,
    pub location_history: BTreeSet<String>,
}

impl Default for Baseline {
    fn default() -> Self {
        fn set(items: &[&str]) -> BTreeSet<String> {
            items.iter().map(|s| s.to_string()).collect()
        }

        Self {
            avg_transaction_amount: 2500.0,
            max_transaction_amount: 25000.0,
            typical_categories: set(&["Food", "Transport", "Shopping", "Utilities"]),
            typical_merchants: set(&["Swiggy", "Uber", "Amazon", "Flipkart"]),
            typical_hours: (9..22).collect(),
            transaction_velocity: 3.0,
            location_history: set(&["Mumbai", "Pune", "Delhi"]),
        }
    }
}

/// Session-keyed baseline registry shared by every consumer loop.
///
/// Each session's baseline is created once on first access and the same
/// `Arc` is handed out for the rest of the process lifetime.
pub struct BaselineStore {
    baselines: RwLock<HashMap<String, Arc<Baseline>>>,
    template: Baseline,
}

impl BaselineStore {
    /// Create a store that seeds new sessions from `template`
    pub fn new(template: Baseline) -> Self {
        Self {
            baselines: RwLock::new(HashMap::new()),
            template,
        }
    }

    /// Look up the session's baseline, creating it from the template on first access
    pub fn get_or_create(&self, session_id: &str) -> Arc<Baseline> {
        if let Some(existing) = self.get(session_id) {
            return existing;
        }

        let mut baselines = self
            .baselines
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        baselines
            .entry(session_id.to_string())
            .or_insert_with(|| {
                debug!(session_id = %session_id, "Created default baseline");
                Arc::new(self.template.clone())
            })
            .clone()
    }

    /// Look up without creating
    pub fn get(&self, session_id: &str) -> Option<Arc<Baseline>> {
        self.baselines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .cloned()
    }

    /// The baseline a session without history would receive
    pub fn template(&self) -> &Baseline {
        &self.template
    }

    pub fn len(&self) -> usize {
        self.baselines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for BaselineStore {
    fn default() -> Self {
        Self::new(Baseline::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_baseline() {
        let baseline = Baseline::default();

        assert_eq!(baseline.avg_transaction_amount, 2500.0);
        assert!(baseline.typical_categories.contains("Food"));
        assert!(baseline.typical_hours.contains(&9));
        assert!(baseline.typical_hours.contains(&21));
        assert!(!baseline.typical_hours.contains(&22));
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let store = BaselineStore::default();

        let first = store.get_or_create("session-1");
        let second = store.get_or_create("session-1");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*first, *second);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_sessions_are_independent() {
        let store = BaselineStore::default();

        let a = store.get_or_create("a");
        let b = store.get_or_create("b");

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(store.len(), 2);
        assert!(store.get("c").is_none());
    }

    #[test]
    fn test_concurrent_first_access_yields_one_baseline() {
        let store = Arc::new(BaselineStore::default());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || store.get_or_create("shared"))
            })
            .collect();

        let baselines: Vec<Arc<Baseline>> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(baselines.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_custom_template() {
        let template = Baseline {
            max_transaction_amount: 100.0,
            ..Baseline::default()
        };
        let store = BaselineStore::new(template);

        assert_eq!(store.get_or_create("x").max_transaction_amount, 100.0);
    }
}
