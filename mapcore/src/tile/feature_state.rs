//! Per feature state, read by `feature-state` style expressions.

use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;

use crate::style::AttributeMap;

/// The state of features keyed by feature id.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FeatureStateMap {
    states: HashMap<u64, AttributeMap>,
}

impl FeatureStateMap {
    pub fn get(&self, id: u64) -> Option<&AttributeMap> {
        self.states.get(&id)
    }

    /// Replaces the state of feature `id`.
    pub fn set(&mut self, id: u64, state: AttributeMap) {
        self.states.insert(id, state);
    }

    pub fn remove(&mut self, id: u64) -> Option<AttributeMap> {
        self.states.remove(&id)
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// Feature state shared between a data source and its tiles.
pub type SharedFeatureState = Arc<RwLock<FeatureStateMap>>;

#[cfg(test)]
mod tests {
    use crate::{
        style::{AttributeMap, Value},
        tile::feature_state::FeatureStateMap,
    };

    #[test]
    fn set_get_remove() {
        let mut map = FeatureStateMap::default();
        let mut state = AttributeMap::new();
        state.insert("selected".to_owned(), Value::Bool(true));

        map.set(4, state.clone());
        assert_eq!(map.get(4), Some(&state));
        assert_eq!(map.get(5), None);
        assert_eq!(map.remove(4), Some(state));
        assert!(map.is_empty());
    }
}
