use std::collections::HashMap;

use crate::text::TextElement;

/// Collects the text elements of a tile while it is built. Point labels with the same text,
/// technique and feature id are merged into one element with several positions, e.g. the
/// parts of a multi point feature.
#[derive(Default)]
pub struct TextElementsBatch {
    elements: Vec<TextElement>,
    merge_targets: HashMap<(String, usize, u64), usize>,
}

impl TextElementsBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `element`, returns `true` if it was merged into an existing element.
    pub fn add(&mut self, element: TextElement) -> bool {
        let key = match (element.feature_id, &element.path) {
            (Some(feature_id), None) => {
                (element.text.clone(), element.technique_index, feature_id)
            }
            _ => {
                self.elements.push(element);
                return false;
            }
        };

        if let Some(&index) = self.merge_targets.get(&key) {
            self.elements[index].positions.extend(element.positions);
            true
        } else {
            self.merge_targets.insert(key, self.elements.len());
            self.elements.push(element);
            false
        }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn finish(self) -> Vec<TextElement> {
        self.elements
    }
}
