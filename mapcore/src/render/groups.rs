//! Draw groups of geometry whose technique depends on the feature state.

use crate::{
    style::{Env, Technique},
    tessellation::{Geometry, Group},
    tile::feature_state::FeatureStateMap,
};

/// Rebuilds the draw groups of `geometry`, keeping the index ranges of features for which
/// `technique` is enabled in their current state. Adjacent enabled ranges are merged into one
/// group.
///
/// Returns `None` if the geometry has no per feature ranges, i.e. it is drawn as a whole.
pub fn regenerate_groups(
    geometry: &Geometry,
    technique: &Technique,
    env: &Env,
    states: &FeatureStateMap,
) -> Option<Vec<Group>> {
    let ranges = geometry.feature_ranges()?;
    let render_order_offset = geometry
        .groups
        .first()
        .map_or(0, |group| group.render_order_offset);

    let mut env = env.clone();
    let mut groups: Vec<Group> = Vec::new();
    for (id, start, end) in ranges {
        if start == end {
            continue;
        }
        env.set_state(states.get(id).cloned());
        if !technique.enabled(&env) {
            continue;
        }
        match groups.last_mut() {
            Some(last) if last.end() == start => last.count += end - start,
            _ => groups.push(Group {
                start,
                count: end - start,
                technique_index: technique.index,
                render_order_offset,
            }),
        }
    }
    Some(groups)
}
