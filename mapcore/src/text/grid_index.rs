//! A uniform grid over the screen for fast box collision queries.

use std::collections::HashSet;

use cgmath::Point2;

use crate::util::math::Aabb2;

pub struct GridIndex<T: Clone> {
    width: f64,
    height: f64,
    x_cell_count: usize,
    y_cell_count: usize,
    x_scale: f64,
    y_scale: f64,
    elements: Vec<(T, Aabb2<f64>)>,
    cells: Vec<Vec<u32>>,
}

impl<T: Clone> GridIndex<T> {
    /// Creates an index over a `width` x `height` area. An empty area has no cells and nothing
    /// inserted into it is ever hit.
    pub fn new(width: f64, height: f64, cell_size: u32) -> Self {
        let (width, height) = if width > 0.0 && height > 0.0 {
            (width, height)
        } else {
            (0.0, 0.0)
        };
        let cell_size = cell_size.max(1) as f64;
        let x_cell_count = (width / cell_size).ceil() as usize;
        let y_cell_count = (height / cell_size).ceil() as usize;
        let scale = |count: usize, extent: f64| {
            if extent > 0.0 {
                count as f64 / extent
            } else {
                0.0
            }
        };

        Self {
            width,
            height,
            x_cell_count,
            y_cell_count,
            x_scale: scale(x_cell_count, width),
            y_scale: scale(y_cell_count, height),
            elements: vec![],
            cells: vec![vec![]; x_cell_count * y_cell_count],
        }
    }

    pub fn insert(&mut self, t: T, bbox: Aabb2<f64>) {
        let uid = self.elements.len() as u32;

        if !self.no_intersection(&bbox) {
            let (cx1, cy1) = self.cell_coord(bbox.min);
            let (cx2, cy2) = self.cell_coord(bbox.max);
            for x in cx1..=cx2 {
                for y in cy1..=cy2 {
                    self.cells[self.x_cell_count * y + x].push(uid);
                }
            }
        }

        self.elements.push((t, bbox));
    }

    pub fn query(&self, query_box: &Aabb2<f64>) -> Vec<T> {
        let mut result = Vec::new();
        self.query_internal(query_box, |t| {
            result.push(t.clone());
            false
        });
        result
    }

    /// True if any element collides with `query_box`.
    pub fn hit_test(&self, query_box: &Aabb2<f64>) -> bool {
        let mut hit = false;
        self.query_internal(query_box, |_| {
            hit = true;
            true
        });
        hit
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn clear(&mut self) {
        self.elements.clear();
        self.cells.iter_mut().for_each(Vec::clear);
    }

    fn no_intersection(&self, query_box: &Aabb2<f64>) -> bool {
        self.cells.is_empty()
            || query_box.max.x < 0.0
            || query_box.min.x >= self.width
            || query_box.max.y < 0.0
            || query_box.min.y >= self.height
    }

    /// Calls `result_fn` for every colliding element until it returns `true`.
    fn query_internal<F>(&self, query_box: &Aabb2<f64>, mut result_fn: F)
    where
        F: FnMut(&T) -> bool,
    {
        if self.no_intersection(query_box) {
            return;
        }

        let mut seen = HashSet::new();
        let (cx1, cy1) = self.cell_coord(query_box.min);
        let (cx2, cy2) = self.cell_coord(query_box.max);
        for x in cx1..=cx2 {
            for y in cy1..=cy2 {
                for uid in &self.cells[self.x_cell_count * y + x] {
                    if !seen.insert(*uid) {
                        continue;
                    }
                    let (t, bbox) = &self.elements[*uid as usize];
                    if boxes_collide(query_box, bbox) && result_fn(t) {
                        return;
                    }
                }
            }
        }
    }

    fn cell_coord(&self, p: Point2<f64>) -> (usize, usize) {
        let x = (p.x * self.x_scale)
            .floor()
            .clamp(0.0, (self.x_cell_count - 1) as f64);
        let y = (p.y * self.y_scale)
            .floor()
            .clamp(0.0, (self.y_cell_count - 1) as f64);
        (x as usize, y as usize)
    }
}

fn boxes_collide(first: &Aabb2<f64>, second: &Aabb2<f64>) -> bool {
    first.min.x <= second.max.x
        && first.min.y <= second.max.y
        && first.max.x >= second.min.x
        && first.max.y >= second.min.y
}

#[cfg(test)]
mod tests {
    use cgmath::Point2;

    use crate::{text::grid_index::GridIndex, util::math::Aabb2};

    fn bbox(x1: f64, y1: f64, x2: f64, y2: f64) -> Aabb2<f64> {
        Aabb2::new(Point2::new(x1, y1), Point2::new(x2, y2))
    }

    #[test]
    fn indexes_boxes() {
        let mut grid = GridIndex::<i16>::new(100.0, 100.0, 10);
        grid.insert(0, bbox(4.0, 10.0, 6.0, 30.0));
        grid.insert(1, bbox(4.0, 10.0, 30.0, 12.0));
        grid.insert(2, bbox(-10.0, 30.0, 5.0, 35.0));

        assert_eq!(grid.query(&bbox(4.0, 10.0, 5.0, 11.0)), vec![0, 1]);
        assert_eq!(grid.query(&bbox(24.0, 12.0, 25.0, 13.0)), vec![1]);
        assert_eq!(grid.query(&bbox(40.0, 40.0, 100.0, 100.0)), Vec::<i16>::new());
        assert_eq!(grid.query(&bbox(-6.0, 0.0, 3.0, 100.0)), vec![2]);
        assert!(grid.hit_test(&bbox(0.0, 31.0, 1.0, 32.0)));
        assert!(!grid.hit_test(&bbox(-20.0, -20.0, -10.0, -10.0)));
    }

    #[test]
    fn clear_removes_all_elements() {
        let mut grid = GridIndex::<u32>::new(50.0, 50.0, 25);
        grid.insert(0, bbox(0.0, 0.0, 10.0, 10.0));
        assert!(!grid.is_empty());
        grid.clear();
        assert!(grid.is_empty());
        assert!(!grid.hit_test(&bbox(0.0, 0.0, 10.0, 10.0)));
    }

    #[test]
    fn empty_area_never_collides() {
        let mut grid = GridIndex::<u32>::new(0.0, 600.0, 32);
        grid.insert(0, bbox(-10.0, -10.0, 10.0, 10.0));
        assert!(!grid.hit_test(&bbox(-5.0, -5.0, 5.0, 5.0)));
        assert!(grid.query(&bbox(-5.0, -5.0, 5.0, 5.0)).is_empty());
    }
}
