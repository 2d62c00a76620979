use std::cmp::Ordering;

use cgmath::{BaseNum, Point2, Vector3};

pub(crate) fn min<S: PartialOrd + Copy>(lhs: S, rhs: S) -> S {
    match lhs.partial_cmp(&rhs) {
        Some(Ordering::Less) | Some(Ordering::Equal) | None => lhs,
        _ => rhs,
    }
}

pub(crate) fn max<S: PartialOrd + Copy>(lhs: S, rhs: S) -> S {
    match lhs.partial_cmp(&rhs) {
        Some(Ordering::Greater) | Some(Ordering::Equal) | None => lhs,
        _ => rhs,
    }
}

/// A two-dimensional axis aligned bounding box.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct Aabb2<S> {
    /// Minimum point of the AABB
    pub min: Point2<S>,
    /// Maximum point of the AABB
    pub max: Point2<S>,
}

impl<S: BaseNum> Aabb2<S> {
    /// Construct a new axis-aligned bounding box from two points.
    #[inline]
    pub fn new(p1: Point2<S>, p2: Point2<S>) -> Aabb2<S> {
        Aabb2 {
            min: Point2::new(min(p1.x, p2.x), min(p1.y, p2.y)),
            max: Point2::new(max(p1.x, p2.x), max(p1.y, p2.y)),
        }
    }

    /// Smallest box containing all `points`. `None` for an empty iterator.
    pub fn from_points<I: IntoIterator<Item = Point2<S>>>(points: I) -> Option<Aabb2<S>> {
        let mut points = points.into_iter();
        let first = points.next()?;
        Some(points.fold(Aabb2::new(first, first), |aabb, point| aabb.grow(point)))
    }

    #[inline]
    pub fn grow(self, p: Point2<S>) -> Aabb2<S> {
        Aabb2 {
            min: Point2::new(min(self.min.x, p.x), min(self.min.y, p.y)),
            max: Point2::new(max(self.max.x, p.x), max(self.max.y, p.y)),
        }
    }

    pub fn width(&self) -> S {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> S {
        self.max.y - self.min.y
    }

    pub fn contains(&self, p: &Point2<S>) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }
}

impl Aabb2<f64> {
    pub fn center(&self) -> Point2<f64> {
        Point2::new(
            (self.min.x + self.max.x) / 2.0,
            (self.min.y + self.max.y) / 2.0,
        )
    }

    pub fn diagonal(&self) -> f64 {
        self.width().hypot(self.height())
    }
}

/// A three-dimensional axis aligned bounding box in world space.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct Aabb3 {
    pub min: Vector3<f64>,
    pub max: Vector3<f64>,
}

impl Aabb3 {
    pub fn empty() -> Self {
        Self {
            min: Vector3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            max: Vector3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn expand(&mut self, p: Vector3<f64>) {
        self.min = Vector3::new(self.min.x.min(p.x), self.min.y.min(p.y), self.min.z.min(p.z));
        self.max = Vector3::new(self.max.x.max(p.x), self.max.y.max(p.y), self.max.z.max(p.z));
    }

    pub fn union(&mut self, other: &Aabb3) {
        if !other.is_empty() {
            self.expand(other.min);
            self.expand(other.max);
        }
    }

    pub fn center(&self) -> Vector3<f64> {
        (self.min + self.max) / 2.0
    }
}

/// Signed area of a ring given as interleaved `x, y` pairs. The sign encodes the winding.
pub fn signed_ring_area(ring: &[[f64; 2]]) -> f64 {
    let n = ring.len();
    if n < 3 {
        return 0.0;
    }
    let mut area = 0.0;
    for i in 0..n {
        let [x0, y0] = ring[i];
        let [x1, y1] = ring[(i + 1) % n];
        area += x0 * y1 - x1 * y0;
    }
    area / 2.0
}
