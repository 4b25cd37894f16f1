use crate::geo::{BoundingBox, GeoCoordinate};
use std::collections::HashSet;
use std::sync::Arc;

/// Subdivision stops here; deeper inserts stay in the node past capacity
pub const MAX_DEPTH: u32 = 20;

/// Reference identity used to match items on erase and dedup on query.
pub trait Identity {
    fn identity(&self) -> usize;
}

impl<U: ?Sized> Identity for Arc<U> {
    #[inline]
    fn identity(&self) -> usize {
        Arc::as_ptr(self) as *const () as usize
    }
}

macro_rules! value_identity {
    ($($t:ty),*) => {
        $(impl Identity for $t {
            #[inline]
            fn identity(&self) -> usize {
                *self as usize
            }
        })*
    };
}

value_identity!(usize, u32, u64);

struct Node<T> {
    boundary: BoundingBox,
    depth: u32,
    items: Vec<(GeoCoordinate, T)>,
    /// NE, NW, SE, SW once subdivided
    children: Option<Box<[Node<T>; 4]>>,
}

impl<T: Identity + Clone> Node<T> {
    fn new(boundary: BoundingBox, depth: u32) -> Self {
        Self {
            boundary,
            depth,
            items: Vec::new(),
            children: None,
        }
    }

    fn insert(&mut self, capacity: usize, coord: GeoCoordinate, item: T) -> Result<(), T> {
        if !self.boundary.contains(&coord) {
            return Err(item);
        }

        if self.items.len() < capacity || self.depth >= MAX_DEPTH {
            self.items.push((coord, item));
            return Ok(());
        }

        let depth = self.depth;
        let boundary = self.boundary;
        let children = self
            .children
            .get_or_insert_with(|| Box::new(subdivide(&boundary, depth + 1)));

        let mut item = item;
        for child in children.iter_mut() {
            match child.insert(capacity, coord, item) {
                Ok(()) => return Ok(()),
                Err(rejected) => item = rejected,
            }
        }
        Err(item)
    }

    fn query(&self, range: &BoundingBox, seen: &mut HashSet<usize>, out: &mut Vec<T>) {
        if !range.intersects(&self.boundary) {
            return;
        }

        for (coord, item) in &self.items {
            if range.contains(coord) && seen.insert(item.identity()) {
                out.push(item.clone());
            }
        }

        if let Some(children) = &self.children {
            for child in children.iter() {
                if range.intersects(&child.boundary) {
                    child.query(range, seen, out);
                }
            }
        }
    }

    fn erase(&mut self, coord: &GeoCoordinate, identity: usize) -> usize {
        let mut removed = 0;
        if self.boundary.contains(coord) {
            let before = self.items.len();
            self.items
                .retain(|(c, item)| !(c == coord && item.identity() == identity));
            removed += before - self.items.len();
        }

        if let Some(children) = &mut self.children {
            for child in children.iter_mut() {
                removed += child.erase(coord, identity);
            }
        }
        removed
    }

    fn len(&self) -> usize {
        self.items.len()
            + self
                .children
                .as_ref()
                .map_or(0, |c| c.iter().map(Node::len).sum())
    }

    fn max_depth(&self) -> u32 {
        self.children
            .as_ref()
            .map_or(self.depth, |c| c.iter().map(Node::max_depth).max().unwrap_or(self.depth))
    }
}

/// Split a boundary into four equal quadrants: NE, NW, SE, SW
fn subdivide<T: Identity + Clone>(boundary: &BoundingBox, depth: u32) -> [Node<T>; 4] {
    let c = boundary.center();
    let (l, r, t, b) = (boundary.left(), boundary.right(), boundary.top(), boundary.bottom());
    [
        Node::new(BoundingBox::from_edges(c.longitude, c.latitude, r, t), depth),
        Node::new(BoundingBox::from_edges(l, c.latitude, c.longitude, t), depth),
        Node::new(BoundingBox::from_edges(c.longitude, b, r, c.latitude), depth),
        Node::new(BoundingBox::from_edges(l, b, c.longitude, c.latitude), depth),
    ]
}

/// Point quadtree over a fixed geographic boundary.
///
/// Nodes keep up to `capacity` items and subdivide on overflow. Items never
/// move after insertion and nodes never merge back.
pub struct Quadtree<T> {
    capacity: usize,
    root: Node<T>,
}

impl<T: Identity + Clone> Quadtree<T> {
    pub fn new(capacity: usize, boundary: BoundingBox) -> Self {
        Self {
            capacity: capacity.max(1),
            root: Node::new(boundary, 0),
        }
    }

    /// Whole lon/lat plane
    pub fn world(capacity: usize) -> Self {
        Self::new(capacity, BoundingBox::world())
    }

    pub fn boundary(&self) -> BoundingBox {
        self.root.boundary
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns false if `coord` lies outside the root boundary
    pub fn insert(&mut self, coord: GeoCoordinate, item: T) -> bool {
        self.root.insert(self.capacity, coord, item).is_ok()
    }

    /// Remove every entry at `coord` with the same identity as `item`.
    /// Returns how many were removed.
    pub fn erase(&mut self, coord: &GeoCoordinate, item: &T) -> usize {
        self.root.erase(coord, item.identity())
    }

    /// Distinct items whose coordinates lie inside `range`
    pub fn query(&self, range: &BoundingBox) -> Vec<T> {
        let mut out = Vec::new();
        self.query_into(range, &mut out);
        out
    }

    /// Like [`query`](Self::query) but appends to an existing buffer
    pub fn query_into(&self, range: &BoundingBox, out: &mut Vec<T>) {
        let mut seen: HashSet<usize> = out.iter().map(Identity::identity).collect();
        self.root.query(range, &mut seen, out);
    }

    pub fn clear(&mut self) {
        self.root.items.clear();
        self.root.children = None;
    }

    pub fn len(&self) -> usize {
        self.root.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deepest subdivided level, 0 for a single node
    pub fn depth(&self) -> u32 {
        self.root.max_depth()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic xorshift so tests don't need a rng crate
    fn scatter(n: usize, seed: u64) -> Vec<GeoCoordinate> {
        let mut state = seed;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 11) as f64 / (1u64 << 53) as f64
        };
        (0..n)
            .map(|_| GeoCoordinate::new(next() * 360.0 - 180.0, next() * 180.0 - 90.0))
            .collect()
    }

    fn filled(coords: &[GeoCoordinate], capacity: usize) -> Quadtree<usize> {
        let mut tree = Quadtree::world(capacity);
        for (id, c) in coords.iter().enumerate() {
            assert!(tree.insert(*c, id));
        }
        tree
    }

    #[test]
    fn test_full_query_returns_everything() {
        let coords = scatter(2_000, 0x9E37_79B9_7F4A_7C15);
        let tree = filled(&coords, 8);

        let mut found = tree.query(&BoundingBox::world());
        found.sort_unstable();
        assert_eq!(found, (0..coords.len()).collect::<Vec<_>>());
        assert_eq!(tree.len(), coords.len());
        assert!(tree.depth() > 0);
    }

    #[test]
    fn test_sub_rect_query_matches_brute_force() {
        let coords = scatter(1_500, 42);
        let tree = filled(&coords, 4);

        for range in [
            BoundingBox::from_edges(-20.0, -10.0, 35.0, 40.0),
            BoundingBox::from_edges(100.0, -80.0, 180.0, -5.0),
            BoundingBox::from_edges(-180.0, 0.0, 0.0, 90.0),
        ] {
            let mut found = tree.query(&range);
            found.sort_unstable();
            let expected: Vec<usize> = coords
                .iter()
                .enumerate()
                .filter(|(_, c)| range.contains(c))
                .map(|(id, _)| id)
                .collect();
            assert_eq!(found, expected);
        }
    }

    #[test]
    fn test_erase_all_leaves_empty() {
        let coords = scatter(500, 7);
        let mut tree = filled(&coords, 3);

        for (id, c) in coords.iter().enumerate() {
            assert_eq!(tree.erase(c, &id), 1);
        }
        assert!(tree.query(&BoundingBox::world()).is_empty());
        assert!(tree.is_empty());
    }

    #[test]
    fn test_insert_outside_root_fails() {
        let mut tree: Quadtree<usize> =
            Quadtree::new(4, BoundingBox::from_edges(0.0, 0.0, 10.0, 10.0));
        assert!(!tree.insert(GeoCoordinate::new(11.0, 5.0), 1));
        assert!(tree.insert(GeoCoordinate::new(10.0, 10.0), 2));
    }

    #[test]
    fn test_erase_matches_identity_not_value() {
        let a = Arc::new(String::from("same"));
        let b = Arc::new(String::from("same"));
        let at = GeoCoordinate::new(1.0, 1.0);

        let mut tree = Quadtree::world(4);
        tree.insert(at, a.clone());
        tree.insert(at, b.clone());

        assert_eq!(tree.erase(&at, &b), 1);
        let left = tree.query(&BoundingBox::world());
        assert_eq!(left.len(), 1);
        assert!(Arc::ptr_eq(&left[0], &a));
    }

    #[test]
    fn test_identical_coordinates_stop_at_max_depth() {
        let mut tree = Quadtree::world(1);
        let at = GeoCoordinate::new(12.5, -3.25);
        for id in 0..64usize {
            assert!(tree.insert(at, id));
        }
        assert_eq!(tree.query(&BoundingBox::world()).len(), 64);
        assert!(tree.depth() <= MAX_DEPTH);
    }

    #[test]
    fn test_clear() {
        let coords = scatter(100, 3);
        let mut tree = filled(&coords, 2);
        tree.clear();
        assert!(tree.is_empty());
        assert_eq!(tree.depth(), 0);
        assert!(tree.insert(coords[0], 0));
    }
}
