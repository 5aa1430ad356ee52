use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::bounds::Bounds3f;
use crate::Point3f;

/// Items stored in a `KdTree` expose a position.
pub trait KdItem {
    fn position(&self) -> Point3f;
}

#[derive(Debug, Copy, Clone)]
struct KdNode {
    /// Index into the item array
    item: usize,
    axis: usize,
    left: Option<usize>,
    right: Option<usize>,
}

/// Balanced k-d tree built bottom-up by recursive median partition on the
/// axis of maximum extent. Supports k-nearest and radius queries.
#[derive(Debug)]
pub struct KdTree<T: KdItem> {
    items: Vec<T>,
    nodes: Vec<KdNode>,
    root: Option<usize>,
}

struct HeapEntry {
    dist2: f32,
    item: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.dist2 == other.dist2
    }
}
impl Eq for HeapEntry {}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap on distance; distances are finite by construction
        self.dist2
            .partial_cmp(&other.dist2)
            .unwrap_or(Ordering::Equal)
    }
}

impl<T: KdItem> KdTree<T> {
    pub fn build(items: Vec<T>) -> KdTree<T> {
        let n = items.len();
        let mut tree = KdTree {
            items,
            nodes: Vec::with_capacity(n),
            root: None,
        };
        let mut order: Vec<usize> = (0..n).collect();
        tree.root = tree.build_rec(&mut order[..]);
        tree
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    fn build_rec(&mut self, order: &mut [usize]) -> Option<usize> {
        if order.is_empty() {
            return None;
        }
        // Split axis: largest extent of the contained positions
        let mut bounds = Bounds3f::new();
        for &i in order.iter() {
            bounds.extend(&self.items[i].position());
        }
        let axis = bounds.maximum_extent() as usize;

        let mid = order.len() / 2;
        order.sort_by(|&a, &b| {
            self.items[a].position()[axis]
                .partial_cmp(&self.items[b].position()[axis])
                .unwrap_or(Ordering::Equal)
        });
        let item = order[mid];

        let (left_slice, rest) = order.split_at_mut(mid);
        let right_slice = &mut rest[1..];
        // Recurse before pushing the node so child indices are known
        let left = self.build_rec(left_slice);
        let right = self.build_rec(right_slice);
        let node_idx = self.nodes.len();
        self.nodes.push(KdNode {
            item,
            axis,
            left,
            right,
        });
        Some(node_idx)
    }

    /// The indices of the k nearest items within `max_radius` of `p`,
    /// unordered.
    pub fn knn(&self, p: &Point3f, k: usize, max_radius: f32) -> Vec<usize> {
        let mut heap: BinaryHeap<HeapEntry> = BinaryHeap::with_capacity(k + 1);
        if let Some(root) = self.root {
            self.knn_rec(root, p, k, max_radius * max_radius, &mut heap);
        }
        heap.into_iter().map(|e| e.item).collect()
    }

    /// All item indices within `radius` of `p`.
    pub fn in_radius(&self, p: &Point3f, radius: f32) -> Vec<usize> {
        let mut out = Vec::new();
        if let Some(root) = self.root {
            self.radius_rec(root, p, radius * radius, &mut out);
        }
        out
    }

    fn knn_rec(
        &self,
        node_idx: usize,
        p: &Point3f,
        k: usize,
        max_dist2: f32,
        heap: &mut BinaryHeap<HeapEntry>,
    ) {
        let node = self.nodes[node_idx];
        let pos = self.items[node.item].position();
        let dist2 = (pos - *p).length_squared();
        if dist2 < max_dist2 {
            let worst = heap.peek().map(|e| e.dist2).unwrap_or(f32::MAX);
            if heap.len() < k || dist2 < worst {
                heap.push(HeapEntry {
                    dist2,
                    item: node.item,
                });
                if heap.len() > k {
                    heap.pop();
                }
            }
        }

        let delta = p[node.axis] - pos[node.axis];
        let (near, far) = if delta < 0.0 {
            (node.left, node.right)
        } else {
            (node.right, node.left)
        };
        if let Some(near) = near {
            self.knn_rec(near, p, k, max_dist2, heap);
        }
        // The far side only matters if the splitting plane is closer than
        // both the cutoff and the current worst candidate
        let plane_dist2 = delta * delta;
        let worst = if heap.len() >= k {
            heap.peek().map(|e| e.dist2).unwrap_or(f32::MAX)
        } else {
            f32::MAX
        };
        if plane_dist2 < max_dist2 && plane_dist2 < worst {
            if let Some(far) = far {
                self.knn_rec(far, p, k, max_dist2, heap);
            }
        }
    }

    fn radius_rec(&self, node_idx: usize, p: &Point3f, radius2: f32, out: &mut Vec<usize>) {
        let node = self.nodes[node_idx];
        let pos = self.items[node.item].position();
        let dist2 = (pos - *p).length_squared();
        if dist2 <= radius2 {
            out.push(node.item);
        }

        let delta = p[node.axis] - pos[node.axis];
        let (near, far) = if delta < 0.0 {
            (node.left, node.right)
        } else {
            (node.right, node.left)
        };
        if let Some(near) = near {
            self.radius_rec(near, p, radius2, out);
        }
        if delta * delta <= radius2 {
            if let Some(far) = far {
                self.radius_rec(far, p, radius2, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::Rng;

    struct P(Point3f);
    impl KdItem for P {
        fn position(&self) -> Point3f {
            self.0
        }
    }

    fn random_points(n: usize, seed: u64) -> Vec<P> {
        let mut rng = Rng::with_sequence(seed);
        (0..n)
            .map(|_| {
                P(Point3f::new(
                    rng.uniform_f32() * 10.0,
                    rng.uniform_f32() * 10.0,
                    rng.uniform_f32() * 10.0,
                ))
            })
            .collect()
    }

    #[test]
    fn test_knn_matches_brute_force() {
        let pts = random_points(500, 77);
        let positions: Vec<Point3f> = pts.iter().map(|p| p.0).collect();
        let tree = KdTree::build(pts);
        let query = Point3f::new(5.0, 5.0, 5.0);
        let k = 16;

        let mut found = tree.knn(&query, k, f32::MAX);
        found.sort_unstable();

        let mut brute: Vec<usize> = (0..positions.len()).collect();
        brute.sort_by(|&a, &b| {
            (positions[a] - query)
                .length_squared()
                .partial_cmp(&(positions[b] - query).length_squared())
                .unwrap()
        });
        let mut expected: Vec<usize> = brute[..k].to_vec();
        expected.sort_unstable();

        assert_eq!(found, expected);
    }

    #[test]
    fn test_radius_query() {
        let pts = random_points(300, 41);
        let positions: Vec<Point3f> = pts.iter().map(|p| p.0).collect();
        let tree = KdTree::build(pts);
        let query = Point3f::new(4.0, 6.0, 2.0);
        let radius = 2.5;

        let mut found = tree.in_radius(&query, radius);
        found.sort_unstable();
        let mut expected: Vec<usize> = (0..positions.len())
            .filter(|&i| (positions[i] - query).length_squared() <= radius * radius)
            .collect();
        expected.sort_unstable();
        assert_eq!(found, expected);
    }

    #[test]
    fn test_empty() {
        let tree: KdTree<P> = KdTree::build(Vec::new());
        assert!(tree.is_empty());
        assert!(tree.knn(&Point3f::new(0.0, 0.0, 0.0), 4, 1.0).is_empty());
    }
}
