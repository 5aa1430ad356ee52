use std::sync::Arc;

use bumpalo::Bump;
use log::info;

use crate::bounds::{Axis, Bounds3f};
use crate::interaction::SurfaceInteraction;
use crate::light::AreaLight;
use crate::material::{Material, TransportMode};
use crate::medium::MediumInterface;
use crate::primitive::Primitive;
use crate::ray::Ray;
use crate::{Point3f, Vector3f};

const N_BUCKETS: usize = 12;
const TRAVERSAL_COST: f32 = 0.125;

/// Binary bounding volume hierarchy built with the surface area heuristic
/// and flattened to a depth-first node array for traversal.
#[derive(Debug)]
pub struct Bvh {
    max_prims_per_node: usize,
    primitives: Vec<Arc<dyn Primitive>>,
    nodes: Vec<LinearNode>,
}

impl Bvh {
    pub fn new(max_prims_per_node: usize, prims: Vec<Arc<dyn Primitive>>) -> Bvh {
        let mut primitive_info: Vec<PrimitiveInfo> = prims
            .iter()
            .enumerate()
            .map(|(i, p)| PrimitiveInfo::new(i, p.world_bounds()))
            .collect();

        let mut total_nodes = 0;
        let mut ordered_prims = Vec::with_capacity(prims.len());
        let root = if prims.is_empty() {
            None
        } else {
            Some(Bvh::recursive_build(
                &prims,
                &mut primitive_info,
                0,
                prims.len(),
                max_prims_per_node,
                &mut total_nodes,
                &mut ordered_prims,
            ))
        };

        let mut nodes = Vec::with_capacity(total_nodes);
        if let Some(ref root) = root {
            Bvh::flatten(root, &mut nodes);
        }
        debug_assert_eq!(nodes.len(), total_nodes);
        info!(
            "built BVH with {} nodes for {} primitives",
            total_nodes,
            ordered_prims.len()
        );

        Bvh {
            max_prims_per_node: max_prims_per_node.min(255),
            primitives: ordered_prims,
            nodes,
        }
    }

    fn recursive_build(
        primitives: &[Arc<dyn Primitive>],
        primitive_info: &mut Vec<PrimitiveInfo>,
        start: usize,
        end: usize,
        max_prims_per_node: usize,
        total_nodes: &mut usize,
        ordered_prims: &mut Vec<Arc<dyn Primitive>>,
    ) -> BuildNode {
        *total_nodes += 1;
        debug_assert_ne!(start, end);
        let n_primitives = end - start;
        let bounds = primitive_info[start..end]
            .iter()
            .fold(Bounds3f::new(), |b, pi| Bounds3f::union(&b, &pi.bounds));

        let make_leaf = |primitive_info: &[PrimitiveInfo],
                             ordered_prims: &mut Vec<Arc<dyn Primitive>>| {
            let first_prim_offset = ordered_prims.len();
            for pi in primitive_info {
                ordered_prims.push(Arc::clone(&primitives[pi.prim_number]));
            }
            BuildNode::leaf(first_prim_offset, n_primitives, bounds)
        };

        if n_primitives == 1 {
            return make_leaf(&primitive_info[start..end], ordered_prims);
        }

        let centroid_bounds = primitive_info[start..end]
            .iter()
            .fold(Bounds3f::new(), |b, pi| Bounds3f::union_point(&b, &pi.centroid));
        let axis = centroid_bounds.maximum_extent();
        let dim = axis as usize;

        // Degenerate centroid bounds: every centroid in the same spot
        if centroid_bounds.p_max[dim] == centroid_bounds.p_min[dim] {
            return make_leaf(&primitive_info[start..end], ordered_prims);
        }

        let mid;
        if n_primitives <= 4 {
            // Few primitives: split at the median of the centroid order
            primitive_info[start..end].sort_by(|a, b| {
                a.centroid[dim]
                    .partial_cmp(&b.centroid[dim])
                    .expect("NaN centroid in BVH build")
            });
            mid = (start + end) / 2;
        } else {
            // Bin centroids and evaluate the SAH at every bucket boundary
            let mut buckets = [BucketInfo::default(); N_BUCKETS];
            for pi in primitive_info[start..end].iter() {
                let b = bucket_index(&centroid_bounds, &pi.centroid, dim);
                buckets[b].count += 1;
                buckets[b].bounds = Bounds3f::union(&buckets[b].bounds, &pi.bounds);
            }

            let mut cost = [0.0f32; N_BUCKETS - 1];
            for (i, c) in cost.iter_mut().enumerate() {
                let mut b0 = Bounds3f::new();
                let mut b1 = Bounds3f::new();
                let mut count0 = 0;
                let mut count1 = 0;
                for b in buckets.iter().take(i + 1) {
                    b0 = Bounds3f::union(&b0, &b.bounds);
                    count0 += b.count;
                }
                for b in buckets.iter().skip(i + 1) {
                    b1 = Bounds3f::union(&b1, &b.bounds);
                    count1 += b.count;
                }
                *c = TRAVERSAL_COST
                    + (count0 as f32 * b0.surface_area() + count1 as f32 * b1.surface_area())
                        / bounds.surface_area();
            }

            let (min_cost_split_bucket, min_cost) = cost
                .iter()
                .enumerate()
                .min_by(|a, b| a.1.partial_cmp(b.1).unwrap())
                .map(|(i, c)| (i, *c))
                .unwrap();

            let leaf_cost = n_primitives as f32;
            if n_primitives > max_prims_per_node || min_cost < leaf_cost {
                mid = start
                    + itertools::partition(primitive_info[start..end].iter_mut(), |pi| {
                        bucket_index(&centroid_bounds, &pi.centroid, dim)
                            <= min_cost_split_bucket
                    });
                debug_assert!(mid > start && mid < end);
            } else {
                // Splitting cannot beat a leaf here
                return make_leaf(&primitive_info[start..end], ordered_prims);
            }
        }

        let left = Box::new(Bvh::recursive_build(
            primitives,
            primitive_info,
            start,
            mid,
            max_prims_per_node,
            total_nodes,
            ordered_prims,
        ));
        let right = Box::new(Bvh::recursive_build(
            primitives,
            primitive_info,
            mid,
            end,
            max_prims_per_node,
            total_nodes,
            ordered_prims,
        ));
        BuildNode::interior(axis, left, right)
    }

    fn flatten(node: &BuildNode, nodes: &mut Vec<LinearNode>) -> usize {
        let offset = nodes.len();
        match *node {
            BuildNode::Leaf {
                bounds,
                first_prim_offset,
                num_prims,
            } => {
                nodes.push(LinearNode {
                    bounds,
                    data: LinearNodeData::Leaf {
                        primitives_offset: first_prim_offset,
                        num_prims,
                    },
                });
            }
            BuildNode::Interior {
                bounds,
                split_axis,
                ref children,
            } => {
                nodes.push(LinearNode {
                    bounds,
                    data: LinearNodeData::Interior {
                        axis: split_axis,
                        second_child_offset: 0,
                    },
                });
                Bvh::flatten(&children[0], nodes);
                let second_offset = Bvh::flatten(&children[1], nodes);
                nodes[offset].data = LinearNodeData::Interior {
                    axis: split_axis,
                    second_child_offset: second_offset,
                };
            }
        }
        offset
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct BucketInfo {
    count: usize,
    bounds: Bounds3f,
}

fn bucket_index(centroid_bounds: &Bounds3f, centroid: &Point3f, dim: usize) -> usize {
    let b = (N_BUCKETS as f32 * centroid_bounds.offset(centroid)[dim]) as usize;
    b.min(N_BUCKETS - 1)
}

impl Primitive for Bvh {
    fn world_bounds(&self) -> Bounds3f {
        if self.nodes.is_empty() {
            Bounds3f::new()
        } else {
            self.nodes[0].bounds
        }
    }

    fn intersect(&self, ray: &mut Ray) -> Option<SurfaceInteraction<'_, '_>> {
        if self.nodes.is_empty() {
            return None;
        }
        let mut result = None;

        let inv_dir = Vector3f::new(1.0 / ray.d.x, 1.0 / ray.d.y, 1.0 / ray.d.z);
        let dir_is_neg = [
            (inv_dir.x < 0.0) as usize,
            (inv_dir.y < 0.0) as usize,
            (inv_dir.z < 0.0) as usize,
        ];
        let mut to_visit_offset = 0;
        let mut current = 0;
        let mut nodes_to_visit = [0usize; 64];
        loop {
            let node = &self.nodes[current];
            if node.bounds.intersect_p_fast(ray, &inv_dir, &dir_is_neg) {
                match node.data {
                    LinearNodeData::Leaf {
                        primitives_offset,
                        num_prims,
                    } => {
                        for i in 0..num_prims {
                            // A hit shrinks ray.t_max, so the latest Some is
                            // always the nearest so far
                            result = self.primitives[primitives_offset + i]
                                .intersect(ray)
                                .or(result);
                        }
                        if to_visit_offset == 0 {
                            break;
                        }
                        to_visit_offset -= 1;
                        current = nodes_to_visit[to_visit_offset];
                    }
                    LinearNodeData::Interior {
                        axis,
                        second_child_offset,
                    } => {
                        // Visit the near child first
                        if dir_is_neg[axis as usize] != 0 {
                            nodes_to_visit[to_visit_offset] = current + 1;
                            to_visit_offset += 1;
                            current = second_child_offset;
                        } else {
                            nodes_to_visit[to_visit_offset] = second_child_offset;
                            to_visit_offset += 1;
                            current += 1;
                        }
                    }
                }
            } else {
                if to_visit_offset == 0 {
                    break;
                }
                to_visit_offset -= 1;
                current = nodes_to_visit[to_visit_offset];
            }
        }
        result
    }

    fn intersect_p(&self, ray: &Ray) -> bool {
        if self.nodes.is_empty() {
            return false;
        }
        let inv_dir = Vector3f::new(1.0 / ray.d.x, 1.0 / ray.d.y, 1.0 / ray.d.z);
        let dir_is_neg = [
            (inv_dir.x < 0.0) as usize,
            (inv_dir.y < 0.0) as usize,
            (inv_dir.z < 0.0) as usize,
        ];
        let mut to_visit_offset = 0;
        let mut current = 0;
        let mut nodes_to_visit = [0usize; 64];
        loop {
            let node = &self.nodes[current];
            if node.bounds.intersect_p_fast(ray, &inv_dir, &dir_is_neg) {
                match node.data {
                    LinearNodeData::Leaf {
                        primitives_offset,
                        num_prims,
                    } => {
                        for i in 0..num_prims {
                            if self.primitives[primitives_offset + i].intersect_p(ray) {
                                return true;
                            }
                        }
                        if to_visit_offset == 0 {
                            break;
                        }
                        to_visit_offset -= 1;
                        current = nodes_to_visit[to_visit_offset];
                    }
                    LinearNodeData::Interior {
                        axis,
                        second_child_offset,
                    } => {
                        if dir_is_neg[axis as usize] != 0 {
                            nodes_to_visit[to_visit_offset] = current + 1;
                            to_visit_offset += 1;
                            current = second_child_offset;
                        } else {
                            nodes_to_visit[to_visit_offset] = second_child_offset;
                            to_visit_offset += 1;
                            current += 1;
                        }
                    }
                }
            } else {
                if to_visit_offset == 0 {
                    break;
                }
                to_visit_offset -= 1;
                current = nodes_to_visit[to_visit_offset];
            }
        }
        false
    }

    fn area_light(&self) -> Option<Arc<dyn AreaLight>> {
        panic!("area_light() called on an aggregate primitive");
    }

    fn material(&self) -> Option<Arc<dyn Material>> {
        panic!("material() called on an aggregate primitive");
    }

    fn medium_interface(&self) -> Option<&MediumInterface> {
        None
    }

    fn compute_scattering_functions<'p, 'a>(
        &self,
        _isect: &mut SurfaceInteraction<'p, 'a>,
        _mode: TransportMode,
        _arena: &'a Bump,
    ) {
        panic!("compute_scattering_functions() called on an aggregate primitive");
    }
}

struct PrimitiveInfo {
    prim_number: usize,
    centroid: Point3f,
    bounds: Bounds3f,
}

impl PrimitiveInfo {
    fn new(prim_number: usize, bounds: Bounds3f) -> PrimitiveInfo {
        PrimitiveInfo {
            prim_number,
            centroid: 0.5 * bounds.p_min + 0.5 * bounds.p_max,
            bounds,
        }
    }
}

enum BuildNode {
    Interior {
        bounds: Bounds3f,
        children: [Box<BuildNode>; 2],
        split_axis: Axis,
    },
    Leaf {
        bounds: Bounds3f,
        first_prim_offset: usize,
        num_prims: usize,
    },
}

impl BuildNode {
    fn interior(axis: Axis, left: Box<BuildNode>, right: Box<BuildNode>) -> BuildNode {
        let bounds = Bounds3f::union(left.bounds(), right.bounds());
        BuildNode::Interior {
            bounds,
            children: [left, right],
            split_axis: axis,
        }
    }

    fn leaf(first_prim_offset: usize, num_prims: usize, bounds: Bounds3f) -> BuildNode {
        BuildNode::Leaf {
            bounds,
            first_prim_offset,
            num_prims,
        }
    }

    fn bounds(&self) -> &Bounds3f {
        match self {
            BuildNode::Interior { ref bounds, .. } | BuildNode::Leaf { ref bounds, .. } => bounds,
        }
    }
}

#[derive(Debug, Copy, Clone)]
enum LinearNodeData {
    Interior {
        second_child_offset: usize,
        axis: Axis,
    },
    Leaf {
        primitives_offset: usize,
        num_prims: usize,
    },
}

#[derive(Debug, Copy, Clone)]
struct LinearNode {
    bounds: Bounds3f,
    data: LinearNodeData,
}
