use crate::bounds::Bounds3f;
use crate::Point3f;

/// Uniform spatial hash grid. Entries are inserted for every cell their
/// bounding box overlaps; lookups return all entries whose box reaches the
/// queried point's cell.
#[derive(Debug)]
pub struct HashGrid {
    hash_size: usize,
    bounds: Bounds3f,
    inv_cell_size: f32,
    cells: Vec<Vec<usize>>,
}

impl HashGrid {
    pub fn new(bounds: Bounds3f, cell_size: f32, hash_size: usize) -> HashGrid {
        debug_assert!(cell_size > 0.0);
        HashGrid {
            hash_size: hash_size.max(1),
            bounds,
            inv_cell_size: 1.0 / cell_size,
            cells: vec![Vec::new(); hash_size.max(1)],
        }
    }

    fn cell_of(&self, p: &Point3f) -> (i32, i32, i32) {
        let d = (*p - self.bounds.p_min) * self.inv_cell_size;
        (d.x.floor() as i32, d.y.floor() as i32, d.z.floor() as i32)
    }

    fn hash(&self, ix: i32, iy: i32, iz: i32) -> usize {
        let h = (ix.wrapping_mul(73_856_093))
            ^ (iy.wrapping_mul(19_349_663))
            ^ (iz.wrapping_mul(83_492_791));
        (h as usize) % self.hash_size
    }

    /// Insert `id` into every cell overlapped by [p_min, p_max].
    pub fn add(&mut self, id: usize, p_min: &Point3f, p_max: &Point3f) {
        let (x0, y0, z0) = self.cell_of(p_min);
        let (x1, y1, z1) = self.cell_of(p_max);
        for iz in z0..=z1 {
            for iy in y0..=y1 {
                for ix in x0..=x1 {
                    let h = self.hash(ix, iy, iz);
                    self.cells[h].push(id);
                }
            }
        }
    }

    /// Every id whose insertion box covered the cell containing `p`.
    pub fn lookup(&self, p: &Point3f) -> &[usize] {
        let (ix, iy, iz) = self.cell_of(p);
        let h = self.hash(ix, iy, iz);
        &self.cells[h]
    }

    pub fn clear(&mut self) {
        for c in &mut self.cells {
            c.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Vector3f;

    #[test]
    fn test_points_found_within_radius() {
        let bounds = Bounds3f::from_points(
            &Point3f::new(0.0, 0.0, 0.0),
            &Point3f::new(10.0, 10.0, 10.0),
        );
        let radius = 0.5;
        let mut grid = HashGrid::new(bounds, 2.0 * radius, 1024);

        let centers = [
            Point3f::new(1.0, 1.0, 1.0),
            Point3f::new(5.0, 5.0, 5.0),
            Point3f::new(9.5, 0.5, 3.0),
        ];
        for (i, c) in centers.iter().enumerate() {
            let r = Vector3f::new(radius, radius, radius);
            grid.add(i, &(*c - r), &(*c + r));
        }

        // A query inside each ball must see the corresponding id
        for (i, c) in centers.iter().enumerate() {
            let q = *c + Vector3f::new(radius * 0.9, 0.0, 0.0);
            assert!(grid.lookup(&q).contains(&i), "missing id {}", i);
        }
    }

    #[test]
    fn test_clear() {
        let bounds = Bounds3f::from_points(
            &Point3f::new(0.0, 0.0, 0.0),
            &Point3f::new(1.0, 1.0, 1.0),
        );
        let mut grid = HashGrid::new(bounds, 0.1, 64);
        grid.add(
            0,
            &Point3f::new(0.4, 0.4, 0.4),
            &Point3f::new(0.6, 0.6, 0.6),
        );
        assert!(!grid.lookup(&Point3f::new(0.5, 0.5, 0.5)).is_empty());
        grid.clear();
        assert!(grid.lookup(&Point3f::new(0.5, 0.5, 0.5)).is_empty());
    }
}
