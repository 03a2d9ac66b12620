//! Uniform grid used for neighbourhood queries during a tick.
//!
//! The grid holds plain `Copy` payloads (indices or ids), never the entities
//! themselves. It is cleared and refilled every tick, so anything read from
//! it is only meaningful until positions change again.

use shared::Vec2;

/// Fixed-size bucket grid over the square `[0, world_size]`.
///
/// Points outside the world are filed under the nearest edge cell, which
/// keeps creatures inside the boundary forgiveness margin queryable.
#[derive(Debug, Clone)]
pub struct SpatialGrid<T> {
    cell_size: f32,
    cols: usize,
    cells: Vec<Vec<T>>,
}

impl<T: Copy> SpatialGrid<T> {
    pub fn new(world_size: f32, cell_size: f32) -> Self {
        let cell_size = if cell_size > 0.0 { cell_size } else { 1.0 };
        let cols = ((world_size / cell_size).ceil() as usize).max(1);
        Self {
            cell_size,
            cols,
            cells: (0..cols * cols).map(|_| Vec::new()).collect(),
        }
    }

    /// Number of cells along each axis.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Empties every bucket while keeping their allocations.
    pub fn clear(&mut self) {
        for cell in &mut self.cells {
            cell.clear();
        }
    }

    /// Clears the grid and files every `(point, payload)` pair.
    pub fn rebuild<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (Vec2, T)>,
    {
        self.clear();
        for (point, payload) in entries {
            self.insert(point, payload);
        }
    }

    pub fn insert(&mut self, point: Vec2, payload: T) {
        let (cx, cy) = self.cell_of(point);
        let index = cy * self.cols + cx;
        self.cells[index].push(payload);
    }

    /// Yields every payload in the `(2 * radius + 1)^2` block of cells centred
    /// on the cell containing `point`.
    ///
    /// This is a coarse candidate set; callers do their own distance test.
    pub fn query(&self, point: Vec2, radius: usize) -> impl Iterator<Item = T> + '_ {
        let (cx, cy) = self.cell_of(point);
        let last = self.cols - 1;
        let (x0, x1) = (cx.saturating_sub(radius), (cx + radius).min(last));
        let (y0, y1) = (cy.saturating_sub(radius), (cy + radius).min(last));
        let cols = self.cols;

        (y0..=y1).flat_map(move |y| {
            (x0..=x1).flat_map(move |x| self.cells[y * cols + x].iter().copied())
        })
    }

    fn cell_of(&self, point: Vec2) -> (usize, usize) {
        (self.axis_cell(point.x), self.axis_cell(point.y))
    }

    fn axis_cell(&self, v: f32) -> usize {
        // NaN casts to 0, which is as good a bucket as any.
        let cell = (v / self.cell_size).floor();
        if cell <= 0.0 {
            0
        } else {
            (cell as usize).min(self.cols - 1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_dimensions_round_up() {
        let grid: SpatialGrid<u32> = SpatialGrid::new(1050.0, 100.0);
        assert_eq!(grid.cols(), 11);

        let grid: SpatialGrid<u32> = SpatialGrid::new(1000.0, 100.0);
        assert_eq!(grid.cols(), 10);
    }

    #[test]
    fn test_query_returns_neighbouring_cells_only() {
        let mut grid = SpatialGrid::new(1000.0, 100.0);
        grid.insert(Vec2::new(150.0, 150.0), 1u32); // cell (1, 1)
        grid.insert(Vec2::new(250.0, 250.0), 2u32); // cell (2, 2)
        grid.insert(Vec2::new(350.0, 150.0), 3u32); // cell (3, 1)

        let mut near: Vec<u32> = grid.query(Vec2::new(150.0, 150.0), 1).collect();
        near.sort();
        assert_eq!(near, vec![1, 2]);

        let mut wide: Vec<u32> = grid.query(Vec2::new(150.0, 150.0), 2).collect();
        wide.sort();
        assert_eq!(wide, vec![1, 2, 3]);
    }

    #[test]
    fn test_query_is_approximate_not_exact_radius() {
        let mut grid = SpatialGrid::new(1000.0, 100.0);
        // Far corner of the neighbouring cell, well over 100 units away.
        grid.insert(Vec2::new(299.0, 299.0), 9u32);
        let found: Vec<u32> = grid.query(Vec2::new(100.0, 100.0), 1).collect();
        assert_eq!(found, vec![9]);
    }

    #[test]
    fn test_out_of_bounds_points_clamp_to_edge() {
        let mut grid = SpatialGrid::new(1000.0, 100.0);
        grid.insert(Vec2::new(-20.0, 1020.0), 5u32);
        let found: Vec<u32> = grid.query(Vec2::new(10.0, 990.0), 0).collect();
        assert_eq!(found, vec![5]);
    }

    #[test]
    fn test_rebuild_discards_previous_contents() {
        let mut grid = SpatialGrid::new(1000.0, 100.0);
        grid.insert(Vec2::new(50.0, 50.0), 1u32);
        grid.rebuild(vec![(Vec2::new(950.0, 950.0), 2u32)]);

        assert_eq!(grid.query(Vec2::new(50.0, 50.0), 1).count(), 0);
        let found: Vec<u32> = grid.query(Vec2::new(950.0, 950.0), 0).collect();
        assert_eq!(found, vec![2]);
    }

    #[test]
    fn test_query_order_is_deterministic() {
        let entries: Vec<(Vec2, u32)> = (0..50)
            .map(|i| (Vec2::new(i as f32 * 17.0, i as f32 * 13.0), i))
            .collect();

        let mut a = SpatialGrid::new(1000.0, 100.0);
        let mut b = SpatialGrid::new(1000.0, 100.0);
        a.rebuild(entries.clone());
        b.rebuild(entries);

        let qa: Vec<u32> = a.query(Vec2::new(300.0, 200.0), 2).collect();
        let qb: Vec<u32> = b.query(Vec2::new(300.0, 200.0), 2).collect();
        assert_eq!(qa, qb);
    }
}
