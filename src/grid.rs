//! Grain grid: cell states, settling automaton, edge-to-edge clearance.

use rand::Rng;

/// Each piece block expands to BLOCK_SIZE x BLOCK_SIZE grains when it locks.
pub const BLOCK_SIZE: usize = 6;

/// Grain row watched by the game-over check: sand this close to the top ends
/// the game.
pub const SENTINEL_ROW: usize = 1;

/// Sand colour. Closed palette; the marked-for-clear state lives in [`Cell`],
/// not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandColor {
    Red,
    Green,
    Blue,
}

impl SandColor {
    pub const ALL: [Self; 3] = [Self::Red, Self::Green, Self::Blue];

    /// Uniformly random colour.
    pub fn pick<R: Rng>(rng: &mut R) -> Self {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }

    /// Palette index for theme lookup.
    #[inline]
    pub fn index(self) -> u8 {
        match self {
            Self::Red => 0,
            Self::Green => 1,
            Self::Blue => 2,
        }
    }
}

/// Single grain cell. `Marked` is transient: set by clearance detection,
/// erased by the removal sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    Empty,
    Sand(SandColor),
    Marked,
}

/// Fixed-size grain field. y = 0 is the top row.
///
/// The flood-fill scratch (`visited` stamps plus an explicit stack) is owned
/// here and reused across calls, so clearance detection never allocates in
/// steady state and never recurses.
#[derive(Debug, Clone)]
pub struct Grid {
    width: usize,
    height: usize,
    cells: Vec<Cell>,
    visited: Vec<u32>,
    stamp: u32,
    fill_stack: Vec<(usize, usize)>,
    span_buf: Vec<usize>,
}

impl Grid {
    /// Grid of `width` x `height` grains, all empty.
    pub fn new(width: usize, height: usize) -> Self {
        assert!(width > 0 && height > 0, "grid must be non-empty");
        Self {
            width,
            height,
            cells: vec![Cell::Empty; width * height],
            visited: vec![0; width * height],
            stamp: 0,
            fill_stack: Vec::new(),
            span_buf: Vec::new(),
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    fn idx(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> Option<Cell> {
        (x < self.width && y < self.height).then(|| self.cells[self.idx(x, y)])
    }

    /// Write a cell; coordinates outside the grid are ignored.
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, cell: Cell) {
        if x < self.width && y < self.height {
            let i = self.idx(x, y);
            self.cells[i] = cell;
        }
    }

    /// Number of non-empty cells (sand or marked).
    pub fn occupied_count(&self) -> usize {
        self.cells.iter().filter(|c| **c != Cell::Empty).count()
    }

    pub fn has_marked(&self) -> bool {
        self.cells.contains(&Cell::Marked)
    }

    /// True once settled sand reaches the sentinel row near the top.
    pub fn reached_top(&self) -> bool {
        let row = SENTINEL_ROW.min(self.height - 1);
        (0..self.width).any(|x| self.cells[self.idx(x, row)] != Cell::Empty)
    }

    /// One settling pass over every grain.
    ///
    /// Rows run from second-to-last up to the top, columns left to right;
    /// writes only ever go to the row below, so no grain is read after being
    /// moved within the same pass. A grain falls straight down when possible,
    /// otherwise slides into a free down-diagonal, trying a uniformly random
    /// side first. Marked cells do not move.
    ///
    /// Returns whether any marked cell exists after the pass.
    pub fn settle_pass<R: Rng>(&mut self, rng: &mut R) -> bool {
        let mut pending = false;
        for y in (0..self.height.saturating_sub(1)).rev() {
            for x in 0..self.width {
                let here = self.idx(x, y);
                let color = match self.cells[here] {
                    Cell::Empty => continue,
                    Cell::Marked => {
                        pending = true;
                        continue;
                    }
                    Cell::Sand(c) => c,
                };

                let below = self.idx(x, y + 1);
                if self.cells[below] == Cell::Empty {
                    self.cells[below] = Cell::Sand(color);
                    self.cells[here] = Cell::Empty;
                    continue;
                }

                let left_free = x > 0 && self.cells[self.idx(x - 1, y + 1)] == Cell::Empty;
                let right_free =
                    x + 1 < self.width && self.cells[self.idx(x + 1, y + 1)] == Cell::Empty;
                let go_left = match (left_free, right_free) {
                    (true, true) => rng.gen_bool(0.5),
                    (true, false) => true,
                    (false, true) => false,
                    (false, false) => continue,
                };
                let target = if go_left {
                    self.idx(x - 1, y + 1)
                } else {
                    self.idx(x + 1, y + 1)
                };
                self.cells[target] = Cell::Sand(color);
                self.cells[here] = Cell::Empty;
            }
        }
        // The scan skips the bottom row; marked grains there still count.
        if !pending {
            let last = self.height - 1;
            pending = (0..self.width).any(|x| self.cells[self.idx(x, last)] == Cell::Marked);
        }
        pending
    }

    /// Fresh generation stamp for one flood-fill launch. On wrap the arena is
    /// zeroed so stale stamps can never alias.
    fn next_stamp(&mut self) -> u32 {
        self.stamp = self.stamp.checked_add(1).unwrap_or_else(|| {
            self.visited.fill(0);
            1
        });
        self.stamp
    }

    /// Mark every colour region that connects the left edge to the right edge
    /// (8-connected, same colour). Returns the number of newly marked grains.
    ///
    /// Seeds are taken from column 0 per colour; a region that gets marked
    /// stops matching its colour, so later seeds cannot re-walk it.
    pub fn detect_spans(&mut self) -> usize {
        let mut newly_marked = 0;
        for color in SandColor::ALL {
            for start_y in 0..self.height {
                let seed = self.idx(0, start_y);
                if self.cells[seed] != Cell::Sand(color) {
                    continue;
                }
                if self.flood_from(start_y, color) {
                    for i in 0..self.span_buf.len() {
                        let cell = self.span_buf[i];
                        self.cells[cell] = Cell::Marked;
                    }
                    newly_marked += self.span_buf.len();
                }
            }
        }
        newly_marked
    }

    /// Iterative 8-connected fill of `color` seeded at (0, start_y), recording
    /// the component in `span_buf`. Returns whether it touched the right edge.
    fn flood_from(&mut self, start_y: usize, color: SandColor) -> bool {
        let stamp = self.next_stamp();
        self.span_buf.clear();
        self.fill_stack.clear();
        self.fill_stack.push((0, start_y));
        let seed = self.idx(0, start_y);
        self.visited[seed] = stamp;

        let mut reaches_right = false;
        while let Some((x, y)) = self.fill_stack.pop() {
            self.span_buf.push(self.idx(x, y));
            if x == self.width - 1 {
                reaches_right = true;
            }
            for dy in -1i32..=1 {
                for dx in -1i32..=1 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let nx = x as i32 + dx;
                    let ny = y as i32 + dy;
                    if nx < 0 || ny < 0 || nx >= self.width as i32 || ny >= self.height as i32 {
                        continue;
                    }
                    let (nx, ny) = (nx as usize, ny as usize);
                    let ni = self.idx(nx, ny);
                    if self.visited[ni] != stamp && self.cells[ni] == Cell::Sand(color) {
                        self.visited[ni] = stamp;
                        self.fill_stack.push((nx, ny));
                    }
                }
            }
        }
        reaches_right
    }

    /// Removal sweep: every marked cell becomes empty. Returns how many were
    /// removed.
    pub fn clear_marked(&mut self) -> u32 {
        let mut removed = 0;
        for cell in &mut self.cells {
            if *cell == Cell::Marked {
                *cell = Cell::Empty;
                removed += 1;
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn settle_pass_conserves_grains() {
        let mut grid = Grid::new(12, 16);
        let mut r = rng();
        for _ in 0..60 {
            let x = r.gen_range(0..12);
            let y = r.gen_range(0..16);
            grid.set(x, y, Cell::Sand(SandColor::pick(&mut r)));
        }
        let before = grid.occupied_count();
        for _ in 0..30 {
            grid.settle_pass(&mut r);
            assert_eq!(grid.occupied_count(), before);
        }
    }

    #[test]
    fn grain_falls_straight_then_slides() {
        let mut grid = Grid::new(5, 5);
        let mut r = rng();
        // Column blocked directly below: the grain must take a diagonal.
        grid.set(2, 4, Cell::Sand(SandColor::Red));
        grid.set(2, 3, Cell::Sand(SandColor::Red));
        grid.set(2, 0, Cell::Sand(SandColor::Blue));
        for _ in 0..10 {
            grid.settle_pass(&mut r);
        }
        let blues: Vec<(usize, usize)> = (0..5)
            .flat_map(|y| (0..5).map(move |x| (x, y)))
            .filter(|&(x, y)| grid.get(x, y) == Some(Cell::Sand(SandColor::Blue)))
            .collect();
        assert_eq!(blues.len(), 1);
        let (bx, by) = blues[0];
        assert_eq!(by, 4, "blue grain should reach the floor beside the stack");
        assert!(bx == 1 || bx == 3);
    }

    #[test]
    fn grain_settles_into_single_gap() {
        // Row H-2 full except column 3, floor full: a dropped grain must end
        // up exactly in the gap, never out of bounds.
        let (w, h) = (8, 8);
        let mut grid = Grid::new(w, h);
        let mut r = rng();
        for x in 0..w {
            grid.set(x, h - 1, Cell::Sand(SandColor::Green));
            if x != 3 {
                grid.set(x, h - 2, Cell::Sand(SandColor::Green));
            }
        }
        grid.set(3, 0, Cell::Sand(SandColor::Red));
        let before = grid.occupied_count();
        for _ in 0..(h * 2) {
            grid.settle_pass(&mut r);
        }
        assert_eq!(grid.occupied_count(), before);
        assert_eq!(grid.get(3, h - 2), Some(Cell::Sand(SandColor::Red)));
    }

    #[test]
    fn marked_cells_do_not_move_and_are_reported() {
        let mut grid = Grid::new(4, 6);
        let mut r = rng();
        grid.set(1, 2, Cell::Marked);
        let pending = grid.settle_pass(&mut r);
        assert!(pending);
        assert_eq!(grid.get(1, 2), Some(Cell::Marked));
        assert_eq!(grid.get(1, 3), Some(Cell::Empty));
    }

    #[test]
    fn marked_on_bottom_row_still_reported() {
        let mut grid = Grid::new(4, 6);
        let mut r = rng();
        grid.set(2, 5, Cell::Marked);
        assert!(grid.settle_pass(&mut r));
    }

    #[test]
    fn detects_exactly_the_spanning_component() {
        let mut grid = Grid::new(6, 6);
        // Red zigzag from x=0 to x=5, 8-connected via diagonals.
        let path = [(0, 3), (1, 4), (2, 3), (3, 4), (4, 3), (5, 4)];
        for &(x, y) in &path {
            grid.set(x, y, Cell::Sand(SandColor::Red));
        }
        // Blue neighbours and a red cell not connected to the path.
        grid.set(1, 2, Cell::Sand(SandColor::Blue));
        grid.set(5, 0, Cell::Sand(SandColor::Red));

        let marked = grid.detect_spans();
        assert_eq!(marked, path.len());
        for &(x, y) in &path {
            assert_eq!(grid.get(x, y), Some(Cell::Marked));
        }
        assert_eq!(grid.get(1, 2), Some(Cell::Sand(SandColor::Blue)));
        assert_eq!(grid.get(5, 0), Some(Cell::Sand(SandColor::Red)));
    }

    #[test]
    fn non_spanning_region_is_untouched() {
        let mut grid = Grid::new(6, 6);
        for x in 0..4 {
            grid.set(x, 5, Cell::Sand(SandColor::Green));
        }
        assert_eq!(grid.detect_spans(), 0);
        assert_eq!(grid.get(0, 5), Some(Cell::Sand(SandColor::Green)));
    }

    #[test]
    fn detection_is_idempotent() {
        let mut grid = Grid::new(6, 3);
        for x in 0..6 {
            grid.set(x, 1, Cell::Sand(SandColor::Blue));
        }
        let first = grid.detect_spans();
        assert_eq!(first, 6);
        assert_eq!(grid.detect_spans(), 0);
        assert_eq!(grid.occupied_count(), 6);
    }

    #[test]
    fn clear_marked_counts_and_empties() {
        let mut grid = Grid::new(6, 3);
        for x in 0..6 {
            grid.set(x, 1, Cell::Sand(SandColor::Blue));
        }
        grid.set(2, 2, Cell::Sand(SandColor::Red));
        grid.detect_spans();
        assert_eq!(grid.clear_marked(), 6);
        assert!(!grid.has_marked());
        assert_eq!(grid.occupied_count(), 1);
    }

    #[test]
    fn reached_top_watches_sentinel_row() {
        let mut grid = Grid::new(4, 10);
        assert!(!grid.reached_top());
        grid.set(0, SENTINEL_ROW + 1, Cell::Sand(SandColor::Red));
        assert!(!grid.reached_top());
        grid.set(0, SENTINEL_ROW, Cell::Sand(SandColor::Red));
        assert!(grid.reached_top());
    }
}
