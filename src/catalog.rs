//! Shape catalog: the five pieces, each with 4 precomputed rotation masks.

use rand::Rng;

/// One rotation state: 4x4 occupancy, row-major, 1 = occupied.
pub type Mask = [[u8; 4]; 4];

/// Immutable piece shape: display name plus all four rotation masks.
#[derive(Debug)]
pub struct Shape {
    pub name: &'static str,
    masks: [Mask; 4],
}

impl Shape {
    /// Occupancy mask for a rotation index (taken modulo 4).
    #[inline]
    pub fn mask(&self, rotation: u8) -> &Mask {
        &self.masks[(rotation % 4) as usize]
    }

    /// True if the mask cell at (row, col) is occupied.
    #[inline]
    pub fn occupied(&self, rotation: u8, row: usize, col: usize) -> bool {
        self.mask(rotation)[row][col] != 0
    }

    /// Occupied bounds (min_col, max_col, min_row, max_row) of a rotation.
    /// Every shape occupies at least one cell in every rotation.
    pub fn bounds(&self, rotation: u8) -> (usize, usize, usize, usize) {
        let mask = self.mask(rotation);
        let (mut min_col, mut max_col) = (4, 0);
        let (mut min_row, mut max_row) = (4, 0);
        for (row, cells) in mask.iter().enumerate() {
            for (col, &cell) in cells.iter().enumerate() {
                if cell != 0 {
                    min_col = min_col.min(col);
                    max_col = max_col.max(col);
                    min_row = min_row.min(row);
                    max_row = max_row.max(row);
                }
            }
        }
        (min_col, max_col, min_row, max_row)
    }
}

/// All shapes, in a fixed order. Built once and shared immutably; consumers
/// hold `&'static Shape` references so pieces never outlive their shape.
#[derive(Debug, Clone, Copy)]
pub struct ShapeCatalog {
    shapes: &'static [Shape],
}

impl ShapeCatalog {
    pub fn new() -> Self {
        Self { shapes: &SHAPES }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    /// Uniformly random shape.
    pub fn pick<R: Rng>(&self, rng: &mut R) -> &'static Shape {
        &self.shapes[rng.gen_range(0..self.shapes.len())]
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static Shape> {
        self.shapes.iter()
    }
}

impl Default for ShapeCatalog {
    fn default() -> Self {
        Self::new()
    }
}

/// Each successive rotation is one quarter-turn counter-clockwise of the last.
static SHAPES: [Shape; 5] = [
    Shape {
        name: "Line",
        masks: [
            [
                [0, 0, 0, 0],
                [1, 1, 1, 1],
                [0, 0, 0, 0],
                [0, 0, 0, 0],
            ],
            [
                [0, 1, 0, 0],
                [0, 1, 0, 0],
                [0, 1, 0, 0],
                [0, 1, 0, 0],
            ],
            [
                [0, 0, 0, 0],
                [0, 0, 0, 0],
                [1, 1, 1, 1],
                [0, 0, 0, 0],
            ],
            [
                [0, 0, 1, 0],
                [0, 0, 1, 0],
                [0, 0, 1, 0],
                [0, 0, 1, 0],
            ],
        ],
    },
    Shape {
        name: "Square",
        masks: [
            [
                [0, 0, 0, 0],
                [0, 1, 1, 0],
                [0, 1, 1, 0],
                [0, 0, 0, 0],
            ],
            [
                [0, 0, 0, 0],
                [0, 1, 1, 0],
                [0, 1, 1, 0],
                [0, 0, 0, 0],
            ],
            [
                [0, 0, 0, 0],
                [0, 1, 1, 0],
                [0, 1, 1, 0],
                [0, 0, 0, 0],
            ],
            [
                [0, 0, 0, 0],
                [0, 1, 1, 0],
                [0, 1, 1, 0],
                [0, 0, 0, 0],
            ],
        ],
    },
    Shape {
        name: "Skew",
        masks: [
            [
                [0, 0, 0, 0],
                [0, 0, 1, 1],
                [0, 1, 1, 0],
                [0, 0, 0, 0],
            ],
            [
                [0, 1, 0, 0],
                [0, 1, 1, 0],
                [0, 0, 1, 0],
                [0, 0, 0, 0],
            ],
            [
                [0, 0, 0, 0],
                [0, 1, 1, 0],
                [1, 1, 0, 0],
                [0, 0, 0, 0],
            ],
            [
                [0, 0, 0, 0],
                [0, 1, 0, 0],
                [0, 1, 1, 0],
                [0, 0, 1, 0],
            ],
        ],
    },
    Shape {
        name: "Ell",
        masks: [
            [
                [0, 0, 0, 0],
                [0, 1, 0, 0],
                [0, 1, 0, 0],
                [0, 1, 1, 0],
            ],
            [
                [0, 0, 0, 0],
                [0, 0, 0, 1],
                [0, 1, 1, 1],
                [0, 0, 0, 0],
            ],
            [
                [0, 1, 1, 0],
                [0, 0, 1, 0],
                [0, 0, 1, 0],
                [0, 0, 0, 0],
            ],
            [
                [0, 0, 0, 0],
                [1, 1, 1, 0],
                [1, 0, 0, 0],
                [0, 0, 0, 0],
            ],
        ],
    },
    Shape {
        name: "Tee",
        masks: [
            [
                [0, 0, 0, 0],
                [0, 1, 1, 1],
                [0, 0, 1, 0],
                [0, 0, 1, 0],
            ],
            [
                [0, 1, 0, 0],
                [0, 1, 1, 1],
                [0, 1, 0, 0],
                [0, 0, 0, 0],
            ],
            [
                [0, 1, 0, 0],
                [0, 1, 0, 0],
                [1, 1, 1, 0],
                [0, 0, 0, 0],
            ],
            [
                [0, 0, 0, 0],
                [0, 0, 1, 0],
                [1, 1, 1, 0],
                [0, 0, 1, 0],
            ],
        ],
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn five_shapes_each_nonempty() {
        let catalog = ShapeCatalog::new();
        assert_eq!(catalog.len(), 5);
        for shape in catalog.iter() {
            for rotation in 0..4 {
                let occupied: usize = shape
                    .mask(rotation)
                    .iter()
                    .flatten()
                    .map(|&c| usize::from(c != 0))
                    .sum();
                assert_eq!(occupied, 4, "{} rot {}", shape.name, rotation);
            }
        }
    }

    #[test]
    fn square_is_rotation_invariant() {
        let catalog = ShapeCatalog::new();
        let square = catalog.iter().find(|s| s.name == "Square").unwrap();
        for rotation in 1..4 {
            assert_eq!(square.mask(0), square.mask(rotation));
        }
    }

    #[test]
    fn bounds_match_mask() {
        let catalog = ShapeCatalog::new();
        let line = catalog.iter().find(|s| s.name == "Line").unwrap();
        assert_eq!(line.bounds(0), (0, 3, 1, 1));
        assert_eq!(line.bounds(1), (1, 1, 0, 3));
    }

    #[test]
    fn pick_returns_catalog_member() {
        let catalog = ShapeCatalog::new();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let shape = catalog.pick(&mut rng);
            assert!(catalog.iter().any(|s| std::ptr::eq(s, shape)));
        }
    }
}
