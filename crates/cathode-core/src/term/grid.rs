use cathode_common::types::{Cell, Pos, Size};

/// A rectangular array of cells. Bounds are enforced here so callers can
/// never create cells outside `[0, width) × [0, height)`.
#[derive(Debug, Clone)]
pub struct Grid {
    size: Size,
    cells: Vec<Cell>,
}

impl Grid {
    pub fn new(size: Size) -> Self {
        Self {
            size,
            cells: vec![Cell::blank(); size.area()],
        }
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn width(&self) -> u16 {
        self.size.width
    }

    pub fn height(&self) -> u16 {
        self.size.height
    }

    fn index(&self, x: u16, y: u16) -> usize {
        y as usize * self.size.width as usize + x as usize
    }

    pub fn contains(&self, x: u16, y: u16) -> bool {
        x < self.size.width && y < self.size.height
    }

    pub fn cell(&self, x: u16, y: u16) -> Option<&Cell> {
        self.contains(x, y).then(|| &self.cells[self.index(x, y)])
    }

    pub fn cell_mut(&mut self, x: u16, y: u16) -> Option<&mut Cell> {
        if self.contains(x, y) {
            let idx = self.index(x, y);
            Some(&mut self.cells[idx])
        } else {
            None
        }
    }

    /// Replace a cell, dropping whatever tracked references the old value
    /// held. Out-of-bounds writes are discarded.
    pub fn set(&mut self, x: u16, y: u16, cell: Cell) {
        if self.contains(x, y) {
            let idx = self.index(x, y);
            self.cells[idx] = cell;
        }
    }

    pub fn row(&self, y: u16) -> Option<&[Cell]> {
        (y < self.size.height).then(|| {
            let start = self.index(0, y);
            &self.cells[start..start + self.size.width as usize]
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (Pos, &Cell)> {
        let width = self.size.width;
        self.cells.iter().enumerate().map(move |(i, cell)| {
            let x = (i % width as usize) as u16;
            let y = (i / width as usize) as u16;
            (Pos::new(x, y), cell)
        })
    }

    /// The visible text of a row: origin graphemes in order, continuation
    /// cells contributing nothing. Handy in tests.
    pub fn row_text(&self, y: u16) -> String {
        self.row(y)
            .map(|cells| cells.iter().map(|c| c.grapheme.as_str()).collect())
            .unwrap_or_default()
    }

    /// Resize preserving the top-left intersection. Cells outside it are
    /// dropped (releasing their tracked references).
    pub fn resize(&mut self, new_size: Size) {
        if new_size == self.size {
            return;
        }
        let mut next = Grid::new(new_size);
        let keep_w = self.size.width.min(new_size.width);
        let keep_h = self.size.height.min(new_size.height);
        for y in 0..keep_h {
            for x in 0..keep_w {
                if let Some(cell) = self.cell(x, y) {
                    next.set(x, y, cell.clone());
                }
            }
        }
        *self = next;
    }

    pub fn clear(&mut self) {
        for cell in &mut self.cells {
            *cell = Cell::blank();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_bounds_reads_and_writes_are_safe() {
        let mut grid = Grid::new(Size::new(4, 2));
        assert!(grid.cell(4, 0).is_none());
        assert!(grid.cell(0, 2).is_none());

        let mut cell = Cell::blank();
        cell.grapheme = "x".into();
        grid.set(9, 9, cell);
        assert!(grid.iter().all(|(_, c)| c.grapheme == " "));
    }

    #[test]
    fn resize_preserves_intersection() {
        let mut grid = Grid::new(Size::new(4, 3));
        let mut cell = Cell::blank();
        cell.grapheme = "A".into();
        grid.set(1, 1, cell.clone());
        grid.set(3, 2, cell);

        grid.resize(Size::new(2, 2));
        assert_eq!(grid.row_text(1), " A");
        assert_eq!(grid.cell(1, 1).unwrap().grapheme, "A");

        grid.resize(Size::new(5, 4));
        assert_eq!(grid.cell(1, 1).unwrap().grapheme, "A");
        // The cell dropped during the shrink does not come back.
        assert_eq!(grid.cell(3, 2).unwrap().grapheme, " ");
    }
}
