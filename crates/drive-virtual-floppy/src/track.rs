//! Cyclic track storage.

/// One track surface as a cyclic array of byte cells.
///
/// ID address marks are kept in a side table rather than inferred from
/// cell contents: a 0xFE data byte inside a sector must not look like an
/// address mark, and the controller's searches key off mark positions,
/// not values. Overwriting a marked cell removes the mark.
pub struct TrackImage {
    cells: Vec<u8>,
    idams: Vec<usize>,
}

impl TrackImage {
    pub(crate) fn new(len: usize) -> Self {
        Self {
            cells: vec![0; len],
            idams: Vec::new(),
        }
    }

    /// Raw cell contents.
    #[must_use]
    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    /// Offsets of the registered ID address marks.
    #[must_use]
    pub fn idams(&self) -> &[usize] {
        &self.idams
    }

    /// Cell contents at `at`.
    #[must_use]
    pub fn read(&self, at: usize) -> u8 {
        self.cells[at]
    }

    /// Store a data byte at `at`, destroying any mark registered there.
    pub fn write(&mut self, at: usize, byte: u8) {
        self.cells[at] = byte;
        self.idams.retain(|&mark| mark != at);
    }

    /// Store an ID address mark at `at` and register its position.
    pub fn write_idam(&mut self, at: usize) {
        self.cells[at] = 0xFE;
        if !self.idams.contains(&at) {
            self.idams.push(at);
        }
    }

    /// Cells from `from` to the nearest mark within `span`, wrapping at
    /// `span`. Zero means `from` itself is a mark.
    pub(crate) fn idam_distance(&self, from: usize, span: usize) -> Option<usize> {
        (0..span).find(|d| self.idams.contains(&((from + d) % span)))
    }
}
