//! Rectangular grid of `Asic`s wired with cardinal nearest-neighbor links.
//!
//! One cell is flagged as the DAQ node; the rest form the routing fabric.
//! Adapted from the shape of the teacher's `Emulator::new` wiring pass,
//! which owns every peripheral and connects them once at construction time.

use crate::core::asic::{Asic, AsicConfig, DEFAULT_F_OSC, DEFAULT_RANDOM_RATE};
use crate::core::byte::Direction;
use crate::core::link::AsicIndex;

pub struct Mesh {
    rows: usize,
    cols: usize,
    asics: Vec<Asic>,
    daq_index: AsicIndex,
}

impl Mesh {
    /// Builds a `rows` x `cols` grid with the DAQ node at `(0, 0)`. Each
    /// ASIC's PRNG is seeded from `master_seed` combined with its
    /// coordinates, so two meshes built from the same seed are bit-for-bit
    /// reproducible regardless of construction order.
    pub fn new(rows: usize, cols: usize, config: AsicConfig, master_seed: u64) -> Mesh {
        assert!(rows > 0 && cols > 0, "mesh must have at least one row and column");

        let mut asics = Vec::with_capacity(rows * cols);
        for row in 0..rows {
            for col in 0..cols {
                let is_daq_node = row == 0 && col == 0;
                let seed = master_seed ^ ((row as u64) << 32) ^ (col as u64);
                asics.push(Asic::new(row, col, DEFAULT_F_OSC, DEFAULT_RANDOM_RATE, is_daq_node, config.clone(), seed));
            }
        }

        let mut mesh = Mesh { rows, cols, asics, daq_index: AsicIndex { row: 0, col: 0 } };
        mesh.wire();
        mesh
    }

    fn index_of(&self, row: usize, col: usize) -> usize {
        row * self.cols + col
    }

    fn wire(&mut self) {
        for row in 0..self.rows {
            for col in 0..self.cols {
                if col + 1 < self.cols {
                    self.link(row, col, Direction::East, row, col + 1);
                }
                if row + 1 < self.rows {
                    self.link(row, col, Direction::South, row + 1, col);
                }
            }
        }
    }

    fn link(&mut self, row_a: usize, col_a: usize, dir_a: Direction, row_b: usize, col_b: usize) {
        let idx_a = self.index_of(row_a, col_a);
        let idx_b = self.index_of(row_b, col_b);
        self.asics[idx_a].connect(dir_a, AsicIndex { row: row_b, col: col_b });
        self.asics[idx_b].connect(dir_a.opposite(), AsicIndex { row: row_a, col: col_a });
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn daq_index(&self) -> AsicIndex {
        self.daq_index
    }

    /// Every direction the DAQ node is wired on. A broadcast request floods
    /// out on all of them so every reachable ASIC sees it directly or via
    /// one hop of relaying, regardless of mesh shape.
    pub fn daq_egress_directions(&self) -> Vec<Direction> {
        let daq = self.get(self.daq_index);
        Direction::ALL.into_iter().filter(|d| daq.links[d.index()].present()).collect()
    }

    pub fn get(&self, idx: AsicIndex) -> &Asic {
        &self.asics[self.index_of(idx.row, idx.col)]
    }

    pub fn get_mut(&mut self, idx: AsicIndex) -> &mut Asic {
        let i = self.index_of(idx.row, idx.col);
        &mut self.asics[i]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Asic> {
        self.asics.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Asic> {
        self.asics.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_by_two_mesh_wires_cardinal_neighbors() {
        let mesh = Mesh::new(2, 2, AsicConfig::default(), 7);
        let nw = mesh.get(AsicIndex { row: 0, col: 0 });
        assert!(nw.links[Direction::East.index()].present());
        assert!(nw.links[Direction::South.index()].present());
        assert!(!nw.links[Direction::North.index()].present());
        assert!(!nw.links[Direction::West.index()].present());
    }

    #[test]
    fn exactly_one_asic_is_flagged_as_daq_node() {
        let mesh = Mesh::new(3, 3, AsicConfig::default(), 1);
        let daq_count = mesh.iter().filter(|a| a.is_daq_node).count();
        assert_eq!(daq_count, 1);
        assert!(mesh.get(mesh.daq_index()).is_daq_node);
    }

    #[test]
    fn same_seed_yields_identical_initial_phase() {
        let a = Mesh::new(2, 2, AsicConfig::default(), 99);
        let b = Mesh::new(2, 2, AsicConfig::default(), 99);
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.abs_time_now(), y.abs_time_now());
        }
    }
}
