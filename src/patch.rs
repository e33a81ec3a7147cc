use crate::arena::Arena;
use crate::index_space::{CellIndex, IndexSpace};




/**
 * A patch is a mapping from a rectangular subset of the index space at a
 * given refinement level to associated field values. The mapping is backed
 * by a row-major array of data, whose buffer comes from an `Arena` and should
 * be handed back to it with `release` when the patch is retired.
 */
#[derive(Clone, Debug)]
pub struct Patch<const DIM: usize> {
    level: u32,
    space: IndexSpace<DIM>,
    data: Vec<f64>,
}




impl<const DIM: usize> Patch<DIM> {




    /**
     * Generate a patch at a given level, covering the given space, with
     * values defined from a closure.
     */
    pub fn from_function<F>(arena: &dyn Arena, level: u32, space: IndexSpace<DIM>, f: F) -> Self
    where
        F: Fn(CellIndex<DIM>) -> f64
    {
        let mut data = arena.alloc(space.len());

        for (x, index) in data.iter_mut().zip(space.iter()) {
            *x = f(index)
        }
        Self { level, space, data }
    }




    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn index_space(&self) -> &IndexSpace<DIM> {
        &self.space
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }




    /**
     * Return the field value at the given index, which must lie in this
     * patch.
     */
    pub fn get(&self, index: CellIndex<DIM>) -> f64 {
        self.validate_index(index);
        self.data[self.space.row_major_offset(index)]
    }




    /**
     * Swap in a new data buffer of the same length, returning the old one
     * to the arena.
     */
    pub fn replace_data(&mut self, arena: &dyn Arena, data: Vec<f64>) {
        assert_eq!(data.len(), self.space.len(), "replacement data has the wrong length");
        arena.free(std::mem::replace(&mut self.data, data));
    }




    /**
     * Give this patch's buffer back to the arena.
     */
    pub fn release(self, arena: &dyn Arena) {
        arena.free(self.data)
    }

    fn validate_index(&self, index: CellIndex<DIM>) {
        if !self.space.contains(index) {
            panic!("index {} out of range on patch {}", index, self.space);
        }
    }
}
