use core::fmt;
use core::ops::{Index, IndexMut, Range};




/**
 * An n-dimensional integer cell index. Ordering is lexicographic over the
 * components, which is also the order in which an `IndexSpace` visits its
 * cells.
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellIndex<const DIM: usize>(pub [i64; DIM]);




// ============================================================================
impl<const DIM: usize> CellIndex<DIM> {

    pub fn new(components: [i64; DIM]) -> Self {
        Self(components)
    }

    pub fn components(&self) -> [i64; DIM] {
        self.0
    }

    /**
     * Determine whether every component of this index is less than or equal
     * to the corresponding component of another one.
     */
    pub fn all_le(&self, other: &Self) -> bool {
        self.0.iter().zip(other.0.iter()).all(|(a, b)| a <= b)
    }

    fn map<F: Fn(i64) -> i64>(&self, f: F) -> Self {
        let mut result = self.0;
        for x in result.iter_mut() {
            *x = f(*x)
        }
        Self(result)
    }

    fn zip_with<F: Fn(i64, i64) -> i64>(&self, other: &Self, f: F) -> Self {
        let mut result = self.0;
        for (x, y) in result.iter_mut().zip(other.0.iter()) {
            *x = f(*x, *y)
        }
        Self(result)
    }
}

impl<const DIM: usize> Index<usize> for CellIndex<DIM> {
    type Output = i64;

    fn index(&self, axis: usize) -> &i64 {
        &self.0[axis]
    }
}

impl<const DIM: usize> IndexMut<usize> for CellIndex<DIM> {
    fn index_mut(&mut self, axis: usize) -> &mut i64 {
        &mut self.0[axis]
    }
}

impl<const DIM: usize> From<[i64; DIM]> for CellIndex<DIM> {
    fn from(components: [i64; DIM]) -> Self {
        Self(components)
    }
}

impl<const DIM: usize> fmt::Display for CellIndex<DIM> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "(")?;
        for (n, x) in self.0.iter().enumerate() {
            if n > 0 {
                write!(fmt, ",")?;
            }
            write!(fmt, "{}", x)?;
        }
        write!(fmt, ")")
    }
}




/**
 * Represents a rectangular region in a discrete index space (a box). Both
 * corners are inclusive, so a box always contains at least one cell.
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct IndexSpace<const DIM: usize> {
    lo: CellIndex<DIM>,
    hi: CellIndex<DIM>,
}




/**
 * Describes a rectangular index space. The index type is signed 64-bit integer.
 */
impl<const DIM: usize> IndexSpace<DIM> {


    pub fn new(lo: CellIndex<DIM>, hi: CellIndex<DIM>) -> Self {
        assert!(
            lo.all_le(&hi),
            "index space has negative volume: {} {}", lo, hi);

        Self { lo, hi }
    }


    /**
     * Construct an index space from its inclusive corner components.
     */
    pub fn from_corners(lo: [i64; DIM], hi: [i64; DIM]) -> Self {
        Self::new(CellIndex(lo), CellIndex(hi))
    }


    /**
     * Return the minimum index (inclusive).
     */
    pub fn small_end(&self) -> CellIndex<DIM> {
        self.lo
    }


    /**
     * Return the maximum index (inclusive).
     */
    pub fn big_end(&self) -> CellIndex<DIM> {
        self.hi
    }


    /**
     * Return the number of indexes on each axis.
     */
    pub fn dim(&self) -> [usize; DIM] {
        let mut result = [0; DIM];
        for (axis, n) in result.iter_mut().enumerate() {
            *n = (self.hi[axis] - self.lo[axis] + 1) as usize
        }
        result
    }


    /**
     * Return the number of elements in this index space. This is never zero.
     */
    pub fn len(&self) -> usize {
        self.dim().iter().product()
    }


    /**
     * Determine whether this index space contains the given index.
     */
    pub fn contains(&self, index: CellIndex<DIM>) -> bool {
        self.lo.all_le(&index) && index.all_le(&self.hi)
    }


    /**
     * Determine whether another index space is a subset of this one.
     */
    pub fn contains_space(&self, other: &Self) -> bool {
        self.contains(other.lo) && self.contains(other.hi)
    }


    /**
     * Expand this index space by the given number of elements on each axis.
     */
    pub fn extend_all(&self, delta: i64) -> Self {
        Self::new(self.lo.map(|x| x - delta), self.hi.map(|x| x + delta))
    }


    /**
     * Return the index space covering the same region at a finer level,
     * where each cell becomes `ratio` cells on every axis.
     */
    pub fn refine(&self, ratio: i64) -> Self {
        assert!(ratio > 0, "refinement ratio must be positive");
        Self::new(self.lo.map(|x| x * ratio), self.hi.map(|x| x * ratio + ratio - 1))
    }


    /**
     * Return the smallest coarse index space whose refinement by `ratio`
     * covers this one.
     */
    pub fn coarsen(&self, ratio: i64) -> Self {
        assert!(ratio > 0, "refinement ratio must be positive");
        Self::new(
            self.lo.map(|x| x.div_euclid(ratio)),
            self.hi.map(|x| x.div_euclid(ratio)))
    }


    /**
     * Return the linear offset for the given index, in a row-major memory
     * buffer aligned with the start of this index space.
     */
    pub fn row_major_offset(&self, index: CellIndex<DIM>) -> usize {
        let dim = self.dim();
        let mut offset = 0;

        for axis in 0..DIM {
            offset = offset * dim[axis] + (index[axis] - self.lo[axis]) as usize
        }
        offset
    }


    /**
     * Advance `cell` to its successor in the traversal order (row-major, the
     * final axis increases fastest). Returns `false`, leaving `cell` one past
     * the high corner on the first axis, once the traversal is exhausted.
     */
    pub fn next(&self, cell: &mut CellIndex<DIM>) -> bool {
        for axis in (0..DIM).rev() {
            if cell[axis] < self.hi[axis] {
                cell[axis] += 1;
                return true;
            }
            if axis == 0 {
                cell[axis] = self.hi[axis] + 1;
            } else {
                cell[axis] = self.lo[axis];
            }
        }
        false
    }


    /**
     * Return an iterator which traverses the index space in row-major order
     * (C-like; the final index increases fastest).
     */
    pub fn iter(&self) -> CellIter<DIM> {
        CellIter { space: *self, cursor: Some(self.lo) }
    }


    /**
     * Return the smallest index space containing all of the given cells, or
     * `None` if there are no cells.
     */
    pub fn bounding<I>(cells: I) -> Option<Self>
    where
        I: IntoIterator<Item = CellIndex<DIM>>
    {
        cells.into_iter().fold(None, |acc: Option<Self>, c| match acc {
            None => Some(Self { lo: c, hi: c }),
            Some(b) => Some(Self {
                lo: b.lo.zip_with(&c, i64::min),
                hi: b.hi.zip_with(&c, i64::max),
            }),
        })
    }
}




/**
 * Iterator over the cells of an `IndexSpace`, driven by `IndexSpace::next`.
 */
pub struct CellIter<const DIM: usize> {
    space: IndexSpace<DIM>,
    cursor: Option<CellIndex<DIM>>,
}

impl<const DIM: usize> Iterator for CellIter<DIM> {
    type Item = CellIndex<DIM>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.cursor?;
        let mut successor = current;

        self.cursor = if self.space.next(&mut successor) {
            Some(successor)
        } else {
            None
        };
        Some(current)
    }
}

impl<'a, const DIM: usize> IntoIterator for &'a IndexSpace<DIM> {
    type Item = CellIndex<DIM>;
    type IntoIter = CellIter<DIM>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}




// ============================================================================
impl<const DIM: usize> fmt::Display for IndexSpace<DIM> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "({} {})", self.lo, self.hi)
    }
}




/**
 * Less imposing factory function to construct a 2D IndexSpace object from a
 * pair of half-open ranges.
 */
pub fn range2d(di: Range<i64>, dj: Range<i64>) -> IndexSpace<2> {
    assert!(
        di.start < di.end && dj.start < dj.end,
        "index space has negative volume");

    IndexSpace::from_corners([di.start, dj.start], [di.end - 1, dj.end - 1])
}
