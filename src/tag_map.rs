use core::iter::FromIterator;
use core::ops::Index;
use crate::index_space::{CellIndex, IndexSpace};




/**
 * A per-cell refinement flag. One distinguished value, `Tag::CLEAR`, means
 * the cell is not flagged; every other value means it is. Producers may use
 * `BUFFER` and `SET` to tell their own tags apart, but nothing in this crate
 * reads more than the clear / not-clear distinction.
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Tag(u8);




// ============================================================================
impl Tag {
    pub const CLEAR: Tag = Tag(0);
    pub const BUFFER: Tag = Tag(1);
    pub const SET: Tag = Tag(2);

    pub fn from_raw(value: u8) -> Self {
        Self(value)
    }

    pub fn is_clear(self) -> bool {
        self == Self::CLEAR
    }

    pub fn is_tagged(self) -> bool {
        !self.is_clear()
    }
}

impl Default for Tag {
    fn default() -> Self {
        Self::CLEAR
    }
}




/**
 * A mapping from every cell of an index space to a `Tag`. The domain of the
 * map is exactly the cells of its box; accessing a cell outside the box is a
 * programming error and panics.
 */
#[derive(Clone, Debug)]
pub struct TagMap<const DIM: usize> {
    space: IndexSpace<DIM>,
    tags: Vec<Tag>,
}




// ============================================================================
impl<const DIM: usize> TagMap<DIM> {

    /**
     * Create a tag map over the given space with every cell clear.
     */
    pub fn new(space: IndexSpace<DIM>) -> Self {
        Self {
            space,
            tags: vec![Tag::CLEAR; space.len()],
        }
    }

    /**
     * Generate a tag map covering the given space, with tags defined from a
     * closure.
     */
    pub fn from_function<F>(space: IndexSpace<DIM>, f: F) -> Self
    where
        F: Fn(CellIndex<DIM>) -> Tag
    {
        Self {
            space,
            tags: space.iter().map(f).collect(),
        }
    }

    pub fn space(&self) -> &IndexSpace<DIM> {
        &self.space
    }

    pub fn get(&self, index: CellIndex<DIM>) -> Tag {
        self.validate_index(index);
        self.tags[self.space.row_major_offset(index)]
    }

    pub fn set(&mut self, index: CellIndex<DIM>, tag: Tag) {
        self.validate_index(index);
        let offset = self.space.row_major_offset(index);
        self.tags[offset] = tag;
    }

    /**
     * Iterate over the cells and their tags, in the traversal order of the
     * underlying index space.
     */
    pub fn iter(&self) -> impl Iterator<Item = (CellIndex<DIM>, Tag)> + '_ {
        self.space.iter().zip(self.tags.iter().copied())
    }

    /**
     * Iterate over the cells which are not clear.
     */
    pub fn tagged_cells(&self) -> impl Iterator<Item = CellIndex<DIM>> + '_ {
        self.iter().filter(|(_, t)| t.is_tagged()).map(|(c, _)| c)
    }

    pub fn num_tagged(&self) -> usize {
        self.tags.iter().filter(|t| t.is_tagged()).count()
    }

    fn validate_index(&self, index: CellIndex<DIM>) {
        if !self.space.contains(index) {
            panic!("index {} out of range on tag map {}", index, self.space);
        }
    }
}




/**
 * An ordered collection of tag maps, one for each grid patch of a refinement
 * level.
 */
#[derive(Clone, Debug)]
pub struct TagMapArray<const DIM: usize> {
    maps: Vec<TagMap<DIM>>,
}




// ============================================================================
impl<const DIM: usize> TagMapArray<DIM> {

    pub fn new() -> Self {
        Self { maps: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&TagMap<DIM>> {
        self.maps.get(i)
    }

    pub fn push(&mut self, map: TagMap<DIM>) {
        self.maps.push(map)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TagMap<DIM>> {
        self.maps.iter()
    }

    /**
     * Return the boxes of the tag maps, in collection order.
     */
    pub fn boxes(&self) -> Vec<IndexSpace<DIM>> {
        self.maps.iter().map(|m| *m.space()).collect()
    }

    pub fn num_tagged(&self) -> usize {
        self.maps.iter().map(TagMap::num_tagged).sum()
    }
}

impl<const DIM: usize> Default for TagMapArray<DIM> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const DIM: usize> Index<usize> for TagMapArray<DIM> {
    type Output = TagMap<DIM>;

    fn index(&self, i: usize) -> &TagMap<DIM> {
        &self.maps[i]
    }
}

impl<const DIM: usize> FromIterator<TagMap<DIM>> for TagMapArray<DIM> {
    fn from_iter<I: IntoIterator<Item = TagMap<DIM>>>(iter: I) -> Self {
        Self { maps: iter.into_iter().collect() }
    }
}

impl<'a, const DIM: usize> IntoIterator for &'a TagMapArray<DIM> {
    type Item = &'a TagMap<DIM>;
    type IntoIter = std::slice::Iter<'a, TagMap<DIM>>;

    fn into_iter(self) -> Self::IntoIter {
        self.maps.iter()
    }
}
