//! Read-only reporting over tag maps and box lists. These are debugging
//! aids: the reference engine calls them when `amr.print_tags` is set, and
//! the tests use the returned counts to check the tagging data model.
//!
//! Every function writes human-readable text to the given sink and returns
//! the number of tagged cells (or boxes) it reported.

use std::io::{self, Write};

use crate::index_space::IndexSpace;
use crate::tag_map::{TagMap, TagMapArray};

/// Visit every cell of the map's box in traversal order, calling `on_tagged`
/// for each cell that is not clear. Returns the number of such cells.
///
fn traverse<const DIM: usize, F>(map: &TagMap<DIM>, mut on_tagged: F) -> io::Result<u64>
where
    F: FnMut(&dyn std::fmt::Display) -> io::Result<()>,
{
    let space = map.space();
    let mut count = 0;
    let mut p = space.small_end();

    debug_assert!(space.small_end().all_le(&space.big_end()));

    loop {
        if map.get(p).is_tagged() {
            count += 1;
            on_tagged(&p)?;
        }
        if !space.next(&mut p) {
            break;
        }
    }
    Ok(count)
}

/// Print each tagged cell of a tag map, followed by the total.
///
pub fn print_tags<const DIM: usize, W: Write>(map: &TagMap<DIM>, out: &mut W) -> io::Result<u64> {
    writeln!(out, "TagMap: box = {}:", map.space())?;
    let count = traverse(map, |p| write!(out, "{} ", p))?;
    if count > 0 {
        writeln!(out)?;
    }
    writeln!(out, "Total tagged cells = {}", count)?;
    Ok(count)
}

/// Print only the number of tagged cells in a tag map.
///
pub fn count_tags<const DIM: usize, W: Write>(map: &TagMap<DIM>, out: &mut W) -> io::Result<u64> {
    let count = traverse(map, |_| Ok(()))?;
    writeln!(out, "Total tagged cells = {}", count)?;
    Ok(count)
}

/// Print the tagged cells of every entry in a tag map collection, with the
/// entry index and box, followed by the total over all entries.
///
pub fn print_tag_array<const DIM: usize, W: Write>(array: &TagMapArray<DIM>, out: &mut W) -> io::Result<u64> {
    let mut count = 0;

    writeln!(out, "TagMapArray:")?;

    for (i, map) in array.iter().enumerate() {
        writeln!(out, "\ti = {}, box = {}:", i, map.space())?;
        count += traverse(map, |p| write!(out, "{} ", p))?;
        writeln!(out)?;
    }
    writeln!(out, "Total tagged cells = {}", count)?;
    Ok(count)
}

/// Print only the total number of tagged cells over a tag map collection.
///
pub fn count_tag_array<const DIM: usize, W: Write>(array: &TagMapArray<DIM>, out: &mut W) -> io::Result<u64> {
    let mut count = 0;

    for map in array {
        count += traverse(map, |_| Ok(()))?;
    }
    writeln!(out, "Total tagged cells = {}", count)?;
    Ok(count)
}

/// Print a list of boxes, one per line.
///
pub fn print_box_array<const DIM: usize, W: Write>(boxes: &[IndexSpace<DIM>], out: &mut W) -> io::Result<u64> {
    writeln!(out, "BoxArray:")?;

    for (i, b) in boxes.iter().enumerate() {
        writeln!(out, "\ti = {}, box = {}", i, b)?;
    }
    writeln!(out, "Total boxes = {}", boxes.len())?;
    Ok(boxes.len() as u64)
}
