use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Mutex;

use crate::error::Error;




/**
 * Source of the memory buffers backing field data. The only statistic the
 * driver asks for is `heap_space_used`, which is `Some` for arenas that keep
 * track of the heap space they hold.
 */
pub trait Arena: Send + Sync {
    /**
     * Return a zero-initialized buffer of `len` elements.
     */
    fn alloc(&self, len: usize) -> Vec<f64>;

    /**
     * Give a buffer back to the arena.
     */
    fn free(&self, buffer: Vec<f64>);

    /**
     * Bytes of heap space obtained by this arena (its high-water mark), or
     * `None` if the arena does not track it.
     */
    fn heap_space_used(&self) -> Option<usize>;
}




/**
 * The arena selected by the `fab.arena` parameter.
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArenaKind {
    Basic,
    Coalescing,
}

impl FromStr for ArenaKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "basic" => Ok(ArenaKind::Basic),
            "coalescing" => Ok(ArenaKind::Coalescing),
            _ => Err(Error::BadParameter { name: "fab.arena".to_string(), value: s.to_string() }),
        }
    }
}

impl Default for ArenaKind {
    fn default() -> Self {
        ArenaKind::Coalescing
    }
}

impl ArenaKind {
    pub fn build(self) -> Box<dyn Arena> {
        match self {
            ArenaKind::Basic => Box::new(BasicArena),
            ArenaKind::Coalescing => Box::new(CoalescingArena::new()),
        }
    }
}




/**
 * Allocates straight from the heap, and keeps no statistics.
 */
pub struct BasicArena;

impl Arena for BasicArena {
    fn alloc(&self, len: usize) -> Vec<f64> {
        vec![0.0; len]
    }

    fn free(&self, _buffer: Vec<f64>) {}

    fn heap_space_used(&self) -> Option<usize> {
        None
    }
}




/**
 * An arena which holds on to freed buffers and hands them out again for
 * requests of the same or smaller size. Heap space is only obtained when no
 * free buffer fits, so the total it has obtained is the high-water mark of
 * the memory required by its clients.
 */
pub struct CoalescingArena {
    state: Mutex<CoalescingState>,
}

#[derive(Default)]
struct CoalescingState {
    free_list: BTreeMap<usize, Vec<Vec<f64>>>,
    heap_bytes: usize,
}




// ============================================================================
impl CoalescingArena {

    pub fn new() -> Self {
        Self { state: Mutex::new(CoalescingState::default()) }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CoalescingState> {
        // A panic while the lock was held cannot leave the free list torn.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for CoalescingArena {
    fn default() -> Self {
        Self::new()
    }
}

impl Arena for CoalescingArena {
    fn alloc(&self, len: usize) -> Vec<f64> {
        let mut state = self.lock();

        let reusable = state.free_list.range(len..).find(|(_, v)| !v.is_empty()).map(|(&k, _)| k);

        if let Some(mut buffer) = reusable.and_then(|k| state.free_list.get_mut(&k).and_then(Vec::pop)) {
            buffer.clear();
            buffer.resize(len, 0.0);
            return buffer;
        }
        state.heap_bytes += len * std::mem::size_of::<f64>();
        vec![0.0; len]
    }

    fn free(&self, buffer: Vec<f64>) {
        if buffer.capacity() > 0 {
            self.lock().free_list.entry(buffer.capacity()).or_default().push(buffer)
        }
    }

    fn heap_space_used(&self) -> Option<usize> {
        Some(self.lock().heap_bytes)
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::{Arena, ArenaKind, BasicArena, CoalescingArena};

    #[test]
    fn basic_arena_reports_nothing() {
        assert_eq!(BasicArena.heap_space_used(), None);
        assert_eq!(ArenaKind::Basic.build().heap_space_used(), None);
    }

    #[test]
    fn coalescing_arena_reuses_freed_buffers() {
        let arena = CoalescingArena::new();
        let a = arena.alloc(100);
        let b = arena.alloc(50);
        assert_eq!(arena.heap_space_used(), Some(150 * 8));

        arena.free(a);
        let c = arena.alloc(80);
        assert_eq!(c.len(), 80);
        assert!(c.iter().all(|&x| x == 0.0));
        assert_eq!(arena.heap_space_used(), Some(150 * 8));

        arena.free(b);
        arena.free(c);
        arena.alloc(200);
        assert_eq!(arena.heap_space_used(), Some(350 * 8));
    }

    #[test]
    fn arena_kind_parses() {
        assert_eq!("coalescing".parse::<ArenaKind>().unwrap(), ArenaKind::Coalescing);
        assert_eq!("basic".parse::<ArenaKind>().unwrap(), ArenaKind::Basic);
        assert!("pooled".parse::<ArenaKind>().is_err());
        assert_eq!(ArenaKind::default(), ArenaKind::Coalescing);
    }
}
