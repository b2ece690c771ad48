//! Cross-reference tracker
//!
//! Session-scoped bookkeeping for one `output()` call:
//!
//! ```text
//! allocate()  -> fresh (N, 0) above every source object number
//! reference() -> remembers N G R until it is defined
//! emit()      -> writes "N G obj ... endobj", records its offset
//! flush()     -> re-emits untouched source objects still referenced
//! write_table -> xref section, returns offset of the "xref" keyword
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Write;

use lopdf::{Document, Object, ObjectId};
use tracing::trace;

use crate::error::{Result, RewriteError};
use crate::output::OutputStream;
use crate::serialize::write_indirect;

/// Generation of the free-list head (object 0)
const FREE_HEAD_GENERATION: u16 = 65535;

#[derive(Debug)]
pub struct XrefTracker {
    /// Next number handed out by `allocate`
    next_number: u32,
    /// Numbers synthesized during this session
    allocated: BTreeSet<u32>,
    /// Object number -> (generation, byte offset of "N G obj")
    recorded: BTreeMap<u32, (u16, u64)>,
    /// Referenced but not yet defined
    pending: BTreeSet<ObjectId>,
    /// Generations used by the source, for the free list
    source_generations: HashMap<u32, u16>,
}

impl XrefTracker {
    pub fn new(source: &Document) -> Self {
        let highest = source
            .objects
            .keys()
            .map(|id| id.0)
            .max()
            .unwrap_or(0)
            .max(source.max_id);
        Self {
            next_number: highest + 1,
            allocated: BTreeSet::new(),
            recorded: BTreeMap::new(),
            pending: BTreeSet::new(),
            source_generations: source.objects.keys().map(|&(n, g)| (n, g)).collect(),
        }
    }

    /// Fresh id for an object that does not exist in the source
    pub fn allocate(&mut self) -> ObjectId {
        let id = (self.next_number, 0);
        self.next_number += 1;
        self.allocated.insert(id.0);
        id
    }

    /// A reference only counts as resolved when number and generation match
    pub fn reference(&mut self, id: ObjectId) {
        if !self.is_recorded(id) {
            self.pending.insert(id);
        }
    }

    pub fn is_pending(&self, id: ObjectId) -> bool {
        self.pending.contains(&id)
    }

    pub fn is_recorded(&self, id: ObjectId) -> bool {
        matches!(self.recorded.get(&id.0), Some((gen, _)) if *gen == id.1)
    }

    pub fn offset(&self, id: ObjectId) -> Option<u64> {
        match self.recorded.get(&id.0) {
            Some(&(gen, offset)) if gen == id.1 => Some(offset),
            _ => None,
        }
    }

    /// Store the offset at which the definition of `id` begins
    pub fn record(&mut self, id: ObjectId, offset: u64) -> Result<()> {
        if self.recorded.contains_key(&id.0) {
            return Err(RewriteError::DuplicateObject(id.0, id.1));
        }
        self.recorded.insert(id.0, (id.1, offset));
        self.pending.remove(&id);
        Ok(())
    }

    /// Serialize `obj` as the definition of `id` and record where it landed
    pub fn emit<W: Write>(
        &mut self,
        out: &mut OutputStream<W>,
        id: ObjectId,
        obj: &Object,
    ) -> Result<u64> {
        if self.recorded.contains_key(&id.0) {
            return Err(RewriteError::DuplicateObject(id.0, id.1));
        }
        let mut buf = Vec::new();
        write_indirect(&mut buf, id, obj, self);
        let offset = out.write(&buf)?;
        self.record(id, offset)?;
        trace!(object = id.0, generation = id.1, offset, "emitted object");
        Ok(offset)
    }

    /// Re-emit every referenced source object that nothing rewrote.
    ///
    /// Runs until no reference is left pending, so objects reachable only
    /// through flushed objects are copied too. Returns how many were copied.
    pub fn flush<W: Write>(
        &mut self,
        out: &mut OutputStream<W>,
        source: &Document,
    ) -> Result<usize> {
        let mut flushed = 0;
        loop {
            let candidates: Vec<ObjectId> = self
                .pending
                .iter()
                .filter(|id| !self.allocated.contains(&id.0))
                .copied()
                .collect();
            if candidates.is_empty() {
                break;
            }
            for id in candidates {
                if self.recorded.contains_key(&id.0) {
                    // another generation of this number was already written
                    return Err(RewriteError::DanglingReference(id.0, id.1));
                }
                let obj = source
                    .objects
                    .get(&id)
                    .ok_or(RewriteError::DanglingReference(id.0, id.1))?;
                self.emit(out, id, obj)?;
                flushed += 1;
            }
        }
        trace!(flushed, "flushed source objects");
        Ok(flushed)
    }

    /// The `/Size` value: one past the highest object number in use
    pub fn size(&self) -> u32 {
        let highest_recorded = self.recorded.keys().next_back().map_or(0, |n| n + 1);
        self.next_number.max(highest_recorded)
    }

    /// Write the cross-reference section and return the offset of `xref`.
    ///
    /// Every number below `size()` gets a line; numbers never defined are
    /// chained into the free list headed by object 0.
    pub fn write_table<W: Write>(&mut self, out: &mut OutputStream<W>) -> Result<u64> {
        if let Some(&number) = self
            .allocated
            .iter()
            .find(|&&n| !self.recorded.contains_key(&n))
        {
            return Err(RewriteError::UnwrittenObject(number, 0));
        }
        if let Some(&(number, generation)) = self.pending.iter().next() {
            return Err(RewriteError::DanglingReference(number, generation));
        }

        let size = self.size();
        let free: Vec<u32> = (1..size)
            .filter(|n| !self.recorded.contains_key(n))
            .collect();
        let next_free: HashMap<u32, u32> = free
            .iter()
            .enumerate()
            .map(|(i, &n)| (n, free.get(i + 1).copied().unwrap_or(0)))
            .collect();

        let mut table = String::with_capacity(32 + size as usize * 20);
        table.push_str(&format!("xref\n0 {}\n", size));
        table.push_str(&format!(
            "{:010} {:05} f \n",
            free.first().copied().unwrap_or(0),
            FREE_HEAD_GENERATION
        ));
        for number in 1..size {
            match self.recorded.get(&number) {
                Some(&(generation, offset)) => {
                    table.push_str(&format!("{:010} {:05} n \n", offset, generation));
                }
                None => {
                    let generation = self
                        .source_generations
                        .get(&number)
                        .map_or(1, |g| g.saturating_add(1).min(FREE_HEAD_GENERATION));
                    table.push_str(&format!(
                        "{:010} {:05} f \n",
                        next_free.get(&number).copied().unwrap_or(0),
                        generation
                    ));
                }
            }
        }

        let offset = out.write(table.as_bytes())?;
        Ok(offset)
    }

    /// Forget everything; the next allocation restarts above the source
    pub fn clear(&mut self, source: &Document) {
        *self = Self::new(source);
    }
}
