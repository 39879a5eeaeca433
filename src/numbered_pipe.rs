use std::collections::VecDeque;
use std::os::unix::io::RawFd;

use libc::pid_t;

/// Ring size for a session's numbered-pipe table — a hard limit on how many
/// lines ahead a `|N`/`!N` disposition may target.
pub const RING_SIZE: usize = 2000;

/// One slot of a session's numbered-pipe ring: a held-open pipe (if
/// latched) and the queue of child pids whose stdout feeds it.
///
/// Unlike the reference implementation's raw fd-table (which overloads the
/// literal values `0`/`1` as "use stdin"/"use stdout" sentinels), latching
/// is represented directly as `Option<(read, write)>` — the caller resolves
/// the unlatched case to the session's own socket fd explicitly, rather
/// than relying on fd-number coincidence.
#[derive(Debug, Default)]
pub struct NumberedPipeSlot {
    pipe: Option<(RawFd, RawFd)>,
    pub pids: VecDeque<pid_t>,
}

impl NumberedPipeSlot {
    pub fn is_latched(&self) -> bool {
        self.pipe.is_some()
    }

    pub fn read_fd(&self) -> Option<RawFd> {
        self.pipe.map(|(r, _)| r)
    }

    pub fn write_fd(&self) -> Option<RawFd> {
        self.pipe.map(|(_, w)| w)
    }

    pub fn latch(&mut self, read_fd: RawFd, write_fd: RawFd) {
        self.pipe = Some((read_fd, write_fd));
    }

    /// Close any real pipe fds held here and drop back to the unlatched state.
    pub fn close_and_reset(&mut self) {
        if let Some((read_fd, write_fd)) = self.pipe.take() {
            unsafe {
                libc::close(read_fd);
                libc::close(write_fd);
            }
        }
    }
}

/// A session's fixed 2000-slot numbered-pipe ring.
pub struct NumberedPipeTable {
    slots: Vec<NumberedPipeSlot>,
}

impl NumberedPipeTable {
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(RING_SIZE);
        slots.resize_with(RING_SIZE, NumberedPipeSlot::default);
        NumberedPipeTable { slots }
    }

    pub fn get(&self, idx: u16) -> &NumberedPipeSlot {
        &self.slots[idx as usize % RING_SIZE]
    }

    pub fn get_mut(&mut self, idx: u16) -> &mut NumberedPipeSlot {
        &mut self.slots[idx as usize % RING_SIZE]
    }

    /// Merge `src`'s pending pid queue into the front of `dst`'s, then clear `src`'s.
    /// No-op if `src == dst`.
    pub fn carry_forward(&mut self, src: u16, dst: u16) {
        let src_idx = src as usize % RING_SIZE;
        let dst_idx = dst as usize % RING_SIZE;
        if src_idx == dst_idx {
            return;
        }
        let carried: Vec<pid_t> = self.slots[src_idx].pids.drain(..).collect();
        for pid in carried.into_iter().rev() {
            self.slots[dst_idx].pids.push_front(pid);
        }
    }

    /// Close any real pipe fds still open across the whole table — used on
    /// session teardown.
    pub fn close_all(&mut self) {
        for slot in &mut self.slots {
            slot.close_and_reset();
            slot.pids.clear();
        }
    }
}

impl Default for NumberedPipeTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_slot_is_not_latched() {
        let table = NumberedPipeTable::new();
        assert!(!table.get(0).is_latched());
        assert_eq!(table.get(0).read_fd(), None);
    }

    #[test]
    fn latch_reports_fds() {
        let mut table = NumberedPipeTable::new();
        table.get_mut(7).latch(10, 11);
        assert!(table.get(7).is_latched());
        assert_eq!(table.get(7).read_fd(), Some(10));
        assert_eq!(table.get(7).write_fd(), Some(11));
    }

    #[test]
    fn carry_forward_merges_and_clears() {
        let mut table = NumberedPipeTable::new();
        table.get_mut(5).pids.push_back(100);
        table.get_mut(5).pids.push_back(101);
        table.get_mut(8).pids.push_back(200);

        table.carry_forward(5, 8);

        assert!(table.get(5).pids.is_empty());
        assert_eq!(
            table.get(8).pids.iter().copied().collect::<Vec<_>>(),
            vec![100, 101, 200]
        );
    }

    #[test]
    fn ring_wraps_modulo_2000() {
        let mut table = NumberedPipeTable::new();
        table.get_mut(2005).pids.push_back(42);
        assert_eq!(table.get(5).pids.front(), Some(&42));
    }

    #[test]
    fn carry_forward_same_index_is_noop() {
        let mut table = NumberedPipeTable::new();
        table.get_mut(3).pids.push_back(7);
        table.carry_forward(3, 3);
        assert_eq!(table.get(3).pids.len(), 1);
    }
}
