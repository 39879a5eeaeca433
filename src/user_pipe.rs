use std::collections::VecDeque;
use std::os::unix::io::RawFd;

use libc::pid_t;

pub const MAX_USERS: usize = 30;

/// One inter-session pipe, indexed `[producer][consumer]` in [`UserPipeMatrix`].
#[derive(Debug, Default)]
pub struct UserPipeSlot {
    pipe: Option<(RawFd, RawFd)>,
    pub pids: VecDeque<pid_t>,
}

impl UserPipeSlot {
    /// A real pipe exists only once it has been created by the producer.
    pub fn exists(&self) -> bool {
        self.pipe.is_some()
    }

    pub fn read_fd(&self) -> Option<RawFd> {
        self.pipe.map(|(r, _)| r)
    }

    pub fn write_fd(&self) -> Option<RawFd> {
        self.pipe.map(|(_, w)| w)
    }

    pub fn create(&mut self, read_fd: RawFd, write_fd: RawFd) {
        self.pipe = Some((read_fd, write_fd));
    }

    pub fn close_and_reset(&mut self) {
        if let Some((read_fd, write_fd)) = self.pipe.take() {
            unsafe {
                libc::close(read_fd);
                libc::close(write_fd);
            }
        }
    }
}

/// The 30x30 matrix of user-to-user pipes. Owned by the multiplexer, not by
/// sessions, so it survives independently of either endpoint's session
/// object until both sides have consumed it or one side's session is torn
/// down.
pub struct UserPipeMatrix {
    slots: Vec<Vec<UserPipeSlot>>,
}

impl UserPipeMatrix {
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(MAX_USERS);
        for _ in 0..MAX_USERS {
            let mut row = Vec::with_capacity(MAX_USERS);
            row.resize_with(MAX_USERS, UserPipeSlot::default);
            slots.push(row);
        }
        UserPipeMatrix { slots }
    }

    pub fn get(&self, producer: u8, consumer: u8) -> &UserPipeSlot {
        &self.slots[producer as usize][consumer as usize]
    }

    pub fn get_mut(&mut self, producer: u8, consumer: u8) -> &mut UserPipeSlot {
        &mut self.slots[producer as usize][consumer as usize]
    }

    /// Close and reset every pipe touching `user` — both where `user` is the
    /// producer and where it is the consumer. Called on session teardown.
    pub fn teardown_user(&mut self, user: u8) {
        let user = user as usize;
        for other in 0..MAX_USERS {
            self.slots[user][other].close_and_reset();
            self.slots[user][other].pids.clear();

            self.slots[other][user].close_and_reset();
            self.slots[other][user].pids.clear();
        }
    }
}

impl Default for UserPipeMatrix {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_slot_does_not_exist() {
        let m = UserPipeMatrix::new();
        assert!(!m.get(0, 1).exists());
    }

    #[test]
    fn create_reports_fds() {
        let mut m = UserPipeMatrix::new();
        m.get_mut(0, 1).create(5, 6);
        assert!(m.get(0, 1).exists());
        assert_eq!(m.get(0, 1).read_fd(), Some(5));
        assert_eq!(m.get(0, 1).write_fd(), Some(6));
    }

    #[test]
    fn teardown_clears_both_directions() {
        let mut m = UserPipeMatrix::new();
        m.get_mut(0, 1).pids.push_back(10);
        m.get_mut(2, 0).pids.push_back(20);

        m.teardown_user(0);

        assert!(m.get(0, 1).pids.is_empty());
        assert!(m.get(2, 0).pids.is_empty());
    }

    #[test]
    fn unrelated_pairs_survive_teardown() {
        let mut m = UserPipeMatrix::new();
        m.get_mut(3, 4).pids.push_back(99);
        m.teardown_user(0);
        assert_eq!(m.get(3, 4).pids.len(), 1);
    }
}
