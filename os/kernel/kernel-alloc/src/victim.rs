//! # Victim Selection
//!
//! One revolution over the frame table, starting at a rotating cursor:
//!
//! 1. an `Idle` frame is taken on sight,
//! 2. a resident frame carrying the force-evict marker is taken on sight,
//! 3. otherwise the `User` frame with the smallest history wins; on ties the
//!    first one in scan order is kept.
//!
//! `Kernel` and `SwappedOut` frames are never candidates by themselves. When
//! the chosen frame sits exactly at the cursor, the cursor moves one step so
//! repeated calls do not keep hammering the same slot.

use crate::frame_table::{FrameState, FrameTable, Frames};

impl<const N: usize> Frames<N> {
    /// Pick a reclaim candidate. Must be called with the table lock held,
    /// which `&mut self` already guarantees.
    pub(crate) fn select_victim(&mut self) -> Option<usize> {
        if N == 0 {
            return None;
        }

        let start = self.victim_cursor % N;
        let mut oldest: Option<(usize, u64)> = None;
        let mut on_sight = None;

        for step in 0..N {
            let index = (start + step) % N;
            let frame = self.get(index);
            match frame.state() {
                FrameState::Idle => {
                    on_sight = Some(index);
                    break;
                }
                state if frame.force_evict() && state.is_resident() => {
                    on_sight = Some(index);
                    break;
                }
                FrameState::User => {
                    if oldest.is_none_or(|(_, history)| frame.history() < history) {
                        oldest = Some((index, frame.history()));
                    }
                }
                _ => {}
            }
        }

        let victim = on_sight.or(oldest.map(|(index, _)| index))?;
        if victim == start {
            self.victim_cursor = (start + 1) % N;
        }
        Some(victim)
    }
}

impl<const N: usize> FrameTable<N> {
    /// Name the frame the next eviction would take, without reserving it.
    ///
    /// The answer is stale as soon as the lock is dropped; the swap path runs
    /// selection and reservation under one lock hold instead.
    #[must_use]
    pub fn select_victim(&self) -> Option<usize> {
        let victim = self.lock().select_victim();
        match victim {
            Some(index) => log::trace!("victim scan: frame {index}"),
            None => log::trace!("victim scan: no candidate"),
        }
        victim
    }
}

#[cfg(test)]
mod tests {
    use crate::frame_table::{FrameState, FrameTable, TranslationRef};
    use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
    use kernel_vmem::TableId;

    const BASE: PhysicalAddress = PhysicalAddress::new(0x40_0000);
    const T: TableId = TableId::new(3);

    fn user_table<const N: usize>(histories: [u64; N]) -> FrameTable<N> {
        let table = FrameTable::<N>::new(BASE);
        table.init(FrameState::Kernel);
        for (i, history) in histories.into_iter().enumerate() {
            let va = VirtualAddress::new(0x1000 * (i as u64 + 1));
            table.attach_user(i, TranslationRef::new(T, va));
            table.set_history(i, history);
        }
        table
    }

    #[test]
    fn smallest_history_wins() {
        let table = user_table([7, 3, 9, 4]);
        assert_eq!(table.select_victim(), Some(1));
    }

    #[test]
    fn first_minimum_breaks_ties() {
        let table = user_table([5, 2, 2, 9]);
        assert_eq!(table.select_victim(), Some(1));
    }

    #[test]
    fn idle_beats_any_history() {
        let table = user_table([0, 0, u64::MAX, 0]);
        table.release(2, FrameState::Idle);
        assert_eq!(table.select_victim(), Some(2));
    }

    #[test]
    fn forced_kernel_frame_is_taken() {
        let table = FrameTable::<4>::new(BASE);
        table.init(FrameState::Kernel);
        assert_eq!(table.select_victim(), None);

        table.set_force_evict(3, true);
        assert_eq!(table.select_victim(), Some(3));
    }

    #[test]
    fn force_marker_on_free_frame_is_ignored() {
        let table = FrameTable::<2>::new(BASE);
        table.init(FrameState::Empty);
        table.set_force_evict(0, true);
        assert_eq!(table.select_victim(), None);
    }

    #[test]
    fn kernel_and_swapped_out_frames_are_not_candidates() {
        let table = FrameTable::<3>::new(BASE);
        table.init(FrameState::Kernel);
        table.release(1, FrameState::SwappedOut);
        assert_eq!(table.select_victim(), None);
    }

    #[test]
    fn cursor_moves_past_a_victim_at_the_start() {
        let table = user_table([1, 1, 1]);
        assert_eq!(table.select_victim(), Some(0));
        assert_eq!(table.select_victim(), Some(1));
        assert_eq!(table.select_victim(), Some(2));
        assert_eq!(table.select_victim(), Some(0));
    }

    #[test]
    fn cursor_stays_when_victim_is_elsewhere() {
        let table = user_table([8, 1, 8]);
        assert_eq!(table.select_victim(), Some(1));
        assert_eq!(table.lock().victim_cursor, 0);
    }
}
