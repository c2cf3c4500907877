//! # Frame Table
//!
//! Metadata for every managed physical frame: its state, the translation entry
//! currently mapping it, the table that owns that mapping, and its aging
//! history.
//!
//! Frame `i` lives at `base + i · PAGE_SIZE`; the mapping is fixed for the
//! life of the system. Entries are created once and only ever cycle through
//! states:
//!
//! ```text
//!            free()                 allocate() / claim()
//!   ┌──────────────────── Empty ───────────────────────┐
//!   │                                                  ▼
//! Kernel ◄──── claim() ──── SwappedOut ◄── swap-out ── Kernel / User / Idle
//!   │                                                  ▲
//!   └──────────── attach_user() ──────────► User ──────┘
//! ```
//!
//! All access is serialized by one table-wide [`SpinLock`]. Every operation
//! validates its index; an out-of-range index means the caller computed a
//! frame number from a corrupted address and is fatal.

use kernel_info::memory::PAGE_SIZE;
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use kernel_sync::{SpinLock, SpinLockGuard};
use kernel_vmem::TableId;

/// History value given to a frame that was just handed out.
///
/// All ones ranks the frame as most recently used, so it is not picked again
/// before the aging clock had a chance to observe it.
pub const HISTORY_FRESH: u64 = u64::MAX;

/// Lifecycle state of a physical frame.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum FrameState {
    /// Unused since boot or since the last `free`; sits on the free list.
    Empty,
    /// Holds nothing anyone needs; reclaimable at zero cost.
    Idle,
    /// Owned by the kernel. Never evicted unless force-marked.
    Kernel,
    /// Owned by a process mapping. The normal eviction candidate.
    User,
    /// Content was written to swap; the frame is reserved for whoever evicted it.
    SwappedOut,
}

impl FrameState {
    /// Owned and backing live data (`Kernel` or `User`).
    #[inline]
    #[must_use]
    pub const fn is_resident(self) -> bool {
        matches!(self, Self::Kernel | Self::User)
    }
}

/// Back-reference from a frame to the translation entry that maps it.
///
/// This is a lookup key, not a pointer: the entry is re-resolved through the
/// page-table walker each time it is needed, so a table that changed
/// underneath cannot leave a dangling reference behind.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct TranslationRef {
    pub table: TableId,
    pub page: VirtualAddress,
}

impl TranslationRef {
    /// Reference the entry mapping the page that contains `va`.
    #[inline]
    #[must_use]
    pub const fn new(table: TableId, va: VirtualAddress) -> Self {
        Self {
            table,
            page: va.page_base(),
        }
    }
}

/// One frame's metadata.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Frame {
    state: FrameState,
    translation: Option<TranslationRef>,
    owner: Option<TableId>,
    history: u64,
    force_evict: bool,
    /// Held by the swap path from victim selection until `claim` or `restore`.
    reserved: bool,
}

impl Frame {
    const EMPTY: Self = Self::new(FrameState::Empty);

    const fn new(state: FrameState) -> Self {
        Self {
            state,
            translation: None,
            owner: None,
            history: 0,
            force_evict: false,
            reserved: false,
        }
    }

    #[must_use]
    pub const fn state(&self) -> FrameState {
        self.state
    }

    #[must_use]
    pub const fn translation(&self) -> Option<TranslationRef> {
        self.translation
    }

    #[must_use]
    pub const fn owning_table(&self) -> Option<TableId> {
        self.owner
    }

    #[must_use]
    pub const fn history(&self) -> u64 {
        self.history
    }

    #[must_use]
    pub const fn force_evict(&self) -> bool {
        self.force_evict
    }

    /// Taken by an eviction that has not yet handed the frame on.
    #[must_use]
    pub const fn is_reserved(&self) -> bool {
        self.reserved
    }

    pub(crate) const fn set_history(&mut self, history: u64) {
        self.history = history;
    }
}

/// Per-state frame counts.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct FrameCensus {
    pub empty: usize,
    pub idle: usize,
    pub kernel: usize,
    pub user: usize,
    pub swapped_out: usize,
}

impl FrameCensus {
    #[must_use]
    pub const fn total(&self) -> usize {
        self.empty + self.idle + self.kernel + self.user + self.swapped_out
    }
}

/// What a frame looked like before the swap path reserved it.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Reservation {
    state: FrameState,
    force_evict: bool,
    pub(crate) translation: Option<TranslationRef>,
}

/// The lock-protected part of the table.
pub(crate) struct Frames<const N: usize> {
    entries: [Frame; N],
    /// Where the next victim scan starts.
    pub(crate) victim_cursor: usize,
}

impl<const N: usize> Frames<N> {
    #[inline]
    #[track_caller]
    pub(crate) fn get(&self, index: usize) -> &Frame {
        match self.entries.get(index) {
            Some(frame) => frame,
            None => panic!("frame index {} out of range (0..{})", index, N),
        }
    }

    #[inline]
    #[track_caller]
    pub(crate) fn get_mut(&mut self, index: usize) -> &mut Frame {
        match self.entries.get_mut(index) {
            Some(frame) => frame,
            None => panic!("frame index {} out of range (0..{})", index, N),
        }
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Frame> {
        self.entries.iter_mut()
    }

    /// Mark a chosen victim non-reclaimable while its content is in flight.
    pub(crate) fn reserve(&mut self, index: usize) -> Reservation {
        let frame = self.get_mut(index);
        let prior = Reservation {
            state: frame.state,
            force_evict: frame.force_evict,
            translation: frame.translation,
        };
        frame.state = FrameState::Kernel;
        frame.force_evict = false;
        frame.reserved = true;
        prior
    }

    /// Undo [`reserve`](Self::reserve).
    pub(crate) fn restore(&mut self, index: usize, prior: Reservation) {
        let frame = self.get_mut(index);
        frame.state = prior.state;
        frame.force_evict = prior.force_evict;
        frame.reserved = false;
    }

    /// Drop the frame's back-references ahead of reuse; returns the translation it had.
    pub(crate) fn detach(&mut self, index: usize) -> Option<TranslationRef> {
        let frame = self.get_mut(index);
        frame.owner = None;
        frame.history = HISTORY_FRESH;
        frame.translation.take()
    }
}

/// Registry of every managed physical frame.
pub struct FrameTable<const N: usize> {
    base: PhysicalAddress,
    frames: SpinLock<Frames<N>>,
}

impl<const N: usize> FrameTable<N> {
    /// A table for `N` frames starting at `base`, every frame `Empty`.
    ///
    /// # Panics
    /// If `base` is not page-aligned or the range overflows the address space.
    #[must_use]
    pub const fn new(base: PhysicalAddress) -> Self {
        assert!(base.is_page_aligned(), "frame base must be page-aligned");
        assert!(
            base.checked_add(N as u64 * PAGE_SIZE).is_some(),
            "frame range overflows"
        );
        Self {
            base,
            frames: SpinLock::new(Frames {
                entries: [Frame::EMPTY; N],
                victim_cursor: 0,
            }),
        }
    }

    /// Reset every frame to `initial` with zero history and no back-references.
    pub fn init(&self, initial: FrameState) {
        let mut frames = self.frames.lock();
        for frame in frames.iter_mut() {
            *frame = Frame::new(initial);
        }
        frames.victim_cursor = 0;
        log::debug!(
            "frame table: {} frames at {} marked {:?}",
            N,
            self.base,
            initial
        );
    }

    #[inline]
    pub(crate) fn lock(&self) -> SpinLockGuard<'_, Frames<N>> {
        self.frames.lock()
    }

    #[inline]
    #[must_use]
    pub const fn base(&self) -> PhysicalAddress {
        self.base
    }

    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// One past the last managed byte.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.base.as_u64() + N as u64 * PAGE_SIZE)
    }

    /// Frame index of the page containing `pa`, if it is managed here.
    #[must_use]
    pub const fn index_of(&self, pa: PhysicalAddress) -> Option<usize> {
        match pa.offset_from(self.base) {
            #[allow(clippy::cast_possible_truncation)]
            Some(offset) if offset / PAGE_SIZE < N as u64 => Some((offset / PAGE_SIZE) as usize),
            _ => None,
        }
    }

    /// Physical base address of frame `index`.
    ///
    /// # Panics
    /// If `index` is out of range.
    #[must_use]
    #[track_caller]
    pub const fn address_of(&self, index: usize) -> PhysicalAddress {
        assert!(index < N, "frame index out of range");
        PhysicalAddress::new(self.base.as_u64() + index as u64 * PAGE_SIZE)
    }

    /// Copy of frame `index`'s metadata.
    #[must_use]
    #[track_caller]
    pub fn snapshot(&self, index: usize) -> Frame {
        *self.lock().get(index)
    }

    #[must_use]
    #[track_caller]
    pub fn state(&self, index: usize) -> FrameState {
        self.lock().get(index).state
    }

    /// Set the state of frame `index`.
    ///
    /// # Panics
    /// If `index` is out of range, or the new state is not resident while the
    /// frame is still mapped. Use [`release`](Self::release) to leave residency.
    #[track_caller]
    pub fn set_state(&self, index: usize, state: FrameState) {
        let mut frames = self.lock();
        let frame = frames.get_mut(index);
        assert!(
            state.is_resident() || frame.translation.is_none(),
            "frame {index}: {state:?} while still mapped"
        );
        frame.state = state;
    }

    #[must_use]
    #[track_caller]
    pub fn translation(&self, index: usize) -> Option<TranslationRef> {
        self.lock().get(index).translation
    }

    /// Point frame `index` at the translation entry mapping it.
    ///
    /// # Panics
    /// If `index` is out of range, or a reference is installed on a frame that
    /// is not resident.
    #[track_caller]
    pub fn set_translation(&self, index: usize, translation: Option<TranslationRef>) {
        let mut frames = self.lock();
        let frame = frames.get_mut(index);
        assert!(
            translation.is_none() || frame.state.is_resident(),
            "frame {index}: mapping a {:?} frame",
            frame.state
        );
        frame.translation = translation;
    }

    #[must_use]
    #[track_caller]
    pub fn owning_table(&self, index: usize) -> Option<TableId> {
        self.lock().get(index).owner
    }

    #[track_caller]
    pub fn set_owning_table(&self, index: usize, table: Option<TableId>) {
        self.lock().get_mut(index).owner = table;
    }

    #[must_use]
    #[track_caller]
    pub fn history(&self, index: usize) -> u64 {
        self.lock().get(index).history
    }

    #[track_caller]
    pub fn set_history(&self, index: usize, history: u64) {
        self.lock().get_mut(index).history = history;
    }

    #[must_use]
    #[track_caller]
    pub fn force_evict(&self, index: usize) -> bool {
        self.lock().get(index).force_evict
    }

    /// Nominate frame `index` as a guaranteed eviction candidate.
    ///
    /// The marker is honored for resident frames only and is cleared once the
    /// frame is taken as a victim or released.
    #[track_caller]
    pub fn set_force_evict(&self, index: usize, force: bool) {
        self.lock().get_mut(index).force_evict = force;
    }

    /// Clear back-references, history and force marker, then enter `state`.
    #[track_caller]
    pub fn release(&self, index: usize, state: FrameState) {
        *self.lock().get_mut(index) = Frame::new(state);
    }

    /// Take frame `index` back from its owner on the way to the free list.
    ///
    /// Returns `false` if an eviction has reserved the frame. The frame then
    /// belongs to the swap path, which hands it to its own caller; it must not
    /// be zeroed or listed. Otherwise the frame is `Empty` on return.
    ///
    /// # Panics
    /// If the frame is already `Empty`.
    #[must_use = "a reserved frame must not be zeroed or listed"]
    #[track_caller]
    pub fn release_for_free(&self, index: usize) -> bool {
        let mut frames = self.lock();
        let frame = frames.get_mut(index);
        assert!(
            frame.state != FrameState::Empty,
            "frame {index}: already free"
        );
        if frame.reserved {
            return false;
        }
        *frame = Frame::EMPTY;
        true
    }

    /// Hand frame `index` to the kernel after it left the free list or the swap path.
    ///
    /// # Panics
    /// If the frame is neither `Empty` nor `SwappedOut`: anything else means
    /// the same frame is being handed out twice.
    #[track_caller]
    pub fn claim(&self, index: usize) {
        let mut frames = self.lock();
        let frame = frames.get_mut(index);
        assert!(
            matches!(frame.state, FrameState::Empty | FrameState::SwappedOut),
            "frame {index}: claimed while {:?}",
            frame.state
        );
        *frame = Frame {
            history: HISTORY_FRESH,
            ..Frame::new(FrameState::Kernel)
        };
    }

    /// Record that frame `index` now backs the user page `translation`.
    ///
    /// # Panics
    /// If the frame is not `Kernel` or `User`.
    #[track_caller]
    pub fn attach_user(&self, index: usize, translation: TranslationRef) {
        let mut frames = self.lock();
        let frame = frames.get_mut(index);
        assert!(
            frame.state.is_resident(),
            "frame {index}: attaching a user page to a {:?} frame",
            frame.state
        );
        frame.state = FrameState::User;
        frame.translation = Some(translation);
        frame.owner = Some(translation.table);
    }

    /// Count frames per state.
    #[must_use]
    pub fn census(&self) -> FrameCensus {
        let frames = self.lock();
        let mut census = FrameCensus::default();
        for frame in &frames.entries {
            let slot = match frame.state {
                FrameState::Empty => &mut census.empty,
                FrameState::Idle => &mut census.idle,
                FrameState::Kernel => &mut census.kernel,
                FrameState::User => &mut census.user,
                FrameState::SwappedOut => &mut census.swapped_out,
            };
            *slot += 1;
        }
        census
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: PhysicalAddress = PhysicalAddress::new(0x10_0000);
    const T: TableId = TableId::new(7);

    #[test]
    fn index_and_address_are_bijective() {
        let table = FrameTable::<8>::new(BASE);
        for i in 0..8 {
            let pa = table.address_of(i);
            assert_eq!(table.index_of(pa), Some(i));
            assert_eq!(table.index_of(pa + 0x123), Some(i));
        }
        assert_eq!(table.index_of(table.end()), None);
        assert_eq!(table.index_of(PhysicalAddress::new(0x0F_F000)), None);
    }

    #[test]
    fn init_marks_every_frame() {
        let table = FrameTable::<4>::new(BASE);
        table.init(FrameState::Kernel);
        assert_eq!(table.census().kernel, 4);
        assert_eq!(table.history(2), 0);
    }

    #[test]
    fn release_clears_back_references() {
        let table = FrameTable::<4>::new(BASE);
        table.init(FrameState::Kernel);
        table.attach_user(1, TranslationRef::new(T, VirtualAddress::new(0x4000)));
        table.set_history(1, 0xAA);
        table.set_force_evict(1, true);

        table.release(1, FrameState::Idle);

        let f = table.snapshot(1);
        assert_eq!(f.state(), FrameState::Idle);
        assert_eq!(f.translation(), None);
        assert_eq!(f.owning_table(), None);
        assert_eq!(f.history(), 0);
        assert!(!f.force_evict());
    }

    #[test]
    fn attach_user_sets_owner_from_translation() {
        let table = FrameTable::<2>::new(BASE);
        table.init(FrameState::Kernel);
        table.attach_user(0, TranslationRef::new(T, VirtualAddress::new(0x5123)));
        assert_eq!(table.state(0), FrameState::User);
        assert_eq!(table.owning_table(0), Some(T));
        assert_eq!(
            table.translation(0).map(|t| t.page),
            Some(VirtualAddress::new(0x5000))
        );
    }

    #[test]
    fn claim_marks_fresh_kernel_frame() {
        let table = FrameTable::<2>::new(BASE);
        table.init(FrameState::Empty);
        table.claim(1);
        assert_eq!(table.state(1), FrameState::Kernel);
        assert_eq!(table.history(1), HISTORY_FRESH);
    }

    #[test]
    #[should_panic(expected = "claimed while User")]
    fn claiming_a_live_frame_is_fatal() {
        let table = FrameTable::<2>::new(BASE);
        table.init(FrameState::User);
        table.claim(0);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn out_of_range_index_is_fatal() {
        let table = FrameTable::<2>::new(BASE);
        table.set_history(2, 1);
    }

    #[test]
    #[should_panic(expected = "while still mapped")]
    fn leaving_residency_while_mapped_is_fatal() {
        let table = FrameTable::<2>::new(BASE);
        table.init(FrameState::Kernel);
        table.attach_user(0, TranslationRef::new(T, VirtualAddress::new(0x1000)));
        table.set_state(0, FrameState::Empty);
    }

    #[test]
    fn reserve_and_restore_round_trip() {
        let table = FrameTable::<2>::new(BASE);
        table.init(FrameState::User);
        table.set_force_evict(0, true);

        let prior = table.lock().reserve(0);
        assert_eq!(table.state(0), FrameState::Kernel);
        assert!(!table.force_evict(0));
        assert!(table.snapshot(0).is_reserved());

        table.lock().restore(0, prior);
        assert_eq!(table.state(0), FrameState::User);
        assert!(table.force_evict(0));
        assert!(!table.snapshot(0).is_reserved());
    }

    #[test]
    fn reserved_frame_is_not_released_for_free() {
        let table = FrameTable::<2>::new(BASE);
        table.init(FrameState::User);
        let _prior = table.lock().reserve(1);

        assert!(!table.release_for_free(1));
        assert_eq!(table.state(1), FrameState::Kernel);
        assert!(table.snapshot(1).is_reserved());

        // The reservation ends with the claim; the frame is ordinary again.
        table.set_state(1, FrameState::SwappedOut);
        table.claim(1);
        assert!(!table.snapshot(1).is_reserved());
        assert!(table.release_for_free(1));
        assert_eq!(table.state(1), FrameState::Empty);
    }

    #[test]
    #[should_panic(expected = "already free")]
    fn releasing_an_empty_frame_is_fatal() {
        let table = FrameTable::<2>::new(BASE);
        table.init(FrameState::Empty);
        let _ = table.release_for_free(0);
    }

    #[test]
    #[should_panic(expected = "attaching a user page to a Empty frame")]
    fn attaching_to_a_free_frame_is_fatal() {
        let table = FrameTable::<2>::new(BASE);
        table.init(FrameState::Empty);
        table.attach_user(0, TranslationRef::new(T, VirtualAddress::new(0x2000)));
    }
}
