mod common;

use common::{TABLE, machine, map_pages, user_page};
use kernel_alloc::{AllocError, FrameState};
use kernel_vmem::{PageMapping, PageTableWalker};

#[test]
fn idle_frame_is_reclaimed_before_any_user_frame() {
    let m = machine::<4>(4);
    let pas = map_pages(&m, 4);
    for &pa in &pas {
        m.frames().set_history(m.frames().index_of(pa).unwrap(), 0);
    }

    // Page 2 goes away but its frame is left around as idle.
    m.swap().paging().unmap(TABLE, user_page(2));
    let idle = m.frames().index_of(pas[2]).unwrap();
    m.frames().release(idle, FrameState::Idle);
    m.frames().set_history(idle, u64::MAX);

    assert_eq!(m.allocate().unwrap(), pas[2]);
    assert_eq!(m.swap().disk().writes(), 0);
    assert_eq!(m.swap().slots().occupied(), 0);
    assert_eq!(m.frames().state(idle), FrameState::Kernel);
}

#[test]
fn exhausted_swap_leaves_the_victim_untouched() {
    let m = machine::<2>(1);
    let pas = map_pages(&m, 2);
    let _kernel_frame = m.allocate().unwrap();

    // One user frame left, no slot left.
    let victim_pa = if m.swap().paging().mapping(TABLE, user_page(0)).unwrap().is_resident() {
        pas[0]
    } else {
        pas[1]
    };
    let index = m.frames().index_of(victim_pa).unwrap();
    m.frames().set_force_evict(index, true);
    m.frames().set_history(index, 0x1234);

    let frame_before = m.frames().snapshot(index);
    let page = frame_before.translation().unwrap().page;
    let entry_before = m.swap().paging().entry(TABLE, page).unwrap();
    let writes_before = m.swap().disk().writes();

    assert_eq!(m.allocate(), Err(AllocError::OutOfMemory));

    assert_eq!(m.frames().snapshot(index), frame_before);
    assert_eq!(
        m.swap().paging().entry(TABLE, page).unwrap().into_bits(),
        entry_before.into_bits()
    );
    assert_eq!(m.swap().disk().writes(), writes_before);
    assert_eq!(m.swap().slots().occupied(), 1);
}

#[test]
fn aging_steers_eviction_to_the_untouched_page() {
    let m = machine::<2>(2);
    let pas = map_pages(&m, 2);

    for _ in 0..64 {
        m.swap().paging().touch(TABLE, user_page(0));
        m.age();
    }
    let hot = m.frames().index_of(pas[0]).unwrap();
    let cold = m.frames().index_of(pas[1]).unwrap();
    assert_eq!(m.frames().history(hot), u64::MAX);
    assert_eq!(m.frames().history(cold), 0);

    assert_eq!(m.allocate().unwrap(), pas[1]);
    assert!(
        m.swap()
            .paging()
            .mapping(TABLE, user_page(0))
            .unwrap()
            .is_resident()
    );
}

#[test]
fn aging_clears_the_accessed_bit() {
    let m = machine::<1>(1);
    map_pages(&m, 1);
    let pt = m.swap().paging();

    pt.touch(TABLE, user_page(0));
    m.age();
    assert!(!pt.entry(TABLE, user_page(0)).unwrap().accessed());
}

#[test]
fn mapped_kernel_frame_ages_but_is_never_a_victim() {
    let m = machine::<2>(2);
    let pas = map_pages(&m, 2);

    // Page 0 stays mapped but its frame is handed to the kernel.
    let pinned = m.frames().index_of(pas[0]).unwrap();
    m.frames().set_state(pinned, FrameState::Kernel);
    m.frames().set_history(pinned, u64::MAX);

    m.swap().paging().touch(TABLE, user_page(1));
    m.age();
    assert_eq!(m.frames().history(pinned), u64::MAX >> 1);
    let user = m.frames().index_of(pas[1]).unwrap();
    assert_eq!(m.frames().history(user), u64::MAX);

    // The older history does not make the kernel frame a candidate.
    assert_eq!(m.allocate().unwrap(), pas[1]);
    assert_eq!(m.frames().state(pinned), FrameState::Kernel);
    assert_eq!(
        m.swap().paging().mapping(TABLE, user_page(0)),
        Some(PageMapping::Resident(pas[0]))
    );
    assert!(matches!(
        m.swap().paging().mapping(TABLE, user_page(1)),
        Some(PageMapping::OnDisk(_))
    ));
}

#[test]
fn force_marked_kernel_frame_is_reclaimed_without_io() {
    let m = machine::<2>(2);
    let a = m.allocate().unwrap();
    let _b = m.allocate().unwrap();

    let index = m.frames().index_of(a).unwrap();
    m.frames().set_force_evict(index, true);

    assert_eq!(m.allocate().unwrap(), a);
    assert!(!m.frames().force_evict(index));
    assert_eq!(m.frames().state(index), FrameState::Kernel);
    assert_eq!(m.swap().disk().writes(), 0);
}

#[test]
#[should_panic(expected = "no idle, user or force-marked frame")]
fn nothing_evictable_is_fatal() {
    let m = machine::<2>(2);
    let _a = m.allocate().unwrap();
    let _b = m.allocate().unwrap();
    let _ = m.allocate();
}

#[test]
fn evicted_translation_keeps_its_permissions() {
    let m = machine::<1>(1);
    map_pages(&m, 1);
    let _ = m.allocate().unwrap();

    let entry = m.swap().paging().entry(TABLE, user_page(0)).unwrap();
    assert!(matches!(entry.mapping(), PageMapping::OnDisk(_)));
    assert!(entry.user_access() && entry.writable() && entry.no_execute());
}
