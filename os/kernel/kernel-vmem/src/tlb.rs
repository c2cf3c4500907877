#![cfg(target_arch = "x86_64")]

use crate::walker::TlbInvalidate;
use kernel_memory_addresses::VirtualAddress;

/// TLB maintenance for the executing CPU.
///
/// Single addresses are dropped with `invlpg`; a full flush reloads CR3.
/// Other CPUs are not notified: shootdowns are the scheduler's business.
///
/// # Privilege
/// Both instructions fault outside ring 0. Only use this type from kernel code.
pub struct LocalTlb;

impl TlbInvalidate for LocalTlb {
    #[inline]
    fn invalidate(&self, va: Option<VirtualAddress>) {
        match va {
            Some(va) => unsafe {
                core::arch::asm!(
                    "invlpg [{}]",
                    in(reg) va.as_u64(),
                    options(nostack, preserves_flags)
                );
            },
            None => unsafe {
                let cr3: u64;
                core::arch::asm!("mov {}, cr3", out(reg) cr3, options(nomem, nostack, preserves_flags));
                core::arch::asm!("mov cr3, {}", in(reg) cr3, options(nostack, preserves_flags));
            },
        }
    }
}
