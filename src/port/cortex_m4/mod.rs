//! Cortex-M4 port implementation
//!
//! Provides context switching via PendSV exception handler.
//!
//! Threads run on the process stack. The switch request records which
//! thread to save and which to restore; PendSV runs at the lowest priority
//! once the critical section is released and performs the swap.
//!
//! The application binds the tick interrupt to its kernel:
//!
//! ```ignore
//! static KERNEL: Kernel<CortexM4> = Kernel::new(CortexM4::new());
//!
//! #[exception]
//! fn SysTick() {
//!     KERNEL.os_tick_handler();
//! }
//! ```

#![allow(named_asm_labels)]

use core::arch::naked_asm;
use core::ptr;

use cortex_m::peripheral::scb::SystemHandler;
use cortex_m::peripheral::syst::SystClkSource;
use portable_atomic::{AtomicBool, AtomicPtr, AtomicU8, Ordering};

use crate::config::CFG_THREADS_MAX;
use crate::error::{OsError, OsResult};
use crate::port::Port;
use crate::time::tick_reload;
use crate::types::ThreadId;

// ============ Critical Section ============

mod cs_impl {
    use cortex_m::interrupt;
    use cortex_m::register::primask;
    use critical_section::{set_impl, Impl, RawRestoreState};

    struct SingleCoreCriticalSection;
    set_impl!(SingleCoreCriticalSection);

    unsafe impl Impl for SingleCoreCriticalSection {
        unsafe fn acquire() -> RawRestoreState {
            let was_active = primask::read().is_active();
            interrupt::disable();
            was_active
        }

        unsafe fn release(was_active: RawRestoreState) {
            if was_active {
                unsafe { interrupt::enable() }
            }
        }
    }
}

// ============ Switch State ============

const NO_THREAD: u8 = u8::MAX;

/// Saved process stack pointer of every thread
static THREAD_SP: [AtomicPtr<u32>; CFG_THREADS_MAX] =
    [const { AtomicPtr::new(ptr::null_mut()) }; CFG_THREADS_MAX];

/// Thread whose context PendSV saves, `NO_THREAD` to skip the save
#[no_mangle]
static SWITCH_FROM: AtomicU8 = AtomicU8::new(NO_THREAD);

/// Thread whose context PendSV restores
static SWITCH_TO: AtomicU8 = AtomicU8::new(NO_THREAD);

/// A switch has been requested and PendSV has not taken it yet
static SWITCH_PENDING: AtomicBool = AtomicBool::new(false);

/// Everything needed to start a thread on this port
pub struct ThreadEntry {
    /// Thread body
    pub func: fn(*mut ()) -> !,
    /// Argument passed in r0
    pub arg: *mut (),
    /// Process stack of the thread
    pub stack: &'static mut [u32],
}

/// Context structure stored on stack
#[repr(C, align(4))]
struct UcStk {
    r4: u32,
    r5: u32,
    r6: u32,
    r7: u32,
    r8: u32,
    r9: u32,
    r10: u32,
    r11: u32,
    exc_return: u32,  // LR value for exception return
    r0: u32,
    r1: u32,
    r2: u32,
    r3: u32,
    r12: u32,
    lr: u32,
    pc: u32,
    xpsr: u32,
}
const CONTEXT_STACK_SIZE: usize = 17;

/// Smallest stack that fits the initial frame plus a little headroom
pub const STACK_MIN_WORDS: usize = CONTEXT_STACK_SIZE + 16;

/// The Cortex-M4 port
///
/// There is one PendSV handler per core, so all instances share the same
/// switch state.
#[derive(Debug, Default)]
pub struct CortexM4;

impl CortexM4 {
    pub const fn new() -> Self {
        CortexM4
    }
}

/// Initialize SysTick to interrupt at `CFG_TICK_RATE_HZ`
///
/// # Arguments
/// * `core_clock_hz` - Core clock feeding SysTick
///
/// # Returns
/// * `Err(OsError::InvalidArgument)` - The reload does not fit SysTick
pub fn systick_init(core_clock_hz: u32) -> OsResult<()> {
    let reload = tick_reload(core_clock_hz)?;
    let mut p = unsafe { cortex_m::Peripherals::steal() };

    p.SYST.set_reload(reload);
    p.SYST.clear_current();
    p.SYST.set_clock_source(SystClkSource::Core);
    p.SYST.enable_interrupt();
    p.SYST.enable_counter();
    Ok(())
}

impl Port for CortexM4 {
    type Entry = ThreadEntry;

    fn init_context(&self, thread: ThreadId, entry: ThreadEntry) -> OsResult<()> {
        if entry.stack.len() < STACK_MIN_WORDS {
            return Err(OsError::InvalidArgument);
        }

        let range = entry.stack.as_mut_ptr_range();
        let stk_aligned = ((range.end as usize) & !7) as *mut u32;

        // SAFETY: the stack holds at least STACK_MIN_WORDS words, so the
        // frame fits between its base and the aligned top.
        let sp = unsafe {
            let frame_ptr = stk_aligned.sub(CONTEXT_STACK_SIZE) as *mut UcStk;
            frame_ptr.write(UcStk {
                r4: 0x04040404,
                r5: 0x05050505,
                r6: 0x06060606,
                r7: 0x07070707,
                r8: 0x08080808,
                r9: 0x09090909,
                r10: 0x10101010,
                r11: 0x11111111,
                exc_return: 0xFFFF_FFFD,
                r0: entry.arg as u32,
                r1: 0,
                r2: 0,
                r3: 0,
                r12: 0,
                lr: thread_return as *const () as u32,
                pc: (entry.func as usize as u32) | 1,
                xpsr: 0x0100_0000,
            });
            // Match PendSV's "add r0, r0, #4"
            (frame_ptr as *mut u32).sub(1)
        };

        THREAD_SP[thread.index()].store(sp, Ordering::Relaxed);
        Ok(())
    }

    fn start_first(&self, thread: ThreadId) {
        unsafe {
            let mut scb = cortex_m::Peripherals::steal().SCB;

            // Set PendSV and SysTick priority to lowest
            scb.set_priority(SystemHandler::PendSV, 0xF0);
            scb.set_priority(SystemHandler::SysTick, 0xF0);
        }

        SWITCH_FROM.store(NO_THREAD, Ordering::Relaxed);
        SWITCH_TO.store(thread.index() as u8, Ordering::Relaxed);
        SWITCH_PENDING.store(true, Ordering::Release);

        unsafe { cortex_m::interrupt::enable() };
        cortex_m::peripheral::SCB::set_pendsv();

        loop {
            cortex_m::asm::wfi();
        }
    }

    fn request_switch(&self, from: Option<ThreadId>, to: ThreadId) {
        if !SWITCH_PENDING.swap(true, Ordering::AcqRel) {
            let from = from.map_or(NO_THREAD, |id| id.index() as u8);
            SWITCH_FROM.store(from, Ordering::Relaxed);
        }
        SWITCH_TO.store(to.index() as u8, Ordering::Release);
        cortex_m::peripheral::SCB::set_pendsv();
    }

    #[inline(always)]
    fn wait_dispatch(&self, _thread: ThreadId) {}

    fn kernel_fault(&self, err: OsError) {
        crate::error!("kernel fault {}", err.code());
        cortex_m::interrupt::disable();
        loop {
            cortex_m::asm::udf();
        }
    }
}

/// Called from PendSV to swap stack pointers
/// Returns new thread's stack pointer
#[inline(never)]
#[no_mangle]
unsafe extern "C" fn pendsv_switch_context(cur_sp: *mut u32) -> *mut u32 {
    let from = SWITCH_FROM.swap(NO_THREAD, Ordering::Relaxed);
    if let Some(slot) = THREAD_SP.get(from as usize) {
        slot.store(cur_sp, Ordering::Relaxed);
    }

    SWITCH_PENDING.store(false, Ordering::Release);
    let to = SWITCH_TO.load(Ordering::Acquire);
    THREAD_SP
        .get(to as usize)
        .map_or(ptr::null_mut(), |slot| slot.load(Ordering::Relaxed))
}

/// PendSV exception handler - performs full context switch
///
/// 1. Save R4-R11, LR to outgoing thread's PSP (skipped when there is none)
/// 2. Call pendsv_switch_context to swap stack pointers
/// 3. Restore R4-R11, LR from new thread's stack
/// 4. Exception return
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn PendSV() {
    naked_asm!(
        "cpsid i",
        "dsb",
        "isb",

        "mrs r0, psp",

        "ldr r1, ={switch_from}",
        "ldrb r1, [r1]",
        "cmp r1, #0xFF",
        "beq 1f",

        "stmdb r0!, {{r4-r11, lr}}",

        "sub r0, r0, #4",

        "1:",
        "bl pendsv_switch_context",

        "cbz r0, 2f",
        "add r0, r0, #4",
        "ldmia r0!, {{r4-r11, lr}}",

        "msr psp, r0",

        "2:",
        "cpsie i",
        "dsb",
        "isb",

        "bx lr",

        switch_from = sym SWITCH_FROM,
    );
}

/// Thread return handler
#[no_mangle]
fn thread_return() -> ! {
    loop {
        cortex_m::asm::wfi();
    }
}
