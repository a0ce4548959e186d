//! Kernel object, state and lifecycle
//!
//! A [`Kernel`] owns everything the scheduler needs: the status flags, the
//! thread table, the ready queue, the timer list, and the port that performs
//! context switches. It is normally placed in a `static` so interrupt
//! handlers can reach it.
//!
//! ```ignore
//! static KERNEL: Kernel<CortexM4> = Kernel::new(CortexM4::new());
//! ```

use portable_atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use crate::config::{CFG_PRIO_IDLE, CFG_THREADS_MAX};
use crate::critical::{critical_section, Context};
use crate::cs_cell::CsCell;
use crate::error::{OsError, OsResult};
use crate::port::Port;
use crate::sched::ReadyQueue;
use crate::task::OsTcb;
use crate::time::TimerList;
use crate::types::{OsNestingCtr, OsTaskState, OsTick, ThreadId, WakeStatus};

// ============ Kernel State Structures ============

/// Atomic kernel flags
pub struct KernelFlags {
    initialized: AtomicBool,
    running: AtomicBool,
    int_nesting: AtomicU8,
    tick_counter: AtomicU32,
}

impl KernelFlags {
    const fn new() -> Self {
        Self {
            initialized: AtomicBool::new(false),
            running: AtomicBool::new(false),
            int_nesting: AtomicU8::new(0),
            tick_counter: AtomicU32::new(0),
        }
    }

    fn reset(&self) {
        self.initialized.store(false, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        self.int_nesting.store(0, Ordering::SeqCst);
        self.tick_counter.store(0, Ordering::SeqCst);
    }

    /// Check if the OS is running
    #[inline(always)]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Check if OS is initialized
    #[inline(always)]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Get current tick count
    #[inline(always)]
    pub fn tick_get(&self) -> OsTick {
        self.tick_counter.load(Ordering::Relaxed)
    }

    /// Get interrupt nesting level
    #[inline(always)]
    pub fn int_nesting(&self) -> OsNestingCtr {
        self.int_nesting.load(Ordering::Relaxed)
    }

    /// Increment and return tick count
    #[inline(always)]
    pub(crate) fn tick_increment(&self) -> OsTick {
        self.tick_counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    #[inline(always)]
    fn int_nesting_inc(&self) {
        let _ = self
            .int_nesting
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_add(1));
    }

    /// Decrement int nesting, returning the new level
    #[inline(always)]
    fn int_nesting_dec(&self) -> OsNestingCtr {
        let nesting = self.int_nesting.load(Ordering::Relaxed).saturating_sub(1);
        self.int_nesting.store(nesting, Ordering::Relaxed);
        nesting
    }

    #[inline(always)]
    fn set_initialized(&self, val: bool) {
        self.initialized.store(val, Ordering::SeqCst);
    }

    #[inline(always)]
    fn set_running(&self, val: bool) {
        self.running.store(val, Ordering::SeqCst);
    }
}

/// Scheduler state guarded by the critical section
pub struct KernelState {
    pub(crate) threads: [OsTcb; CFG_THREADS_MAX],
    pub(crate) ready: ReadyQueue,
    pub(crate) timers: TimerList,
    /// Thread that owns the CPU, `None` before the kernel starts
    pub(crate) current: Option<ThreadId>,
}

impl KernelState {
    pub(crate) const fn new() -> Self {
        Self {
            threads: [OsTcb::new(); CFG_THREADS_MAX],
            ready: ReadyQueue::new(),
            timers: TimerList::new(),
            current: None,
        }
    }

    #[inline(always)]
    pub fn tcb(&self, id: ThreadId) -> &OsTcb {
        &self.threads[id.index()]
    }

    #[inline(always)]
    pub fn tcb_mut(&mut self, id: ThreadId) -> &mut OsTcb {
        &mut self.threads[id.index()]
    }

    /// Thread that owns the CPU
    #[inline]
    pub fn current(&self) -> Option<ThreadId> {
        self.current
    }

    /// Resume a suspended thread
    ///
    /// Records why the thread woke, cancels its pending timeout if one is
    /// still registered, and appends it to the ready queue. Does not
    /// schedule.
    ///
    /// A timeout that can no longer be cancelled has already resolved
    /// nothing: whoever resolves a suspension clears the handle first. It
    /// is logged and otherwise ignored.
    pub(crate) fn make_ready(&mut self, id: ThreadId, status: WakeStatus) -> OsResult<()> {
        let tcb = &mut self.threads[id.index()];
        tcb.wake_status = status;
        if let Some(handle) = tcb.pending_timeout.take() {
            if self.timers.cancel(handle).is_err() {
                crate::warn!("stale timeout of thread {}", id.index());
            }
        }
        tcb.state = OsTaskState::Ready;
        self.ready.enqueue(id, tcb.prio)
    }

    /// Charge one tick to the running thread's time slice
    ///
    /// Returns true when the slice is used up and the thread should yield
    /// to ready threads of the same priority.
    pub(crate) fn charge_time_slice(&mut self) -> bool {
        let Some(id) = self.current else {
            return false;
        };
        let tcb = &mut self.threads[id.index()];
        if tcb.state != OsTaskState::Running {
            return false;
        }
        tcb.time_quanta_ctr = tcb.time_quanta_ctr.saturating_sub(1);
        if tcb.time_quanta_ctr > 0 {
            return false;
        }
        tcb.time_quanta_ctr = tcb.time_quanta;
        true
    }
}

// ============ Kernel ============

/// The kernel object
pub struct Kernel<P: Port> {
    flags: KernelFlags,
    state: CsCell<KernelState>,
    port: P,
}

impl<P: Port> Kernel<P> {
    /// Create an uninitialized kernel driving `port`
    pub const fn new(port: P) -> Self {
        Self {
            flags: KernelFlags::new(),
            state: CsCell::new(KernelState::new()),
            port,
        }
    }

    #[inline(always)]
    pub fn flags(&self) -> &KernelFlags {
        &self.flags
    }

    #[inline(always)]
    pub fn port(&self) -> &P {
        &self.port
    }

    #[inline(always)]
    pub(crate) fn state(&self) -> &CsCell<KernelState> {
        &self.state
    }

    /// Initialize the RTOS kernel
    ///
    /// This must be called before any other OS function. Clears all kernel
    /// state and creates the idle thread from `idle`, which must never
    /// block.
    ///
    /// # Returns
    /// * `Ok(id)` - Id of the idle thread
    /// * `Err(OsError::OsRunning)` - OS is already running
    pub fn os_init(&self, idle: P::Entry) -> OsResult<ThreadId> {
        if self.flags.is_running() {
            return Err(OsError::OsRunning);
        }

        self.flags.reset();
        self.state.with(|st| *st = KernelState::new());

        let id = self.thread_create_inner("Idle", CFG_PRIO_IDLE, idle)?;
        self.flags.set_initialized(true);
        crate::info!("kernel initialized");
        Ok(id)
    }

    /// Start multitasking
    ///
    /// Dispatches the highest priority ready thread. On hardware this does
    /// not return.
    ///
    /// # Returns
    /// * `Err(OsError::OsNotInit)` - OS not initialized
    /// * `Err(OsError::OsRunning)` - OS is already running
    pub fn os_start(&self) -> OsResult<()> {
        if !self.flags.is_initialized() {
            return Err(OsError::OsNotInit);
        }
        if self.flags.is_running() {
            return Err(OsError::OsRunning);
        }

        let first = critical_section(|cs| {
            let mut st = self.state.borrow(cs);
            let first = st.ready.dequeue().ok_or(OsError::OsNotInit)?;
            let tcb = st.tcb_mut(first);
            tcb.state = OsTaskState::Running;
            tcb.time_quanta_ctr = tcb.time_quanta;
            st.current = Some(first);
            self.flags.set_running(true);
            Ok(first)
        })?;

        crate::info!("kernel started, first thread {}", first.index());
        self.port.start_first(first);
        Ok(())
    }

    /// Enter ISR
    ///
    /// Call at the start of every interrupt handler that uses kernel
    /// services. Kernel calls made until the matching [`os_int_exit`]
    /// never switch threads directly.
    ///
    /// [`os_int_exit`]: Kernel::os_int_exit
    pub fn os_int_enter(&self) {
        if self.flags.is_running() {
            self.flags.int_nesting_inc();
        }
    }

    /// Exit ISR
    ///
    /// Leaving the outermost interrupt runs the scheduler once, picking up
    /// any thread made ready during the interrupt.
    pub fn os_int_exit(&self) {
        self.int_exit(false);
    }

    pub(crate) fn int_exit(&self, rotate: bool) {
        if !self.flags.is_running() {
            return;
        }

        let from = critical_section(|cs| {
            if self.flags.int_nesting() == 0 {
                return None;
            }
            if self.flags.int_nesting_dec() > 0 {
                return None;
            }
            let mut st = self.state.borrow(cs);
            self.sched_locked(&mut st, rotate)
        });

        self.resume(from);
    }

    /// Execution context of the caller
    pub fn current_context(&self) -> Context {
        critical_section(|cs| self.context_locked(&self.state.borrow(cs)))
    }

    pub(crate) fn context_locked(&self, st: &KernelState) -> Context {
        if self.flags.int_nesting() > 0 {
            return Context::Isr;
        }
        match st.current {
            Some(id) if self.flags.is_running() => Context::Thread(id),
            _ => Context::Init,
        }
    }

    /// Thread running the caller, `None` from an ISR or before start
    #[inline]
    pub fn current_thread(&self) -> Option<ThreadId> {
        self.current_context().thread()
    }

    /// Report an unrecoverable kernel error to the port
    pub(crate) fn fault(&self, err: OsError) -> OsError {
        debug_assert!(err.is_fatal());
        crate::error!("kernel fault: {}", err.code());
        self.port.kernel_fault(err);
        err
    }

    /// Block until the port has switched back to `from`
    ///
    /// Must be called with the critical section released.
    #[inline]
    pub(crate) fn resume(&self, from: Option<ThreadId>) {
        if let Some(from) = from {
            self.port.wait_dispatch(from);
        }
    }
}
