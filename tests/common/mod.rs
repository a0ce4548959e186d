//! Simulated port for host tests
//!
//! Every kernel thread runs on its own `std::thread`. A baton records which
//! kernel thread the scheduler dispatched last, and every other thread
//! parks on a condition variable until the baton names it, so exactly one
//! kernel thread executes at a time.
//!
//! The test's own thread is adopted as kernel thread `main`. Ticks are
//! raised by calling `os_tick_handler` from the running thread, which models
//! an interrupt arriving on top of it. The idle thread ticks continuously,
//! so time advances on its own whenever every other thread is blocked.

#![allow(dead_code)]

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock, Weak};

use kestrel::{Kernel, OsError, OsPrio, OsResult, Port, ThreadId};

/// Priority of the adopted test thread
pub const MAIN_PRIO: OsPrio = 10;
/// Priority of helper threads that should preempt `main`
pub const TASK_PRIO: OsPrio = 5;

/// Idle ticks after which the simulation is considered deadlocked
const IDLE_TICK_LIMIT: usize = 100_000;

pub type Body = Box<dyn FnOnce() + Send + 'static>;

pub struct SimPort {
    baton: Mutex<Option<ThreadId>>,
    dispatched: Condvar,
    kernel: OnceLock<Weak<Kernel<SimPort>>>,
    adopted: Mutex<Option<ThreadId>>,
    panics: AtomicUsize,
}

impl SimPort {
    pub fn new() -> Self {
        SimPort {
            baton: Mutex::new(None),
            dispatched: Condvar::new(),
            kernel: OnceLock::new(),
            adopted: Mutex::new(None),
            panics: AtomicUsize::new(0),
        }
    }

    fn hand_over(&self, to: ThreadId) {
        *self.baton.lock().unwrap() = Some(to);
        self.dispatched.notify_all();
    }

    /// Kernel threads whose body panicked
    pub fn panics(&self) -> usize {
        self.panics.load(Ordering::SeqCst)
    }
}

impl Port for SimPort {
    /// `None` adopts the calling OS thread
    type Entry = Option<Body>;

    fn init_context(&self, thread: ThreadId, entry: Option<Body>) -> OsResult<()> {
        let Some(body) = entry else {
            *self.adopted.lock().unwrap() = Some(thread);
            return Ok(());
        };

        let kernel = self.kernel.get().cloned().ok_or(OsError::InvalidArgument)?;
        std::thread::Builder::new()
            .name(format!("kthread-{}", thread.index()))
            .spawn(move || {
                let Some(kernel) = kernel.upgrade() else {
                    return;
                };
                kernel.port().wait_dispatch(thread);
                if panic::catch_unwind(AssertUnwindSafe(body)).is_err() {
                    kernel.port().panics.fetch_add(1, Ordering::SeqCst);
                }
                if kernel.os_thread_exit().is_err() {
                    eprintln!("kernel thread {} could not exit", thread.index());
                    std::process::abort();
                }
            })
            .map(|_| ())
            .map_err(|_| OsError::InvalidArgument)
    }

    fn start_first(&self, thread: ThreadId) {
        self.hand_over(thread);
        let adopted = *self.adopted.lock().unwrap();
        if let Some(me) = adopted {
            self.wait_dispatch(me);
        }
    }

    fn request_switch(&self, _from: Option<ThreadId>, to: ThreadId) {
        self.hand_over(to);
    }

    fn wait_dispatch(&self, thread: ThreadId) {
        let mut baton = self.baton.lock().unwrap();
        while *baton != Some(thread) {
            baton = self.dispatched.wait(baton).unwrap();
        }
    }
}

/// A booted kernel with the test thread adopted as `main`
pub struct Sim {
    pub kernel: Arc<Kernel<SimPort>>,
    pub main: ThreadId,
    pub idle: ThreadId,
}

impl Sim {
    /// Initialize the kernel without starting it
    pub fn boot() -> Sim {
        let kernel = Arc::new(Kernel::new(SimPort::new()));
        let weak = Arc::downgrade(&kernel);
        assert!(kernel.port().kernel.set(weak.clone()).is_ok());

        let idle: Body = Box::new(move || {
            let Some(kernel) = weak.upgrade() else {
                return;
            };
            for _ in 0..IDLE_TICK_LIMIT {
                kernel.os_tick_handler();
            }
            eprintln!("simulated kernel deadlocked at tick {}", kernel.os_time_get());
            std::process::abort();
        });

        let idle = kernel.os_init(Some(idle)).unwrap();
        let main = kernel.os_thread_create("main", MAIN_PRIO, None).unwrap();
        Sim { kernel, main, idle }
    }

    /// Boot and start; returns once `main` is dispatched
    pub fn start() -> Sim {
        let sim = Sim::boot();
        sim.run();
        sim
    }

    /// Start a booted kernel
    pub fn run(&self) {
        self.kernel.os_start().unwrap();
    }

    /// Create a kernel thread running `f`
    pub fn spawn<F>(&self, name: &'static str, prio: OsPrio, f: F) -> ThreadId
    where
        F: FnOnce(&Kernel<SimPort>) + Send + 'static,
    {
        let kernel = Arc::clone(&self.kernel);
        self.kernel
            .os_thread_create(name, prio, Some(Box::new(move || f(&kernel))))
            .unwrap()
    }

    /// Raise `n` tick interrupts on top of the running thread
    pub fn tick(&self, n: u32) {
        for _ in 0..n {
            self.kernel.os_tick_handler();
        }
    }

    pub fn panics(&self) -> usize {
        self.kernel.port().panics()
    }
}

/// Shared slot a kernel thread reports into
pub fn slot<T>() -> Arc<Mutex<Option<T>>> {
    Arc::new(Mutex::new(None))
}
