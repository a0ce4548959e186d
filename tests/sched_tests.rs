//! Scheduler, thread lifecycle and delay tests on the simulated port

mod common;

use std::sync::{Arc, Mutex};

use common::{slot, Sim, SimPort, MAIN_PRIO, TASK_PRIO};
use kestrel::{
    Context, Kernel, OsError, OsEvent, OsTaskState, WakeStatus, CFG_PRIO_IDLE, CFG_THREADS_MAX,
    CFG_TIME_QUANTA_DEFAULT,
};

fn log() -> Arc<Mutex<Vec<&'static str>>> {
    Arc::new(Mutex::new(Vec::new()))
}

#[test]
fn test_highest_priority_runs_first() {
    let sim = Sim::boot();
    let order = log();
    for (name, prio) in [("p3", 3), ("p1", 1), ("p2", 2)] {
        let order = Arc::clone(&order);
        sim.spawn(name, prio, move |_| order.lock().unwrap().push(name));
    }

    assert_eq!(sim.kernel.current_context(), Context::Init);
    sim.run();

    assert_eq!(*order.lock().unwrap(), ["p1", "p2", "p3"]);
    assert_eq!(sim.kernel.current_thread(), Some(sim.main));
}

#[test]
fn test_equal_priority_is_fifo() {
    let sim = Sim::boot();
    let order = log();
    for name in ["a", "b", "c"] {
        let order = Arc::clone(&order);
        sim.spawn(name, TASK_PRIO, move |_| order.lock().unwrap().push(name));
    }
    sim.run();

    assert_eq!(*order.lock().unwrap(), ["a", "b", "c"]);
}

#[test]
fn test_create_preempts_lower_priority_caller() {
    let sim = Sim::start();
    let order = log();

    let o = Arc::clone(&order);
    sim.spawn("high", TASK_PRIO, move |_| o.lock().unwrap().push("high"));
    order.lock().unwrap().push("main");

    let o = Arc::clone(&order);
    sim.spawn("low", MAIN_PRIO + 1, move |_| o.lock().unwrap().push("low"));
    order.lock().unwrap().push("main");

    sim.kernel.os_time_dly(1).unwrap();
    assert_eq!(*order.lock().unwrap(), ["high", "main", "main", "low"]);
}

#[test]
fn test_yield_alternates_equal_priorities() {
    let sim = Sim::boot();
    let order = log();
    for name in ["a", "b"] {
        let order = Arc::clone(&order);
        sim.spawn(name, TASK_PRIO, move |k| {
            order.lock().unwrap().push(name);
            k.os_yield();
            order.lock().unwrap().push(name);
        });
    }
    sim.run();

    assert_eq!(*order.lock().unwrap(), ["a", "b", "a", "b"]);
}

#[test]
fn test_round_robin_time_slices() {
    const ROUNDS: u32 = 2 * CFG_TIME_QUANTA_DEFAULT;

    let sim = Sim::boot();
    let order = log();
    for name in ["a", "b"] {
        let order = Arc::clone(&order);
        sim.spawn(name, TASK_PRIO, move |k| {
            for _ in 0..ROUNDS {
                order.lock().unwrap().push(name);
                k.os_tick_handler();
            }
        });
    }
    sim.run();

    let quanta = CFG_TIME_QUANTA_DEFAULT as usize;
    let order = order.lock().unwrap();
    assert_eq!(order.len(), 2 * ROUNDS as usize);
    for (i, chunk) in order.chunks(quanta).enumerate() {
        let expected = if i % 2 == 0 { "a" } else { "b" };
        assert!(chunk.iter().all(|&n| n == expected), "slice {} is {:?}", i, chunk);
    }
}

#[test]
fn test_delay_wakes_after_ticks() {
    let sim = Sim::start();
    let k = &*sim.kernel;

    let elapsed = slot();
    let out = Arc::clone(&elapsed);
    let t = sim.spawn("sleeper", TASK_PRIO, move |k| {
        let start = k.os_time_get();
        k.os_time_dly(3).unwrap();
        let me = k.current_thread().unwrap();
        let status = k.os_tcb(me).unwrap().wake_status();
        *out.lock().unwrap() = Some((k.os_time_get() - start, status));
    });

    assert_eq!(k.os_tcb(t).unwrap().state(), OsTaskState::Delayed);
    assert_eq!(k.os_timer_pending(), 1);

    // Event traffic while the sleeper is delayed leaves its delay alone
    let event = OsEvent::new();
    event.create(k).unwrap();
    event.set(k, 0x1).unwrap();
    event.delete(k).unwrap();
    assert_eq!(k.os_tcb(t).unwrap().state(), OsTaskState::Delayed);

    let start = k.os_time_get();
    k.os_time_dly(10).unwrap();
    assert_eq!(k.os_time_get() - start, 10);
    assert_eq!(*elapsed.lock().unwrap(), Some((3, WakeStatus::Ok)));
    assert_eq!(k.os_timer_pending(), 0);
}

#[test]
fn test_delay_edge_cases() {
    let sim = Sim::start();
    let k = &*sim.kernel;

    let before = k.os_time_get();
    assert_eq!(k.os_time_dly(0), Ok(()));
    assert_eq!(k.os_time_get(), before);

    k.os_int_enter();
    assert_eq!(k.os_time_dly(1), Err(OsError::ContextError));
    k.os_int_exit();

    assert_eq!(k.os_time_dly(u32::MAX), Err(OsError::TimerError));
    assert_eq!(k.os_timer_pending(), 0);
}

#[test]
fn test_thread_exit_frees_slot() {
    let sim = Sim::start();
    let k = &*sim.kernel;
    assert_eq!(k.os_thread_count(), 2);

    let t = sim.spawn("short", TASK_PRIO, |_| {});
    assert_eq!(k.os_tcb(t).map(|tcb| tcb.name()), Err(OsError::TaskInvalid));
    assert_eq!(k.os_thread_count(), 2);

    let again = sim.spawn("again", TASK_PRIO, |_| {});
    assert_eq!(again, t);
}

#[test]
fn test_thread_exit_outside_thread() {
    let kernel = Kernel::new(SimPort::new());
    assert_eq!(kernel.os_thread_exit(), Err(OsError::ContextError));

    let sim = Sim::start();
    sim.kernel.os_int_enter();
    assert_eq!(sim.kernel.os_thread_exit(), Err(OsError::ContextError));
    sim.kernel.os_int_exit();
}

#[test]
fn test_create_errors() {
    let kernel = Kernel::new(SimPort::new());
    assert_eq!(kernel.os_thread_create("early", 1, None), Err(OsError::OsNotInit));

    let sim = Sim::boot();
    let k = &*sim.kernel;
    assert_eq!(k.os_thread_create("idle2", CFG_PRIO_IDLE, None), Err(OsError::PrioInvalid));
    assert_eq!(k.os_thread_create("big", 200, None), Err(OsError::PrioInvalid));

    // Fill the table; these threads are never started
    for _ in k.os_thread_count()..CFG_THREADS_MAX {
        k.os_thread_create("filler", 20, Some(Box::new(|| {}))).unwrap();
    }
    assert_eq!(k.os_thread_count(), CFG_THREADS_MAX);
    assert_eq!(
        k.os_thread_create("extra", 20, Some(Box::new(|| {}))),
        Err(OsError::TaskNoMoreTcb)
    );
}

#[test]
fn test_start_errors() {
    let kernel = Kernel::new(SimPort::new());
    assert_eq!(kernel.os_start(), Err(OsError::OsNotInit));

    let sim = Sim::start();
    assert_eq!(sim.kernel.os_start(), Err(OsError::OsRunning));
    assert_eq!(sim.kernel.os_init(None), Err(OsError::OsRunning));
}

#[test]
fn test_tcb_snapshot() {
    let sim = Sim::start();
    let k = &*sim.kernel;

    let main = k.os_tcb(sim.main).unwrap();
    assert_eq!(main.name(), "main");
    assert_eq!(main.prio(), MAIN_PRIO);
    assert_eq!(main.state(), OsTaskState::Running);

    let idle = k.os_tcb(sim.idle).unwrap();
    assert_eq!(idle.prio(), CFG_PRIO_IDLE);
    assert_eq!(idle.state(), OsTaskState::Ready);
    assert!(!idle.is_suspended());
}

#[test]
fn test_nested_interrupts_defer_switch() {
    let sim = Sim::start();
    let k = &*sim.kernel;

    let ran = slot();
    let out = Arc::clone(&ran);
    sim.spawn("sleeper", TASK_PRIO, move |k| {
        k.os_time_dly(1).unwrap();
        *out.lock().unwrap() = Some(k.os_time_get());
    });

    k.os_int_enter();
    sim.tick(1);
    assert!(ran.lock().unwrap().is_none());
    assert_eq!(k.current_context(), Context::Isr);
    k.os_int_exit();

    assert_eq!(*ran.lock().unwrap(), Some(1));
    assert_eq!(k.current_context(), Context::Thread(sim.main));
}
