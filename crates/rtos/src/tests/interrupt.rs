use std::sync::{Arc, Mutex};

use super::Trace;
use crate::error::{ContractViolation, Error};
use crate::interrupt::{InterruptController, WakeFlag};
use crate::kernel::{Context, Kernel, Priority, Timeout};
use crate::queue::Queue;
use crate::semaphore::BinarySemaphore;

#[test]
fn unregistered_line_is_a_no_op() {
    let kernel = Kernel::builder().build().unwrap();
    let irq = InterruptController::new(&kernel);
    assert_eq!(irq.trigger(9), Ok(false));
    assert_eq!(kernel.context(), Context::Idle);
}

#[test]
fn registering_twice_replaces_the_handler() {
    let kernel = Kernel::builder().build().unwrap();
    let irq = InterruptController::new(&kernel);
    let trace = Trace::default();

    let t = trace.clone();
    assert!(!irq.register_handler(3, move |_| t.push("first")));
    let t = trace.clone();
    assert!(irq.register_handler(3, move |_| t.push("second")));

    irq.trigger(3).unwrap();
    assert_eq!(trace.lines(), ["second"]);

    assert!(irq.unregister_handler(3));
    assert!(!irq.is_registered(3));
    assert_eq!(irq.trigger(3), Ok(false));
}

#[test]
fn handler_runs_in_interrupt_context() {
    let kernel = Kernel::builder().build().unwrap();
    let irq = InterruptController::new(&kernel);
    let seen = Arc::new(Mutex::new(None));

    let (k, slot) = (kernel.clone(), Arc::clone(&seen));
    irq.register_handler(12, move |isr| {
        *slot.lock().unwrap() = Some((isr.number(), k.context(), isr.tick_count_from_isr()));
    });
    irq.trigger(12).unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        Some((
            12,
            Context::Interrupt {
                number: 12,
                preempted: Priority::IDLE
            },
            0
        ))
    );
    assert_eq!(kernel.context(), Context::Idle);
}

#[test]
fn yield_from_isr_without_wake_is_a_no_op() {
    let kernel = Kernel::builder().build().unwrap();
    let irq = InterruptController::new(&kernel);
    irq.register_handler(1, |isr| isr.yield_from_isr(WakeFlag::new()));
    assert_eq!(irq.trigger(1), Ok(false));
}

#[test]
fn nested_raise_is_rejected() {
    let kernel = Kernel::builder().build().unwrap();
    let irq = InterruptController::new(&kernel);
    let nested = Arc::new(Mutex::new(None));

    let (inner, slot) = (irq.clone(), Arc::clone(&nested));
    irq.register_handler(1, move |_| {
        *slot.lock().unwrap() = Some(inner.trigger(2));
    });
    irq.register_handler(2, |_| {});

    assert_eq!(irq.trigger(1), Ok(false));
    assert_eq!(
        *nested.lock().unwrap(),
        Some(Err(Error::Contract(ContractViolation::NestedInterrupt {
            active: 1,
            requested: 2
        })))
    );
    // The rejected raise must not leave the kernel in interrupt context.
    assert_eq!(kernel.context(), Context::Idle);
    irq.unregister_handler(1);
}

#[test]
fn blocking_calls_are_refused_in_handlers() {
    let kernel = Kernel::builder().build().unwrap();
    let irq = InterruptController::new(&kernel);
    let sem = BinarySemaphore::new(&kernel);
    let queue = Queue::<u8>::new(&kernel, 1).unwrap();
    let results = Arc::new(Mutex::new(Vec::new()));

    let (s, q, out) = (sem.clone(), queue.clone(), Arc::clone(&results));
    irq.register_handler(4, move |_| {
        let mut out = out.lock().unwrap();
        out.push(futures::executor::block_on(s.take(Timeout::Forever)));
        out.push(s.try_take());
        out.push(futures::executor::block_on(q.send(1, Timeout::Immediate)));
    });
    irq.trigger(4).unwrap();

    let violation = Err(Error::Contract(ContractViolation::BlockingInInterrupt));
    assert_eq!(*results.lock().unwrap(), [violation, violation, violation]);
    assert!(queue.is_empty());
}

#[test]
fn deferred_handler_task_runs_before_the_raiser_resumes() {
    let kernel = Kernel::builder().build().unwrap();
    let irq = InterruptController::new(&kernel);
    let sem = BinarySemaphore::new(&kernel);
    let trace = Trace::default();

    let (s, t) = (sem.clone(), trace.clone());
    irq.register_handler(40, move |isr| {
        let mut woken = WakeFlag::new();
        s.give_from_isr(&mut woken);
        t.push(format!("isr woken={}", woken.is_set()));
        isr.yield_from_isr(woken);
    });

    let (s, t) = (sem.clone(), trace.clone());
    kernel
        .spawn("handler", Priority(3), async move {
            while s.take(Timeout::Forever).await.is_ok() {
                t.push("handler");
            }
        })
        .unwrap();

    let (i, t) = (irq.clone(), trace.clone());
    kernel
        .spawn("periodic", Priority(1), async move {
            t.push("before raise");
            i.raise(40).await.unwrap();
            t.push("after raise");
        })
        .unwrap();
    kernel.run_until_idle();

    assert_eq!(
        trace.lines(),
        ["before raise", "isr woken=true", "handler", "after raise"]
    );
    assert!(!sem.is_available());
    kernel.shutdown();
}
