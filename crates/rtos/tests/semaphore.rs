//! Binary semaphore token semantics.

use std::sync::{Arc, Mutex};

use blinky_rtos::{BinarySemaphore, Error, Kernel, Priority, Timeout, WakeFlag};

#[test]
fn starts_empty() {
    let kernel = Kernel::builder().build().unwrap();
    let sem = BinarySemaphore::new(&kernel);
    assert!(!sem.is_available());
    assert_eq!(sem.try_take(), Err(Error::Empty));
}

#[test]
fn repeated_give_does_not_accumulate() {
    let kernel = Kernel::builder().build().unwrap();
    let sem = BinarySemaphore::new(&kernel);

    let mut woken = WakeFlag::new();
    sem.give_from_isr(&mut woken);
    sem.give_from_isr(&mut woken);
    assert!(!woken.is_set());
    assert!(sem.is_available());

    assert_eq!(sem.try_take(), Ok(()));
    assert_eq!(sem.try_take(), Err(Error::Empty));
}

#[test]
fn bounded_take_times_out_and_token_stays_empty() {
    let kernel = Kernel::builder().build().unwrap();
    let sem = BinarySemaphore::new(&kernel);
    let outcome = Arc::new(Mutex::new(None));
    let timeout = Timeout::Ticks(kernel.ms_to_ticks(100));

    let (s, k, slot) = (sem.clone(), kernel.clone(), Arc::clone(&outcome));
    kernel
        .spawn("waiter", Priority(2), async move {
            let result = s.take(timeout).await;
            *slot.lock().unwrap() = Some((result, k.tick_count()));
        })
        .unwrap();
    kernel.run_for(300).unwrap();

    assert_eq!(*outcome.lock().unwrap(), Some((Err(Error::Timeout), 100)));
    assert!(!sem.is_available());
    assert_eq!(sem.waiting_tasks(), 0);
}

#[test]
fn zero_timeout_take_reports_empty() {
    let kernel = Kernel::builder().build().unwrap();
    let sem = BinarySemaphore::new(&kernel);
    let outcome = Arc::new(Mutex::new(None));

    let (s, slot) = (sem.clone(), Arc::clone(&outcome));
    kernel
        .spawn("poller", Priority(1), async move {
            *slot.lock().unwrap() = Some(s.take(Timeout::Immediate).await);
        })
        .unwrap();
    kernel.run_until_idle();

    assert_eq!(*outcome.lock().unwrap(), Some(Err(Error::Empty)));
}

#[test]
fn give_releases_only_the_highest_priority_waiter() {
    let kernel = Kernel::builder().build().unwrap();
    let sem = BinarySemaphore::new(&kernel);
    let order = Arc::new(Mutex::new(Vec::new()));

    for (name, priority) in [("low", 1), ("high", 3)] {
        let (s, out) = (sem.clone(), Arc::clone(&order));
        kernel
            .spawn(name, Priority(priority), async move {
                s.take(Timeout::Forever).await.unwrap();
                out.lock().unwrap().push(name);
            })
            .unwrap();
    }

    let (s, out) = (sem.clone(), Arc::clone(&order));
    kernel
        .spawn("giver", Priority(2), async move {
            s.give().await.unwrap();
            out.lock().unwrap().push("giver");
        })
        .unwrap();
    kernel.run_until_idle();

    // One give wakes one waiter; the priority 1 task is still blocked.
    assert_eq!(*order.lock().unwrap(), ["high", "giver"]);
    assert_eq!(sem.waiting_tasks(), 1);
    kernel.shutdown();
}
