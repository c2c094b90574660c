use std::sync::{Arc, Mutex};

use super::Trace;
use crate::error::{ContractViolation, Error};
use crate::kernel::{Context, Kernel, Priority, Timeout};
use crate::timer::Timer;

#[test]
fn auto_reload_fires_every_period() {
    let kernel = Kernel::builder().build().unwrap();
    let trace = Trace::default();

    let (k, t) = (kernel.clone(), trace.clone());
    let timer = Timer::new(&kernel, "tick", 200, true, move |_| {
        t.push(k.tick_count().to_string());
    })
    .unwrap();
    assert!(timer.is_auto_reload());
    timer.start(Timeout::Immediate).unwrap();
    kernel.run_for(650).unwrap();

    assert_eq!(trace.lines(), ["200", "400", "600"]);
    assert_eq!(timer.fire_count(), 3);
    assert_eq!(timer.next_due(), Some(800));
    kernel.shutdown();
}

#[test]
fn one_shot_disarms_after_firing() {
    let kernel = Kernel::builder().build().unwrap();
    let timer = Timer::new(&kernel, "once", 10, false, |_| {}).unwrap();
    assert!(!timer.is_active());
    assert!(!timer.is_auto_reload());

    timer.start(Timeout::Immediate).unwrap();
    assert_eq!(timer.next_due(), Some(10));
    kernel.run_for(50).unwrap();

    assert_eq!(timer.fire_count(), 1);
    assert!(!timer.is_active());
    assert_eq!(timer.next_due(), None);
}

#[test]
fn same_tick_timers_fire_in_creation_order() {
    let kernel = Kernel::builder().build().unwrap();
    let trace = Trace::default();

    let mut timers = Vec::new();
    for (name, period) in [("a", 10), ("b", 10), ("c", 5)] {
        let t = trace.clone();
        let timer = Timer::new(&kernel, name, period, true, move |timer| {
            t.push(timer.name());
        })
        .unwrap();
        timer.start(Timeout::Immediate).unwrap();
        timers.push(timer);
    }
    kernel.run_for(10).unwrap();

    assert_eq!(trace.lines(), ["c", "a", "b", "c"]);
    kernel.shutdown();
}

#[test]
fn missed_periods_are_caught_up() {
    let kernel = Kernel::builder().build().unwrap();
    let timer = Timer::new(&kernel, "late", 2, true, |_| {}).unwrap();
    timer.start(Timeout::Immediate).unwrap();

    kernel.timers().fire_due(7);

    assert_eq!(timer.fire_count(), 3);
    assert_eq!(timer.next_due(), Some(8));
    kernel.shutdown();
}

#[test]
fn callbacks_run_in_the_timer_service() {
    let kernel = Kernel::builder().build().unwrap();
    let seen = Arc::new(Mutex::new(None));

    let (k, slot) = (kernel.clone(), Arc::clone(&seen));
    let timer = Timer::new(&kernel, "probe", 3, false, move |timer| {
        let restart = timer.start(Timeout::Ticks(5));
        *slot.lock().unwrap() = Some((k.context(), k.running_priority(), restart));
    })
    .unwrap();
    timer.start(Timeout::Immediate).unwrap();
    kernel.run_for(5).unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        Some((
            Context::TimerService,
            Priority(7),
            Err(Error::Contract(ContractViolation::BlockingInTimerService))
        ))
    );
    assert!(!timer.is_active());
    kernel.shutdown();
}

#[test]
fn stop_reset_and_change_period() {
    let kernel = Kernel::builder().build().unwrap();
    let timer = Timer::new(&kernel, "ctl", 10, true, |_| {}).unwrap();

    timer.start(Timeout::Immediate).unwrap();
    kernel.run_for(4).unwrap();
    timer.reset();
    assert_eq!(timer.next_due(), Some(14));

    timer.change_period(3).unwrap();
    assert_eq!((timer.period(), timer.next_due()), (3, Some(7)));

    timer.stop();
    kernel.run_for(20).unwrap();
    assert_eq!(timer.fire_count(), 0);

    assert_eq!(
        timer.change_period(0),
        Err(Error::Contract(ContractViolation::ZeroPeriod))
    );
    assert_eq!(timer.period(), 3);
}

#[test]
fn zero_period_is_refused() {
    let kernel = Kernel::builder().build().unwrap();
    let err = Timer::new(&kernel, "bad", 0, true, |_| {}).unwrap_err();
    assert_eq!(err, Error::Contract(ContractViolation::ZeroPeriod));
}
