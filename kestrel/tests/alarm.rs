mod common;

use common::{settle, wait_for, wait_parked};
use kestrel::{
    alarm::Alarm,
    interrupt::InterruptGuard,
    thread::{ThreadBuilder, ThreadState, get_state_by_tid},
    timer::{HardwareTimer, Timer},
};
use std::sync::{Arc, Mutex};

fn machine(interval: u64) -> (Arc<Timer>, Arc<Alarm>) {
    let timer = Arc::new(Timer::new(interval));
    let alarm = Alarm::new(timer.clone());
    (timer, alarm)
}

#[test]
fn wakes_at_first_interrupt_past_deadline() {
    let (timer, alarm) = machine(10);
    timer.advance_to(100);

    let woke_at = Arc::new(Mutex::new(None));
    let sleeper = {
        let (timer, alarm, woke_at) = (timer.clone(), alarm.clone(), woke_at.clone());
        ThreadBuilder::new("sleeper").spawn(move || {
            alarm.wait_until(50);
            *woke_at.lock().unwrap() = Some(timer.time());
        })
    };
    wait_for("the sleeper to register", || alarm.pending() == 1);
    wait_parked(sleeper.tid);

    timer.advance_to(149);
    settle();
    assert_eq!(
        get_state_by_tid(sleeper.tid),
        Ok(ThreadState::Parked),
        "Woken before its deadline"
    );
    assert_eq!(alarm.pending(), 1);

    timer.advance_to(150);
    assert_eq!(alarm.pending(), 0);
    assert_eq!(sleeper.join(), 0);
    assert!(woke_at.lock().unwrap().is_some_and(|t| t >= 150));
}

#[test]
fn equal_deadlines_wake_together() {
    let (timer, alarm) = machine(10);
    let sleepers = (0..4)
        .map(|i| {
            let alarm = alarm.clone();
            ThreadBuilder::new(format!("twin {i}")).spawn(move || alarm.wait_until(30))
        })
        .collect::<Vec<_>>();
    wait_for("all sleepers to register", || alarm.pending() == 4);

    timer.advance_to(20);
    assert_eq!(alarm.pending(), 4);
    timer.advance_to(30);
    assert_eq!(alarm.pending(), 0);
    for sleeper in sleepers {
        assert_eq!(sleeper.join(), 0);
    }
}

#[test]
fn wakes_in_deadline_order() {
    let (timer, alarm) = machine(10);
    let order = Arc::new(Mutex::new(Vec::new()));
    let deadlines = [50u64, 10, 40, 20, 30];
    let sleepers = deadlines
        .iter()
        .map(|&ticks| {
            let (alarm, order) = (alarm.clone(), order.clone());
            ThreadBuilder::new(format!("sleep {ticks}")).spawn(move || {
                alarm.wait_until(ticks);
                order.lock().unwrap().push(ticks);
            })
        })
        .collect::<Vec<_>>();
    wait_for("all sleepers to register", || alarm.pending() == 5);

    for (woken, t) in [10u64, 20, 30, 40, 50].into_iter().enumerate() {
        timer.advance_to(t);
        assert_eq!(alarm.pending(), deadlines.len() - woken - 1);
        wait_for("the woken sleeper to record", || {
            order.lock().unwrap().len() == woken + 1
        });
    }
    for sleeper in sleepers {
        sleeper.join();
    }
    assert_eq!(*order.lock().unwrap(), vec![10, 20, 30, 40, 50]);
}

#[test]
fn interrupt_with_nothing_due_wakes_nobody() {
    let (timer, alarm) = machine(10);
    alarm.timer_interrupt();
    timer.advance(100);
    assert_eq!(alarm.pending(), 0);

    let sleeper = {
        let alarm = alarm.clone();
        ThreadBuilder::new("late").spawn(move || alarm.wait_until(1000))
    };
    wait_for("the sleeper to register", || alarm.pending() == 1);
    timer.interrupt();
    alarm.timer_interrupt();
    assert_eq!(alarm.pending(), 1);

    timer.advance(1000);
    assert_eq!(sleeper.join(), 0);
}

#[test]
fn zero_ticks_waits_for_next_interrupt() {
    let (timer, alarm) = machine(10);
    timer.advance_to(5);
    let sleeper = {
        let alarm = alarm.clone();
        ThreadBuilder::new("zero").spawn(move || alarm.wait_until(0))
    };
    wait_for("the sleeper to register", || alarm.pending() == 1);
    wait_parked(sleeper.tid);

    timer.interrupt();
    assert_eq!(alarm.pending(), 0);
    assert_eq!(sleeper.join(), 0);
}

#[test]
fn interrupt_while_masked() {
    let (timer, alarm) = machine(10);
    let sleeper = {
        let alarm = alarm.clone();
        ThreadBuilder::new("masked").spawn(move || alarm.wait_until(10))
    };
    wait_for("the sleeper to register", || alarm.pending() == 1);

    let mask = InterruptGuard::new();
    timer.advance_to(10);
    drop(mask);
    assert_eq!(sleeper.join(), 0);
}

#[test]
fn ping() {
    const THREADS: usize = 7;
    let (timer, alarm) = machine(20);
    let threads = [731u64, 12, 498, 999, 3, 250, 640]
        .into_iter()
        .enumerate()
        .map(|(i, ticks)| {
            let (timer, alarm) = (timer.clone(), alarm.clone());
            ThreadBuilder::new(format!("thread {i}0{i}")).spawn(move || {
                let start = timer.time();
                alarm.wait_until(ticks);
                assert!(timer.time() >= start + ticks);
            })
        })
        .collect::<Vec<_>>();
    wait_for("every ping to register", || alarm.pending() == THREADS);

    while alarm.pending() > 0 {
        timer.advance(timer.interval());
    }
    for th in threads {
        assert_eq!(th.join(), 0);
    }
}
