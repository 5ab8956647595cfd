// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serial_test::serial;

use super::*;
use crate::sink::mock;
use crate::testutil::eventually;

fn scheduler(capacity: usize) -> (Scheduler, Arc<mock::Sink>) {
    let sink = Arc::new(mock::Sink::get("test"));
    let config = config::Scheduler::default()
        .with_capacity(capacity)
        .with_idle_yield("0ms");
    let scheduler = Scheduler::new(&config, sink.clone()).unwrap();
    (scheduler, sink)
}

/// A sound lasting the given number of 10ms frames.
fn sound(frames: usize) -> Sound {
    Sound::from_raw(vec![1000i16; frames * 240], false, 24000)
}

fn looping() -> InjectorOptions {
    InjectorOptions::default().with_looping(true)
}

#[test]
#[serial]
fn test_zero_sample_rate_is_rejected() {
    let sink = Arc::new(mock::Sink::get("test"));
    let config = config::Scheduler::default().with_sample_rate(0);
    let result = Scheduler::new(&config, sink);
    assert!(matches!(
        result,
        Err(SchedulerError::Config(ConfigError::Invalid { .. }))
    ));
}

#[test]
#[serial]
fn test_admission_cap() {
    let (scheduler, sink) = scheduler(40);

    let mut handles: Vec<InjectorHandle> = (0..40)
        .map(|_| scheduler.submit(sound(4), looping()).unwrap())
        .collect();
    assert_eq!(scheduler.queued(), 40);
    assert_eq!(
        scheduler.submit(sound(4), looping()).unwrap_err(),
        Rejected::QueueFull { capacity: 40 }
    );

    handles[0].stop().unwrap();
    eventually(|| scheduler.queued() == 39, "Queue never shrank");
    assert_eq!(sink.stop_count(handles[0].id()), 1);

    handles.push(scheduler.submit(sound(4), looping()).unwrap());
    assert_eq!(scheduler.queued(), 40);
    assert_eq!(
        scheduler.submit(sound(4), looping()).unwrap_err(),
        Rejected::QueueFull { capacity: 40 }
    );
}

#[test]
#[serial]
fn test_completion_frees_a_slot() {
    let (scheduler, _sink) = scheduler(2);
    let _long = scheduler.submit(sound(4), looping()).unwrap();
    let short = scheduler.submit(sound(1), InjectorOptions::default()).unwrap();

    eventually(
        || short.state() == InjectorState::Finished,
        "Short injector never finished",
    );
    eventually(|| scheduler.queued() == 1, "Queue never shrank");
    assert!(scheduler.submit(sound(4), looping()).is_ok());
}

#[test]
#[serial]
fn test_due_order() {
    let (scheduler, sink) = scheduler(40);
    let t = Instant::now() + Duration::from_millis(50);

    let later = scheduler
        .submit_at(sound(1), InjectorOptions::default(), t + Duration::from_millis(1))
        .unwrap();
    let sooner = scheduler
        .submit_at(sound(1), InjectorOptions::default(), t)
        .unwrap();

    eventually(|| sink.total_frames() >= 2, "Frames never produced");
    assert_eq!(sink.order()[..2], [sooner.id(), later.id()]);
}

#[test]
#[serial]
fn test_frames_reach_sink() {
    let (scheduler, sink) = scheduler(40);
    let handle = scheduler.submit(sound(5), InjectorOptions::default()).unwrap();

    eventually(
        || handle.state() == InjectorState::Finished,
        "Injector never finished",
    );
    let frames = sink.frames(handle.id());
    assert_eq!(frames.len(), 5);
    for (i, frame) in frames.iter().enumerate() {
        assert_eq!(frame.sequence, i as u16);
        assert_eq!(frame.sample_count(), 240);
    }
    assert_eq!(sink.stop_count(handle.id()), 1);
    assert!(!handle.is_playing());
    assert_eq!(scheduler.queued(), 0);
}

#[test]
#[serial]
fn test_frames_are_paced() {
    let (scheduler, sink) = scheduler(40);
    let start = Instant::now();
    let handle = scheduler.submit(sound(10), InjectorOptions::default()).unwrap();

    eventually(
        || handle.state() == InjectorState::Finished,
        "Injector never finished",
    );
    assert_eq!(sink.frame_count(handle.id()), 10);
    // Ten frames at 10ms each, the first one immediate.
    assert!(start.elapsed() >= Duration::from_millis(90));
}

#[test]
#[serial]
fn test_shutdown_finalizes_once() {
    let (scheduler, sink) = scheduler(40);
    let handles: Vec<InjectorHandle> = (0..10)
        .map(|_| scheduler.submit(sound(4), looping()).unwrap())
        .collect();

    eventually(
        || handles.iter().all(|h| sink.frame_count(h.id()) > 0),
        "Not every injector produced a frame",
    );

    scheduler.shutdown();
    for handle in handles.iter() {
        assert_eq!(sink.stop_count(handle.id()), 1);
        assert_eq!(handle.state(), InjectorState::Finished);
    }

    let produced = sink.total_frames();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(sink.total_frames(), produced);

    // Idempotent, and nothing new is admitted.
    scheduler.shutdown();
    assert!(scheduler.is_stopping());
    assert_eq!(
        scheduler.submit(sound(1), looping()).unwrap_err(),
        Rejected::Stopping
    );
    assert_eq!(handles[0].stop().unwrap_err(), Rejected::Stopping);
    for handle in handles.iter() {
        assert_eq!(sink.stop_count(handle.id()), 1);
    }
}

#[test]
#[serial]
fn test_drop_shuts_down() {
    let (scheduler, sink) = scheduler(40);
    let handle = scheduler.submit(sound(4), looping()).unwrap();
    drop(scheduler);
    assert_eq!(sink.stop_count(handle.id()), 1);
}

#[test]
#[serial]
fn test_stop_from_another_thread() {
    let (scheduler, sink) = scheduler(40);
    let handle = Arc::new(scheduler.submit(sound(4), looping()).unwrap());

    eventually(|| handle.is_playing(), "Injector never started");
    let remote = handle.clone();
    thread::spawn(move || remote.stop().unwrap()).join().unwrap();

    eventually(
        || handle.state() == InjectorState::Finished,
        "Injector never stopped",
    );
    assert!(!handle.is_playing());
    assert_eq!(sink.stop_count(handle.id()), 1);
    eventually(|| scheduler.queued() == 0, "Queue never emptied");

    // A second stop is a no-op.
    handle.stop().unwrap();
    thread::sleep(Duration::from_millis(20));
    assert_eq!(sink.stop_count(handle.id()), 1);
}

#[test]
#[serial]
fn test_restart_after_finish() {
    let (scheduler, sink) = scheduler(40);
    let handle = scheduler.submit(sound(2), InjectorOptions::default()).unwrap();

    eventually(
        || handle.state() == InjectorState::Finished,
        "Injector never finished",
    );
    assert_eq!(sink.frame_count(handle.id()), 2);

    handle.restart().unwrap();
    eventually(
        || sink.frame_count(handle.id()) == 4,
        "Restarted injector produced no frames",
    );
    let frames = sink.frames(handle.id());
    // The sequence keeps counting across restarts.
    assert_eq!(frames[2].sequence, 2);

    // Each run that finishes stops the injector once.
    eventually(
        || sink.stop_count(handle.id()) == 2,
        "Restarted injector never stopped",
    );
    thread::sleep(Duration::from_millis(20));
    assert_eq!(sink.stop_count(handle.id()), 2);
}

#[test]
#[serial]
fn test_set_options_applies_on_worker() {
    let (scheduler, sink) = scheduler(40);
    let handle = scheduler.submit(sound(4), looping()).unwrap();

    eventually(|| sink.frame_count(handle.id()) > 0, "No frames produced");
    assert!(handle.loudness() > 0.0);

    handle
        .set_options(looping().with_volume(0.0))
        .unwrap();
    eventually(
        || {
            sink.frames(handle.id())
                .last()
                .is_some_and(|frame| frame.is_silent())
        },
        "Volume change never applied",
    );
    eventually(|| handle.loudness() == 0.0, "Loudness never dropped");
}

#[test]
#[serial]
fn test_repitch_does_not_block_admission() {
    let (scheduler, sink) = scheduler(40);
    // Five minutes of audio takes a while to repitch.
    let long = Sound::from_raw(vec![1000i16; 24000 * 300], false, 24000);
    let handle = scheduler.submit(long, looping()).unwrap();
    eventually(|| sink.frame_count(handle.id()) > 0, "No frames produced");

    handle.set_options(looping().with_pitch(1.5)).unwrap();

    let mut slowest = Duration::ZERO;
    let mut admitted = Vec::new();
    let start = Instant::now();
    while start.elapsed() < Duration::from_millis(300) {
        let before = Instant::now();
        let _ = scheduler.queued();
        if admitted.len() < 10 {
            admitted.push(scheduler.submit(sound(1), InjectorOptions::default()).unwrap());
        }
        slowest = slowest.max(before.elapsed());
        thread::sleep(Duration::from_millis(5));
    }
    assert!(
        slowest < Duration::from_millis(50),
        "Admission stalled for {slowest:?}"
    );

    let sent = sink.frame_count(handle.id());
    eventually(
        || sink.frame_count(handle.id()) > sent,
        "Repitched injector stopped producing",
    );
}

#[test]
#[serial]
fn test_concurrent_submits_respect_capacity() {
    let (scheduler, _sink) = scheduler(40);

    let results: Vec<Result<InjectorHandle, Rejected>> = thread::scope(|scope| {
        let workers: Vec<_> = (0..8)
            .map(|_| {
                scope.spawn(|| {
                    (0..10)
                        .map(|_| scheduler.submit(sound(4), looping()))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        workers
            .into_iter()
            .flat_map(|worker| worker.join().unwrap())
            .collect()
    });

    let admitted = results.iter().filter(|result| result.is_ok()).count();
    assert_eq!(admitted, 40);
    for result in results.iter().filter_map(|result| result.as_ref().err()) {
        assert_eq!(*result, Rejected::QueueFull { capacity: 40 });
    }
    assert_eq!(scheduler.queued(), 40);
}

#[test]
#[serial]
fn test_detached_injector() {
    let (scheduler, sink) = scheduler(40);
    let id = scheduler
        .submit_detached(sound(2), InjectorOptions::default())
        .unwrap();

    eventually(|| sink.stop_count(id) == 1, "Detached injector never finished");
    assert_eq!(sink.frame_count(id), 2);
    assert_eq!(scheduler.queued(), 0);
}

#[test]
#[serial]
fn test_sink_errors_are_skipped() {
    let (scheduler, sink) = scheduler(40);
    sink.set_failing(true);
    let handle = scheduler.submit(sound(3), InjectorOptions::default()).unwrap();

    eventually(
        || handle.state() == InjectorState::Finished,
        "Injector never finished",
    );
    assert_eq!(sink.frame_count(handle.id()), 0);
    assert_eq!(sink.stop_count(handle.id()), 1);
}
