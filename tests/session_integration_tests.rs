//! Integration tests for Session, Dispatcher and Prompt working together
//!
//! These tests verify that:
//! - Prompts return exactly the value and timestamp of the submit that answered them
//! - Reset starts a fresh round on the same widgets
//! - Shutdown unblocks every waiter with SessionClosed
//! - The dispatcher rejects work after close, every time
//! - Dispatched work runs in FIFO order and results reach their own caller
//! - Registry operations are idempotent and fail cleanly

use anyhow::Context;
use indexmap::IndexMap;
use quickprompt::{
    Error, HeadlessProbe, HeadlessToolkit, ManualClock, PlacementId, Prompt, PromptSetup,
    PromptState, Session, SessionConfig, SessionHandle, SubmitPolicy, Timestamp, WidgetSpec,
    presets, setup_fn,
};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

fn two_buttons() -> impl PromptSetup<i32> {
    let buttons = IndexMap::from([("A".to_string(), 1), ("B".to_string(), 2)]);
    presets::button_row("Choose", buttons, IndexMap::new())
}

/// Run a session on the current thread with a headless toolkit and a manual clock.
fn run_headless<R, F>(config: SessionConfig, logic: F) -> anyhow::Result<R>
where
    F: FnOnce(SessionHandle, HeadlessProbe, ManualClock) -> anyhow::Result<R> + Send + 'static,
    R: Send + 'static,
{
    let toolkit = HeadlessToolkit::new();
    let probe = toolkit.probe();
    let clock = ManualClock::new(0.0);
    let logic_clock = clock.clone();
    Session::new(toolkit, config)
        .with_clock(clock)
        .run(|_| Ok(()), move |handle| logic(handle, probe, logic_clock))
}

/// Poll until `prompt` is enabled and waiting in `round`.
fn wait_for_open_round(prompt: &Prompt<i32>, round: u64) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if prompt.round() == round && prompt.state() == PromptState::Enabled {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn test_basic_round_trip_and_reuse() {
    let (first, second) = run_headless(SessionConfig::default(), |handle, probe, clock| {
        let prompt = handle.add_prompt(two_buttons())?;
        prompt.enable()?;

        let b = probe.find_button("B").context("button B missing")?;
        clock.set(10.0);
        assert!(probe.click(b)?);
        let first = prompt.wait_for_response()?.into_pair();

        assert!(prompt.reset()?);
        assert_eq!(prompt.state(), PromptState::Ready);
        prompt.enable()?;

        let a = probe.find_button("A").context("button A missing")?;
        clock.set(12.5);
        assert!(probe.click(a)?);
        let second = prompt.wait_for_response()?.into_pair();

        Ok((first, second))
    })
    .unwrap();

    assert_eq!(first, (2, Timestamp::from(10.0)));
    assert_eq!(second, (1, Timestamp::from(12.5)));
}

#[test]
fn test_presentation_timestamp_never_decreases_across_reset() {
    let stamps = run_headless(SessionConfig::default(), |handle, probe, clock| {
        clock.set(1.0);
        let prompt = handle.add_prompt(two_buttons())?;
        let a = probe.find_button("A").context("button A missing")?;
        let mut stamps = vec![prompt.presentation_timestamp()];

        for _ in 0..3 {
            prompt.enable()?;
            clock.advance(0.25);
            probe.click(a)?;
            let response = prompt.wait_for_response()?;
            assert_eq!(response.presented_at, *stamps.last().unwrap_or(&Timestamp::ZERO));
            clock.advance(0.25);
            prompt.reset()?;
            stamps.push(prompt.presentation_timestamp());
        }
        Ok(stamps)
    })
    .unwrap();

    assert_eq!(stamps[0], Timestamp::from(1.0));
    assert!(stamps.windows(2).all(|pair| pair[0] <= pair[1]));
}

#[test]
fn test_ask_collects_consecutive_answers() {
    let values = run_headless(SessionConfig::default(), |handle, probe, _clock| {
        let prompt = handle.add_prompt(two_buttons())?;
        let a = probe.find_button("A").context("button A missing")?;
        let b = probe.find_button("B").context("button B missing")?;

        let watched = prompt.clone();
        let user = probe.clone();
        let clicker = thread::spawn(move || {
            for (round, widget) in [b, a, b].into_iter().enumerate() {
                if !wait_for_open_round(&watched, round as u64) {
                    return;
                }
                let _ = user.click(widget);
            }
        });

        let mut values = Vec::new();
        for _ in 0..3 {
            values.push(prompt.ask()?.value);
        }
        let _ = clicker.join();
        assert_eq!(prompt.state(), PromptState::Disabled);
        Ok(values)
    })
    .unwrap();

    assert_eq!(values, vec![2, 1, 2]);
}

#[test]
fn test_shutdown_unblocks_waiter() {
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        let outcome = run_headless(SessionConfig::default(), |handle, _probe, _clock| {
            let prompt = handle.add_prompt(two_buttons())?;

            let closer = handle.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                let _ = closer.close();
            });

            Ok(prompt.wait_for_response().map(|r| r.value))
        });
        let _ = tx.send(outcome);
    });

    let outcome = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("session did not shut down in time")
        .unwrap();
    assert!(matches!(outcome, Err(Error::SessionClosed)));
}

#[test]
fn test_window_close_unblocks_waiter() {
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        let outcome = run_headless(SessionConfig::default(), |handle, probe, _clock| {
            let prompt = handle.add_prompt(two_buttons())?;
            probe.close_window()?;
            Ok(prompt.wait_for_response().map(|r| r.value))
        });
        let _ = tx.send(outcome);
    });

    let outcome = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("session did not shut down in time")
        .unwrap();
    assert!(matches!(outcome, Err(Error::SessionClosed)));
}

#[test]
fn test_dispatcher_unavailable_after_close() {
    let session = Session::new(HeadlessToolkit::new(), SessionConfig::default());
    let handle = session.handle();

    let leftover = session
        .run(|_| Ok(()), |handle| {
            let prompt = handle.add_prompt(two_buttons())?;
            handle.close()?;
            for _ in 0..3 {
                assert!(matches!(
                    handle.run_on_ui_context(|_| ()),
                    Err(Error::DispatcherUnavailable)
                ));
            }
            Ok(prompt)
        })
        .unwrap();

    for _ in 0..3 {
        assert!(matches!(
            handle.run_on_ui_context(|_| 1),
            Err(Error::DispatcherUnavailable)
        ));
        assert!(matches!(handle.post(|_| ()), Err(Error::DispatcherUnavailable)));
    }
    assert!(handle.is_closed());
    assert!(handle.close().is_ok());
    assert!(matches!(leftover.enable(), Err(Error::DispatcherUnavailable)));
    assert!(matches!(leftover.wait_for_response(), Err(Error::SessionClosed)));
    assert!(handle.remove_prompt(&leftover).is_ok());
    assert!(handle.metrics().snapshot().unavailable >= 6);
}

#[test]
fn test_concurrent_callers_get_their_own_results() {
    const CALLERS: usize = 4;
    const CALLS: usize = 25;

    let observed = run_headless(SessionConfig::default(), |handle, _probe, _clock| {
        let log = Arc::new(Mutex::new(Vec::new()));

        let workers: Vec<_> = (0..CALLERS)
            .map(|caller| {
                let handle = handle.clone();
                let log = Arc::clone(&log);
                thread::spawn(move || {
                    for call in 0..CALLS {
                        let log = Arc::clone(&log);
                        let echoed = handle
                            .run_on_ui_context(move |_| {
                                log.lock().unwrap().push((caller, call));
                                (caller, call)
                            })
                            .unwrap();
                        assert_eq!(echoed, (caller, call));
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().map_err(|_| anyhow::anyhow!("caller panicked"))?;
        }

        let observed = log.lock().unwrap().clone();
        Ok(observed)
    })
    .unwrap();

    assert_eq!(observed.len(), CALLERS * CALLS);
    for caller in 0..CALLERS {
        let calls: Vec<usize> = observed
            .iter()
            .filter(|(c, _)| *c == caller)
            .map(|(_, call)| *call)
            .collect();
        assert_eq!(calls, (0..CALLS).collect::<Vec<_>>());
    }
}

#[test]
fn test_posted_work_runs_in_fifo_order() {
    let order = run_headless(SessionConfig::default(), |handle, _probe, _clock| {
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..100 {
            let log = Arc::clone(&log);
            handle.post(move |_| log.lock().unwrap().push(i))?;
        }
        let log_at_barrier = Arc::clone(&log);
        let seen = handle.run_on_ui_context(move |_| log_at_barrier.lock().unwrap().len())?;
        assert_eq!(seen, 100);
        let order = log.lock().unwrap().clone();
        Ok(order)
    })
    .unwrap();

    assert_eq!(order, (0..100).collect::<Vec<_>>());
}

#[test]
fn test_moved_arguments_are_isolated() {
    let (ui_copy, caller_copy) = run_headless(SessionConfig::default(), |handle, probe, _clock| {
        let mut data = vec![1, 2, 3];
        let sent = data.clone();

        let mut returned = handle.run_on_ui_context(move |ui| {
            let mut kept = sent;
            kept.push(4);
            ui.create_widget(PlacementId::ROOT, &WidgetSpec::Label { text: format!("{:?}", kept) })
                .map(|_| kept)
        })??;

        data.push(99);
        returned.clear();

        let label = probe.find_widget("[1, 2, 3, 4]").is_some();
        Ok((label, data))
    })
    .unwrap();

    assert!(ui_copy);
    assert_eq!(caller_copy, vec![1, 2, 3, 99]);
}

#[test]
fn test_work_errors_and_panics_reach_the_caller() {
    run_headless(SessionConfig::default(), |handle, _probe, _clock| {
        let failed: Result<(), Error> = handle
            .run_on_ui_context(|_| Err(Error::InvalidLayout("from work".into())))?;
        assert!(matches!(failed, Err(Error::InvalidLayout(m)) if m == "from work"));

        let panicked = handle.run_on_ui_context(|_| -> u8 { panic!("boom") });
        assert!(matches!(panicked, Err(Error::WorkPanicked(m)) if m == "boom"));

        // The loop survives
        assert_eq!(handle.run_on_ui_context(|_| 5)?, 5);
        assert_eq!(handle.metrics().snapshot().work_panics, 1);
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_nested_call_from_ui_thread_runs_inline() {
    run_headless(SessionConfig::default(), |handle, _probe, _clock| {
        let nested = handle.run_on_ui_context(|ui| {
            assert!(ui.dispatcher().is_ui_context());
            ui.dispatcher().run_on_ui_context(|_| 21 * 2)
        })??;
        assert_eq!(nested, 42);
        assert!(!handle.dispatcher().is_ui_context());
        assert!(handle.metrics().snapshot().inline_calls >= 1);
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_enable_disable_and_remove_are_idempotent() {
    run_headless(SessionConfig::default(), |handle, probe, _clock| {
        let prompt = handle.add_prompt(two_buttons())?;
        let a = probe.find_button("A").context("button A missing")?;

        prompt.enable()?;
        prompt.enable()?;
        assert_eq!(prompt.state(), PromptState::Enabled);
        assert!(probe.is_enabled(a));

        prompt.disable()?;
        prompt.disable()?;
        assert_eq!(prompt.state(), PromptState::Disabled);
        assert!(!probe.is_enabled(a));

        handle.remove_prompt(&prompt)?;
        handle.remove_prompt(&prompt)?;
        assert_eq!(handle.prompt_count()?, 0);
        assert!(probe.find_button("A").is_none());
        assert!(matches!(prompt.enable(), Err(Error::PromptRemoved(_))));
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_unconfigured_prompt_fails_fast() {
    run_headless(SessionConfig::default(), |handle, _probe, _clock| {
        let prompt = handle.add_prompt(setup_fn(|_: &Prompt<String>, ui, placement| {
            presets::label(ui, placement, "no return type").map(|_| ())
        }))?;

        assert_eq!(prompt.state(), PromptState::Uninitialized);
        assert_eq!(handle.prompt_count()?, 1);
        assert!(matches!(
            prompt.wait_for_response(),
            Err(Error::PromptNotConfigured(id)) if id == prompt.id()
        ));
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_waiting_on_the_ui_thread_is_rejected() {
    run_headless(SessionConfig::default(), |handle, _probe, _clock| {
        let prompt = handle.add_prompt(two_buttons())?;
        let on_ui = prompt.clone();

        let outcome = handle.run_on_ui_context(move |_| on_ui.wait_for_response().map(|r| r.value))?;

        assert!(matches!(outcome, Err(Error::PromptDeadlockRisk(id)) if id == prompt.id()));
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_failed_setup_registers_nothing() {
    run_headless(SessionConfig::default(), |handle, probe, _clock| {
        let buttons = IndexMap::from([("A".to_string(), 1)]);
        let keys = IndexMap::from([('x', "missing".to_string())]);

        let outcome = handle.add_prompt(presets::button_row("Broken", buttons, keys));
        assert!(matches!(outcome, Err(Error::InvalidLayout(_))));

        let panicked = handle.add_prompt(setup_fn(|_: &Prompt<i32>, _, _| -> quickprompt::Result<()> {
            panic!("setup exploded")
        }));
        assert!(matches!(panicked, Err(Error::WorkPanicked(_))));

        assert_eq!(handle.prompt_count()?, 0);
        assert_eq!(probe.placement_count(), 0);
        assert_eq!(probe.bound_key_count(), 0);
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_first_submit_wins_by_default() {
    run_headless(SessionConfig::default(), |handle, probe, clock| {
        let prompt = handle.add_prompt(two_buttons())?;
        prompt.enable()?;
        let a = probe.find_button("A").context("button A missing")?;
        let b = probe.find_button("B").context("button B missing")?;

        clock.set(1.0);
        probe.click(a)?;
        probe.click(b)?;
        handle.run_on_ui_context(|_| ())?;

        let response = prompt.try_response()?.context("no answer")?;
        assert_eq!(response.into_pair(), (1, Timestamp::from(1.0)));
        assert_eq!(handle.metrics().snapshot().submits_ignored, 1);
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_last_submit_wins_when_configured() {
    let config = SessionConfig {
        submit_policy: SubmitPolicy::LastWins,
        ..SessionConfig::default()
    };
    run_headless(config, |handle, probe, _clock| {
        let prompt = handle.add_prompt(two_buttons())?;
        prompt.enable()?;
        let a = probe.find_button("A").context("button A missing")?;
        let b = probe.find_button("B").context("button B missing")?;

        probe.click(a)?;
        probe.click(b)?;
        handle.run_on_ui_context(|_| ())?;

        assert_eq!(prompt.try_response()?.context("no answer")?.value, 2);
        assert_eq!(handle.metrics().snapshot().submits_replaced, 1);
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_bulk_enable_disable_and_clear() {
    run_headless(SessionConfig::default(), |handle, probe, _clock| {
        let first = handle.add_prompt(two_buttons())?;
        let second = handle.add_prompt(presets::text_entry("Name?"))?;
        let entry = probe
            .find_spec(&WidgetSpec::TextEntry)
            .context("entry missing")?;

        handle.enable_all()?;
        assert_eq!(first.state(), PromptState::Enabled);
        assert!(probe.is_enabled(entry));

        handle.disable_all()?;
        assert_eq!(second.state(), PromptState::Disabled);
        assert!(!probe.is_enabled(entry));

        handle.clear_prompts()?;
        assert_eq!(handle.prompt_count()?, 0);
        assert!(first.is_detached());
        assert!(second.is_detached());
        assert_eq!(probe.placement_count(), 0);
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_nested_placements() {
    run_headless(SessionConfig::default(), |handle, probe, _clock| {
        let panel = handle.run_on_ui_context(|ui| ui.create_placement(PlacementId::ROOT))??;
        let buttons = IndexMap::from([("A".to_string(), 1), ("B".to_string(), 2)]);
        let keys = IndexMap::from([('a', "A".to_string())]);
        let prompt = handle.add_prompt_in(panel, presets::button_row("Choose", buttons, keys))?;
        assert_ne!(prompt.placement(), panel);
        assert_eq!(probe.bound_key_count(), 1);

        handle.run_on_ui_context(move |ui| ui.destroy_placement(panel))??;

        // Taking the parent down removes the prompt inside it.
        assert!(probe.find_button("A").is_none());
        assert_eq!(handle.prompt_count()?, 0);
        assert_eq!(probe.bound_key_count(), 0);
        assert!(prompt.is_detached());
        assert!(matches!(prompt.enable(), Err(Error::PromptRemoved(_))));
        assert!(matches!(prompt.try_response(), Err(Error::PromptRemoved(_))));

        handle.remove_prompt(&prompt)?;
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_text_entry_and_dropdown_through_the_probe() {
    let (name, speed) = run_headless(SessionConfig::default(), |handle, probe, _clock| {
        let name = handle.add_prompt(presets::text_entry("Name?"))?;
        let speed = handle.add_prompt(presets::dropdown(
            "Speed",
            vec![("slow".to_string(), 1u8), ("fast".to_string(), 9u8)],
        ))?;
        let entry = probe
            .find_spec(&WidgetSpec::TextEntry)
            .context("entry missing")?;
        let menu = probe
            .find_spec(&WidgetSpec::Dropdown {
                options: vec!["slow".to_string(), "fast".to_string()],
            })
            .context("dropdown missing")?;

        // Disabled widgets refuse input
        assert!(!probe.commit_text(entry, "ignored")?);
        assert!(!probe.select(menu, 0)?);
        // Wrong kind of widget
        assert!(!probe.click(entry)?);

        handle.enable_all()?;
        assert!(probe.commit_text(entry, "Ada")?);
        assert!(probe.select(menu, 7)?);
        assert!(probe.select(menu, 1)?);

        let name = name.wait_for_response()?.value;
        let speed = speed.wait_for_response()?.value;
        Ok((name, speed))
    })
    .unwrap();

    assert_eq!(name, "Ada");
    assert_eq!(speed, 9);
}

#[test]
fn test_probe_observes_enable_and_disable() {
    run_headless(SessionConfig::default(), |handle, probe, _clock| {
        let watcher = probe.clone();
        let observer = thread::spawn(move || {
            let Some(button) = watcher.wait_for_button("A", Duration::from_secs(5)) else {
                return false;
            };
            watcher.wait_until_enabled(button, Duration::from_secs(5))
                && watcher.wait_until_disabled(button, Duration::from_secs(5))
        });

        let prompt = handle.add_prompt(two_buttons())?;
        let a = probe.find_button("A").context("button A missing")?;
        assert!(!probe.is_enabled(a));

        prompt.enable()?;
        // Hold the enabled state until the observer has seen it.
        thread::sleep(Duration::from_millis(100));
        prompt.disable()?;

        assert!(observer.join().map_err(|_| anyhow::anyhow!("observer panicked"))?);
        Ok(())
    })
    .unwrap();
}
