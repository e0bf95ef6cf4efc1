use crt_reveal::schema::{Script, Timing};
use crt_reveal::timeline::{schedule, Phase, PhaseState, Timeline};

fn script(title: &str, poem: &[&str]) -> Script {
    Script {
        title: title.to_owned(),
        greeting: "YO".to_owned(),
        poem: poem.iter().map(|line| (*line).to_owned()).collect(),
        signature: "S".to_owned(),
        timing: Timing::default(),
        effects: Default::default(),
        font: None,
    }
}

/// Advances on a 1 ms clock, returning every snapshot.
fn replay(script: &Script, until_ms: u64) -> Vec<(u64, PhaseState)> {
    let mut state = PhaseState::new(0);
    let mut snapshots = Vec::with_capacity(until_ms as usize);
    for now in 1..=until_ms {
        state = state.advanced(script, now);
        snapshots.push((now, state));
    }
    snapshots
}

fn first_time(snapshots: &[(u64, PhaseState)], pred: impl Fn(&PhaseState) -> bool) -> Option<u64> {
    snapshots
        .iter()
        .find(|(_, state)| pred(state))
        .map(|(now, _)| *now)
}

#[test]
fn title_hi_types_one_character_per_interval() {
    let script = script("HI", &["ABCDE"]);
    let state = PhaseState::new(0).advanced(&script, 81);
    assert_eq!(state.char_index, 1);
    let state = state.advanced(&script, 162);
    assert_eq!(state.char_index, 2);

    let state = state.advanced(&script, 500);
    assert_eq!(state.phase, Phase::Title);
    assert_eq!(state.char_index, 2, "index never passes the title length");
}

#[test]
fn title_waits_for_typing_time_plus_delay() {
    let script = script("HI", &["ABCDE"]);
    let snapshots = replay(&script, 5_000);
    let greeting_at = first_time(&snapshots, |state| state.phase == Phase::Greeting)
        .expect("greeting reached");
    assert!(greeting_at > 2 * 80 + 1_000, "greeting started at {greeting_at}");
    assert!(greeting_at <= 2 * 80 + 1_000 + 81);
}

#[test]
fn poem_line_holds_for_half_delay_then_signature_after_full_delay() {
    let script = script("HI", &["ABCDE"]);
    let snapshots = replay(&script, 20_000);

    let poem_at = first_time(&snapshots, |state| state.phase == Phase::Poem).expect("poem");
    let line_done_at = first_time(&snapshots, |state| {
        state.phase == Phase::Poem && state.poem_line_index == 1
    })
    .expect("line consumed");
    let signature_at =
        first_time(&snapshots, |state| state.phase == Phase::Signature).expect("signature");

    assert!(line_done_at - poem_at > 5 * 80 + 500);
    assert!(line_done_at - poem_at <= 5 * 80 + 500 + 81);
    assert!(signature_at - line_done_at > 1_000);
    assert!(signature_at - line_done_at <= 1_000 + 81);
}

#[test]
fn indices_grow_within_a_phase_and_reset_on_entry() {
    let script = script("HELLO", &["first line", "second"]);
    let mut timeline = Timeline::new(0);
    let mut previous = *timeline.state();
    let mut order = vec![Phase::Title];

    for now in (7..60_000).step_by(7) {
        let change = timeline.advance(&script, now);
        let state = *timeline.state();
        match change {
            Some((from, to)) => {
                assert_eq!(from.next(), Some(to), "no skipped phases");
                assert_eq!(state.char_index, 0);
                if to == Phase::Poem {
                    assert_eq!((state.poem_line_index, state.poem_char_index), (0, 0));
                }
                if to == Phase::Signature {
                    assert_eq!(state.signature_char_index, 0);
                }
                order.push(to);
            }
            None => {
                assert!(state.char_index >= previous.char_index);
                assert!(state.poem_line_index >= previous.poem_line_index);
                assert!(state.signature_char_index >= previous.signature_char_index);
                assert!(state.fade_progress >= previous.fade_progress);
            }
        }
        assert!((0.0..=1.0).contains(&state.fade_progress));
        previous = state;
    }

    assert_eq!(order, Phase::ALL.to_vec());
    assert!(previous.is_complete());
}

#[test]
fn same_timestamps_give_same_snapshots() {
    let script = Script::default();
    let stamps = (0..4_000u64).map(|i| i * 17 + (i % 5)).collect::<Vec<_>>();
    let run = || {
        let mut state = PhaseState::new(0);
        stamps
            .iter()
            .map(|&now| {
                state = state.advanced(&script, now);
                state
            })
            .collect::<Vec<_>>()
    };
    assert_eq!(run(), run());
}

#[test]
fn schedule_matches_replay() {
    let script = script("HI", &["ABCDE", "XY"]);
    let plan = schedule(&script, 1, 60_000);
    let snapshots = replay(&script, 60_000);
    for mark in &plan.marks[1..] {
        let seen = first_time(&snapshots, |state| state.phase == mark.phase);
        assert_eq!(seen, Some(mark.starts_at_ms), "{:?}", mark.phase);
    }
    let done = first_time(&snapshots, PhaseState::is_complete);
    assert_eq!(done, plan.completes_at_ms);
}
