use crate::cluster::{Communicator, LocalFabric, Tag};
use crate::query::progress::{
    BarRenderer, ProgressDisplay, ProgressRenderer, ProgressReporter, ProgressState,
    SilentRenderer, run_progress_duty,
};
use bytes::Bytes;
use std::sync::Arc;

fn fabric(size: usize) -> Vec<Arc<dyn Communicator>> {
    LocalFabric::build(size)
        .into_iter()
        .map(|c| Arc::new(c) as Arc<dyn Communicator>)
        .collect()
}

#[test]
fn state_counts_per_source_and_rejects_overflow() {
    let mut state = ProgressState::new(vec![0, 2, 1]);
    assert_eq!(state.goal_sum(), 3);
    assert!(!state.is_complete());

    state.record_done(1).unwrap();
    state.record_done(2).unwrap();
    assert!(state.record_done(2).is_err());
    assert!(state.record_done(0).is_err());
    assert!(state.record_done(7).is_err());

    assert_eq!(state.done(1), 1);
    assert_eq!(state.done_sum(), 2);
    assert!((state.percent() - 200.0 / 3.0).abs() < 1e-9);

    state.record_done(1).unwrap();
    assert!(state.is_complete());
    assert_eq!(state.percent(), 100.0);
}

#[test]
fn empty_goal_is_complete() {
    let state = ProgressState::new(vec![0, 0]);
    assert!(state.is_complete());
    assert_eq!(state.percent(), 100.0);
}

#[test]
fn display_names_parse() {
    assert_eq!("BAR".parse::<ProgressDisplay>().unwrap(), ProgressDisplay::Bar);
    assert_eq!("none".parse::<ProgressDisplay>().unwrap(), ProgressDisplay::None);
    assert!("spinner".parse::<ProgressDisplay>().is_err());
}

#[test]
fn bar_renders_fraction_of_files() {
    let mut state = ProgressState::new(vec![0, 4]);
    state.record_done(1).unwrap();
    let mut renderer = BarRenderer::new(Vec::new());
    renderer.render(&state);
    renderer.finish(&state);

    let text = String::from_utf8(renderer.into_inner()).unwrap();
    assert!(text.starts_with('\r'));
    assert!(text.contains("25.0%"));
    assert!(text.contains("(1/4 files)"));
    assert!(text.ends_with('\n'));
}

#[tokio::test]
async fn duty_completes_when_every_worker_reports_its_files() {
    let comms = fabric(4);
    let goals = [0u64, 3, 0, 5];

    let duty = tokio::spawn(run_progress_duty(
        Arc::clone(&comms[0]),
        Box::new(SilentRenderer),
    ));

    let mut workers = Vec::new();
    for comm in comms.iter().skip(1).cloned() {
        let goal = goals[comm.rank()];
        workers.push(tokio::spawn(async move {
            let reporter = ProgressReporter::start(comm, goal).await?;
            let handles: Vec<_> = (0..goal).map(|_| reporter.handle()).collect();
            let threads: Vec<_> = handles
                .into_iter()
                .map(|h| std::thread::spawn(move || h.file_done()))
                .collect();
            for t in threads {
                t.join().unwrap();
            }
            reporter.finish().await
        }));
    }

    for (rank, worker) in workers.into_iter().enumerate() {
        assert_eq!(worker.await.unwrap().unwrap(), goals[rank + 1]);
    }
    let state = duty.await.unwrap().unwrap();
    assert!(state.is_complete());
    assert_eq!(state.goal(3), 5);
    assert_eq!(state.done(1), 3);
    assert_eq!(state.done_sum(), 8);
}

#[tokio::test]
async fn duty_ends_right_after_gather_when_nothing_to_do() {
    let comms = fabric(3);
    let duty = tokio::spawn(run_progress_duty(
        Arc::clone(&comms[0]),
        Box::new(SilentRenderer),
    ));
    for comm in comms.iter().skip(1).cloned() {
        let reporter = ProgressReporter::start(comm, 0).await.unwrap();
        assert_eq!(reporter.finish().await.unwrap(), 0);
    }
    let state = duty.await.unwrap().unwrap();
    assert_eq!(state.goal_sum(), 0);
}

#[tokio::test]
async fn non_empty_progress_message_is_rejected() {
    let comms = fabric(2);
    let duty = tokio::spawn(run_progress_duty(
        Arc::clone(&comms[0]),
        Box::new(SilentRenderer),
    ));
    let reporter = ProgressReporter::start(Arc::clone(&comms[1]), 2).await.unwrap();
    comms[1]
        .send(0, Tag::Progress, Bytes::from_static(b"x"))
        .await
        .unwrap();

    assert!(duty.await.unwrap().is_err());
    drop(reporter);
}
