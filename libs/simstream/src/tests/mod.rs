use std::sync::Arc;
use std::time::{Duration, Instant};

use approx::assert_relative_eq;
use arcstr::ArcStr;
use celllib::{MemStore, Resolver};
use directives::{translate, Ac, Directive, Ngspice, Probe, Spacing, Tran};
use flatten::{CompileOptions, Compiler, FlatNetlist, LocationKind, NetlistOptions};
use futures_util::StreamExt;
use indexmap::IndexMap;
use num::complex::Complex64;
use rust_decimal_macros::dec;
use schir::{Cell, CellRef, DeviceKind, Instance, ParamDecl, Schematic};

use crate::config::MAX_SAMPLES_DEFAULT;
use crate::intake::Intake;
use crate::ordering::Reorderer;
use crate::protocol::ClientMessage;
use crate::session::{History, Shared};
use crate::*;

use server::{closed_addr, Kind, Step, TestServer};

mod server;

const NS: &str = "analog";
const GRACE: Duration = Duration::from_millis(300);

fn inst(name: &str, cell: &str, conns: &[(&str, &str)], value: &str) -> Instance {
    let mut inst = Instance::new(name, CellRef::new(NS, cell));
    for (port, net) in conns {
        inst.connect(*port, *net);
    }
    inst.set_param("value", value);
    inst
}

/// A source driving an RC low-pass filter.
///
/// Renders as `* rc`, `Vv1 in 0 1`, `Rr1 in out 1000`, `Cc1 out 0 ...`.
fn rc_netlist() -> FlatNetlist {
    let store = MemStore::new();
    for (name, kind) in [
        ("res", DeviceKind::Resistor),
        ("cap", DeviceKind::Capacitor),
        ("vsource", DeviceKind::Vsource),
    ] {
        let mut cell = Cell::primitive(name, kind);
        cell.add_param("value", ParamDecl::required());
        store.insert(NS, "v1", cell);
    }
    let resolver = Resolver::new(Arc::new(store));

    let mut schematic = Schematic::new();
    for net in ["in", "out", "0"] {
        schematic.add_net(net);
    }
    schematic
        .add_instance(inst("v1", "vsource", &[("p", "in"), ("n", "0")], "1"))
        .add_instance(inst("r1", "res", &[("p", "in"), ("n", "out")], "1k"))
        .add_instance(inst("c1", "cap", &[("p", "out"), ("n", "0")], "1n"));
    let top = Cell::subcircuit("rc", schematic);

    Compiler::flatten(&top, &resolver, &CompileOptions::default()).unwrap()
}

fn rc_submission() -> Submission {
    let netlist = rc_netlist();
    let tran = Tran {
        step: dec!(0.0001),
        stop: dec!(0.001),
        start: None,
        probes: vec![Probe::voltage("out"), Probe::current("r1")],
    };
    let directives = translate(&[Directive::from(tran)], &netlist.nets, &Ngspice).unwrap();
    Submission::new(&netlist, &NetlistOptions::default(), directives)
}

/// A transient sample as ngspice would name its vectors, in the opposite
/// order to the probes.
fn sample(x: f64) -> ResultRecord {
    let mut values = IndexMap::new();
    values.insert(
        arcstr::literal!("@rr1[i]"),
        SampleValue::from((-x / 1e-6).exp() / 1000.0),
    );
    values.insert(
        arcstr::literal!("v(out)"),
        SampleValue::from(1.0 - (-x / 1e-6).exp()),
    );
    ResultRecord::Sample(Sample {
        analysis: arcstr::literal!("tran"),
        x,
        values,
    })
}

fn done() -> ResultRecord {
    ResultRecord::Done(FinalStatus::Completed)
}

fn config(addr: &str) -> ClientConfigBuilder {
    let mut builder = ClientConfig::builder();
    builder
        .addr(addr)
        .connect_timeout(Duration::from_secs(1))
        .accept_timeout(Duration::from_secs(1))
        .idle_timeout(Duration::from_secs(2))
        .cancel_grace(GRACE);
    builder
}

fn xs(records: &[ResultRecord]) -> Vec<f64> {
    records
        .iter()
        .filter_map(ResultRecord::as_sample)
        .map(|s| s.x)
        .collect()
}

#[test_log::test(tokio::test)]
async fn rc_session_streams_renamed_samples() {
    let mut script = vec![
        Step::Expect(Kind::Submit),
        Step::Accept(7),
        Step::Record(ResultRecord::Progress(0.0)),
    ];
    for i in 0..10 {
        script.push(Step::Record(sample(i as f64 * 1e-4)));
    }
    script.push(Step::Record(done()));
    let server = TestServer::start(script).await;

    let client = SimClient::new(config(&server.addr()).build());
    let mut session = client.submit(rc_submission()).await.unwrap();
    assert_eq!(session.id(), 7);

    let mut records = Vec::new();
    while let Some(record) = session.next().await {
        records.push(record);
    }

    let samples: Vec<&Sample> = records.iter().filter_map(ResultRecord::as_sample).collect();
    assert_eq!(samples.len(), 10);
    for (i, sample) in samples.iter().enumerate() {
        assert_relative_eq!(sample.x, i as f64 * 1e-4);
        let names: Vec<&str> = sample.values.keys().map(ArcStr::as_str).collect();
        assert_eq!(names, ["v(out)", "i(r1)"]);
    }
    assert_relative_eq!(
        samples[1].value("i(r1)").unwrap().re(),
        (-100.0f64).exp() / 1000.0
    );
    assert!(records.last().unwrap().is_done());
    assert!(matches!(session.state(), SessionState::Completed));
    assert_eq!(session.history().len(), 12);
    assert_eq!(session.history().samples().count(), 10);

    let received = server.received();
    let ClientMessage::Submit { deck, .. } = &received[0] else {
        panic!("expected a submission, got {:?}", received[0]);
    };
    assert!(deck.starts_with("* rc\n"));
    assert!(deck.contains("Rr1 in out 1000\n"));
    assert!(deck.contains(".save v(out) @Rr1[i]\n.tran 0.0001 0.001\n"));
    assert!(deck.ends_with(".end\n"));
}

#[test_log::test(tokio::test)]
async fn ac_samples_keep_complex_values() {
    let netlist = rc_netlist();
    let ac = Ac {
        spacing: Spacing::Dec,
        points: 10,
        fstart: dec!(1),
        fstop: dec!(1e9),
        probes: vec![Probe::voltage("out"), Probe::current("r1")],
    };
    let directives = translate(&[Directive::from(ac)], &netlist.nets, &Ngspice).unwrap();
    let submission = Submission::new(&netlist, &NetlistOptions::default(), directives);

    // At the corner frequency of the filter.
    let f = 1.0 / (2.0 * std::f64::consts::PI * 1e-6);
    let mut values = IndexMap::new();
    values.insert(arcstr::literal!("frequency"), SampleValue::from(f));
    values.insert(
        arcstr::literal!("@rr1[i]"),
        SampleValue::from(Complex64::new(0.5e-3, 0.5e-3)),
    );
    values.insert(
        arcstr::literal!("v(out)"),
        SampleValue::from(Complex64::new(0.5, -0.5)),
    );
    let server = TestServer::start(vec![
        Step::Expect(Kind::Submit),
        Step::Accept(1),
        Step::Record(ResultRecord::Sample(Sample {
            analysis: arcstr::literal!("ac"),
            x: f,
            values,
        })),
        Step::Record(done()),
    ])
    .await;

    let client = SimClient::new(config(&server.addr()).build());
    let session = client.submit(submission).await.unwrap();
    let records: Vec<ResultRecord> = session.into_stream().collect().await;

    let sample = records[0].as_sample().unwrap();
    let names: Vec<&str> = sample.values.keys().map(ArcStr::as_str).collect();
    assert_eq!(names, ["v(out)", "i(r1)", "frequency"]);

    let vout = sample.value("v(out)").unwrap();
    assert!(vout.is_complex());
    assert_relative_eq!(vout.magnitude(), std::f64::consts::FRAC_1_SQRT_2);
    assert_relative_eq!(vout.phase_deg(), -45.0);
    assert_relative_eq!(sample.value("i(r1)").unwrap().phase_deg(), 45.0);
    assert_eq!(sample.value("frequency"), Some(SampleValue::Real(f)));
    assert!(records[1].is_done());
}

#[test_log::test(tokio::test)]
async fn late_samples_are_reordered_within_depth() {
    let mut script = vec![Step::Expect(Kind::Submit), Step::Accept(1)];
    for x in [0.0, 1.0, 2.0, 5.0, 4.0] {
        script.push(Step::Record(sample(x)));
    }
    script.push(Step::Record(done()));
    let server = TestServer::start(script).await;

    let client = SimClient::new(config(&server.addr()).reorder(ReorderPolicy { depth: 4 }).build());
    let session = client.submit(rc_submission()).await.unwrap();
    let records: Vec<ResultRecord> = session.into_stream().collect().await;

    assert_eq!(xs(&records), [0.0, 1.0, 2.0, 4.0, 5.0]);
    assert!(!records
        .iter()
        .any(|r| matches!(r, ResultRecord::Error(_))));
}

#[test_log::test(tokio::test)]
async fn samples_behind_the_watermark_are_reported() {
    let mut script = vec![Step::Expect(Kind::Submit), Step::Accept(1)];
    for x in [0.0, 1.0, 2.0, 5.0, 4.0] {
        script.push(Step::Record(sample(x)));
    }
    script.push(Step::Record(done()));
    let server = TestServer::start(script).await;

    let client = SimClient::new(config(&server.addr()).reorder(ReorderPolicy { depth: 0 }).build());
    let session = client.submit(rc_submission()).await.unwrap();
    let records: Vec<ResultRecord> = session.into_stream().collect().await;

    assert_eq!(xs(&records), [0.0, 1.0, 2.0, 5.0]);
    let ResultRecord::Error(error) = &records[4] else {
        panic!("expected an error record, got {:?}", records[4]);
    };
    assert_eq!(error.kind, ErrorKind::OutOfOrderSample);
    assert!(records[5].is_done());
}

#[test_log::test(tokio::test)]
async fn cancel_is_bounded_by_grace_period() {
    let server = TestServer::start(vec![
        Step::Expect(Kind::Submit),
        Step::Accept(1),
        Step::Hang,
    ])
    .await;

    let client = SimClient::new(config(&server.addr()).build());
    let mut session = client.submit(rc_submission()).await.unwrap();

    let start = Instant::now();
    let state = session.cancel().await;
    let elapsed = start.elapsed();

    assert!(matches!(state, SessionState::Cancelled));
    assert!(elapsed >= GRACE, "cancelled after {:?}", elapsed);
    assert!(
        elapsed < GRACE + Duration::from_millis(100),
        "cancelled after {:?}",
        elapsed
    );
    assert!(session.next().await.is_none());

    let received = server.received_until(|m| m.contains(&ClientMessage::Cancel)).await;
    assert!(received.contains(&ClientMessage::Cancel));
}

#[test_log::test(tokio::test)]
async fn acknowledged_cancel_discards_later_records() {
    let server = TestServer::start(vec![
        Step::Expect(Kind::Submit),
        Step::Accept(2),
        Step::Record(sample(0.0)),
        Step::Expect(Kind::Cancel),
        Step::AckCancel,
        Step::Record(sample(1.0)),
        Step::Record(ResultRecord::Done(FinalStatus::Cancelled)),
    ])
    .await;

    let client = SimClient::new(config(&server.addr()).reorder(ReorderPolicy { depth: 0 }).build());
    let mut session = client.submit(rc_submission()).await.unwrap();
    let first = session.next().await.unwrap();
    assert_eq!(xs(&[first]), [0.0]);

    let start = Instant::now();
    let state = session.cancel().await;
    assert!(start.elapsed() < GRACE, "cancelled after {:?}", start.elapsed());
    assert!(matches!(state, SessionState::Cancelled));
    assert!(session.next().await.is_none());
    assert_eq!(session.history().len(), 1);
}

#[test_log::test(tokio::test)]
async fn dropping_a_session_cancels_it() {
    let server = TestServer::start(vec![
        Step::Expect(Kind::Submit),
        Step::Accept(1),
        Step::Hang,
    ])
    .await;

    let client = SimClient::new(config(&server.addr()).build());
    let session = client.submit(rc_submission()).await.unwrap();
    drop(session);

    let received = server.received_until(|m| m.contains(&ClientMessage::Cancel)).await;
    assert!(received.contains(&ClientMessage::Cancel));
}

#[test_log::test(tokio::test)]
async fn lost_connection_reports_last_record() {
    let server = TestServer::start(vec![
        Step::Expect(Kind::Submit),
        Step::Accept(3),
        Step::Record(sample(0.0)),
        Step::Record(sample(1.0)),
        Step::Close,
    ])
    .await;

    let client = SimClient::new(config(&server.addr()).build());
    let mut session = client.submit(rc_submission()).await.unwrap();
    let mut records = Vec::new();
    while let Some(record) = session.next().await {
        records.push(record);
    }

    // Held samples are still delivered.
    assert_eq!(xs(&records), [0.0, 1.0]);
    let SessionState::Failed(error) = session.state() else {
        panic!("expected failure, got {:?}", session.state());
    };
    assert!(
        matches!(
            *error,
            Error::ConnectionLost {
                session: 3,
                last_record: 2,
                ..
            }
        ),
        "{:?}",
        error
    );
}

#[test_log::test(tokio::test)]
async fn silent_server_times_out() {
    let server = TestServer::start(vec![
        Step::Expect(Kind::Submit),
        Step::Accept(4),
        Step::Record(ResultRecord::Progress(0.5)),
        Step::Hang,
    ])
    .await;

    let client = SimClient::new(
        config(&server.addr())
            .idle_timeout(Duration::from_millis(200))
            .build(),
    );
    let mut session = client.submit(rc_submission()).await.unwrap();
    let SessionState::Failed(error) = session.wait().await else {
        panic!("expected failure, got {:?}", session.state());
    };
    let Error::ConnectionLost {
        last_record,
        reason,
        ..
    } = &*error
    else {
        panic!("expected a lost connection, got {:?}", error);
    };
    assert_eq!(*last_record, 1);
    assert!(reason.contains("no message within 200 ms"), "{}", reason);
}

#[test_log::test(tokio::test)]
async fn simulation_failure_is_reported() {
    let server = TestServer::start(vec![
        Step::Expect(Kind::Submit),
        Step::Accept(5),
        Step::Record(ResultRecord::Log {
            severity: Severity::Warning,
            message: "timestep too small".to_string(),
        }),
        Step::Record(ResultRecord::Done(FinalStatus::Failed(
            "tran simulation aborted".to_string(),
        ))),
    ])
    .await;

    let client = SimClient::new(config(&server.addr()).build());
    let mut session = client.submit(rc_submission()).await.unwrap();
    let SessionState::Failed(error) = session.wait().await else {
        panic!("expected failure, got {:?}", session.state());
    };
    assert!(matches!(
        &*error,
        Error::SimulationFailed {
            session: 5,
            last_record: 2,
            message,
        } if message == "tran simulation aborted"
    ));
    assert_eq!(session.history().len(), 2);
}

#[test_log::test(tokio::test)]
async fn error_references_are_located() {
    let server = TestServer::start(vec![
        Step::Expect(Kind::Submit),
        Step::Accept(1),
        Step::Record(ResultRecord::Error(ErrorRecord {
            kind: ErrorKind::Simulator,
            message: "device rr1 has zero resistance".to_string(),
            reference: Some(arcstr::literal!("rr1")),
            location: None,
        })),
        Step::Record(done()),
    ])
    .await;

    let client = SimClient::new(config(&server.addr()).build());
    let mut session = client.submit(rc_submission()).await.unwrap();
    let Some(ResultRecord::Error(error)) = session.next().await else {
        panic!("expected an error record");
    };
    let location = error.location.unwrap();
    assert_eq!(location.kind, LocationKind::Device);
    assert_eq!(location.name, "r1");
    assert!(matches!(session.wait().await, SessionState::Completed));
}

#[test_log::test(tokio::test)]
async fn unreachable_server_is_unavailable() {
    let addr = closed_addr().await;
    let client = SimClient::new(config(&addr).build());
    let err = client.submit(rc_submission()).await.unwrap_err();
    assert!(matches!(err, Error::ServerUnavailable { .. }), "{:?}", err);
}

#[test_log::test(tokio::test)]
async fn unanswered_submission_is_unavailable() {
    let server = TestServer::start(vec![Step::Expect(Kind::Submit), Step::Hang]).await;

    let client = SimClient::new(
        config(&server.addr())
            .accept_timeout(Duration::from_millis(200))
            .build(),
    );
    let err = client.submit(rc_submission()).await.unwrap_err();
    let Error::ServerUnavailable { reason, .. } = &err else {
        panic!("expected an unavailable server, got {:?}", err);
    };
    assert!(reason.contains("not answered"), "{}", reason);
}

#[test_log::test(tokio::test)]
async fn rejection_is_located_by_deck_line() {
    let server = TestServer::start(vec![
        Step::Expect(Kind::Submit),
        Step::Reject {
            message: "unknown parameter".to_string(),
            line: Some(3),
            reference: None,
        },
    ])
    .await;

    let client = SimClient::new(config(&server.addr()).build());
    let err = client.submit(rc_submission()).await.unwrap_err();
    let Error::RejectedPayload {
        line, location, ..
    } = &err
    else {
        panic!("expected a rejection, got {:?}", err);
    };
    assert_eq!(*line, Some(3));
    let location = location.as_ref().unwrap();
    assert_eq!(location.kind, LocationKind::Device);
    assert_eq!(location.name, "r1");
    assert_eq!(location.level, "rc");
    assert!(err.to_string().contains("unknown parameter"));
}

#[test_log::test(tokio::test)]
async fn rejection_is_located_by_message_token() {
    let server = TestServer::start(vec![
        Step::Expect(Kind::Submit),
        Step::Reject {
            message: "singular matrix: check node out".to_string(),
            line: None,
            reference: None,
        },
    ])
    .await;

    let client = SimClient::new(config(&server.addr()).build());
    let err = client.submit(rc_submission()).await.unwrap_err();
    let Error::RejectedPayload { location, .. } = &err else {
        panic!("expected a rejection, got {:?}", err);
    };
    let location = location.as_ref().unwrap();
    assert_eq!(location.kind, LocationKind::Net);
    assert_eq!(location.name, "out");
}

#[test_log::test(tokio::test)]
async fn slow_consumer_loses_oldest_samples() {
    let mut script = vec![Step::Expect(Kind::Submit), Step::Accept(1)];
    for x in 1..=5 {
        script.push(Step::Record(sample(x as f64)));
    }
    script.push(Step::Record(done()));
    let server = TestServer::start(script).await;

    let client = SimClient::new(
        config(&server.addr())
            .intake_capacity(3)
            .overflow(OverflowPolicy::DropOldestSample)
            .reorder(ReorderPolicy { depth: 0 })
            .build(),
    );
    let mut session = client.submit(rc_submission()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let mut records = Vec::new();
    while let Some(record) = session.next().await {
        records.push(record);
    }
    assert_eq!(xs(&records), [4.0, 5.0]);
    assert!(records.last().unwrap().is_done());
    assert_eq!(session.dropped(), 3);
}

#[test_log::test(tokio::test)]
async fn slow_consumer_pauses_server() {
    let mut script = vec![Step::Expect(Kind::Submit), Step::Accept(1)];
    for x in 1..=6 {
        script.push(Step::Record(sample(x as f64)));
    }
    script.push(Step::Record(done()));
    let server = TestServer::start(script).await;

    let client = SimClient::new(
        config(&server.addr())
            .intake_capacity(2)
            .reorder(ReorderPolicy { depth: 0 })
            .build(),
    );
    let mut session = client.submit(rc_submission()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(session.pending(), 2);

    let mut records = Vec::new();
    while let Some(record) = session.next().await {
        records.push(record);
    }
    assert_eq!(xs(&records), [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    assert_eq!(session.dropped(), 0);

    let received = server
        .received_until(|m| m.last() == Some(&ClientMessage::Resume))
        .await;
    assert!(received.contains(&ClientMessage::Pause));
    assert_eq!(received.last(), Some(&ClientMessage::Resume));
}

#[test_log::test(tokio::test)]
async fn history_retains_newest_samples() {
    let mut script = vec![Step::Expect(Kind::Submit), Step::Accept(1)];
    for x in 1..=5 {
        script.push(Step::Record(sample(x as f64)));
    }
    script.push(Step::Record(done()));
    let server = TestServer::start(script).await;

    let client = SimClient::new(
        config(&server.addr())
            .retention(RetentionPolicy {
                max_samples: Some(3),
            })
            .build(),
    );
    let mut session = client.submit(rc_submission()).await.unwrap();
    assert!(matches!(session.wait().await, SessionState::Completed));

    let history = session.history();
    let kept: Vec<f64> = history.samples().map(|s| s.x).collect();
    assert_eq!(kept, [3.0, 4.0, 5.0]);
    assert_eq!(history.discarded(), 2);
    assert_eq!(history.len(), 4);
}

#[test_log::test(tokio::test)]
async fn intake_never_evicts_other_records() {
    let intake = Intake::new(2);
    let log = |message: &str| ResultRecord::Log {
        severity: Severity::Info,
        message: message.to_string(),
    };
    intake.try_push(log("a")).unwrap();
    intake.try_push(log("b")).unwrap();
    assert!(intake.try_push(log("c")).is_err());

    assert_eq!(intake.push_evicting(sample(0.0)), 1);
    assert_eq!(intake.dropped(), 1);
    assert_eq!(intake.push_evicting(done()), 0);
    assert_eq!(intake.len(), 3);

    intake.close();
    assert_eq!(intake.recv().await, Some(log("a")));
    assert_eq!(intake.recv().await, Some(log("b")));
    assert_eq!(intake.recv().await, Some(done()));
    assert_eq!(intake.recv().await, None);
}

#[test_log::test(tokio::test)]
async fn abandoned_intake_discards_queue() {
    let intake = Intake::new(4);
    intake.try_push(sample(0.0)).unwrap();
    intake.abandon();
    assert_eq!(intake.len(), 0);
    assert_eq!(intake.recv().await, None);
    intake.try_push(sample(1.0)).unwrap();
    assert_eq!(intake.len(), 0);
}

#[test_log::test]
fn reorderer_tracks_analyses_separately() {
    let mut reorderer = Reorderer::new(ReorderPolicy { depth: 1 });
    let ac = |x: f64| Sample {
        analysis: arcstr::literal!("ac"),
        x,
        values: IndexMap::new(),
    };
    let tran = |x: f64| match sample(x) {
        ResultRecord::Sample(s) => s,
        _ => unreachable!(),
    };

    assert!(reorderer.push(tran(2.0)).is_empty());
    assert!(reorderer.push(ac(10.0)).is_empty());
    assert_eq!(xs(&reorderer.push(tran(1.0))), [1.0]);
    assert_eq!(xs(&reorderer.push(ac(100.0))), [10.0]);
    let late = reorderer.push(tran(0.5));
    assert!(matches!(
        &late[..],
        [ResultRecord::Error(ErrorRecord {
            kind: ErrorKind::OutOfOrderSample,
            ..
        })]
    ));
    assert_eq!(xs(&reorderer.flush()), [2.0, 100.0]);
}

#[test_log::test]
fn history_keeps_non_sample_records() {
    let mut history = History::new(RetentionPolicy {
        max_samples: Some(1),
    });
    history.push(ResultRecord::Progress(0.1));
    history.push(sample(1.0));
    history.push(ResultRecord::Progress(0.2));
    history.push(sample(2.0));
    history.push(done());

    assert_eq!(history.len(), 4);
    assert_eq!(history.discarded(), 1);
    assert!(matches!(
        history.records().next(),
        Some(ResultRecord::Progress(_))
    ));
    assert_eq!(history.samples().map(|s| s.x).collect::<Vec<_>>(), [2.0]);
}

#[test_log::test]
fn session_states_only_move_forward() {
    let shared = Shared::new(1);
    assert!(!shared.transition(SessionState::Running));
    assert!(shared.transition(SessionState::Submitting));
    assert!(shared.transition(SessionState::Running));
    assert!(!shared.transition(SessionState::Submitting));
    assert!(shared.transition(SessionState::Completed));
    assert!(shared.state().is_terminal());
    assert!(!shared.transition(SessionState::Cancelled));
    assert!(matches!(shared.state(), SessionState::Completed));
}

#[test_log::test]
fn config_defaults() {
    let config = ClientConfig::default();
    assert_eq!(config.addr(), "127.0.0.1:5923");
    assert_eq!(config.cancel_grace(), Duration::from_millis(2_000));
    assert_eq!(config.overflow, OverflowPolicy::FlowControl);
    assert_eq!(config.reorder.depth, 8);
    assert_eq!(config.intake_capacity, 1024);
    assert_eq!(config.retention.max_samples, Some(MAX_SAMPLES_DEFAULT));
}
