use crate::command::args::{Cli, Role, STAT_DEFAULT_LIMIT};
use crate::engine::table::SortDirection;
use crate::engine::types::Field;
use crate::query::errors::ErrorKind;
use crate::query::progress::ProgressDisplay;
use crate::query::query_spec::WorkingMode;
use crate::shared::output::OutputFormat;
use clap::Parser;
use std::path::PathBuf;

fn local_query(args: &[&str]) -> crate::command::QueryArgs {
    let mut argv = vec!["flowdist", "local"];
    argv.extend_from_slice(args);
    argv.push("data/");
    match Cli::try_parse_from(argv).unwrap().role {
        Role::Local { query, .. } => query,
        other => panic!("unexpected role {other:?}"),
    }
}

#[test]
fn local_role_with_defaults() {
    let cli = Cli::try_parse_from(["flowdist", "-vv", "local", "a.fdf", "b/"]).unwrap();
    assert_eq!(cli.verbose, 2);
    match cli.role {
        Role::Local { workers, inputs, query } => {
            assert_eq!(workers, 2);
            assert_eq!(inputs, vec![PathBuf::from("a.fdf"), PathBuf::from("b/")]);
            let spec = query.to_spec().unwrap();
            assert_eq!(spec.mode, WorkingMode::List);
            assert_eq!(spec.record_limit, 0);
        }
        other => panic!("unexpected role {other:?}"),
    }
}

#[test]
fn worker_and_coordinator_roles() {
    let cli = Cli::try_parse_from([
        "flowdist", "worker", "--connect", "10.0.0.1:7474", "--rank", "2", "--size", "4", "--data",
        "/srv/flows",
    ])
    .unwrap();
    match cli.role {
        Role::Worker { connect, rank, size, roots } => {
            assert_eq!(connect, "10.0.0.1:7474");
            assert_eq!((rank, size), (2, 4));
            assert_eq!(roots, vec![PathBuf::from("/srv/flows")]);
        }
        other => panic!("unexpected role {other:?}"),
    }

    let cli = Cli::try_parse_from([
        "flowdist", "coordinator", "--workers", "3", "-s", "dstport", "--output-format", "json",
        "--progress", "bar",
    ])
    .unwrap();
    match cli.role {
        Role::Coordinator { listen, workers, query } => {
            assert_eq!(listen, None);
            assert_eq!(workers, 3);
            assert_eq!(query.output_format, Some(OutputFormat::Json));
            assert_eq!(query.progress, Some(ProgressDisplay::Bar));
        }
        other => panic!("unexpected role {other:?}"),
    }
}

#[test]
fn stat_shortcut_builds_fast_topn_aggregate() {
    let spec = local_query(&["-s", "srcip/bytes"]).to_spec().unwrap();
    assert_eq!(spec.mode, WorkingMode::Aggregate);
    assert_eq!(spec.aggregation_keys[0].field, Field::SrcAddr);
    let sort = spec.sort.unwrap();
    assert_eq!((sort.field, sort.direction), (Field::Bytes, SortDirection::Desc));
    assert_eq!(spec.record_limit, STAT_DEFAULT_LIMIT);
    assert!(spec.use_fast_topn);

    let spec = local_query(&["-s", "dstport", "-l", "3", "--no-fast-topn"])
        .to_spec()
        .unwrap();
    assert_eq!(spec.sort.unwrap().field, Field::Flows);
    assert_eq!(spec.record_limit, 3);
    assert!(!spec.use_fast_topn);
}

#[test]
fn explicit_aggregate_sort_and_fields() {
    let spec = local_query(&[
        "-a", "srcip/24,proto", "-o", "packets#asc", "-l", "5", "--fields", "bytes,packets",
        "-f", "proto udp",
    ])
    .to_spec()
    .unwrap();
    assert_eq!(spec.mode, WorkingMode::Aggregate);
    assert_eq!(spec.aggregation_keys.len(), 2);
    assert_eq!(spec.aggregation_keys[0].ipv4_prefix, 24);
    assert_eq!(spec.output_fields.len(), 2);
    assert_eq!(spec.filter.as_deref(), Some("proto udp"));
    assert!(!spec.use_fast_topn);
}

#[test]
fn time_options_set_window() {
    let spec = local_query(&["-t", "1000"]).to_spec().unwrap();
    let window = spec.time_window.unwrap();
    assert_eq!((window.start, window.end), (1_000_000, 1_000_000));

    let spec = local_query(&["-T", "1000,2000"]).to_spec().unwrap();
    assert_eq!(spec.time_window.unwrap().end, 2_000_000);
}

#[test]
fn conflicting_or_bad_options_are_rejected() {
    assert!(Cli::try_parse_from(["flowdist", "local", "-s", "srcip", "-a", "dstport", "x"]).is_err());
    assert!(Cli::try_parse_from(["flowdist", "local", "-t", "1", "-T", "1,2", "x"]).is_err());
    assert!(Cli::try_parse_from(["flowdist", "local"]).is_err());
    assert!(Cli::try_parse_from(["flowdist", "local", "--progress", "spinner", "x"]).is_err());

    let err = local_query(&["-f", "proto"]).to_spec().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Argument);
    let err = local_query(&["-o", "bogus"]).to_spec().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Argument);
}
