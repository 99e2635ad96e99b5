use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::command::parse::{
    parse_field_list, parse_sort_key, parse_stat, parse_time, parse_time_range,
};
use crate::engine::table::{SortDirection, SortKey};
use crate::engine::types::Field;
use crate::query::errors::QueryError;
use crate::query::progress::ProgressDisplay;
use crate::query::query_spec::{QuerySpec, TimeWindow};
use crate::shared::output::OutputFormat;

/// Record limit applied by `-s` when `-l` is not given.
pub const STAT_DEFAULT_LIMIT: u64 = 10;

#[derive(Parser, Debug)]
#[command(name = "flowdist")]
#[command(about = "Distributed query engine for network flow records", long_about = None)]
pub struct Cli {
    /// Raise the stdout log level once per occurrence
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub role: Role,
}

#[derive(Subcommand, Debug)]
pub enum Role {
    /// Run the coordinator and all workers inside this process
    Local {
        /// Number of worker ranks
        #[arg(short = 'w', long, default_value_t = 2)]
        workers: usize,

        #[command(flatten)]
        query: QueryArgs,

        /// Input files or directories, dealt to workers round-robin
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },

    /// Accept worker connections and run one query as rank 0
    Coordinator {
        /// Listen address; defaults to `cluster.listen_addr`
        #[arg(long)]
        listen: Option<String>,

        /// Number of worker ranks expected to connect
        #[arg(long)]
        workers: usize,

        #[command(flatten)]
        query: QueryArgs,
    },

    /// Connect to a coordinator and scan local data
    Worker {
        /// Coordinator address
        #[arg(long)]
        connect: String,

        /// This worker's rank, 1..size
        #[arg(long)]
        rank: usize,

        /// Total ranks including the coordinator
        #[arg(long)]
        size: usize,

        /// Local data roots; the query's path selector is resolved against each
        #[arg(long = "data", required = true)]
        roots: Vec<PathBuf>,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct QueryArgs {
    /// Aggregate by comma separated fields, e.g. `srcip/24/64,dstport`
    #[arg(short = 'a', long = "aggregate", conflicts_with = "stat")]
    pub aggregate: Option<String>,

    /// Filter expression, e.g. `proto tcp and dst port 443`
    #[arg(short = 'f', long)]
    pub filter: Option<String>,

    /// Print at most this many records (0 = unlimited)
    #[arg(short = 'l', long)]
    pub limit: Option<u64>,

    /// Sort key: `field[#asc|#desc][/min|max|sum|or]`
    #[arg(short = 'o', long = "order", conflicts_with = "stat")]
    pub order: Option<String>,

    /// Statistic shortcut: `field[/sortfield]`
    #[arg(short = 's', long = "stat")]
    pub stat: Option<String>,

    /// Select records active at this instant
    #[arg(short = 't', long = "time", conflicts_with = "time_range")]
    pub time: Option<String>,

    /// Select records overlapping `start,end`
    #[arg(short = 'T', long = "time-range")]
    pub time_range: Option<String>,

    /// Output columns, comma separated
    #[arg(long)]
    pub fields: Option<String>,

    /// Always use the full shuffle for top-N aggregation
    #[arg(long)]
    pub no_fast_topn: bool,

    /// Only sum the per-file metadata blocks
    #[arg(long)]
    pub metadata_only: bool,

    /// Path selector resolved against every worker's data roots
    #[arg(long)]
    pub path: Option<String>,

    /// Result format; defaults to `query.output_format`
    #[arg(long)]
    pub output_format: Option<OutputFormat>,

    /// Progress display; defaults to `query.progress`
    #[arg(long)]
    pub progress: Option<ProgressDisplay>,
}

impl QueryArgs {
    pub fn to_spec(&self) -> Result<QuerySpec, QueryError> {
        let mut builder = QuerySpec::builder()
            .fast_topn(!self.no_fast_topn)
            .metadata_only(self.metadata_only);

        if let Some(stat) = &self.stat {
            let (key, sort) = parse_stat(stat)?;
            builder = builder
                .aggregate_by(vec![key])
                .sort_by(SortKey::new(sort.unwrap_or(Field::Flows), SortDirection::Desc))
                .limit(self.limit.unwrap_or(STAT_DEFAULT_LIMIT));
        } else {
            if let Some(keys) = &self.aggregate {
                builder = builder.aggregate_by(parse_field_list(keys)?);
            }
            if let Some(order) = &self.order {
                builder = builder.sort_by(parse_sort_key(order)?);
            }
            builder = builder.limit(self.limit.unwrap_or(0));
        }

        if let Some(fields) = &self.fields {
            builder = builder.output(parse_field_list(fields)?);
        }
        if let Some(filter) = &self.filter {
            builder = builder.filter(filter.as_str());
        }
        if let Some(path) = &self.path {
            builder = builder.path(path.as_str());
        }
        if let Some(time) = &self.time {
            builder = builder.time_window(TimeWindow::instant(parse_time(time)?));
        }
        if let Some(range) = &self.time_range {
            builder = builder.time_window(parse_time_range(range)?);
        }
        builder.build()
    }
}
