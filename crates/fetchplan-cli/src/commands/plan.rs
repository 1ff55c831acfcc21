//! `fetchplan plan`: build a plan and report it

use crate::config::FetchplanConfig;
use crate::input::{parse_reference_time, read_structured, CacheSnapshot};
use anyhow::Context;
use chrono::Utc;
use fetchplan_core::{GraphConnectionChecker, PlanBuilder, PlanInputs};
use fetchplan_model::{FetchPlan, Graph};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;

/// Arguments of `fetchplan plan`
#[derive(Debug, Clone)]
pub struct PlanArgs {
    /// Graph file
    pub graph: PathBuf,
    /// Cache bundle file or directory
    pub files: PathBuf,
    /// Query DSL
    pub dsl: String,
    /// Reference time; now when unset
    pub now: Option<String>,
    /// Item key to signature map file
    pub signatures: Option<PathBuf>,
    /// Treat every cached date as missing
    pub bust_cache: bool,
    /// Print canonical JSON instead of the text report
    pub json: bool,
}

/// Build the plan described by `args`
///
/// # Errors
/// Fails on unreadable inputs, an invalid DSL or an invalid configuration.
pub fn build(args: &PlanArgs, config: &FetchplanConfig) -> anyhow::Result<FetchPlan> {
    let graph: Graph = read_structured(&args.graph).context("loading graph")?;
    let files = CacheSnapshot::load(&args.files).context("loading cache state")?;
    let signatures: BTreeMap<String, String> = match &args.signatures {
        Some(path) => read_structured(path).context("loading signatures")?,
        None => BTreeMap::new(),
    };
    let now = match &args.now {
        Some(text) => parse_reference_time(text)?,
        None => Utc::now(),
    };

    let connections = config
        .event_free_connections
        .iter()
        .fold(GraphConnectionChecker::new(&graph), |checker, connection| {
            checker.with_event_free_connection(connection.clone())
        });
    let registry = config.registry();
    let inputs = PlanInputs::new(&graph, &args.dsl, now)?
        .with_created_at(Utc::now())
        .with_bust_cache(args.bust_cache)
        .with_signatures(signatures)
        .with_config(config.planner.clone());

    let plan = PlanBuilder::new(&files, &connections, &registry).build(&inputs)?;
    tracing::info!(
        dsl = %plan.dsl,
        items = plan.items.len(),
        fetch = plan.fetch_items().count(),
        "Plan built"
    );
    Ok(plan)
}

/// Run `fetchplan plan`, writing the report to `out`
///
/// # Errors
/// See [`build`]; also fails when `out` cannot be written.
pub fn run(args: &PlanArgs, config: &FetchplanConfig, out: &mut dyn Write) -> anyhow::Result<u8> {
    let plan = build(args, config)?;
    if args.json {
        writeln!(out, "{}", plan.to_canonical_json()?)?;
    } else {
        write!(out, "{}", plan.render_dry_run())?;
    }
    Ok(0)
}
