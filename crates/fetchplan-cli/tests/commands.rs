//! Subcommands run against fixture files on disk

use fetchplan_cli::{command, dispatch, load_config, CacheSnapshot, FetchplanConfig};
use fetchplan_model::{FetchPlan, ParameterFile, WindowReason};
use fetchplan_test_utils::{jan, jan_range, single_edge_graph, ValueBuilder};
use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const KEY: &str = "parameter:p-signup:e-signup:p:";
const DSL: &str = "window(1-Jan-26:20-Jan-26)";

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    /// Graph with one connected slot; cache holds 1-8 and 12-20 Jan
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let graph = single_edge_graph("p-signup", None);
        std::fs::write(dir.path().join("graph.json"), serde_json::to_string(&graph).unwrap()).unwrap();

        let days: Vec<_> = jan_range(1, 8).days().chain(jan_range(12, 20).days()).collect();
        let value = ValueBuilder::window(jan_range(1, 20)).daily_on(&days, 100, 10).build();
        let mut cache = CacheSnapshot::default();
        cache
            .parameters
            .insert("p-signup".into(), ParameterFile::new("p-signup", vec![value]));
        std::fs::write(dir.path().join("cache.json"), serde_json::to_string(&cache).unwrap()).unwrap();
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn run(&self, args: &[&str]) -> (u8, String) {
        let mut argv = vec!["fetchplan".to_string()];
        argv.extend(args.iter().map(|a| (*a).to_string()));
        let matches = command().try_get_matches_from(argv).unwrap();
        let config = load_config(&matches).unwrap();
        let mut out = Vec::new();
        let code = dispatch(&matches, &config, &mut out).unwrap();
        (code, String::from_utf8(out).unwrap())
    }

    fn plan_json(&self, now: &str) -> String {
        let graph = self.path("graph.json");
        let files = self.path("cache.json");
        let (code, out) = self.run(&[
            "plan",
            "--graph",
            path_str(&graph),
            "--files",
            path_str(&files),
            "--dsl",
            DSL,
            "--now",
            now,
            "--json",
        ]);
        assert_eq!(code, 0);
        out
    }
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn plan_reports_gap_window() {
    let fixture = Fixture::new();
    let plan = FetchPlan::from_json(&fixture.plan_json("2026-02-15")).unwrap();

    let item = plan.item(KEY).unwrap();
    assert!(item.is_fetch());
    let shape: Vec<_> = item.windows.iter().map(|w| (w.start, w.end, w.reason)).collect();
    assert_eq!(shape, vec![(jan(9), jan(11), WindowReason::Missing)]);
}

#[test]
fn dry_run_text_lists_items() {
    let fixture = Fixture::new();
    let graph = fixture.path("graph.json");
    let files = fixture.path("cache.json");
    let (code, out) = fixture.run(&[
        "plan",
        "--graph",
        path_str(&graph),
        "--files",
        path_str(&files),
        "--dsl",
        DSL,
        "--now",
        "15-Feb-26",
    ]);
    assert_eq!(code, 0);
    assert!(out.contains("items: 1 (fetch 1, covered 0, unfetchable 0)"));
    assert!(out.contains(KEY));
    assert!(out.contains("missing 3d"));
}

#[test]
fn cache_directory_layout_loads() {
    let fixture = Fixture::new();
    let cache_dir = fixture.path("cache");
    std::fs::create_dir_all(cache_dir.join("parameters")).unwrap();
    let value = ValueBuilder::window(jan_range(1, 20)).daily(100, 10).build();
    let file = ParameterFile {
        id: String::new(),
        values: vec![value],
    };
    std::fs::write(
        cache_dir.join("parameters").join("p-signup.yaml"),
        serde_yaml::to_string(&file).unwrap(),
    )
    .unwrap();

    let snapshot = CacheSnapshot::load(&cache_dir).unwrap();
    assert_eq!(snapshot.parameters["p-signup"].id, "p-signup");
    assert!(snapshot.cases.is_empty());
}

#[test]
fn diff_ignores_creation_time() {
    let fixture = Fixture::new();
    std::fs::write(fixture.path("a.json"), fixture.plan_json("2026-02-15")).unwrap();
    std::fs::write(fixture.path("b.json"), fixture.plan_json("2026-02-15")).unwrap();

    let (a, b) = (fixture.path("a.json"), fixture.path("b.json"));
    let (code, out) = fixture.run(&["diff", path_str(&a), path_str(&b)]);
    assert_eq!(code, 0, "{out}");
    assert!(out.starts_with("plans are equivalent"));
}

#[test]
fn diff_reports_changed_items() {
    let fixture = Fixture::new();
    std::fs::write(fixture.path("a.json"), fixture.plan_json("2026-02-15")).unwrap();

    let mut changed = FetchPlan::from_json(&fixture.plan_json("2026-02-15")).unwrap();
    changed.items[0].windows[0].reason = WindowReason::Stale;
    std::fs::write(fixture.path("b.json"), changed.to_canonical_json().unwrap()).unwrap();

    let (a, b) = (fixture.path("a.json"), fixture.path("b.json"));
    let (code, out) = fixture.run(&["diff", path_str(&a), path_str(&b)]);
    assert_eq!(code, 1);
    assert!(out.contains(&format!("{KEY}: changed")));
}

#[test]
fn config_file_round_trips_through_show() {
    let fixture = Fixture::new();
    let config_path = fixture.path("fetchplan.yaml");
    std::fs::write(
        &config_path,
        "planner:\n  max_mece_dimensions: 2\nexec:\n  mode: manual\n",
    )
    .unwrap();

    let (code, out) = fixture.run(&["config", "--config", path_str(&config_path), "--json"]);
    assert_eq!(code, 0);
    let shown: FetchplanConfig = serde_json::from_str(&out).unwrap();
    assert_eq!(shown.planner.max_mece_dimensions, 2);
    assert_eq!(shown, FetchplanConfig::load(&config_path).unwrap());
}
