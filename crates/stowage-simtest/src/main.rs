//! Stowage Headless Harness
//!
//! Generates maps from the scenario file, churns them, and cross-checks the
//! incremental caches and the best-cell search against brute force.
//! Runs entirely in-process with no host simulation attached.
//!
//! Usage:
//!   cargo run -p stowage-simtest
//!   cargo run -p stowage-simtest -- --verbose
//!   RUST_LOG=debug cargo run -p stowage-simtest

use std::time::{Duration, Instant};

use hecs::Entity;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use stowage_core::generation::{generate_engine, GeneratedMap, MapConfig, ITEM_DEFS};
use stowage_core::prelude::*;
use stowage_logic::cell::Cell;
use stowage_logic::config::{validate_config, StowageConfig};
use stowage_logic::search::{Requester, SearchAccuracy, StorageTarget};

// ── Scenario file ───────────────────────────────────────────────────────
const SCENARIOS_JSON: &str = include_str!("../../../data/scenarios.json");

#[derive(Debug, Deserialize)]
struct Scenario {
    name: String,
    seed: u64,
    #[serde(default)]
    map: MapConfig,
    #[serde(default)]
    stowage: StowageConfig,
    queries: usize,
    churn: usize,
}

// ── Test harness ────────────────────────────────────────────────────────

struct TestResult {
    name: String,
    passed: bool,
    detail: String,
}

impl TestResult {
    fn new(name: impl Into<String>, passed: bool, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed,
            detail: detail.into(),
        }
    }
}

fn main() {
    tracing_subscriber::fmt::init();
    let verbose = std::env::args().any(|a| a == "--verbose");
    println!("=== Stowage Harness ===\n");

    let mut results = Vec::new();

    // 1. Scenario file validation
    let scenarios = load_scenarios(&mut results).unwrap_or_default();

    // 2. Per-scenario cache and search checks
    for scenario in &scenarios {
        results.extend(run_scenario(scenario, verbose));
    }

    // ── Summary ──
    println!();
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.iter().filter(|r| !r.passed).count();
    let total = results.len();

    for r in &results {
        let icon = if r.passed { "✓" } else { "✗" };
        if !r.passed || verbose {
            println!("  {} {}: {}", icon, r.name, r.detail);
        }
    }

    println!(
        "\n=== RESULT: {}/{} passed, {} failed ===",
        passed, total, failed
    );

    if failed > 0 {
        std::process::exit(1);
    }
}

// ── 1. Scenarios ────────────────────────────────────────────────────────

fn load_scenarios(results: &mut Vec<TestResult>) -> Option<Vec<Scenario>> {
    println!("--- Scenario File ---");
    let scenarios: Vec<Scenario> = match serde_json::from_str(SCENARIOS_JSON) {
        Ok(s) => s,
        Err(e) => {
            results.push(TestResult::new(
                "scenarios_parse",
                false,
                format!("JSON parse error: {}", e),
            ));
            return None;
        }
    };

    results.push(TestResult::new(
        "scenarios_not_empty",
        !scenarios.is_empty(),
        format!("{} scenarios loaded", scenarios.len()),
    ));

    let invalid: Vec<String> = scenarios
        .iter()
        .filter_map(|s| {
            let errors = validate_config(&s.stowage);
            (!errors.is_empty()).then(|| format!("{}: {:?}", s.name, errors))
        })
        .collect();
    results.push(TestResult::new(
        "scenarios_valid_config",
        invalid.is_empty(),
        if invalid.is_empty() {
            "all stowage configs validate".to_string()
        } else {
            invalid.join("; ")
        },
    ));

    Some(scenarios)
}

// ── 2. Scenario run ─────────────────────────────────────────────────────

fn run_scenario(scenario: &Scenario, verbose: bool) -> Vec<TestResult> {
    println!("--- Scenario: {} ---", scenario.name);
    let mut results = Vec::new();
    let name = |check: &str| format!("{}_{}", scenario.name, check);
    let mut rng = StdRng::seed_from_u64(scenario.seed);

    let started = Instant::now();
    let (mut engine, mut map) =
        match generate_engine(&scenario.map, scenario.stowage.clone(), &mut rng) {
            Ok(generated) => generated,
            Err(e) => {
                results.push(TestResult::new(name("generate"), false, e.to_string()));
                return results;
            }
        };
    results.push(TestResult::new(
        name("generate"),
        true,
        format!(
            "{} zones, {} shelves, {} blockers, {} items in {:?}",
            map.zones.len(),
            map.shelves.len(),
            map.blockers.len(),
            map.items.len(),
            started.elapsed()
        ),
    ));

    results.push(check_caches(&engine, name("caches_after_generation")));
    results.push(check_districts(&engine, name("districts_after_generation")));

    let applied = churn(&mut engine, &mut map, scenario, &mut rng);
    if verbose {
        println!("  applied {} churn operations", applied);
    }
    results.push(check_caches(&engine, name("caches_after_churn")));
    results.push(check_districts(&engine, name("districts_after_churn")));

    results.extend(check_search(&mut engine, &map, scenario, &mut rng, verbose));
    results.push(drain_relocations(&mut engine, scenario, name("relocation_drain")));
    results
}

/// Random placements, moves, consumption and despawns over the map.
fn churn(
    engine: &mut StowageEngine,
    map: &mut GeneratedMap,
    scenario: &Scenario,
    rng: &mut StdRng,
) -> usize {
    let mut applied = 0;
    for _ in 0..scenario.churn {
        let outcome = match rng.gen_range(0..5) {
            0 if !map.items.is_empty() => {
                let item = map.items.swap_remove(rng.gen_range(0..map.items.len()));
                engine.object_despawned(item).map(|_| ())
            }
            1 if !map.items.is_empty() => {
                let item = map.items[rng.gen_range(0..map.items.len())];
                let cell = random_cell(&scenario.map, rng);
                engine.object_placed_at_cell(item, cell).map(|_| ())
            }
            2 => {
                let def = ITEM_DEFS[rng.gen_range(0..ITEM_DEFS.len())];
                match engine.object_spawned(Spawn::item(def, rng.gen_range(1..10))) {
                    Ok(item) => {
                        map.items.push(item);
                        let cell = random_cell(&scenario.map, rng);
                        engine.object_placed_at_cell(item, cell).map(|_| ())
                    }
                    Err(e) => Err(e),
                }
            }
            3 if !map.items.is_empty() => {
                let item = map.items[rng.gen_range(0..map.items.len())];
                let count = engine.stack_of(item).map_or(0, |s| s.count);
                engine.set_stack_count(item, count / 2)
            }
            4 if !map.blockers.is_empty() => {
                let blocker = map.blockers[rng.gen_range(0..map.blockers.len())];
                let cell = random_cell(&scenario.map, rng);
                engine.object_placed_at_cell(blocker, cell).map(|_| ())
            }
            _ => continue,
        };
        match outcome {
            Ok(()) => applied += 1,
            Err(e) => log::error!("churn operation failed: {}", e),
        }
        map.items.retain(|e| engine.world.contains(*e));
    }
    applied
}

fn random_cell(config: &MapConfig, rng: &mut StdRng) -> Cell {
    Cell::flat(rng.gen_range(0..config.width), rng.gen_range(0..config.depth))
}

fn check_caches(engine: &StowageEngine, name: String) -> TestResult {
    let mismatches = engine.verify_caches();
    TestResult::new(
        name,
        mismatches.is_empty(),
        if mismatches.is_empty() {
            format!("{} regions match ground truth", engine.storage().region_count())
        } else {
            format!("{} mismatches, first {:?}", mismatches.len(), mismatches[0])
        },
    )
}

fn check_districts(engine: &StowageEngine, name: String) -> TestResult {
    let storage = engine.storage();
    let uncovered: Vec<_> = storage
        .regions()
        .map(|r| r.id)
        .filter(|id| !storage.districts_cover_region(*id))
        .collect();
    TestResult::new(
        name,
        uncovered.is_empty(),
        if uncovered.is_empty() {
            "every region partitioned exactly".to_string()
        } else {
            format!("{} regions with stale districts: {:?}", uncovered.len(), uncovered)
        },
    )
}

fn distance(target: &StorageTarget, from: Cell) -> i64 {
    target.cell.distance_squared(from)
}

/// High accuracy must match brute force; approximate must match its
/// priority and examine fewer cells.
fn check_search(
    engine: &mut StowageEngine,
    map: &GeneratedMap,
    scenario: &Scenario,
    rng: &mut StdRng,
    verbose: bool,
) -> Vec<TestResult> {
    let name = |check: &str| format!("{}_{}", scenario.name, check);
    let queries: Vec<(Entity, Requester)> = (0..scenario.queries)
        .filter(|_| !map.items.is_empty())
        .map(|_| {
            let item = map.items[rng.gen_range(0..map.items.len())];
            (item, Requester::at(random_cell(&scenario.map, rng)))
        })
        .collect();

    let mut high_mismatches = Vec::new();
    let mut approx_mismatches = Vec::new();
    let mut errors = Vec::new();
    let mut found = 0usize;
    let (mut high_cells, mut approx_cells) = (0usize, 0usize);
    let (mut high_time, mut approx_time, mut brute_time) =
        (Duration::ZERO, Duration::ZERO, Duration::ZERO);

    for &(item, requester) in &queries {
        let started = Instant::now();
        let reference = match engine.find_best_cell_exhaustive(item, requester) {
            Ok(r) => r,
            Err(e) => {
                errors.push(e.to_string());
                continue;
            }
        };
        brute_time += started.elapsed();

        let started = Instant::now();
        let high = engine.find_best_cell(item, requester, Some(SearchAccuracy::High));
        high_time += started.elapsed();
        high_cells += engine.last_search_stats().cells_examined;

        let started = Instant::now();
        let approx = engine.find_best_cell(item, requester, Some(SearchAccuracy::Approximate));
        approx_time += started.elapsed();
        approx_cells += engine.last_search_stats().cells_examined;

        let (high, approx) = match (high, approx) {
            (Ok(h), Ok(a)) => (h, a),
            (Err(e), _) | (_, Err(e)) => {
                errors.push(e.to_string());
                continue;
            }
        };
        if reference.is_some() {
            found += 1;
        }

        let from = requester.position;
        let high_agrees = match (&reference, &high) {
            (None, None) => true,
            (Some(r), Some(h)) => r.priority == h.priority && distance(r, from) == distance(h, from),
            _ => false,
        };
        if !high_agrees {
            high_mismatches.push((item, reference, high));
        }
        let approx_agrees = match (&reference, &approx) {
            (None, None) => true,
            (Some(r), Some(a)) => r.priority == a.priority,
            _ => false,
        };
        if !approx_agrees {
            approx_mismatches.push((item, reference, approx));
        }
    }

    if verbose {
        let n = queries.len().max(1) as u32;
        println!(
            "  {} queries: brute {:?}/q, high {:?}/q, approximate {:?}/q",
            queries.len(),
            brute_time / n,
            high_time / n,
            approx_time / n
        );
    }

    vec![
        TestResult::new(
            name("search_errors"),
            errors.is_empty(),
            if errors.is_empty() {
                format!("{} queries, {} with a target", queries.len(), found)
            } else {
                format!("{} errors, first: {}", errors.len(), errors[0])
            },
        ),
        TestResult::new(
            name("high_matches_brute_force"),
            high_mismatches.is_empty(),
            match high_mismatches.first() {
                None => "same priority and distance on every query".to_string(),
                Some(m) => format!("{} mismatches, first {:?}", high_mismatches.len(), m),
            },
        ),
        TestResult::new(
            name("approximate_keeps_priority"),
            approx_mismatches.is_empty(),
            match approx_mismatches.first() {
                None => "same priority tier on every query".to_string(),
                Some(m) => format!("{} mismatches, first {:?}", approx_mismatches.len(), m),
            },
        ),
        TestResult::new(
            name("approximate_examines_less"),
            approx_cells <= high_cells,
            format!("{} cells approximate vs {} high", approx_cells, high_cells),
        ),
    ]
}

/// Ask for a destination for every queued item; each query either finds
/// one or drops the item from the queue.
fn drain_relocations(engine: &mut StowageEngine, scenario: &Scenario, name: String) -> TestResult {
    let pending = engine.pending_relocations();
    let origin = Cell::flat(scenario.map.width / 2, scenario.map.depth / 2);
    let mut with_target = 0usize;
    for &item in &pending {
        match engine.find_best_cell(item, Requester::at(origin), None) {
            Ok(Some(_)) => with_target += 1,
            Ok(None) => {}
            Err(e) => return TestResult::new(name, false, e.to_string()),
        }
    }
    let remaining = engine.pending_relocations();
    let stale = remaining.iter().filter(|e| !pending.contains(*e)).count();
    TestResult::new(
        name,
        remaining.len() <= pending.len() && stale == 0,
        format!(
            "{} queued, {} with a destination, {} left queued",
            pending.len(),
            with_target,
            remaining.len()
        ),
    )
}
