use clap::Parser;
use critters_arena::config::{NewGameRequest, RuleSet};
use critters_arena::constants::{DECISION_TIMEOUT_MS, DRAW};
use critters_arena::critters::default_registry;
use critters_arena::engine::GameEngine;
use critters_arena::server_utils::parse_species_list;
use critters_arena::strategy::SpeciesRegistry;
use critters_arena::types::{GamePhase, Snapshot, TurnEvent};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const DEFAULT_MAX_TURNS: u64 = 500;

#[derive(Parser, Debug)]
#[command(author, version, about = "Run headless Critters games and report the outcomes")]
struct Cli {
    /// Comma separated species names.
    #[arg(long, default_value = "Ant,Bird,Hippo,Stone")]
    species: String,
    #[arg(long)]
    width: Option<i32>,
    #[arg(long)]
    height: Option<i32>,
    /// Critters per species.
    #[arg(long)]
    count: Option<usize>,
    #[arg(long)]
    food: Option<usize>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long, default_value_t = DEFAULT_MAX_TURNS)]
    max_turns: u64,
    #[arg(long, default_value_t = 1)]
    games: u32,
    #[arg(long, default_value_t = DECISION_TIMEOUT_MS)]
    decision_budget_ms: u64,
    #[arg(long)]
    match_id: Option<String>,
    #[arg(long)]
    summary_out: Option<PathBuf>,
}

#[derive(Clone, Debug)]
struct Scenario {
    name: String,
    request: NewGameRequest,
    seed: u64,
}

#[derive(Clone, Debug, Serialize)]
struct ScenarioResultLine {
    scenario: String,
    seed: u64,
    species: Vec<String>,
    width: i32,
    height: i32,
    winner: String,
    phase: GamePhase,
    turns: u64,
    #[serde(rename = "durationMs")]
    duration_ms: u64,
    scores: BTreeMap<String, i64>,
    alive: BTreeMap<String, usize>,
    faults: BTreeMap<String, u64>,
    fights: u64,
    deaths: u64,
    bounces: u64,
    #[serde(rename = "foodEaten")]
    food_eaten: u64,
    anomalies: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
struct AnomalyRecord {
    turn: u64,
    message: String,
}

#[derive(Clone, Debug)]
struct ScenarioRunResult {
    result: ScenarioResultLine,
    anomaly_records: Vec<AnomalyRecord>,
}

#[derive(Clone, Debug, Serialize)]
struct RunSummary {
    #[serde(rename = "matchId")]
    match_id: String,
    #[serde(rename = "startedAtMs")]
    started_at_ms: i64,
    #[serde(rename = "finishedAtMs")]
    finished_at_ms: i64,
    #[serde(rename = "scenarioCount")]
    scenario_count: usize,
    #[serde(rename = "anomalyCount")]
    anomaly_count: usize,
    #[serde(rename = "averageTurns")]
    average_turns: u64,
    #[serde(rename = "winCounts")]
    win_counts: BTreeMap<String, usize>,
    scenarios: Vec<ScenarioResultLine>,
}

#[derive(Clone, Debug, Serialize)]
struct StructuredLogLine {
    #[serde(rename = "timestampMs")]
    timestamp_ms: i64,
    level: String,
    event: String,
    #[serde(rename = "matchId")]
    match_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    scenario: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    turn: Option<u64>,
    details: Value,
}

fn main() {
    critters_arena::init_tracing();
    let cli = Cli::parse();
    let registry = default_registry();
    let rules = RuleSet {
        decision_budget: Duration::from_millis(cli.decision_budget_ms.max(1)),
        ..RuleSet::default()
    };
    let scenarios = resolve_scenarios(&cli);
    let run_started_at_ms = now_ms();
    let seed_hint = scenarios.first().map(|scenario| scenario.seed).unwrap_or(0);
    let match_id = cli
        .match_id
        .clone()
        .unwrap_or_else(|| default_match_id(seed_hint, run_started_at_ms));
    let mut has_anomaly = false;
    let mut scenario_results = Vec::new();
    let mut total_anomalies = 0usize;

    for scenario in scenarios {
        emit_log(
            "info",
            "scenario_started",
            &match_id,
            Some(&scenario.name),
            Some(scenario.seed),
            None,
            json!({
                "species": scenario.request.species,
                "width": scenario.request.width,
                "height": scenario.request.height,
                "crittersPerSpecies": scenario.request.critters_per_species,
                "maxTurns": scenario.request.max_turns,
            }),
        );

        let scenario_run = match run_scenario(&scenario, &registry, &rules) {
            Ok(run) => run,
            Err(message) => {
                emit_log(
                    "error",
                    "scenario_rejected",
                    &match_id,
                    Some(&scenario.name),
                    Some(scenario.seed),
                    None,
                    json!({ "error": message }),
                );
                std::process::exit(2);
            }
        };

        for anomaly in &scenario_run.anomaly_records {
            emit_log(
                "warn",
                "anomaly_detected",
                &match_id,
                Some(&scenario.name),
                Some(scenario.seed),
                Some(anomaly.turn),
                json!({
                    "message": anomaly.message,
                }),
            );
        }

        if !scenario_run.result.anomalies.is_empty() {
            has_anomaly = true;
        }
        total_anomalies += scenario_run.anomaly_records.len();

        emit_log(
            "info",
            "scenario_finished",
            &match_id,
            Some(&scenario.name),
            Some(scenario.seed),
            Some(scenario_run.result.turns),
            json!({
                "winner": scenario_run.result.winner,
                "durationMs": scenario_run.result.duration_ms,
                "anomalyCount": scenario_run.anomaly_records.len(),
            }),
        );

        match serde_json::to_string(&scenario_run.result) {
            Ok(line) => println!("{line}"),
            Err(error) => eprintln!("failed to serialize scenario result: {error}"),
        }
        scenario_results.push(scenario_run.result);
    }

    let summary = build_run_summary(
        match_id.clone(),
        run_started_at_ms,
        now_ms(),
        scenario_results,
        total_anomalies,
    );

    let mut summary_out_written: Option<String> = None;
    if let Some(path) = cli.summary_out.as_ref() {
        if let Err(error) = write_summary(path, &summary) {
            emit_log(
                "error",
                "summary_write_failed",
                &match_id,
                None,
                None,
                None,
                json!({
                    "path": path.to_string_lossy(),
                    "error": error.to_string(),
                }),
            );
            std::process::exit(2);
        }
        summary_out_written = Some(path.to_string_lossy().to_string());
    }

    emit_log(
        "info",
        "run_finished",
        &match_id,
        None,
        None,
        None,
        json!({
            "scenarioCount": summary.scenario_count,
            "anomalyCount": summary.anomaly_count,
            "averageTurns": summary.average_turns,
            "winCounts": summary.win_counts,
            "summaryOut": summary_out_written,
        }),
    );

    if has_anomaly {
        std::process::exit(1);
    }
}

fn run_scenario(
    scenario: &Scenario,
    registry: &SpeciesRegistry,
    rules: &RuleSet,
) -> Result<ScenarioRunResult, String> {
    let config = scenario
        .request
        .validate(registry, rules)
        .map_err(|err| err.to_string())?;
    let mut engine = GameEngine::new(config, registry).map_err(|err| err.to_string())?;
    engine.start().map_err(|err| err.to_string())?;

    let started = Instant::now();
    let mut anomalies = Vec::new();
    let mut anomaly_records = Vec::new();
    let mut anomaly_seen = HashSet::new();
    let mut previous_scores: BTreeMap<String, i64> = BTreeMap::new();
    let mut fights = 0u64;
    let mut deaths = 0u64;
    let mut bounces = 0u64;
    let mut food_eaten = 0u64;
    let turn_safety = scenario.request.max_turns.unwrap_or(DEFAULT_MAX_TURNS) + 1;

    let mut snapshot = engine.build_snapshot(true);
    while snapshot.phase == GamePhase::Running {
        if let Err(error) = engine.step() {
            push_anomaly(
                &mut anomalies,
                &mut anomaly_records,
                &mut anomaly_seen,
                engine.turn(),
                format!("turn failed: {error}"),
            );
        }
        snapshot = engine.build_snapshot(true);

        for message in collect_snapshot_anomalies(&snapshot, &previous_scores) {
            push_anomaly(
                &mut anomalies,
                &mut anomaly_records,
                &mut anomaly_seen,
                snapshot.turn,
                message,
            );
        }
        previous_scores.clone_from(&snapshot.scores);

        for event in &snapshot.events {
            match event {
                TurnEvent::Fought { .. } => fights += 1,
                TurnEvent::Died { .. } => deaths += 1,
                TurnEvent::Bounced { .. } => bounces += 1,
                TurnEvent::Ate { .. } => food_eaten += 1,
                _ => {}
            }
        }

        if snapshot.turn > turn_safety {
            push_anomaly(
                &mut anomalies,
                &mut anomaly_records,
                &mut anomaly_seen,
                snapshot.turn,
                "turn safety limit exceeded".to_string(),
            );
            break;
        }
    }

    Ok(ScenarioRunResult {
        result: ScenarioResultLine {
            scenario: scenario.name.clone(),
            seed: scenario.seed,
            species: scenario.request.species.clone(),
            width: snapshot.width,
            height: snapshot.height,
            winner: snapshot.winner.clone().unwrap_or_else(|| DRAW.to_string()),
            phase: snapshot.phase,
            turns: snapshot.turn,
            duration_ms: started.elapsed().as_millis() as u64,
            scores: snapshot.scores.clone(),
            alive: snapshot.alive.clone(),
            faults: snapshot.faults.clone(),
            fights,
            deaths,
            bounces,
            food_eaten,
            anomalies,
        },
        anomaly_records,
    })
}

fn collect_snapshot_anomalies(
    snapshot: &Snapshot,
    previous_scores: &BTreeMap<String, i64>,
) -> Vec<String> {
    let mut anomalies = Vec::new();
    let in_bounds =
        |x: i32, y: i32| (0..snapshot.width).contains(&x) && (0..snapshot.height).contains(&y);

    let mut occupied: HashMap<(i32, i32), String> = HashMap::new();
    let mut living: BTreeMap<&str, usize> = BTreeMap::new();
    let mut member_scores: BTreeMap<&str, i64> = BTreeMap::new();
    for critter in &snapshot.critters {
        *member_scores.entry(critter.species.as_str()).or_insert(0) += critter.score;
        if !critter.alive {
            continue;
        }
        *living.entry(critter.species.as_str()).or_insert(0) += 1;
        if !in_bounds(critter.x, critter.y) {
            anomalies.push(format!(
                "critter out of bounds: {} at ({}, {})",
                critter.id, critter.x, critter.y
            ));
        }
        if let Some(other) = occupied.insert((critter.x, critter.y), critter.id.to_string()) {
            anomalies.push(format!(
                "cell shared by living critters: {other} and {} at ({}, {})",
                critter.id, critter.x, critter.y
            ));
        }
    }

    for &(x, y) in &snapshot.food {
        if !in_bounds(x, y) {
            anomalies.push(format!("food out of bounds at ({x}, {y})"));
        }
    }

    for (species, &alive) in &snapshot.alive {
        let counted = living.get(species.as_str()).copied().unwrap_or(0);
        if counted != alive {
            anomalies.push(format!(
                "alive count mismatch for {species}: reported {alive}, counted {counted}"
            ));
        }
    }

    for (species, &score) in &snapshot.scores {
        let summed = member_scores.get(species.as_str()).copied().unwrap_or(0);
        if summed != score {
            anomalies.push(format!(
                "species score {score} for {species} differs from member total {summed}"
            ));
        }
        if let Some(&before) = previous_scores.get(species) {
            if score < before {
                anomalies.push(format!("score decreased for {species}: {before} -> {score}"));
            }
        }
    }
    anomalies
}

fn resolve_scenarios(cli: &Cli) -> Vec<Scenario> {
    let base_seed = cli.seed.unwrap_or_else(rand::random::<u64>);
    let defaults = NewGameRequest::default();
    let species = parse_species_list(&cli.species);

    (0..cli.games.max(1))
        .map(|index| {
            let seed = base_seed.wrapping_add(index as u64);
            let request = NewGameRequest {
                width: cli.width.unwrap_or(defaults.width),
                height: cli.height.unwrap_or(defaults.height),
                critters_per_species: cli.count.unwrap_or(defaults.critters_per_species),
                initial_food: cli.food.unwrap_or(defaults.initial_food),
                species: species.clone(),
                seed: Some(seed),
                max_turns: Some(cli.max_turns.max(1)),
                ..defaults.clone()
            };
            Scenario {
                name: format!("game-{:02}", index + 1),
                request,
                seed,
            }
        })
        .collect()
}

fn push_anomaly(
    anomalies: &mut Vec<String>,
    anomaly_records: &mut Vec<AnomalyRecord>,
    anomaly_seen: &mut HashSet<String>,
    turn: u64,
    message: String,
) {
    anomaly_records.push(AnomalyRecord {
        turn,
        message: message.clone(),
    });
    if anomaly_seen.insert(message.clone()) {
        anomalies.push(message);
    }
}

fn default_match_id(seed: u64, timestamp_ms: i64) -> String {
    format!("sim-{seed}-{timestamp_ms}")
}

fn build_run_summary(
    match_id: String,
    started_at_ms: i64,
    finished_at_ms: i64,
    scenarios: Vec<ScenarioResultLine>,
    anomaly_count: usize,
) -> RunSummary {
    let scenario_count = scenarios.len();
    let total_turns: u64 = scenarios.iter().map(|scenario| scenario.turns).sum();
    let average_turns = if scenario_count == 0 {
        0
    } else {
        total_turns / scenario_count as u64
    };
    let mut win_counts = BTreeMap::new();
    for scenario in &scenarios {
        *win_counts.entry(scenario.winner.clone()).or_insert(0) += 1;
    }
    RunSummary {
        match_id,
        started_at_ms,
        finished_at_ms,
        scenario_count,
        anomaly_count,
        average_turns,
        win_counts,
        scenarios,
    }
}

fn emit_log(
    level: &str,
    event: &str,
    match_id: &str,
    scenario: Option<&str>,
    seed: Option<u64>,
    turn: Option<u64>,
    details: Value,
) {
    let log_line = StructuredLogLine {
        timestamp_ms: now_ms(),
        level: level.to_string(),
        event: event.to_string(),
        match_id: match_id.to_string(),
        scenario: scenario.map(|value| value.to_string()),
        seed,
        turn,
        details,
    };
    if let Ok(line) = serde_json::to_string(&log_line) {
        eprintln!("{line}");
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn write_summary(path: &Path, summary: &RunSummary) -> io::Result<()> {
    let summary_text = serde_json::to_string_pretty(summary).map_err(io::Error::other)?;
    std::fs::write(path, summary_text)
}
