//! impact-runner: headless runner for the scenario impact engine.
//!
//! Usage:
//!   impact-runner --input data/sample_request.json --mode actual_vs_scenario --format wide
//!   impact-runner --input data/sample_request.json --mode scenario_vs_scenario --base s1 --compared s2
//!   impact-runner --input data/sample_request.json --ipc-mode

mod factors;

use anyhow::{anyhow, Context, Result};
use factors::{FactorTable, ImpactFactor};
use scenario_impact_core::{
    config::EngineConfig,
    geocoding::StaticGeocoder,
    indicator::EntityNames,
    intervention::Scenario,
    progress::EngineEvent,
    report::{flatten_long, flatten_wide},
    sourcing::PurchaseLocation,
    ImpactEngine, ImpactInput, ImpactTableRequest,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::io::{self, BufRead, Write};
use std::str::FromStr;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CountryRegion {
    country:         String,
    admin_region_id: String,
    geo_region_id:   String,
}

/// Everything the excluded collaborators would normally supply.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestFile {
    baseline:  Vec<PurchaseLocation>,
    #[serde(default)]
    factors:   Vec<ImpactFactor>,
    #[serde(default)]
    regions:   Vec<CountryRegion>,
    #[serde(default)]
    names:     EntityNames,
    #[serde(default)]
    scenarios: Vec<Scenario>,
    request:   ImpactTableRequest,
}

impl RequestFile {
    fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| anyhow!("Cannot read {path}: {e}"))?;
        serde_json::from_str(&content).with_context(|| format!("Cannot parse {path}"))
    }

    fn scenario(&self, id: Option<&str>, position: usize) -> Result<&Scenario> {
        match id {
            Some(id) => self
                .scenarios
                .iter()
                .find(|s| s.id == id)
                .ok_or_else(|| anyhow!("Unknown scenario '{id}'")),
            None => self
                .scenarios
                .get(position)
                .ok_or_else(|| anyhow!("Request file has fewer than {} scenarios", position + 1)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum RunMode {
    ImpactTable,
    Ranked,
    ActualVsScenario,
    ScenarioVsScenario,
}

impl FromStr for RunMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "impact_table"         => Ok(Self::ImpactTable),
            "ranked"               => Ok(Self::Ranked),
            "actual_vs_scenario"   => Ok(Self::ActualVsScenario),
            "scenario_vs_scenario" => Ok(Self::ScenarioVsScenario),
            other => Err(anyhow!("Unknown mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum OutputFormat {
    Tree,
    Long,
    Wide,
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tree" => Ok(Self::Tree),
            "long" => Ok(Self::Long),
            "wide" => Ok(Self::Wide),
            other => Err(anyhow!("Unknown output format '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RunSpec {
    mode:     RunMode,
    #[serde(default = "default_format")]
    format:   OutputFormat,
    #[serde(default)]
    scenario: Option<String>,
    #[serde(default)]
    base:     Option<String>,
    #[serde(default)]
    compared: Option<String>,
}

fn default_format() -> OutputFormat {
    OutputFormat::Tree
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    Run {
        #[serde(flatten)]
        spec:    RunSpec,
        #[serde(default)]
        request: Option<ImpactTableRequest>,
    },
    Quit,
}

#[derive(Serialize)]
struct RunOutput {
    events: Vec<EngineEvent>,
    result: serde_json::Value,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let config_path = flag_value(&args, "--config").unwrap_or("./data/engine_config.json");
    let input_path = flag_value(&args, "--input").unwrap_or("./data/sample_request.json");
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let max_entities = parse_arg(&args, "--max-entities", 0usize);

    let config = EngineConfig::load(config_path)?;
    let mut file = RequestFile::load(input_path)?;
    if max_entities > 0 {
        file.request.max_ranking_entities = Some(max_entities);
    }

    let engine = ImpactEngine::new(config);
    let factors = FactorTable::new(std::mem::take(&mut file.factors));
    let geocoder = file
        .regions
        .iter()
        .fold(StaticGeocoder::new(), |g, r| {
            g.with_country(r.country.clone(), r.admin_region_id.clone(), r.geo_region_id.clone())
        });

    if ipc_mode {
        return run_ipc_loop(&engine, &file, &factors, &geocoder);
    }

    let spec = RunSpec {
        mode:     flag_value(&args, "--mode").unwrap_or("impact_table").parse()?,
        format:   flag_value(&args, "--format").unwrap_or("tree").parse()?,
        scenario: flag_value(&args, "--scenario").map(str::to_string),
        base:     flag_value(&args, "--base").map(str::to_string),
        compared: flag_value(&args, "--compared").map(str::to_string),
    };

    eprintln!("impact-runner");
    eprintln!("  started:   {}", chrono::Utc::now().to_rfc3339());
    eprintln!("  input:     {input_path}");
    eprintln!("  mode:      {:?}", spec.mode);
    eprintln!("  locations: {}", file.baseline.len());
    eprintln!();

    let output = run(&engine, &file, &file.request, &factors, &geocoder, &spec)?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn run(
    engine: &ImpactEngine,
    file: &RequestFile,
    request: &ImpactTableRequest,
    factors: &FactorTable,
    geocoder: &StaticGeocoder,
    spec: &RunSpec,
) -> Result<RunOutput> {
    let input = ImpactInput {
        baseline:   &file.baseline,
        indicators: factors,
        geocoder,
        names:      &file.names,
    };
    let mut events: Vec<EngineEvent> = Vec::new();

    let tables = match spec.mode {
        RunMode::ImpactTable => engine.impact_table(&input, request, &mut events)?,
        RunMode::Ranked => {
            let ranked = engine.ranked_impact_table(&input, request, &mut events)?;
            if spec.format == OutputFormat::Tree {
                return Ok(RunOutput {
                    events,
                    result: serde_json::to_value(&ranked)?,
                });
            }
            ranked.into_iter().map(|r| r.table).collect()
        }
        RunMode::ActualVsScenario => {
            let scenario = file.scenario(spec.scenario.as_deref(), 0)?;
            engine.actual_vs_scenario(&input, scenario, request, &mut events)?
        }
        RunMode::ScenarioVsScenario => {
            let base = file.scenario(spec.base.as_deref(), 0)?;
            let compared = file.scenario(spec.compared.as_deref(), 1)?;
            engine.scenario_vs_scenario(&input, base, compared, request, &mut events)?
        }
    };

    let result = match spec.format {
        OutputFormat::Tree => serde_json::to_value(&tables)?,
        OutputFormat::Long => serde_json::to_value(flatten_long(&tables))?,
        OutputFormat::Wide => serde_json::to_value(flatten_wide(&tables)?)?,
    };
    Ok(RunOutput { events, result })
}

fn run_ipc_loop(
    engine: &ImpactEngine,
    file: &RequestFile,
    factors: &FactorTable,
    geocoder: &StaticGeocoder,
) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        if handle.read_line(&mut buffer)? == 0 {
            break;
        }
        if buffer.trim().is_empty() {
            continue;
        }

        let reply = match serde_json::from_str::<IpcCommand>(&buffer) {
            Err(e) => serde_json::json!({ "error": e.to_string() }),
            Ok(IpcCommand::Quit) => break,
            Ok(IpcCommand::Run { spec, request }) => {
                let request = request.as_ref().unwrap_or(&file.request);
                match run(engine, file, request, factors, geocoder, &spec) {
                    Ok(output) => serde_json::to_value(&output)?,
                    Err(e) => {
                        log::warn!("ipc run failed: {e:#}");
                        serde_json::json!({ "error": format!("{e:#}") })
                    }
                }
            }
        };
        writeln!(stdout, "{reply}")?;
        stdout.flush()?;
    }

    Ok(())
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
