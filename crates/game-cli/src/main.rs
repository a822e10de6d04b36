use std::env;
use std::net::SocketAddr;

use contracts::{ExperimentConfig, LiveRequest, LiveStatus};
use game_api::{serve, GameApi, SqliteRoundStore};
use game_core::cohort::{simulate_cohort, CohortMember};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_SQLITE_PATH: &str = "game_rounds.sqlite";

fn print_usage() {
    println!("game-cli <command> [--config <path>]");
    println!("commands:");
    println!("  status");
    println!("  serve [addr]");
    println!("    default addr: $GAME_ADDR or {DEFAULT_ADDR}");
    println!("  play <participant_id> <spending...> [--sqlite <path>]");
    println!("    plays one participant through the rounds and prints the results page");
    println!("  simulate <seed> <spending...> [--threads <n>]");
    println!("    one synthetic participant per constant spending level");
    println!("  export <experiment_id> [sqlite_path]");
    println!("    prints stored round records as json");
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Removes `--name <value>` from the argument list.
fn take_option(args: &mut Vec<String>, name: &str) -> Result<Option<String>, String> {
    let Some(index) = args.iter().position(|arg| arg == name) else {
        return Ok(None);
    };
    if index + 1 >= args.len() {
        return Err(format!("missing value for {name}"));
    }
    let value = args.remove(index + 1);
    args.remove(index);
    Ok(Some(value))
}

fn parse_socket_addr(value: Option<&String>) -> Result<SocketAddr, String> {
    let raw = value
        .cloned()
        .or_else(|| env::var("GAME_ADDR").ok())
        .filter(|addr| !addr.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_ADDR.to_string());
    raw.parse::<SocketAddr>()
        .map_err(|_| format!("invalid addr: {raw}"))
}

fn parse_seed(value: Option<&String>) -> Result<u64, String> {
    let raw = value.ok_or_else(|| "missing seed".to_string())?;
    raw.parse::<u64>()
        .map_err(|_| format!("invalid seed: {raw}"))
}

fn parse_spending(values: &[String]) -> Result<Vec<i64>, String> {
    if values.is_empty() {
        return Err("missing spending values".to_string());
    }
    values
        .iter()
        .map(|raw| {
            raw.parse::<i64>()
                .map_err(|_| format!("invalid spending: {raw}"))
        })
        .collect()
}

fn default_sqlite_path() -> String {
    env::var("GAME_SQLITE_PATH")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SQLITE_PATH.to_string())
}

fn load_config(path: Option<&str>) -> Result<ExperimentConfig, String> {
    let Some(path) = path else {
        return Ok(ExperimentConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .map_err(|err| format!("failed to read config {path}: {err}"))?;
    let config: ExperimentConfig = serde_json::from_str(&raw)
        .map_err(|err| format!("failed to parse config {path}: {err}"))?;
    config
        .validate()
        .map_err(|err| format!("invalid config {path}: {err}"))?;
    Ok(config)
}

fn run_play(
    args: &[String],
    config: ExperimentConfig,
    sqlite_path: Option<String>,
) -> Result<(), String> {
    let participant_id = args
        .get(2)
        .cloned()
        .ok_or_else(|| "missing participant_id".to_string())?;
    let spending = parse_spending(args.get(3..).unwrap_or_default())?;
    if spending.len() > config.num_rounds as usize {
        return Err(format!(
            "got {} spending values for {} rounds",
            spending.len(),
            config.num_rounds
        ));
    }

    let mut api =
        GameApi::from_config(config).map_err(|err| format!("invalid config: {err}"))?;
    if let Some(path) = sqlite_path.as_deref() {
        api.attach_sqlite_store(path)
            .map_err(|err| format!("failed to attach sqlite store: {err}"))?;
        api.initialize_experiment_storage(true)
            .map_err(|err| format!("failed to initialize experiment storage: {err}"))?;
    }

    api.register_participant(&participant_id);
    api.advance(&participant_id).map_err(|err| err.to_string())?;

    for investment in spending {
        let response = api
            .live(&participant_id, LiveRequest::CalculateResult { investment })
            .map_err(|err| err.to_string())?;
        if response.status == LiveStatus::Error {
            return Err(response.message.unwrap_or_else(|| "live call failed".to_string()));
        }
        api.advance(&participant_id).map_err(|err| err.to_string())?;
    }

    if let Some(error) = api.last_persistence_error() {
        return Err(format!("persistence error after play: {error}"));
    }

    let results = api
        .results_page(&participant_id)
        .map_err(|err| err.to_string())?;
    let payload = serde_json::to_string_pretty(&results).map_err(|err| err.to_string())?;
    println!("{payload}");
    Ok(())
}

fn run_simulation(
    args: &[String],
    config: ExperimentConfig,
    threads: Option<String>,
) -> Result<(), String> {
    let seed = parse_seed(args.get(2))?;
    let levels = parse_spending(args.get(3..).unwrap_or_default())?;
    let worker_threads = match threads {
        Some(raw) => raw
            .parse::<usize>()
            .map_err(|_| format!("invalid threads: {raw}"))?,
        None => std::thread::available_parallelism()
            .map(|count| count.get())
            .unwrap_or(1),
    };

    let members = levels
        .iter()
        .enumerate()
        .map(|(index, level)| {
            let spending = u32::try_from(*level).map_err(|_| {
                format!("Investment must be between 0 and {}", config.max_spending)
            })?;
            Ok(CohortMember::constant(format!("bot_{index:02}"), spending))
        })
        .collect::<Result<Vec<_>, String>>()?;

    let outcomes = simulate_cohort(&config, &members, seed, worker_threads)
        .map_err(|err| err.to_string())?;
    info!(members = outcomes.len(), seed, worker_threads, "cohort simulated");

    let payload = serde_json::to_string_pretty(&outcomes).map_err(|err| err.to_string())?;
    println!("{payload}");
    Ok(())
}

fn run_export(args: &[String]) -> Result<(), String> {
    let experiment_id = args
        .get(2)
        .cloned()
        .ok_or_else(|| "missing experiment_id".to_string())?;
    let sqlite_path = args
        .get(3)
        .cloned()
        .filter(|path| !path.trim().is_empty())
        .unwrap_or_else(default_sqlite_path);

    let store = SqliteRoundStore::open(&sqlite_path)
        .map_err(|err| format!("failed to open sqlite store: {err}"))?;
    if !store
        .experiment_exists(&experiment_id)
        .map_err(|err| err.to_string())?
    {
        return Err(format!("experiment not found in {sqlite_path}: {experiment_id}"));
    }
    let records = store
        .load_records(&experiment_id, None)
        .map_err(|err| err.to_string())?;

    let payload = serde_json::to_string_pretty(&records).map_err(|err| err.to_string())?;
    println!("{payload}");
    Ok(())
}

fn fail(err: String) -> ! {
    eprintln!("error: {err}");
    print_usage();
    std::process::exit(2);
}

#[tokio::main]
async fn main() {
    init_tracing();

    let mut args: Vec<String> = env::args().collect();
    let config_path = take_option(&mut args, "--config").unwrap_or_else(|err| fail(err));
    let sqlite_path = take_option(&mut args, "--sqlite").unwrap_or_else(|err| fail(err));
    let threads = take_option(&mut args, "--threads").unwrap_or_else(|err| fail(err));
    let config = load_config(config_path.as_deref()).unwrap_or_else(|err| fail(err));

    let command = args.get(1).map(String::as_str);
    let result = match command {
        Some("status") => match GameApi::from_config(config) {
            Ok(api) => {
                println!("{}", api.status());
                Ok(())
            }
            Err(err) => Err(format!("invalid config: {err}")),
        },
        Some("serve") => match parse_socket_addr(args.get(2)) {
            Ok(addr) => {
                println!("serving api on http://{addr}");
                if let Err(err) = serve(addr).await {
                    eprintln!("server error: {err}");
                    std::process::exit(1);
                }
                Ok(())
            }
            Err(err) => Err(err),
        },
        Some("play") => run_play(&args, config, sqlite_path),
        Some("simulate") => run_simulation(&args, config, threads),
        Some("export") => run_export(&args),
        _ => {
            print_usage();
            Ok(())
        }
    };

    if let Err(err) = result {
        fail(err);
    }
}
