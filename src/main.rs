use env_logger::Env;
use log::{error, info, warn};
use plate_dashboard::api::ApiClient;
use plate_dashboard::config::Config;
use plate_dashboard::dataset::DatasetSource;
use plate_dashboard::plate::{self, PlateGrammar};
use plate_dashboard::poller::{PollInterval, PollPhase, PollState, Poller};
use plate_dashboard::prediction::{fetch_routes, RouteCache};
use plate_dashboard::types::{Stats, VehicleStatus, VerifyRequest};
use plate_dashboard::view::{self, Filters, Sorts, PROVINCE_OPTIONS};
use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{channel, Sender};

#[macro_use]
extern crate failure;

const STATS_INTERVAL: Duration = Duration::from_secs(5);

const USAGE: &str = "usage: plate-dashboard [COMMAND]

commands:
  watch [--status S] [--province P] [--valid-only] [--search Q] [--routes]
                          live dashboard (default), reading commands from stdin:
                            r                      refresh now
                            ack <id>               acknowledge an alert
                            sort <table> <column>  toggle a table's sort
                            window <mins> <mins>   sighting and alert windows
                            source api|apiLegacy   how the dataset is fetched
                            interval <ms>|off      poll interval
                            q                      quit
  stats                   aggregate statistics
  ack <alert-id>          acknowledge and dispatch an alert
  route <plate>           predicted route for a plate
  check <plate>           validate a plate locally
  verify <plate> [--make M] [--model M] [--owner O] [--region R]
                          check a vehicle against police records";

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    info!("Starting plate-dashboard");

    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Err(e) = run(&args).await {
        error!("{}", e);
        std::process::exit(1);
    }
    info!("Exiting main");
}

async fn run(args: &[String]) -> Result<(), failure::Error> {
    let command = args.first().map(String::as_str).unwrap_or("watch");
    let rest = if args.is_empty() { args } else { &args[1..] };

    if command == "check" {
        check(&required(rest, 0, "<plate>")?);
        return Ok(());
    }
    if command == "help" || command == "--help" || command == "-h" {
        println!("{}", USAGE);
        return Ok(());
    }

    let config = Config::from_env()?;
    let client = ApiClient::new(&config);
    info!("Using API at {}", client.base());

    match command {
        "watch" => watch(client, config, parse_watch_args(rest)?).await,
        "stats" => {
            let stats = client.stats().await?;
            print!("{}", view::render_stats(&stats));
            Ok(())
        }
        "ack" => {
            let id = parse_id(&required(rest, 0, "<alert-id>")?)?;
            acknowledge(&client, id).await
        }
        "route" => {
            let wanted = required(rest, 0, "<plate>")?;
            let routes = fetch_routes(&client, vec![plate::convert_plate_to_native(&wanted)]).await;
            match routes.values().next() {
                Some(path) => {
                    for p in path {
                        println!("{:.5}, {:.5}", p.lat, p.lon);
                    }
                }
                None => println!("No predicted route for {}", wanted),
            }
            Ok(())
        }
        "verify" => {
            let request = parse_verify_args(rest)?;
            let result = client.verify(&request).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        other => Err(format_err!("unknown command: {}\n{}", other, USAGE)),
    }
}

struct WatchArgs {
    filters: Filters,
    routes: bool,
}

fn parse_watch_args(args: &[String]) -> Result<WatchArgs, failure::Error> {
    let mut watch = WatchArgs {
        filters: Filters::default(),
        routes: false,
    };
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--status" => {
                i += 1;
                let s = required(args, i, "--status")?;
                watch.filters.status = match s.as_str() {
                    "all" => None,
                    s => Some(
                        VehicleStatus::parse(s)
                            .ok_or_else(|| format_err!("unknown status: {}", s))?,
                    ),
                };
            }
            "--province" => {
                i += 1;
                let p = plate::to_native_digits(&required(args, i, "--province")?);
                if p != "all" && !PROVINCE_OPTIONS.contains(&p.as_str()) {
                    return Err(format_err!("province must be one of 1-7, got {}", p));
                }
                watch.filters.province = if p == "all" { None } else { Some(p) };
            }
            "--search" => {
                i += 1;
                watch.filters.search = required(args, i, "--search")?;
            }
            "--valid-only" => watch.filters.valid_only = true,
            "--routes" => watch.routes = true,
            other => return Err(format_err!("unexpected argument: {}", other)),
        }
        i += 1;
    }
    Ok(watch)
}

fn parse_verify_args(args: &[String]) -> Result<VerifyRequest, failure::Error> {
    let mut request = VerifyRequest {
        plate_number: required(args, 0, "<plate>")?,
        ..VerifyRequest::default()
    };
    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        i += 1;
        let value = Some(required(args, i, flag)?);
        match flag {
            "--make" => request.make = value,
            "--model" => request.model = value,
            "--owner" => request.owner_name = value,
            "--region" => request.region_code = value,
            other => return Err(format_err!("unexpected argument: {}", other)),
        }
        i += 1;
    }
    Ok(request)
}

fn required(args: &[String], idx: usize, what: &str) -> Result<String, failure::Error> {
    args.get(idx)
        .cloned()
        .ok_or_else(|| format_err!("missing value for {}", what))
}

fn parse_id(s: &str) -> Result<i64, failure::Error> {
    s.trim()
        .parse()
        .map_err(|_| format_err!("not an alert id: {}", s))
}

fn check(input: &str) {
    let normalized = plate::normalize(input);
    match plate::classify(&normalized) {
        Some(PlateGrammar::Provincial) => println!(
            "{}: valid provincial plate, province {}",
            normalized,
            plate::extract_province(&normalized).unwrap_or_default()
        ),
        Some(PlateGrammar::Legacy) => println!("{}: valid legacy zone plate", normalized),
        None => {
            let native = plate::convert_plate_to_native(input);
            if plate::is_valid(&native) {
                println!("{}: invalid as typed; did you mean {}?", normalized, native);
            } else {
                println!("{}: invalid plate", normalized);
            }
        }
    }
}

async fn acknowledge(client: &ApiClient, id: i64) -> Result<(), failure::Error> {
    match client.acknowledge_alert(id).await? {
        Some(alert) => println!(
            "Alert #{} for {}: acknowledged={} dispatched={}",
            alert.id, alert.plate_number, alert.acknowledged, alert.dispatched
        ),
        None => println!("Alert #{} acknowledged", id),
    }
    Ok(())
}

async fn watch(client: ApiClient, config: Config, args: WatchArgs) -> Result<(), failure::Error> {
    let mut query = config.query;
    let mut interval = config.poll;
    let poller = Poller::start(Arc::new(client.clone()), query, interval);
    let mut state = poller.subscribe();

    let (tx, mut input) = channel(8);
    std::thread::spawn(move || read_stdin(tx));
    let mut stdin_open = true;

    let mut stats_ticker = tokio::time::interval(STATS_INTERVAL);
    let mut stats: Option<Stats> = None;

    let mut sorts = Sorts::default();
    let mut routes = RouteCache::new();
    let mut shown: Option<PollState> = None;

    loop {
        tokio::select! {
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = state.borrow().clone();
                match current.phase {
                    PollPhase::Loading if shown.is_none() => info!("Loading dataset..."),
                    PollPhase::Failed => {
                        if let Some(e) = &current.error {
                            error!("Failed to load dataset: {}", e);
                        }
                    }
                    PollPhase::Ready
                        if shown.as_ref().map(|s| s.revision) != Some(current.revision) =>
                    {
                        if args.routes {
                            routes.refresh(&client, &current.snapshot.sightings).await;
                        }
                        print_dashboard(&current, &args.filters, &sorts, client.base(), &routes);
                        shown = Some(current);
                    }
                    _ => {}
                }
            }
            _ = stats_ticker.tick() => match client.stats().await {
                Ok(next) => {
                    if stats.as_ref() != Some(&next) {
                        println!("\n-- Stats --");
                        print!("{}", view::render_stats(&next));
                        stats = Some(next);
                    }
                }
                Err(e) => warn!("Failed to load stats: {}", e),
            },
            line = input.recv(), if stdin_open => {
                let line = match line {
                    Some(line) => line,
                    None => {
                        stdin_open = false;
                        continue;
                    }
                };
                match parse_command(&line) {
                    Ok(WatchCommand::Quit) => break,
                    Ok(WatchCommand::Refresh) => poller.refresh(),
                    Ok(WatchCommand::Ack(id)) => match acknowledge(&client, id).await {
                        Ok(()) => poller.refresh(),
                        Err(e) => error!("Failed to acknowledge alert #{}: {}", id, e),
                    },
                    Ok(WatchCommand::Sort(table, column)) => match sorts.toggle(&table, &column) {
                        Ok(()) => {
                            if let Some(current) = &shown {
                                print_dashboard(current, &args.filters, &sorts, client.base(), &routes);
                            }
                        }
                        Err(e) => warn!("{}", e),
                    },
                    Ok(WatchCommand::Window(sightings, alerts)) => {
                        query.minutes_sightings = sightings;
                        query.minutes_alerts = alerts;
                        poller.reconfigure(query, interval);
                    }
                    Ok(WatchCommand::Source(source)) => {
                        query.source = source;
                        poller.reconfigure(query, interval);
                    }
                    Ok(WatchCommand::Interval(next)) => {
                        interval = next;
                        poller.reconfigure(query, interval);
                    }
                    Err(e) => warn!("{}", e),
                }
            }
        }
    }

    poller.stop().await;
    Ok(())
}

#[derive(Debug, PartialEq)]
enum WatchCommand {
    Quit,
    Refresh,
    Ack(i64),
    Sort(String, String),
    Window(u32, u32),
    Source(DatasetSource),
    Interval(PollInterval),
}

fn parse_command(line: &str) -> Result<WatchCommand, failure::Error> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let command = match words.as_slice() {
        ["q"] | ["quit"] => WatchCommand::Quit,
        [] | ["r"] | ["refresh"] => WatchCommand::Refresh,
        ["ack", id] => WatchCommand::Ack(parse_id(id)?),
        ["sort", table, column] => WatchCommand::Sort(table.to_string(), column.to_string()),
        ["window", sightings, alerts] => match (sightings.parse::<u32>(), alerts.parse::<u32>()) {
            (Ok(s), Ok(a)) => WatchCommand::Window(s, a),
            _ => return Err(format_err!("window takes two minute counts, e.g. window 60 120")),
        },
        ["source", name] => WatchCommand::Source(
            DatasetSource::parse(name)
                .ok_or_else(|| format_err!("source must be api or apiLegacy, got {}", name))?,
        ),
        ["interval", value] => WatchCommand::Interval(
            PollInterval::parse(value)
                .ok_or_else(|| format_err!("interval takes milliseconds or off, got {}", value))?,
        ),
        _ => {
            return Err(format_err!(
                "Unknown command {:?}; see plate-dashboard help",
                line.trim()
            ))
        }
    };
    Ok(command)
}

fn read_stdin(tx: Sender<String>) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        match line {
            Ok(line) => {
                if tx.blocking_send(line).is_err() {
                    return;
                }
            }
            Err(e) => {
                error!("Error reading stdin: {}", e);
                return;
            }
        }
    }
}

fn print_dashboard(
    state: &PollState,
    filters: &Filters,
    sorts: &Sorts,
    api_base: &str,
    routes: &RouteCache,
) {
    let data = &state.snapshot;
    let counts = data.counts();
    println!(
        "== {} ({}, sightings {}m, alerts {}m) revision {} ==",
        api_base,
        state.query.source.as_str(),
        state.query.minutes_sightings,
        state.query.minutes_alerts,
        state.revision
    );
    println!(
        "Counts: vehicles {}, sightings {}, alerts {}",
        counts.vehicles, counts.sightings, counts.alerts
    );
    println!("\n-- Vehicles --");
    print!(
        "{}",
        view::render_vehicles(&filters.vehicles(&data.vehicles, sorts.vehicles))
    );
    println!("\n-- Sightings --");
    print!(
        "{}",
        view::render_sightings(&filters.sightings(&data.sightings, sorts.sightings))
    );
    println!("\n-- Alerts --");
    print!(
        "{}",
        view::render_alerts(&filters.alerts(&data.alerts, sorts.alerts))
    );
    let center = view::map_center(&data.sightings);
    println!("\n-- Map (centre {:.4}, {:.4}) --", center.lat, center.lon);
    print!("{}", view::render_markers(&view::markers(&data.sightings)));
    for (plate, path) in routes.routes() {
        println!("route {}: {} points", plate, path.len());
    }
}
