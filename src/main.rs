use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use kutcheri::config::AppConfig;
use kutcheri::gazetteer::Gazetteer;
use kutcheri::intent::{LlmExtractor, PatternExtractor, TieredExtractor};
use kutcheri::llm::GeminiClient;
use kutcheri::orchestrator::{QueryOrchestrator, TurnResponse};
use kutcheri::params::QueryParameters;
use kutcheri::respond::{LlmResponder, TemplateResponder};
use kutcheri::route::{
    CachedProvider, CoordinateTable, GoogleMapsProvider, LayeredProvider, RoutePlan,
    RouteSequencer, TravelMode,
};
use kutcheri::session::ConversationState;
use kutcheri::store::ConcertStore;
use kutcheri::store::models::{ConcertRecord, StoreSummary};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

type Sequencer = RouteSequencer<CachedProvider<LayeredProvider>>;

#[derive(Parser)]
#[command(name = "kutcheri", version, about = "Conversational concert schedule search")]
struct Cli {
    /// Schedule file (CSV; tab-separated for .txt/.tsv)
    #[arg(long, global = true)]
    data: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Never call the language model or maps APIs
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive conversation (/clear, /route 1,3, /quit)
    Chat,

    /// Ask a single question
    Ask {
        /// The question, e.g. "evening concerts in Mylapore on Dec 15"
        #[arg(required = true)]
        question: Vec<String>,
    },

    /// Sequence the concerts matching some filters into a route
    Route {
        /// Date expression ("Dec 15", "2025-12-20", "next saturday")
        #[arg(short, long)]
        date: Option<String>,

        /// Artist name
        #[arg(short, long)]
        artist: Option<String>,

        /// Venue name (substring match)
        #[arg(long)]
        venue: Option<String>,

        /// Area name (substring match on the venue)
        #[arg(short, long)]
        location: Option<String>,

        /// Longest hop the sequencer prefers, in minutes (default from config)
        #[arg(long)]
        max_travel: Option<f64>,

        /// walking, transit or driving (default from config)
        #[arg(long)]
        mode: Option<TravelMode>,
    },

    /// Show schedule statistics
    Stats,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load config file (optional, defaults if missing)
    let config = AppConfig::load();

    // Resolve schedule path: CLI > config > default file name
    let data_path = config.resolve_data_path(cli.data.clone());
    log::info!("Schedule: {}", data_path.display());

    let today = chrono::Local::now().date_naive();
    let store = ConcertStore::load(&data_path, today)
        .with_context(|| format!("Failed to load schedule {}", data_path.display()))?
        .with_gazetteer(Gazetteer::new(&config.gazetteer));
    log::info!("Loaded {} concerts", store.len());

    match cli.command {
        Commands::Stats => print_stats(&store.summary()),

        Commands::Ask { question } => {
            let orchestrator = build_orchestrator(store, &config, cli.offline);
            let mut state = ConversationState::new();
            let response = run_turn(&orchestrator, &question.join(" "), &mut state);
            print_response(&response);
        }

        Commands::Chat => {
            let sequencer = build_sequencer(&config, cli.offline);
            let orchestrator = build_orchestrator(store, &config, cli.offline);
            chat(&orchestrator, &sequencer, config.route.mode)?;
        }

        Commands::Route { date, artist, venue, location, max_travel, mode } => {
            let params = QueryParameters {
                date,
                artist,
                venue,
                location,
                ..Default::default()
            }
            .normalized();
            if !params.has_filters() {
                anyhow::bail!("Give at least one of --date, --artist, --venue or --location.");
            }

            let ids = store.combine(&params);
            if ids.is_empty() {
                println!("No concerts match {}.", params.describe_filters().join(", "));
                return Ok(());
            }

            let mode = mode.unwrap_or(config.route.mode);
            let max_travel = max_travel.unwrap_or(config.route.max_travel_minutes);
            let sequencer = build_sequencer(&config, cli.offline);
            let concerts = store.rows(&ids);
            let sequence = sequencer.suggest_optimal_sequence(&concerts, max_travel, mode);

            println!(
                "Suggested order for {} concert(s), {} mode, hops up to {:.0} min:",
                sequence.len(),
                mode,
                max_travel
            );
            println!("(greedy nearest-venue order per day; not guaranteed to be the shortest tour)");
            println!();
            print_concert_table(&sequence);
            println!();

            // Legs and warnings follow the suggested visiting order
            print_legs(&sequencer.plan_in_order(sequence, mode));
        }
    }

    Ok(())
}

/// Language model when configured and reachable, patterns and templates
/// otherwise.
fn build_orchestrator(store: ConcertStore, config: &AppConfig, offline: bool) -> QueryOrchestrator {
    let gazetteer = store.gazetteer().clone();
    if offline || !config.llm.enabled {
        return QueryOrchestrator::offline(store, gazetteer);
    }

    match GeminiClient::from_config(&config.llm) {
        Ok(client) => {
            log::info!("Using language model {}", config.llm.model);
            let resolver = *store.resolver();
            let patterns = PatternExtractor::new(resolver, gazetteer);
            let primary = LlmExtractor::new(client.clone(), resolver);
            let extractor = TieredExtractor::new(Some(Box::new(primary)), patterns);
            QueryOrchestrator::new(store, extractor, Box::new(LlmResponder::new(client)))
        }
        Err(e) => {
            log::warn!("Language model unavailable ({e}); using pattern extraction");
            let patterns = PatternExtractor::new(*store.resolver(), gazetteer);
            QueryOrchestrator::new(store, TieredExtractor::offline(patterns), Box::new(TemplateResponder))
        }
    }
}

/// Config coordinates first, then Google Maps when a key is available.
fn build_sequencer(config: &AppConfig, offline: bool) -> Sequencer {
    let mut layers = LayeredProvider::new().with_layer(CoordinateTable::new(&config.venues));
    if !offline && config.maps.enabled {
        match GoogleMapsProvider::from_config(&config.maps) {
            Ok(maps) => layers = layers.with_layer(maps),
            Err(e) => log::warn!("Maps unavailable ({e:#}); using configured coordinates only"),
        }
    }
    RouteSequencer::new(CachedProvider::new(layers), config.route.concert_minutes)
}

fn run_turn(
    orchestrator: &QueryOrchestrator,
    utterance: &str,
    state: &mut ConversationState,
) -> TurnResponse {
    if !orchestrator.uses_language_model() {
        return orchestrator.handle_turn(utterance, state);
    }
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner:.green} {msg}").unwrap());
    spinner.set_message("Thinking...");
    spinner.enable_steady_tick(Duration::from_millis(100));
    let response = orchestrator.handle_turn(utterance, state);
    spinner.finish_and_clear();
    response
}

fn chat(orchestrator: &QueryOrchestrator, sequencer: &Sequencer, mode: TravelMode) -> Result<()> {
    println!("Ask about concerts. /clear starts over, /route 1,3 plans a route, /quit exits.");
    let mut state = ConversationState::new();
    let mut last_rows: Vec<ConcertRecord> = Vec::new();
    let stdin = io::stdin();

    loop {
        print!("> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line).context("Failed to read input")? == 0 {
            break;
        }
        let line = line.trim();

        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/clear" => {
                state.clear();
                last_rows.clear();
                println!("Conversation cleared.");
                continue;
            }
            _ => {}
        }

        if let Some(picks) = line.strip_prefix("/route") {
            match parse_picks(picks, last_rows.len()) {
                Ok(indices) => {
                    let chosen: Vec<ConcertRecord> =
                        indices.iter().map(|&i| last_rows[i].clone()).collect();
                    let plan = sequencer.plan_route(&chosen, mode);
                    print_concert_table(&plan.stops);
                    println!();
                    print_legs(&plan);
                }
                Err(msg) => println!("{msg}"),
            }
            continue;
        }

        let response = run_turn(orchestrator, line, &mut state);
        print_response(&response);
        if response.replaces_results() {
            last_rows = response.rows;
        }
    }
    Ok(())
}

/// 1-based row numbers ("1,3 4") into indices. Empty picks every row.
fn parse_picks(picks: &str, available: usize) -> std::result::Result<Vec<usize>, String> {
    if available == 0 {
        return Err("No results to route yet. Search for some concerts first.".to_string());
    }
    let picks = picks.trim();
    if picks.is_empty() {
        return Ok((0..available).collect());
    }
    picks
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|s| match s.parse::<usize>() {
            Ok(n) if (1..=available).contains(&n) => Ok(n - 1),
            _ => Err(format!("'{s}' is not a row number between 1 and {available}.")),
        })
        .collect()
}

fn print_response(response: &TurnResponse) {
    println!("{}", response.text);
    if response.rows.is_empty() {
        return;
    }
    println!();
    if response.followup {
        println!("(narrowed from your previous results)");
    }
    print_concert_table(&response.rows);
}

/// Print concerts as a numbered table.
fn print_concert_table(rows: &[ConcertRecord]) {
    println!(
        "{:>3}  {:<16} {:<8} {:<30} {:<30} {:<8}",
        "#", "Date", "Time", "Artist", "Venue", "Entry"
    );
    println!("{}", "-".repeat(102));

    for (i, r) in rows.iter().enumerate() {
        let entry = r.ticketed.map(|t| t.to_string()).unwrap_or_default();
        println!(
            "{:>3}  {:<16} {:<8} {:<30} {:<30} {:<8}",
            i + 1,
            r.date_label(),
            truncate(&r.time, 8),
            truncate(&r.artists, 30),
            truncate(&r.venue, 30),
            entry,
        );
    }
}

fn print_legs(plan: &RoutePlan) {
    if plan.legs.is_empty() {
        println!("No travel legs (fewer than two concerts, or venues could not be located).");
    } else {
        for leg in &plan.legs {
            println!(
                "{} -> {}: {:.1} km, {:.0} min",
                leg.from, leg.to, leg.distance_km, leg.duration_min
            );
            for step in &leg.steps {
                println!("    {} ({}, {})", step.instruction, step.distance, step.duration);
            }
        }
        println!(
            "Total: {:.2} km, {:.2} min",
            plan.total_distance_km, plan.total_duration_min
        );
    }
    for warning in &plan.warnings {
        println!("Warning: {warning}");
    }
}

fn print_stats(summary: &StoreSummary) {
    println!("Schedule Statistics");
    println!("===================");
    println!("Total concerts:   {}", summary.total);
    if let (Some(first), Some(last)) = (summary.first_date, summary.last_date) {
        println!("Dates:            {first} to {last}");
    }
    if summary.undated > 0 {
        println!("Undated:          {}", summary.undated);
    }
    println!("Venues:           {}", summary.venue_count);
    println!(
        "Admission:        {} free, {} ticketed, {} unknown",
        summary.free,
        summary.ticketed,
        summary.total.saturating_sub(summary.free + summary.ticketed)
    );
    println!();

    if !summary.sources.is_empty() {
        println!("Sources:");
        for (source, count) in &summary.sources {
            println!("  {:<30} {}", source, count);
        }
        println!();
    }

    if !summary.sample_venues.is_empty() {
        println!("Some venues:");
        for venue in &summary.sample_venues {
            println!("  {venue}");
        }
    }
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() > width {
        let head: String = s.chars().take(width - 3).collect();
        format!("{head}...")
    } else {
        s.to_string()
    }
}
