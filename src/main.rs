//! Strategy search and backtesting CLI.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use clap::{Parser, Subcommand};
use evotrader::application::backtester::Backtester;
use evotrader::application::generator::TheoryGenerator;
use evotrader::application::optimization::genetic::GeneticOptimizer;
use evotrader::application::optimization::grid::ParameterRange;
use evotrader::application::search::StrategySearchService;
use evotrader::config::EngineConfig;
use evotrader::infrastructure::mock::{InMemoryResultSink, SimulatedMarketDataService};
use evotrader::infrastructure::risk::StandardRiskManager;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about = "Evolutionary trading strategy search", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Backtest one generated theory over a date range
    Backtest {
        /// Symbol to trade
        #[arg(short, long, default_value = "BTC/USD")]
        symbol: String,

        /// Start date (YYYY-MM-DD)
        #[arg(long, default_value = "2023-01-01")]
        start: String,

        /// End date (YYYY-MM-DD)
        #[arg(long, default_value = "2023-12-31")]
        end: String,

        /// Theory generator seed
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Output JSON file for the result
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Genetically optimize one generated theory's parameters
    Optimize {
        /// Symbol to trade
        #[arg(short, long, default_value = "BTC/USD")]
        symbol: String,

        /// Start date (YYYY-MM-DD)
        #[arg(long, default_value = "2023-01-01")]
        start: String,

        /// End date (YYYY-MM-DD)
        #[arg(long, default_value = "2023-12-31")]
        end: String,

        /// Theory generator seed
        #[arg(long, default_value = "0")]
        seed: u64,

        #[arg(short, long)]
        population: Option<usize>,

        #[arg(short, long)]
        generations: Option<usize>,

        #[arg(short, long)]
        mutation_rate: Option<f64>,

        /// Output JSON file for the optimization history
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Grid-sweep one parameter and report the best setting
    Sweep {
        /// Symbol to trade
        #[arg(short, long, default_value = "BTC/USD")]
        symbol: String,

        /// Start date (YYYY-MM-DD)
        #[arg(long, default_value = "2023-01-01")]
        start: String,

        /// End date (YYYY-MM-DD)
        #[arg(long, default_value = "2023-12-31")]
        end: String,

        /// Parameter to sweep (e.g. stop_loss_pct)
        #[arg(short, long, default_value = "stop_loss_pct")]
        parameter: String,

        #[arg(long, default_value = "0.02")]
        min: f64,

        #[arg(long, default_value = "0.10")]
        max: f64,

        #[arg(long, default_value = "0.02")]
        step: f64,

        /// Theory generator seed
        #[arg(long, default_value = "0")]
        seed: u64,
    },
    /// Run the full search pipeline: generate, screen, optimize, rank
    Search {
        /// Start date (YYYY-MM-DD)
        #[arg(long, default_value = "2023-01-01")]
        start: String,

        /// End date (YYYY-MM-DD)
        #[arg(long, default_value = "2023-12-31")]
        end: String,

        /// Number of theories to generate
        #[arg(short, long)]
        count: Option<usize>,

        /// Comma-separated symbols (overrides SEARCH_SYMBOLS)
        #[arg(long)]
        symbols: Option<String>,

        /// Output JSON file for the ranked survivors
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    let cli = Cli::parse();
    let config = EngineConfig::from_env();
    config.validate()?;

    let market = Arc::new(SimulatedMarketDataService::new(config.seed));
    let risk = Arc::new(StandardRiskManager::new(config.initial_equity));
    let backtester = Arc::new(
        Backtester::new(market, risk.clone(), config.initial_equity)
            .with_max_concurrency(config.max_concurrency),
    );

    match cli.command {
        Commands::Backtest {
            symbol,
            start,
            end,
            seed,
            output,
        } => {
            let (start, end) = parse_date_range(&start, &end)?;
            let theory = TheoryGenerator::new(seed).generate_theory(&[symbol.clone()]);
            info!("Backtesting '{}' on {}", theory.name, symbol);

            let result = backtester.run_backtest(&theory, &symbol, start, end).await?;

            println!("Theory:        {}", theory.name);
            println!("Entry signal:  {}", theory.entry_signal.expression());
            println!("Exit signal:   {}", theory.exit_signal.expression());
            println!("Trades:        {}", result.metrics.total_trades);
            println!("Win rate:      {:.1}%", result.metrics.win_rate * 100.0);
            println!("Profit factor: {:.2}", result.metrics.profit_factor);
            println!("Max drawdown:  {:.1}%", result.metrics.max_drawdown * 100.0);
            println!("Sharpe:        {:.2}", result.metrics.sharpe_ratio);
            println!("Final equity:  {}", result.final_equity);
            if let Some(validation) = &result.validation {
                println!(
                    "Validation:    {}",
                    if validation.is_valid { "PASS" } else { "FAIL" }
                );
                for message in validation.messages() {
                    println!("  - {message}");
                }
            }

            if let Some(path) = output {
                std::fs::write(&path, serde_json::to_string_pretty(&result)?)
                    .with_context(|| format!("cannot write {path}"))?;
                println!("Result written to {path}");
            }
        }
        Commands::Optimize {
            symbol,
            start,
            end,
            seed,
            population,
            generations,
            mutation_rate,
            output,
        } => {
            let (start, end) = parse_date_range(&start, &end)?;
            let theory = TheoryGenerator::new(seed).generate_theory(&[symbol.clone()]);
            let mut settings = config.genetic_settings();
            if let Some(population) = population {
                settings.population_size = population;
            }
            if let Some(generations) = generations {
                settings.generations = generations;
            }
            if let Some(rate) = mutation_rate {
                settings.mutation_rate = rate;
            }
            info!(
                "Optimizing '{}' on {} ({} members, {} generations)",
                theory.name, symbol, settings.population_size, settings.generations
            );

            let mut optimizer = GeneticOptimizer::new(Arc::clone(&backtester), settings);
            let outcome = optimizer.optimize(&theory, start, end).await?;

            println!("Best theory:   {}", outcome.best_theory.name);
            println!("Entry signal:  {}", outcome.best_theory.entry_signal.expression());
            println!("Exit signal:   {}", outcome.best_theory.exit_signal.expression());
            println!(
                "Fitness:       {:.4} (from {:.4}, +{:.4})",
                outcome.best_fitness,
                outcome.initial_fitness,
                outcome.improvement()
            );
            println!("Duration:      {:.1}s", outcome.duration_secs);
            for g in &outcome.generations {
                println!(
                    "  gen {:>3}: best {:.4}, avg {:.4}, worst {:.4}",
                    g.generation + 1,
                    g.best_fitness,
                    g.average_fitness,
                    g.worst_fitness
                );
            }

            if let Some(path) = output {
                std::fs::write(&path, serde_json::to_string_pretty(&outcome)?)
                    .with_context(|| format!("cannot write {path}"))?;
                println!("Result written to {path}");
            }
        }
        Commands::Sweep {
            symbol,
            start,
            end,
            parameter,
            min,
            max,
            step,
            seed,
        } => {
            let (start, end) = parse_date_range(&start, &end)?;
            let theory = TheoryGenerator::new(seed).generate_theory(&[symbol.clone()]);
            let ranges = BTreeMap::from([(parameter.clone(), ParameterRange::new(min, max, step))]);

            let (best_set, best_result) = backtester
                .optimize_parameters(&theory, &symbol, &ranges, start, end)
                .await?;

            println!("Best {} = {:.4}", parameter, best_set[&parameter]);
            println!("Sharpe:        {:.2}", best_result.metrics.sharpe_ratio);
            println!("Win rate:      {:.1}%", best_result.metrics.win_rate * 100.0);
            println!("Final equity:  {}", best_result.final_equity);
        }
        Commands::Search {
            start,
            end,
            count,
            symbols,
            output,
        } => {
            let (start, end) = parse_date_range(&start, &end)?;
            let mut settings = config.search_settings();
            if let Some(list) = symbols {
                settings.symbols = list.split(',').map(|s| s.trim().to_string()).collect();
            }
            let count = count.unwrap_or(config.theory_count);

            let sink = Arc::new(InMemoryResultSink::new());
            let mut service = StrategySearchService::new(
                TheoryGenerator::new(config.seed),
                Arc::clone(&backtester),
                risk,
                sink,
                settings,
            );

            let outcomes = service.search_strategies(start, end, count).await?;

            println!("{} strategies survived the search", outcomes.len());
            for (rank, outcome) in outcomes.iter().enumerate() {
                println!(
                    "#{} {} fitness {:.4} (sharpe {:.2}, wr {:.1}%, dd {:.1}%)",
                    rank + 1,
                    outcome.theory.name,
                    outcome.fitness,
                    outcome.result.metrics.sharpe_ratio,
                    outcome.result.metrics.win_rate * 100.0,
                    outcome.result.metrics.max_drawdown * 100.0
                );
            }

            if let Some(path) = output {
                std::fs::write(&path, serde_json::to_string_pretty(&outcomes)?)
                    .with_context(|| format!("cannot write {path}"))?;
                println!("Results written to {path}");
            }
        }
    }

    Ok(())
}

fn parse_date_range(start: &str, end: &str) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let parse = |s: &str| -> Result<DateTime<Utc>> {
        let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("invalid date '{s}', expected YYYY-MM-DD"))?;
        Ok(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).expect("midnight is valid")))
    };
    let start = parse(start)?;
    let end = parse(end)?;
    if end <= start {
        anyhow::bail!("end date must be after start date");
    }
    Ok((start, end))
}
