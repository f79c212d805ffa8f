//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::aggregator::aggregate_events;
use crate::domain::backtest::{BacktestResult, run_backtrack};
use crate::domain::config;
use crate::domain::error::BarbotError;
use crate::domain::granularity::{Granularity, period_duration};
use crate::domain::metrics::TradeStats;

#[derive(Parser, Debug)]
#[command(name = "barbot", about = "Candle aggregation, signal engines and backtracking")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay a CSV of bid/ask candles through the configured strategy
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Overrides [backtest] data
        #[arg(short, long)]
        data: Option<PathBuf>,
        /// Print every decision to stdout
        #[arg(long)]
        trace: bool,
    },
    /// Aggregate a ticks CSV into candles
    Aggregate {
        #[arg(short, long)]
        ticks: PathBuf,
        #[arg(short, long)]
        period: f64,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Print the venue granularity code for a period in minutes
    Granularity { minutes: f64 },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            data,
            trace,
        } => run_backtest(&config, data.as_deref(), trace),
        Command::Aggregate {
            ticks,
            period,
            output,
        } => run_aggregate(&ticks, period, &output),
        Command::Validate { config } => run_validate(&config),
        Command::Granularity { minutes } => run_granularity(minutes),
    }
}

fn fail(err: BarbotError) -> ExitCode {
    eprintln!("error: {err}");
    ExitCode::from(&err)
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(fail)
}

fn run_backtest(config_path: &Path, data_override: Option<&Path>, trace: bool) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let mut bt_config = match config::backtest_config(&adapter) {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    if let Some(rates) = config::backtest_rates_path(&adapter) {
        let rates_path = resolve_relative(config_path, &rates);
        eprintln!("Loading conversion rates from {}", rates_path.display());
        bt_config.rates = match csv_adapter::read_rates(&rates_path) {
            Ok(t) => t,
            Err(e) => return fail(e),
        };
    }
    let data_path = match data_override {
        Some(p) => p.to_path_buf(),
        None => match config::backtest_data_path(&adapter) {
            Ok(p) => resolve_relative(config_path, &p),
            Err(e) => return fail(e),
        },
    };

    eprintln!("Loading candles from {}", data_path.display());
    let bars = match csv_adapter::read_candles(&data_path) {
        Ok(b) => b,
        Err(e) => return fail(e),
    };
    eprintln!(
        "Backtracking {} on {} candles with {}",
        bt_config.meta.name,
        bars.len(),
        bt_config.strategy
    );

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => return fail(BarbotError::Io(e)),
    };
    let result = match runtime.block_on(run_backtrack(&bars, &bt_config)) {
        Ok(r) => r,
        Err(e) => return fail(e),
    };

    if trace {
        print_trace(&result);
    }
    print_summary(&result);
    ExitCode::SUCCESS
}

/// Data paths in a config file are relative to that file.
fn resolve_relative(config_path: &Path, data: &str) -> PathBuf {
    let data = PathBuf::from(data);
    if data.is_absolute() {
        return data;
    }
    match config_path.parent() {
        Some(dir) => dir.join(data),
        None => data,
    }
}

fn print_trace(result: &BacktestResult) {
    println!("time,signal,bid,ask,acted,balance,rejection");
    for d in &result.decisions {
        println!(
            "{},{},{},{},{},{:.2},{}",
            d.time.to_rfc3339(),
            d.signal,
            d.bid,
            d.ask,
            d.acted,
            d.balance,
            d.rejection.as_deref().unwrap_or("")
        );
    }
}

fn print_summary(result: &BacktestResult) {
    let stats = TradeStats::compute(result);
    eprintln!("\n=== Backtrack Results ===");
    eprintln!("Initial balance:  {:.2}", result.initial_balance);
    eprintln!("Final balance:    {:.2}", result.final_balance);
    eprintln!("Total return:     {:.2}%", stats.total_return * 100.0);
    eprintln!("Max drawdown:     {:.2}%", stats.max_drawdown * 100.0);
    eprintln!("Bars replayed:    {}", result.bars_replayed);
    eprintln!("Signals:          {}", result.decisions.len());
    eprintln!("Trades:           {}", stats.trade_count);
    eprintln!("  Won / Lost:     {} / {}", stats.trades_won, stats.trades_lost);
    eprintln!("  Win rate:       {:.1}%", stats.win_rate * 100.0);
    eprintln!("  Profit factor:  {:.2}", stats.profit_factor);
    eprintln!("  Largest win:    {:.2}", stats.largest_win);
    eprintln!("  Largest loss:   {:.2}", stats.largest_loss);
    if result.ruined {
        eprintln!("Account ruined: backtrack stopped early");
    }
}

fn run_aggregate(ticks_path: &Path, period_minutes: f64, output_path: &Path) -> ExitCode {
    if !(period_minutes > 0.0) {
        return fail(BarbotError::ConfigInvalid {
            section: "aggregate".to_string(),
            key: "period".to_string(),
            reason: "period must be positive".to_string(),
        });
    }
    eprintln!("Loading ticks from {}", ticks_path.display());
    let events = match csv_adapter::read_events(ticks_path) {
        Ok(e) => e,
        Err(e) => return fail(e),
    };
    let mut buffer = aggregate_events(&events, period_duration(period_minutes));
    if let Err(e) = csv_adapter::write_candles(output_path, buffer.as_slice()) {
        return fail(e);
    }
    eprintln!(
        "Wrote {} {} candles to {}",
        buffer.len(),
        Granularity::from_minutes(period_minutes),
        output_path.display()
    );
    ExitCode::SUCCESS
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    if let Err(e) = config::validate(&adapter) {
        return fail(e);
    }
    let trader = match config::trader_config(&adapter) {
        Ok(t) => t,
        Err(e) => return fail(e),
    };
    eprintln!("  Instrument:  {}", trader.instrument);
    eprintln!("  Venue:       {}", trader.venue);
    eprintln!("  Strategy:    {}", trader.strategy);
    eprintln!(
        "  Period:      {} min ({})",
        trader.period_minutes,
        Granularity::from_minutes(trader.period_minutes)
    );
    eprintln!("  Can trade:   {}", trader.can_trade);
    eprintln!("Config is valid");
    ExitCode::SUCCESS
}

fn run_granularity(minutes: f64) -> ExitCode {
    if !(minutes > 0.0) {
        return fail(BarbotError::ConfigInvalid {
            section: "granularity".to_string(),
            key: "minutes".to_string(),
            reason: "minutes must be positive".to_string(),
        });
    }
    println!("{}", Granularity::from_minutes(minutes));
    ExitCode::SUCCESS
}
