// Level calculator: K-line file in, audited support/resistance levels out

use clap::{Parser, ValueEnum};
use key_level_grid::analysis::level_calculator::main_timeframe;
use key_level_grid::data::load_klines_json;
use key_level_grid::{LevelCalculator, LevelConfig, LevelError, LevelPlan, LevelResult, LevelRole};
use std::path::PathBuf;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "level-calc")]
#[command(about = "Multi-timeframe key level calculator with ATR spacing audit")]
struct Cli {
    /// TOML configuration file (defaults are used when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSON K-line file keyed by timeframe ({"1d": [...], "4h": [...]})
    #[arg(short, long, required_unless_present = "init_config")]
    klines: Option<PathBuf>,

    /// Current price (defaults to the last close of the main timeframe)
    #[arg(short, long)]
    price: Option<f64>,

    /// Which side to compute
    #[arg(short, long, value_enum, default_value = "both")]
    role: RoleArg,

    /// Maximum levels per side before the audit
    #[arg(short = 'n', long)]
    count: Option<usize>,

    /// Fixed ATR instead of computing it from the main timeframe
    #[arg(long)]
    atr: Option<f64>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    output: OutputFormat,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Write a default configuration to this path and exit
    #[arg(long, value_name = "PATH")]
    init_config: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum RoleArg {
    Support,
    Resistance,
    Both,
}

impl RoleArg {
    fn roles(self) -> Vec<LevelRole> {
        match self {
            RoleArg::Support => vec![LevelRole::Support],
            RoleArg::Resistance => vec![LevelRole::Resistance],
            RoleArg::Both => vec![LevelRole::Resistance, LevelRole::Support],
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("❌ [{}] {}", e.category(), e.user_message());
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> LevelResult<()> {
    if let Some(path) = &cli.init_config {
        LevelConfig::default().to_file(path)?;
        println!("📁 Wrote default configuration to {}", path.display());
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) if !path.exists() => {
            return Err(LevelError::ConfigNotFound(path.display().to_string()));
        }
        Some(path) => LevelConfig::from_file(path)?,
        None => LevelConfig::default(),
    };

    init_logging(&config, cli.verbose);

    if let Some(count) = cli.count {
        if count == 0 {
            return Err(LevelError::InvalidParameter("count".to_string(), "must be at least 1".to_string()));
        }
        config.selection.max_levels = count;
    }

    let klines_path = cli
        .klines
        .as_ref()
        .ok_or_else(|| LevelError::InvalidParameter("klines".to_string(), "a K-line file is required".to_string()))?;
    let klines_by_tf = load_klines_json(klines_path)?;

    let main_tf = main_timeframe(&klines_by_tf, &config.selection.main_timeframe);
    let current_price = match cli.price {
        Some(price) if price > 0.0 => price,
        Some(price) => {
            return Err(LevelError::InvalidParameter("price".to_string(), format!("{} is not positive", price)));
        }
        None => klines_by_tf
            .get(&main_tf)
            .and_then(|bars| bars.last())
            .map(|bar| bar.close)
            .ok_or_else(|| LevelError::InsufficientData(format!("no {} bars to take the current price from", main_tf)))?,
    };

    info!("🚀 Computing levels at {:.4} (main timeframe {})", current_price, main_tf);
    if let Some(last_bar) = klines_by_tf.get(&main_tf).and_then(|bars| bars.last()) {
        if let Some(time) = last_bar.datetime() {
            info!("📁 Last {} bar opened {}", main_tf, time.format("%Y-%m-%d %H:%M UTC"));
        }
    }

    let calculator = LevelCalculator::new(config);
    let plans: Vec<LevelPlan> = cli
        .role
        .roles()
        .into_iter()
        .filter_map(|role| calculator.generate_audited_levels(&klines_by_tf, current_price, role, cli.atr))
        .collect();

    if plans.is_empty() {
        return Err(LevelError::InsufficientData("no levels could be generated from the supplied K-lines".to_string()));
    }

    match cli.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plans)?),
        OutputFormat::Table => {
            for plan in &plans {
                print_plan(plan, &calculator);
            }
        }
    }

    Ok(())
}

fn init_logging(config: &LevelConfig, verbose: bool) {
    let level = if verbose {
        Level::DEBUG
    } else {
        config.logging.level.parse().unwrap_or(Level::INFO)
    };

    tracing_subscriber::fmt().with_max_level(level).with_target(false).init();
}

fn print_plan(plan: &LevelPlan, calculator: &LevelCalculator) {
    println!();
    println!(
        "📊 {} levels @ {:.4} (trend: {:?}, ATR: {:.4})",
        plan.role, plan.current_price, plan.trend, plan.audit.atr_value
    );
    println!("{:>14} {:>9} {:>6}  {}", "price", "score", "qty", "source");

    for level in &plan.levels {
        let source = match (level.breakdown(), level.fill_type()) {
            (Some(score), _) => {
                let tfs: Vec<&str> = score.source_timeframes.iter().map(String::as_str).collect();
                let marker = if level.is_resonance { " ⚡" } else { "" };
                format!("{} {:?}{}", tfs.join("+"), score.volume_zone, marker)
            }
            (None, Some(fill_type)) => format!("fill:{}", fill_type),
            (None, None) => "-".to_string(),
        };

        println!(
            "{:>14.4} {:>9.1} {:>6.1}  {}",
            level.price,
            level.score,
            calculator.scorer().get_qty_multiplier(level.score),
            source
        );
    }

    let audit = &plan.audit;
    println!(
        "   audit: {} -> {} (trimmed {}, filled {}{})",
        audit.original_count,
        audit.final_count,
        audit.trimmed_count,
        audit.filled_count,
        if audit.iteration_cap_hit { ", iteration cap hit" } else { "" }
    );
}
