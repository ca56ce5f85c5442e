use choice_fit::config::toml_config::{RecoveryConfig, ScheduleConfig, StudyKind};
use choice_fit::utils::error::ErrorSeverity;
use choice_fit::utils::{logger, validation::Validate};
use choice_fit::{FitEngine, LocalStorage, RecoveryPipeline};
use clap::Parser;

#[derive(Parser)]
#[command(name = "toml-recovery")]
#[command(about = "Parameter recovery studies driven by a TOML configuration")]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "recovery.toml")]
    config: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Override monitoring setting from config
    #[arg(long)]
    monitor: Option<bool>,

    /// Override the study seed
    #[arg(long)]
    seed: Option<u64>,

    /// Dry run - show what would be simulated without fitting
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // 初始化日誌
    logger::init_logger(args.verbose);

    tracing::info!("🚀 Starting parameter recovery");
    tracing::info!("📁 Loading configuration from: {}", args.config);

    let mut config = match RecoveryConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config file '{}': {}", args.config, e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(1);
        }
    };

    if let Some(seed) = args.seed {
        config.study.seed = Some(seed);
        tracing::info!("🔧 Seed overridden to: {}", seed);
    }

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    tracing::info!("✅ Configuration loaded and validated successfully");
    display_config_summary(&config, &args);

    if args.dry_run {
        tracing::info!("🔍 DRY RUN MODE - nothing will be simulated");
        perform_dry_run(&config)?;
        return Ok(());
    }

    let monitor_enabled = args.monitor.unwrap_or_else(|| config.monitoring_enabled());
    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    let storage = LocalStorage::new(config.output_path().to_string());
    let pipeline = RecoveryPipeline::new(storage, config);
    let engine = FitEngine::new_with_monitoring(pipeline, monitor_enabled);

    match engine.run().await {
        Ok(output_path) => {
            tracing::info!("✅ Recovery study completed successfully!");
            println!("✅ Recovery study completed successfully!");
            println!("📁 Output saved to: {}", output_path);
        }
        Err(e) => {
            tracing::error!(
                "❌ Recovery study failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 建議: {}", e.recovery_suggestion());

            let exit_code = match e.severity() {
                ErrorSeverity::Low => 0,
                ErrorSeverity::Medium => 2,
                ErrorSeverity::High => 1,
                ErrorSeverity::Critical => 3,
            };

            if exit_code > 0 {
                std::process::exit(exit_code);
            }
        }
    }

    Ok(())
}

fn display_config_summary(config: &RecoveryConfig, args: &Args) {
    println!("📋 Configuration Summary:");
    println!("  Study: {} ({:?})", config.study.name, config.study.kind);
    if let Some(description) = &config.study.description {
        println!("  Description: {}", description);
    }
    match config.study.seed {
        Some(seed) => println!("  Seed: {}", seed),
        None => println!("  Seed: random"),
    }
    println!("  Subjects: {}", config.n_subjects());
    println!("  Output: {}", config.output_path());
    println!("  Formats: {}", config.load.output_formats.join(", "));
    println!("  Workers: {}", config.workers());

    if args.dry_run {
        println!("  🔍 DRY RUN MODE ENABLED");
    }

    println!();
}

fn describe_schedule(
    label: &str,
    schedule: &ScheduleConfig,
    section: &str,
) -> choice_fit::Result<()> {
    let probs = schedule.probabilities(section)?;
    let mean = probs.iter().sum::<f64>() / probs.len() as f64;
    println!(
        "  {}: {:?}, {} trials, mean p(opt1 rewarded) = {:.3}",
        label,
        schedule.kind,
        probs.len(),
        mean
    );
    Ok(())
}

fn perform_dry_run(config: &RecoveryConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Dry Run Analysis:");
    println!();

    println!("🎲 Reward Schedules:");
    match config.study.kind {
        StudyKind::Grid => describe_schedule("Task", &config.schedule, "schedule")?,
        StudyKind::Difference => {
            describe_schedule("Stable block", &config.schedule, "schedule")?;
            if let Some(volatile) = &config.volatile_schedule {
                describe_schedule("Volatile block", volatile, "volatile_schedule")?;
            }
        }
    }

    println!();
    println!("⚙️ Fitting:");
    let options = config.fit_options();
    println!("  Starts per subject: {}", options.n_inits);
    println!("  Max iterations: {}, tolerance: {}", options.max_iter, options.tol);
    println!(
        "  Bounds: alpha [{}, {}], beta [{}, {}]",
        options.bounds.alpha_min,
        options.bounds.alpha_max,
        options.bounds.beta_min,
        options.bounds.beta_max
    );
    println!("  Utility: {:?}", options.utility);

    println!();
    println!("💾 Output Configuration:");
    println!("  Path: {}", config.output_path());
    println!("  Formats: {}", config.load.output_formats.join(", "));
    if config.bundle() {
        println!("  Bundle: recovery.zip");
    }

    println!();
    println!("✅ Dry run completed - configuration looks valid");
    Ok(())
}
