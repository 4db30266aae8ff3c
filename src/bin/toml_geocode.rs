use clap::Parser;
use green_geo_etl::app;
use green_geo_etl::core::ConfigProvider;
use green_geo_etl::utils::{logger, validation::Validate};
use green_geo_etl::TomlConfig;

#[derive(Parser)]
#[command(name = "toml-geocode")]
#[command(about = "Geocoding pipeline driven by a TOML configuration file")]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "geocode-config.toml")]
    config: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Override monitoring setting from config
    #[arg(long)]
    monitor: Option<bool>,

    /// Dry run - show what would be processed without executing
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // 載入 TOML 配置
    let config = match TomlConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config file '{}': {}", args.config, e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(1);
        }
    };

    // 初始化日誌
    if config.log_json() {
        logger::init_json_logger(args.verbose);
    } else {
        logger::init_cli_logger(args.verbose);
    }
    tracing::info!("📁 Loaded configuration from: {}", args.config);

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
        tracing::info!("🔍 DRY RUN MODE - No geocoding requests will be sent");
        perform_dry_run(&config);
        return Ok(());
    }

    let monitor_enabled = args.monitor.unwrap_or_else(|| config.monitoring_enabled());
    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    match app::run_all(&config, monitor_enabled).await {
        Ok(reports) => {
            println!("✅ Geocoding pipeline completed successfully!");
            for report in reports {
                println!(
                    "📍 {}: {} rows, {} located, {} unknown",
                    report.dataset,
                    report.records,
                    report.stats.resolved,
                    report.stats.unknown()
                );
                for (kind, count) in &report.stats.failures_by_kind {
                    println!("   ⚠️ {}: {}", kind, count);
                }
                for output in &report.outputs {
                    println!("   📁 {}/{}", config.output_path(), output);
                }
            }
        }
        Err(e) => {
            tracing::error!(
                "❌ Geocoding pipeline failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 建議: {}", e.recovery_suggestion());

            let exit_code = e.severity().exit_code();
            if exit_code > 0 {
                std::process::exit(exit_code);
            }
        }
    }

    Ok(())
}

fn display_config_summary(config: &TomlConfig, args: &Args) {
    println!("📋 Configuration Summary:");
    println!(
        "  Pipeline: {} v{}",
        config.pipeline.name, config.pipeline.version
    );
    println!("  Geocoder: {}", config.api_endpoint());
    println!("  Input: {}", config.input_path());
    println!("  Output: {}", config.output_path());
    println!("  Formats: {}", config.load.output_formats.join(", "));
    println!(
        "  Concurrent Requests: {}",
        config.geocoder_settings().concurrent_requests
    );

    if args.dry_run {
        println!("  🔍 DRY RUN MODE ENABLED");
    }

    println!();
}

fn perform_dry_run(config: &TomlConfig) {
    println!("🔍 Dry Run Analysis:");
    println!();

    println!("📡 Geocoding Service:");
    println!("  Endpoint: {}", config.api_endpoint());
    println!("  User-Agent: {}", config.user_agent());
    for (key, value) in config.extra_query_params() {
        println!("  Parameter: {}={}", key, value);
    }
    let settings = config.geocoder_settings();
    match settings.min_request_interval {
        Some(interval) => println!("  Min interval: {:?}", interval),
        None => println!("  Min interval: none"),
    }

    println!();
    println!("📂 Datasets:");
    for dataset in config.datasets() {
        println!(
            "  {} <- {}/{} (address column: {})",
            dataset.name,
            config.input_path(),
            dataset.input,
            settings.address_column
        );
        println!("     outputs: {}/{}.*", config.output_path(), dataset.output_stem);
    }

    println!();
    println!("🔄 Column Renames:");
    for (from, to) in config.rename_mapping().entries() {
        println!("  {} -> {}", from, to);
    }

    let plan = config.export_plan();
    println!();
    println!("💾 Export Plan:");
    for format in &plan.formats {
        println!("  ✅ {}", format);
    }
    if plan.unrenamed_shapefile {
        println!("  ✅ Shapefile with original column names");
    }
    if plan.bundle_shapefiles {
        println!("  ✅ Shapefiles bundled as .shp.zip");
    }
    if plan.write_intermediate {
        println!("  ✅ Intermediate *_with_coordinates.csv");
    }

    println!();
    println!("✅ Dry run analysis complete. Use --verbose for more details during actual run.");
}
