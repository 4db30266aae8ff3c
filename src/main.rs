use clap::Parser;
use green_geo_etl::core::export;
use green_geo_etl::domain::model::ExportFormat;
use green_geo_etl::utils::{logger, validation::Validate};
use green_geo_etl::{app, CliConfig, EtlError};
use std::path::Path;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = CliConfig::parse();

    // 初始化日誌
    if config.log_json {
        logger::init_json_logger(config.verbose);
    } else {
        logger::init_cli_logger(config.verbose);
    }

    if let Some(path) = &config.inspect {
        if let Err(e) = inspect(path) {
            fail(e);
        }
        return Ok(());
    }

    tracing::info!("Starting green-geo-etl");
    if config.verbose {
        tracing::debug!("CLI config: {:?}", config);
    }

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    if config.monitor {
        tracing::info!("🔍 System monitoring enabled");
    }

    match app::run_all(&config, config.monitor).await {
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
                for output in &report.outputs {
                    println!("   📁 {}/{}", config.output_path, output);
                }
            }
        }
        Err(e) => fail(e),
    }

    Ok(())
}

fn inspect(path: &str) -> Result<(), EtlError> {
    let extension = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    let format = ExportFormat::parse(extension).ok_or_else(|| EtlError::InvalidConfigValueError {
        field: "inspect".to_string(),
        value: path.to_string(),
        reason: "Expected a .shp, .geojson or .gpkg file".to_string(),
    })?;

    let table = export::read_back(Path::new(path), format)?;
    let located = table.points().count();
    println!("📋 {} ({})", table.name, format);
    println!("  Columns: {}", table.columns.join(", "));
    println!("  Rows: {}", table.len());
    println!("  Located: {}, unknown: {}", located, table.len() - located);
    println!("  SRID: EPSG:{}", table.srid);
    Ok(())
}

fn fail(e: EtlError) {
    // 記錄詳細錯誤信息
    tracing::error!(
        "❌ Geocoding pipeline failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    // 輸出用戶友好的錯誤信息
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 建議: {}", e.recovery_suggestion());

    let exit_code = e.severity().exit_code();
    if exit_code > 0 {
        std::process::exit(exit_code);
    }
}
