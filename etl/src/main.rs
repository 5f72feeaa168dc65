//! evwarehouse CLI - Build the EV registration star schema
//!
//! # Main Commands
//!
//! ```bash
//! evwarehouse run                              # Download, transform, load into ev_datawarehouse.db
//! evwarehouse run --input ev.csv --csv-dir out # Local extract, CSV tables
//! ```
//!
//! # Debug Commands
//!
//! ```bash
//! evwarehouse parse ev.csv      # Just parse to raw JSON records
//! evwarehouse profile ev.csv    # Clean and print the profile report
//! evwarehouse schema            # Show field kinds and dimension definitions
//! ```

use clap::{Parser, Subcommand};
use evwarehouse::logs::{log_error, log_success, LogFileWriter, LOG_BROADCASTER};
use evwarehouse::{
    fetch_and_transform, load_output, parse_bytes, vehicle_registration_schema, Cleaner,
    CsvDirSink, PipelineOptions, Profiler, SourceLocation, SqliteSink, StarSchema,
    DEFAULT_SOURCE_URL,
};
use serde_json::json;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "evwarehouse")]
#[command(about = "Turn the EV population extract into a star-schema warehouse", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Full batch: fetch → clean → dimensionalize → load
    Run {
        /// Local extract instead of downloading
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Source URL
        #[arg(long, env = "EVWAREHOUSE_SOURCE_URL", default_value = DEFAULT_SOURCE_URL)]
        url: String,

        /// SQLite database to (re)create
        #[arg(long, env = "EVWAREHOUSE_SQLITE_PATH", default_value = "ev_datawarehouse.db")]
        sqlite: PathBuf,

        /// Write CSV tables into this directory instead of SQLite
        #[arg(long)]
        csv_dir: Option<PathBuf>,

        /// Force the input encoding (auto-detect if not specified)
        #[arg(long)]
        encoding: Option<String>,

        /// CSV delimiter (auto-detect if not specified)
        #[arg(short, long)]
        delimiter: Option<char>,

        /// Skip the profile report
        #[arg(long)]
        no_profile: bool,

        /// Values listed per categorical field in the profile
        #[arg(long, default_value = "10")]
        top_n: usize,

        /// Fixed load_date ("YYYY-MM-DD HH:MM:SS")
        #[arg(long)]
        load_date: Option<String>,

        /// Write the run summary as JSON
        #[arg(long)]
        summary_json: Option<PathBuf>,

        /// Transform only, do not touch the sink
        #[arg(long)]
        dry_run: bool,

        /// Write every log entry to this file as JSON lines (truncated first)
        #[arg(long)]
        log_file: Option<PathBuf>,
    },

    /// Parse an extract and output raw records as JSON
    Parse {
        /// Input file (CSV or JSON array)
        input: PathBuf,

        /// CSV delimiter (auto-detect if not specified)
        #[arg(short, long)]
        delimiter: Option<char>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Clean an extract and print the profile report
    Profile {
        /// Input file (CSV or JSON array)
        input: PathBuf,

        /// Values listed per categorical field
        #[arg(long, default_value = "10")]
        top_n: usize,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the declared field schema and dimension definitions
    Schema,
}

/// Where `run` writes.
struct SinkChoice {
    sqlite: PathBuf,
    csv_dir: Option<PathBuf>,
    dry_run: bool,
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            input,
            url,
            sqlite,
            csv_dir,
            encoding,
            delimiter,
            no_profile,
            top_n,
            load_date,
            summary_json,
            dry_run,
            log_file,
        } => {
            let options = PipelineOptions {
                source: match input {
                    Some(path) => SourceLocation::File(path),
                    None => SourceLocation::Url(url),
                },
                encoding,
                delimiter,
                profile: !no_profile,
                top_n,
                load_date,
            };
            let sink = SinkChoice {
                sqlite,
                csv_dir,
                dry_run,
            };
            cmd_run(options, sink, summary_json.as_deref(), log_file.as_deref()).await
        }

        Commands::Parse {
            input,
            delimiter,
            output,
        } => cmd_parse(&input, delimiter, output.as_deref()),

        Commands::Profile { input, top_n, json } => cmd_profile(&input, top_n, json),

        Commands::Schema => cmd_schema(),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

async fn cmd_run(
    options: PipelineOptions,
    choice: SinkChoice,
    summary_json: Option<&Path>,
    log_file: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let writer = match log_file {
        Some(path) => Some(LogFileWriter::start(path, LOG_BROADCASTER.subscribe()).await?),
        None => None,
    };

    let result = run_batch(&options, choice, summary_json).await;
    if let Err(e) = &result {
        log_error(e.to_string());
    }

    if let Some(writer) = writer {
        writer.finish().await?;
    }
    result
}

async fn run_batch(
    options: &PipelineOptions,
    choice: SinkChoice,
    summary_json: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut output = fetch_and_transform(options).await?;

    // The sink is only opened once there is something to load.
    if !choice.dry_run {
        match choice.csv_dir {
            Some(dir) => load_output(&mut output, &mut CsvDirSink::new(dir))?,
            None => load_output(&mut output, &mut SqliteSink::open(&choice.sqlite)?)?,
        }
    }
    log_success(format!("Run {} complete", output.summary.run_id));

    if let Some(profile) = &output.profile {
        println!("\n{}", profile);
    }
    println!("\n{}", output.summary);

    if let Some(path) = summary_json {
        fs::write(path, serde_json::to_string_pretty(&output.summary)?)?;
        eprintln!("💾 Summary saved to: {}", path.display());
    }

    Ok(())
}

fn cmd_parse(
    input: &Path,
    delimiter: Option<char>,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Parsing: {}", input.display());

    let bytes = fs::read(input)?;
    let result = parse_bytes(&bytes, None, delimiter)?;

    eprintln!("   Encoding: {}", result.encoding);
    eprintln!(
        "   Delimiter: '{}'{}",
        format_delimiter(result.delimiter),
        if delimiter.is_none() { " (auto-detected)" } else { "" }
    );
    eprintln!("   Columns: {}", result.headers.join(", "));
    if result.dropped > 0 {
        eprintln!("   Skipped: {} malformed rows", result.dropped);
    }
    eprintln!("✅ Parsed {} records", result.records.len());

    let json = serde_json::to_string_pretty(&result.records)?;
    write_output(&json, output)?;

    Ok(())
}

fn cmd_profile(input: &Path, top_n: usize, as_json: bool) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Profiling: {}", input.display());

    let bytes = fs::read(input)?;
    let parsed = parse_bytes(&bytes, None, None)?;
    let schema = vehicle_registration_schema();
    let cleaned = Cleaner::new(&schema).clean_all(&parsed.records);
    let profile = Profiler::default()
        .with_top_n(top_n)
        .profile(&schema, &cleaned.records, &cleaned.stats)?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&profile)?);
    } else {
        println!("{}", profile);
    }
    Ok(())
}

fn cmd_schema() -> Result<(), Box<dyn std::error::Error>> {
    let schema = vehicle_registration_schema();
    let star = StarSchema::default();
    let doc = json!({
        "fields": schema.fields(),
        "dimensions": star.dimensions(),
        "fact": star.fact,
    });
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}

fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}

fn write_output(content: &str, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match output {
        Some(path) => {
            fs::write(path, content)?;
            eprintln!("💾 Saved to: {}", path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(content.as_bytes())?;
            stdout.write_all(b"\n")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failed_extract_creates_no_database() {
        let dir = tempfile::TempDir::new().unwrap();
        let db = dir.path().join("ev_datawarehouse.db");
        let options = PipelineOptions {
            source: SourceLocation::File(dir.path().join("missing.csv")),
            profile: false,
            ..PipelineOptions::default()
        };
        let choice = SinkChoice {
            sqlite: db.clone(),
            csv_dir: None,
            dry_run: false,
        };

        assert!(run_batch(&options, choice, None).await.is_err());
        assert!(!db.exists());
    }

    #[tokio::test]
    async fn test_run_batch_creates_database_after_transform() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("ev.csv");
        fs::write(
            &input,
            "VIN (1-10),County,City,State,Postal Code,Model Year,Make,Model,Electric Vehicle Type,Clean Alternative Fuel Vehicle (CAFV) Eligibility,Electric Range,Base MSRP,Legislative District,DOL Vehicle ID,2020 Census Tract\n\
             5YJ3E1EA7K,King,Seattle,WA,98101,2019,TESLA,MODEL 3,Battery Electric Vehicle (BEV),Clean Alternative Fuel Vehicle Eligible,220,0,43,478000001,53033008100\n",
        )
        .unwrap();
        let db = dir.path().join("ev_datawarehouse.db");
        let options = PipelineOptions {
            source: SourceLocation::File(input),
            profile: false,
            ..PipelineOptions::default()
        };
        let choice = SinkChoice {
            sqlite: db.clone(),
            csv_dir: None,
            dry_run: false,
        };

        run_batch(&options, choice, None).await.unwrap();
        assert!(db.exists());
    }
}
