use anyhow::{bail, Context, Result};
use chrono::Utc;
use std::env;
use std::fs;
use std::path::PathBuf;

use statement_convert::emit::file_stem_of;
use statement_convert::{split_tables, OutputFormat, Pipeline, Settings};

fn main() -> Result<()> {
    init_tracing();

    let args: Vec<String> = env::args().collect();

    if args.len() > 1 && args[1] == "convert" {
        let convert_args = parse_convert_args(&args[2..])?;
        run_convert(convert_args)?;
    } else {
        print_usage();
        std::process::exit(1);
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "statement_convert=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn print_usage() {
    eprintln!("Usage: statement-convert convert <table.csv>... [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --format ofx|qbo|iif   Output format (default: qbo)");
    eprintln!("  --year YYYY            Statement year for M/D dates (default: current year)");
    eprintln!("  --out FILE             Output file (default: next to the first input)");
    eprintln!("  --check-balance        Report running-balance breaks");
}

#[derive(Debug, PartialEq)]
struct ConvertArgs {
    inputs: Vec<PathBuf>,
    format: OutputFormat,
    year: Option<i32>,
    out: Option<PathBuf>,
    check_balance: bool,
}

fn parse_convert_args(args: &[String]) -> Result<ConvertArgs> {
    let mut parsed = ConvertArgs {
        inputs: Vec::new(),
        format: OutputFormat::default(),
        year: None,
        out: None,
        check_balance: false,
    };

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--format" | "-f" => {
                let value = iter.next().context("--format needs a value")?;
                parsed.format = value.parse()?;
            }
            "--year" | "-y" => {
                let value = iter.next().context("--year needs a value")?;
                parsed.year = Some(
                    value
                        .parse()
                        .with_context(|| format!("Not a year: {}", value))?,
                );
            }
            "--out" | "-o" => {
                let value = iter.next().context("--out needs a value")?;
                parsed.out = Some(PathBuf::from(value));
            }
            "--check-balance" => parsed.check_balance = true,
            flag if flag.starts_with('-') => bail!("Unknown option: {}", flag),
            input => parsed.inputs.push(PathBuf::from(input)),
        }
    }

    if parsed.inputs.is_empty() {
        bail!("No input files given");
    }
    Ok(parsed)
}

fn run_convert(args: ConvertArgs) -> Result<()> {
    println!("📄 Statement Convert - {} export", args.format.name());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let mut settings = Settings::from_env()?;
    if let Some(year) = args.year {
        settings.statement.year = Some(year);
    }
    settings.statement.check_balance_continuity |= args.check_balance;
    let pipeline = Pipeline::from_settings(&settings.statement);

    // 1. Read tables
    println!("\n📂 Reading {} file(s)...", args.inputs.len());
    let mut tables = Vec::new();
    for path in &args.inputs {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to open file: {}", path.display()))?;
        let file_tables = split_tables(&content);
        println!("✓ {} ({} table(s))", path.display(), file_tables.len());
        tables.extend(file_tables);
    }

    // 2. Convert
    let first_name = args.inputs[0].to_string_lossy();
    let stem = file_stem_of(&first_name);
    println!("\n🔧 Converting (statement year {})...", pipeline.year());
    let conversion = pipeline.convert(&tables, args.format, &stem, Utc::now())?;
    println!("✓ {}", conversion.ledger.summary());

    let review = conversion.ledger.review_count();
    if review > 0 {
        println!("⚠️  {} transaction(s) flagged for review", review);
    }
    if let Some(report) = &conversion.continuity {
        println!("✓ {}", report.summary());
    }

    // 3. Write
    let out = args.out.unwrap_or_else(|| {
        args.inputs[0].with_file_name(&conversion.artifact.file_name)
    });
    fs::write(&out, conversion.artifact.body.as_bytes())
        .with_context(|| format!("Failed to write {}", out.display()))?;

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✅ Wrote {}", out.display());

    Ok(())
}
