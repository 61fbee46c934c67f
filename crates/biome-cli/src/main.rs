use std::collections::HashMap;
use std::error::Error;
use std::fs;
use std::time::Duration;

use biome_ai::{BiomePipeline, GroqClient, PipelineConfig};
use biome_core::{chunk_blocks, parse_blocks};
use biome_script::{ExecLimits, run_script};

type DynError = Box<dyn Error>;
type Flags = HashMap<String, String>;

#[tokio::main]
async fn main() -> Result<(), DynError> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    if args.is_empty() {
        print_usage();
        return Ok(());
    }

    match args[0].as_str() {
        "run-script" => run_script_command(&args[1..]),
        "chunk" => run_chunk_command(&args[1..]),
        "generate" => run_generate_command(&args[1..]).await,
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn run_script_command(args: &[String]) -> Result<(), DynError> {
    let flags = parse_flags(args)?;
    let source = fs::read_to_string(required_str(&flags, "--script-file")?)?;

    let limits = ExecLimits {
        max_operations: optional_u64(&flags, "--max-ops", ExecLimits::default().max_operations)?,
        wall_clock: Duration::from_millis(optional_u64(&flags, "--budget-ms", 5000)?),
        ..ExecLimits::default()
    };

    let captured = run_script(&source, &limits)?;
    println!("{captured}");
    Ok(())
}

fn run_chunk_command(args: &[String]) -> Result<(), DynError> {
    let flags = parse_flags(args)?;
    let raw = fs::read_to_string(required_str(&flags, "--blocks-file")?)?;
    let max_chars = optional_usize(&flags, "--max-chars", 10_000)?;

    let blocks = parse_blocks(&raw)?;
    let chunks = chunk_blocks(&blocks, max_chars);
    println!("{}", serde_json::to_string_pretty(&chunks)?);
    Ok(())
}

async fn run_generate_command(args: &[String]) -> Result<(), DynError> {
    let flags = parse_flags(args)?;
    let theme = required_str(&flags, "--theme")?;

    let api_key =
        std::env::var("GROQ_API_KEY").map_err(|_| "GROQ_API_KEY environment variable is required")?;
    let client = GroqClient::with_defaults(api_key)?;

    let config = PipelineConfig {
        max_attempts: optional_usize(&flags, "--max-attempts", 3)?,
        chunk_chars: optional_usize(&flags, "--max-chars", 10_000)?,
        ..PipelineConfig::default()
    };

    let pipeline = BiomePipeline::new(client, config);
    let chunks = pipeline.run(theme).await?;
    println!("{}", serde_json::to_string_pretty(&chunks)?);
    Ok(())
}

fn parse_flags(args: &[String]) -> Result<Flags, DynError> {
    if args.len() % 2 != 0 {
        return Err("expected flag-value pairs".into());
    }

    let mut flags = HashMap::new();
    let mut index = 0;
    while index < args.len() {
        let flag = args[index].as_str();
        if !flag.starts_with("--") {
            return Err(format!("expected flag at position {}", index + 1).into());
        }
        let value = args[index + 1].clone();
        if flags.insert(flag.to_string(), value).is_some() {
            return Err(format!("duplicate flag: {flag}").into());
        }
        index += 2;
    }
    Ok(flags)
}

fn required_str<'a>(flags: &'a Flags, key: &str) -> Result<&'a str, DynError> {
    flags
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| format!("missing required {key}").into())
}

fn optional_u64(flags: &Flags, key: &str, default: u64) -> Result<u64, DynError> {
    match flags.get(key) {
        Some(value) => value
            .parse::<u64>()
            .map_err(|err| format!("invalid integer for {key}: {err}").into()),
        None => Ok(default),
    }
}

fn optional_usize(flags: &Flags, key: &str, default: usize) -> Result<usize, DynError> {
    match flags.get(key) {
        Some(value) => value
            .parse::<usize>()
            .map_err(|err| format!("invalid integer for {key}: {err}").into()),
        None => Ok(default),
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  biome-cli run-script --script-file <path> [--max-ops <u64>] [--budget-ms <u64>]");
    eprintln!("  biome-cli chunk --blocks-file <path> [--max-chars <usize>]");
    eprintln!("  biome-cli generate --theme <str> [--max-attempts <usize>] [--max-chars <usize>]");
}
