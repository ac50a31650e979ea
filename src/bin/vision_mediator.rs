//! vision-mediator: run mediated career-guidance requests from the command line
//!
//! Usage:
//!   vision-mediator obtain --name <n> --age <a> --education <e> --interest <i> --hobby <h> --goal <g>
//!                          [--user <id>] [--address <ip>] [--repeat <n>] [--config <file>]
//!   vision-mediator prompt --name <n> ... --goal <g>     Print the rendered prompt
//!   vision-mediator config [--config <file>]             Print the effective configuration

use anyhow::{anyhow, bail, Context};
use std::collections::HashMap;
use vision_mediator::prompt::career_prompt;
use vision_mediator::{Identity, MediatorBuilder, MediatorConfig, Profile};

#[tokio::main]
async fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let result = match args[1].as_str() {
        "obtain" => cmd_obtain(&args[2..]).await,
        "prompt" => cmd_prompt(&args[2..]),
        "config" => cmd_config(&args[2..]),
        "version" | "--version" | "-V" => {
            println!("vision-mediator {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(2);
    }
}

fn print_usage() {
    println!(
        r#"vision-mediator: AI career-guidance request mediation

USAGE:
    vision-mediator <COMMAND> [OPTIONS]

COMMANDS:
    obtain      Run mediated requests and print the result, metadata and cache statistics
    prompt      Print the prompt that would be sent for a profile
    config      Print the effective configuration
    version     Show version information
    help        Show this help message

PROFILE OPTIONS:
    --name, --age, --education, --interest, --hobby, --goal

OBTAIN OPTIONS:
    --user <id>         Authenticated user id (anonymous when absent)
    --address <ip>      Caller address (default 127.0.0.1)
    --repeat <n>        Issue the same request n times (default 1)
    --config <file>     YAML configuration file (environment still applies)

ENVIRONMENT:
    API_KEY, REDIS_URL, AI_MODEL, VISION_*, RUST_LOG"#
    );
}

fn parse_flags(args: &[String]) -> anyhow::Result<HashMap<String, String>> {
    let mut flags = HashMap::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let name = arg
            .strip_prefix("--")
            .ok_or_else(|| anyhow!("unexpected argument: {arg}"))?;
        let value = iter
            .next()
            .ok_or_else(|| anyhow!("missing value for --{name}"))?;
        flags.insert(name.to_string(), value.clone());
    }
    Ok(flags)
}

fn required<'a>(flags: &'a HashMap<String, String>, name: &str) -> anyhow::Result<&'a str> {
    flags
        .get(name)
        .map(String::as_str)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| anyhow!("--{name} is required"))
}

fn profile_from(flags: &HashMap<String, String>) -> anyhow::Result<(Profile, String)> {
    let age: u32 = required(flags, "age")?
        .parse()
        .context("--age must be a whole number")?;
    let profile = Profile::new(
        required(flags, "name")?,
        age,
        required(flags, "education")?,
        required(flags, "interest")?,
        required(flags, "hobby")?,
    );
    Ok((profile, required(flags, "goal")?.to_string()))
}

fn load_config(flags: &HashMap<String, String>) -> anyhow::Result<MediatorConfig> {
    let mut cfg = match flags.get("config") {
        Some(path) => MediatorConfig::from_file(path)
            .with_context(|| format!("loading configuration from {path}"))?,
        None => MediatorConfig::default(),
    };
    cfg.apply_env()?;
    cfg.validate()?;
    Ok(cfg)
}

async fn cmd_obtain(args: &[String]) -> anyhow::Result<()> {
    let flags = parse_flags(args)?;
    let (profile, goal) = profile_from(&flags)?;
    let repeat: usize = match flags.get("repeat") {
        Some(n) => n.parse().context("--repeat must be a whole number")?,
        None => 1,
    };
    if repeat == 0 {
        bail!("--repeat must be at least 1");
    }
    let address = flags
        .get("address")
        .cloned()
        .unwrap_or_else(|| "127.0.0.1".to_string());
    let identity = match flags.get("user") {
        Some(user) => Identity::authenticated(user.clone(), address),
        None => Identity::anonymous(address),
    };

    let mediator = MediatorBuilder::new()
        .config(load_config(&flags)?)
        .build()
        .await?;

    for i in 1..=repeat {
        match mediator.obtain(&identity, &profile, &goal).await {
            Ok(result) => {
                if i == 1 {
                    println!("{}\n", result.text);
                }
                println!("--- request {i} ---");
                println!("{}", serde_json::to_string_pretty(&result.metadata)?);
            }
            Err(e) => {
                println!("--- request {i} ---");
                println!("rejected: {e}");
            }
        }
    }

    println!("--- usage ---");
    println!("{}", serde_json::to_string_pretty(&mediator.usage(&identity).await)?);
    println!("--- cache ---");
    println!("{}", serde_json::to_string_pretty(&mediator.cache_stats())?);
    Ok(())
}

fn cmd_prompt(args: &[String]) -> anyhow::Result<()> {
    let flags = parse_flags(args)?;
    let (profile, goal) = profile_from(&flags)?;
    println!("{}", career_prompt(&profile, &goal));
    Ok(())
}

fn cmd_config(args: &[String]) -> anyhow::Result<()> {
    let flags = parse_flags(args)?;
    let cfg = load_config(&flags)?;
    print!("{}", serde_yaml::to_string(&cfg)?);
    Ok(())
}
