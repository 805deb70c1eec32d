use clap::{Arg, ArgAction, ArgMatches, Command};
use anyhow::{anyhow, Result};

pub const DEFAULT_PLUGIN_DIR: &str = "plugins";
pub const DEFAULT_DURATION: &str = "10ms";
pub const DEFAULT_TIMESTEP: &str = "1us";

#[derive(Debug, Clone)]
pub struct CliArgs {
    pub circuit_file: Option<String>,
    pub plugin_dir: String,
    pub duration: f64,
    pub timestep: f64,
    pub record_every: usize,
    pub output_file: Option<String>,
    pub output_format: OutputFormat,
    pub verbose_level: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Json,
}

pub fn build_command() -> Command {
    Command::new("icsim")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Lumped-element circuit simulator with loadable component plugins")
        .arg(
            Arg::new("circuit")
                .help("Circuit description file (.json); runs an RC demo when omitted")
                .index(1),
        )
        .arg(
            Arg::new("plugins")
                .short('p')
                .long("plugins")
                .value_name("DIR")
                .default_value(DEFAULT_PLUGIN_DIR)
                .help("Directory scanned for plugin libraries"),
        )
        .arg(
            Arg::new("duration")
                .short('d')
                .long("duration")
                .value_name("TIME")
                .default_value(DEFAULT_DURATION)
                .help("Simulated time span, e.g. 10ms"),
        )
        .arg(
            Arg::new("timestep")
                .short('t')
                .long("timestep")
                .value_name("TIME")
                .default_value(DEFAULT_TIMESTEP)
                .help("Integration step, e.g. 1us"),
        )
        .arg(
            Arg::new("every")
                .short('e')
                .long("every")
                .value_name("STEPS")
                .default_value("100")
                .value_parser(clap::value_parser!(usize))
                .help("Record the trace every N steps"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Output file for the simulation trace"),
        )
        .arg(
            Arg::new("format")
                .short('f')
                .long("format")
                .value_name("FORMAT")
                .default_value("csv")
                .value_parser(["csv", "json"])
                .help("Output format"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("Increase verbosity level"),
        )
}

impl CliArgs {
    pub fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let circuit_file = matches.get_one::<String>("circuit").cloned();
        let output_file = matches.get_one::<String>("output").cloned();
        let verbose_level = matches.get_count("verbose");

        let plugin_dir = matches
            .get_one::<String>("plugins")
            .cloned()
            .unwrap_or_else(|| DEFAULT_PLUGIN_DIR.to_string());

        let output_format = match matches.get_one::<String>("format").map(String::as_str) {
            None | Some("csv") => OutputFormat::Csv,
            Some("json") => OutputFormat::Json,
            Some(other) => return Err(anyhow!("Invalid output format '{}'", other)),
        };

        let duration = parse_time_value(
            matches
                .get_one::<String>("duration")
                .map(String::as_str)
                .unwrap_or(DEFAULT_DURATION),
        )?;
        let timestep = parse_time_value(
            matches
                .get_one::<String>("timestep")
                .map(String::as_str)
                .unwrap_or(DEFAULT_TIMESTEP),
        )?;

        if timestep <= 0.0 || duration <= 0.0 || timestep >= duration {
            return Err(anyhow!(
                "Invalid time parameters: timestep must be positive and less than duration"
            ));
        }

        let record_every = matches.get_one::<usize>("every").copied().unwrap_or(1);
        if record_every == 0 {
            return Err(anyhow!("Recording stride must be at least 1"));
        }

        Ok(CliArgs {
            circuit_file,
            plugin_dir,
            duration,
            timestep,
            record_every,
            output_file,
            output_format,
            verbose_level,
        })
    }
}

/// Parse time value with unit (e.g., "1ns", "1.5ms", "10us")
pub fn parse_time_value(value: &str) -> Result<f64> {
    let value = value.trim().to_lowercase();

    let (number, scale) = if let Some(num_str) = value.strip_suffix("fs") {
        (num_str, 1e-15)
    } else if let Some(num_str) = value.strip_suffix("ps") {
        (num_str, 1e-12)
    } else if let Some(num_str) = value.strip_suffix("ns") {
        (num_str, 1e-9)
    } else if let Some(num_str) = value.strip_suffix("us") {
        (num_str, 1e-6)
    } else if let Some(num_str) = value.strip_suffix("ms") {
        (num_str, 1e-3)
    } else if let Some(num_str) = value.strip_suffix('s') {
        (num_str, 1.0)
    } else {
        // Plain numbers are seconds
        (value.as_str(), 1.0)
    };

    number
        .trim()
        .parse::<f64>()
        .map(|n| n * scale)
        .map_err(|e| anyhow!("Invalid time value '{}': {}", value, e))
}
