use clap::ArgMatches;
use colored::*;
use env_logger::Env;
use log::{error, info, warn};
use std::path::Path;

use icsim::cli::{build_command, CliArgs};
use icsim::devices::{Capacitor, Resistor};
use icsim::{
    component, connect, Accelerator, Circuit, CircuitDescription, CpuAccelerator, Node,
    PluginManager,
};

fn main() {
    let matches = build_command().get_matches();

    let default_level = match matches.get_count("verbose") {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_level)).init();

    if let Err(e) = run_application(&matches) {
        error!("{}", format!("Error: {}", e).red());
        std::process::exit(1);
    }
}

fn run_application(matches: &ArgMatches) -> anyhow::Result<()> {
    let args = CliArgs::from_matches(matches)?;

    info!("{}", "Starting icsim - lumped circuit simulator".green().bold());

    report_accelerator(&CpuAccelerator::new());

    let plugins = PluginManager::new();
    if Path::new(&args.plugin_dir).is_dir() {
        let loaded = plugins.load_directory(&args.plugin_dir);
        info!(
            "Loaded {} plugin(s) from {}",
            loaded.len(),
            args.plugin_dir.bright_blue()
        );
    } else {
        warn!("Plugin directory '{}' not found, continuing with built-ins", args.plugin_dir);
    }

    let mut circuit = match &args.circuit_file {
        Some(file) => {
            info!("Circuit file: {}", file.bright_blue());
            CircuitDescription::from_file(file)?.build(&plugins)?
        }
        None => demo_circuit(),
    };
    circuit.print_summary();

    info!(
        "Running transient simulation: duration={}, timestep={}",
        args.duration, args.timestep
    );
    let trace = circuit.simulate_traced(args.duration, args.timestep, args.record_every);

    println!("\n{}", "Simulation Results:".bold());
    for component in circuit.components() {
        let component = component.borrow();
        let unit = if component.type_tag() == icsim::devices::CAPACITOR { "V" } else { "A" };
        println!(
            "  {} ({}): {:.6e} {}",
            component.id().bright_yellow(),
            component.type_tag(),
            component.current_value(),
            unit
        );
    }

    if let Some(output_file) = &args.output_file {
        trace.export(output_file, args.output_format)?;
        info!("Results exported to: {}", output_file.bright_green());
    }

    let loaded = plugins.loaded_plugins();
    if !loaded.is_empty() {
        println!("\n{} {}", "Loaded plugins:".bold(), loaded.join(" "));
        println!(
            "{} {}",
            "Supported component types:".bold(),
            plugins.all_supported_components().join(" ")
        );
    }

    info!("{}", "Simulation completed successfully!".green().bold());
    Ok(())
}

fn report_accelerator(accelerator: &dyn Accelerator) {
    if accelerator.is_available() {
        info!(
            "Acceleration: {} device(s), {}",
            accelerator.device_count(),
            accelerator.device_info(0)
        );
    } else {
        info!("Acceleration: {}, using CPU fallback", accelerator.device_info(0).yellow());
    }
}

/// 5 V source into a 1 kΩ / 1 µF RC stage
fn demo_circuit() -> Circuit {
    let mut circuit = Circuit::new("Demo RC Circuit");

    let n1 = Node::shared("N1");
    let n2 = Node::shared("N2");
    let gnd = Node::shared("GND");
    n1.borrow_mut().set_voltage(5.0);

    let resistor = component::shared(Resistor::new("R1", 1000.0));
    connect(&resistor, &n1);
    connect(&resistor, &n2);

    let capacitor = component::shared(Capacitor::new("C1", 1e-6));
    connect(&capacitor, &n2);
    connect(&capacitor, &gnd);

    circuit.add_node(n1);
    circuit.add_node(n2);
    circuit.add_node(gnd);
    circuit.add_component(resistor);
    circuit.add_component(capacitor);
    circuit
}
