//! `b2d-nfs`: mount the host's `/Users` into boot2docker over NFS.

use std::net::Ipv4Addr;

use clap::{Parser, Subcommand};
use color_eyre::{Report, Result};
use tracing::instrument;

use b2d_nfs::bootlocal;
use b2d_nfs::config::{Config, ConfigOpts};
use b2d_nfs::error::ResolutionError;
use b2d_nfs::exec::SystemRunner;
use b2d_nfs::pipeline::Pipeline;

#[derive(Parser)]
#[command(name = "b2d-nfs", version, about)]
struct Cli {
    #[clap(flatten)]
    config: ConfigOpts,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Parser)]
struct BootScriptOpts {
    /// Address of the NFS server as seen from the guest
    adapter_ip: Ipv4Addr,
}

#[derive(Subcommand)]
enum Commands {
    /// Switch the VM to NFS (the default)
    Enable,
    /// Print the host-only adapter and its address
    Resolve,
    /// Print the boot script that would be written into the guest
    BootScript(BootScriptOpts),
    /// Render the man page to stdout
    #[cfg(feature = "docgen")]
    #[clap(hide = true)]
    Man,
}

fn install_tracing() {
    use tracing_error::ErrorLayer;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .init();
}

fn enable(config: &Config) -> Result<()> {
    let outcome = Pipeline::new(config, &SystemRunner).run()?;
    println!("Done.");
    println!();
    println!("Run `boot2docker ssh df` to check if NFS is mounted.");
    println!(
        "Output should include something like this: '{}:/Users [...] /Users'",
        outcome.network.address
    );
    Ok(())
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.config.into_config();

    match cli.command.unwrap_or(Commands::Enable) {
        Commands::Enable => enable(&config)?,
        Commands::Resolve => {
            let network = Pipeline::new(&config, &SystemRunner).resolve()?;
            println!("{} {}", network.adapter, network.address);
        }
        Commands::BootScript(opts) => {
            print!("{}", bootlocal::render_boot_script(opts.adapter_ip));
        }
        #[cfg(feature = "docgen")]
        Commands::Man => {
            use clap::CommandFactory;
            clap_mangen::Man::new(Cli::command()).render(&mut std::io::stdout().lock())?;
        }
    }
    Ok(())
}

#[instrument]
fn main() -> Result<(), Report> {
    install_tracing();
    color_eyre::install()?;

    if let Err(e) = run() {
        // Lookup failures are expected operator errors; keep them to one line.
        if let Some(e) = e.downcast_ref::<ResolutionError>() {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
        return Err(e);
    }
    Ok(())
}
