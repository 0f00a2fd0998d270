use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser as ClapParser, Subcommand};
use itertools::Itertools;
use simstream::{ResultRecord, SessionState, SimClient};
use tracing_subscriber::EnvFilter;

use project::Project;

mod project;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match args.command {
        Command::Netlist { project, out } => netlist(project, out),
        Command::Simulate { project, addr } => simulate(project, addr).await,
    }
}

/// Netlist schematic projects and run them on a simulation server.
#[derive(ClapParser)]
#[command(version, about)]
pub struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the simulator input of a project.
    Netlist {
        /// The project file.
        project: PathBuf,
        /// The path where the deck should be saved.
        ///
        /// If unspecified, the deck will be written to stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Run a project on a simulation server and print its records.
    ///
    /// Samples go to stdout, one line per point; everything else goes to
    /// stderr. Ctrl-C cancels the session.
    Simulate {
        /// The project file.
        project: PathBuf,
        /// The server address, overriding the project's.
        #[arg(short, long)]
        addr: Option<String>,
    },
}

fn netlist(path: PathBuf, out: Option<PathBuf>) -> anyhow::Result<()> {
    let project = Project::load(&path)?;
    let deck = project.compile()?.deck(&project.netlist);
    match out {
        Some(out) => {
            if let Some(parent) = out.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory {:?}.", parent))?;
            }
            std::fs::write(&out, deck)
                .with_context(|| format!("Failed to write deck to {:?}.", out))?;
            eprintln!("Deck written to {:?}.", out);
        }
        None => {
            std::io::stdout()
                .lock()
                .write_all(deck.as_bytes())
                .with_context(|| "Failed to write deck to stdout.")?;
        }
    }
    Ok(())
}

async fn simulate(path: PathBuf, addr: Option<String>) -> anyhow::Result<()> {
    let project = Project::load(&path)?;
    let submission = project
        .compile()?
        .submission(&project.netlist, &project.client);
    let client = SimClient::new(project.client.config(addr.as_deref()));
    let mut session = client
        .submit(submission)
        .await
        .with_context(|| format!("Failed to start simulation on {}.", client.config().addr()))?;
    eprintln!("Session {} started.", session.id());

    let mut stdout = std::io::stdout().lock();
    loop {
        let record = tokio::select! {
            record = session.next() => record,
            _ = tokio::signal::ctrl_c() => {
                eprintln!("Cancelling...");
                session.cancel().await;
                break;
            }
        };
        let Some(record) = record else {
            break;
        };
        match record {
            ResultRecord::Sample(sample) => writeln!(
                stdout,
                "{}\t{}\t{}",
                sample.analysis,
                sample.x,
                sample
                    .values
                    .iter()
                    .map(|(name, value)| format!("{name}={value}"))
                    .join("\t")
            )?,
            ResultRecord::Progress(fraction) => {
                eprintln!("progress: {:.0}%", fraction * 100.0)
            }
            ResultRecord::Log { severity, message } => eprintln!("{:?}: {}", severity, message),
            ResultRecord::Error(error) => match error.location {
                Some(location) => eprintln!("error: {} ({})", error.message, location),
                None => eprintln!("error: {}", error.message),
            },
            ResultRecord::Done(_) => {}
        }
    }

    if session.dropped() > 0 {
        eprintln!("{} samples dropped.", session.dropped());
    }
    match session.state() {
        SessionState::Completed => {
            eprintln!("Simulation complete.");
            Ok(())
        }
        SessionState::Cancelled => {
            eprintln!("Simulation cancelled.");
            Ok(())
        }
        SessionState::Failed(error) => Err(anyhow::Error::new(error)),
        state => anyhow::bail!("session ended in state {:?}", state),
    }
}
