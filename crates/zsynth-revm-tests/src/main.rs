use std::process::ExitCode;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use zsynth_core::{SynthesizerOptions, freeze, synthesize_transaction};
use zsynth_revm_tests::{Channel, transfer_code};

fn run() -> zsynth_core::Result<()> {
  let channel = Channel::open(1_000, 10)?;
  let tx = channel.transfer(25);
  let circuit = synthesize_transaction(&channel.snapshot, transfer_code(), &tx, SynthesizerOptions::default())?;
  let frozen = freeze(&circuit)?;
  let next = channel.snapshot.advance(&circuit)?;

  info!(
    steps = circuit.steps,
    placements = frozen.placement_count(),
    "transfer synthesized"
  );
  for buffer in &frozen.buffers {
    println!("{:<10} {:>4} wires", buffer.name, buffer.width());
  }
  println!("placements: {}", frozen.placement_count());
  println!("{}", next.to_json()?);
  Ok(())
}

fn main() -> ExitCode {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_env("ZSYNTH_LOG").unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  match run() {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      error!(%err, "synthesis failed");
      ExitCode::FAILURE
    }
  }
}
