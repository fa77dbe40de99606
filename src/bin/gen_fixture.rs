//! Generates a synthetic simulation file in the format described in
//! spec §6, for manual testing and benchmark fixtures.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(author, version, about = "Generate a synthetic simulation fixture file")]
struct Cli {
    /// Output file path.
    #[arg(long)]
    out: PathBuf,

    /// Number of iterations to emit.
    #[arg(long, default_value_t = 10_000)]
    num_iter: u32,

    /// Average number of events per iteration.
    #[arg(long, default_value_t = 5)]
    events_per_iter: u32,

    /// Emit a risk_group column (6- or 7-column schema instead of 5).
    #[arg(long, default_value_t = true)]
    with_risk_group: bool,
}

/// Deterministic xorshift generator — no external randomness dependency is
/// needed for fixture generation, and a fixed seed keeps fixtures reproducible.
struct Xorshift(u64);

impl Xorshift {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }

    fn next_f64(&mut self, max: f64) -> f64 {
        (self.next() % 1_000_000) as f64 / 1_000_000.0 * max
    }
}

fn main() -> std::io::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let file = File::create(&cli.out)?;
    let mut w = BufWriter::new(file);
    writeln!(w, "_numIter = {}", cli.num_iter)?;
    if cli.with_risk_group {
        writeln!(w, "iterId\tseqId\teventId\tloss\treinstatementPrem\triskGroup")?;
    } else {
        writeln!(w, "iterId\tseqId\teventId\tloss\treinstatementPrem")?;
    }

    let mut rng = Xorshift(0x9e3779b97f4a7c15);
    let risk_groups = ["Risk1", "Risk2", "Noncat", "USTERR"];
    let mut event_id = 0i64;
    for iter_id in 0..cli.num_iter {
        for seq_id in 0..cli.events_per_iter {
            let loss = rng.next_f64(1_000_000.0);
            let rip = rng.next_f64(loss.min(10_000.0));
            event_id += 1;
            if cli.with_risk_group {
                let rg = risk_groups[(rng.next() as usize) % risk_groups.len()];
                writeln!(w, "{iter_id}\t{seq_id}\t{event_id}\t{loss:.2}\t{rip:.2}\t{rg}")?;
            } else {
                writeln!(w, "{iter_id}\t{seq_id}\t{event_id}\t{loss:.2}\t{rip:.2}")?;
            }
        }
    }

    w.flush()
}
