mod demos;

use clap::{Parser, ValueEnum};

use rill_core::RunConfig;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Demo {
    /// Two processes exchanging one value over a rendezvous channel.
    Handoff,
    /// Two producers feeding a select-based multiplexer.
    Mux,
    /// Processes that never block; pair with --steps.
    Spin,
}

/// Run a demonstration process network on the rill kernel.
#[derive(Parser, Debug)]
#[command(name = "rill", version, about)]
struct Args {
    /// Which demo network to run
    #[arg(value_enum, default_value = "handoff")]
    demo: Demo,

    /// Stop after this many scheduler turns (0 disables the limit)
    #[arg(long, default_value_t = 0)]
    steps: u64,

    /// Print the per-turn trace
    #[arg(long)]
    trace: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let args = Args::parse();
    let config = RunConfig {
        max_turns: if args.steps == 0 {
            None
        } else {
            Some(args.steps)
        },
    };

    let result = match args.demo {
        Demo::Handoff => demos::handoff(config, args.trace),
        Demo::Mux => demos::mux(config, args.trace),
        Demo::Spin => demos::spin(config, args.trace),
    };

    match result {
        Ok(report) => println!("{}", report),
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    }
}
