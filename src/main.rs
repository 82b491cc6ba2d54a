use std::env;
use std::path::PathBuf;
use std::process;

use carmen::{Config, FramePolicy};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const USAGE: &str = "usage: {program} [--fixed-frame <bytes>] <source-path> <output-path>";

/// Logs go to stderr; `RUST_LOG` selects the level, `warn` by default.
fn init_tracing() {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
  tracing_subscriber::registry()
    .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
    .with(filter)
    .init();
}

struct Args {
  source: PathBuf,
  output: PathBuf,
  config: Config,
}

fn parse_args(args: &[String]) -> Result<Args, String> {
  let mut config = Config::default();
  let mut positional = Vec::new();
  let mut iter = args.iter();

  while let Some(arg) = iter.next() {
    if arg == "--fixed-frame" {
      let bytes = iter
        .next()
        .ok_or("--fixed-frame needs a byte count")?
        .parse::<usize>()
        .map_err(|err| format!("invalid --fixed-frame value: {err}"))?;
      config.frame = FramePolicy::Fixed(bytes);
    } else {
      positional.push(arg);
    }
  }

  match positional.as_slice() {
    [source, output] => Ok(Args {
      source: PathBuf::from(source),
      output: PathBuf::from(output),
      config,
    }),
    _ => Err("expected a source path and an output path".to_string()),
  }
}

fn main() {
  init_tracing();

  let args: Vec<String> = env::args().collect();
  let program = args.first().map(String::as_str).unwrap_or("carmen");

  let parsed = match parse_args(args.get(1..).unwrap_or_default()) {
    Ok(parsed) => parsed,
    Err(message) => {
      eprintln!("{message}");
      eprintln!("{}", USAGE.replace("{program}", program));
      process::exit(1);
    }
  };

  if let Err(err) = carmen::compile_file(&parsed.source, &parsed.output, &parsed.config) {
    eprintln!("carmen: {err}");
    process::exit(1);
  }
}
