//! Rill VM CLI
//!
//! Loads a compiled program and runs it:
//!
//! ```text
//! rillvm <file.rlc> [--dump] [--trace]
//! ```
//!
//! `--dump` prints the disassembly before running; `--trace` turns on
//! per-step VM tracing. Without `--trace`, the `RILL_LOG` environment
//! variable selects the tracing filter.

use rill_eval::VmBuilder;

fn print_usage() {
    eprintln!("Usage: rillvm <file.rlc> [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --dump, -d     Print the disassembly before running");
    eprintln!("  --trace, -t    Trace every executed instruction");
}

fn init_tracing(trace: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if trace {
        EnvFilter::new("rill_eval=trace")
    } else {
        EnvFilter::try_from_env("RILL_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let mut dump = false;
    let mut trace = false;
    let mut file = None;

    for arg in args.iter().skip(1) {
        match arg.as_str() {
            "--dump" | "-d" => dump = true,
            "--trace" | "-t" => trace = true,
            "--help" | "-h" => {
                print_usage();
                return;
            }
            _ if !arg.starts_with('-') && file.is_none() => file = Some(arg.as_str()),
            other => {
                eprintln!("error: unknown option {other}");
                print_usage();
                std::process::exit(1);
            }
        }
    }

    let Some(path) = file else {
        print_usage();
        std::process::exit(1);
    };

    init_tracing(trace);

    let code = match rill_bytecode::read_program(path) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {path}: {err}");
            std::process::exit(1);
        }
    };

    if dump {
        print!("{code}");
    }

    let mut vm = VmBuilder::new().build();
    if let Err(err) = vm.execute(&code) {
        eprintln!("runtime error: {err}");
        std::process::exit(1);
    }
}
