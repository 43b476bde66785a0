//! bcpl64 entrypoint.

mod demo;
mod driver;

use anyhow::{Result, bail};
use clap::Parser;
use core_runtime::RuntimeManager;
use std::path::PathBuf;
use std::sync::Once;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "bcpl64", version, about = "BCPL compiler for ARM64")]
struct Args {
    /// Built-in demonstration program to compile and run.
    #[arg(long = "demo", default_value = "factorial")]
    pub demo: String,
    /// Optional configuration file path (overrides discovery of `bcpl64.toml`).
    #[arg(long = "config")]
    pub config: Option<PathBuf>,
    /// Peephole optimization passes (overrides the config file).
    #[arg(long = "peephole-passes")]
    pub peephole_passes: Option<u32>,
    /// Emit an assembly listing after linking.
    #[arg(long = "listing")]
    pub listing: bool,
    /// Dump the tree after each AST pass at trace level.
    #[arg(long = "trace-passes")]
    pub trace_passes: bool,
    /// Print the runtime registry and exit.
    #[arg(long = "list-runtime")]
    pub list_runtime: bool,
}

fn configure_logging() -> Option<WorkerGuard> {
    let file_appender = tracing_appender::rolling::never(".", "bcpl64.log");
    let (nb_writer, guard) = tracing_appender::non_blocking(file_appender);
    match tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(nb_writer)
        .try_init()
    {
        Ok(()) => Some(guard),
        Err(_) => None, // a global subscriber is already installed
    }
}

fn install_panic_hook() {
    static HOOK: Once = Once::new();
    HOOK.call_once(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            tracing::error!(target: "driver.panic", ?info, "panic");
            default_panic(info);
        }));
    });
}

fn list_runtime() {
    let runtime = RuntimeManager::new();
    let mut entries: Vec<_> = runtime.iter().collect();
    entries.sort_by_key(|e| e.name);
    println!("{} runtime symbols:", entries.len());
    for e in entries {
        println!(
            "  {:<18} {:<20} arity {}  {}",
            e.name, e.external_label, e.arity, e.description
        );
    }
}

fn main() -> Result<()> {
    let _log_guard = configure_logging();
    install_panic_hook();
    let args = Args::parse();

    if args.list_runtime {
        list_runtime();
        return Ok(());
    }

    let config = core_config::load_from(args.config.clone())?;
    let options = driver::CompileOptions {
        peephole_passes: args
            .peephole_passes
            .unwrap_or(config.file.optimizer.peephole_passes),
        trace_passes: args.trace_passes || config.file.trace.passes,
        listing: args.listing || config.file.trace.listing,
    };

    let Some(program) = demo::demo_program(&args.demo) else {
        bail!(
            "unknown demo '{}'; available: {}",
            args.demo,
            demo::demo_names().join(", ")
        );
    };

    info!(target: "driver", demo = %args.demo, "compiling");
    let compiled = driver::compile(program, &options)?;
    eprintln!(
        "compiled '{}': {} bytes of code at {:#x}, {} peephole rewrites",
        args.demo,
        compiled.code_size,
        compiled.entry_address(),
        compiled.peephole_applied,
    );
    if let Some(listing) = &compiled.listing {
        println!("{listing}");
    }

    #[cfg(target_arch = "aarch64")]
    {
        let result = unsafe { compiled.run() };
        eprintln!("START returned {result}");
    }
    #[cfg(not(target_arch = "aarch64"))]
    {
        eprintln!("host is not AArch64; compiled module not executed");
    }
    Ok(())
}
