mod cli;
mod compile;
mod kernels;
mod report;
mod util;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use qpu_lib::kernel::Kernel;

use std::io::Write;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    cli::init_logger(args.verbose);

    let opts = cli::extract_compile_opts(&args)?;
    let (stmt, num_vars) = args.kernel.build();
    info!(
        "compiling `{}` with {num_vars} variables for {}",
        args.kernel.name(),
        opts.target()
    );
    let mut kernel = Kernel::new(stmt, num_vars, &opts);

    if kernel.diagnostics().next().is_some() {
        report::eprint_diagnostics(args.kernel.name(), &kernel);
    }
    if kernel.has_errors() {
        bail!("couldn't compile due to the previous errors");
    }
    kernel.set_num_qpus(args.num_qpus)?;

    let output = compile::emit(&kernel, args.emit, &args.params)?;
    cli::open_output(&args)?
        .write_all(output.as_bytes())
        .with_context(|| "Failed to write to output".to_string())?;

    Ok(())
}
