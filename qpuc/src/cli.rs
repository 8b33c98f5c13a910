use crate::{kernels::DemoKernel, util::PathOrStd};

use qpu_lib::compile::{CompileOpts, CompileOptsBuilder, CompileOptsErr, DumpFlags};

use anyhow::Context;
use clap::{ArgAction, Parser, ValueEnum};

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// The finalized instructions.
    Listing,
    /// The encoded instructions, one 64 bit word per line.
    Hex,
    /// The live variables at every instruction, before register allocation.
    Liveness,
    /// Definitions, uses and registers of every variable.
    RegUsage,
    /// All intermediate results of the compile.
    CompileData,
    /// The uniform block of every QPU.
    Uniforms,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum Target {
    Vc4,
    V3d,
}

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// The kernel to compile.
    #[arg(value_enum)]
    pub kernel: DemoKernel,

    /// The QPU generation to compile for.
    #[arg(short = 't', long, value_name = "TARGET", value_enum, default_value_t = Target::Vc4)]
    target: Target,

    /// The output format.
    #[arg(short = 'e', long, value_name = "FORMAT", value_enum, default_value_t = OutputFormat::Listing)]
    pub emit: OutputFormat,

    /// Skip immediate combining and accumulator substitution.
    #[arg(long)]
    no_opt: bool,

    /// The largest definition to last use distance the peephole passes consider.
    #[arg(long, value_name = "N")]
    peephole_range: Option<usize>,

    /// The number of QPUs to run the kernel on.
    #[arg(long, default_value_t = 1)]
    pub num_qpus: usize,

    /// A kernel parameter, in the order the kernel reads them.
    #[arg(short = 'p', long = "param", value_name = "WORD")]
    pub params: Vec<u32>,

    /// The output file, use `-` for std out.
    #[arg(short = 'o', long = "output", default_value = "-")]
    output_path: PathOrStd,

    /// Log more, can be repeated.
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
}

pub fn extract_compile_opts(args: &Args) -> Result<CompileOpts, CompileOptsErr> {
    let target = match args.target {
        Target::Vc4 => qpu_ir::Target::Vc4,
        Target::V3d => qpu_ir::Target::V3d,
    };
    let dump = match args.emit {
        OutputFormat::Liveness => DumpFlags {
            liveness: true,
            ..DumpFlags::default()
        },
        OutputFormat::RegUsage => DumpFlags {
            reg_usage: true,
            allocation: true,
            ..DumpFlags::default()
        },
        OutputFormat::CompileData => DumpFlags::all(),
        _ => DumpFlags::default(),
    };

    let opts = CompileOptsBuilder::new()
        .target(target)
        .optimize(!args.no_opt)
        .dump(dump);
    let opts = if let Some(range) = args.peephole_range {
        opts.max_peephole_range(range)
    } else {
        opts
    };
    opts.build()
}

pub fn init_logger(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

pub fn open_output(args: &Args) -> anyhow::Result<Box<dyn std::io::Write>> {
    match &args.output_path {
        PathOrStd::Path(path) => std::fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .create(true)
            .open(path)
            .map(|f| Box::new(f) as Box<dyn std::io::Write>)
            .with_context(|| format!("Failed to open output file `{}`", path.display())),
        PathOrStd::StdStream => Ok(Box::new(std::io::stdout().lock())),
    }
}
