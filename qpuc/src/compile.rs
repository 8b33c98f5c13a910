use std::fmt::Write;

use crate::cli::OutputFormat;
use qpu_ir::{ListingConfig, ListingOutputter};
use qpu_lib::kernel::Kernel;

/// Formats the compiled `kernel` as asked for. The kernel must have compiled.
pub fn emit(kernel: &Kernel, format: OutputFormat, params: &[u32]) -> anyhow::Result<String> {
    let mut out = String::new();
    let data = kernel.compile_data();
    match format {
        OutputFormat::Listing => {
            let code = kernel.code().unwrap_or_default();
            let config = ListingConfig {
                show_comments: true,
                show_indices: false,
            };
            ListingOutputter::new(&mut out)
                .with_config(config)
                .write_listing(code)?;
        }
        OutputFormat::Hex => {
            for word in kernel.encode().unwrap_or_default() {
                writeln!(out, "{word:016x}")?;
            }
        }
        OutputFormat::Liveness => out.push_str(&data.liveness_dump),
        OutputFormat::RegUsage => {
            writeln!(out, "# before allocation")?;
            out.push_str(&data.reg_usage_dump);
            writeln!(out, "# after allocation")?;
            out.push_str(&data.allocated_registers_dump);
        }
        OutputFormat::CompileData => write!(out, "{data}")?,
        OutputFormat::Uniforms => {
            for (qpu, block) in kernel.uniforms(params).iter().enumerate() {
                let words: Vec<_> = block.iter().map(|w| format!("{w:#010x}")).collect();
                writeln!(out, "qpu {qpu}: {}", words.join(" "))?;
            }
        }
    }
    Ok(out)
}
