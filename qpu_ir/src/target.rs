use crate::Special;

/// The QPU generations code can be generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Target {
    /// VideoCore IV, as found in the Raspberry Pi 1 - 3.
    #[default]
    Vc4,
    /// VideoCore VI, as found in the Raspberry Pi 4.
    V3d,
}

impl Target {
    /// The accumulator the compiler itself uses as scratch register, e.g. for rotates or to
    /// resolve register file read conflicts. It is never handed out to variables.
    pub const SCRATCH_ACC: u8 = 0;

    /// The number of registers in a single register file.
    pub fn regfile_width(self) -> u8 {
        match self {
            Self::Vc4 => 32,
            Self::V3d => 64,
        }
    }

    /// Returns `true` if the target has a second register file (`B`) with its own read port.
    pub fn has_file_b(self) -> bool {
        matches!(self, Self::Vc4)
    }

    /// The total number of general purpose registers available to the allocator.
    pub fn num_regs(self) -> usize {
        let files = if self.has_file_b() { 2 } else { 1 };
        files * self.regfile_width() as usize
    }

    /// The accumulators the optimizer may substitute for variables.
    pub fn substitution_accs(self) -> &'static [u8] {
        &[1, 2, 3]
    }

    /// Returns `true` if the special register exists on this target.
    pub fn supports(self, special: Special) -> bool {
        match special {
            Special::Uniform
            | Special::ElemNum
            | Special::QpuNum
            | Special::TmuAddr
            | Special::SfuRecip
            | Special::SfuRecipSqrt
            | Special::SfuExp
            | Special::SfuLog => true,
            Special::VpmRead
            | Special::VpmWrite
            | Special::RdSetup
            | Special::WrSetup
            | Special::DmaLdWait
            | Special::DmaStWait
            | Special::DmaLdAddr
            | Special::DmaStAddr
            | Special::HostInt => self == Self::Vc4,
            Special::TmuData => self == Self::V3d,
        }
    }

    /// Returns `true` if the target has hardware semaphores.
    pub fn has_semaphores(self) -> bool {
        matches!(self, Self::Vc4)
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vc4 => f.write_str("vc4"),
            Self::V3d => f.write_str("v3d"),
        }
    }
}

impl std::str::FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vc4" => Ok(Self::Vc4),
            "v3d" => Ok(Self::V3d),
            _ => Err(format!("unknown target `{s}`, expected `vc4` or `v3d`")),
        }
    }
}
