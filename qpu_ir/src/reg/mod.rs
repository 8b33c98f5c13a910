
mod var_generator;

pub use var_generator::*;

/// Identifies a variable, i.e. a virtual register.
pub type VarId = u32;

/// Represents a (possibly virtual) QPU register.
///
/// The QPU register model is as follows:
///
/// | register       | vc4          | v3d          | usage |
/// | -------------- | ------------ | ------------ | ----- |
/// |`v0` - ...      | file A       | file A       | variables, before allocation |
/// |`A0` - `A31`    | yes          | `A0` - `A63` | general purpose register file |
/// |`B0` - `B31`    | yes          | no           | second register file, separate read port |
/// |`r0`            | yes          | yes          | scratch accumulator of the compiler |
/// |`r1` - `r3`     | yes          | yes          | accumulators, handed out by the optimizer |
/// |`r4`            | read only    | read only    | SFU and TMU results |
/// |`r5`            | yes          | yes          | rotate amount, replicated writes |
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Reg {
    /// A virtual register that yet has to be converted to an actual register.
    Var(VarId),
    A(u8),
    B(u8),
    /// Accumulators `r0` - `r5`.
    Acc(u8),
    Special(Special),
}

impl Reg {
    /// Returns `true` if this is a virtual register.
    pub fn is_var(&self) -> bool {
        matches!(self, Self::Var(_))
    }

    /// Returns the variable id of a virtual register.
    pub fn as_var(&self) -> Option<VarId> {
        match self {
            Self::Var(id) => Some(*id),
            _ => None,
        }
    }

    pub fn is_acc(&self) -> bool {
        matches!(self, Self::Acc(_))
    }

    /// Returns `true` for the registers of the register files.
    pub fn is_regfile(&self) -> bool {
        matches!(self, Self::A(_) | Self::B(_))
    }

    /// Returns `true` if an instruction may read this register.
    pub fn can_read(&self) -> bool {
        match self {
            Self::Var(_) => true,
            Self::A(n) => *n < 64,
            Self::B(n) => *n < 32,
            Self::Acc(n) => *n <= 5,
            Self::Special(special) => special.can_read(),
        }
    }

    /// Returns `true` if an instruction may write this register.
    pub fn can_write(&self) -> bool {
        match self {
            Self::Var(_) => true,
            Self::A(n) => *n < 64,
            Self::B(n) => *n < 32,
            // r4 is only ever written by the hardware
            Self::Acc(n) => *n <= 5 && *n != 4,
            Self::Special(special) => special.can_write(),
        }
    }
}

impl From<Special> for Reg {
    fn from(value: Special) -> Self {
        Self::Special(value)
    }
}

impl std::fmt::Debug for Reg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

impl std::fmt::Display for Reg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Var(id) => write!(f, "v{id}"),
            Self::A(n) => write!(f, "A{n}"),
            Self::B(n) => write!(f, "B{n}"),
            Self::Acc(n) => write!(f, "r{n}"),
            Self::Special(special) => special.fmt(f),
        }
    }
}

/// A fixed function register, mapped onto a read or write address of the register files.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Special {
    Uniform,
    ElemNum,
    QpuNum,
    VpmRead,
    VpmWrite,
    RdSetup,
    WrSetup,
    DmaLdWait,
    DmaStWait,
    DmaLdAddr,
    DmaStAddr,
    SfuRecip,
    SfuRecipSqrt,
    SfuExp,
    SfuLog,
    TmuAddr,
    TmuData,
    HostInt,
}

impl Special {
    pub fn can_read(&self) -> bool {
        matches!(
            self,
            Self::Uniform
                | Self::ElemNum
                | Self::QpuNum
                | Self::VpmRead
                | Self::DmaLdWait
                | Self::DmaStWait
        )
    }

    pub fn can_write(&self) -> bool {
        !self.can_read()
    }

    /// Returns `true` for the special function unit inputs, whose result arrives in `r4`.
    pub fn is_sfu(&self) -> bool {
        matches!(
            self,
            Self::SfuRecip | Self::SfuRecipSqrt | Self::SfuExp | Self::SfuLog
        )
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Uniform => "UNIFORM",
            Self::ElemNum => "ELEM_NUM",
            Self::QpuNum => "QPU_NUM",
            Self::VpmRead => "VPM_READ",
            Self::VpmWrite => "VPM_WRITE",
            Self::RdSetup => "RD_SETUP",
            Self::WrSetup => "WR_SETUP",
            Self::DmaLdWait => "DMA_LD_WAIT",
            Self::DmaStWait => "DMA_ST_WAIT",
            Self::DmaLdAddr => "DMA_LD_ADDR",
            Self::DmaStAddr => "DMA_ST_ADDR",
            Self::SfuRecip => "SFU_RECIP",
            Self::SfuRecipSqrt => "SFU_RECIPSQRT",
            Self::SfuExp => "SFU_EXP",
            Self::SfuLog => "SFU_LOG",
            Self::TmuAddr => "TMU_ADDR",
            Self::TmuData => "TMU_DATA",
            Self::HostInt => "HOST_INT",
        }
    }

    /// The mnemonic used by the vc4 assembler.
    fn short_name(&self) -> &'static str {
        match self {
            Self::Uniform => "unif",
            Self::ElemNum => "elem_num",
            Self::QpuNum => "qpu_num",
            Self::VpmRead => "vpm",
            Self::VpmWrite => "vpm",
            Self::RdSetup => "vr_setup",
            Self::WrSetup => "vw_setup",
            Self::DmaLdWait => "vr_wait",
            Self::DmaStWait => "vw_wait",
            Self::DmaLdAddr => "vr_addr",
            Self::DmaStAddr => "vw_addr",
            Self::SfuRecip => "sfu_recip",
            Self::SfuRecipSqrt => "sfu_recipsqrt",
            Self::SfuExp => "sfu_exp2",
            Self::SfuLog => "sfu_log2",
            Self::TmuAddr => "tmu0_s",
            Self::TmuData => "tmud",
            Self::HostInt => "host_int",
        }
    }
}

impl std::fmt::Debug for Special {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

impl std::fmt::Display for Special {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if f.alternate() {
            f.write_str(self.short_name())
        } else {
            f.write_str(self.name())
        }
    }
}
