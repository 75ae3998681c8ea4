//! Hardware-intrinsic support levels.
//!
//! `IsSupported` on an intrinsic ISA class either folds to a constant at
//! compile time or stays a runtime check. Aes, Pclmulqdq, Sse3, Ssse3 and
//! Lzcnt are runtime-checked; the remaining ISAs in the listing have a
//! known support level.

pub const INTRINSIC_NAMESPACE: &str = "System.Runtime.Intrinsics.X86";

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum IntrinsicIsa {
    Sse,
    Sse2,
    Sse3,
    Ssse3,
    Sse41,
    Sse42,
    Aes,
    Pclmulqdq,
    Popcnt,
    Lzcnt,
    Bmi1,
    Bmi2,
    Avx,
    Avx2,
    Fma,
}

impl IntrinsicIsa {
    pub fn from_type_name(name: &str) -> Option<IntrinsicIsa> {
        use IntrinsicIsa::*;
        Some(match name {
            "Sse" => Sse,
            "Sse2" => Sse2,
            "Sse3" => Sse3,
            "Ssse3" => Ssse3,
            "Sse41" => Sse41,
            "Sse42" => Sse42,
            "Aes" => Aes,
            "Pclmulqdq" => Pclmulqdq,
            "Popcnt" => Popcnt,
            "Lzcnt" => Lzcnt,
            "Bmi1" => Bmi1,
            "Bmi2" => Bmi2,
            "Avx" => Avx,
            "Avx2" => Avx2,
            "Fma" => Fma,
            _ => return None,
        })
    }
}

/// Whether `IsSupported` can be folded to a constant for this ISA.
pub fn has_known_support_level_at_compile_time(isa: IntrinsicIsa) -> bool {
    use IntrinsicIsa::*;
    !matches!(isa, Aes | Pclmulqdq | Sse3 | Ssse3 | Lzcnt)
}

/// For ISAs with a known support level: the constant `IsSupported` folds
/// to. The SSE baseline is assumed supported; the wider extensions are not.
pub fn is_known_supported_at_compile_time(isa: IntrinsicIsa) -> bool {
    use IntrinsicIsa::*;
    debug_assert!(has_known_support_level_at_compile_time(isa));
    matches!(isa, Sse | Sse2 | Sse41 | Sse42 | Popcnt)
}
