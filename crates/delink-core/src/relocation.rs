//! Relocation representation.

/// How the patched field is computed by the relinker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RelocKind {
    /// Absolute address of the symbol plus addend.
    Absolute,
    /// Symbol address relative to the patched location. The addend carries
    /// the operand-encoding width correction (e.g. -4 for a trailing 32-bit
    /// displacement).
    PcRelative,
}

/// A relocation record: patch `offset` within the code section with the
/// resolved address of `symbol`, adjusted by `addend` according to `kind`.
///
/// The target is referenced by name; the name must resolve in the owning
/// object's symbol table by the time the object is serialized.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Relocation {
    /// Byte offset within the section being patched.
    pub offset: u64,
    /// Relocation kind.
    pub kind: RelocKind,
    /// Kind-specific addend.
    pub addend: i64,
    /// Name of the target symbol.
    pub symbol: String,
}

impl Relocation {
    /// Creates a new relocation.
    pub fn new(offset: u64, kind: RelocKind, addend: i64, symbol: impl Into<String>) -> Self {
        Self {
            offset,
            kind,
            addend,
            symbol: symbol.into(),
        }
    }
}
