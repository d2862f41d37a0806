//! Diagnostic codes with category prefixes for structured identification.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The category of a diagnostic code, determining its prefix letter.
///
/// Each category maps to a single-character prefix used in diagnostic code
/// display (e.g., `R101` for a routing diagnostic, `X203` for an ECO one).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum Category {
    /// Routing diagnostics, prefixed with `R`.
    Route,
    /// ECO (netlist mutation) diagnostics, prefixed with `X`.
    Eco,
    /// Timing diagnostics, prefixed with `T`.
    Timing,
    /// Device/database diagnostics, prefixed with `D`.
    Device,
}

impl Category {
    /// Returns the single-character prefix for this category.
    pub fn prefix(self) -> char {
        match self {
            Category::Route => 'R',
            Category::Eco => 'X',
            Category::Timing => 'T',
            Category::Device => 'D',
        }
    }
}

/// A structured diagnostic code combining a category prefix and a numeric
/// identifier.
///
/// Displayed as the category prefix followed by a zero-padded 3-digit number,
/// e.g., `R101`, `X203`, `T305`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct DiagnosticCode {
    /// The category of this diagnostic.
    pub category: Category,
    /// The numeric identifier within the category.
    pub number: u16,
}

impl DiagnosticCode {
    /// Creates a new diagnostic code.
    pub fn new(category: Category, number: u16) -> Self {
        Self { category, number }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:03}", self.category.prefix(), self.number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_prefixes() {
        assert_eq!(Category::Route.prefix(), 'R');
        assert_eq!(Category::Eco.prefix(), 'X');
        assert_eq!(Category::Timing.prefix(), 'T');
        assert_eq!(Category::Device.prefix(), 'D');
    }

    #[test]
    fn display_format() {
        let code = DiagnosticCode::new(Category::Route, 101);
        assert_eq!(format!("{code}"), "R101");

        let code = DiagnosticCode::new(Category::Eco, 3);
        assert_eq!(format!("{code}"), "X003");

        let code = DiagnosticCode::new(Category::Timing, 42);
        assert_eq!(format!("{code}"), "T042");
    }

    #[test]
    fn serde_roundtrip() {
        let code = DiagnosticCode::new(Category::Route, 101);
        let json = serde_json::to_string(&code).unwrap();
        let back: DiagnosticCode = serde_json::from_str(&json).unwrap();
        assert_eq!(code, back);
    }
}
