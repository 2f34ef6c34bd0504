//! Design-time constants: the three DVFS operating modes and the
//! power-relevant operation classes with their dynamic-power weights.

use std::fmt;

/// Tolerance when matching a voltage against the mode table.
const V_EPSILON: f64 = 1e-6;

/// The three discrete DVFS operating modes a tile can run in.
///
/// Periods are normalized to the nominal clock. Sprint runs three ticks
/// for every two nominal cycles (0.66 is the rationally related period the
/// simulator snaps back onto integer time).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum DvfsMode {
    Rest,
    Nominal,
    Sprint,
}

impl DvfsMode {
    pub const ALL: [DvfsMode; 3] = [DvfsMode::Rest, DvfsMode::Nominal, DvfsMode::Sprint];

    pub fn voltage(self) -> f64 {
        match self {
            DvfsMode::Rest => 0.61,
            DvfsMode::Nominal => 0.90,
            DvfsMode::Sprint => 1.23,
        }
    }

    pub fn period(self) -> f64 {
        match self {
            DvfsMode::Rest => 3.00,
            DvfsMode::Nominal => 1.00,
            DvfsMode::Sprint => 0.66,
        }
    }

    /// Look a mode up by its exact table voltage.
    pub fn from_voltage(v: f64) -> Option<DvfsMode> {
        DvfsMode::ALL
            .into_iter()
            .find(|m| (m.voltage() - v).abs() < V_EPSILON)
    }

    /// Parse the `dvfs` selector used by tile-config records.
    pub fn from_selector(s: &str) -> Option<DvfsMode> {
        match s {
            "slow" => Some(DvfsMode::Rest),
            "nominal" => Some(DvfsMode::Nominal),
            "fast" => Some(DvfsMode::Sprint),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DvfsMode::Rest => "rest",
            DvfsMode::Nominal => "nominal",
            DvfsMode::Sprint => "sprint",
        }
    }

    /// Inverse of [`DvfsMode::label`], used when reloading search
    /// artifacts.
    pub fn from_label(s: &str) -> Option<DvfsMode> {
        match s {
            "rest" => Some(DvfsMode::Rest),
            "nominal" => Some(DvfsMode::Nominal),
            "sprint" => Some(DvfsMode::Sprint),
            _ => None,
        }
    }

    /// Classify an arbitrary voltage into a mode label. Used when writing
    /// the DVFS-annotated tile config back out.
    pub fn label_for_voltage(v: f64) -> &'static str {
        if v < 0.65 {
            "rest"
        } else if v < 0.95 {
            "nominal"
        } else {
            "sprint"
        }
    }
}

impl fmt::Display for DvfsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Power-relevant operation classes. Every configured tile operation maps
/// onto one of these; the dynamic-power weight α is relative to `Mul`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum OpClass {
    Mul,
    Alu,
    Cp,
    Cmp,
    Byp,
    Sram,
    Phi,
    Br,
    Zero,
    Const,
}

impl OpClass {
    /// Dynamic-power weight relative to a multiplier tile.
    pub fn alpha(self) -> f64 {
        match self {
            OpClass::Mul => 1.00,
            OpClass::Alu => 0.33,
            OpClass::Cp => 0.22,
            OpClass::Cmp => 0.22,
            OpClass::Byp => 0.11,
            OpClass::Sram => 0.82,
            OpClass::Phi => OpClass::Cp.alpha(),
            OpClass::Br => OpClass::Cmp.alpha(),
            OpClass::Zero => 0.0,
            OpClass::Const => 0.0,
        }
    }

    /// Map a lowercase configured operation name onto its class.
    pub fn from_op(op: &str) -> Option<OpClass> {
        match op {
            "mul" | "mult" => Some(OpClass::Mul),
            "add" | "sub" | "and" | "or" | "xor" | "not" | "sll" | "srl" | "sra" => {
                Some(OpClass::Alu)
            }
            "cp" | "copy" => Some(OpClass::Cp),
            "cmp" | "eq" | "ne" | "lt" | "le" | "gt" | "ge" => Some(OpClass::Cmp),
            "byp" | "bypass" => Some(OpClass::Byp),
            "sram" | "ld" | "st" | "load" | "store" => Some(OpClass::Sram),
            "phi" => Some(OpClass::Phi),
            "br" | "branch" => Some(OpClass::Br),
            "zero" => Some(OpClass::Zero),
            "const" => Some(OpClass::Const),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            OpClass::Mul => "mul",
            OpClass::Alu => "alu",
            OpClass::Cp => "cp",
            OpClass::Cmp => "cmp",
            OpClass::Byp => "byp",
            OpClass::Sram => "sram",
            OpClass::Phi => "phi",
            OpClass::Br => "br",
            OpClass::Zero => "zero",
            OpClass::Const => "const",
        }
    }
}

impl fmt::Display for OpClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
