//! Single-photon polarization kernel.
//!
//! Every photon on the link is a qubit described by a 2×2 density matrix ρ
//! (Hermitian, unit trace, positive semi-definite). The kernel supports the
//! operations the physical layer needs and nothing else:
//!
//! - preparation from one of the four BB84 polarization labels,
//! - unitary evolution `ρ → UρU†`,
//! - the depolarizing channel `ρ → (1−p)ρ + p·I/2`,
//! - projective measurement with Lüders collapse `ρ → PρP / Tr(Pρ)`,
//! - von Neumann entropy and fidelity against a pure target (diagnostics).
//!
//! ## Encoding
//!
//! | bit | rectilinear | diagonal |
//! |-----|-------------|----------|
//! | 0   | `H` = \|0⟩  | `D` = \|+⟩ |
//! | 1   | `V` = \|1⟩  | `A` = \|−⟩ |

use std::fmt;
use std::str::FromStr;

use num_complex::Complex64;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Row-major 2×2 complex matrix.
pub type Matrix2 = [[Complex64; 2]; 2];

/// Eigenvalues below this are treated as exact zeros in the entropy sum.
const EIGEN_TOLERANCE: f64 = 1e-10;

/// Collapse normalisation below this snaps the state onto the projector.
const COLLAPSE_TOLERANCE: f64 = 1e-15;

/// Invalid input handed to the kernel. These are programming errors on the
/// caller's side and are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KernelError {
    #[error("unknown polarization label '{0}' (expected H, V, D or A)")]
    InvalidLabel(String),
    #[error("unknown measurement basis '{0}' (expected rectilinear or diagonal)")]
    InvalidBasis(String),
}

// ---------------------------------------------------------------------------
// Bases and labels
// ---------------------------------------------------------------------------

/// Measurement / preparation basis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Basis {
    /// Z basis: |H⟩ / |V⟩.
    Rectilinear,
    /// X basis: |D⟩ / |A⟩.
    Diagonal,
}

impl Basis {
    pub const ALL: [Basis; 2] = [Basis::Rectilinear, Basis::Diagonal];

    /// Wire index used in event records (0 = rectilinear, 1 = diagonal).
    pub fn index(self) -> u8 {
        match self {
            Self::Rectilinear => 0,
            Self::Diagonal => 1,
        }
    }

    /// Orthogonal projectors `[P0, P1]` for outcome 0 and outcome 1.
    pub fn projectors(self) -> [Matrix2; 2] {
        match self {
            Self::Rectilinear => [
                Polarization::H.density(),
                Polarization::V.density(),
            ],
            Self::Diagonal => [
                Polarization::D.density(),
                Polarization::A.density(),
            ],
        }
    }
}

impl fmt::Display for Basis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rectilinear => write!(f, "rectilinear"),
            Self::Diagonal => write!(f, "diagonal"),
        }
    }
}

impl FromStr for Basis {
    type Err = KernelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rectilinear" | "z" | "0" => Ok(Self::Rectilinear),
            "diagonal" | "x" | "1" => Ok(Self::Diagonal),
            other => Err(KernelError::InvalidBasis(other.to_string())),
        }
    }
}

impl TryFrom<u8> for Basis {
    type Error = KernelError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Rectilinear),
            1 => Ok(Self::Diagonal),
            other => Err(KernelError::InvalidBasis(other.to_string())),
        }
    }
}

/// One of the four BB84 polarization states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Polarization {
    /// Horizontal, |0⟩.
    H,
    /// Vertical, |1⟩.
    V,
    /// Diagonal +45°, |+⟩.
    D,
    /// Anti-diagonal −45°, |−⟩.
    A,
}

impl Polarization {
    pub const ALL: [Polarization; 4] = [
        Polarization::H,
        Polarization::V,
        Polarization::D,
        Polarization::A,
    ];

    /// Map a sender bit and basis onto its polarization.
    pub fn encode(bit: u8, basis: Basis) -> Self {
        match (bit & 1, basis) {
            (0, Basis::Rectilinear) => Self::H,
            (_, Basis::Rectilinear) => Self::V,
            (0, Basis::Diagonal) => Self::D,
            (_, Basis::Diagonal) => Self::A,
        }
    }

    pub fn basis(self) -> Basis {
        match self {
            Self::H | Self::V => Basis::Rectilinear,
            Self::D | Self::A => Basis::Diagonal,
        }
    }

    pub fn bit(self) -> u8 {
        match self {
            Self::H | Self::D => 0,
            Self::V | Self::A => 1,
        }
    }

    fn ket(self) -> [Complex64; 2] {
        let s = std::f64::consts::FRAC_1_SQRT_2;
        match self {
            Self::H => [Complex64::new(1.0, 0.0), Complex64::new(0.0, 0.0)],
            Self::V => [Complex64::new(0.0, 0.0), Complex64::new(1.0, 0.0)],
            Self::D => [Complex64::new(s, 0.0), Complex64::new(s, 0.0)],
            Self::A => [Complex64::new(s, 0.0), Complex64::new(-s, 0.0)],
        }
    }

    /// Pure-state density matrix |ψ⟩⟨ψ|.
    pub fn density(self) -> Matrix2 {
        let k = self.ket();
        [
            [k[0] * k[0].conj(), k[0] * k[1].conj()],
            [k[1] * k[0].conj(), k[1] * k[1].conj()],
        ]
    }
}

impl fmt::Display for Polarization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::H => write!(f, "H"),
            Self::V => write!(f, "V"),
            Self::D => write!(f, "D"),
            Self::A => write!(f, "A"),
        }
    }
}

impl FromStr for Polarization {
    type Err = KernelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "H" => Ok(Self::H),
            "V" => Ok(Self::V),
            "D" => Ok(Self::D),
            "A" => Ok(Self::A),
            other => Err(KernelError::InvalidLabel(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Matrix helpers
// ---------------------------------------------------------------------------

fn mat_mul(a: &Matrix2, b: &Matrix2) -> Matrix2 {
    let mut out = [[Complex64::new(0.0, 0.0); 2]; 2];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            *cell = a[i][0] * b[0][j] + a[i][1] * b[1][j];
        }
    }
    out
}

fn dagger(a: &Matrix2) -> Matrix2 {
    [
        [a[0][0].conj(), a[1][0].conj()],
        [a[0][1].conj(), a[1][1].conj()],
    ]
}

fn trace(a: &Matrix2) -> Complex64 {
    a[0][0] + a[1][1]
}

/// Common single-qubit gates.
pub mod gates {
    use super::Matrix2;
    use num_complex::Complex64;

    pub fn identity() -> Matrix2 {
        let one = Complex64::new(1.0, 0.0);
        let zero = Complex64::new(0.0, 0.0);
        [[one, zero], [zero, one]]
    }

    pub fn hadamard() -> Matrix2 {
        let s = Complex64::new(std::f64::consts::FRAC_1_SQRT_2, 0.0);
        [[s, s], [s, -s]]
    }

    pub fn pauli_x() -> Matrix2 {
        let one = Complex64::new(1.0, 0.0);
        let zero = Complex64::new(0.0, 0.0);
        [[zero, one], [one, zero]]
    }

    pub fn pauli_z() -> Matrix2 {
        let one = Complex64::new(1.0, 0.0);
        let zero = Complex64::new(0.0, 0.0);
        [[one, zero], [zero, -one]]
    }

    /// Polarization rotator by `theta` radians (real rotation matrix).
    pub fn rotation(theta: f64) -> Matrix2 {
        let (s, c) = theta.sin_cos();
        [
            [Complex64::new(c, 0.0), Complex64::new(-s, 0.0)],
            [Complex64::new(s, 0.0), Complex64::new(c, 0.0)],
        ]
    }
}

// ---------------------------------------------------------------------------
// Polarization state
// ---------------------------------------------------------------------------

/// Density matrix of a single photon. Created per photon, consumed by the
/// detector, never reused.
#[derive(Debug, Clone, PartialEq)]
pub struct PolarizationState {
    rho: Matrix2,
}

impl PolarizationState {
    /// Pure state for a polarization label.
    pub fn from_label(label: Polarization) -> Self {
        Self {
            rho: label.density(),
        }
    }

    /// Parse a textual label (`"H"`, `"V"`, `"D"`, `"A"`).
    pub fn from_label_str(label: &str) -> Result<Self, KernelError> {
        label.parse::<Polarization>().map(Self::from_label)
    }

    /// Maximally mixed state I/2.
    pub fn maximally_mixed() -> Self {
        let half = Complex64::new(0.5, 0.0);
        let zero = Complex64::new(0.0, 0.0);
        Self {
            rho: [[half, zero], [zero, half]],
        }
    }

    pub fn matrix(&self) -> &Matrix2 {
        &self.rho
    }

    pub fn trace(&self) -> Complex64 {
        trace(&self.rho)
    }

    /// Tr(ρ²): 1 for pure states, 0.5 for the maximally mixed state.
    pub fn purity(&self) -> f64 {
        trace(&mat_mul(&self.rho, &self.rho)).re
    }

    /// Hermitian with unit trace, within `tol`.
    pub fn is_physical(&self, tol: f64) -> bool {
        let t = self.trace();
        if (t.re - 1.0).abs() > tol || t.im.abs() > tol {
            return false;
        }
        let h = dagger(&self.rho);
        (0..2).all(|i| (0..2).all(|j| (self.rho[i][j] - h[i][j]).norm() <= tol))
    }

    /// `ρ → UρU†`.
    pub fn apply_unitary(&mut self, u: &Matrix2) {
        self.rho = mat_mul(&mat_mul(u, &self.rho), &dagger(u));
    }

    /// Depolarizing channel `ρ → (1−p)ρ + p·I/2`. `p` is clamped to [0, 1].
    pub fn apply_depolarizing(&mut self, p: f64) {
        let p = p.clamp(0.0, 1.0);
        let keep = 1.0 - p;
        for (i, row) in self.rho.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                let mixed = if i == j { 0.5 * p } else { 0.0 };
                *cell = *cell * keep + Complex64::new(mixed, 0.0);
            }
        }
    }

    /// Projective measurement in `basis` with Lüders collapse.
    ///
    /// Returns the outcome bit. The post-measurement state is always the
    /// pure projector of the observed outcome.
    pub fn measure<R: Rng + ?Sized>(&mut self, basis: Basis, rng: &mut R) -> u8 {
        let projectors = basis.projectors();
        let p0 = trace(&mat_mul(&projectors[0], &self.rho)).re.max(0.0);
        let p1 = trace(&mat_mul(&projectors[1], &self.rho)).re.max(0.0);
        let total = p0 + p1;
        let prob_zero = if total > 0.0 { p0 / total } else { 0.5 };

        let outcome: u8 = if rng.random::<f64>() < prob_zero { 0 } else { 1 };
        let projector = &projectors[outcome as usize];

        let norm = trace(&mat_mul(projector, &self.rho)).re;
        if norm > COLLAPSE_TOLERANCE {
            let collapsed = mat_mul(&mat_mul(projector, &self.rho), projector);
            let inv = 1.0 / norm;
            for (row, src) in self.rho.iter_mut().zip(collapsed.iter()) {
                for (cell, value) in row.iter_mut().zip(src.iter()) {
                    *cell = *value * inv;
                }
            }
        } else {
            self.rho = *projector;
        }
        outcome
    }

    /// Parse the basis name first; unknown names are rejected.
    pub fn measure_named<R: Rng + ?Sized>(
        &mut self,
        basis: &str,
        rng: &mut R,
    ) -> Result<u8, KernelError> {
        let basis: Basis = basis.parse()?;
        Ok(self.measure(basis, rng))
    }

    /// Eigenvalues of ρ in descending order (closed form for 2×2 Hermitian).
    pub fn eigenvalues(&self) -> [f64; 2] {
        let a = self.rho[0][0].re;
        let d = self.rho[1][1].re;
        let b = self.rho[0][1];
        let mean = 0.5 * (a + d);
        let disc = (0.25 * (a - d) * (a - d) + b.norm_sqr()).sqrt();
        [mean + disc, mean - disc]
    }

    /// Von Neumann entropy `S(ρ) = −Σ λ log₂ λ` in bits.
    pub fn entropy(&self) -> f64 {
        let s: f64 = self
            .eigenvalues()
            .iter()
            .filter(|&&l| l > EIGEN_TOLERANCE)
            .map(|&l| -l * l.log2())
            .sum();
        s.max(0.0)
    }

    /// Fidelity with a pure target, `Tr(σρ)`.
    pub fn fidelity(&self, target: Polarization) -> f64 {
        trace(&mat_mul(&target.density(), &self.rho)).re
    }
}
