// ─────────────────────────────────────────────────────────────────────
// Thinkick — Constants
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
/// Electron rest energy (eV)
pub const ELECTRON_MASS_EV: f64 = 510_998.950_00;

/// Proton rest energy (eV)
pub const PROTON_MASS_EV: f64 = 938_272_088.16;

/// Classical electron radius (m).
/// Scaled by `q0^2 * m_e / m0` for other species.
pub const R_CLASSICAL_ELECTRON: f64 = 2.817_940_326_2e-15;

/// Fine-structure constant
pub const ALPHA_EM: f64 = 7.297_352_569_3e-3;

/// Reduced Planck constant times c (eV·m)
pub const HBAR_C_EV_M: f64 = 1.973_269_804e-7;
