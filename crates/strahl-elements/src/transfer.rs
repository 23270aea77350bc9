//! Transfer-matrix constructors shared by the simulation types.
//!
//! The transverse layout is the same for every state dimension: rows
//! 0/1 are horizontal position/angle, rows 2/3 vertical. The moment
//! simulation appends longitudinal components and a homogeneous
//! coordinate; these constructors leave anything past row 3 as identity.

use nalgebra::SMatrix;

/// Field-free drift of the given length.
pub fn drift<const N: usize>(length: f64) -> SMatrix<f64, N, N> {
    let mut m = SMatrix::<f64, N, N>::identity();
    m[(0, 1)] = length;
    m[(2, 3)] = length;
    m
}

/// Thick-lens quadrupole of the given length and strength.
///
/// Positive strength focuses horizontally and defocuses vertically;
/// negative strength swaps the planes. Zero strength degenerates to a
/// drift.
pub fn quadrupole<const N: usize>(length: f64, strength: f64) -> SMatrix<f64, N, N> {
    if strength == 0.0 {
        return drift(length);
    }
    let mut m = SMatrix::<f64, N, N>::identity();
    let w = strength.abs().sqrt();
    let wl = w * length;
    let (focus, defocus) = if strength > 0.0 { (0, 2) } else { (2, 0) };

    m[(focus, focus)] = wl.cos();
    m[(focus, focus + 1)] = wl.sin() / w;
    m[(focus + 1, focus)] = -w * wl.sin();
    m[(focus + 1, focus + 1)] = wl.cos();

    m[(defocus, defocus)] = wl.cosh();
    m[(defocus, defocus + 1)] = wl.sinh() / w;
    m[(defocus + 1, defocus)] = w * wl.sinh();
    m[(defocus + 1, defocus + 1)] = wl.cosh();

    m
}

/// Build an `N`×`N` matrix from a row-major slice; `None` when the
/// length is not `N*N`.
pub fn from_row_major<const N: usize>(data: &[f64]) -> Option<SMatrix<f64, N, N>> {
    if data.len() != N * N {
        return None;
    }
    Some(SMatrix::from_row_slice(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drift_moves_position_by_angle() {
        let m = drift::<6>(2.0);
        assert_eq!(m[(0, 1)], 2.0);
        assert_eq!(m[(2, 3)], 2.0);
        assert_eq!(m[(0, 0)], 1.0);
        assert_eq!(m[(1, 0)], 0.0);
        // longitudinal block untouched
        assert_eq!(m[(4, 4)], 1.0);
        assert_eq!(m[(4, 5)], 0.0);
    }

    #[test]
    fn quadrupole_determinant_is_one() {
        let m = quadrupole::<6>(0.4, 3.1);
        assert!((m.determinant() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn quadrupole_sign_swaps_planes() {
        let f = quadrupole::<6>(0.5, 2.0);
        let d = quadrupole::<6>(0.5, -2.0);
        assert_eq!(f[(0, 0)], d[(2, 2)]);
        assert_eq!(f[(2, 2)], d[(0, 0)]);
        // focusing plane: cos < 1; defocusing: cosh > 1
        assert!(f[(0, 0)] < 1.0);
        assert!(f[(2, 2)] > 1.0);
    }

    #[test]
    fn zero_strength_is_a_drift() {
        assert_eq!(quadrupole::<6>(1.2, 0.0), drift::<6>(1.2));
    }

    #[test]
    fn row_major_rejects_bad_length() {
        assert!(from_row_major::<6>(&[0.0; 35]).is_none());
        assert!(from_row_major::<6>(&[0.0; 36]).is_some());
    }

    #[test]
    fn row_major_layout() {
        let mut data = [0.0; 36];
        data[1] = 7.0; // row 0, column 1
        let m = from_row_major::<6>(&data).unwrap();
        assert_eq!(m[(0, 1)], 7.0);
        assert_eq!(m[(1, 0)], 0.0);
    }
}
