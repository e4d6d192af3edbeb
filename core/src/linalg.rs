//! Dense kernels used by topic-model training.
//!
//! Matrices are `ndarray::Array2<f64>`. Only what the truncated SVD needs
//! lives here: column orthonormalization and a symmetric eigen-solver for
//! the small projected problem.

use ndarray::{Array2, ArrayView1};

const ORTHO_EPS: f64 = 1e-10;
const JACOBI_MAX_SWEEPS: usize = 100;

fn column_norm(m: &Array2<f64>, c: usize) -> f64 {
    let col = m.column(c);
    col.dot(&col).sqrt()
}

/// Orthonormalize the columns in place (modified Gram-Schmidt, two passes).
///
/// A column that collapses to zero is replaced with a canonical basis vector
/// independent of the columns before it, so the result always has
/// orthonormal columns. Requires `ncols <= nrows`.
pub fn orthonormalize_columns(m: &mut Array2<f64>) {
    assert!(m.ncols() <= m.nrows(), "cannot orthonormalize more columns than rows");
    for c in 0..m.ncols() {
        let before = column_norm(m, c);
        project_out_previous(m, c);
        let mut norm = column_norm(m, c);
        if norm <= ORTHO_EPS * before.max(1.0) {
            let mut best = (0, f64::NEG_INFINITY);
            for b in 0..m.nrows() {
                set_basis_column(m, c, b);
                project_out_previous(m, c);
                let residual = column_norm(m, c);
                if residual > best.1 {
                    best = (b, residual);
                }
                if residual > 0.5 {
                    break;
                }
            }
            set_basis_column(m, c, best.0);
            project_out_previous(m, c);
            norm = column_norm(m, c);
        }
        m.column_mut(c).mapv_inplace(|v| v / norm);
    }
}

fn set_basis_column(m: &mut Array2<f64>, c: usize, basis: usize) {
    let mut col = m.column_mut(c);
    col.fill(0.0);
    col[basis] = 1.0;
}

fn project_out_previous(m: &mut Array2<f64>, c: usize) {
    for _ in 0..2 {
        for p in 0..c {
            let prev = m.column(p).to_owned();
            let d = prev.dot(&m.column(c));
            m.column_mut(c).scaled_add(-d, &prev);
        }
    }
}

/// Eigen-decomposition of a symmetric matrix by cyclic Jacobi rotations.
///
/// Returns eigenvalues sorted descending and a matrix whose column `i` is the
/// eigenvector for eigenvalue `i`.
pub fn symmetric_eigen(m: &Array2<f64>) -> (Vec<f64>, Array2<f64>) {
    assert!(m.is_square(), "eigen-decomposition needs a square matrix");
    let n = m.nrows();
    let mut a = m.clone();
    let mut v = Array2::<f64>::eye(n);

    let scale = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let tol = f64::EPSILON * scale.max(f64::MIN_POSITIVE);

    for _ in 0..JACOBI_MAX_SWEEPS {
        let off = a
            .indexed_iter()
            .filter(|((i, j), _)| i != j)
            .map(|(_, x)| x * x)
            .sum::<f64>()
            .sqrt();
        if off <= tol {
            break;
        }
        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[[p, q]];
                if apq.abs() <= f64::MIN_POSITIVE {
                    continue;
                }
                let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;
                rotate(&mut a, &mut v, p, q, c, s);
            }
        }
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| a[[j, j]].total_cmp(&a[[i, i]]).then(i.cmp(&j)));
    let values = order.iter().map(|&i| a[[i, i]]).collect();
    let vectors = Array2::from_shape_fn((n, n), |(r, dst)| v[[r, order[dst]]]);
    (values, vectors)
}

fn rotate(a: &mut Array2<f64>, v: &mut Array2<f64>, p: usize, q: usize, c: f64, s: f64) {
    let n = a.nrows();
    // A <- Jᵀ A J, applied as column then row updates.
    for k in 0..n {
        let (akp, akq) = (a[[k, p]], a[[k, q]]);
        a[[k, p]] = c * akp - s * akq;
        a[[k, q]] = s * akp + c * akq;
    }
    for k in 0..n {
        let (apk, aqk) = (a[[p, k]], a[[q, k]]);
        a[[p, k]] = c * apk - s * aqk;
        a[[q, k]] = s * apk + c * aqk;
    }
    for k in 0..n {
        let (vkp, vkq) = (v[[k, p]], v[[k, q]]);
        v[[k, p]] = c * vkp - s * vkq;
        v[[k, q]] = s * vkp + c * vkq;
    }
}

pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    ArrayView1::from(a).dot(&ArrayView1::from(b))
}

pub fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

/// Cosine of two dense vectors; zero when either has zero length.
pub fn cosine(a: &[f64], b: &[f64]) -> f64 {
    let denom = norm(a) * norm(b);
    if denom == 0.0 {
        0.0
    } else {
        (dot(a, b) / denom).clamp(-1.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn assert_orthonormal(m: &Array2<f64>) {
        let gram = m.t().dot(m);
        for ((i, j), &d) in gram.indexed_iter() {
            let expected = if i == j { 1.0 } else { 0.0 };
            assert!((d - expected).abs() < 1e-10, "columns {i},{j}: {d}");
        }
    }

    #[test]
    fn orthonormalize_handles_dependent_columns() {
        // Second column is a multiple of the first; third is zero.
        let mut m = array![[1.0, 2.0, 0.0], [1.0, 2.0, 0.0], [0.0, 0.0, 0.0]];
        orthonormalize_columns(&mut m);
        assert_orthonormal(&m);
    }

    #[test]
    fn eigen_of_known_matrix() {
        let m = array![[1.25, 0.5, 0.0], [0.5, 1.0, 0.0], [0.0, 0.0, 1.0]];
        let (values, vectors) = symmetric_eigen(&m);
        let disc = (2.25f64 * 2.25 - 4.0).sqrt();
        assert!((values[0] - (2.25 + disc) / 2.0).abs() < 1e-12);
        assert!((values[1] - 1.0).abs() < 1e-12);
        assert!((values[2] - (2.25 - disc) / 2.0).abs() < 1e-12);
        assert_orthonormal(&vectors);

        // A v = λ v for every pair.
        let av = m.dot(&vectors);
        for ((r, c), &x) in av.indexed_iter() {
            assert!((x - values[c] * vectors[[r, c]]).abs() < 1e-10);
        }
    }

    #[test]
    fn cosine_of_zero_vector_is_zero() {
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert!((cosine(&[1.0, 1.0], &[2.0, 2.0]) - 1.0).abs() < 1e-15);
    }
}
