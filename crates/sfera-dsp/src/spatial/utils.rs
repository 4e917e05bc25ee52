//! Internal geometric helpers for the triangulation solver.

use sfera_core::CartesianVector;

/// Determinants below this mark a singular speaker matrix.
pub(crate) const DETERMINANT_EPSILON: f32 = 1e-6;

/// Angular tolerance (radians) when testing whether two arcs cross.
pub(crate) const CROSSING_TOLERANCE: f32 = 0.01;

/// Parallelepiped volume of three unit vectors divided by the sum of their
/// pairwise angles. Thin, needle-like triangles score close to zero.
pub(crate) fn volume_per_perimeter(
    a: CartesianVector,
    b: CartesianVector,
    c: CartesianVector,
) -> f32 {
    let volume = a.cross(b).dot(c).abs();
    let perimeter = a.angle_to(b).get() + a.angle_to(c).get() + b.angle_to(c).get();
    if perimeter < DETERMINANT_EPSILON {
        return 0.0;
    }
    volume / perimeter
}

/// Inverse of the matrix whose rows are `a`, `b`, `c`, stored row-major.
///
/// Gains for a direction `p` are `g[c] = Σ_r p[r] * inverse[r * 3 + c]`.
/// Returns `None` for (near-)singular matrices.
pub(crate) fn invert_triplet(
    a: CartesianVector,
    b: CartesianVector,
    c: CartesianVector,
) -> Option<[f32; 9]> {
    let det = a.dot(b.cross(c));
    if !det.is_finite() || det.abs() < DETERMINANT_EPSILON {
        return None;
    }
    let inv_det = 1.0 / det;
    // Columns of the inverse are the cross products of the other two rows.
    let columns = [b.cross(c), c.cross(a), a.cross(b)];
    let mut inverse = [0.0f32; 9];
    for (col, v) in columns.iter().enumerate() {
        inverse[col] = v.x * inv_det;
        inverse[3 + col] = v.y * inv_det;
        inverse[6 + col] = v.z * inv_det;
    }
    Some(inverse)
}

/// Projects a direction through a 3x3 row-major inverse matrix.
#[inline]
pub(crate) fn apply_inverse3(inverse: &[f32; 9], p: CartesianVector) -> [f32; 3] {
    [
        p.x * inverse[0] + p.y * inverse[3] + p.z * inverse[6],
        p.x * inverse[1] + p.y * inverse[4] + p.z * inverse[7],
        p.x * inverse[2] + p.y * inverse[5] + p.z * inverse[8],
    ]
}

/// Inverse of the 2x2 matrix with rows `(x1, y1)` and `(x2, y2)`, row-major.
pub(crate) fn invert_pair(x1: f32, y1: f32, x2: f32, y2: f32) -> Option<[f32; 4]> {
    let det = x1 * y2 - x2 * y1;
    if !det.is_finite() || det.abs() <= 1e-3 {
        return None;
    }
    Some([y2 / det, -y1 / det, -x2 / det, x1 / det])
}

#[inline]
pub(crate) fn apply_inverse2(inverse: &[f32; 4], x: f32, y: f32) -> [f32; 2] {
    [
        x * inverse[0] + y * inverse[2],
        x * inverse[1] + y * inverse[3],
    ]
}

/// True when the great-circle arcs `a–b` and `c–d` cross somewhere other
/// than at one of their endpoints.
pub(crate) fn arcs_cross(
    a: CartesianVector,
    b: CartesianVector,
    c: CartesianVector,
    d: CartesianVector,
) -> bool {
    let n1 = a.cross(b);
    let n2 = c.cross(d);
    let axis = n1.cross(n2);
    if axis.is_zero() {
        // Same great circle, or a degenerate arc.
        return false;
    }
    let x = axis.normalized();
    let neg_x = -x;

    let ab = a.angle_to(b).get();
    let cd = c.angle_to(d).get();

    let (ax, bx, cx, dx) = (
        a.angle_to(x).get(),
        b.angle_to(x).get(),
        c.angle_to(x).get(),
        d.angle_to(x).get(),
    );
    let (an, bn, cn, dn) = (
        a.angle_to(neg_x).get(),
        b.angle_to(neg_x).get(),
        c.angle_to(neg_x).get(),
        d.angle_to(neg_x).get(),
    );

    // Crossing at (or next to) a speaker does not count.
    if [ax, bx, cx, dx, an, bn, cn, dn]
        .iter()
        .any(|&angle| angle <= CROSSING_TOLERANCE)
    {
        return false;
    }

    let on_both = |ua: f32, ub: f32, uc: f32, ud: f32| {
        (ab - (ua + ub)).abs() <= CROSSING_TOLERANCE && (cd - (uc + ud)).abs() <= CROSSING_TOLERANCE
    };
    on_both(ax, bx, cx, dx) || on_both(an, bn, cn, dn)
}
