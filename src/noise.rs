//! Four dimensional simplex noise.
//!
//! This is the same gradient-lattice algorithm as `simplex_noise_4d` in
//! `shaders/wobble.wgsl`, written out step for step so the CPU can reproduce
//! what the vertex stage computes.

use glam::{Vec2, Vec3, Vec4};

const F4: f32 = 0.309_016_994_374_947_45;
const G4: Vec4 = Vec4::new(
    0.138_196_601_125_011,
    0.276_393_202_250_021,
    0.414_589_803_375_032,
    -0.447_213_595_499_958,
);

fn mod289(x: f32) -> f32 {
    x - (x * (1.0 / 289.0)).floor() * 289.0
}

fn mod289_4(x: Vec4) -> Vec4 {
    x - (x * (1.0 / 289.0)).floor() * 289.0
}

fn permute(x: f32) -> f32 {
    mod289(((x * 34.0) + 1.0) * x)
}

fn permute_4(x: Vec4) -> Vec4 {
    mod289_4(((x * 34.0) + 1.0) * x)
}

fn taylor_inv_sqrt(r: f32) -> f32 {
    1.792_842_914_001_59 - 0.853_734_720_953_14 * r
}

fn taylor_inv_sqrt_4(r: Vec4) -> Vec4 {
    Vec4::splat(1.792_842_914_001_59) - 0.853_734_720_953_14 * r
}

/// GLSL `step`: 0 where `x < edge`, 1 elsewhere.
fn step3(edge: Vec3, x: Vec3) -> Vec3 {
    Vec3::select(x.cmplt(edge), Vec3::ZERO, Vec3::ONE)
}

fn fract3(x: Vec3) -> Vec3 {
    x - x.floor()
}

fn grad4(j: f32, ip: Vec4) -> Vec4 {
    let xyz = (fract3(Vec3::splat(j) * ip.truncate()) * 7.0).floor() * ip.z - Vec3::ONE;
    let w = 1.5 - xyz.abs().dot(Vec3::ONE);
    let p = xyz.extend(w);
    let s = Vec4::select(p.cmplt(Vec4::ZERO), Vec4::ONE, Vec4::ZERO);
    (p.truncate() + (s.truncate() * 2.0 - Vec3::ONE) * s.w).extend(p.w)
}

/// Samples the noise field; the result lies roughly in `[-1, 1]`.
pub fn simplex_noise_4d(v: Vec4) -> f32 {
    let mut i = (v + Vec4::splat(v.dot(Vec4::splat(F4)))).floor();
    let x0 = v - i + Vec4::splat(i.dot(Vec4::splat(G4.x)));

    let is_x = step3(Vec3::new(x0.y, x0.z, x0.w), Vec3::splat(x0.x));
    let is_yz = step3(Vec3::new(x0.z, x0.w, x0.w), Vec3::new(x0.y, x0.y, x0.z));
    let mut i0 = Vec4::new(is_x.x + is_x.y + is_x.z, 1.0 - is_x.x, 1.0 - is_x.y, 1.0 - is_x.z);
    i0.y += is_yz.x + is_yz.y;
    i0.z += 1.0 - is_yz.x;
    i0.w += 1.0 - is_yz.y;
    i0.z += is_yz.z;
    i0.w += 1.0 - is_yz.z;

    let i3 = i0.clamp(Vec4::ZERO, Vec4::ONE);
    let i2 = (i0 - Vec4::ONE).clamp(Vec4::ZERO, Vec4::ONE);
    let i1 = (i0 - Vec4::splat(2.0)).clamp(Vec4::ZERO, Vec4::ONE);

    let x1 = x0 - i1 + Vec4::splat(G4.x);
    let x2 = x0 - i2 + Vec4::splat(G4.y);
    let x3 = x0 - i3 + Vec4::splat(G4.z);
    let x4 = x0 + Vec4::splat(G4.w);

    i = mod289_4(i);
    let j0 = permute(permute(permute(permute(i.w) + i.z) + i.y) + i.x);
    let j1 = permute_4(
        permute_4(
            permute_4(
                permute_4(Vec4::splat(i.w) + Vec4::new(i1.w, i2.w, i3.w, 1.0))
                    + Vec4::splat(i.z)
                    + Vec4::new(i1.z, i2.z, i3.z, 1.0),
            ) + Vec4::splat(i.y)
                + Vec4::new(i1.y, i2.y, i3.y, 1.0),
        ) + Vec4::splat(i.x)
            + Vec4::new(i1.x, i2.x, i3.x, 1.0),
    );

    let ip = Vec4::new(1.0 / 294.0, 1.0 / 49.0, 1.0 / 7.0, 0.0);

    let mut p0 = grad4(j0, ip);
    let mut p1 = grad4(j1.x, ip);
    let mut p2 = grad4(j1.y, ip);
    let mut p3 = grad4(j1.z, ip);
    let mut p4 = grad4(j1.w, ip);

    let norm = taylor_inv_sqrt_4(Vec4::new(p0.dot(p0), p1.dot(p1), p2.dot(p2), p3.dot(p3)));
    p0 *= norm.x;
    p1 *= norm.y;
    p2 *= norm.z;
    p3 *= norm.w;
    p4 *= taylor_inv_sqrt(p4.dot(p4));

    let m0 = (Vec3::splat(0.6) - Vec3::new(x0.dot(x0), x1.dot(x1), x2.dot(x2))).max(Vec3::ZERO);
    let m1 = (Vec2::splat(0.6) - Vec2::new(x3.dot(x3), x4.dot(x4))).max(Vec2::ZERO);
    let m0 = m0 * m0;
    let m1 = m1 * m1;

    49.0 * ((m0 * m0).dot(Vec3::new(p0.dot(x0), p1.dot(x1), p2.dot(x2)))
        + (m1 * m1).dot(Vec2::new(p3.dot(x3), p4.dot(x4))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noise_is_deterministic() {
        let sample = Vec4::new(0.37, -1.2, 2.5, 0.8);
        assert_eq!(simplex_noise_4d(sample), simplex_noise_4d(sample));
    }

    #[test]
    fn noise_stays_in_expected_range() {
        let mut max_abs = 0.0f32;
        for step in 0..2000 {
            let t = step as f32 * 0.173;
            let sample = Vec4::new(t.sin() * 3.1, (t * 0.7).cos() * 2.3, t * 0.05, t * 0.011);
            let value = simplex_noise_4d(sample);
            assert!(value.is_finite());
            max_abs = max_abs.max(value.abs());
        }
        assert!(max_abs <= 1.1, "noise exceeded range: {max_abs}");
        assert!(max_abs > 0.1, "noise looks flat: {max_abs}");
    }

    #[test]
    fn noise_varies_over_space_and_time() {
        let base = Vec4::new(0.5, 0.25, -0.75, 0.0);
        let moved = simplex_noise_4d(base + Vec4::new(0.3, 0.0, 0.0, 0.0));
        let later = simplex_noise_4d(base + Vec4::new(0.0, 0.0, 0.0, 0.4));
        let origin = simplex_noise_4d(base);
        assert_ne!(origin, moved);
        assert_ne!(origin, later);
    }

    #[test]
    fn noise_vanishes_on_lattice_corner() {
        // At the origin every contributing corner dot product is zero.
        assert_eq!(simplex_noise_4d(Vec4::ZERO), 0.0);
    }
}
